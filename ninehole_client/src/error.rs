// Error types for the client crate, one enum per concern.
//
// - `ChannelError`:   opening or subscribing to the notification channel.
// - `CommandFailure`: the settled failure of one outbound command. Cloneable
//                     because it is stored in `Mutation` and shown to the user.
// - `SessionError`:   a local precondition refused an operation before any
//                     request was sent.
// - `ConfigError`:    startup configuration could not be resolved.

use thiserror::Error;

use ninehole_protocol::CommandKind;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("unsupported channel scheme `{0}` (only ws:// is supported)")]
    UnsupportedScheme(String),
    #[error("channel url `{0}` has no host or port")]
    MissingAddress(String),
    #[error("connect failed: {0}")]
    Connect(#[from] std::io::Error),
    #[error("websocket handshake failed: {0}")]
    Handshake(String),
    #[error("channel is not connected")]
    NotConnected,
    #[error("channel already has a subscriber")]
    AlreadySubscribed,
}

/// How a command settled when it did not succeed.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CommandFailure {
    /// Non-success response. The body is the authority's own message and is
    /// displayed exactly as received.
    #[error("{0}")]
    Rejected(String),
    /// The request never produced a response.
    #[error("request failed: {0}")]
    Transport(String),
    /// create-lobby succeeded but returned no identifier.
    #[error("the server did not return a lobby id")]
    MissingLobbyId,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("not connected to the server")]
    NotConnected,
    #[error("the connection to the server is gone")]
    Disconnected,
    #[error("already in a lobby")]
    AlreadyInLobby,
    #[error("not in a lobby")]
    NotInLobby,
    #[error("waiting for an opponent")]
    NoGame,
    #[error("{0} is already in progress")]
    Pending(CommandKind),
    #[error("a move is still being submitted")]
    MovePending,
    #[error("lobby id must not be empty")]
    EmptyLobbyId,
    #[error("position {0} is not on the board")]
    InvalidPosition(usize),
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("unsupported server scheme `{0}` (expected http)")]
    UnsupportedScheme(String),
    #[error("`{0}` is not a join link or lobby id")]
    InvalidJoinLink(String),
    #[error("{0} requires a value")]
    MissingValue(&'static str),
    #[error("unknown argument `{0}`")]
    UnknownArgument(String),
}
