// Outbound commands and their request-URL encoding.
//
// Every command is an HTTP `POST` with no body; its arguments travel in the
// query string:
//
//   create-lobby   POST /api/create-lobby
//   join-lobby     POST /api/join-lobby?lobbyId=<id>
//   make-move      POST /api/make-move?from=<n|-1>&to=<n>
//   leave-lobby    POST /api/leave-lobby
//
// In `MoveRequest` an absent source is `None`. The `-1` sentinel exists only
// at this encoding boundary, for byte compatibility with the existing
// authority; decoding accepts the sentinel or a missing `from` alike.
//
// `Command::to_url` is used by the client's gateway, `Command::from_url` by
// servers (the test authority). Keeping both directions here makes them
// impossible to drift apart.

use std::fmt;

use thiserror::Error;
use url::Url;

use crate::types::{LobbyId, Position};

/// Query value standing for "no source position" on the wire.
pub const ABSENT_FROM: i64 = -1;

const CREATE_LOBBY_PATH: &str = "/api/create-lobby";
const JOIN_LOBBY_PATH: &str = "/api/join-lobby";
const MAKE_MOVE_PATH: &str = "/api/make-move";
const LEAVE_LOBBY_PATH: &str = "/api/leave-lobby";

/// A move submission. `from` is `None` for placements.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MoveRequest {
    pub from: Option<Position>,
    pub to: Position,
}

impl MoveRequest {
    pub fn place(to: Position) -> Self {
        Self { from: None, to }
    }

    pub fn relocate(from: Position, to: Position) -> Self {
        Self {
            from: Some(from),
            to,
        }
    }
}

/// The four request/response operations the client can issue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    CreateLobby,
    JoinLobby { lobby_id: LobbyId },
    MakeMove(MoveRequest),
    LeaveLobby,
}

/// Which operation a command (or its completion) belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CommandKind {
    CreateLobby,
    JoinLobby,
    MakeMove,
    LeaveLobby,
}

impl CommandKind {
    pub const ALL: [CommandKind; 4] = [
        CommandKind::CreateLobby,
        CommandKind::JoinLobby,
        CommandKind::MakeMove,
        CommandKind::LeaveLobby,
    ];

    pub fn path(self) -> &'static str {
        match self {
            CommandKind::CreateLobby => CREATE_LOBBY_PATH,
            CommandKind::JoinLobby => JOIN_LOBBY_PATH,
            CommandKind::MakeMove => MAKE_MOVE_PATH,
            CommandKind::LeaveLobby => LEAVE_LOBBY_PATH,
        }
    }

    fn from_path(path: &str) -> Option<CommandKind> {
        CommandKind::ALL.into_iter().find(|kind| kind.path() == path)
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CommandKind::CreateLobby => "create-lobby",
            CommandKind::JoinLobby => "join-lobby",
            CommandKind::MakeMove => "make-move",
            CommandKind::LeaveLobby => "leave-lobby",
        })
    }
}

/// Why a request URL could not be decoded into a `Command`.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unknown command path `{0}`")]
    UnknownPath(String),
    #[error("missing `{0}` parameter")]
    MissingParameter(&'static str),
    #[error("`{name}` must be an integer between 0 and 8, got `{value}`")]
    InvalidPosition { name: &'static str, value: String },
    #[error("lobby id must not be empty")]
    EmptyLobbyId,
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::CreateLobby => CommandKind::CreateLobby,
            Command::JoinLobby { .. } => CommandKind::JoinLobby,
            Command::MakeMove(_) => CommandKind::MakeMove,
            Command::LeaveLobby => CommandKind::LeaveLobby,
        }
    }

    /// HTTP method used for every command.
    pub fn method(&self) -> &'static str {
        "POST"
    }

    /// Query parameters in wire order.
    pub fn query(&self) -> Vec<(&'static str, String)> {
        match self {
            Command::CreateLobby | Command::LeaveLobby => Vec::new(),
            Command::JoinLobby { lobby_id } => vec![("lobbyId", lobby_id.as_str().to_string())],
            Command::MakeMove(request) => {
                let from = request
                    .from
                    .map_or(ABSENT_FROM, |from| from.index() as i64);
                vec![("from", from.to_string()), ("to", request.to.to_string())]
            }
        }
    }

    /// Full request URL under `api_base` (scheme, host and port are kept,
    /// path and query are replaced).
    pub fn to_url(&self, api_base: &Url) -> Url {
        let mut url = api_base.clone();
        url.set_path(self.kind().path());
        url.set_query(None);
        let query = self.query();
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        url
    }

    /// Decode a request URL. Only the path and query are inspected.
    pub fn from_url(url: &Url) -> Result<Command, CommandError> {
        let kind = CommandKind::from_path(url.path())
            .ok_or_else(|| CommandError::UnknownPath(url.path().to_string()))?;
        let param = |name: &str| {
            url.query_pairs()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.into_owned())
        };

        match kind {
            CommandKind::CreateLobby => Ok(Command::CreateLobby),
            CommandKind::LeaveLobby => Ok(Command::LeaveLobby),
            CommandKind::JoinLobby => {
                let raw = param("lobbyId").ok_or(CommandError::MissingParameter("lobbyId"))?;
                let lobby_id = LobbyId::new(raw).ok_or(CommandError::EmptyLobbyId)?;
                Ok(Command::JoinLobby { lobby_id })
            }
            CommandKind::MakeMove => {
                let to = param("to").ok_or(CommandError::MissingParameter("to"))?;
                let to = parse_position("to", &to)?;
                let from = match param("from") {
                    None => None,
                    Some(raw) if raw.trim().parse::<i64>() == Ok(ABSENT_FROM) => None,
                    Some(raw) => Some(parse_position("from", &raw)?),
                };
                Ok(Command::MakeMove(MoveRequest { from, to }))
            }
        }
    }
}

fn parse_position(name: &'static str, raw: &str) -> Result<Position, CommandError> {
    raw.trim()
        .parse::<usize>()
        .ok()
        .and_then(Position::new)
        .ok_or_else(|| CommandError::InvalidPosition {
            name,
            value: raw.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("http://localhost:8080").unwrap()
    }

    fn pos(index: usize) -> Position {
        Position::new(index).unwrap()
    }

    #[test]
    fn placement_encodes_absent_source_as_sentinel() {
        let url = Command::MakeMove(MoveRequest::place(pos(4))).to_url(&base());
        assert_eq!(url.as_str(), "http://localhost:8080/api/make-move?from=-1&to=4");
    }

    #[test]
    fn relocation_encodes_both_positions() {
        let url = Command::MakeMove(MoveRequest::relocate(pos(2), pos(5))).to_url(&base());
        assert_eq!(url.as_str(), "http://localhost:8080/api/make-move?from=2&to=5");
    }

    #[test]
    fn commands_without_arguments_have_no_query() {
        let url = Command::CreateLobby.to_url(&base());
        assert_eq!(url.as_str(), "http://localhost:8080/api/create-lobby");
        assert_eq!(url.query(), None);

        let with_stale_query = Url::parse("http://localhost:8080/app?x=1").unwrap();
        let url = Command::LeaveLobby.to_url(&with_stale_query);
        assert_eq!(url.as_str(), "http://localhost:8080/api/leave-lobby");
    }

    #[test]
    fn join_escapes_lobby_id() {
        let lobby_id = LobbyId::new("a b&c").unwrap();
        let command = Command::JoinLobby { lobby_id };
        let url = command.to_url(&base());
        assert_eq!(url.query(), Some("lobbyId=a+b%26c"));
        assert_eq!(Command::from_url(&url).unwrap(), command);
    }

    #[test]
    fn decode_treats_missing_or_sentinel_source_as_placement() {
        let sentinel = Url::parse("http://x/api/make-move?from=-1&to=3").unwrap();
        let missing = Url::parse("http://x/api/make-move?to=3").unwrap();
        let expected = Command::MakeMove(MoveRequest::place(pos(3)));
        assert_eq!(Command::from_url(&sentinel).unwrap(), expected);
        assert_eq!(Command::from_url(&missing).unwrap(), expected);
    }

    #[test]
    fn decode_rejects_bad_requests() {
        let decode = |raw: &str| Command::from_url(&Url::parse(raw).unwrap()).unwrap_err();

        assert_eq!(
            decode("http://x/api/teleport"),
            CommandError::UnknownPath("/api/teleport".into())
        );
        assert_eq!(
            decode("http://x/api/make-move?from=1"),
            CommandError::MissingParameter("to")
        );
        assert!(matches!(
            decode("http://x/api/make-move?to=9"),
            CommandError::InvalidPosition { name: "to", .. }
        ));
        assert!(matches!(
            decode("http://x/api/make-move?from=-2&to=1"),
            CommandError::InvalidPosition { name: "from", .. }
        ));
        assert_eq!(
            decode("http://x/api/join-lobby"),
            CommandError::MissingParameter("lobbyId")
        );
        assert_eq!(
            decode("http://x/api/join-lobby?lobbyId=%20"),
            CommandError::EmptyLobbyId
        );
    }

    #[test]
    fn every_kind_has_a_distinct_path() {
        for kind in CommandKind::ALL {
            assert_eq!(CommandKind::from_path(kind.path()), Some(kind));
        }
    }
}
