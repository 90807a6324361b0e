// ninehole_client — session synchronization engine for Nine Holes.
//
// Two players meet in a lobby on a remote authority and play on a nine-point
// board. The authority owns the game; this crate keeps one participant's view
// of it consistent while merging two independently timed sources: pushed
// notifications on a long-lived WebSocket, and completions of request/response
// commands over HTTP.
//
// Module overview:
// - `channel.rs`:  `ConnectionChannel`, the WebSocket with a reader thread,
//                  and `ConnectionStatus` with its forward-only lifecycle.
// - `gateway.rs`:  `CommandGateway` trait and `HttpGateway`; completions are
//                  posted back as events.
// - `event.rs`:    `ClientEvent`, the single queue both sources feed.
// - `store.rs`:    `GameStateStore`, the mirrored snapshot.
// - `selector.rs`: `MoveSelector`, two-phase from/to input.
// - `mutation.rs`: Per-command pending/settled status.
// - `session.rs`:  `SessionController`, lifecycle and reconciliation. The
//                  only writer of the store and the selector.
// - `view.rs`:     `View`, which screen to draw, derived from the controller.
// - `client.rs`:   `GameClient`, wiring for a real session.
// - `config.rs`:   `ClientConfig`, resolved from flags and environment.
// - `error.rs`:    Error enums.
//
// The `ninehole` binary (`main.rs`) is a terminal front-end over `GameClient`.

pub mod channel;
pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod gateway;
pub mod mutation;
pub mod selector;
pub mod session;
pub mod store;
pub mod view;

pub use channel::{ConnectionChannel, ConnectionStatus};
pub use client::GameClient;
pub use config::ClientConfig;
pub use error::{ChannelError, CommandFailure, ConfigError, SessionError};
pub use event::{ChannelEvent, ClientEvent};
pub use gateway::{CommandGateway, Completion, HttpGateway, RequestId};
pub use session::{SessionController, SessionPhase};
pub use view::View;
