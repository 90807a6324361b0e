// ninehole_protocol — wire protocol between Nine Holes clients and the
// game authority.
//
// The authority owns the game: it validates moves, advances turns and pushes
// full snapshots to both participants. This crate defines what crosses the
// wire in both directions and nothing else. It has no transport code, so the
// client (`ninehole_client`) and any server (the test authority in
// `multiplayer_tests`) share one definition.
//
// Module overview:
// - `types.rs`:    Value types: `Phase`, `Player`, `Cell`, `Position`,
//                  `LobbyId`. Serde spellings match the authority's JSON.
// - `message.rs`:  `Game` snapshots and `NotificationEvent`, the tagged
//                  union pushed over the notification channel.
// - `command.rs`:  The four outbound commands (`Command`, `MoveRequest`,
//                  `CommandKind`) and their request-URL encoding.
//
// Design decisions:
// - **JSON for pushes, query strings for commands.** Both are dictated by the
//   existing authority; nothing here is negotiable without a server change.
// - **Snapshots, never patches.** `Game` is always complete, so the client
//   can replace its mirror wholesale and never merges state.

pub mod command;
pub mod message;
pub mod types;

pub use command::{ABSENT_FROM, Command, CommandError, CommandKind, MoveRequest};
pub use message::{Board, Game, NotificationEvent};
pub use types::{BOARD_SIZE, Cell, LobbyId, Phase, Player, Position};
