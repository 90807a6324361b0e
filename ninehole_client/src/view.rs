// Presentation view-model derived from controller state.
//
// The front-end draws one of five screens. Choosing between them is pure
// logic over the controller, so it lives here where it can be tested, and
// front-ends only render the variant they are handed. Precedence: connection
// state first (a dead channel shows the reload prompt in every phase), then
// lobby membership, then whether the lobby has a game.

use ninehole_protocol::{CommandKind, Game, LobbyId, Position};

use crate::channel::ConnectionStatus;
use crate::error::CommandFailure;
use crate::gateway::CommandGateway;
use crate::session::SessionController;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum View {
    /// Channel handshake not finished.
    Loading,
    /// Channel closed (`reason: None`) or failed. Terminal; the user has to
    /// restart the client.
    Disconnected { reason: Option<String> },
    MainMenu {
        /// False while a create or join is in flight.
        controls_enabled: bool,
        /// Pre-filled lobby id from a share link.
        join_link: Option<LobbyId>,
        create_error: Option<CommandFailure>,
        join_error: Option<CommandFailure>,
    },
    /// In a lobby that has no game yet: waiting for an opponent.
    Waiting {
        lobby_id: LobbyId,
        leaving: bool,
        leave_error: Option<CommandFailure>,
    },
    InGame {
        lobby_id: LobbyId,
        game: Game,
        active_position: Option<Position>,
        move_error: Option<CommandFailure>,
        /// A move is in flight; the board is disabled.
        submitting: bool,
        leaving: bool,
        leave_error: Option<CommandFailure>,
    },
}

impl View {
    pub fn of<G: CommandGateway>(session: &SessionController<G>) -> View {
        match session.connection() {
            ConnectionStatus::Loading => return View::Loading,
            ConnectionStatus::Closed => return View::Disconnected { reason: None },
            ConnectionStatus::Error(detail) => {
                return View::Disconnected {
                    reason: Some(detail.clone()),
                };
            }
            ConnectionStatus::Connected => {}
        }

        let error = |kind: CommandKind| session.mutation(kind).error().cloned();
        let leave = session.mutation(CommandKind::LeaveLobby);

        let Some(lobby_id) = session.lobby_id().cloned() else {
            return View::MainMenu {
                controls_enabled: !session.lobby_request_pending(),
                join_link: session.join_link().cloned(),
                create_error: error(CommandKind::CreateLobby),
                join_error: error(CommandKind::JoinLobby),
            };
        };

        match session.game() {
            None => View::Waiting {
                lobby_id,
                leaving: leave.is_pending(),
                leave_error: leave.error().cloned(),
            },
            Some(game) => View::InGame {
                lobby_id,
                game: game.clone(),
                active_position: session.active_position(),
                move_error: error(CommandKind::MakeMove),
                submitting: session.mutation(CommandKind::MakeMove).is_pending(),
                leaving: leave.is_pending(),
                leave_error: leave.error().cloned(),
            },
        }
    }

    /// The channel is gone; nothing further will change.
    pub fn is_terminal(&self) -> bool {
        matches!(self, View::Disconnected { .. })
    }
}
