// Messages pushed by the authority over the notification channel.
//
// The authority sends one JSON object per event:
//
//   {"Event": "GAME_UPDATE",   "Game": {"State": ..., "Turn": ..., "Board": [...]}}
//   {"Event": "OPPONENT_LEFT", "Game": null}
//
// `Game` is always a full snapshot, never a patch. `NotificationEvent` is the
// typed view of one message; it goes through a private mirror struct
// (`RawEvent`) so the tag/payload pairing is checked in one place: a
// GAME_UPDATE without a game is a parse error rather than a silent `None`.

use serde::{Deserialize, Serialize};

use crate::types::{BOARD_SIZE, Cell, Phase, Player, Position};

/// The nine cells of the board, indexed by `Position`.
pub type Board = [Cell; BOARD_SIZE];

/// Authoritative game snapshot. The client only mirrors it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    #[serde(rename = "State")]
    pub phase: Phase,
    /// Whose move is expected next. Once the game is over, the winner.
    #[serde(rename = "Turn")]
    pub turn: Player,
    #[serde(rename = "Board")]
    pub board: Board,
}

impl Game {
    /// Fresh game as the authority creates it when the second player joins.
    pub fn new() -> Self {
        Self {
            phase: Phase::Setup,
            turn: Player::Player1,
            board: [Cell::Empty; BOARD_SIZE],
        }
    }

    pub fn cell(&self, position: Position) -> Cell {
        self.board[position.index()]
    }

    pub fn empty_cells(&self) -> usize {
        self.board.iter().filter(|cell| cell.is_empty()).count()
    }

    /// The winning player, if the game is over.
    pub fn winner(&self) -> Option<Player> {
        match self.phase {
            Phase::GameOver => Some(self.turn),
            Phase::Setup | Phase::Playing => None,
        }
    }
}

impl Default for Game {
    fn default() -> Self {
        Self::new()
    }
}

/// One event received on the notification channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawEvent", into = "RawEvent")]
pub enum NotificationEvent {
    /// Replace the mirrored game with this snapshot.
    GameUpdate(Game),
    /// The other participant left; the lobby has no game any more.
    OpponentLeft,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
enum EventKind {
    #[serde(rename = "GAME_UPDATE")]
    GameUpdate,
    #[serde(rename = "OPPONENT_LEFT")]
    OpponentLeft,
}

/// Field-for-field mirror of the authority's message.
#[derive(Serialize, Deserialize)]
struct RawEvent {
    #[serde(rename = "Event")]
    event: EventKind,
    #[serde(rename = "Game", default)]
    game: Option<Game>,
}

impl TryFrom<RawEvent> for NotificationEvent {
    type Error = String;

    fn try_from(raw: RawEvent) -> Result<Self, Self::Error> {
        match (raw.event, raw.game) {
            (EventKind::GameUpdate, Some(game)) => Ok(NotificationEvent::GameUpdate(game)),
            (EventKind::GameUpdate, None) => Err("GAME_UPDATE event carries no game".into()),
            // The authority sends `"Game": null` here; a stale game is ignored.
            (EventKind::OpponentLeft, _) => Ok(NotificationEvent::OpponentLeft),
        }
    }
}

impl From<NotificationEvent> for RawEvent {
    fn from(event: NotificationEvent) -> Self {
        match event {
            NotificationEvent::GameUpdate(game) => RawEvent {
                event: EventKind::GameUpdate,
                game: Some(game),
            },
            NotificationEvent::OpponentLeft => RawEvent {
                event: EventKind::OpponentLeft,
                game: None,
            },
        }
    }
}
