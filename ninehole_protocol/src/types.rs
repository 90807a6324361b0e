// Core value types for the Nine Holes wire protocol.
//
// These are the small enums and newtypes that `message.rs` (pushed game
// snapshots) and `command.rs` (outbound requests) are built from. Spellings
// match the authority's JSON exactly (`"PLAYER_1"`, `"GAME_OVER"`, ...), so
// every type here round-trips against the existing server without adapters.
//
// `Position` and `LobbyId` are validated at construction: a `Position` is
// always a real board index and a `LobbyId` is never empty. Anything that
// holds one can skip re-checking.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of cells on the board: the center hole plus a ring of eight.
pub const BOARD_SIZE: usize = 9;

/// Game phase as reported by the authority.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// Pieces are being placed; moves have no source position.
    Setup,
    /// Normal turn play; moves go from one position to another.
    Playing,
    /// Terminal. `Game::turn` names the winner.
    GameOver,
}

/// One of the two seats in a lobby.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Player {
    #[serde(rename = "PLAYER_1")]
    Player1,
    #[serde(rename = "PLAYER_2")]
    Player2,
}

impl Player {
    pub fn opponent(self) -> Player {
        match self {
            Player::Player1 => Player::Player2,
            Player::Player2 => Player::Player1,
        }
    }
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Player::Player1 => f.write_str("Player 1"),
            Player::Player2 => f.write_str("Player 2"),
        }
    }
}

/// Contents of a single board cell.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cell {
    #[serde(rename = "PLAYER_1")]
    Player1,
    #[serde(rename = "PLAYER_2")]
    Player2,
    #[default]
    #[serde(rename = "EMPTY")]
    Empty,
}

impl Cell {
    pub fn is_empty(self) -> bool {
        self == Cell::Empty
    }

    pub fn owner(self) -> Option<Player> {
        match self {
            Cell::Player1 => Some(Player::Player1),
            Cell::Player2 => Some(Player::Player2),
            Cell::Empty => None,
        }
    }
}

impl From<Player> for Cell {
    fn from(player: Player) -> Self {
        match player {
            Player::Player1 => Cell::Player1,
            Player::Player2 => Cell::Player2,
        }
    }
}

/// A board index in `0..BOARD_SIZE`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Position(u8);

impl Position {
    /// The center hole.
    pub const CENTER: Position = Position(0);

    /// Returns `None` if `index` is not on the board.
    pub fn new(index: usize) -> Option<Position> {
        if index < BOARD_SIZE {
            u8::try_from(index).ok().map(Position)
        } else {
            None
        }
    }

    pub fn index(self) -> usize {
        usize::from(self.0)
    }

    /// All positions in index order.
    pub fn all() -> impl Iterator<Item = Position> {
        (0..BOARD_SIZE).filter_map(Position::new)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque lobby identifier issued by the authority on lobby creation.
///
/// The client never interprets the contents. It is shown to the user, put
/// into share links, and sent back verbatim when joining.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LobbyId(String);

impl LobbyId {
    /// Trims surrounding whitespace. Returns `None` if nothing is left.
    pub fn new(raw: impl AsRef<str>) -> Option<LobbyId> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(LobbyId(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LobbyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
