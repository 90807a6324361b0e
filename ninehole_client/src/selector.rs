// Two-phase move selection over board positions.
//
// "Click a position" is the only input, but it means two different things:
// - Outside PLAYING (placement during SETUP, or GAME_OVER), a click is a
//   complete placement `{to}` and the selector stays idle.
// - In PLAYING, the first click arms a source position and the second submits
//   `{from, to}` and disarms.
//
// No legality checks happen here: same-position moves, foreign pieces and
// clicks after game over all go to the authority, which rejects them. The
// controller resets the selector whenever the board changes or a submission
// fails.

use ninehole_protocol::{MoveRequest, Phase, Position};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Selection {
    #[default]
    Idle,
    Armed(Position),
}

/// What a click produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClickOutcome {
    /// A source was selected; nothing to send yet.
    Armed(Position),
    /// A complete move ready to submit.
    Submit(MoveRequest),
}

#[derive(Debug, Default)]
pub struct MoveSelector {
    selection: Selection,
}

impl MoveSelector {
    pub fn selection(&self) -> Selection {
        self.selection
    }

    pub fn active_position(&self) -> Option<Position> {
        match self.selection {
            Selection::Idle => None,
            Selection::Armed(position) => Some(position),
        }
    }

    pub fn click(&mut self, phase: Phase, position: Position) -> ClickOutcome {
        match (phase, self.selection) {
            (Phase::Playing, Selection::Idle) => {
                self.selection = Selection::Armed(position);
                ClickOutcome::Armed(position)
            }
            (Phase::Playing, Selection::Armed(from)) => {
                self.selection = Selection::Idle;
                ClickOutcome::Submit(MoveRequest::relocate(from, position))
            }
            (Phase::Setup | Phase::GameOver, _) => {
                self.selection = Selection::Idle;
                ClickOutcome::Submit(MoveRequest::place(position))
            }
        }
    }

    /// Back to idle. Returns whether a selection was dropped.
    pub fn reset(&mut self) -> bool {
        std::mem::take(&mut self.selection) != Selection::Idle
    }
}
