// Mirror of the authority's game: the last snapshot and the last event.
//
// Only the session controller writes here (`apply`/`clear` are crate-private),
// and only pushed notifications ever put board content in. Command successes
// never touch the store, which is what keeps the two event sources from
// producing competing boards.

use ninehole_protocol::{Game, NotificationEvent};

#[derive(Debug, Default)]
pub struct GameStateStore {
    current: Option<Game>,
    last_event: Option<NotificationEvent>,
    /// Bumped on every change of `current`.
    revision: u64,
}

impl GameStateStore {
    pub fn current(&self) -> Option<&Game> {
        self.current.as_ref()
    }

    pub fn last_event(&self) -> Option<&NotificationEvent> {
        self.last_event.as_ref()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Apply one pushed event. Returns whether `current` changed.
    ///
    /// Every `GameUpdate` counts as a change, even one equal to the snapshot
    /// already held: the authority re-broadcasts after each accepted move, and
    /// that is the signal that clears local selection.
    pub(crate) fn apply(&mut self, event: NotificationEvent) -> bool {
        let changed = match &event {
            NotificationEvent::GameUpdate(game) => {
                self.current = Some(game.clone());
                true
            }
            NotificationEvent::OpponentLeft => self.current.take().is_some(),
        };
        self.last_event = Some(event);
        if changed {
            self.revision += 1;
        }
        changed
    }

    /// Drop the mirrored game (leaving a lobby).
    pub(crate) fn clear(&mut self) -> bool {
        self.last_event = None;
        if self.current.take().is_some() {
            self.revision += 1;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ninehole_protocol::{Cell, Phase};

    fn game(marker: usize) -> Game {
        let mut game = Game::new();
        game.board[marker] = Cell::Player1;
        game
    }

    /// Every sequence of up to four events over a small alphabet.
    fn sequences() -> Vec<Vec<NotificationEvent>> {
        let alphabet = [
            NotificationEvent::GameUpdate(game(0)),
            NotificationEvent::GameUpdate(game(1)),
            NotificationEvent::OpponentLeft,
        ];
        let mut all = vec![Vec::new()];
        let mut frontier = vec![Vec::new()];
        for _ in 0..4 {
            let mut next = Vec::new();
            for prefix in &frontier {
                for event in &alphabet {
                    let mut seq: Vec<NotificationEvent> = prefix.clone();
                    seq.push(event.clone());
                    next.push(seq);
                }
            }
            all.extend(next.iter().cloned());
            frontier = next;
        }
        all
    }

    #[test]
    fn current_is_last_update_unless_opponent_left_after_it() {
        for seq in sequences() {
            let mut store = GameStateStore::default();
            for event in &seq {
                store.apply(event.clone());
            }
            let expected = match seq.last() {
                Some(NotificationEvent::GameUpdate(game)) => Some(game),
                Some(NotificationEvent::OpponentLeft) | None => None,
            };
            assert_eq!(store.current(), expected, "sequence {seq:?}");
            assert_eq!(store.last_event(), seq.last());
        }
    }

    #[test]
    fn revision_counts_changes() {
        let mut store = GameStateStore::default();
        assert!(!store.apply(NotificationEvent::OpponentLeft));
        assert_eq!(store.revision(), 0);

        assert!(store.apply(NotificationEvent::GameUpdate(game(0))));
        assert!(store.apply(NotificationEvent::GameUpdate(game(0))));
        assert_eq!(store.revision(), 2);

        assert!(store.apply(NotificationEvent::OpponentLeft));
        assert!(!store.apply(NotificationEvent::OpponentLeft));
        assert_eq!(store.revision(), 3);
    }

    #[test]
    fn clear_drops_game() {
        let mut store = GameStateStore::default();
        let mut playing = Game::new();
        playing.phase = Phase::Playing;
        store.apply(NotificationEvent::GameUpdate(playing));
        assert!(store.clear());
        assert_eq!(store.current(), None);
        assert_eq!(store.last_event(), None);
        assert!(!store.clear());
    }
}
