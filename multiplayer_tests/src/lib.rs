// Test harness for end-to-end Nine Holes sessions.
//
// `authority.rs` runs an in-process game authority on loopback ports.
// `TestPlayer` wraps a real `GameClient` pointed at it and adds blocking
// polling wrappers, so scenarios read as a sequence of player actions and
// expected screens. Everything between the wrapper and the authority (the
// WebSocket channel, the HTTP gateway, the session controller) is the same
// code the `ninehole` binary runs.
//
// See also: `tests/full_pipeline.rs` for the scenarios.

pub mod authority;

use std::time::{Duration, Instant};

use ninehole_client::{ClientConfig, GameClient, HttpGateway, SessionController, View};
use ninehole_protocol::{Game, LobbyId};

use crate::authority::FakeAuthority;

/// Default timeout for blocking poll operations.
pub const POLL_TIMEOUT: Duration = Duration::from_secs(5);

/// How long each poll blocks on the client's event queue.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

pub struct TestPlayer {
    client: GameClient,
}

impl TestPlayer {
    /// Start a client against `authority` and wait for the main menu.
    pub fn connect(authority: &FakeAuthority) -> Self {
        Self::start(authority.client_config())
    }

    /// Like `connect`, but arriving through a share link for `lobby_id`.
    pub fn connect_with_link(authority: &FakeAuthority, lobby_id: &LobbyId) -> Self {
        let link = authority.client_config().share_link(lobby_id);
        let config = authority
            .client_config()
            .with_join_link(link.as_str())
            .expect("share link should parse");
        Self::start(config)
    }

    fn start(config: ClientConfig) -> Self {
        let mut player = Self {
            client: GameClient::start(config),
        };
        player.poll_until("channel connected", |view| !matches!(view, View::Loading));
        player
    }

    pub fn identity(&self) -> String {
        self.client
            .identity()
            .expect("authority should issue an identity")
            .to_string()
    }

    pub fn view(&self) -> View {
        self.client.view()
    }

    pub fn controller(&self) -> &SessionController<HttpGateway> {
        self.client.controller()
    }

    pub fn controller_mut(&mut self) -> &mut SessionController<HttpGateway> {
        self.client.controller_mut()
    }

    /// Create a lobby and wait until it is shown as waiting for an opponent.
    pub fn create_lobby(&mut self) -> LobbyId {
        self.controller_mut()
            .create_lobby()
            .expect("create_lobby precondition failed");
        match self.poll_until("lobby created", |view| matches!(view, View::Waiting { .. })) {
            View::Waiting { lobby_id, .. } => lobby_id,
            other => panic!("unexpected view {other:?}"),
        }
    }

    /// Join `lobby_id` and wait for the opening snapshot.
    pub fn join_lobby(&mut self, lobby_id: &LobbyId) -> Game {
        self.controller_mut()
            .join_lobby(lobby_id.as_str())
            .expect("join_lobby precondition failed");
        self.poll_until_game("joined game")
    }

    /// Click a board position. Preconditions must hold.
    pub fn click(&mut self, index: usize) {
        self.controller_mut()
            .click(index)
            .unwrap_or_else(|e| panic!("click({index}) rejected locally: {e}"));
    }

    /// Wait until the session shows a game satisfying `accept`.
    pub fn poll_until_game_matches(&mut self, what: &str, accept: impl Fn(&Game) -> bool) -> Game {
        let view = self.poll_until(what, |view| match view {
            View::InGame { game, .. } => accept(game),
            _ => false,
        });
        match view {
            View::InGame { game, .. } => game,
            other => panic!("unexpected view {other:?}"),
        }
    }

    pub fn poll_until_game(&mut self, what: &str) -> Game {
        self.poll_until_game_matches(what, |_| true)
    }

    /// Wait until no move is in flight and return the view.
    pub fn poll_until_move_settled(&mut self) -> View {
        self.poll_until("move settled", |view| {
            matches!(view, View::InGame { submitting: false, .. })
        })
    }

    /// Pump events until `accept` holds for the current view. Panics after
    /// `POLL_TIMEOUT`.
    pub fn poll_until(&mut self, what: &str, accept: impl Fn(&View) -> bool) -> View {
        let start = Instant::now();
        loop {
            let view = self.client.view();
            if accept(&view) {
                return view;
            }
            assert!(
                start.elapsed() < POLL_TIMEOUT,
                "timed out waiting for {what}; last view: {view:?}"
            );
            self.client.wait(POLL_INTERVAL);
        }
    }

    /// Keep pumping for `duration` and return the final view.
    pub fn settle_for(&mut self, duration: Duration) -> View {
        let start = Instant::now();
        while start.elapsed() < duration {
            self.client.wait(POLL_INTERVAL);
        }
        self.client.view()
    }
}

impl Drop for TestPlayer {
    fn drop(&mut self) {
        self.client.shutdown();
    }
}
