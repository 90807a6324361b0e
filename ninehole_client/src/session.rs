// Session controller: lobby lifecycle, input, and reconciliation.
//
// `SessionController` is the one place where the two event sources meet. It
// owns the game mirror (`GameStateStore`), the two-phase input
// (`MoveSelector`), one `Mutation` per command kind, and the lobby identity.
// Everything else reads it. All mutation happens through `&mut self` methods
// called from a single thread (the `GameClient` pump, or a test), so nothing
// here locks.
//
// Lifecycle: MAIN_MENU --create/join ok--> IN_LOBBY --leave ok--> MAIN_MENU.
// The phase is not stored separately; the session is in a lobby exactly when
// it holds a lobby id.
//
// Reconciliation rules:
// - Only pushed notifications change the board. A command succeeding changes
//   mutation status and lifecycle, never the game.
// - Any change to the mirrored game resets the selector and clears a settled
//   move error. A move still in flight stays pending.
// - A failed move resets the selector.
// - After the channel reaches CLOSED or ERROR, notifications are dropped.
// - In MAIN_MENU with no join pending, notifications belong to a lobby
//   already left and are dropped. While a join is pending they are kept: the
//   authority broadcasts the opening snapshot before it answers the join.
//
// Preconditions are checked before dispatch and reported as `SessionError`;
// nothing is sent when one fails.
//
// Auto-join: a lobby id supplied from outside (a share link) is joined
// automatically, at most once per id, and only while CONNECTED in MAIN_MENU
// with no create/join pending. It is attempted at construction, on the
// transition to CONNECTED, and when a link is offered later.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use ninehole_protocol::{Command, CommandKind, Game, LobbyId, NotificationEvent, Position};

use crate::channel::ConnectionStatus;
use crate::error::{CommandFailure, SessionError};
use crate::event::{ChannelEvent, ClientEvent};
use crate::gateway::{CommandGateway, Completion, RequestId};
use crate::mutation::Mutation;
use crate::selector::{ClickOutcome, MoveSelector, Selection};
use crate::store::GameStateStore;
use crate::view::View;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionPhase {
    MainMenu,
    InLobby,
}

pub struct SessionController<G> {
    gateway: G,
    connection: ConnectionStatus,
    /// Set exactly while in a lobby.
    lobby_id: Option<LobbyId>,
    store: GameStateStore,
    selector: MoveSelector,
    create: Mutation,
    join: Mutation,
    make_move: Mutation,
    leave: Mutation,
    /// Lobby id supplied from outside, for auto-join.
    join_link: Option<LobbyId>,
    auto_joined: HashSet<LobbyId>,
    /// Target of the join in flight.
    pending_join: Option<LobbyId>,
    next_request: u64,
    revision: u64,
}

impl<G: CommandGateway> SessionController<G> {
    /// `connection` is the channel's status at construction (normally the
    /// outcome of `ConnectionChannel::open`).
    pub fn new(gateway: G, connection: ConnectionStatus, join_link: Option<LobbyId>) -> Self {
        let mut session = Self {
            gateway,
            connection,
            lobby_id: None,
            store: GameStateStore::default(),
            selector: MoveSelector::default(),
            create: Mutation::default(),
            join: Mutation::default(),
            make_move: Mutation::default(),
            leave: Mutation::default(),
            join_link,
            auto_joined: HashSet::new(),
            pending_join: None,
            next_request: 0,
            revision: 0,
        };
        session.try_auto_join();
        session
    }

    // -- Observation --

    pub fn connection(&self) -> &ConnectionStatus {
        &self.connection
    }

    pub fn phase(&self) -> SessionPhase {
        if self.lobby_id.is_some() {
            SessionPhase::InLobby
        } else {
            SessionPhase::MainMenu
        }
    }

    pub fn lobby_id(&self) -> Option<&LobbyId> {
        self.lobby_id.as_ref()
    }

    pub fn join_link(&self) -> Option<&LobbyId> {
        self.join_link.as_ref()
    }

    pub fn game(&self) -> Option<&Game> {
        self.store.current()
    }

    pub fn store(&self) -> &GameStateStore {
        &self.store
    }

    pub fn selection(&self) -> Selection {
        self.selector.selection()
    }

    pub fn active_position(&self) -> Option<Position> {
        self.selector.active_position()
    }

    pub fn mutation(&self, kind: CommandKind) -> &Mutation {
        match kind {
            CommandKind::CreateLobby => &self.create,
            CommandKind::JoinLobby => &self.join,
            CommandKind::MakeMove => &self.make_move,
            CommandKind::LeaveLobby => &self.leave,
        }
    }

    /// True while the main-menu controls must stay disabled.
    pub fn lobby_request_pending(&self) -> bool {
        self.create.is_pending() || self.join.is_pending()
    }

    /// Increases on every observable change.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn view(&self) -> View {
        View::of(self)
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn gateway_mut(&mut self) -> &mut G {
        &mut self.gateway
    }

    // -- Operations --

    pub fn create_lobby(&mut self) -> Result<RequestId, SessionError> {
        self.check_menu_controls()?;
        Ok(self.dispatch(Command::CreateLobby))
    }

    /// Join a lobby by the id the user typed or pasted.
    pub fn join_lobby(&mut self, lobby_id: &str) -> Result<RequestId, SessionError> {
        self.check_menu_controls()?;
        let lobby_id = LobbyId::new(lobby_id).ok_or(SessionError::EmptyLobbyId)?;
        Ok(self.dispatch_join(lobby_id))
    }

    /// The single board input. Returns what the click did; a completed
    /// selection has already been dispatched when this returns.
    pub fn click(&mut self, index: usize) -> Result<ClickOutcome, SessionError> {
        let position = Position::new(index).ok_or(SessionError::InvalidPosition(index))?;
        self.check_channel()?;
        if self.lobby_id.is_none() {
            return Err(SessionError::NotInLobby);
        }
        let phase = self.store.current().ok_or(SessionError::NoGame)?.phase;
        if self.make_move.is_pending() {
            debug!(%position, "click ignored, move pending");
            return Err(SessionError::MovePending);
        }

        let outcome = self.selector.click(phase, position);
        match outcome {
            ClickOutcome::Armed(from) => {
                debug!(%from, "source selected");
                self.bump();
            }
            ClickOutcome::Submit(request) => {
                self.dispatch(Command::MakeMove(request));
            }
        }
        Ok(outcome)
    }

    pub fn leave_lobby(&mut self) -> Result<RequestId, SessionError> {
        self.check_channel()?;
        if self.lobby_id.is_none() {
            return Err(SessionError::NotInLobby);
        }
        if self.leave.is_pending() {
            return Err(SessionError::Pending(CommandKind::LeaveLobby));
        }
        Ok(self.dispatch(Command::LeaveLobby))
    }

    /// Supply a lobby id from outside (a share link) after construction.
    pub fn offer_join_link(&mut self, lobby_id: LobbyId) {
        self.join_link = Some(lobby_id);
        self.bump();
        self.try_auto_join();
    }

    /// Process one event from the merged queue.
    pub fn handle(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::Channel(ChannelEvent::Status(status)) => self.on_status(status),
            ClientEvent::Channel(ChannelEvent::Notification(event)) => self.on_notification(event),
            ClientEvent::Completed(completion) => self.on_completion(completion),
        }
    }

    // -- Event handling --

    fn on_status(&mut self, status: ConnectionStatus) {
        if !self.connection.can_transition_to(&status) {
            debug!(from = %self.connection, to = %status, "ignoring status transition");
            return;
        }
        match &status {
            ConnectionStatus::Error(detail) => warn!(%detail, "channel failed"),
            other => info!(status = %other, "channel status changed"),
        }
        self.connection = status;
        self.bump();
        if self.connection == ConnectionStatus::Connected {
            self.try_auto_join();
        }
    }

    fn on_notification(&mut self, event: NotificationEvent) {
        if self.connection.is_terminal() {
            debug!(?event, "notification after channel ended, dropped");
            return;
        }
        // Only a join makes the authority push before we hold a lobby id.
        if self.lobby_id.is_none() && !self.join.is_pending() {
            debug!(?event, "notification outside a lobby, dropped");
            return;
        }
        if self.store.apply(event) {
            self.selector.reset();
            self.make_move.clear_settled();
            self.bump();
        }
    }

    fn on_completion(&mut self, completion: Completion) {
        let Completion {
            request,
            kind,
            result,
        } = completion;
        if !self.mutation(kind).awaits(request) {
            debug!(%kind, %request, "stale completion ignored");
            return;
        }
        match &result {
            Ok(_) => debug!(%kind, %request, "command succeeded"),
            Err(failure) => info!(%kind, %request, %failure, "command failed"),
        }

        match kind {
            CommandKind::CreateLobby => {
                let created = result.and_then(|body| {
                    LobbyId::new(body.trim()).ok_or(CommandFailure::MissingLobbyId)
                });
                match created {
                    Ok(lobby_id) => {
                        self.create.settle(request, Ok(()));
                        self.enter_lobby(lobby_id);
                    }
                    Err(failure) => {
                        self.create.settle(request, Err(failure));
                        self.discard_unclaimed_game();
                    }
                }
            }
            CommandKind::JoinLobby => {
                let target = self.pending_join.take();
                match (result, target) {
                    (Ok(_), Some(lobby_id)) => {
                        self.join.settle(request, Ok(()));
                        self.enter_lobby(lobby_id);
                    }
                    (Ok(_), None) => {
                        warn!(%request, "join succeeded without a target");
                        self.join.settle(request, Ok(()));
                    }
                    (Err(failure), _) => {
                        self.join.settle(request, Err(failure));
                        self.discard_unclaimed_game();
                    }
                }
            }
            CommandKind::MakeMove => {
                let failed = result.is_err();
                self.make_move.settle(request, result.map(drop));
                if failed {
                    self.selector.reset();
                }
            }
            CommandKind::LeaveLobby => {
                let left = result.is_ok();
                self.leave.settle(request, result.map(drop));
                if left {
                    if let Some(lobby_id) = self.lobby_id.take() {
                        info!(%lobby_id, "left lobby");
                    }
                    self.store.clear();
                    self.selector.reset();
                    self.make_move.reset();
                }
            }
        }
        self.bump();
    }

    // -- Helpers --

    fn check_channel(&self) -> Result<(), SessionError> {
        match self.connection {
            ConnectionStatus::Connected => Ok(()),
            ConnectionStatus::Loading => Err(SessionError::NotConnected),
            ConnectionStatus::Closed | ConnectionStatus::Error(_) => Err(SessionError::Disconnected),
        }
    }

    /// Shared gate for create and join.
    fn check_menu_controls(&self) -> Result<(), SessionError> {
        self.check_channel()?;
        if self.lobby_id.is_some() {
            return Err(SessionError::AlreadyInLobby);
        }
        if self.create.is_pending() {
            return Err(SessionError::Pending(CommandKind::CreateLobby));
        }
        if self.join.is_pending() {
            return Err(SessionError::Pending(CommandKind::JoinLobby));
        }
        Ok(())
    }

    fn try_auto_join(&mut self) {
        let Some(lobby_id) = self.join_link.clone() else {
            return;
        };
        if self.auto_joined.contains(&lobby_id) || self.check_menu_controls().is_err() {
            return;
        }
        info!(%lobby_id, "auto-joining lobby from link");
        self.auto_joined.insert(lobby_id.clone());
        self.dispatch_join(lobby_id);
    }

    fn dispatch_join(&mut self, lobby_id: LobbyId) -> RequestId {
        self.pending_join = Some(lobby_id.clone());
        self.dispatch(Command::JoinLobby { lobby_id })
    }

    fn dispatch(&mut self, command: Command) -> RequestId {
        let request = RequestId(self.next_request);
        self.next_request += 1;
        let kind = command.kind();
        match kind {
            CommandKind::CreateLobby => self.create.begin(request),
            CommandKind::JoinLobby => self.join.begin(request),
            CommandKind::MakeMove => self.make_move.begin(request),
            CommandKind::LeaveLobby => self.leave.begin(request),
        }
        debug!(%kind, %request, ?command, "dispatching");
        self.gateway.dispatch(request, command);
        self.bump();
        request
    }

    fn enter_lobby(&mut self, lobby_id: LobbyId) {
        info!(%lobby_id, has_game = self.store.current().is_some(), "entered lobby");
        self.lobby_id = Some(lobby_id);
        self.leave.reset();
        self.make_move.reset();
    }

    /// A snapshot kept while a join was pending belongs to no lobby once
    /// that request fails.
    fn discard_unclaimed_game(&mut self) {
        if self.lobby_id.is_none() && !self.join.is_pending() && self.store.clear() {
            self.selector.reset();
        }
    }

    fn bump(&mut self) {
        self.revision += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ninehole_protocol::{Cell, MoveRequest, Phase, Player};

    /// Records dispatched commands; completions are injected by the test.
    #[derive(Default)]
    struct RecordingGateway {
        sent: Vec<(RequestId, Command)>,
    }

    impl CommandGateway for RecordingGateway {
        fn dispatch(&mut self, request: RequestId, command: Command) {
            self.sent.push((request, command));
        }
    }

    fn session(connection: ConnectionStatus) -> SessionController<RecordingGateway> {
        SessionController::new(RecordingGateway::default(), connection, None)
    }

    fn connected() -> SessionController<RecordingGateway> {
        session(ConnectionStatus::Connected)
    }

    fn lobby(raw: &str) -> LobbyId {
        LobbyId::new(raw).unwrap()
    }

    fn pos(index: usize) -> Position {
        Position::new(index).unwrap()
    }

    fn game(phase: Phase, turn: Player) -> Game {
        Game {
            phase,
            turn,
            ..Game::new()
        }
    }

    fn last_sent(session: &SessionController<RecordingGateway>) -> (RequestId, Command) {
        session.gateway().sent.last().cloned().unwrap()
    }

    fn complete(
        session: &mut SessionController<RecordingGateway>,
        request: RequestId,
        kind: CommandKind,
        result: Result<&str, CommandFailure>,
    ) {
        session.handle(ClientEvent::Completed(Completion {
            request,
            kind,
            result: result.map(str::to_string),
        }));
    }

    fn push(session: &mut SessionController<RecordingGateway>, event: NotificationEvent) {
        session.handle(ChannelEvent::Notification(event).into());
    }

    fn status(session: &mut SessionController<RecordingGateway>, status: ConnectionStatus) {
        session.handle(ChannelEvent::Status(status).into());
    }

    /// Connected, in lobby `abc123`, no game yet.
    fn waiting() -> SessionController<RecordingGateway> {
        let mut s = connected();
        let request = s.create_lobby().unwrap();
        complete(&mut s, request, CommandKind::CreateLobby, Ok("abc123"));
        s
    }

    fn in_game(phase: Phase) -> SessionController<RecordingGateway> {
        let mut s = waiting();
        push(&mut s, NotificationEvent::GameUpdate(game(phase, Player::Player1)));
        s
    }

    #[test]
    fn scenario_a_create_lobby_enters_waiting() {
        let mut s = connected();
        assert!(matches!(
            s.view(),
            View::MainMenu {
                controls_enabled: true,
                ..
            }
        ));

        let request = s.create_lobby().unwrap();
        assert_eq!(last_sent(&s), (request, Command::CreateLobby));
        assert!(matches!(
            s.view(),
            View::MainMenu {
                controls_enabled: false,
                ..
            }
        ));

        complete(&mut s, request, CommandKind::CreateLobby, Ok("abc123"));
        assert_eq!(s.phase(), SessionPhase::InLobby);
        assert_eq!(s.lobby_id(), Some(&lobby("abc123")));
        assert_eq!(s.game(), None);
        assert!(matches!(s.view(), View::Waiting { ref lobby_id, .. } if *lobby_id == lobby("abc123")));
    }

    #[test]
    fn scenario_b_first_snapshot_leaves_waiting() {
        let mut s = waiting();
        let snapshot = game(Phase::Playing, Player::Player1);
        push(&mut s, NotificationEvent::GameUpdate(snapshot.clone()));

        assert_eq!(s.game(), Some(&snapshot));
        assert_eq!(s.selection(), Selection::Idle);
        assert!(matches!(s.view(), View::InGame { ref game, .. } if *game == snapshot));
    }

    #[test]
    fn scenario_c_failed_move_surfaces_body_and_resets_selector() {
        let mut s = in_game(Phase::Playing);
        let before = s.game().cloned();

        assert_eq!(s.click(2), Ok(ClickOutcome::Armed(pos(2))));
        assert_eq!(s.selection(), Selection::Armed(pos(2)));
        assert_eq!(
            s.click(5),
            Ok(ClickOutcome::Submit(MoveRequest::relocate(pos(2), pos(5))))
        );
        let (request, command) = last_sent(&s);
        assert_eq!(command, Command::MakeMove(MoveRequest::relocate(pos(2), pos(5))));

        complete(
            &mut s,
            request,
            CommandKind::MakeMove,
            Err(CommandFailure::Rejected("not your turn".into())),
        );
        assert_eq!(
            s.mutation(CommandKind::MakeMove).error(),
            Some(&CommandFailure::Rejected("not your turn".into()))
        );
        assert_eq!(s.selection(), Selection::Idle);
        assert_eq!(s.game().cloned(), before);
        match s.view() {
            View::InGame { move_error, .. } => {
                assert_eq!(move_error.map(|e| e.to_string()), Some("not your turn".into()));
            }
            other => panic!("expected in-game view, got {other:?}"),
        }
    }

    #[test]
    fn scenario_d_leave_returns_to_menu() {
        let mut s = in_game(Phase::Setup);
        let request = s.leave_lobby().unwrap();
        assert_eq!(last_sent(&s).1, Command::LeaveLobby);
        complete(&mut s, request, CommandKind::LeaveLobby, Ok(""));

        assert_eq!(s.phase(), SessionPhase::MainMenu);
        assert_eq!(s.lobby_id(), None);
        assert_eq!(s.game(), None);
        assert!(matches!(s.view(), View::MainMenu { .. }));
    }

    #[test]
    fn scenario_e_close_is_terminal() {
        let mut s = in_game(Phase::Playing);
        let before = s.game().cloned();
        status(&mut s, ConnectionStatus::Closed);

        push(&mut s, NotificationEvent::OpponentLeft);
        push(&mut s, NotificationEvent::GameUpdate(Game::new()));
        assert_eq!(s.game().cloned(), before);
        assert_eq!(s.view(), View::Disconnected { reason: None });

        status(&mut s, ConnectionStatus::Connected);
        assert_eq!(*s.connection(), ConnectionStatus::Closed);
        assert_eq!(s.click(1), Err(SessionError::Disconnected));
        let sent = s.gateway().sent.len();
        assert_eq!(s.leave_lobby(), Err(SessionError::Disconnected));
        assert_eq!(s.gateway().sent.len(), sent);
    }

    #[test]
    fn error_status_shows_reload_prompt_in_any_phase() {
        let mut s = connected();
        status(&mut s, ConnectionStatus::Error("boom".into()));
        assert_eq!(
            s.view(),
            View::Disconnected {
                reason: Some("boom".into())
            }
        );
        assert_eq!(s.create_lobby(), Err(SessionError::Disconnected));
    }

    #[test]
    fn lobby_controls_need_a_connection() {
        let mut s = session(ConnectionStatus::Loading);
        assert_eq!(s.view(), View::Loading);
        assert_eq!(s.create_lobby(), Err(SessionError::NotConnected));
        assert_eq!(s.join_lobby("abc"), Err(SessionError::NotConnected));
        assert!(s.gateway().sent.is_empty());

        status(&mut s, ConnectionStatus::Connected);
        assert!(s.create_lobby().is_ok());
    }

    #[test]
    fn create_and_join_share_one_pending_gate() {
        let mut s = connected();
        let request = s.create_lobby().unwrap();
        assert_eq!(
            s.join_lobby("abc"),
            Err(SessionError::Pending(CommandKind::CreateLobby))
        );
        assert_eq!(
            s.create_lobby(),
            Err(SessionError::Pending(CommandKind::CreateLobby))
        );
        assert_eq!(s.gateway().sent.len(), 1);

        complete(
            &mut s,
            request,
            CommandKind::CreateLobby,
            Err(CommandFailure::Transport("refused".into())),
        );
        assert_eq!(s.phase(), SessionPhase::MainMenu);
        let request = s.join_lobby("abc").unwrap();
        assert_eq!(
            s.create_lobby(),
            Err(SessionError::Pending(CommandKind::JoinLobby))
        );
        assert_eq!(
            last_sent(&s),
            (
                request,
                Command::JoinLobby {
                    lobby_id: lobby("abc")
                }
            )
        );
    }

    #[test]
    fn join_rejects_blank_id_without_sending() {
        let mut s = connected();
        assert_eq!(s.join_lobby("   "), Err(SessionError::EmptyLobbyId));
        assert!(s.gateway().sent.is_empty());
    }

    #[test]
    fn failed_join_stays_in_menu_and_surfaces_error() {
        let mut s = connected();
        let request = s.join_lobby("nope").unwrap();
        complete(
            &mut s,
            request,
            CommandKind::JoinLobby,
            Err(CommandFailure::Rejected("Invalid lobby ID!".into())),
        );
        assert_eq!(s.phase(), SessionPhase::MainMenu);
        match s.view() {
            View::MainMenu {
                controls_enabled,
                join_error,
                ..
            } => {
                assert!(controls_enabled);
                assert_eq!(join_error, Some(CommandFailure::Rejected("Invalid lobby ID!".into())));
            }
            other => panic!("expected main menu, got {other:?}"),
        }
    }

    #[test]
    fn create_without_lobby_id_is_a_failure() {
        let mut s = connected();
        let request = s.create_lobby().unwrap();
        complete(&mut s, request, CommandKind::CreateLobby, Ok("  "));
        assert_eq!(s.phase(), SessionPhase::MainMenu);
        assert_eq!(
            s.mutation(CommandKind::CreateLobby).error(),
            Some(&CommandFailure::MissingLobbyId)
        );
    }

    #[test]
    fn click_preconditions() {
        let mut s = connected();
        assert_eq!(s.click(9), Err(SessionError::InvalidPosition(9)));
        assert_eq!(s.click(0), Err(SessionError::NotInLobby));

        let mut s = waiting();
        assert_eq!(s.click(0), Err(SessionError::NoGame));
        assert_eq!(s.leave_lobby().map(|_| ()), Ok(()));
        assert_eq!(
            s.leave_lobby(),
            Err(SessionError::Pending(CommandKind::LeaveLobby))
        );
    }

    #[test]
    fn placement_is_one_click() {
        let mut s = in_game(Phase::Setup);
        assert_eq!(s.click(0), Ok(ClickOutcome::Submit(MoveRequest::place(pos(0)))));
        assert_eq!(
            last_sent(&s).1,
            Command::MakeMove(MoveRequest::place(pos(0)))
        );
        assert_eq!(s.selection(), Selection::Idle);
    }

    #[test]
    fn click_while_move_pending_is_rejected_without_touching_selection() {
        let mut s = in_game(Phase::Setup);
        s.click(1).unwrap();
        let sent = s.gateway().sent.len();

        assert_eq!(s.click(2), Err(SessionError::MovePending));
        assert_eq!(s.selection(), Selection::Idle);
        assert_eq!(s.gateway().sent.len(), sent);

        let mut s = in_game(Phase::Playing);
        s.click(1).unwrap();
        s.click(2).unwrap();
        assert_eq!(s.click(3), Err(SessionError::MovePending));
        assert_eq!(s.click(4), Err(SessionError::MovePending));
        assert_eq!(s.selection(), Selection::Idle);
        assert_eq!(
            last_sent(&s).1,
            Command::MakeMove(MoveRequest::relocate(pos(1), pos(2)))
        );
    }

    #[test]
    fn snapshot_before_move_response_resets_selection_and_keeps_pending() {
        let mut s = in_game(Phase::Setup);
        s.click(3).unwrap();
        let (request, _) = last_sent(&s);

        let mut after = s.game().cloned().unwrap();
        after.board[3] = Cell::Player1;
        after.turn = Player::Player2;
        push(&mut s, NotificationEvent::GameUpdate(after.clone()));
        assert!(s.mutation(CommandKind::MakeMove).is_pending());
        assert_eq!(s.game(), Some(&after));

        complete(&mut s, request, CommandKind::MakeMove, Ok(""));
        assert!(!s.mutation(CommandKind::MakeMove).is_pending());
        assert_eq!(s.game(), Some(&after));
        assert_eq!(s.selection(), Selection::Idle);
    }

    #[test]
    fn any_snapshot_disarms_selection() {
        let mut s = in_game(Phase::Playing);
        s.click(6).unwrap();
        assert_eq!(s.selection(), Selection::Armed(pos(6)));
        push(&mut s, NotificationEvent::GameUpdate(game(Phase::Playing, Player::Player2)));
        assert_eq!(s.selection(), Selection::Idle);

        s.click(7).unwrap();
        push(&mut s, NotificationEvent::OpponentLeft);
        assert_eq!(s.selection(), Selection::Idle);
    }

    #[test]
    fn snapshot_clears_settled_move_error() {
        let mut s = in_game(Phase::Setup);
        s.click(0).unwrap();
        let (request, _) = last_sent(&s);
        complete(
            &mut s,
            request,
            CommandKind::MakeMove,
            Err(CommandFailure::Rejected("It is not your Turn!".into())),
        );
        assert!(s.mutation(CommandKind::MakeMove).error().is_some());

        push(&mut s, NotificationEvent::GameUpdate(game(Phase::Setup, Player::Player2)));
        assert_eq!(s.mutation(CommandKind::MakeMove).error(), None);
    }

    #[test]
    fn opponent_left_returns_to_waiting() {
        let mut s = in_game(Phase::Playing);
        push(&mut s, NotificationEvent::OpponentLeft);
        assert_eq!(s.phase(), SessionPhase::InLobby);
        assert_eq!(s.game(), None);
        assert!(matches!(s.view(), View::Waiting { .. }));
    }

    #[test]
    fn notifications_in_menu_are_dropped() {
        let mut s = connected();
        push(&mut s, NotificationEvent::GameUpdate(Game::new()));
        assert_eq!(s.game(), None);
        assert_eq!(s.store().last_event(), None);
    }

    #[test]
    fn old_lobby_snapshot_does_not_leak_into_created_lobby() {
        let mut s = waiting();
        let old = game(Phase::Playing, Player::Player2);
        push(&mut s, NotificationEvent::GameUpdate(old.clone()));
        let leave = s.leave_lobby().unwrap();
        complete(&mut s, leave, CommandKind::LeaveLobby, Ok(""));

        let create = s.create_lobby().unwrap();
        push(&mut s, NotificationEvent::GameUpdate(old));
        assert_eq!(s.game(), None);

        complete(&mut s, create, CommandKind::CreateLobby, Ok("fresh"));
        assert_eq!(s.lobby_id(), Some(&lobby("fresh")));
        assert_eq!(s.game(), None);
        assert!(matches!(s.view(), View::Waiting { ref lobby_id, .. } if *lobby_id == lobby("fresh")));
    }

    #[test]
    fn move_completion_after_leave_is_stale() {
        let mut s = in_game(Phase::Setup);
        s.click(0).unwrap();
        let (move_request, _) = last_sent(&s);
        let leave = s.leave_lobby().unwrap();
        complete(&mut s, leave, CommandKind::LeaveLobby, Ok(""));

        let revision = s.revision();
        complete(
            &mut s,
            move_request,
            CommandKind::MakeMove,
            Err(CommandFailure::Rejected("Current player is not in a lobby!".into())),
        );
        assert_eq!(s.mutation(CommandKind::MakeMove).error(), None);
        assert_eq!(s.revision(), revision);
    }

    #[test]
    fn auto_join_waits_for_connected_and_fires_once() {
        let link = lobby("shared");
        let mut s = SessionController::new(
            RecordingGateway::default(),
            ConnectionStatus::Loading,
            Some(link.clone()),
        );
        assert!(s.gateway().sent.is_empty());

        status(&mut s, ConnectionStatus::Connected);
        assert_eq!(
            s.gateway().sent,
            vec![(
                RequestId(0),
                Command::JoinLobby {
                    lobby_id: link.clone()
                }
            )]
        );

        complete(
            &mut s,
            RequestId(0),
            CommandKind::JoinLobby,
            Err(CommandFailure::Rejected("Lobby is full!".into())),
        );
        // Offering the same link again does not retry.
        s.offer_join_link(link.clone());
        assert_eq!(s.gateway().sent.len(), 1);

        // A different link is a new identity.
        s.offer_join_link(lobby("other"));
        assert_eq!(s.gateway().sent.len(), 2);
    }

    #[test]
    fn auto_join_at_construction_when_already_connected() {
        let s = SessionController::new(
            RecordingGateway::default(),
            ConnectionStatus::Connected,
            Some(lobby("shared")),
        );
        assert_eq!(s.gateway().sent.len(), 1);
        assert!(s.mutation(CommandKind::JoinLobby).is_pending());
    }

    #[test]
    fn auto_join_skipped_while_in_lobby() {
        let mut s = waiting();
        s.offer_join_link(lobby("shared"));
        assert_eq!(s.gateway().sent.len(), 1);
    }

    #[test]
    fn join_snapshot_before_join_response_is_kept() {
        let mut s = SessionController::new(
            RecordingGateway::default(),
            ConnectionStatus::Connected,
            Some(lobby("shared")),
        );
        let (request, _) = last_sent(&s);

        let opening = Game::new();
        push(&mut s, NotificationEvent::GameUpdate(opening.clone()));
        assert_eq!(s.game(), Some(&opening));

        complete(&mut s, request, CommandKind::JoinLobby, Ok(""));
        assert_eq!(s.lobby_id(), Some(&lobby("shared")));
        assert!(matches!(s.view(), View::InGame { ref game, .. } if *game == opening));
    }

    #[test]
    fn join_snapshot_after_join_response_also_lands() {
        let mut s = connected();
        let request = s.join_lobby("abc").unwrap();
        complete(&mut s, request, CommandKind::JoinLobby, Ok(""));
        assert!(matches!(s.view(), View::Waiting { .. }));

        push(&mut s, NotificationEvent::GameUpdate(Game::new()));
        assert!(matches!(s.view(), View::InGame { .. }));
    }

    #[test]
    fn revision_moves_on_every_observable_change() {
        let mut s = connected();
        let mut last = s.revision();
        let mut advanced = |s: &SessionController<RecordingGateway>| {
            let moved = s.revision() > last;
            last = s.revision();
            moved
        };

        let request = s.create_lobby().unwrap();
        assert!(advanced(&s));
        complete(&mut s, request, CommandKind::CreateLobby, Ok("abc"));
        assert!(advanced(&s));
        push(&mut s, NotificationEvent::GameUpdate(game(Phase::Playing, Player::Player1)));
        assert!(advanced(&s));
        s.click(1).unwrap();
        assert!(advanced(&s));
        // Dropped notification after close: no change.
        status(&mut s, ConnectionStatus::Closed);
        assert!(advanced(&s));
        push(&mut s, NotificationEvent::OpponentLeft);
        assert!(!advanced(&s));
    }
}
