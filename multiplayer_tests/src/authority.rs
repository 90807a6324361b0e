// In-process game authority for integration tests.
//
// Behaves like the real Nine Holes backend as far as a client can observe:
// an HTTP API for the four commands and a WebSocket notification channel,
// with participants identified by an `id` cookie issued on the WebSocket
// handshake.
//
// Architecture:
// - **API thread**: `tiny_http` server; forwards each request to the main
//   thread, which answers it.
// - **Listener thread**: non-blocking `TcpListener::accept()` loop; forwards
//   raw streams to the main thread.
// - **Main thread**: owns all state (participants' sockets, lobbies) and
//   consumes one `mpsc` queue. The WebSocket handshake runs here, so a
//   participant is registered before its client can possibly issue a
//   command. The main thread is the only writer to any socket.
//
// Rules: joining a lobby starts a SETUP game with PLAYER_1 to move and
// broadcasts it *before* answering the join. SETUP placements alternate
// until three holes remain empty, then PLAYING moves a piece of your own to
// an empty hole. Three in a line through the center or along an edge wins.
// Leaving discards the game and tells the remaining player OPPONENT_LEFT.
//
// Test hooks: `push_raw` (send an arbitrary payload to one participant),
// `disconnect_all` (close every channel with a close frame), and per-command
// request counts.

use std::collections::{BTreeMap, HashMap};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};
use tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tungstenite::http::HeaderValue;
use tungstenite::http::header::{COOKIE, SET_COOKIE};
use tungstenite::{Message, WebSocket};
use url::Url;

use ninehole_client::ClientConfig;
use ninehole_protocol::{Cell, Command, CommandError, CommandKind, Game, MoveRequest, NotificationEvent, Phase, Player, Position};

pub const MISSING_COOKIE: &str = "ID cookie is not present. Connect to the WebSocket server first!";
pub const INVALID_LOBBY: &str = "Invalid lobby ID!";
pub const LOBBY_FULL: &str = "Lobby is full!";
pub const NOT_IN_LOBBY: &str = "Current player is not in a lobby!";
pub const NOT_YOUR_TURN: &str = "It is not your Turn!";
pub const TARGET_OCCUPIED: &str = "Target position must be empty!";
pub const FOREIGN_SOURCE: &str = "Initial position must belong to one of your pieces!";
pub const NOT_STARTED: &str = "The game has not started yet!";
pub const GAME_OVER: &str = "The game is over!";

/// Every line of three: four through the center, four along the edges of
/// the ring (1 top, then clockwise).
const LINES: [[usize; 3]; 8] = [
    [1, 0, 5],
    [2, 0, 6],
    [3, 0, 7],
    [4, 0, 8],
    [8, 1, 2],
    [2, 3, 4],
    [4, 5, 6],
    [6, 7, 8],
];

/// Empty holes left when placement ends.
const EMPTY_AFTER_SETUP: usize = 3;

const TICK: Duration = Duration::from_millis(20);
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

enum AuthorityEvent {
    NewConnection { stream: TcpStream },
    Request(tiny_http::Request),
    PushRaw { participant: String, payload: String },
    DisconnectAll,
}

struct Lobby {
    player1: String,
    player2: Option<String>,
    game: Option<Game>,
}

impl Lobby {
    fn seat_of(&self, participant: &str) -> Option<Player> {
        if self.player1 == participant {
            Some(Player::Player1)
        } else if self.player2.as_deref() == Some(participant) {
            Some(Player::Player2)
        } else {
            None
        }
    }

    fn members(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.player1.as_str()).chain(self.player2.as_deref())
    }
}

/// Outcome of one API request: status code and text body.
type Reply = (u16, String);

fn ok(body: impl Into<String>) -> Reply {
    (200, body.into())
}

fn bad_request(body: &str) -> Reply {
    (400, body.to_string())
}

#[derive(Default)]
struct AuthorityState {
    participants: HashMap<String, WebSocket<TcpStream>>,
    lobbies: BTreeMap<String, Lobby>,
    next_participant: u64,
    next_lobby: u64,
}

impl AuthorityState {
    fn lobby_of(&self, participant: &str) -> Option<String> {
        self.lobbies
            .iter()
            .find(|(_, lobby)| lobby.seat_of(participant).is_some())
            .map(|(id, _)| id.clone())
    }

    fn send(&mut self, participant: &str, payload: String) {
        let Some(socket) = self.participants.get_mut(participant) else {
            warn!(%participant, "no channel for participant");
            return;
        };
        if let Err(e) = socket.send(Message::Text(payload)) {
            warn!(%participant, error = %e, "channel write failed");
        }
    }

    fn broadcast(&mut self, lobby_id: &str, event: &NotificationEvent) {
        let Ok(payload) = serde_json::to_string(event) else {
            return;
        };
        let members: Vec<String> = match self.lobbies.get(lobby_id) {
            Some(lobby) => lobby.members().map(str::to_string).collect(),
            None => return,
        };
        for member in members {
            self.send(&member, payload.clone());
        }
    }

    fn execute(&mut self, participant: &str, command: Command) -> Reply {
        match command {
            Command::CreateLobby => {
                self.next_lobby += 1;
                let lobby_id = format!("lobby-{}", self.next_lobby);
                self.lobbies.insert(
                    lobby_id.clone(),
                    Lobby {
                        player1: participant.to_string(),
                        player2: None,
                        game: None,
                    },
                );
                info!(%participant, %lobby_id, "lobby created");
                ok(lobby_id)
            }
            Command::JoinLobby { lobby_id } => {
                let lobby_id = lobby_id.as_str().to_string();
                let Some(lobby) = self.lobbies.get_mut(&lobby_id) else {
                    return bad_request(INVALID_LOBBY);
                };
                if lobby.player2.is_some() || lobby.player1 == participant {
                    return bad_request(LOBBY_FULL);
                }
                lobby.player2 = Some(participant.to_string());
                let game = Game::new();
                lobby.game = Some(game.clone());
                info!(%participant, %lobby_id, "lobby joined");
                self.broadcast(&lobby_id, &NotificationEvent::GameUpdate(game));
                ok("")
            }
            Command::MakeMove(request) => {
                let Some(lobby_id) = self.lobby_of(participant) else {
                    return bad_request(NOT_IN_LOBBY);
                };
                let Some(lobby) = self.lobbies.get_mut(&lobby_id) else {
                    return bad_request(NOT_IN_LOBBY);
                };
                let Some(seat) = lobby.seat_of(participant) else {
                    return bad_request(NOT_IN_LOBBY);
                };
                let Some(game) = lobby.game.as_mut() else {
                    return bad_request(NOT_STARTED);
                };
                if let Err(reason) = apply_move(game, seat, request) {
                    return bad_request(reason);
                }
                let snapshot = game.clone();
                self.broadcast(&lobby_id, &NotificationEvent::GameUpdate(snapshot));
                ok("")
            }
            Command::LeaveLobby => {
                let Some(lobby_id) = self.lobby_of(participant) else {
                    return bad_request(NOT_IN_LOBBY);
                };
                let Some(mut lobby) = self.lobbies.remove(&lobby_id) else {
                    return bad_request(NOT_IN_LOBBY);
                };
                let remaining = if lobby.player1 == participant {
                    lobby.player2.take()
                } else {
                    Some(lobby.player1.clone())
                };
                info!(%participant, %lobby_id, "lobby left");
                if let Some(remaining) = remaining {
                    self.lobbies.insert(
                        lobby_id.clone(),
                        Lobby {
                            player1: remaining,
                            player2: None,
                            game: None,
                        },
                    );
                    self.broadcast(&lobby_id, &NotificationEvent::OpponentLeft);
                }
                ok("")
            }
        }
    }
}

/// Apply one move for `seat` under the authority's rules.
fn apply_move(game: &mut Game, seat: Player, request: MoveRequest) -> Result<(), &'static str> {
    if game.phase == Phase::GameOver {
        return Err(GAME_OVER);
    }
    if game.turn != seat {
        return Err(NOT_YOUR_TURN);
    }
    if !game.cell(request.to).is_empty() {
        return Err(TARGET_OCCUPIED);
    }

    match game.phase {
        Phase::Setup => {
            game.board[request.to.index()] = Cell::from(seat);
            if game.empty_cells() == EMPTY_AFTER_SETUP {
                game.phase = Phase::Playing;
            }
        }
        Phase::Playing => {
            let from = request
                .from
                .filter(|from| game.cell(*from).owner() == Some(seat))
                .ok_or(FOREIGN_SOURCE)?;
            game.board[from.index()] = Cell::Empty;
            game.board[request.to.index()] = Cell::from(seat);
        }
        Phase::GameOver => return Err(GAME_OVER),
    }

    if has_line(game, seat) {
        // `Turn` names the winner once the game is over.
        game.phase = Phase::GameOver;
    } else {
        game.turn = seat.opponent();
    }
    Ok(())
}

fn has_line(game: &Game, player: Player) -> bool {
    LINES.iter().any(|line| {
        line.iter()
            .filter_map(|&index| Position::new(index))
            .all(|position| game.cell(position).owner() == Some(player))
    })
}

/// Value of the `id` cookie in a `Cookie` header.
fn identity_from_cookie(header: &str) -> Option<String> {
    header.split(';').find_map(|pair| {
        let (name, value) = pair.split_once('=')?;
        (name.trim() == "id" && !value.trim().is_empty()).then(|| value.trim().to_string())
    })
}

/// Handle for a running authority. Dropping it does not stop the threads;
/// call `stop()`.
pub struct FakeAuthority {
    api_base: Url,
    channel_url: Url,
    events: Sender<AuthorityEvent>,
    counts: Arc<Mutex<BTreeMap<CommandKind, usize>>>,
    keep_running: Arc<AtomicBool>,
    threads: Vec<thread::JoinHandle<()>>,
}

impl FakeAuthority {
    /// Bind both servers on loopback ports chosen by the OS and start serving.
    pub fn start() -> std::io::Result<Self> {
        let api = tiny_http::Server::http("127.0.0.1:0").map_err(std::io::Error::other)?;
        let api_addr = api
            .server_addr()
            .to_ip()
            .ok_or_else(|| std::io::Error::other("API server has no IP address"))?;
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let channel_addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;
        let api_base = Url::parse(&format!("http://{api_addr}")).map_err(std::io::Error::other)?;
        let channel_url =
            Url::parse(&format!("ws://{channel_addr}/ws")).map_err(std::io::Error::other)?;

        let keep_running = Arc::new(AtomicBool::new(true));
        let counts = Arc::new(Mutex::new(BTreeMap::new()));
        let (tx, rx) = mpsc::channel();
        let mut threads = Vec::new();

        let api_tx = tx.clone();
        let api_running = Arc::clone(&keep_running);
        threads.push(thread::spawn(move || {
            while api_running.load(Ordering::SeqCst) {
                match api.recv_timeout(TICK) {
                    Ok(Some(request)) => {
                        if api_tx.send(AuthorityEvent::Request(request)).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(_) => break,
                }
            }
        }));

        let listener_tx = tx.clone();
        let listener_running = Arc::clone(&keep_running);
        threads.push(thread::spawn(move || {
            while listener_running.load(Ordering::SeqCst) {
                match listener.accept() {
                    Ok((stream, _)) => {
                        stream.set_nonblocking(false).ok();
                        if listener_tx.send(AuthorityEvent::NewConnection { stream }).is_err() {
                            break;
                        }
                    }
                    Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        thread::sleep(TICK);
                    }
                    Err(_) => break,
                }
            }
        }));

        let main_counts = Arc::clone(&counts);
        let main_running = Arc::clone(&keep_running);
        threads.push(thread::spawn(move || {
            run_authority(rx, &main_counts, &main_running);
        }));

        info!(%api_addr, %channel_addr, "authority started");
        Ok(Self {
            api_base,
            channel_url,
            events: tx,
            counts,
            keep_running,
            threads,
        })
    }

    pub fn api_base(&self) -> Url {
        self.api_base.clone()
    }

    pub fn channel_url(&self) -> Url {
        self.channel_url.clone()
    }

    /// Client configuration pointing at this authority.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            api_base: self.api_base(),
            channel_url: self.channel_url(),
            join_link: None,
            identity: None,
        }
    }

    /// How many requests of `kind` have been received (accepted or not).
    pub fn request_count(&self, kind: CommandKind) -> usize {
        self.counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .copied()
            .unwrap_or(0)
    }

    /// Send `payload` verbatim to one participant's channel.
    pub fn push_raw(&self, participant: &str, payload: &str) {
        let _ = self.events.send(AuthorityEvent::PushRaw {
            participant: participant.to_string(),
            payload: payload.to_string(),
        });
    }

    /// Close every channel with a close frame.
    pub fn disconnect_all(&self) {
        let _ = self.events.send(AuthorityEvent::DisconnectAll);
    }

    pub fn stop(self) {
        self.keep_running.store(false, Ordering::SeqCst);
        drop(self.events);
        for handle in self.threads {
            let _ = handle.join();
        }
    }
}

fn run_authority(
    rx: Receiver<AuthorityEvent>,
    counts: &Mutex<BTreeMap<CommandKind, usize>>,
    keep_running: &AtomicBool,
) {
    let mut state = AuthorityState::default();
    while keep_running.load(Ordering::SeqCst) {
        match rx.recv_timeout(TICK) {
            Ok(event) => handle_event(&mut state, event, counts),
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn handle_event(
    state: &mut AuthorityState,
    event: AuthorityEvent,
    counts: &Mutex<BTreeMap<CommandKind, usize>>,
) {
    match event {
        AuthorityEvent::NewConnection { stream } => handle_new_connection(state, stream),
        AuthorityEvent::Request(request) => {
            let (code, body) = handle_request(state, &request, counts);
            let response = tiny_http::Response::from_string(body).with_status_code(code);
            if let Err(e) = request.respond(response) {
                warn!(error = %e, "failed to answer request");
            }
        }
        AuthorityEvent::PushRaw {
            participant,
            payload,
        } => state.send(&participant, payload),
        AuthorityEvent::DisconnectAll => {
            for (participant, mut socket) in state.participants.drain() {
                let _ = socket.close(None);
                let _ = socket.flush();
                debug!(%participant, "channel closed");
            }
        }
    }
}

/// WebSocket handshake. Reuses the presented `id` cookie or issues a new one.
fn handle_new_connection(state: &mut AuthorityState, stream: TcpStream) {
    stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT)).ok();
    state.next_participant += 1;
    let fresh = format!("participant-{}", state.next_participant);

    let mut assigned = None;
    let callback = |request: &Request, mut response: Response| -> Result<Response, ErrorResponse> {
        let presented = request
            .headers()
            .get(COOKIE)
            .and_then(|value| value.to_str().ok())
            .and_then(identity_from_cookie);
        let id = match presented {
            Some(id) => id,
            None => {
                if let Ok(value) = HeaderValue::from_str(&format!("id={fresh}; HttpOnly")) {
                    response.headers_mut().insert(SET_COOKIE, value);
                }
                fresh.clone()
            }
        };
        assigned = Some(id);
        Ok(response)
    };

    // Flatten the error so the callback's borrow of `assigned` ends here.
    let handshake = tungstenite::accept_hdr(stream, callback).map_err(|e| e.to_string());
    match handshake {
        Ok(socket) => {
            socket.get_ref().set_read_timeout(None).ok();
            if let Some(id) = assigned {
                info!(participant = %id, "participant connected");
                state.participants.insert(id, socket);
            }
        }
        Err(e) => warn!(error = %e, "channel handshake failed"),
    }
}

fn handle_request(
    state: &mut AuthorityState,
    request: &tiny_http::Request,
    counts: &Mutex<BTreeMap<CommandKind, usize>>,
) -> Reply {
    if *request.method() != tiny_http::Method::Post {
        return (405, "Method not allowed".into());
    }
    let Ok(url) = Url::parse(&format!("http://authority{}", request.url())) else {
        return bad_request("Malformed request URL");
    };
    let command = match Command::from_url(&url) {
        Ok(command) => command,
        Err(CommandError::UnknownPath(path)) => return (404, format!("No route for {path}")),
        Err(e) => return (400, e.to_string()),
    };
    *counts
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .entry(command.kind())
        .or_insert(0) += 1;

    let participant = request
        .headers()
        .iter()
        .filter(|header| header.field.equiv("Cookie"))
        .find_map(|header| identity_from_cookie(header.value.as_str()));
    let Some(participant) = participant else {
        return bad_request(MISSING_COOKIE);
    };

    debug!(%participant, ?command, "request");
    state.execute(&participant, command)
}
