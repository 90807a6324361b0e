// Notification channel: the single long-lived WebSocket to the authority.
//
// Architecture (same split as a relay client: handshake on the caller's
// thread, blocking reads on a background thread, `mpsc` to hand results back):
// - `open()` performs TCP connect + WebSocket handshake on the calling thread.
//   The authority's `Set-Cookie: id=…` in the handshake response is captured
//   as this participant's identity; a pre-configured identity is sent as a
//   `Cookie` header instead.
// - `subscribe(sink)` moves the socket into a reader thread which parses each
//   text/binary frame into a `NotificationEvent` and sends it, in arrival
//   order, to the one subscriber. Status changes the reader observes (close,
//   error) go down the same sink.
// - `unsubscribe()` (also run on drop) shuts the TCP stream down, which
//   unblocks the reader, joins it, and leaves the status `Closed`.
//
// Status is shared between the owner and the reader behind a mutex and only
// ever moves forward: `Loading → Connected | Error | Closed`,
// `Connected → Closed | Error`. `Closed` and `Error` absorb everything after
// them, so a racing close and shutdown cannot resurrect a dead channel.
//
// Malformed payloads are fatal: the reader moves the status to `Error` and
// stops. There is no reconnection.

use std::fmt;
use std::io;
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};
use tungstenite::client::IntoClientRequest;
use tungstenite::error::ProtocolError;
use tungstenite::http::HeaderValue;
use tungstenite::http::header::{COOKIE, SET_COOKIE};
use tungstenite::{Message, WebSocket};
use url::Url;

use ninehole_protocol::NotificationEvent;

use crate::error::ChannelError;
use crate::event::{ChannelEvent, ClientEvent};

/// Name of the cookie the authority identifies participants by.
pub const IDENTITY_COOKIE: &str = "id";

/// Bound on the TCP connect to each resolved address, and separately on
/// the WebSocket handshake read.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ConnectionStatus {
    #[default]
    Loading,
    Connected,
    Closed,
    Error(String),
}

impl ConnectionStatus {
    /// `Closed` and `Error` end the session; nothing follows them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionStatus::Closed | ConnectionStatus::Error(_))
    }

    pub fn can_transition_to(&self, next: &ConnectionStatus) -> bool {
        match (self, next) {
            (ConnectionStatus::Loading, next) => *next != ConnectionStatus::Loading,
            (ConnectionStatus::Connected, next) => next.is_terminal(),
            (ConnectionStatus::Closed | ConnectionStatus::Error(_), _) => false,
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Loading => f.write_str("loading"),
            ConnectionStatus::Connected => f.write_str("connected"),
            ConnectionStatus::Closed => f.write_str("closed"),
            ConnectionStatus::Error(detail) => write!(f, "error: {detail}"),
        }
    }
}

/// Apply `next` if the lifecycle allows it. Returns whether it was applied.
fn transition(shared: &Mutex<ConnectionStatus>, next: ConnectionStatus) -> bool {
    let mut status = shared.lock().unwrap_or_else(PoisonError::into_inner);
    if status.can_transition_to(&next) {
        *status = next;
        true
    } else {
        false
    }
}

pub struct ConnectionChannel {
    url: Url,
    identity: Option<String>,
    status: Arc<Mutex<ConnectionStatus>>,
    /// Held between `open()` and `subscribe()`.
    socket: Option<WebSocket<TcpStream>>,
    /// Clone of the socket's stream, used only to shut it down.
    shutdown_handle: Option<TcpStream>,
    reader_thread: Option<JoinHandle<()>>,
    subscribed: bool,
}

impl ConnectionChannel {
    pub fn new(url: Url, identity: Option<String>) -> Self {
        Self {
            url,
            identity,
            status: Arc::new(Mutex::new(ConnectionStatus::Loading)),
            socket: None,
            shutdown_handle: None,
            reader_thread: None,
            subscribed: false,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The participant id: the configured one, or the one the authority
    /// issued during the handshake.
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    /// Connect and perform the handshake. Only the first call does anything;
    /// later calls return the current status.
    pub fn open(&mut self) -> ConnectionStatus {
        if self.status() != ConnectionStatus::Loading {
            return self.status();
        }

        match self.connect() {
            Ok((socket, shutdown_handle, issued)) => {
                if self.identity.is_none() {
                    self.identity = issued;
                }
                self.socket = Some(socket);
                self.shutdown_handle = Some(shutdown_handle);
                transition(&self.status, ConnectionStatus::Connected);
                info!(url = %self.url, identity = ?self.identity, "channel connected");
            }
            Err(e) => {
                warn!(url = %self.url, error = %e, "channel failed to open");
                transition(&self.status, ConnectionStatus::Error(e.to_string()));
            }
        }
        self.status()
    }

    fn connect(&self) -> Result<(WebSocket<TcpStream>, TcpStream, Option<String>), ChannelError> {
        if self.url.scheme() != "ws" {
            return Err(ChannelError::UnsupportedScheme(self.url.scheme().to_string()));
        }
        let host = self
            .url
            .host_str()
            .ok_or_else(|| ChannelError::MissingAddress(self.url.to_string()))?;
        let port = self
            .url
            .port_or_known_default()
            .ok_or_else(|| ChannelError::MissingAddress(self.url.to_string()))?;

        let stream = connect_with_timeout(host, port)?;
        stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT))?;
        let shutdown_handle = stream.try_clone()?;

        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| ChannelError::Handshake(e.to_string()))?;
        if let Some(identity) = &self.identity {
            let cookie = HeaderValue::from_str(&format!("{IDENTITY_COOKIE}={identity}"))
                .map_err(|e| ChannelError::Handshake(e.to_string()))?;
            request.headers_mut().insert(COOKIE, cookie);
        }

        let (socket, response) = tungstenite::client(request, stream)
            .map_err(|e| ChannelError::Handshake(e.to_string()))?;

        let issued = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find_map(parse_identity_cookie);

        // The reader blocks indefinitely once subscribed.
        socket.get_ref().set_read_timeout(None)?;

        Ok((socket, shutdown_handle, issued))
    }

    /// Register the single subscriber and start delivering events to it.
    pub fn subscribe(&mut self, sink: Sender<ClientEvent>) -> Result<(), ChannelError> {
        if self.subscribed {
            return Err(ChannelError::AlreadySubscribed);
        }
        let socket = self.socket.take().ok_or(ChannelError::NotConnected)?;
        self.subscribed = true;

        let status = Arc::clone(&self.status);
        self.reader_thread = Some(thread::spawn(move || {
            reader_loop(socket, &status, &sink);
        }));
        debug!("channel subscriber registered");
        Ok(())
    }

    /// Stop delivery and close the channel. Idempotent.
    pub fn unsubscribe(&mut self) {
        transition(&self.status, ConnectionStatus::Closed);
        if let Some(stream) = self.shutdown_handle.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.socket = None;
        if let Some(handle) = self.reader_thread.take() {
            let _ = handle.join();
            debug!("channel reader stopped");
        }
    }
}

impl Drop for ConnectionChannel {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Value of the identity cookie in one `Set-Cookie` header, if it is ours.
/// Try each resolved address in turn, giving up on one after
/// `HANDSHAKE_TIMEOUT`.
fn connect_with_timeout(host: &str, port: u16) -> io::Result<TcpStream> {
    let mut last_error = None;
    for addr in (host, port).to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, HANDSHAKE_TIMEOUT) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_error = Some(e),
        }
    }
    Err(last_error.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, format!("{host}:{port} resolved to no address"))
    }))
}

fn parse_identity_cookie(header: &str) -> Option<String> {
    let pair = header.split(';').next()?.trim();
    let (name, value) = pair.split_once('=')?;
    (name.trim() == IDENTITY_COOKIE && !value.trim().is_empty()).then(|| value.trim().to_string())
}

/// Reader thread: read frames until the channel ends, forwarding parsed
/// events and terminal status changes to `sink`.
fn reader_loop(
    mut socket: WebSocket<TcpStream>,
    status: &Mutex<ConnectionStatus>,
    sink: &Sender<ClientEvent>,
) {
    let finish = |next: ConnectionStatus| {
        if transition(status, next.clone()) {
            let _ = sink.send(ChannelEvent::Status(next).into());
        }
    };

    loop {
        let payload = match socket.read() {
            Ok(Message::Text(text)) => text.into_bytes(),
            Ok(Message::Binary(bytes)) => bytes,
            Ok(Message::Close(frame)) => {
                info!(?frame, "channel closed by authority");
                let _ = socket.flush();
                finish(ConnectionStatus::Closed);
                return;
            }
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => continue,
            Err(
                tungstenite::Error::ConnectionClosed
                | tungstenite::Error::AlreadyClosed
                | tungstenite::Error::Protocol(ProtocolError::ResetWithoutClosingHandshake),
            ) => {
                info!("channel connection ended");
                finish(ConnectionStatus::Closed);
                return;
            }
            Err(e) => {
                warn!(error = %e, "channel read failed");
                finish(ConnectionStatus::Error(e.to_string()));
                return;
            }
        };

        match serde_json::from_slice::<NotificationEvent>(&payload) {
            Ok(event) => {
                debug!(?event, "notification received");
                if sink.send(ChannelEvent::Notification(event).into()).is_err() {
                    return; // Subscriber dropped the receiver
                }
            }
            Err(e) => {
                warn!(
                    error = %e,
                    payload = %String::from_utf8_lossy(&payload),
                    "malformed notification"
                );
                finish(ConnectionStatus::Error(format!("malformed notification: {e}")));
                return;
            }
        }
    }
}
