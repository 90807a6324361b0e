// Outbound commands: the seam between the session controller and HTTP.
//
// The controller never blocks on a call. It hands a `Command` and a fresh
// `RequestId` to a `CommandGateway` and carries on; the outcome comes back
// later as a `Completion` through the same event queue the notification
// channel feeds. Tests substitute a recording gateway and inject completions
// by hand, which is how out-of-order arrivals are exercised.
//
// `HttpGateway` runs each call on a short-lived worker thread with a blocking
// `ureq` agent. Result convention:
// - 2xx                → `Ok(body)`
// - any other status   → `CommandFailure::Rejected(body)`, body verbatim
// - no response at all → `CommandFailure::Transport(detail)`
// - create-lobby 2xx with an empty body → `CommandFailure::MissingLobbyId`

use std::fmt;
use std::sync::mpsc::Sender;
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};
use url::Url;

use ninehole_protocol::{Command, CommandKind};

use crate::channel::IDENTITY_COOKIE;
use crate::error::CommandFailure;
use crate::event::ClientEvent;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Identifies one dispatched command so its completion can be matched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How one dispatched command settled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Completion {
    pub request: RequestId,
    pub kind: CommandKind,
    pub result: Result<String, CommandFailure>,
}

/// Sends commands to the authority. Implementations must eventually deliver
/// exactly one `Completion` per dispatch to whoever consumes the event queue.
pub trait CommandGateway {
    fn dispatch(&mut self, request: RequestId, command: Command);
}

pub struct HttpGateway {
    agent: ureq::Agent,
    api_base: Url,
    identity: Option<String>,
    sink: Sender<ClientEvent>,
}

impl HttpGateway {
    pub fn new(api_base: Url, identity: Option<String>, sink: Sender<ClientEvent>) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build();
        Self {
            agent,
            api_base,
            identity,
            sink,
        }
    }

    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    /// Perform one call synchronously on the current thread.
    pub fn execute(
        agent: &ureq::Agent,
        api_base: &Url,
        identity: Option<&str>,
        command: &Command,
    ) -> Result<String, CommandFailure> {
        let url = command.to_url(api_base);
        let mut request = agent.request(command.method(), url.as_str());
        if let Some(identity) = identity {
            request = request.set("Cookie", &format!("{IDENTITY_COOKIE}={identity}"));
        }

        let body = match request.call() {
            Ok(response) => response
                .into_string()
                .map_err(|e| CommandFailure::Transport(e.to_string()))?,
            Err(ureq::Error::Status(code, response)) => {
                let body = response.into_string().unwrap_or_default();
                debug!(%url, code, %body, "command rejected");
                return Err(CommandFailure::Rejected(body));
            }
            Err(ureq::Error::Transport(transport)) => {
                warn!(%url, error = %transport, "command transport failure");
                return Err(CommandFailure::Transport(transport.to_string()));
            }
        };

        if command.kind() == CommandKind::CreateLobby && body.trim().is_empty() {
            return Err(CommandFailure::MissingLobbyId);
        }
        Ok(body)
    }
}

impl CommandGateway for HttpGateway {
    fn dispatch(&mut self, request: RequestId, command: Command) {
        let agent = self.agent.clone();
        let api_base = self.api_base.clone();
        let identity = self.identity.clone();
        let sink = self.sink.clone();

        thread::spawn(move || {
            let result = Self::execute(&agent, &api_base, identity.as_deref(), &command);
            let completion = Completion {
                request,
                kind: command.kind(),
                result,
            };
            // The receiver is gone only when the session has shut down.
            let _ = sink.send(completion.into());
        });
    }
}
