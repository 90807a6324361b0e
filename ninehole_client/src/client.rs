// Runtime wiring: one channel, one gateway, one controller, one queue.
//
// `GameClient::start` does, in order:
// 1. open the notification channel (blocking only for the handshake),
// 2. build the HTTP gateway with the identity the handshake produced,
// 3. construct the controller with the open outcome and the join link (an
//    auto-join may be dispatched right here),
// 4. subscribe the channel to the queue the gateway also posts into.
//
// After that the owner drives everything from one thread: `pump()` drains
// whatever has arrived without blocking, `wait()` blocks for the next event
// and then drains. The controller only ever runs on that thread.
//
// A channel that fails to open is not a startup error; it is an `Error`
// status the view shows like any other.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;

use tracing::warn;
use url::Url;

use crate::channel::{ConnectionChannel, ConnectionStatus};
use crate::config::ClientConfig;
use crate::event::ClientEvent;
use crate::gateway::HttpGateway;
use crate::session::SessionController;
use crate::view::View;

pub struct GameClient {
    config: ClientConfig,
    channel: ConnectionChannel,
    controller: SessionController<HttpGateway>,
    inbox: Receiver<ClientEvent>,
}

impl GameClient {
    pub fn start(config: ClientConfig) -> Self {
        let (tx, rx) = mpsc::channel();

        let mut channel = ConnectionChannel::new(config.channel_url.clone(), config.identity.clone());
        let status = channel.open();
        let identity = channel.identity().map(str::to_string);

        let gateway = HttpGateway::new(config.api_base.clone(), identity, tx.clone());
        let controller = SessionController::new(gateway, status.clone(), config.join_link.clone());

        if status == ConnectionStatus::Connected {
            let subscribed = channel.subscribe(tx);
            if let Err(e) = subscribed {
                warn!(error = %e, "could not subscribe to channel");
            }
        }

        Self {
            config,
            channel,
            controller,
            inbox: rx,
        }
    }

    /// Apply every queued event. Returns how many were applied.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.inbox.try_recv() {
            self.controller.handle(event);
            applied += 1;
        }
        applied
    }

    /// Block up to `timeout` for one event, then drain the rest.
    pub fn wait(&mut self, timeout: Duration) -> usize {
        match self.inbox.recv_timeout(timeout) {
            Ok(event) => {
                self.controller.handle(event);
                1 + self.pump()
            }
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => 0,
        }
    }

    pub fn view(&self) -> View {
        self.controller.view()
    }

    pub fn controller(&self) -> &SessionController<HttpGateway> {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut SessionController<HttpGateway> {
        &mut self.controller
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// This participant's id as the authority knows it.
    pub fn identity(&self) -> Option<&str> {
        self.channel.identity()
    }

    /// Link an opponent can use to join the current lobby.
    pub fn share_link(&self) -> Option<Url> {
        self.controller
            .lobby_id()
            .map(|lobby_id| self.config.share_link(lobby_id))
    }

    /// Close the channel. In-flight commands still complete but nothing
    /// consumes them.
    pub fn shutdown(&mut self) {
        self.channel.unsubscribe();
    }
}
