// The single event stream the session controller consumes.
//
// Two independently timed sources feed the controller: the notification
// channel (status changes and pushed events, from the channel's reader
// thread) and command completions (from the gateway's worker threads). Both
// are sent into one `mpsc` queue as `ClientEvent`s, so the controller sees a
// single arrival-ordered sequence and never has to reconcile two queues.

use ninehole_protocol::NotificationEvent;

use crate::channel::ConnectionStatus;
use crate::gateway::Completion;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientEvent {
    Channel(ChannelEvent),
    Completed(Completion),
}

/// What the notification channel reports.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelEvent {
    Status(ConnectionStatus),
    Notification(NotificationEvent),
}

impl From<ChannelEvent> for ClientEvent {
    fn from(event: ChannelEvent) -> Self {
        ClientEvent::Channel(event)
    }
}

impl From<Completion> for ClientEvent {
    fn from(completion: Completion) -> Self {
        ClientEvent::Completed(completion)
    }
}
