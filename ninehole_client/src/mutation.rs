// Pending/settled tracking for one kind of command.
//
// Every mutation surface (create, join, move, leave) owns one `Mutation`, so
// each can show its own "submitting…" and error state, and a failure in one
// never blocks another. The request id in flight is remembered so a
// completion that no longer matches (superseded by a reset) is recognized as
// stale and ignored.

use crate::error::CommandFailure;
use crate::gateway::RequestId;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum MutationStatus {
    #[default]
    Idle,
    Pending,
    Succeeded,
    Failed(CommandFailure),
}

#[derive(Clone, Debug, Default)]
pub struct Mutation {
    status: MutationStatus,
    in_flight: Option<RequestId>,
}

impl Mutation {
    pub fn status(&self) -> &MutationStatus {
        &self.status
    }

    pub fn is_pending(&self) -> bool {
        self.status == MutationStatus::Pending
    }

    pub fn error(&self) -> Option<&CommandFailure> {
        match &self.status {
            MutationStatus::Failed(failure) => Some(failure),
            _ => None,
        }
    }

    /// Whether `request` is the call this mutation is waiting on.
    pub fn awaits(&self, request: RequestId) -> bool {
        self.in_flight == Some(request)
    }

    pub(crate) fn begin(&mut self, request: RequestId) {
        self.status = MutationStatus::Pending;
        self.in_flight = Some(request);
    }

    /// Record the outcome of `request`. Returns `false`, changing nothing,
    /// when `request` is not the one in flight.
    pub(crate) fn settle(&mut self, request: RequestId, outcome: Result<(), CommandFailure>) -> bool {
        if !self.awaits(request) {
            return false;
        }
        self.in_flight = None;
        self.status = match outcome {
            Ok(()) => MutationStatus::Succeeded,
            Err(failure) => MutationStatus::Failed(failure),
        };
        true
    }

    /// Back to `Idle`. Anything still in flight becomes stale.
    pub(crate) fn reset(&mut self) {
        self.status = MutationStatus::Idle;
        self.in_flight = None;
    }

    /// Back to `Idle` unless a call is still in flight.
    pub(crate) fn clear_settled(&mut self) -> bool {
        match self.status {
            MutationStatus::Idle | MutationStatus::Pending => false,
            MutationStatus::Succeeded | MutationStatus::Failed(_) => {
                self.status = MutationStatus::Idle;
                true
            }
        }
    }
}
