//! Build request registries: one that logs, one that remembers.

use parking_lot::Mutex;

use crate::traits::{BuildRequestRegistry, RejectionReason};
use crate::types::{BuildRequestEvent, RequestId};

/// Registry that reports every outcome through `tracing` and keeps nothing.
pub struct LoggingRequestRegistry;

impl BuildRequestRegistry for LoggingRequestRegistry {
    fn request_queued(&self, request: &BuildRequestEvent) {
        tracing::debug!(request_id = %request.id(), owner = %request.owner(), "request queued");
    }

    fn request_activated(&self, request: &BuildRequestEvent, build_number: u64) {
        tracing::info!(
            request_id = %request.id(),
            owner = %request.owner(),
            build_number,
            "request activated"
        );
    }

    fn request_rejected(&self, request: &BuildRequestEvent, reason: RejectionReason) {
        tracing::warn!(
            request_id = %request.id(),
            owner = %request.owner(),
            reason = %reason,
            "request rejected"
        );
    }

    fn request_cancelled(&self, request: &BuildRequestEvent) {
        tracing::debug!(request_id = %request.id(), owner = %request.owner(), "request cancelled");
    }

    fn request_assimilated(&self, request: &BuildRequestEvent, target: RequestId) {
        tracing::debug!(
            request_id = %request.id(),
            owner = %request.owner(),
            target = %target,
            "request assimilated"
        );
    }
}

/// One admission outcome as seen by a [`RecordingRequestRegistry`].
#[derive(Debug, Clone, PartialEq)]
pub enum RequestOutcome {
    Queued(RequestId),
    Activated {
        request_id: RequestId,
        build_number: u64,
    },
    Rejected {
        request_id: RequestId,
        reason: RejectionReason,
    },
    Cancelled(RequestId),
    Assimilated {
        request_id: RequestId,
        target: RequestId,
    },
}

impl RequestOutcome {
    /// The request the outcome is about.
    pub fn request_id(&self) -> RequestId {
        match self {
            RequestOutcome::Queued(id) | RequestOutcome::Cancelled(id) => *id,
            RequestOutcome::Activated { request_id, .. }
            | RequestOutcome::Rejected { request_id, .. }
            | RequestOutcome::Assimilated { request_id, .. } => *request_id,
        }
    }
}

/// Registry that records outcomes in arrival order for later inspection.
#[derive(Default)]
pub struct RecordingRequestRegistry {
    outcomes: Mutex<Vec<RequestOutcome>>,
}

impl RecordingRequestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every outcome recorded so far.
    pub fn outcomes(&self) -> Vec<RequestOutcome> {
        self.outcomes.lock().clone()
    }

    /// Outcomes recorded for a single request.
    pub fn outcomes_for(&self, request_id: RequestId) -> Vec<RequestOutcome> {
        self.outcomes
            .lock()
            .iter()
            .filter(|o| o.request_id() == request_id)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.outcomes.lock().clear();
    }

    fn record(&self, outcome: RequestOutcome) {
        self.outcomes.lock().push(outcome);
    }
}

impl BuildRequestRegistry for RecordingRequestRegistry {
    fn request_queued(&self, request: &BuildRequestEvent) {
        self.record(RequestOutcome::Queued(request.id()));
    }

    fn request_activated(&self, request: &BuildRequestEvent, build_number: u64) {
        self.record(RequestOutcome::Activated {
            request_id: request.id(),
            build_number,
        });
    }

    fn request_rejected(&self, request: &BuildRequestEvent, reason: RejectionReason) {
        self.record(RequestOutcome::Rejected {
            request_id: request.id(),
            reason,
        });
    }

    fn request_cancelled(&self, request: &BuildRequestEvent) {
        self.record(RequestOutcome::Cancelled(request.id()));
    }

    fn request_assimilated(&self, request: &BuildRequestEvent, target: RequestId) {
        self.record(RequestOutcome::Assimilated {
            request_id: request.id(),
            target,
        });
    }
}
