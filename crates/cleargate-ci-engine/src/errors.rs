//! Error types for the control plane and its collaborator seams.

use thiserror::Error;

use crate::types::{Owner, RequestId};

/// Errors from [`TriggerStore`](super::traits::TriggerStore) implementations.
#[derive(Debug, Error)]
pub enum TriggerStoreError {
    #[error("trigger store error: {message}")]
    Store { message: String },
}

/// Errors raised by the [`TriggerScheduler`](crate::scheduling::TriggerScheduler)
/// and by [`SchedulerStrategy`](super::traits::SchedulerStrategy) plugins.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SchedulingError {
    #[error("a trigger with name {name} and group {group} has already been scheduled")]
    Duplicate { name: String, group: String },
    #[error("trigger is already scheduled")]
    AlreadyScheduled,
    #[error("no strategy associated with trigger of type {trigger_type}")]
    NoStrategy { trigger_type: String },
    #[error("trigger ({group}, {name}) must be scheduled")]
    NotScheduled { name: String, group: String },
    #[error("strategy error: {message}")]
    Strategy { message: String },
    #[error("trigger store error: {0}")]
    Store(#[from] TriggerStoreError),
}

/// Errors from [`BuildController`](super::traits::BuildController)s.
#[derive(Debug, Error)]
pub enum BuildControllerError {
    #[error("build controller error: {message}")]
    Controller { message: String },
    #[error("invalid revision update: {message}")]
    InvalidRevision { message: String },
}

/// Errors from [`AccessManager`](super::traits::AccessManager) checks.
#[derive(Debug, Error)]
pub enum AccessError {
    #[error("permission denied: {principal} may not {action} {resource}")]
    Denied {
        principal: String,
        action: String,
        resource: String,
    },
}

/// Errors from [`AgentService`](super::traits::AgentService) remote calls.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent unreachable: {message}")]
    Transport { message: String },
    #[error("agent rejected recipe: {message}")]
    Rejected { message: String },
}

/// Errors raised to callers of an owner build queue.
///
/// Expected admission outcomes (queued, merged, rejected because stopped,
/// cancelled) are reported through the
/// [`BuildRequestRegistry`](super::traits::BuildRequestRegistry), never here.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BuildQueueError {
    #[error("attempt to enqueue a build request for {actual} on the queue for {expected}")]
    OwnerMismatch { expected: Owner, actual: Owner },
    #[error("build request {request_id} is already active")]
    AlreadyActive { request_id: RequestId },
    #[error("controller error: {0}")]
    Controller(#[from] BuildControllerError),
    #[error("access error: {0}")]
    Access(#[from] AccessError),
    #[error("queue for {owner} is no longer running")]
    QueueClosed { owner: Owner },
}
