//! Collaborator interfaces for the control plane.
//!
//! Every component the control plane consumes but does not own is defined
//! here as a trait. Anything that may touch I/O is an async trait; the
//! request registry is a plain observer and stays synchronous. Default
//! implementations for local use live in [`defaults`](crate::defaults).

use std::sync::Arc;

use async_trait::async_trait;

use super::errors::*;
use super::types::*;

// ---------------------------------------------------------------------------
// TriggerStore
// ---------------------------------------------------------------------------

/// Persistence for non-transient triggers.
///
/// Transient triggers never reach the store.
#[async_trait]
pub trait TriggerStore: Send + Sync {
    async fn find_all(&self) -> Result<Vec<Trigger>, TriggerStoreError>;

    async fn find_by_id(&self, id: TriggerId) -> Result<Option<Trigger>, TriggerStoreError>;

    async fn find_by_project(&self, project: ProjectId) -> Result<Vec<Trigger>, TriggerStoreError>;

    async fn find_by_group(&self, group: &str) -> Result<Vec<Trigger>, TriggerStoreError>;

    async fn find_by_name_and_group(
        &self,
        name: &str,
        group: &str,
    ) -> Result<Option<Trigger>, TriggerStoreError>;

    async fn find_by_project_and_name(
        &self,
        project: ProjectId,
        name: &str,
    ) -> Result<Option<Trigger>, TriggerStoreError>;

    /// Insert or update by trigger id.
    async fn save(&self, trigger: &Trigger) -> Result<(), TriggerStoreError>;

    async fn delete(&self, trigger: &Trigger) -> Result<(), TriggerStoreError>;
}

// ---------------------------------------------------------------------------
// SchedulerStrategy
// ---------------------------------------------------------------------------

/// Arms and disarms triggers of particular types against their external
/// stimulus (timers, SCM polling, events).
///
/// The scheduler owns trigger state; strategies only act on it.
#[async_trait]
pub trait SchedulerStrategy: Send + Sync {
    /// Trigger type keys this strategy handles.
    fn can_handle(&self) -> Vec<String>;

    /// Re-arm a trigger loaded at start-up.
    async fn init(&self, trigger: &Trigger) -> Result<(), SchedulingError>;

    async fn schedule(&self, trigger: &Trigger) -> Result<(), SchedulingError>;

    async fn unschedule(&self, trigger: &Trigger) -> Result<(), SchedulingError>;

    async fn pause(&self, trigger: &Trigger) -> Result<(), SchedulingError>;

    async fn resume(&self, trigger: &Trigger) -> Result<(), SchedulingError>;

    /// Stop firing. `force` asks the strategy not to wait for in-progress
    /// firings.
    async fn stop(&self, force: bool);
}

// ---------------------------------------------------------------------------
// Build control
// ---------------------------------------------------------------------------

/// Creates the controller that drives one build.
pub trait BuildControllerFactory: Send + Sync {
    fn create(&self, request: &BuildRequestEvent) -> Arc<dyn BuildController>;
}

/// The build state machine, consumed as an opaque collaborator.
#[async_trait]
pub trait BuildController: Send + Sync {
    /// Start the build, returning its build number.
    async fn start(&self) -> Result<u64, BuildControllerError>;

    /// Id of the build result this controller manages.
    fn build_result_id(&self) -> BuildResultId;

    /// Move the build to `revision` if it has not yet fixed one.
    ///
    /// Returns `Ok(false)` when the revision is already fixed, and an error
    /// when the update is structurally invalid.
    async fn update_revision_if_not_fixed(
        &self,
        revision: Option<&Revision>,
    ) -> Result<bool, BuildControllerError>;
}

// ---------------------------------------------------------------------------
// AccessManager
// ---------------------------------------------------------------------------

/// Action checked before a queued request may be cancelled.
pub const ACTION_CANCEL_BUILD: &str = "cancelBuild";

/// Authorization for actions on build requests.
pub trait AccessManager: Send + Sync {
    /// Fail unless `principal` may perform `action` on `request`.
    fn ensure_permission(
        &self,
        principal: &str,
        action: &str,
        request: &BuildRequestEvent,
    ) -> Result<(), AccessError>;
}

// ---------------------------------------------------------------------------
// BuildRequestRegistry
// ---------------------------------------------------------------------------

/// Why a request was dropped without running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum RejectionReason {
    /// The request was handed to the queue of a different owner.
    OwnerMismatch,
    /// The queue was stopped before the request could activate.
    QueueStopped,
    /// The build controller failed to start the build.
    ControllerFailed,
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectionReason::OwnerMismatch => f.write_str("illegal request: owner mismatch"),
            RejectionReason::QueueStopped => f.write_str("queue stopped"),
            RejectionReason::ControllerFailed => f.write_str("build controller failed to start"),
        }
    }
}

/// Side channel for admission outcomes.
///
/// These are steady-state results, not errors, so queues report them here
/// instead of through return values. Implementations must not block.
pub trait BuildRequestRegistry: Send + Sync {
    fn request_queued(&self, request: &BuildRequestEvent);

    fn request_activated(&self, request: &BuildRequestEvent, build_number: u64);

    fn request_rejected(&self, request: &BuildRequestEvent, reason: RejectionReason);

    fn request_cancelled(&self, request: &BuildRequestEvent);

    /// `request` was folded into the existing request `target`.
    fn request_assimilated(&self, request: &BuildRequestEvent, target: RequestId);
}

// ---------------------------------------------------------------------------
// AgentService
// ---------------------------------------------------------------------------

/// Remote build service exposed by an agent.
#[async_trait]
pub trait AgentService: Send + Sync {
    /// Agent name for diagnostics and events.
    fn name(&self) -> &str;

    /// Hand a recipe to the agent for execution.
    async fn build(&self, request: &RecipeRequest) -> Result<(), AgentError>;
}
