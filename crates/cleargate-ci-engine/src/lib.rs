//! Cleargate CI engine: the build orchestration control plane.
//!
//! This crate turns external stimuli into a bounded, ordered stream of
//! builds and recipe dispatches. It covers trigger lifecycle management,
//! per-owner build admission with a concurrency cap, and asynchronous
//! recipe dispatch to agents.
//!
//! Build execution, SCM access, persistence and authentication are
//! collaborators consumed through the traits in [`traits`]; the crate has
//! no dependency on web servers, databases or other application-level
//! concerns.

pub mod control_plane;
pub mod defaults;
pub mod dispatch;
pub mod errors;
pub mod events;
pub mod queue;
pub mod scheduling;
pub mod traits;
pub mod types;

// Re-export public types at the crate level.

// control_plane
pub use control_plane::{ControlPlane, ControlPlaneBuilder, ControlPlaneConfig, ControlPlaneError};

// defaults
pub use defaults::{
    AllowAllAccessManager, InMemoryTriggerStore, LoggingRequestRegistry, RecordingRequestRegistry,
    RequestOutcome,
};

// dispatch
pub use dispatch::RecipeDispatcher;

// errors
pub use errors::{
    AccessError, AgentError, BuildControllerError, BuildQueueError, SchedulingError,
    TriggerStoreError,
};

// events
pub use events::{BusEvent, EventBus, Outbox, RecipeAssignedEvent};

// queue
pub use queue::{
    ActiveBuild, BuildQueueService, OwnerBuildQueue, OwnerQueueHandle, QueueCollaborators,
    QueueSnapshot,
};

// scheduling
pub use scheduling::{NoopSchedulerStrategy, StrategyRegistry, TriggerScheduler, NOOP_TRIGGER_TYPE};

// traits
pub use traits::{
    AccessManager, AgentService, BuildController, BuildControllerFactory, BuildRequestRegistry,
    RejectionReason, SchedulerStrategy, TriggerStore, ACTION_CANCEL_BUILD,
};

// types
pub use types::{
    BuildReason, BuildRequestEvent, BuildResultId, Owner, ProjectId, RecipeId, RecipeRequest,
    RequestId, Revision, Trigger, TriggerId, TriggerOptions, TriggerState, UserId,
};
