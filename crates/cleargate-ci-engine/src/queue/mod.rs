//! Per-owner build admission.
//!
//! - [`OwnerBuildQueue`] holds the queued and active builds of one owner
//!   and applies the admission rules. It is single-writer.
//! - [`OwnerQueueHandle`] runs one queue inside its own task and serializes
//!   every call through a command mailbox.
//! - [`BuildQueueService`] creates queues per owner on demand and routes
//!   requests and completions to them.

pub mod handle;
pub mod owner_queue;
pub mod service;

pub use handle::{OwnerQueueHandle, QueueSnapshot};
pub use owner_queue::{ActiveBuild, OwnerBuildQueue, QueueCollaborators};
pub use service::BuildQueueService;
