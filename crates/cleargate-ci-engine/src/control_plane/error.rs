//! Control plane error types.

use thiserror::Error;

use crate::errors::{BuildQueueError, SchedulingError};

/// Errors from [`ControlPlane`](super::ControlPlane) assembly and lifecycle.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ControlPlaneError {
    /// A required collaborator was not supplied to the builder.
    #[error("build error: {message}")]
    Build { message: String },
    /// `start()` was called on a running control plane.
    #[error("control plane already started")]
    AlreadyStarted,
    #[error("scheduling error: {0}")]
    Scheduling(#[from] SchedulingError),
    #[error("build queue error: {0}")]
    Queue(#[from] BuildQueueError),
}
