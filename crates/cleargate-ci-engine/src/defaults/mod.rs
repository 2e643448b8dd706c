//! Default implementations for the pluggable control plane traits.
//!
//! These defaults let the control plane start with zero external
//! configuration. Each can be replaced via the control plane builder.

pub mod allow_all_access;
pub mod in_memory_trigger_store;
pub mod request_registry;

pub use allow_all_access::AllowAllAccessManager;
pub use in_memory_trigger_store::InMemoryTriggerStore;
pub use request_registry::{LoggingRequestRegistry, RecordingRequestRegistry, RequestOutcome};
