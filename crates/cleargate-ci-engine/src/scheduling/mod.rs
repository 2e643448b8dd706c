//! Trigger scheduling: the strategy registry, the scheduler that owns
//! trigger lifecycle state, and the built-in `noop` strategy.

pub mod noop;
pub mod registry;
pub mod scheduler;

pub use noop::{NoopSchedulerStrategy, NOOP_TRIGGER_TYPE};
pub use registry::StrategyRegistry;
pub use scheduler::TriggerScheduler;
