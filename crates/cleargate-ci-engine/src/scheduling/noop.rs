//! Strategy for triggers that are only ever fired by hand.

use async_trait::async_trait;

use crate::errors::SchedulingError;
use crate::traits::SchedulerStrategy;
use crate::types::Trigger;

/// Trigger type handled by [`NoopSchedulerStrategy`].
pub const NOOP_TRIGGER_TYPE: &str = "noop";

/// Accepts `noop` triggers and arms nothing. Their lifecycle is still
/// tracked by the scheduler so they can be listed, paused and removed.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSchedulerStrategy;

#[async_trait]
impl SchedulerStrategy for NoopSchedulerStrategy {
    fn can_handle(&self) -> Vec<String> {
        vec![NOOP_TRIGGER_TYPE.to_string()]
    }

    async fn init(&self, _trigger: &Trigger) -> Result<(), SchedulingError> {
        Ok(())
    }

    async fn schedule(&self, _trigger: &Trigger) -> Result<(), SchedulingError> {
        Ok(())
    }

    async fn unschedule(&self, _trigger: &Trigger) -> Result<(), SchedulingError> {
        Ok(())
    }

    async fn pause(&self, _trigger: &Trigger) -> Result<(), SchedulingError> {
        Ok(())
    }

    async fn resume(&self, _trigger: &Trigger) -> Result<(), SchedulingError> {
        Ok(())
    }

    async fn stop(&self, _force: bool) {}
}
