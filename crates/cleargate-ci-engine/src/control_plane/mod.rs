//! Control plane assembly: the single entry point for the crate.
//!
//! The [`ControlPlane`] wires the trigger scheduler, the per-owner build
//! queues and the recipe dispatcher onto one event bus. Construct via
//! [`ControlPlane::builder()`].
//!
//! ```rust,ignore
//! let plane = ControlPlane::builder()
//!     .controller_factory(MyControllerFactory::new())
//!     .strategy(Arc::new(CronStrategy::new()))
//!     .config(config)
//!     .build()?;
//!
//! plane.start().await?;
//! plane.submit(request).await?;
//! plane.shutdown(false).await;
//! ```

mod builder;
pub mod config;
pub mod error;

pub use builder::ControlPlaneBuilder;
pub use config::ControlPlaneConfig;
pub use error::ControlPlaneError;

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::dispatch::RecipeDispatcher;
use crate::events::{BusEvent, EventBus};
use crate::queue::{BuildQueueService, QueueSnapshot};
use crate::scheduling::TriggerScheduler;
use crate::types::{BuildRequestEvent, BuildResultId, Owner, RequestId};

/// The assembled build orchestration control plane.
pub struct ControlPlane {
    pub(super) config: ControlPlaneConfig,
    pub(super) bus: EventBus,
    pub(super) scheduler: Arc<TriggerScheduler>,
    pub(super) queues: Arc<BuildQueueService>,
    pub(super) dispatcher: Arc<RecipeDispatcher>,
    pub(super) shutdown_tx: broadcast::Sender<()>,
    /// Dispatch loop and completion listener, while running.
    pub(super) handles: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl ControlPlane {
    /// Create a new [`ControlPlaneBuilder`].
    pub fn builder() -> ControlPlaneBuilder {
        ControlPlaneBuilder::new()
    }

    /// Start the dispatch loop and the completion listener, then run the
    /// scheduler's start-up pass.
    ///
    /// The listeners subscribe before any trigger is armed, so nothing
    /// published during start-up is missed.
    pub async fn start(&self) -> Result<(), ControlPlaneError> {
        let mut handles = self.handles.lock().await;
        if !handles.is_empty() {
            return Err(ControlPlaneError::AlreadyStarted);
        }

        let dispatcher = Arc::clone(&self.dispatcher);
        let events = self.bus.subscribe_lossless(BusEvent::is_recipe_assigned);
        let shutdown = self.shutdown_tx.subscribe();
        handles.push(tokio::spawn(async move {
            dispatcher.run(events, shutdown).await
        }));

        let queues = Arc::clone(&self.queues);
        let events = self.bus.subscribe_lossless(BusEvent::is_build_completed);
        let shutdown = self.shutdown_tx.subscribe();
        handles.push(tokio::spawn(async move {
            queues.listen_for_completions(events, shutdown).await
        }));
        drop(handles);

        self.scheduler.start().await?;
        tracing::info!("control plane started");
        Ok(())
    }

    /// Stop the scheduler (forwarding `force` to every strategy), stop
    /// every build queue, then stop the listeners and wait for them.
    ///
    /// Active builds and in-flight agent calls are not interrupted.
    pub async fn shutdown(&self, force: bool) {
        self.scheduler.stop(force).await;
        self.queues.stop_all().await;

        // No receivers means nothing was started.
        let _ = self.shutdown_tx.send(());
        let handles = std::mem::take(&mut *self.handles.lock().await);
        for handle in handles {
            let _ = handle.await;
        }

        self.queues.close().await;
        tracing::info!(force, "control plane shut down");
    }

    /// Route a build request to its owner's queue.
    pub async fn submit(&self, request: BuildRequestEvent) -> Result<(), ControlPlaneError> {
        Ok(self.queues.handle_request(request).await?)
    }

    /// Report a finished build directly, without going through the bus.
    pub async fn complete(
        &self,
        owner: Owner,
        build_result_id: BuildResultId,
    ) -> Result<bool, ControlPlaneError> {
        Ok(self
            .queues
            .handle_build_completed(owner, build_result_id)
            .await?)
    }

    /// Cancel a queued request on behalf of `principal`.
    pub async fn cancel(
        &self,
        owner: Owner,
        request_id: RequestId,
        principal: &str,
    ) -> Result<bool, ControlPlaneError> {
        Ok(self
            .queues
            .cancel_queued_request(owner, request_id, principal)
            .await?)
    }

    pub async fn queue_snapshot(&self, owner: Owner) -> Result<Option<QueueSnapshot>, ControlPlaneError> {
        Ok(self.queues.snapshot(owner).await?)
    }

    pub fn scheduler(&self) -> &Arc<TriggerScheduler> {
        &self.scheduler
    }

    pub fn queues(&self) -> &Arc<BuildQueueService> {
        &self.queues
    }

    pub fn dispatcher(&self) -> &Arc<RecipeDispatcher> {
        &self.dispatcher
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn config(&self) -> &ControlPlaneConfig {
        &self.config
    }
}

impl std::fmt::Debug for ControlPlane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlPlane")
            .field("config", &self.config)
            .field("bus", &self.bus)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::{RecordingRequestRegistry, RequestOutcome};
    use crate::errors::{AgentError, SchedulingError};
    use crate::events::{BusEvent, RecipeAssignedEvent};
    use crate::queue::owner_queue::tests::{manual, MockFactory};
    use crate::scheduling::NOOP_TRIGGER_TYPE;
    use crate::traits::{AgentService, RejectionReason, SchedulerStrategy};
    use crate::types::{ProjectId, RecipeId, RecipeRequest, Trigger, TriggerState};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::time::Duration;

    const OWNER: Owner = Owner::Project(ProjectId(11));

    /// Install a test subscriber once so `RUST_LOG` output shows up in
    /// failing runs.
    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    /// Strategy that records which triggers were armed and whether it was
    /// stopped with `force`.
    #[derive(Default)]
    struct TimerStrategy {
        armed: Mutex<Vec<String>>,
        stopped: Mutex<Option<bool>>,
    }

    #[async_trait]
    impl SchedulerStrategy for TimerStrategy {
        fn can_handle(&self) -> Vec<String> {
            vec!["timer".into()]
        }
        async fn init(&self, trigger: &Trigger) -> Result<(), SchedulingError> {
            self.armed.lock().push(trigger.name.clone());
            Ok(())
        }
        async fn schedule(&self, trigger: &Trigger) -> Result<(), SchedulingError> {
            self.armed.lock().push(trigger.name.clone());
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
        async fn stop(&self, force: bool) {
            *self.stopped.lock() = Some(force);
        }
    }

    struct EchoAgent;

    #[async_trait]
    impl AgentService for EchoAgent {
        fn name(&self) -> &str {
            "echo"
        }
        async fn build(&self, _request: &RecipeRequest) -> Result<(), AgentError> {
            Ok(())
        }
    }

    async fn next_matching(
        events: &mut broadcast::Receiver<BusEvent>,
        matches: impl Fn(&BusEvent) -> bool,
    ) -> BusEvent {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Ok(event) = events.recv().await {
                    if matches(&event) {
                        return event;
                    }
                }
            }
        })
        .await
        .unwrap()
    }

    #[test]
    fn test_build_requires_controller_factory() {
        let err = ControlPlane::builder().build().unwrap_err();
        assert!(matches!(err, ControlPlaneError::Build { .. }));
    }

    #[tokio::test]
    async fn test_full_flow() {
        init_tracing();
        let timer = Arc::new(TimerStrategy::default());
        let registry = Arc::new(RecordingRequestRegistry::new());
        let plane = ControlPlane::builder()
            .controller_factory(MockFactory::default())
            .strategy(timer.clone())
            .request_registry(registry.clone())
            .build()
            .unwrap();
        let mut events = plane.bus().subscribe();

        let mut nightly = Trigger::new("nightly", "project:11", "timer");
        plane.scheduler().schedule(&mut nightly).await.unwrap();
        plane.start().await.unwrap();
        assert!(matches!(plane.start().await, Err(ControlPlaneError::AlreadyStarted)));
        assert_eq!(*timer.armed.lock(), vec!["nightly".to_string()]);

        let mut manual_trigger = Trigger::new("manual", "project:11", NOOP_TRIGGER_TYPE);
        plane.scheduler().schedule(&mut manual_trigger).await.unwrap();
        assert_eq!(manual_trigger.state, TriggerState::Scheduled);

        // Admission and completion over the bus.
        let waiting = manual(OWNER);
        plane.submit(manual(OWNER)).await.unwrap();
        plane.submit(waiting.clone()).await.unwrap();
        plane.bus().publish(BusEvent::BuildCompleted {
            owner: OWNER,
            build_result_id: BuildResultId(101),
        });
        let activated = next_matching(&mut events, |e| {
            matches!(e, BusEvent::BuildActivated { request, .. } if request.id() == waiting.id())
        })
        .await;
        assert!(matches!(activated, BusEvent::BuildActivated { build_number: 2, .. }));

        // Dispatch over the bus.
        plane.bus().publish(BusEvent::RecipeAssigned(RecipeAssignedEvent {
            recipe_id: RecipeId(5),
            agent: Arc::new(EchoAgent),
            request: RecipeRequest {
                recipe_id: RecipeId(5),
                owner: OWNER,
                build_result_id: BuildResultId(102),
                stage: "default".into(),
                payload: serde_json::Value::Null,
            },
        }));
        next_matching(&mut events, |e| {
            matches!(e, BusEvent::RecipeDispatched { recipe_id, .. } if *recipe_id == RecipeId(5))
        })
        .await;

        plane.shutdown(true).await;
        assert_eq!(*timer.stopped.lock(), Some(true));
        assert!(!plane.scheduler().is_started().await);

        // Queues stay stopped after shutdown.
        let late = manual(OWNER);
        plane.submit(late.clone()).await.unwrap();
        assert_eq!(
            registry.outcomes_for(late.id()),
            vec![RequestOutcome::Rejected {
                request_id: late.id(),
                reason: RejectionReason::QueueStopped,
            }]
        );
    }

    #[tokio::test]
    async fn test_direct_completion_and_cancel() {
        let plane = ControlPlane::builder()
            .controller_factory(MockFactory::default())
            .build()
            .unwrap();

        let waiting = manual(OWNER);
        let cancelled = manual(OWNER);
        plane.submit(manual(OWNER)).await.unwrap();
        plane.submit(waiting.clone()).await.unwrap();
        plane.submit(cancelled.clone()).await.unwrap();

        assert!(plane.cancel(OWNER, cancelled.id(), "admin").await.unwrap());
        assert!(plane.complete(OWNER, BuildResultId(101)).await.unwrap());

        let snapshot = plane.queue_snapshot(OWNER).await.unwrap().unwrap();
        assert_eq!(snapshot.active.len(), 1);
        assert_eq!(snapshot.active[0].request().id(), waiting.id());
        assert!(snapshot.queued.is_empty());

        let held = plane.queues().queue_for(OWNER);
        tokio::time::timeout(Duration::from_secs(2), plane.shutdown(false))
            .await
            .unwrap();
        assert!(held.snapshot().await.is_err());
    }
}
