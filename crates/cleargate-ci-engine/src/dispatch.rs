//! Recipe dispatch to agents.
//!
//! Each recipe assignment is sent to its agent on a spawned task so a slow
//! or unreachable agent never holds up admission. At most `workers` agent
//! calls are in flight at once; further assignments wait for a permit.
//! Calls have no timeout and are never retried. The outcome is published
//! on the bus as `RecipeDispatched` or `RecipeError`.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::task::JoinHandle;

use crate::events::{BusEvent, EventBus, RecipeAssignedEvent};

/// Sends assigned recipes to agents in the background.
pub struct RecipeDispatcher {
    bus: EventBus,
    permits: Arc<Semaphore>,
    workers: usize,
}

impl RecipeDispatcher {
    /// Create a dispatcher that publishes to `bus` and runs at most
    /// `workers` agent calls concurrently (minimum 1).
    pub fn new(bus: EventBus, workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            bus,
            permits: Arc::new(Semaphore::new(workers)),
            workers,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Dispatch one assignment in the background.
    ///
    /// The returned handle resolves once the outcome event has been
    /// published. Dropping it does not cancel the call.
    pub fn dispatch(&self, assignment: RecipeAssignedEvent) -> JoinHandle<()> {
        let bus = self.bus.clone();
        let permits = Arc::clone(&self.permits);

        tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                tracing::warn!(recipe_id = %assignment.recipe_id, "dispatcher closed, dropping recipe");
                return;
            };
            deliver(&bus, assignment).await;
        })
    }

    /// Dispatch every `RecipeAssigned` event from `events` until `shutdown`
    /// fires or every publisher is gone. Calls already in flight are left
    /// to finish.
    ///
    /// `events` is normally
    /// `bus.subscribe_lossless(BusEvent::is_recipe_assigned)`.
    pub async fn run(
        &self,
        mut events: mpsc::UnboundedReceiver<BusEvent>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                received = events.recv() => match received {
                    Some(BusEvent::RecipeAssigned(assignment)) => {
                        self.dispatch(assignment);
                    }
                    Some(_) => {}
                    None => break,
                },
            }
        }
        tracing::debug!("recipe dispatcher stopped");
    }
}

impl std::fmt::Debug for RecipeDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecipeDispatcher")
            .field("workers", &self.workers)
            .field("available", &self.permits.available_permits())
            .finish()
    }
}

async fn deliver(bus: &EventBus, assignment: RecipeAssignedEvent) {
    let RecipeAssignedEvent {
        recipe_id,
        agent,
        request,
    } = assignment;

    match agent.build(&request).await {
        Ok(()) => {
            tracing::debug!(recipe_id = %recipe_id, agent = %agent.name(), "recipe dispatched");
            bus.publish(BusEvent::RecipeDispatched {
                recipe_id,
                agent: agent.name().to_string(),
            });
        }
        Err(e) => {
            tracing::warn!(
                recipe_id = %recipe_id,
                agent = %agent.name(),
                error = %e,
                "unable to dispatch recipe"
            );
            bus.publish(BusEvent::RecipeError {
                recipe_id,
                message: format!("Unable to dispatch recipe: {e}"),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AgentError;
    use crate::traits::AgentService;
    use crate::types::{BuildResultId, Owner, ProjectId, RecipeId, RecipeRequest};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Agent that either accepts every recipe or fails with a transport
    /// error.
    struct StubAgent {
        name: String,
        fail: bool,
        received: AtomicUsize,
    }

    impl StubAgent {
        fn new(name: &str, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                fail,
                received: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl AgentService for StubAgent {
        fn name(&self) -> &str {
            &self.name
        }

        async fn build(&self, _request: &RecipeRequest) -> Result<(), AgentError> {
            self.received.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AgentError::Transport {
                    message: "connection refused".into(),
                });
            }
            Ok(())
        }
    }

    /// Agent that tracks how many calls overlap.
    #[derive(Default)]
    struct SlowAgent {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl AgentService for SlowAgent {
        fn name(&self) -> &str {
            "slow"
        }

        async fn build(&self, _request: &RecipeRequest) -> Result<(), AgentError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn assignment(id: u64, agent: Arc<dyn AgentService>) -> RecipeAssignedEvent {
        RecipeAssignedEvent {
            recipe_id: RecipeId(id),
            agent,
            request: RecipeRequest {
                recipe_id: RecipeId(id),
                owner: Owner::Project(ProjectId(1)),
                build_result_id: BuildResultId(10),
                stage: "default".into(),
                payload: json!({ "command": "make" }),
            },
        }
    }

    fn drain(events: &mut broadcast::Receiver<BusEvent>) -> Vec<BusEvent> {
        let mut out = Vec::new();
        while let Ok(event) = events.try_recv() {
            out.push(event);
        }
        out
    }

    #[tokio::test]
    async fn test_failure_is_isolated_to_its_recipe() {
        let bus = EventBus::new(16);
        let mut events = bus.subscribe();
        let dispatcher = RecipeDispatcher::new(bus, 4);

        let broken = StubAgent::new("broken", true);
        let healthy = StubAgent::new("healthy", false);
        let failed = dispatcher.dispatch(assignment(1, broken.clone()));
        let succeeded = dispatcher.dispatch(assignment(2, healthy.clone()));
        failed.await.unwrap();
        succeeded.await.unwrap();

        let events = drain(&mut events);
        assert_eq!(events.len(), 2);
        assert!(events.iter().any(|e| matches!(
            e,
            BusEvent::RecipeError { recipe_id, message }
                if *recipe_id == RecipeId(1) && message.starts_with("Unable to dispatch recipe:")
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            BusEvent::RecipeDispatched { recipe_id, agent }
                if *recipe_id == RecipeId(2) && agent == "healthy"
        )));
        assert_eq!(broken.received.load(Ordering::SeqCst), 1, "never retried");
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded_by_workers() {
        let dispatcher = RecipeDispatcher::new(EventBus::new(64), 2);
        let agent = Arc::new(SlowAgent::default());

        let handles: Vec<_> = (0..6)
            .map(|id| dispatcher.dispatch(assignment(id, agent.clone())))
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(agent.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(agent.in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_run_dispatches_assigned_recipes_until_shutdown() {
        let bus = EventBus::new(16);
        let dispatcher = Arc::new(RecipeDispatcher::new(bus.clone(), 1));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let loop_events = bus.subscribe_lossless(BusEvent::is_recipe_assigned);
        let mut observed = bus.subscribe();
        let runner = {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move { dispatcher.run(loop_events, shutdown_rx).await })
        };

        bus.publish(BusEvent::RecipeAssigned(assignment(7, StubAgent::new("a1", false))));

        let dispatched = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Ok(BusEvent::RecipeDispatched { recipe_id, .. }) = observed.recv().await {
                    return recipe_id;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(dispatched, RecipeId(7));

        shutdown_tx.send(()).unwrap();
        runner.await.unwrap();
    }

    #[tokio::test]
    async fn test_run_dispatches_assignments_published_past_bus_capacity() {
        let bus = EventBus::new(2);
        let dispatcher = Arc::new(RecipeDispatcher::new(bus.clone(), 4));
        let agent = StubAgent::new("a1", false);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        // Published before the loop is polled, enough to overflow the bus.
        let loop_events = bus.subscribe_lossless(BusEvent::is_recipe_assigned);
        for id in 0..6 {
            bus.publish(BusEvent::RecipeAssigned(assignment(id, agent.clone())));
        }

        let runner = {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move { dispatcher.run(loop_events, shutdown_rx).await })
        };

        tokio::time::timeout(Duration::from_secs(5), async {
            while agent.received.load(Ordering::SeqCst) < 6 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        shutdown_tx.send(()).unwrap();
        runner.await.unwrap();
    }
}
