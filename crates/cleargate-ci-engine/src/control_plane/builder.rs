//! Control plane builder: assembles the scheduler, queues and dispatcher.

use std::sync::Arc;

use tokio::sync::broadcast;

use super::config::ControlPlaneConfig;
use super::error::ControlPlaneError;
use super::ControlPlane;
use crate::defaults::{AllowAllAccessManager, InMemoryTriggerStore, LoggingRequestRegistry};
use crate::dispatch::RecipeDispatcher;
use crate::events::EventBus;
use crate::queue::{BuildQueueService, QueueCollaborators};
use crate::scheduling::{NoopSchedulerStrategy, TriggerScheduler};
use crate::traits::{
    AccessManager, BuildControllerFactory, BuildRequestRegistry, SchedulerStrategy, TriggerStore,
};

/// Builder for the [`ControlPlane`].
///
/// Only the build controller factory is required. Everything else falls
/// back to a local default during [`build()`](ControlPlaneBuilder::build).
pub struct ControlPlaneBuilder {
    config: ControlPlaneConfig,
    trigger_store: Option<Arc<dyn TriggerStore>>,
    strategies: Vec<Arc<dyn SchedulerStrategy>>,
    controller_factory: Option<Arc<dyn BuildControllerFactory>>,
    access: Option<Arc<dyn AccessManager>>,
    registry: Option<Arc<dyn BuildRequestRegistry>>,
    bus: Option<EventBus>,
}

impl ControlPlaneBuilder {
    pub(super) fn new() -> Self {
        Self {
            config: ControlPlaneConfig::default(),
            trigger_store: None,
            strategies: Vec::new(),
            controller_factory: None,
            access: None,
            registry: None,
            bus: None,
        }
    }

    /// Set the configuration. Default: [`ControlPlaneConfig::default()`].
    pub fn config(mut self, config: ControlPlaneConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the trigger store. Default: [`InMemoryTriggerStore`].
    pub fn trigger_store(mut self, store: impl TriggerStore + 'static) -> Self {
        self.trigger_store = Some(Arc::new(store));
        self
    }

    /// Register a scheduler strategy. Strategies are registered in call
    /// order after the built-in `noop` strategy, so a later strategy
    /// claiming the same trigger type replaces an earlier one.
    pub fn strategy(mut self, strategy: Arc<dyn SchedulerStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    /// Set the build controller factory. Required.
    pub fn controller_factory(mut self, factory: impl BuildControllerFactory + 'static) -> Self {
        self.controller_factory = Some(Arc::new(factory));
        self
    }

    /// Set the access manager. Default: [`AllowAllAccessManager`].
    pub fn access_manager(mut self, access: impl AccessManager + 'static) -> Self {
        self.access = Some(Arc::new(access));
        self
    }

    /// Set the request registry. Default: [`LoggingRequestRegistry`].
    pub fn request_registry(mut self, registry: Arc<dyn BuildRequestRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Use an existing event bus. Default: a new bus sized by
    /// `event_capacity`.
    pub fn event_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Assemble the control plane. Nothing runs until
    /// [`ControlPlane::start()`] is called.
    pub fn build(self) -> Result<ControlPlane, ControlPlaneError> {
        let factory = self
            .controller_factory
            .ok_or_else(|| ControlPlaneError::Build {
                message: "a build controller factory is required".into(),
            })?;

        let store: Arc<dyn TriggerStore> = self
            .trigger_store
            .unwrap_or_else(|| Arc::new(InMemoryTriggerStore::new()));
        let access: Arc<dyn AccessManager> =
            self.access.unwrap_or_else(|| Arc::new(AllowAllAccessManager));
        let registry: Arc<dyn BuildRequestRegistry> = self
            .registry
            .unwrap_or_else(|| Arc::new(LoggingRequestRegistry));
        let bus = self
            .bus
            .unwrap_or_else(|| EventBus::new(self.config.event_capacity));

        let scheduler = TriggerScheduler::new(store);
        scheduler.register(Arc::new(NoopSchedulerStrategy));
        for strategy in self.strategies {
            scheduler.register(strategy);
        }

        let queues = BuildQueueService::new(
            QueueCollaborators {
                factory,
                access,
                registry,
                bus: bus.clone(),
            },
            self.config.clone(),
        );
        let dispatcher = RecipeDispatcher::new(bus.clone(), self.config.dispatch_workers);
        let (shutdown_tx, _) = broadcast::channel(1);

        tracing::debug!(
            strategies = ?scheduler.strategies().keys(),
            dispatch_workers = dispatcher.workers(),
            "control plane assembled"
        );

        Ok(ControlPlane {
            config: self.config,
            bus,
            scheduler: Arc::new(scheduler),
            queues: Arc::new(queues),
            dispatcher: Arc::new(dispatcher),
            shutdown_tx,
            handles: tokio::sync::Mutex::new(Vec::new()),
        })
    }
}
