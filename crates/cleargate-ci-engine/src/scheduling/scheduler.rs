//! Trigger lifecycle management.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::errors::SchedulingError;
use crate::traits::{SchedulerStrategy, TriggerStore};
use crate::types::{ProjectId, Trigger, TriggerId, TriggerState};

use super::registry::StrategyRegistry;

/// Owns trigger state and delegates arming to [`SchedulerStrategy`]
/// plugins.
///
/// Persistent triggers live in the [`TriggerStore`]; transient triggers are
/// kept in memory only. Until [`start()`](Self::start) has run, newly
/// scheduled triggers are persisted but not armed; `start()` arms
/// everything it finds.
///
/// The start-up pass and the `started` flag are guarded by one async lock,
/// which `schedule()` also takes, so a trigger scheduled while start-up is
/// in progress is armed exactly once. The other lifecycle operations are
/// not serialized against each other: callers serialize changes to any one
/// trigger.
pub struct TriggerScheduler {
    strategies: StrategyRegistry,
    store: Arc<dyn TriggerStore>,
    transient: Mutex<Vec<Trigger>>,
    started: tokio::sync::Mutex<bool>,
}

impl TriggerScheduler {
    /// Create a scheduler backed by `store` with no strategies registered.
    pub fn new(store: Arc<dyn TriggerStore>) -> Self {
        Self::with_registry(store, StrategyRegistry::new())
    }

    /// Create a scheduler that shares an existing strategy registry.
    pub fn with_registry(store: Arc<dyn TriggerStore>, strategies: StrategyRegistry) -> Self {
        Self {
            strategies,
            store,
            transient: Mutex::new(Vec::new()),
            started: tokio::sync::Mutex::new(false),
        }
    }

    /// Register a strategy for every trigger type it handles (last wins).
    pub fn register(&self, strategy: Arc<dyn SchedulerStrategy>) {
        self.strategies.register(strategy);
    }

    /// Replace all registered strategies with `strategies`.
    pub fn set_strategies(&self, strategies: Vec<Arc<dyn SchedulerStrategy>>) {
        self.strategies.replace_all(strategies);
    }

    pub fn strategies(&self) -> &StrategyRegistry {
        &self.strategies
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Initialise every valid persisted trigger and every transient trigger
    /// with its strategy, then mark the scheduler started.
    ///
    /// Invalid triggers and individual `init` failures are logged and
    /// skipped. The scheduler is marked started even if loading the
    /// persisted triggers fails.
    pub async fn start(&self) -> Result<(), SchedulingError> {
        let mut started = self.started.lock().await;
        let result = self.init_all().await;
        *started = true;
        tracing::info!("trigger scheduler started");
        result
    }

    async fn init_all(&self) -> Result<(), SchedulingError> {
        for trigger in self.store.find_all().await? {
            if is_trigger_valid(&trigger) {
                self.init_trigger(&trigger).await;
            }
        }

        let transient = self.transient.lock().clone();
        for trigger in &transient {
            self.init_trigger(trigger).await;
        }
        Ok(())
    }

    async fn init_trigger(&self, trigger: &Trigger) {
        let result = match self.strategy_for(trigger) {
            Ok(strategy) => strategy.init(trigger).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            tracing::error!(
                group = %trigger.group,
                name = %trigger.name,
                error = %e,
                "failed to initialise trigger"
            );
        }
    }

    /// Ask every registered strategy to stop and clear the started flag.
    /// A no-op if the scheduler never started.
    pub async fn stop(&self, force: bool) {
        let mut started = self.started.lock().await;
        if !*started {
            return;
        }
        for strategy in self.strategies.strategies() {
            strategy.stop(force).await;
        }
        *started = false;
        tracing::info!(force, "trigger scheduler stopped");
    }

    pub async fn is_started(&self) -> bool {
        *self.started.lock().await
    }

    // -----------------------------------------------------------------------
    // Scheduling
    // -----------------------------------------------------------------------

    /// Schedule a new trigger: set it `Scheduled`, persist it (or keep it in
    /// memory when transient) and, once started, arm it.
    pub async fn schedule(&self, trigger: &mut Trigger) -> Result<(), SchedulingError> {
        let started = self.started.lock().await;

        if self
            .get_trigger(&trigger.name, &trigger.group)
            .await?
            .is_some()
        {
            return Err(SchedulingError::Duplicate {
                name: trigger.name.clone(),
                group: trigger.group.clone(),
            });
        }

        if trigger.is_scheduled() {
            return Err(SchedulingError::AlreadyScheduled);
        }

        let strategy = self.strategy_for(trigger)?;

        trigger.state = TriggerState::Scheduled;
        if trigger.transient {
            self.transient.lock().push(trigger.clone());
        } else {
            self.store.save(trigger).await?;
        }

        if *started {
            strategy.schedule(trigger).await?;
        }

        tracing::debug!(group = %trigger.group, name = %trigger.name, armed = *started, "trigger scheduled");
        Ok(())
    }

    /// Disarm and delete a scheduled (or paused) trigger.
    pub async fn unschedule(&self, trigger: &mut Trigger) -> Result<(), SchedulingError> {
        self.assert_scheduled(trigger)?;
        let strategy = self.strategy_for(trigger)?;
        strategy.unschedule(trigger).await?;

        trigger.state = TriggerState::None;

        if trigger.transient {
            self.transient.lock().retain(|t| t.id != trigger.id);
        } else {
            self.store.delete(trigger).await?;
        }

        tracing::debug!(group = %trigger.group, name = %trigger.name, "trigger unscheduled");
        Ok(())
    }

    /// Disarm the live registration ahead of a configuration change. The
    /// persisted trigger is left alone.
    pub async fn pre_update(&self, trigger: &Trigger) -> Result<(), SchedulingError> {
        self.assert_scheduled(trigger)?;
        self.strategy_for(trigger)?.unschedule(trigger).await
    }

    /// Persist the changed trigger and re-arm it according to its state.
    pub async fn post_update(&self, trigger: &Trigger) -> Result<(), SchedulingError> {
        self.assert_scheduled(trigger)?;

        self.persist(trigger).await?;

        let strategy = self.strategy_for(trigger)?;
        match trigger.state {
            TriggerState::Scheduled => strategy.schedule(trigger).await,
            TriggerState::Paused => strategy.pause(trigger).await,
            TriggerState::None => Ok(()),
        }
    }

    /// [`pre_update()`](Self::pre_update) followed by
    /// [`post_update()`](Self::post_update).
    pub async fn update(&self, trigger: &Trigger) -> Result<(), SchedulingError> {
        self.pre_update(trigger).await?;
        self.post_update(trigger).await
    }

    /// Pause a scheduled trigger. Already-paused triggers are left as is.
    pub async fn pause(&self, trigger: &mut Trigger) -> Result<(), SchedulingError> {
        self.assert_scheduled(trigger)?;
        if !trigger.is_active() {
            return Ok(());
        }

        trigger.state = TriggerState::Paused;
        self.persist(trigger).await?;

        self.strategy_for(trigger)?.pause(trigger).await
    }

    /// Resume a paused trigger. Triggers that are not paused are left as is.
    pub async fn resume(&self, trigger: &mut Trigger) -> Result<(), SchedulingError> {
        self.assert_scheduled(trigger)?;
        if !trigger.is_paused() {
            return Ok(());
        }

        trigger.state = TriggerState::Scheduled;
        self.persist(trigger).await?;

        self.strategy_for(trigger)?.resume(trigger).await
    }

    /// Pause every trigger in `group`.
    pub async fn pause_group(&self, group: &str) -> Result<(), SchedulingError> {
        for mut trigger in self.get_triggers_in_group(group).await? {
            self.pause(&mut trigger).await?;
        }
        Ok(())
    }

    /// Resume every trigger in `group`.
    pub async fn resume_group(&self, group: &str) -> Result<(), SchedulingError> {
        for mut trigger in self.get_triggers_in_group(group).await? {
            self.resume(&mut trigger).await?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Look up a live trigger by name and group, transient triggers first.
    pub async fn get_trigger(
        &self,
        name: &str,
        group: &str,
    ) -> Result<Option<Trigger>, SchedulingError> {
        if let Some(trigger) = self.find_transient(|t| t.has_name_and_group(name, group)) {
            return Ok(Some(trigger));
        }
        Ok(self.store.find_by_name_and_group(name, group).await?)
    }

    /// Look up a trigger by id, transient triggers first.
    pub async fn get_trigger_by_id(&self, id: TriggerId) -> Result<Option<Trigger>, SchedulingError> {
        if let Some(trigger) = self.find_transient(|t| t.id == id) {
            return Ok(Some(trigger));
        }
        Ok(self.store.find_by_id(id).await?)
    }

    /// Look up a project's trigger by name, transient triggers first.
    pub async fn get_project_trigger(
        &self,
        project: ProjectId,
        name: &str,
    ) -> Result<Option<Trigger>, SchedulingError> {
        if let Some(trigger) = self.find_transient(|t| t.project_id == Some(project) && t.name == name) {
            return Ok(Some(trigger));
        }
        Ok(self.store.find_by_project_and_name(project, name).await?)
    }

    /// All triggers: persisted first, then transient.
    pub async fn get_triggers(&self) -> Result<Vec<Trigger>, SchedulingError> {
        let mut triggers = self.store.find_all().await?;
        triggers.extend(self.transient.lock().iter().cloned());
        Ok(triggers)
    }

    pub async fn get_triggers_for_project(
        &self,
        project: ProjectId,
    ) -> Result<Vec<Trigger>, SchedulingError> {
        let mut triggers = self.store.find_by_project(project).await?;
        triggers.extend(
            self.transient
                .lock()
                .iter()
                .filter(|t| t.project_id == Some(project))
                .cloned(),
        );
        Ok(triggers)
    }

    pub async fn get_triggers_in_group(&self, group: &str) -> Result<Vec<Trigger>, SchedulingError> {
        let mut triggers = self.store.find_by_group(group).await?;
        triggers.extend(
            self.transient
                .lock()
                .iter()
                .filter(|t| t.group == group)
                .cloned(),
        );
        Ok(triggers)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn strategy_for(&self, trigger: &Trigger) -> Result<Arc<dyn SchedulerStrategy>, SchedulingError> {
        self.strategies
            .get(&trigger.trigger_type)
            .ok_or_else(|| SchedulingError::NoStrategy {
                trigger_type: trigger.trigger_type.clone(),
            })
    }

    fn find_transient(&self, predicate: impl Fn(&Trigger) -> bool) -> Option<Trigger> {
        self.transient.lock().iter().find(|t| predicate(t)).cloned()
    }

    /// Transient triggers count as scheduled while they are held in memory;
    /// persistent ones by their own state.
    fn is_scheduled(&self, trigger: &Trigger) -> bool {
        if trigger.transient {
            self.find_transient(|t| t.has_name_and_group(&trigger.name, &trigger.group))
                .is_some()
        } else {
            trigger.is_scheduled()
        }
    }

    fn assert_scheduled(&self, trigger: &Trigger) -> Result<(), SchedulingError> {
        if self.is_scheduled(trigger) {
            Ok(())
        } else {
            Err(SchedulingError::NotScheduled {
                name: trigger.name.clone(),
                group: trigger.group.clone(),
            })
        }
    }

    async fn persist(&self, trigger: &Trigger) -> Result<(), SchedulingError> {
        if trigger.transient {
            let mut transient = self.transient.lock();
            if let Some(slot) = transient.iter_mut().find(|t| t.id == trigger.id) {
                *slot = trigger.clone();
            }
            Ok(())
        } else {
            Ok(self.store.save(trigger).await?)
        }
    }
}

/// A project trigger must carry its configuration; without it the trigger
/// cannot be armed.
fn is_trigger_valid(trigger: &Trigger) -> bool {
    if trigger.project_id.is_some() && trigger.config.is_none() {
        tracing::warn!(
            group = %trigger.group,
            name = %trigger.name,
            id = %trigger.id,
            "project trigger has no configuration, skipping"
        );
        return false;
    }
    true
}
