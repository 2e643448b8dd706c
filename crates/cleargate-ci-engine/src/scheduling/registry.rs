//! Registry mapping trigger type keys to scheduler strategies.
//!
//! Registration is last-wins per key: registering a strategy for a key that
//! already has one replaces the earlier strategy for that key only. Other
//! keys the earlier strategy handles are untouched.
//!
//! Cheap to clone: clones share one underlying map.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::traits::SchedulerStrategy;

/// Shared, read-mostly map from trigger type to [`SchedulerStrategy`].
#[derive(Clone, Default)]
pub struct StrategyRegistry {
    inner: Arc<RwLock<BTreeMap<String, Arc<dyn SchedulerStrategy>>>>,
}

impl StrategyRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `strategy` under every key it reports from
    /// [`can_handle()`](SchedulerStrategy::can_handle). Any strategy
    /// previously registered under one of those keys is replaced for that
    /// key.
    pub fn register(&self, strategy: Arc<dyn SchedulerStrategy>) {
        let mut guard = self.inner.write();
        for key in strategy.can_handle() {
            if guard.insert(key.clone(), Arc::clone(&strategy)).is_some() {
                tracing::debug!(trigger_type = %key, "replacing registered scheduler strategy");
            }
        }
    }

    /// Drop every registration, then register `strategies` in order.
    pub fn replace_all(&self, strategies: impl IntoIterator<Item = Arc<dyn SchedulerStrategy>>) {
        let mut guard = self.inner.write();
        guard.clear();
        for strategy in strategies {
            for key in strategy.can_handle() {
                guard.insert(key, Arc::clone(&strategy));
            }
        }
    }

    /// Strategy registered for exactly `trigger_type`.
    pub fn get(&self, trigger_type: &str) -> Option<Arc<dyn SchedulerStrategy>> {
        self.inner.read().get(trigger_type).cloned()
    }

    /// Every distinct registered strategy, once each, in key order of first
    /// appearance.
    pub fn strategies(&self) -> Vec<Arc<dyn SchedulerStrategy>> {
        let guard = self.inner.read();
        let mut distinct: Vec<Arc<dyn SchedulerStrategy>> = Vec::new();
        for strategy in guard.values() {
            if !distinct.iter().any(|s| Arc::ptr_eq(s, strategy)) {
                distinct.push(Arc::clone(strategy));
            }
        }
        distinct
    }

    /// Registered trigger type keys.
    pub fn keys(&self) -> Vec<String> {
        self.inner.read().keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

impl std::fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("keys", &self.keys())
            .finish()
    }
}
