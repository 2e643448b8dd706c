//! In-memory trigger store for testing and single-process deployments.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::errors::TriggerStoreError;
use crate::traits::TriggerStore;
use crate::types::{ProjectId, Trigger, TriggerId};

/// In-memory implementation of [`TriggerStore`].
///
/// Keyed by [`TriggerId`] in a `BTreeMap` so listing order is stable.
/// Contents are lost when the process exits.
pub struct InMemoryTriggerStore {
    triggers: RwLock<BTreeMap<TriggerId, Trigger>>,
}

impl InMemoryTriggerStore {
    pub fn new() -> Self {
        Self {
            triggers: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of stored triggers.
    pub async fn len(&self) -> usize {
        self.triggers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.triggers.read().await.is_empty()
    }
}

impl Default for InMemoryTriggerStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TriggerStore for InMemoryTriggerStore {
    async fn find_all(&self) -> Result<Vec<Trigger>, TriggerStoreError> {
        Ok(self.triggers.read().await.values().cloned().collect())
    }

    async fn find_by_id(&self, id: TriggerId) -> Result<Option<Trigger>, TriggerStoreError> {
        Ok(self.triggers.read().await.get(&id).cloned())
    }

    async fn find_by_project(&self, project: ProjectId) -> Result<Vec<Trigger>, TriggerStoreError> {
        let guard = self.triggers.read().await;
        Ok(guard
            .values()
            .filter(|t| t.project_id == Some(project))
            .cloned()
            .collect())
    }

    async fn find_by_group(&self, group: &str) -> Result<Vec<Trigger>, TriggerStoreError> {
        let guard = self.triggers.read().await;
        Ok(guard
            .values()
            .filter(|t| t.group == group)
            .cloned()
            .collect())
    }

    async fn find_by_name_and_group(
        &self,
        name: &str,
        group: &str,
    ) -> Result<Option<Trigger>, TriggerStoreError> {
        let guard = self.triggers.read().await;
        Ok(guard
            .values()
            .find(|t| t.has_name_and_group(name, group))
            .cloned())
    }

    async fn find_by_project_and_name(
        &self,
        project: ProjectId,
        name: &str,
    ) -> Result<Option<Trigger>, TriggerStoreError> {
        let guard = self.triggers.read().await;
        Ok(guard
            .values()
            .find(|t| t.project_id == Some(project) && t.name == name)
            .cloned())
    }

    async fn save(&self, trigger: &Trigger) -> Result<(), TriggerStoreError> {
        self.triggers
            .write()
            .await
            .insert(trigger.id, trigger.clone());
        Ok(())
    }

    async fn delete(&self, trigger: &Trigger) -> Result<(), TriggerStoreError> {
        self.triggers.write().await.remove(&trigger.id);
        Ok(())
    }
}
