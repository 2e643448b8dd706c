//! Trigger definitions: what causes builds to be requested.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::request::ProjectId;

/// Unique identifier for a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TriggerId(pub Uuid);

impl TriggerId {
    /// Create a new random trigger id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TriggerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TriggerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a trigger.
///
/// `None -> Scheduled` on schedule, `Scheduled <-> Paused` on pause/resume,
/// anything `-> None` on unschedule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerState {
    #[default]
    None,
    Scheduled,
    Paused,
}

/// A definition that, once armed by its strategy, causes build requests to
/// be produced.
///
/// `(name, group)` is unique among live triggers. `trigger_type` selects the
/// [`SchedulerStrategy`](crate::traits::SchedulerStrategy) that arms it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Trigger {
    pub id: TriggerId,
    pub name: String,
    pub group: String,
    pub trigger_type: String,
    /// Project this trigger belongs to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<ProjectId>,
    /// Strategy-specific configuration. Project triggers without one are
    /// invalid and skipped at start-up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
    /// Transient triggers are never persisted and are lost on restart.
    #[serde(default)]
    pub transient: bool,
    #[serde(default)]
    pub state: TriggerState,
}

impl Trigger {
    /// Create an unscheduled, persistent trigger with no project binding.
    pub fn new(
        name: impl Into<String>,
        group: impl Into<String>,
        trigger_type: impl Into<String>,
    ) -> Self {
        Self {
            id: TriggerId::new(),
            name: name.into(),
            group: group.into(),
            trigger_type: trigger_type.into(),
            project_id: None,
            config: None,
            transient: false,
            state: TriggerState::None,
        }
    }

    /// Bind the trigger to a project and its configuration.
    pub fn for_project(mut self, project_id: ProjectId, config: serde_json::Value) -> Self {
        self.project_id = Some(project_id);
        self.config = Some(config);
        self
    }

    /// Set the strategy configuration.
    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = Some(config);
        self
    }

    /// Mark the trigger transient (kept in memory only).
    pub fn transient(mut self) -> Self {
        self.transient = true;
        self
    }

    /// True unless the trigger is in [`TriggerState::None`].
    pub fn is_scheduled(&self) -> bool {
        self.state != TriggerState::None
    }

    /// True when the trigger is scheduled and firing.
    pub fn is_active(&self) -> bool {
        self.state == TriggerState::Scheduled
    }

    pub fn is_paused(&self) -> bool {
        self.state == TriggerState::Paused
    }

    /// Whether this trigger matches the given name and group.
    pub fn has_name_and_group(&self, name: &str, group: &str) -> bool {
        self.name == name && self.group == group
    }
}
