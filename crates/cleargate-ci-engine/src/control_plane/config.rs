//! Control plane configuration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::Owner;

/// Configuration for the [`ControlPlane`](super::ControlPlane).
///
/// All fields have defaults via the [`Default`] impl, and any field missing
/// from a deserialized document takes its default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlPlaneConfig {
    /// Concurrent active builds per owner without an override. Default: 1.
    pub default_max_active: usize,
    /// Per-owner overrides keyed by the owner's display form, e.g.
    /// `"project:42"` or `"user:7"`. Default: empty.
    pub owner_max_active: BTreeMap<String, usize>,
    /// Agent calls in flight at once. Default: 8.
    pub dispatch_workers: usize,
    /// Per-subscriber buffer of the event bus. Default: 1024.
    pub event_capacity: usize,
    /// Mailbox depth of each owner queue. Default: 256.
    pub command_capacity: usize,
}

impl ControlPlaneConfig {
    /// Concurrency cap for `owner`.
    pub fn max_active_for(&self, owner: Owner) -> usize {
        self.owner_max_active
            .get(&owner.to_string())
            .copied()
            .unwrap_or(self.default_max_active)
    }
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            default_max_active: 1,
            owner_max_active: BTreeMap::new(),
            dispatch_workers: 8,
            event_capacity: 1024,
            command_capacity: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ProjectId, UserId};
    use serde_json::json;

    #[test]
    fn missing_fields_take_defaults() {
        let config: ControlPlaneConfig = serde_json::from_value(json!({
            "dispatch_workers": 2,
            "owner_max_active": { "project:42": 3 }
        }))
        .unwrap();

        assert_eq!(config.dispatch_workers, 2);
        assert_eq!(config.default_max_active, 1);
        assert_eq!(config.event_capacity, 1024);
        assert_eq!(config.command_capacity, 256);
    }

    #[test]
    fn owner_overrides_apply_by_display_key() {
        let mut config = ControlPlaneConfig::default();
        config.owner_max_active.insert("project:42".into(), 3);
        config.owner_max_active.insert("user:7".into(), 0);

        assert_eq!(config.max_active_for(Owner::Project(ProjectId(42))), 3);
        assert_eq!(config.max_active_for(Owner::User(UserId(7))), 0);
        assert_eq!(config.max_active_for(Owner::Project(ProjectId(43))), 1);
    }
}
