//! Recipe payloads handed to agents.

use serde::{Deserialize, Serialize};

use super::request::{BuildResultId, Owner};

/// Identifier of a single recipe (one stage of one build).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecipeId(pub u64);

impl std::fmt::Display for RecipeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The unit of work sent to an agent.
///
/// `payload` is the serialized recipe produced by the build controller; the
/// control plane never looks inside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RecipeRequest {
    pub recipe_id: RecipeId,
    pub owner: Owner,
    pub build_result_id: BuildResultId,
    pub stage: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}
