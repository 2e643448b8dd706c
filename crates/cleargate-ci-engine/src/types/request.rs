//! Build requests and the owners they belong to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Owners
// ---------------------------------------------------------------------------

/// Identifier of a configured project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(pub u64);

/// Identifier of a user (owner of personal builds).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

/// The entity a build belongs to: the unit of per-owner concurrency control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum Owner {
    Project(ProjectId),
    /// Personal builds are owned by the user that submitted them.
    User(UserId),
}

impl std::fmt::Display for Owner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Owner::Project(id) => write!(f, "project:{}", id.0),
            Owner::User(id) => write!(f, "user:{}", id.0),
        }
    }
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Unique identifier of a build request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Id of the build result a controller produces (not the build number).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildResultId(pub u64);

impl std::fmt::Display for BuildResultId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An SCM revision identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(pub String);

impl Revision {
    pub fn new(revision: impl Into<String>) -> Self {
        Self(revision.into())
    }
}

impl std::fmt::Display for Revision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Why a build was requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
#[non_exhaustive]
pub enum BuildReason {
    Manual { principal: String },
    Trigger { trigger_name: String },
    Scm { change: String },
    Remote { principal: String },
    Dependency { upstream: String },
    Personal { principal: String },
}

impl BuildReason {
    /// One-line description for build history and queue views.
    pub fn summary(&self) -> String {
        match self {
            BuildReason::Manual { principal } => format!("manual trigger by {principal}"),
            BuildReason::Trigger { trigger_name } => format!("trigger '{trigger_name}'"),
            BuildReason::Scm { change } => format!("scm change ({change})"),
            BuildReason::Remote { principal } => format!("remote api trigger by {principal}"),
            BuildReason::Dependency { upstream } => format!("dependency on {upstream}"),
            BuildReason::Personal { principal } => format!("personal build for {principal}"),
        }
    }
}

/// Options attached to a request by whatever produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TriggerOptions {
    /// Tag identifying the producer. Replaceable requests are only merged
    /// with requests from an equal source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default)]
    pub replaceable: bool,
    /// Carried for interface compatibility; admission does not read it.
    #[serde(default)]
    pub jump_queue: bool,
    pub reason: BuildReason,
}

impl TriggerOptions {
    pub fn new(reason: BuildReason) -> Self {
        Self {
            source: None,
            replaceable: false,
            jump_queue: false,
            reason,
        }
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn replaceable(mut self, replaceable: bool) -> Self {
        self.replaceable = replaceable;
        self
    }

    pub fn jump_queue(mut self, jump_queue: bool) -> Self {
        self.jump_queue = jump_queue;
        self
    }
}

// ---------------------------------------------------------------------------
// BuildRequestEvent
// ---------------------------------------------------------------------------

/// A request to build an owner at a (possibly floating) revision.
///
/// Identity and options are fixed at creation. Only the revision changes,
/// and only when a later request from the same source is merged into this
/// one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BuildRequestEvent {
    id: RequestId,
    owner: Owner,
    /// `None` while floating: resolved when the build fixes its revision.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    revision: Option<Revision>,
    queued_at: DateTime<Utc>,
    options: TriggerOptions,
}

impl BuildRequestEvent {
    pub fn new(owner: Owner, revision: Option<Revision>, options: TriggerOptions) -> Self {
        Self {
            id: RequestId::new(),
            owner,
            revision,
            queued_at: Utc::now(),
            options,
        }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn owner(&self) -> Owner {
        self.owner
    }

    pub fn revision(&self) -> Option<&Revision> {
        self.revision.as_ref()
    }

    pub fn queued_at(&self) -> DateTime<Utc> {
        self.queued_at
    }

    pub fn options(&self) -> &TriggerOptions {
        &self.options
    }

    /// Personal builds are owned by a user rather than a project.
    pub fn is_personal(&self) -> bool {
        matches!(self.owner, Owner::User(_))
    }

    /// Whether `newer` may be folded into this request instead of standing
    /// on its own: this request is replaceable and both share a source.
    pub fn can_be_replaced_by(&self, newer: &BuildRequestEvent) -> bool {
        self.options.replaceable && self.options.source == newer.options.source
    }

    pub(crate) fn set_revision(&mut self, revision: Option<Revision>) {
        self.revision = revision;
    }
}

impl std::fmt::Display for BuildRequestEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "build request {} for {}: {}",
            self.id,
            self.owner,
            self.options.reason.summary()
        )?;
        if let Some(ref source) = self.options.source {
            write!(f, ": {source}")?;
        }
        if self.options.replaceable {
            f.write_str(" (replaceable)")?;
        }
        Ok(())
    }
}
