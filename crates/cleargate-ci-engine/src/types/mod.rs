//! Foundational types for the build orchestration control plane.
//!
//! Triggers, build requests and recipe payloads are plain data. Everything
//! that must survive a restart or cross a process boundary is
//! `Serialize + Deserialize`; map fields use `BTreeMap` so serialized forms
//! are stable.
//!
//! Enums that describe open-ended domains use `#[non_exhaustive]` so adding
//! variants is never a breaking change for downstream consumers.

pub mod recipe;
pub mod request;
pub mod trigger;

pub use recipe::*;
pub use request::*;
pub use trigger::*;
