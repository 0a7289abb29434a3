//! # ensemble-core
//!
//! Foundation types shared across the ensemble workspace:
//!
//! - [`ids`] — branded ID newtypes ([`RunId`], [`ClientId`])
//! - [`events`] — the broadcast event wire format and publisher seam
//! - [`records`] — the run data model (specs, task flow, token usage,
//!   the final consolidated run record)
//! - [`errors`] — run-level and spec-level error taxonomy
//!
//! This crate is deliberately dependency-light so every other crate can
//! depend on it without pulling in the async or HTTP stack.

#![deny(unsafe_code)]

pub mod errors;
pub mod events;
pub mod ids;
pub mod records;

pub use errors::{RunError, SpecError};
pub use events::{EventKind, EventPublisher, RunEvent};
pub use ids::{ClientId, InvalidRunId, RunId};
pub use records::{
    AgentSpec, AgentUsage, EngineUsage, RunRecord, RunStatus, TaskRecord, TokenUsage,
};
