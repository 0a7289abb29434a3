//! # ensemble-runtime
//!
//! The run orchestration and telemetry pipeline:
//!
//! - [`engine`] — the execution-engine boundary: the [`EventSink`]
//!   lifecycle-hook trait, crew construction from validated specs, and
//!   the tagged-union normalization of engine outputs
//! - [`telemetry`] — per-run lifecycle-event aggregation into per-agent
//!   and per-task token accounting
//! - [`store`] — concurrency-safe terminal-result storage
//! - [`orchestrator`] — the per-run state machine and background worker
//! - [`summary`] — human-readable completion summaries
//!
//! [`EventSink`]: engine::EventSink

#![deny(unsafe_code)]

pub mod engine;
pub mod orchestrator;
pub mod store;
pub mod summary;
pub mod telemetry;

pub use engine::{
    CrewMember, CrewPlan, EngineFailure, EngineOutcome, EngineOutput, EventSink, ExecutionEngine,
    TaskContext,
};
pub use orchestrator::{Orchestrator, RunPhase};
pub use store::{RunStore, StoreError};
pub use telemetry::TelemetryAggregator;
