//! Broadcast event wire format.
//!
//! Every message pushed to a run's subscribers carries the same envelope:
//! `{type, run_id, timestamp, data}`. The `type` field is the closed set of
//! lifecycle event kinds in [`EventKind`]; `data` is an event-specific JSON
//! payload.
//!
//! The [`EventPublisher`] trait is the seam between the producers (the run
//! orchestrator and the telemetry aggregator) and the transport that fans
//! events out to subscribers. Publishing is fire-and-forget: a publisher
//! must never block or fail back into the producer.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::records::RunRecord;

/// The closed set of broadcast event types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Free-form progress message.
    Status,
    /// The planning collaborator produced a hierarchy.
    HierarchyGenerated,
    /// One agent/task pair was constructed from a spec.
    AgentCreated,
    /// A recoverable problem (e.g. a malformed spec was skipped).
    Warning,
    /// A model call is starting.
    LlmStart,
    /// A model call finished, with token usage.
    LlmEnd,
    /// An agent's cumulative usage changed.
    AgentUsageUpdate,
    /// A task started executing.
    TaskStart,
    /// A task finished executing.
    TaskEnd,
    /// A run-level error occurred.
    Error,
    /// The run reached a terminal state; carries the full result.
    RunComplete,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Status => "status",
            Self::HierarchyGenerated => "hierarchy_generated",
            Self::AgentCreated => "agent_created",
            Self::Warning => "warning",
            Self::LlmStart => "llm_start",
            Self::LlmEnd => "llm_end",
            Self::AgentUsageUpdate => "agent_usage_update",
            Self::TaskStart => "task_start",
            Self::TaskEnd => "task_end",
            Self::Error => "error",
            Self::RunComplete => "run_complete",
        };
        f.write_str(s)
    }
}

/// One broadcast message, addressed to a single run's room.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunEvent {
    /// Event type.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// The run this event belongs to.
    pub run_id: String,
    /// ISO-8601 timestamp with millisecond precision.
    pub timestamp: String,
    /// Event-specific payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RunEvent {
    /// Create a new event stamped with the current UTC time.
    pub fn new(kind: EventKind, run_id: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            kind,
            run_id: run_id.into(),
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            data,
        }
    }

    /// Build a `status` event with a plain message.
    pub fn status(run_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            EventKind::Status,
            run_id,
            Some(serde_json::json!({ "message": message.into() })),
        )
    }

    /// Build a `warning` event with a plain message.
    pub fn warning(run_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            EventKind::Warning,
            run_id,
            Some(serde_json::json!({ "message": message.into() })),
        )
    }

    /// Build an `error` event with a plain message.
    pub fn error(run_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            EventKind::Error,
            run_id,
            Some(serde_json::json!({ "message": message.into() })),
        )
    }

    /// Build the terminal `run_complete` event carrying the full result.
    ///
    /// The same construction serves the live publish at finalization and
    /// the catch-up replay for subscribers joining after completion.
    pub fn run_complete(record: &RunRecord) -> Self {
        let data = serde_json::json!({
            "status": record.status(),
            "error": record.error,
            "final_result": record,
        });
        Self::new(EventKind::RunComplete, record.run_id.clone(), Some(data))
    }
}

/// Fan-out seam between event producers and the subscriber transport.
///
/// Implementations deliver the event to every current subscriber of the
/// event's run, in publish order per run. Delivery problems (no room, slow
/// subscriber) are the implementation's concern and never surface here.
pub trait EventPublisher: Send + Sync {
    /// Publish one event to the run's room.
    fn publish(&self, event: RunEvent);
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
