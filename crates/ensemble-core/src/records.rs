//! The run data model.
//!
//! A [`RunRecord`] is the single consolidated result of one run: the task,
//! the validated agent hierarchy, the ordered task flow log, per-agent and
//! engine-level token accounting, and either a final output or an error.
//! A record is built exactly once by the run's background worker and is
//! immutable afterwards.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::errors::SpecError;

// ─────────────────────────────────────────────────────────────────────────────
// Token usage
// ─────────────────────────────────────────────────────────────────────────────

/// A prompt/completion/total token triple.
///
/// Values are trusted as reported by upstream collaborators; accumulation
/// saturates rather than wrapping.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens in the prompt(s).
    #[serde(default)]
    pub prompt_tokens: u64,
    /// Tokens in the completion(s).
    #[serde(default)]
    pub completion_tokens: u64,
    /// Total tokens as reported upstream.
    #[serde(default)]
    pub total_tokens: u64,
}

impl TokenUsage {
    /// Construct from the three counters.
    #[must_use]
    pub fn new(prompt_tokens: u64, completion_tokens: u64, total_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens,
        }
    }

    /// Field-wise saturating accumulation.
    pub fn add(&mut self, other: &Self) {
        self.prompt_tokens = self.prompt_tokens.saturating_add(other.prompt_tokens);
        self.completion_tokens = self
            .completion_tokens
            .saturating_add(other.completion_tokens);
        self.total_tokens = self.total_tokens.saturating_add(other.total_tokens);
    }

    /// Whether the triple is internally consistent (`total == prompt +
    /// completion`). Upstream data is stored even when inconsistent; this
    /// exists for diagnostics.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.prompt_tokens.saturating_add(self.completion_tokens) == self.total_tokens
    }

    /// Whether all three counters are zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.prompt_tokens == 0 && self.completion_tokens == 0 && self.total_tokens == 0
    }
}

/// Cumulative usage for one agent, with the rate and cost assigned once at
/// run finalization.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentUsage {
    /// Cumulative token counters.
    #[serde(flatten)]
    pub usage: TokenUsage,
    /// Assigned rate in currency units per million tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_per_million: Option<f64>,
    /// Estimated spend derived from `usage.total_tokens` and the rate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_cost: Option<f64>,
}

/// Engine-level usage totals, normalized from whatever shape the execution
/// engine exposes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineUsage {
    /// Token counters.
    #[serde(flatten)]
    pub usage: TokenUsage,
    /// Number of successful model requests, when reported.
    #[serde(default)]
    pub successful_requests: u64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Agent specs
// ─────────────────────────────────────────────────────────────────────────────

/// One validated entry of the planning collaborator's hierarchy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSpec {
    /// Agent name as planned (underscore-separated).
    pub name: String,
    /// Role description.
    pub description: String,
    /// Hierarchy level (1 = top).
    pub level: u64,
    /// Planning hint: nominal cost tier. Never feeds telemetry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_per_million: Option<u64>,
    /// Planning hint: tokens the planner expects the task to need.
    /// Never feeds telemetry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens: Option<u64>,
}

impl AgentSpec {
    /// Validate one raw hierarchy entry.
    ///
    /// `index` is the entry's position in the hierarchy, used only for
    /// error context. Required: a JSON object with non-empty string
    /// `agent_name` and `description`. `level` defaults to 1 and must be
    /// positive when present; the hint fields are optional.
    pub fn from_value(index: usize, value: &Value) -> Result<Self, SpecError> {
        let obj = value
            .as_object()
            .ok_or(SpecError::NotAnObject { index })?;

        let name = required_string(obj, index, "agent_name")?;
        let description = required_string(obj, index, "description")?;

        let level = match obj.get("level") {
            None | Some(Value::Null) => 1,
            Some(v) => v
                .as_u64()
                .filter(|l| *l > 0)
                .ok_or(SpecError::InvalidLevel { index })?,
        };

        Ok(Self {
            name,
            description,
            level,
            cost_per_million: obj.get("cost_per_million").and_then(Value::as_u64),
            tokens: obj.get("tokens").and_then(Value::as_u64),
        })
    }

    /// Display name: the planned name with underscores as spaces.
    #[must_use]
    pub fn role(&self) -> String {
        self.name.replace('_', " ")
    }
}

fn required_string(
    obj: &serde_json::Map<String, Value>,
    index: usize,
    field: &'static str,
) -> Result<String, SpecError> {
    match obj.get(field) {
        None | Some(Value::Null) => Err(SpecError::MissingField { index, field }),
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
        Some(Value::String(_)) => Err(SpecError::EmptyField { index, field }),
        Some(_) => Err(SpecError::WrongType { index, field }),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Task flow
// ─────────────────────────────────────────────────────────────────────────────

/// One entry of the ordered task flow log.
///
/// `output` and `usage` stay unset until the task completes; completion is
/// matched back to the starting entry by the telemetry aggregator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// The task's description text.
    pub task_description: String,
    /// Owning agent's display name.
    pub agent_name: String,
    /// Summary of the input context the task received.
    pub input_context_summary: String,
    /// Task output, set on completion.
    pub output: Option<String>,
    /// Frozen per-task token counters, set on completion.
    pub token_usage: Option<TokenUsage>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Run record
// ─────────────────────────────────────────────────────────────────────────────

/// Terminal state of a run, derived from the presence of an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The run produced a final output.
    Success,
    /// The run failed; `error` carries the message.
    Error,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::Error => f.write_str("error"),
        }
    }
}

/// The consolidated result of one run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// The run identifier.
    pub run_id: String,
    /// Sanitized task description as submitted.
    pub task_description: String,
    /// Validated hierarchy, present once planning succeeded.
    pub agent_hierarchy: Option<Vec<AgentSpec>>,
    /// Final output text, present only on success.
    pub final_output: Option<String>,
    /// Ordered task flow log.
    pub task_flow: Vec<TaskRecord>,
    /// Engine-level usage totals, when the engine exposed any.
    pub usage_metrics: Option<EngineUsage>,
    /// Per-agent cumulative usage with assigned rates and costs.
    pub agent_usage: BTreeMap<String, AgentUsage>,
    /// Error message, present only on failure.
    pub error: Option<String>,
}

impl RunRecord {
    /// A fresh, empty record for a run.
    #[must_use]
    pub fn new(run_id: impl Into<String>, task_description: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            task_description: task_description.into(),
            agent_hierarchy: None,
            final_output: None,
            task_flow: Vec::new(),
            usage_metrics: None,
            agent_usage: BTreeMap::new(),
            error: None,
        }
    }

    /// Terminal status: `Error` iff an error message is present.
    #[must_use]
    pub fn status(&self) -> RunStatus {
        if self.error.is_some() {
            RunStatus::Error
        } else {
            RunStatus::Success
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
