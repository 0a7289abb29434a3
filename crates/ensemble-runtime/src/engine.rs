//! Execution-engine boundary.
//!
//! The engine itself is an external collaborator; this module owns the
//! seam. Three pieces:
//!
//! - [`EventSink`] — one method per lifecycle event. The engine is handed
//!   a sink and calls the hooks synchronously, in execution order, from
//!   the run's own worker. Hooks are infallible by construction.
//! - [`CrewPlan`] — the ordered agent/task pairs built from validated
//!   [`AgentSpec`]s, with the prompt scaffolding woven from each agent's
//!   role description and the overall task.
//! - [`EngineOutput`] — a tagged union of the shapes an engine result may
//!   take, normalized to one canonical text before any downstream logic
//!   touches it.
//!
//! Both success and failure carry an optional loosely-shaped usage value;
//! a failing engine still gets its accrued usage harvested.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

use ensemble_core::records::AgentSpec;

// ─────────────────────────────────────────────────────────────────────────────
// Lifecycle hooks
// ─────────────────────────────────────────────────────────────────────────────

/// Context the engine reports with task lifecycle hooks.
#[derive(Clone, Debug, Default)]
pub struct TaskContext {
    /// The task's description text.
    pub description: String,
    /// Owning agent's display name, when the engine knows it.
    pub agent_name: Option<String>,
    /// Summary of the input context handed to the task.
    pub context_summary: Option<String>,
    /// Engine-supplied correlation identifier, when available. Used to
    /// pair completion with start when description text is ambiguous.
    pub correlation_id: Option<String>,
}

/// Lifecycle-event sink the engine drives during execution.
///
/// Hooks must be fast and non-blocking; they run synchronously inside the
/// run's worker. Implementations never panic and never propagate errors
/// back into the engine.
pub trait EventSink: Send + Sync {
    /// A task is starting.
    fn on_task_start(&self, task: &TaskContext);
    /// A task finished with the given output text.
    fn on_task_end(&self, task: &TaskContext, output: &str);
    /// A model call is starting with the given prompts.
    fn on_llm_start(&self, prompts: &[String]);
    /// A model call finished; `result` carries usage in whatever shape
    /// the engine's model layer reports.
    fn on_llm_end(&self, result: &Value);
}

// ─────────────────────────────────────────────────────────────────────────────
// Crew construction
// ─────────────────────────────────────────────────────────────────────────────

/// One agent/task pair ready for execution.
#[derive(Clone, Debug)]
pub struct CrewMember {
    /// The validated spec this member was built from.
    pub spec: AgentSpec,
    /// Display name (spec name with underscores as spaces).
    pub role: String,
    /// Goal prompt for the agent.
    pub goal: String,
    /// Backstory prompt for the agent.
    pub backstory: String,
    /// The task prompt bound to this agent.
    pub task_description: String,
    /// Expected-output prompt for the task.
    pub expected_output: String,
}

impl CrewMember {
    /// Weave the agent and task prompts from a validated spec and the
    /// overall task description.
    #[must_use]
    pub fn from_spec(spec: AgentSpec, overall_task: &str) -> Self {
        let role = spec.role();
        let description = spec.description.clone();
        let goal = format!(
            "Fulfill role: {description}, contributing to the overall task: '{overall_task}'"
        );
        let backstory = format!(
            "You are an AI agent named {role}. Your expertise lies in {description}. \
             You are part of a team working sequentially on the task: '{overall_task}'. \
             Focus strictly on your defined role and ensure your output is clear and \
             directly usable by the next agent or as a final result component."
        );
        let task_description = format!(
            "Execute your role as {role}. Your specific focus is: {description}. \
             Use the context provided (output from the previous agent, if any) to \
             perform your part of the overall goal: '{overall_task}'. Your output \
             must be self-contained and ready for the next step."
        );
        let expected_output = format!(
            "A clear, concise, and well-formatted result from your work on \
             '{description}'. This output should directly address your assigned part \
             of the task and be suitable for use by subsequent agents or as a final \
             output component."
        );
        Self {
            spec,
            role,
            goal,
            backstory,
            task_description,
            expected_output,
        }
    }
}

/// The full ordered set of crew members handed to the engine.
#[derive(Clone, Debug)]
pub struct CrewPlan {
    /// Agent/task pairs in hierarchy order.
    pub members: Vec<CrewMember>,
    /// Whether tasks run strictly one after another.
    pub sequential: bool,
}

impl CrewPlan {
    /// Build a sequential-process plan.
    #[must_use]
    pub fn sequential(members: Vec<CrewMember>) -> Self {
        Self {
            members,
            sequential: true,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Engine results
// ─────────────────────────────────────────────────────────────────────────────

/// The shapes an engine's final output may arrive in.
///
/// Normalization order mirrors how results are probed: a dedicated raw
/// field, a result field, else the value's string form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineOutput {
    /// The engine exposed a `raw` output field.
    Raw(String),
    /// The engine exposed a `result` output field.
    Result(String),
    /// Fallback: the output's string form.
    Display(String),
}

impl EngineOutput {
    /// Collapse to the canonical output text.
    #[must_use]
    pub fn into_text(self) -> String {
        match self {
            Self::Raw(s) | Self::Result(s) | Self::Display(s) => s,
        }
    }
}

/// Successful engine invocation.
#[derive(Clone, Debug)]
pub struct EngineOutcome {
    /// The final output in whichever shape the engine produced.
    pub output: EngineOutput,
    /// Engine-level usage totals in whatever shape the engine exposes.
    pub usage: Option<Value>,
}

/// Failed engine invocation.
///
/// Carries whatever usage accrued before the failure so accounting can
/// still be harvested best-effort.
#[derive(Clone, Debug, Error)]
#[error("{message}")]
pub struct EngineFailure {
    /// Human-readable failure description.
    pub message: String,
    /// Usage accrued before the failure, when the engine can report it.
    pub usage: Option<Value>,
}

/// The execution-engine collaborator seam.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Execute the plan, driving `sink` with lifecycle events.
    async fn execute(
        &self,
        plan: &CrewPlan,
        sink: Arc<dyn EventSink>,
    ) -> Result<EngineOutcome, EngineFailure>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
