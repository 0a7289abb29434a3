//! Per-run telemetry aggregation.
//!
//! A [`TelemetryAggregator`] is bound to one run and registered as the
//! execution engine's [`EventSink`]. It turns the engine's lifecycle
//! callbacks into:
//!
//! - a per-agent cumulative usage map (every model call attributed to the
//!   agent that was current when it finished)
//! - an ordered task flow log (start appends, completion updates in place)
//! - live broadcast events for every hook
//!
//! Accounting invariants:
//!
//! - an agent's entry is zero-initialized on first sight, never overwritten
//! - the per-task counter resets on task start and freezes on task end
//! - a completion with no matching start appends an orphan entry rather
//!   than dropping the data
//!
//! Hooks are total: they never panic and never propagate failures into
//! the engine. Event emission is fire-and-forget through the publisher.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tracing::{info, warn};

use ensemble_core::events::{EventKind, EventPublisher, RunEvent};
use ensemble_core::ids::RunId;
use ensemble_core::records::{TaskRecord, TokenUsage};
use ensemble_tokens::usage_from_value;

use crate::engine::{EventSink, TaskContext};

/// Display name used when the engine supplies no agent for a task.
pub const UNKNOWN_AGENT: &str = "Unknown Agent";

/// Placeholder context summary when the engine supplies none.
const NO_CONTEXT_SUMMARY: &str = "Context analysis unavailable or empty.";

/// Context summary recorded on orphan completion entries.
const ORPHAN_CONTEXT_SUMMARY: &str = "Task start record missing or mismatched";

/// Prompt excerpt length in `llm_start` events.
const PROMPT_SUMMARY_LEN: usize = 100;

/// Output excerpt length in `task_end` events.
const OUTPUT_SUMMARY_LEN: usize = 200;

/// One flow-log entry plus the correlation id it was started with.
///
/// The correlation id never serializes; it only strengthens completion
/// matching when the engine supplies one on both sides.
struct FlowEntry {
    record: TaskRecord,
    correlation_id: Option<String>,
}

#[derive(Default)]
struct AggregatorState {
    agent_usage: BTreeMap<String, TokenUsage>,
    flow: Vec<FlowEntry>,
    current_agent: Option<String>,
    current_task: Option<String>,
    task_tokens: TokenUsage,
}

/// Lifecycle-event aggregator for one run.
pub struct TelemetryAggregator {
    run_id: RunId,
    publisher: Arc<dyn EventPublisher>,
    state: Mutex<AggregatorState>,
}

impl TelemetryAggregator {
    /// Create an aggregator bound to `run_id`.
    pub fn new(run_id: RunId, publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            run_id,
            publisher,
            state: Mutex::new(AggregatorState::default()),
        }
    }

    /// Snapshot of the per-agent cumulative usage map.
    #[must_use]
    pub fn agent_usage(&self) -> BTreeMap<String, TokenUsage> {
        self.state.lock().agent_usage.clone()
    }

    /// Snapshot of the ordered task flow log.
    #[must_use]
    pub fn task_flow(&self) -> Vec<TaskRecord> {
        self.state
            .lock()
            .flow
            .iter()
            .map(|e| e.record.clone())
            .collect()
    }

    fn emit(&self, kind: EventKind, data: Value) {
        self.publisher
            .publish(RunEvent::new(kind, self.run_id.as_str(), Some(data)));
    }
}

impl EventSink for TelemetryAggregator {
    fn on_task_start(&self, task: &TaskContext) {
        let agent_name = task.agent_name.clone().unwrap_or_else(|| {
            warn!(
                run_id = %self.run_id,
                task = %task.description,
                "task started without an agent name"
            );
            UNKNOWN_AGENT.to_owned()
        });
        let input_context_summary = task
            .context_summary
            .clone()
            .unwrap_or_else(|| NO_CONTEXT_SUMMARY.to_owned());

        {
            let mut state = self.state.lock();
            state.current_agent = Some(agent_name.clone());
            state.current_task = Some(task.description.clone());
            state.task_tokens = TokenUsage::default();
            // Zero-initialize on first sight; an existing entry keeps its totals.
            let _ = state.agent_usage.entry(agent_name.clone()).or_default();
            state.flow.push(FlowEntry {
                record: TaskRecord {
                    task_description: task.description.clone(),
                    agent_name: agent_name.clone(),
                    input_context_summary: input_context_summary.clone(),
                    output: None,
                    token_usage: None,
                },
                correlation_id: task.correlation_id.clone(),
            });
        }

        self.emit(
            EventKind::TaskStart,
            json!({
                "task_description": task.description,
                "agent_name": agent_name,
                "input_context_summary": input_context_summary,
            }),
        );
    }

    fn on_llm_start(&self, prompts: &[String]) {
        let (agent_name, task_description) = {
            let state = self.state.lock();
            (state.current_agent.clone(), state.current_task.clone())
        };
        let prompts_summary: Vec<String> = prompts
            .iter()
            .map(|p| excerpt(p, PROMPT_SUMMARY_LEN))
            .collect();
        self.emit(
            EventKind::LlmStart,
            json!({
                "agent_name": agent_name,
                "task_description": task_description,
                "prompts_summary": prompts_summary,
            }),
        );
    }

    fn on_llm_end(&self, result: &Value) {
        let call_usage = usage_from_value(result);

        let (agent_name, task_description, cumulative, task_usage) = {
            let mut state = self.state.lock();
            if state.current_task.is_some() {
                state.task_tokens.add(&call_usage);
            }
            let cumulative = state.current_agent.clone().map(|agent| {
                let entry = state.agent_usage.entry(agent).or_default();
                entry.add(&call_usage);
                *entry
            });
            let task_usage = state.current_task.as_ref().map(|_| state.task_tokens);
            (
                state.current_agent.clone(),
                state.current_task.clone(),
                cumulative,
                task_usage,
            )
        };

        if let (Some(agent), Some(cumulative)) = (&agent_name, cumulative) {
            self.emit(
                EventKind::AgentUsageUpdate,
                json!({
                    "agent_name": agent,
                    "cumulative_usage": cumulative,
                }),
            );
        }

        // Emitted whether or not attribution succeeded.
        self.emit(
            EventKind::LlmEnd,
            json!({
                "agent_name": agent_name,
                "task_description": task_description,
                "token_usage_for_call": call_usage,
                "cumulative_agent_usage": cumulative,
                "accumulated_task_usage": task_usage,
            }),
        );
    }

    fn on_task_end(&self, task: &TaskContext, output: &str) {
        let (agent_name, final_tokens) = {
            let state = self.state.lock();
            let tracked = state.current_agent.clone();
            let mut agent_name = tracked.clone().unwrap_or_else(|| UNKNOWN_AGENT.to_owned());
            if let Some(live) = &task.agent_name {
                if tracked.as_deref() != Some(live.as_str()) {
                    warn!(
                        run_id = %self.run_id,
                        live = %live,
                        tracked = tracked.as_deref().unwrap_or("<none>"),
                        task = %task.description,
                        "task end agent differs from tracked agent; using engine-reported name"
                    );
                    agent_name = live.clone();
                }
            }
            (agent_name, state.task_tokens)
        };

        self.emit(
            EventKind::TaskEnd,
            json!({
                "task_description": task.description,
                "agent_name": agent_name,
                "output_summary": excerpt(output, OUTPUT_SUMMARY_LEN),
                "token_usage_for_task": final_tokens,
            }),
        );

        let mut state = self.state.lock();
        let matched = state.flow.iter_mut().rev().find(|entry| {
            if entry.record.output.is_some() || entry.record.token_usage.is_some() {
                return false;
            }
            match (&entry.correlation_id, &task.correlation_id) {
                (Some(started), Some(ended)) => started == ended,
                _ => entry.record.task_description == task.description,
            }
        });

        if let Some(entry) = matched {
            entry.record.output = Some(output.to_owned());
            entry.record.token_usage = Some(final_tokens);
            if entry.record.agent_name != agent_name {
                info!(
                    run_id = %self.run_id,
                    from = %entry.record.agent_name,
                    to = %agent_name,
                    "updating agent name in task log on task end"
                );
                entry.record.agent_name = agent_name;
            }
        } else {
            warn!(
                run_id = %self.run_id,
                task = %task.description,
                "no matching task start entry in flow log; appending orphan record"
            );
            state.flow.push(FlowEntry {
                record: TaskRecord {
                    task_description: task.description.clone(),
                    agent_name,
                    input_context_summary: ORPHAN_CONTEXT_SUMMARY.to_owned(),
                    output: Some(output.to_owned()),
                    token_usage: Some(final_tokens),
                },
                correlation_id: task.correlation_id.clone(),
            });
        }

        // Cleared unconditionally, matched or not.
        state.current_agent = None;
        state.current_task = None;
    }
}

/// First `max` characters of `text`, with a `...` tail when truncated.
fn excerpt(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_owned()
    } else {
        let head: String = text.chars().take(max).collect();
        format!("{head}...")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
