//! Reference sequential execution engine.
//!
//! Runs one chat completion per crew member, strictly in plan order,
//! threading each member's output into the next member's context — the
//! sequential-process contract the orchestrator expects from any engine.
//! Lifecycle hooks fire around every task and model call so the full
//! telemetry pipeline is exercised end-to-end.
//!
//! A model-call failure aborts the run at that member; the failure still
//! carries the usage accrued so far so accounting can be harvested.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use ensemble_core::records::TokenUsage;
use ensemble_llm::chat::{ChatClient, ChatMessage, ChatRequest};
use ensemble_runtime::engine::{
    CrewPlan, EngineFailure, EngineOutcome, EngineOutput, EventSink, ExecutionEngine, TaskContext,
};
use ensemble_tokens::usage_from_value;

/// Executes crew plans with one model call per member.
pub struct SequentialChatEngine {
    chat: ChatClient,
    model: String,
}

impl SequentialChatEngine {
    /// Create an engine calling `model` through `chat`.
    pub fn new(chat: ChatClient, model: impl Into<String>) -> Self {
        Self {
            chat,
            model: model.into(),
        }
    }
}

fn usage_totals(totals: &TokenUsage, requests: u64) -> Value {
    json!({
        "prompt_tokens": totals.prompt_tokens,
        "completion_tokens": totals.completion_tokens,
        "total_tokens": totals.total_tokens,
        "successful_requests": requests,
    })
}

#[async_trait]
impl ExecutionEngine for SequentialChatEngine {
    async fn execute(
        &self,
        plan: &CrewPlan,
        sink: Arc<dyn EventSink>,
    ) -> Result<EngineOutcome, EngineFailure> {
        let mut previous_output: Option<String> = None;
        let mut totals = TokenUsage::default();
        let mut requests: u64 = 0;

        for member in &plan.members {
            let context_summary = previous_output
                .as_ref()
                .map(|p| format!("Context provided (length: {})", p.len()));
            let ctx = TaskContext {
                description: member.task_description.clone(),
                agent_name: Some(member.role.clone()),
                context_summary,
                correlation_id: None,
            };
            sink.on_task_start(&ctx);

            let system = format!("{}\n\nYour goal: {}", member.backstory, member.goal);
            let mut user = format!(
                "{}\n\nExpected output: {}",
                member.task_description, member.expected_output
            );
            if let Some(previous) = &previous_output {
                user.push_str("\n\nContext from the previous agent:\n");
                user.push_str(previous);
            }

            sink.on_llm_start(&[system.clone(), user.clone()]);
            let request = ChatRequest {
                model: self.model.clone(),
                messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
                temperature: None,
                max_tokens: None,
            };

            match self.chat.complete(&request).await {
                Ok(completion) => {
                    let usage = completion.usage.clone().unwrap_or_else(|| json!({}));
                    sink.on_llm_end(&json!({ "token_usage": usage }));
                    totals.add(&usage_from_value(&usage));
                    requests += 1;
                    debug!(role = %member.role, "task completed");
                    sink.on_task_end(&ctx, &completion.content);
                    previous_output = Some(completion.content);
                }
                Err(e) => {
                    return Err(EngineFailure {
                        message: format!("model call failed for {}: {e}", member.role),
                        usage: Some(usage_totals(&totals, requests)),
                    });
                }
            }
        }

        Ok(EngineOutcome {
            output: EngineOutput::Raw(previous_output.unwrap_or_default()),
            usage: Some(usage_totals(&totals, requests)),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
