//! Hierarchy planning — the collaborator that turns a task description
//! into an ordered list of agent specs.
//!
//! The model is asked for *only* a JSON array, but responses arrive in
//! four shapes that all must be tolerated:
//!
//! 1. a valid JSON array (the happy path)
//! 2. an `{"error": ..., "raw_response": ...}` payload
//! 3. an array embedded in surrounding prose — the first `[` .. last `]`
//!    span is extracted and re-validated by a full parse
//! 4. unusable text
//!
//! Entries come back as raw [`serde_json::Value`]s; per-entry validation
//! happens downstream so a single malformed entry can be skipped without
//! failing the whole plan.

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::chat::{ChatClient, ChatMessage, ChatRequest};
use crate::errors::PlannerError;

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Default model for hierarchy generation.
pub const DEFAULT_HIERARCHY_MODEL: &str = "gpt-3.5-turbo";

/// Sampling temperature for hierarchy generation.
const HIERARCHY_TEMPERATURE: f64 = 0.5;

/// Completion cap for hierarchy generation.
const HIERARCHY_MAX_TOKENS: u32 = 500;

/// System prompt for hierarchy generation.
const HIERARCHY_SYSTEM_PROMPT: &str =
    "You are an expert in designing multi-agent systems and outputting valid JSON.";

/// How much raw response text to keep in error values.
const RAW_SNIPPET_LEN: usize = 400;

// ─────────────────────────────────────────────────────────────────────────────
// Planner trait
// ─────────────────────────────────────────────────────────────────────────────

/// The planning collaborator seam.
///
/// Returns the hierarchy as raw JSON entries; any failure maps to a
/// run-level planning failure in the orchestrator.
#[async_trait]
pub trait Planner: Send + Sync {
    /// Produce an ordered, non-empty list of raw agent-spec entries for
    /// the given task description.
    async fn generate_hierarchy(&self, task_description: &str)
        -> Result<Vec<Value>, PlannerError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Prompt
// ─────────────────────────────────────────────────────────────────────────────

/// Build the hierarchy-generation user prompt for a task.
fn hierarchy_prompt(task_description: &str) -> String {
    format!(
        r#"Generate a hierarchical multi-agent system consisting of 2 to 4 agents to accomplish the following task: "{task_description}"

The output should be a JSON array where each object represents an agent.
Each agent object must have the following keys:
- "agent_name": A descriptive name for the agent (string, use underscores for spaces).
- "description": A brief explanation of the agent's role and responsibilities (string).
- "level": An integer indicating the agent's level in the hierarchy (1 for top-level, increasing for subsequent levels).
- "cost_per_million": An integer indicating the agent's cost per million tokens.
- "tokens": Tokens that are needed to accomplish the task.

Example for task "write a simple story":
[
    {{"agent_name": "Plot_Generator", "description": "Creates the basic storyline", "level": 1, "cost_per_million": 1, "tokens": 1000}},
    {{"agent_name": "Chapter_Writer", "description": "Writes individual chapters", "level": 2, "cost_per_million": 10, "tokens": 3000}},
    {{"agent_name": "Editor", "description": "Reviews the story", "level": 3, "cost_per_million": 2, "tokens": 3000}}
]

Now, generate the JSON array for the task: "{task_description}"
Provide *only* the JSON array as the output, without any introductory text or explanation. Ensure the output is valid JSON."#
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Response parsing
// ─────────────────────────────────────────────────────────────────────────────

/// Parse a hierarchy response into raw entries.
///
/// Tolerates the four response shapes listed in the module docs. An
/// empty array is rejected: a plan with zero agents cannot run.
pub fn parse_hierarchy(text: &str) -> Result<Vec<Value>, PlannerError> {
    let trimmed = text.trim();

    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Array(items)) => {
            if items.is_empty() {
                Err(PlannerError::InvalidShape {
                    reason: "hierarchy array is empty".into(),
                    raw: raw_snippet(trimmed),
                })
            } else {
                Ok(items)
            }
        }
        Ok(Value::Object(map)) => {
            if let Some(err) = map.get("error") {
                let base = err
                    .as_str()
                    .map_or_else(|| err.to_string(), ToOwned::to_owned);
                let raw_response = map.get("raw_response").map(|r| {
                    r.as_str()
                        .map_or_else(|| r.to_string(), ToOwned::to_owned)
                });
                let message = match &raw_response {
                    Some(raw) => format!("{base} Raw Response: {raw}"),
                    None => base,
                };
                Err(PlannerError::ErrorPayload {
                    message,
                    raw_response,
                })
            } else {
                Err(PlannerError::InvalidShape {
                    reason: "expected a JSON array, got an object".into(),
                    raw: raw_snippet(trimmed),
                })
            }
        }
        Ok(_) => Err(PlannerError::InvalidShape {
            reason: "expected a JSON array".into(),
            raw: raw_snippet(trimmed),
        }),
        Err(_) => extract_embedded_array(trimmed),
    }
}

/// Best-effort recovery: parse the first `[` .. last `]` span of a noisy
/// response, accepted only if the span itself parses as a non-empty array.
fn extract_embedded_array(text: &str) -> Result<Vec<Value>, PlannerError> {
    let (Some(start), Some(end)) = (text.find('['), text.rfind(']')) else {
        return Err(PlannerError::InvalidShape {
            reason: "no JSON array found in response".into(),
            raw: raw_snippet(text),
        });
    };
    if start >= end {
        return Err(PlannerError::InvalidShape {
            reason: "no JSON array found in response".into(),
            raw: raw_snippet(text),
        });
    }

    match serde_json::from_str::<Value>(&text[start..=end]) {
        Ok(Value::Array(items)) if !items.is_empty() => {
            warn!("extracted hierarchy array from noisy response");
            Ok(items)
        }
        _ => Err(PlannerError::InvalidShape {
            reason: "embedded span did not parse as a non-empty JSON array".into(),
            raw: raw_snippet(text),
        }),
    }
}

fn raw_snippet(text: &str) -> String {
    if text.len() <= RAW_SNIPPET_LEN {
        text.to_owned()
    } else {
        let mut end = RAW_SNIPPET_LEN;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &text[..end])
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP-backed planner
// ─────────────────────────────────────────────────────────────────────────────

/// [`Planner`] implementation backed by a chat-completions endpoint.
pub struct HierarchyClient {
    chat: ChatClient,
    model: String,
}

impl HierarchyClient {
    /// Create a planner using the default hierarchy model.
    #[must_use]
    pub fn new(chat: ChatClient) -> Self {
        Self {
            chat,
            model: DEFAULT_HIERARCHY_MODEL.to_owned(),
        }
    }

    /// Override the model used for hierarchy generation.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

#[async_trait]
impl Planner for HierarchyClient {
    async fn generate_hierarchy(
        &self,
        task_description: &str,
    ) -> Result<Vec<Value>, PlannerError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage::system(HIERARCHY_SYSTEM_PROMPT),
                ChatMessage::user(hierarchy_prompt(task_description)),
            ],
            temperature: Some(HIERARCHY_TEMPERATURE),
            max_tokens: Some(HIERARCHY_MAX_TOKENS),
        };
        let completion = self.chat.complete(&request).await?;
        parse_hierarchy(&completion.content)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VALID_ARRAY: &str = r#"[
        {"agent_name": "Plot_Generator", "description": "Creates the storyline", "level": 1},
        {"agent_name": "Editor", "description": "Reviews the story", "level": 2}
    ]"#;

    // ── parse_hierarchy ──

    #[test]
    fn parses_valid_array() {
        let items = parse_hierarchy(VALID_ARRAY).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["agent_name"], "Plot_Generator");
    }

    #[test]
    fn rejects_empty_array() {
        let err = parse_hierarchy("[]").unwrap_err();
        assert!(matches!(err, PlannerError::InvalidShape { .. }));
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn error_payload_detected() {
        let err = parse_hierarchy(r#"{"error": "rate limited"}"#).unwrap_err();
        match err {
            PlannerError::ErrorPayload {
                message,
                raw_response,
            } => {
                assert_eq!(message, "rate limited");
                assert!(raw_response.is_none());
            }
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn error_payload_includes_raw_response() {
        let err =
            parse_hierarchy(r#"{"error": "not json", "raw_response": "I think..."}"#).unwrap_err();
        match err {
            PlannerError::ErrorPayload {
                message,
                raw_response,
            } => {
                assert!(message.contains("not json"));
                assert!(message.contains("I think..."));
                assert_eq!(raw_response.as_deref(), Some("I think..."));
            }
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn non_error_object_rejected() {
        let err = parse_hierarchy(r#"{"agents": []}"#).unwrap_err();
        assert!(matches!(err, PlannerError::InvalidShape { .. }));
    }

    #[test]
    fn scalar_rejected() {
        assert!(parse_hierarchy("42").is_err());
        assert!(parse_hierarchy("\"an array\"").is_err());
    }

    #[test]
    fn extracts_array_from_prose() {
        let noisy = format!("Here is your hierarchy:\n{VALID_ARRAY}\nHope this helps!");
        let items = parse_hierarchy(&noisy).unwrap();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn extraction_revalidates_by_parse() {
        // Brackets present but the span is not valid JSON
        let err = parse_hierarchy("results [not, valid json] end").unwrap_err();
        assert!(matches!(err, PlannerError::InvalidShape { .. }));
    }

    #[test]
    fn extraction_rejects_empty_embedded_array() {
        let err = parse_hierarchy("nothing to plan: []").unwrap_err();
        assert!(matches!(err, PlannerError::InvalidShape { .. }));
    }

    #[test]
    fn plain_text_rejected() {
        let err = parse_hierarchy("I cannot help with that.").unwrap_err();
        match err {
            PlannerError::InvalidShape { raw, .. } => {
                assert!(raw.contains("cannot help"));
            }
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn reversed_brackets_rejected() {
        assert!(parse_hierarchy("] backwards [").is_err());
    }

    #[test]
    fn raw_snippet_truncates() {
        let long = "a".repeat(2000);
        let err = parse_hierarchy(&long).unwrap_err();
        match err {
            PlannerError::InvalidShape { raw, .. } => assert!(raw.len() < 500),
            other => panic!("unexpected: {other}"),
        }
    }

    // ── prompt ──

    #[test]
    fn prompt_embeds_task() {
        let p = hierarchy_prompt("bake a cake");
        assert!(p.contains("bake a cake"));
        assert!(p.contains("agent_name"));
        assert!(p.contains("JSON array"));
    }

    // ── HierarchyClient over HTTP ──

    fn completion_with(content: &str) -> serde_json::Value {
        json!({
            "choices": [{"message": {"role": "assistant", "content": content}}],
            "usage": {"prompt_tokens": 100, "completion_tokens": 80, "total_tokens": 180}
        })
    }

    async fn planner_for(server: &MockServer) -> HierarchyClient {
        let chat = ChatClient::new("test-key")
            .unwrap()
            .with_base_url(server.uri());
        HierarchyClient::new(chat)
    }

    #[tokio::test]
    async fn generates_hierarchy_end_to_end() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_with(VALID_ARRAY)))
            .mount(&server)
            .await;

        let items = planner_for(&server)
            .await
            .generate_hierarchy("write a story")
            .await
            .unwrap();
        assert_eq!(items.len(), 2);
    }

    #[tokio::test]
    async fn upstream_error_payload_propagates() {
        let server = MockServer::start().await;
        let content = r#"{"error": "rate limited"}"#;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_with(content)))
            .mount(&server)
            .await;

        let err = planner_for(&server)
            .await
            .generate_hierarchy("task")
            .await
            .unwrap_err();
        assert!(matches!(err, PlannerError::ErrorPayload { .. }));
        assert!(err.to_string().contains("rate limited"));
    }

    #[tokio::test]
    async fn http_failure_maps_to_chat_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
            .mount(&server)
            .await;

        let err = planner_for(&server)
            .await
            .generate_hierarchy("task")
            .await
            .unwrap_err();
        assert!(matches!(err, PlannerError::Chat(_)));
        assert!(!err.is_credential());
    }

    #[tokio::test]
    async fn noisy_response_recovered_over_http() {
        let server = MockServer::start().await;
        let content = format!("Sure! Here you go:\n{VALID_ARRAY}");
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_with(&content)))
            .mount(&server)
            .await;

        let items = planner_for(&server)
            .await
            .generate_hierarchy("task")
            .await
            .unwrap();
        assert_eq!(items.len(), 2);
    }
}
