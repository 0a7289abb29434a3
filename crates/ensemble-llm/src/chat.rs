//! Minimal OpenAI-compatible chat-completions client.
//!
//! One JSON POST per call, no streaming. The raw `usage` object from the
//! response is surfaced untouched as a [`serde_json::Value`] so downstream
//! accounting can normalize it with its own tolerant extraction.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::errors::ChatError;

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Per-request timeout. Exceeding it surfaces as a transport error and,
/// for planning calls, a planning failure.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(45);

/// How much of an error response body to keep in error messages.
const BODY_SNIPPET_LEN: usize = 400;

// ─────────────────────────────────────────────────────────────────────────────
// Request / response types
// ─────────────────────────────────────────────────────────────────────────────

/// One chat message.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    /// `system`, `user`, or `assistant`.
    pub role: String,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// Build a `system` message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    /// Build a `user` message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// A chat-completions request body.
#[derive(Clone, Debug, Serialize)]
pub struct ChatRequest {
    /// Model identifier.
    pub model: String,
    /// Ordered conversation messages.
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Completion length cap.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// The parts of a completion the caller consumes.
#[derive(Clone, Debug)]
pub struct ChatCompletion {
    /// The first choice's message text, trimmed.
    pub content: String,
    /// The raw `usage` object, if the endpoint reported one.
    pub usage: Option<Value>,
}

#[derive(Deserialize)]
struct CompletionsResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    usage: Option<Value>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────────────────────────

/// Reusable chat-completions client bound to one API key.
///
/// Not `Debug`: the bearer key stays out of log output.
#[derive(Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ChatClient {
    /// Create a client for the default base URL.
    ///
    /// Rejects an empty key up front so the failure is a configuration
    /// error at the call site, not a cryptic 401 later.
    pub fn new(api_key: impl Into<String>) -> Result<Self, ChatError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ChatError::MissingCredential);
        }

        let mut headers = HeaderMap::new();
        let _ = headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            base_url: DEFAULT_BASE_URL.to_owned(),
            api_key,
        })
    }

    /// Point the client at a different base URL (testing, proxies).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let url = base_url.into();
        self.base_url = url.trim_end_matches('/').to_owned();
        self
    }

    /// Send one completion request and return the first choice.
    pub async fn complete(&self, request: &ChatRequest) -> Result<ChatCompletion, ChatError> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(model = %request.model, messages = request.messages.len(), "sending chat completion");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Status {
                status: status.as_u16(),
                body: snippet(&body),
            });
        }

        let parsed: CompletionsResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(ChatError::MalformedResponse(
                "completion contained no choices",
            ))?;

        Ok(ChatCompletion {
            content: content.trim().to_owned(),
            usage: parsed.usage,
        })
    }
}

fn snippet(body: &str) -> String {
    if body.len() <= BODY_SNIPPET_LEN {
        body.to_owned()
    } else {
        let mut end = BODY_SNIPPET_LEN;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn completion_body(content: &str) -> Value {
        json!({
            "id": "chatcmpl-1",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 8, "total_tokens": 20}
        })
    }

    async fn client_for(server: &MockServer) -> ChatClient {
        ChatClient::new("test-key")
            .unwrap()
            .with_base_url(server.uri())
    }

    fn request() -> ChatRequest {
        ChatRequest {
            model: "gpt-4o".into(),
            messages: vec![ChatMessage::user("hello")],
            temperature: Some(0.5),
            max_tokens: Some(500),
        }
    }

    #[test]
    fn empty_key_rejected() {
        assert!(matches!(
            ChatClient::new(""),
            Err(ChatError::MissingCredential)
        ));
        assert!(matches!(
            ChatClient::new("   "),
            Err(ChatError::MissingCredential)
        ));
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let client = ChatClient::new("k")
            .unwrap()
            .with_base_url("http://localhost:9999/");
        assert_eq!(client.base_url, "http://localhost:9999");
    }

    #[test]
    fn request_serializes_expected_fields() {
        let v = serde_json::to_value(request()).unwrap();
        assert_eq!(v["model"], "gpt-4o");
        assert_eq!(v["temperature"], 0.5);
        assert_eq!(v["max_tokens"], 500);
        assert_eq!(v["messages"][0]["role"], "user");
    }

    #[test]
    fn request_omits_unset_options() {
        let req = ChatRequest {
            model: "gpt-4o".into(),
            messages: vec![],
            temperature: None,
            max_tokens: None,
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("temperature"));
        assert!(!json.contains("max_tokens"));
    }

    #[tokio::test]
    async fn complete_returns_trimmed_content_and_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("  result text  ")))
            .mount(&server)
            .await;

        let completion = client_for(&server).await.complete(&request()).await.unwrap();
        assert_eq!(completion.content, "result text");
        let usage = completion.usage.unwrap();
        assert_eq!(usage["total_tokens"], 20);
    }

    #[tokio::test]
    async fn complete_without_usage_field() {
        let server = MockServer::start().await;
        let body = json!({
            "choices": [{"message": {"role": "assistant", "content": "ok"}}]
        });
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let completion = client_for(&server).await.complete(&request()).await.unwrap();
        assert!(completion.usage.is_none());
    }

    #[tokio::test]
    async fn non_success_status_surfaces_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let err = client_for(&server).await.complete(&request()).await.unwrap_err();
        match err {
            ChatError::Status { status, body } => {
                assert_eq!(status, 429);
                assert_eq!(body, "slow down");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn empty_choices_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let err = client_for(&server).await.complete(&request()).await.unwrap_err();
        assert!(matches!(err, ChatError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn invalid_json_body_is_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = client_for(&server).await.complete(&request()).await.unwrap_err();
        assert!(matches!(err, ChatError::Http(_)));
    }

    #[test]
    fn snippet_truncates_long_bodies() {
        let long = "x".repeat(1000);
        let s = snippet(&long);
        assert!(s.len() < 1000);
        assert!(s.ends_with("..."));
        assert_eq!(snippet("short"), "short");
    }
}
