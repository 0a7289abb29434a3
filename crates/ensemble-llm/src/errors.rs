//! Error types for outbound collaborator calls.

use thiserror::Error;

/// Failure talking to an OpenAI-compatible chat endpoint.
#[derive(Debug, Error)]
pub enum ChatError {
    /// No API key was supplied.
    #[error("API key is not configured")]
    MissingCredential,

    /// Transport-level failure (connect, timeout, body decode).
    #[error("API request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The endpoint answered with a non-success status.
    #[error("API returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated for logging.
        body: String,
    },

    /// The response parsed but did not carry the expected structure.
    #[error("unexpected API response structure: {0}")]
    MalformedResponse(&'static str),
}

/// Failure producing a usable agent hierarchy.
///
/// Any of these terminates the run in `Failed`; the orchestrator embeds
/// the display string in the terminal record.
#[derive(Debug, Error)]
pub enum PlannerError {
    /// The underlying chat call failed.
    #[error("{0}")]
    Chat(#[from] ChatError),

    /// The model answered with an explicit error payload.
    #[error("{message}")]
    ErrorPayload {
        /// Error message (includes the raw response tail when available).
        message: String,
        /// The raw response body, when the payload carried one.
        raw_response: Option<String>,
    },

    /// The response was not a usable JSON array of agent specs.
    #[error("AI response was not a valid JSON array: {reason}")]
    InvalidShape {
        /// Why the response was rejected.
        reason: String,
        /// The offending response text, truncated.
        raw: String,
    },
}

impl PlannerError {
    /// Whether this failure stems from a missing credential.
    ///
    /// The orchestrator classifies those as configuration failures
    /// rather than planning failures.
    #[must_use]
    pub fn is_credential(&self) -> bool {
        matches!(self, Self::Chat(ChatError::MissingCredential))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
