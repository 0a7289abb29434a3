//! Error taxonomy for run execution.
//!
//! Two tiers:
//!
//! - [`RunError`] — run-level failures. Each one terminates the run in a
//!   `Failed` record carrying the error message and whatever telemetry
//!   accrued before the failure point. Never propagated out of the
//!   background worker.
//! - [`SpecError`] — item-level validation failures for individual
//!   hierarchy entries. These are skipped with a warning and are never
//!   fatal to the run.
//!
//! Telemetry-internal problems have no type here: lifecycle hooks absorb
//! and log them so a telemetry glitch cannot abort a run.

use thiserror::Error;

/// Run-level failure. Always produces a terminal `Failed` result.
#[derive(Debug, Error)]
pub enum RunError {
    /// A required external credential is missing. Fatal to the run, not
    /// the process.
    #[error("Configuration Error: {0}")]
    Configuration(String),

    /// The planning collaborator returned a malformed or errored
    /// hierarchy response.
    #[error("Error generating hierarchy: {0}")]
    Planning(String),

    /// The execution engine raised during the run.
    #[error("Error During Crew Execution: {0}")]
    Execution(String),

    /// No valid agents or tasks survived hierarchy validation.
    #[error("Crew could not run: No valid agents or tasks were created from the hierarchy.")]
    NoAgents,
}

/// Validation failure for one hierarchy entry.
///
/// Carries the entry's position for the warning message; the run skips
/// the entry and continues.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpecError {
    /// The entry is not a JSON object.
    #[error("agent data item {index} is not an object")]
    NotAnObject {
        /// Position in the hierarchy.
        index: usize,
    },

    /// A required field is absent.
    #[error("missing '{field}' in agent data item {index}")]
    MissingField {
        /// Position in the hierarchy.
        index: usize,
        /// The absent field.
        field: &'static str,
    },

    /// A required field is present but empty.
    #[error("empty '{field}' in agent data item {index}")]
    EmptyField {
        /// Position in the hierarchy.
        index: usize,
        /// The empty field.
        field: &'static str,
    },

    /// A field has the wrong JSON type.
    #[error("invalid '{field}' in agent data item {index}")]
    WrongType {
        /// Position in the hierarchy.
        index: usize,
        /// The offending field.
        field: &'static str,
    },

    /// `level` is present but not a positive integer.
    #[error("invalid 'level' in agent data item {index}: must be a positive integer")]
    InvalidLevel {
        /// Position in the hierarchy.
        index: usize,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
