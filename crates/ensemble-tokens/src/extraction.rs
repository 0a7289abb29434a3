//! Tolerant token-usage extraction.
//!
//! Collaborators report usage in several shapes:
//!
//! - nested under a `token_usage` key (model-call results)
//! - a flat object of counters (engine totals)
//! - snake_case or camelCase field names
//!
//! Extraction never fails: a missing field, a wrong type, or a non-object
//! value yields zero for that counter. Accounting prefers a zero over an
//! aborted run.

use ensemble_core::records::{EngineUsage, TokenUsage};
use serde_json::Value;

/// Extract a [`TokenUsage`] triple from a model-call result value.
///
/// Looks for the counters inside a nested `token_usage` / `usage` object
/// first, then on the value itself. Every missing field defaults to zero.
#[must_use]
pub fn usage_from_value(value: &Value) -> TokenUsage {
    let obj = value
        .get("token_usage")
        .or_else(|| value.get("usage"))
        .unwrap_or(value);

    TokenUsage {
        prompt_tokens: counter(obj, &["prompt_tokens", "promptTokens"]),
        completion_tokens: counter(obj, &["completion_tokens", "completionTokens"]),
        total_tokens: counter(obj, &["total_tokens", "totalTokens"]),
    }
}

/// Normalize an engine-level usage value into [`EngineUsage`].
///
/// Accepts the same counter aliases as [`usage_from_value`] plus a
/// `successful_requests` count.
#[must_use]
pub fn engine_usage_from_value(value: &Value) -> EngineUsage {
    EngineUsage {
        usage: usage_from_value(value),
        successful_requests: counter(value, &["successful_requests", "successfulRequests"]),
    }
}

/// Read the first present alias as a non-negative integer, else 0.
///
/// Numbers reported as floats are truncated; negative values clamp to 0.
fn counter(value: &Value, names: &[&str]) -> u64 {
    for name in names {
        if let Some(v) = value.get(name) {
            if let Some(n) = v.as_u64() {
                return n;
            }
            if let Some(f) = v.as_f64() {
                if f.is_finite() && f > 0.0 {
                    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                    return f as u64;
                }
                return 0;
            }
        }
    }
    0
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flat_object() {
        let u = usage_from_value(&json!({
            "prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15
        }));
        assert_eq!(u, TokenUsage::new(10, 5, 15));
    }

    #[test]
    fn nested_token_usage() {
        let u = usage_from_value(&json!({
            "token_usage": {"prompt_tokens": 30, "completion_tokens": 5, "total_tokens": 35}
        }));
        assert_eq!(u, TokenUsage::new(30, 5, 35));
    }

    #[test]
    fn nested_usage_alias() {
        let u = usage_from_value(&json!({
            "usage": {"prompt_tokens": 1, "completion_tokens": 2, "total_tokens": 3}
        }));
        assert_eq!(u, TokenUsage::new(1, 2, 3));
    }

    #[test]
    fn camel_case_aliases() {
        let u = usage_from_value(&json!({
            "promptTokens": 7, "completionTokens": 3, "totalTokens": 10
        }));
        assert_eq!(u, TokenUsage::new(7, 3, 10));
    }

    #[test]
    fn missing_fields_default_to_zero() {
        let u = usage_from_value(&json!({"total_tokens": 42}));
        assert_eq!(u, TokenUsage::new(0, 0, 42));
    }

    #[test]
    fn empty_object_is_all_zero() {
        assert!(usage_from_value(&json!({})).is_zero());
    }

    #[test]
    fn non_object_is_all_zero() {
        assert!(usage_from_value(&json!(null)).is_zero());
        assert!(usage_from_value(&json!("lots of tokens")).is_zero());
        assert!(usage_from_value(&json!(12)).is_zero());
    }

    #[test]
    fn wrong_typed_field_is_zero() {
        let u = usage_from_value(&json!({"prompt_tokens": "ten", "total_tokens": 5}));
        assert_eq!(u, TokenUsage::new(0, 0, 5));
    }

    #[test]
    fn float_counters_truncate() {
        let u = usage_from_value(&json!({"prompt_tokens": 10.9, "total_tokens": 15.1}));
        assert_eq!(u.prompt_tokens, 10);
        assert_eq!(u.total_tokens, 15);
    }

    #[test]
    fn negative_counters_clamp_to_zero() {
        let u = usage_from_value(&json!({"prompt_tokens": -4, "total_tokens": -1.5}));
        assert!(u.is_zero());
    }

    #[test]
    fn snake_case_preferred_over_camel() {
        let u = usage_from_value(&json!({"prompt_tokens": 3, "promptTokens": 99}));
        assert_eq!(u.prompt_tokens, 3);
    }

    // ── engine_usage_from_value ──

    #[test]
    fn engine_usage_with_requests() {
        let eu = engine_usage_from_value(&json!({
            "total_tokens": 150, "prompt_tokens": 100, "completion_tokens": 50,
            "successful_requests": 4
        }));
        assert_eq!(eu.usage, TokenUsage::new(100, 50, 150));
        assert_eq!(eu.successful_requests, 4);
    }

    #[test]
    fn engine_usage_missing_requests() {
        let eu = engine_usage_from_value(&json!({"total_tokens": 5}));
        assert_eq!(eu.successful_requests, 0);
    }

    #[test]
    fn engine_usage_camel_case_requests() {
        let eu = engine_usage_from_value(&json!({"successfulRequests": 2}));
        assert_eq!(eu.successful_requests, 2);
    }
}
