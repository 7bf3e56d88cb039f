//! Token-usage extraction across provider metadata shapes.
//!
//! Providers report usage in different places and under different
//! field names. Extraction tries, in order:
//!
//! 1. `usage_metadata` at the top level of the payload
//! 2. `response_metadata.token_usage`, `.usage`, or `.usage_metadata`
//! 3. `generations[0].message.usage_metadata`
//! 4. `usage` at the top level (OpenAI / Anthropic REST shape)
//!
//! Within any of these objects, `input_tokens`/`output_tokens` win when
//! either is non-zero; otherwise `prompt_tokens`/`completion_tokens`
//! are used. A payload with none of the shapes yields zero usage and a
//! single log line.

use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

use crate::types::Usage;

static MISSING_USAGE_LOGGED: AtomicBool = AtomicBool::new(false);

/// Extract token usage from a provider response payload.
#[must_use]
pub fn extract_usage(payload: &Value) -> Usage {
    let candidates = [
        payload.get("usage_metadata"),
        payload
            .get("response_metadata")
            .and_then(|m| m.get("token_usage")),
        payload.get("response_metadata").and_then(|m| m.get("usage")),
        payload
            .get("response_metadata")
            .and_then(|m| m.get("usage_metadata")),
        payload
            .get("generations")
            .and_then(|g| g.get(0))
            .and_then(|g| g.get("message"))
            .and_then(|m| m.get("usage_metadata")),
        payload.get("usage"),
    ];

    for candidate in candidates.into_iter().flatten() {
        if let Some(usage) = usage_from_object(candidate) {
            return usage;
        }
    }

    if !MISSING_USAGE_LOGGED.swap(true, Ordering::Relaxed) {
        warn!("No token usage found in LLM response metadata; accounting will record zero");
    }
    Usage::default()
}

/// Read a usage object, preferring `input_tokens`/`output_tokens` when
/// either is non-zero.
fn usage_from_object(obj: &Value) -> Option<Usage> {
    if !obj.is_object() {
        return None;
    }

    let input = field(obj, "input_tokens");
    let output = field(obj, "output_tokens");
    if input.unwrap_or(0) > 0 || output.unwrap_or(0) > 0 {
        return Some(Usage {
            input_tokens: input.unwrap_or(0),
            output_tokens: output.unwrap_or(0),
        });
    }

    let prompt = field(obj, "prompt_tokens");
    let completion = field(obj, "completion_tokens");
    if prompt.is_some() || completion.is_some() {
        return Some(Usage {
            input_tokens: prompt.unwrap_or(0),
            output_tokens: completion.unwrap_or(0),
        });
    }

    // Both input_tokens and output_tokens present but zero: a genuine
    // zero-usage report, not a missing shape.
    if input.is_some() && output.is_some() {
        return Some(Usage::default());
    }

    None
}

fn field(obj: &Value, name: &str) -> Option<u64> {
    obj.get(name).and_then(Value::as_u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_anthropic_rest_shape() {
        let payload = json!({"usage": {"input_tokens": 120, "output_tokens": 30}});
        let usage = extract_usage(&payload);
        assert_eq!(usage.input_tokens, 120);
        assert_eq!(usage.output_tokens, 30);
    }

    #[test]
    fn test_openai_shape() {
        let payload = json!({"usage": {"prompt_tokens": 80, "completion_tokens": 12}});
        let usage = extract_usage(&payload);
        assert_eq!(usage.input_tokens, 80);
        assert_eq!(usage.output_tokens, 12);
    }

    #[test]
    fn test_usage_metadata_wins_over_usage() {
        let payload = json!({
            "usage_metadata": {"input_tokens": 5, "output_tokens": 1},
            "usage": {"prompt_tokens": 99, "completion_tokens": 99},
        });
        let usage = extract_usage(&payload);
        assert_eq!(usage.input_tokens, 5);
    }

    #[test]
    fn test_response_metadata_token_usage() {
        let payload = json!({
            "response_metadata": {"token_usage": {"prompt_tokens": 7, "completion_tokens": 3}}
        });
        let usage = extract_usage(&payload);
        assert_eq!(usage.input_tokens, 7);
        assert_eq!(usage.output_tokens, 3);
    }

    #[test]
    fn test_generation_metadata() {
        let payload = json!({
            "generations": [{"message": {"usage_metadata": {"input_tokens": 11, "output_tokens": 4}}}]
        });
        let usage = extract_usage(&payload);
        assert_eq!(usage.input_tokens, 11);
    }

    #[test]
    fn test_prefers_nonzero_input_output_over_prompt_completion() {
        // Both naming schemes present in one object: input/output wins
        // when non-zero.
        let payload = json!({
            "usage": {
                "input_tokens": 42, "output_tokens": 8,
                "prompt_tokens": 1, "completion_tokens": 1,
            }
        });
        let usage = extract_usage(&payload);
        assert_eq!(usage.input_tokens, 42);
        assert_eq!(usage.output_tokens, 8);
    }

    #[test]
    fn test_zero_input_output_falls_back_to_prompt_completion() {
        let payload = json!({
            "usage": {
                "input_tokens": 0, "output_tokens": 0,
                "prompt_tokens": 60, "completion_tokens": 9,
            }
        });
        let usage = extract_usage(&payload);
        assert_eq!(usage.input_tokens, 60);
        assert_eq!(usage.output_tokens, 9);
    }

    #[test]
    fn test_missing_usage_is_zero() {
        let usage = extract_usage(&json!({"content": []}));
        assert_eq!(usage, Usage::default());
    }
}
