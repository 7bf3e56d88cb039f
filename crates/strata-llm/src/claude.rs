//! Claude (Anthropic) LLM provider implementation.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, error};

use crate::error::{LlmError, LlmResult};
use crate::provider::{LlmProvider, ProviderConfig};
use crate::types::{
    ContentPart, LlmResponse, LlmToolDefinition, Message, MessageContent, MessageRole, StopReason,
    ToolCall,
};
use crate::usage::extract_usage;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_CONTEXT_WINDOW: usize = 200_000;

/// Claude LLM provider.
pub struct ClaudeProvider {
    client: Client,
    config: ProviderConfig,
}

impl ClaudeProvider {
    /// Create a new Claude provider.
    #[must_use]
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// Build the API request body.
    fn build_request(&self, messages: &[Message], tools: &[LlmToolDefinition], system: &str) -> Value {
        let api_messages: Vec<Value> = messages
            .iter()
            .filter(|m| m.role != MessageRole::System)
            .map(Self::convert_message)
            .collect();

        let mut request = serde_json::json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "messages": api_messages,
        });

        if !system.is_empty() {
            request["system"] = Value::String(system.to_string());
        }

        if !tools.is_empty() {
            let api_tools: Vec<Value> = tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.input_schema,
                    })
                })
                .collect();
            request["tools"] = Value::Array(api_tools);
        }

        request
    }

    /// Convert our Message to Anthropic format.
    fn convert_message(message: &Message) -> Value {
        match &message.content {
            MessageContent::Text(text) => {
                serde_json::json!({
                    "role": match message.role {
                        MessageRole::Assistant => "assistant",
                        MessageRole::User | MessageRole::Tool | MessageRole::System => "user",
                    },
                    "content": text,
                })
            },
            MessageContent::ToolCalls(calls) => {
                let content: Vec<Value> = calls
                    .iter()
                    .map(|c| {
                        serde_json::json!({
                            "type": "tool_use",
                            "id": c.id,
                            "name": c.name,
                            "input": c.arguments,
                        })
                    })
                    .collect();

                serde_json::json!({
                    "role": "assistant",
                    "content": content,
                })
            },
            MessageContent::ToolResult(result) => {
                serde_json::json!({
                    "role": "user",
                    "content": [{
                        "type": "tool_result",
                        "tool_use_id": result.call_id,
                        "content": result.content,
                        "is_error": result.is_error,
                    }],
                })
            },
            MessageContent::MultiPart(parts) => {
                let content: Vec<Value> = parts
                    .iter()
                    .map(|p| match p {
                        ContentPart::Text { text } => {
                            serde_json::json!({"type": "text", "text": text})
                        },
                        ContentPart::Image { data, media_type } => {
                            serde_json::json!({
                                "type": "image",
                                "source": {
                                    "type": "base64",
                                    "media_type": media_type,
                                    "data": data,
                                }
                            })
                        },
                    })
                    .collect();

                serde_json::json!({
                    "role": match message.role {
                        MessageRole::Assistant => "assistant",
                        MessageRole::User | MessageRole::Tool | MessageRole::System => "user",
                    },
                    "content": content,
                })
            },
        }
    }

    /// Parse a response payload into our types.
    ///
    /// Content-block lists may contain `thinking` blocks; these are
    /// dropped so only visible text reaches the answer.
    fn parse_response(payload: &Value) -> LlmResult<LlmResponse> {
        let blocks = payload
            .get("content")
            .and_then(Value::as_array)
            .ok_or_else(|| LlmError::InvalidResponse("missing content array".to_string()))?;

        let mut text_content = String::new();
        let mut tool_calls = Vec::new();

        for block in blocks {
            match block.get("type").and_then(Value::as_str) {
                Some("text") => {
                    if let Some(text) = block.get("text").and_then(Value::as_str) {
                        text_content.push_str(text);
                    }
                },
                Some("tool_use") => {
                    tool_calls.push(ToolCall {
                        id: block
                            .get("id")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        name: block
                            .get("name")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        arguments: block.get("input").cloned().unwrap_or(Value::Null),
                    });
                },
                // Thinking blocks are internal reasoning; never surfaced.
                Some("thinking" | "redacted_thinking") => {},
                _ => {},
            }
        }

        let message = if tool_calls.is_empty() {
            Message::assistant(text_content)
        } else {
            Message::assistant_with_tools(tool_calls)
        };

        let stop_reason = match payload.get("stop_reason").and_then(Value::as_str) {
            Some("max_tokens") => StopReason::MaxTokens,
            Some("tool_use") => StopReason::ToolUse,
            Some("stop_sequence") => StopReason::StopSequence,
            _ => StopReason::EndTurn,
        };

        Ok(LlmResponse {
            has_tool_calls: matches!(stop_reason, StopReason::ToolUse),
            message,
            stop_reason,
            usage: extract_usage(payload),
        })
    }
}

#[async_trait]
impl LlmProvider for ClaudeProvider {
    #[allow(clippy::unnecessary_literal_bound)]
    fn provider_id(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn complete(
        &self,
        messages: &[Message],
        tools: &[LlmToolDefinition],
        system: &str,
    ) -> LlmResult<LlmResponse> {
        self.config.require_api_key("anthropic")?;

        let request_body = self.build_request(messages, tools, system);
        let url = self.config.base_url.as_deref().unwrap_or(ANTHROPIC_API_URL);

        debug!(model = self.config.model, "Claude completion");

        let mut api_key_header = reqwest::header::HeaderValue::try_from(&self.config.api_key)
            .map_err(|e| LlmError::ConfigError(format!("Invalid API key characters: {e}")))?;
        api_key_header.set_sensitive(true);

        let response = self
            .client
            .post(url)
            .header("x-api-key", api_key_header)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, "Claude API error");

            return Err(match status.as_u16() {
                401 | 403 => LlmError::AuthRejected {
                    provider: "anthropic".to_string(),
                },
                429 => LlmError::RateLimitExceeded {
                    retry_after_secs: retry_after.unwrap_or(60),
                },
                s if s >= 500 => LlmError::Transient(format!("status {status}")),
                _ => LlmError::ApiRequestFailed(format!("status {status}: {body}")),
            });
        }

        let payload: Value = response.json().await?;
        Self::parse_response(&payload)
    }

    fn max_context_length(&self) -> usize {
        self.config.context_window.unwrap_or(DEFAULT_CONTEXT_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_text_response() {
        let payload = json!({
            "content": [{"type": "text", "text": "Hello!"}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 10, "output_tokens": 2},
        });
        let response = ClaudeProvider::parse_response(&payload).unwrap();
        assert!(!response.has_tool_calls);
        assert_eq!(response.answer_text(), "Hello!");
        assert_eq!(response.usage.input_tokens, 10);
    }

    #[test]
    fn test_parse_drops_thinking_blocks() {
        let payload = json!({
            "content": [
                {"type": "thinking", "thinking": "let me reason..."},
                {"type": "text", "text": "The answer is 4."},
            ],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 1, "output_tokens": 1},
        });
        let response = ClaudeProvider::parse_response(&payload).unwrap();
        assert_eq!(response.answer_text(), "The answer is 4.");
    }

    #[test]
    fn test_parse_tool_use() {
        let payload = json!({
            "content": [{
                "type": "tool_use",
                "id": "toolu_1",
                "name": "base_readQuery",
                "input": {"sql": "select 1"},
            }],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 5, "output_tokens": 3},
        });
        let response = ClaudeProvider::parse_response(&payload).unwrap();
        assert!(response.has_tool_calls);
        let calls = response.message.tool_calls().unwrap();
        assert_eq!(calls[0].name, "base_readQuery");
    }

    #[test]
    fn test_missing_content_is_invalid() {
        let payload = json!({"stop_reason": "end_turn"});
        assert!(ClaudeProvider::parse_response(&payload).is_err());
    }

    #[test]
    fn test_tool_result_converts_to_user_role() {
        let message = Message::tool_result(crate::types::ToolCallResult::success("id1", "42"));
        let converted = ClaudeProvider::convert_message(&message);
        assert_eq!(converted["role"], "user");
        assert_eq!(converted["content"][0]["type"], "tool_result");
    }
}
