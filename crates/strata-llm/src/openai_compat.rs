//! OpenAI-compatible LLM provider.
//!
//! Speaks the `/chat/completions` dialect, which also covers Azure
//! OpenAI, Ollama, Friendli, and Gemini's compatibility endpoint.

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

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_CONTEXT_WINDOW: usize = 128_000;

/// OpenAI-compatible provider.
pub struct OpenAiCompatProvider {
    client: Client,
    config: ProviderConfig,
    provider_id: String,
    keyless: bool,
}

impl OpenAiCompatProvider {
    /// Create a provider for the given compatible service.
    #[must_use]
    pub fn new(provider_id: impl Into<String>, config: ProviderConfig) -> Self {
        let provider_id = provider_id.into();
        // Local runtimes authenticate by reachability, not key.
        let keyless = provider_id == "ollama";
        Self {
            client: Client::new(),
            config,
            provider_id,
            keyless,
        }
    }

    fn build_request(&self, messages: &[Message], tools: &[LlmToolDefinition], system: &str) -> Value {
        let mut api_messages: Vec<Value> = Vec::new();
        if !system.is_empty() {
            api_messages.push(serde_json::json!({"role": "system", "content": system}));
        }
        api_messages.extend(
            messages
                .iter()
                .filter(|m| m.role != MessageRole::System)
                .map(Self::convert_message),
        );

        let mut request = serde_json::json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "messages": api_messages,
        });

        if !tools.is_empty() {
            let api_tools: Vec<Value> = tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.input_schema,
                        }
                    })
                })
                .collect();
            request["tools"] = Value::Array(api_tools);
        }

        request
    }

    fn convert_message(message: &Message) -> Value {
        match &message.content {
            MessageContent::Text(text) => {
                serde_json::json!({
                    "role": match message.role {
                        MessageRole::Assistant => "assistant",
                        MessageRole::System => "system",
                        MessageRole::User | MessageRole::Tool => "user",
                    },
                    "content": text,
                })
            },
            MessageContent::ToolCalls(calls) => {
                let tool_calls: Vec<Value> = calls
                    .iter()
                    .map(|c| {
                        serde_json::json!({
                            "id": c.id,
                            "type": "function",
                            "function": {
                                "name": c.name,
                                "arguments": c.arguments.to_string(),
                            }
                        })
                    })
                    .collect();
                serde_json::json!({
                    "role": "assistant",
                    "content": Value::Null,
                    "tool_calls": tool_calls,
                })
            },
            MessageContent::ToolResult(result) => {
                serde_json::json!({
                    "role": "tool",
                    "tool_call_id": result.call_id,
                    "content": result.content,
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
                                "type": "image_url",
                                "image_url": {"url": format!("data:{media_type};base64,{data}")},
                            })
                        },
                    })
                    .collect();
                serde_json::json!({"role": "user", "content": content})
            },
        }
    }

    fn parse_response(payload: &Value) -> LlmResult<LlmResponse> {
        let choice = payload
            .get("choices")
            .and_then(|c| c.get(0))
            .ok_or_else(|| LlmError::InvalidResponse("missing choices".to_string()))?;
        let api_message = choice
            .get("message")
            .ok_or_else(|| LlmError::InvalidResponse("missing message".to_string()))?;

        let tool_calls: Vec<ToolCall> = api_message
            .get("tool_calls")
            .and_then(Value::as_array)
            .map(|calls| {
                calls
                    .iter()
                    .filter_map(|c| {
                        let function = c.get("function")?;
                        let arguments = function
                            .get("arguments")
                            .and_then(Value::as_str)
                            .and_then(|s| serde_json::from_str(s).ok())
                            .unwrap_or(Value::Null);
                        Some(ToolCall {
                            id: c.get("id").and_then(Value::as_str)?.to_string(),
                            name: function.get("name").and_then(Value::as_str)?.to_string(),
                            arguments,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let message = if tool_calls.is_empty() {
            let text = api_message
                .get("content")
                .and_then(Value::as_str)
                .unwrap_or_default();
            Message::assistant(text)
        } else {
            Message::assistant_with_tools(tool_calls)
        };

        let has_tool_calls = message.tool_calls().is_some_and(|c| !c.is_empty());
        let stop_reason = match choice.get("finish_reason").and_then(Value::as_str) {
            Some("length") => StopReason::MaxTokens,
            Some("tool_calls") => StopReason::ToolUse,
            _ if has_tool_calls => StopReason::ToolUse,
            _ => StopReason::EndTurn,
        };

        Ok(LlmResponse {
            message,
            has_tool_calls,
            stop_reason,
            usage: extract_usage(payload),
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn provider_id(&self) -> &str {
        &self.provider_id
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
        if !self.keyless {
            self.config.require_api_key(&self.provider_id)?;
        }

        let request_body = self.build_request(messages, tools, system);
        let url = self.config.base_url.as_deref().unwrap_or(OPENAI_API_URL);

        debug!(model = self.config.model, provider = self.provider_id, "Chat completion");

        let mut request = self
            .client
            .post(url)
            .header("content-type", "application/json");
        if !self.config.api_key.is_empty() {
            let mut auth = reqwest::header::HeaderValue::try_from(format!(
                "Bearer {}",
                self.config.api_key
            ))
            .map_err(|e| LlmError::ConfigError(format!("Invalid API key characters: {e}")))?;
            auth.set_sensitive(true);
            request = request.header("authorization", auth);
        }

        let response = request.json(&request_body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, provider = self.provider_id, "Chat completion error");

            return Err(match status.as_u16() {
                401 | 403 => LlmError::AuthRejected {
                    provider: self.provider_id.clone(),
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
            "choices": [{"message": {"content": "Hi"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 9, "completion_tokens": 1},
        });
        let response = OpenAiCompatProvider::parse_response(&payload).unwrap();
        assert_eq!(response.answer_text(), "Hi");
        assert_eq!(response.usage.input_tokens, 9);
        assert_eq!(response.usage.output_tokens, 1);
    }

    #[test]
    fn test_parse_tool_calls() {
        let payload = json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "base_readQuery", "arguments": "{\"sql\":\"select 1\"}"},
                    }],
                },
                "finish_reason": "tool_calls",
            }],
            "usage": {"prompt_tokens": 20, "completion_tokens": 8},
        });
        let response = OpenAiCompatProvider::parse_response(&payload).unwrap();
        assert!(response.has_tool_calls);
        let calls = response.message.tool_calls().unwrap();
        assert_eq!(calls[0].arguments["sql"], "select 1");
    }

    #[test]
    fn test_tool_result_round_trips_as_tool_role() {
        let message = Message::tool_result(crate::types::ToolCallResult::success("c1", "ok"));
        let converted = OpenAiCompatProvider::convert_message(&message);
        assert_eq!(converted["role"], "tool");
        assert_eq!(converted["tool_call_id"], "c1");
    }

    #[test]
    fn test_missing_choices_is_invalid() {
        assert!(OpenAiCompatProvider::parse_response(&json!({})).is_err());
    }
}
