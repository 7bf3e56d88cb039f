//! The conversation executor: a ReAct loop with event streaming.
//!
//! Each iteration calls the LLM with the bound tools, executes any
//! tool calls it emits (feeding failures back for recovery), and stops
//! when the model answers in plain text. Every LLM and tool invocation
//! is bracketed by lossy busy/idle indicator events; lossless events
//! carry turn-local token and cost counters.
//!
//! Cancellation is cooperative: the token is checked between
//! iterations and between tool calls. A pending tool call may finish,
//! but its output is discarded once cancellation was observed.

use serde_json::Value;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use strata_core::{OwnerId, RetryConfig, SessionId, StrataError, retry};
use strata_events::{
    ConversationEvent, EventMeta, EventSink, IndicatorState, IndicatorTarget,
};
use strata_llm::{
    ContentPart, LlmProvider, LlmToolDefinition, Message, ModelPricing, Usage,
};
use strata_session::{ToolAction, TraceStep};

use crate::activation::ToolRunner;
use crate::canvas::{CanvasPayload, extract_canvas_payloads};
use crate::error::RuntimeResult;

use std::sync::Arc;

/// Cap on tool-result previews in events.
const PREVIEW_CHAR_CAP: usize = 5_000;

/// Inputs for one turn's execution.
pub struct ExecutorInputs {
    /// Session the turn belongs to.
    pub session_id: SessionId,
    /// Owning user.
    pub owner_id: OwnerId,
    /// 1-based turn number.
    pub turn_number: u64,
    /// Provider id for events and accounting.
    pub provider: String,
    /// Model name for events and accounting.
    pub model: String,
    /// Assembled system prompt (context window output).
    pub system_prompt: String,
    /// Prior conversation, already filtered to valid messages.
    pub history: Vec<Message>,
    /// The user's query.
    pub query: String,
    /// Optional multimodal parts attached to the query.
    pub multimodal_parts: Vec<ContentPart>,
    /// Tool definitions bound for this turn.
    pub tools: Vec<LlmToolDefinition>,
    /// Pricing for cost accumulation.
    pub pricing: ModelPricing,
    /// Iteration cap.
    pub max_iterations: usize,
    /// Retry/timeout policy for LLM calls.
    pub retry: RetryConfig,
}

/// What a finished (or cancelled) turn produced.
#[derive(Debug, Clone)]
pub struct ExecutorOutcome {
    /// Whether the turn completed.
    pub success: bool,
    /// Whether the client cancelled it.
    pub cancelled: bool,
    /// Final answer text (auto-canvas blocks already stripped).
    pub answer: String,
    /// Tools used, in first-use order.
    pub tools_used: Vec<String>,
    /// Accumulated token usage.
    pub usage: Usage,
    /// Accumulated cost in micro-USD.
    pub cost_micro_usd: u64,
    /// Execution trace for the session's workflow history.
    pub steps: Vec<TraceStep>,
    /// Component payloads captured from tool outputs.
    pub component_payloads: Vec<Value>,
    /// Canvas payloads (captured or auto-extracted).
    pub canvas_payloads: Vec<CanvasPayload>,
}

/// ReAct-loop executor for one turn.
pub struct ConversationExecutor {
    llm: Arc<dyn LlmProvider>,
    tool_runner: Option<Arc<dyn ToolRunner>>,
    sink: EventSink,
    cancel: CancellationToken,
}

impl ConversationExecutor {
    /// Create an executor.
    #[must_use]
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        tool_runner: Option<Arc<dyn ToolRunner>>,
        sink: EventSink,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            llm,
            tool_runner,
            sink,
            cancel,
        }
    }

    async fn indicator(&self, meta: &EventMeta, target: IndicatorTarget, state: IndicatorState) {
        self.sink
            .emit(ConversationEvent::StatusIndicatorUpdate {
                meta: meta.clone(),
                target,
                state,
            })
            .await;
    }

    /// Run the turn.
    ///
    /// Individual tool failures do not abort the loop; they come back
    /// to the LLM as error results. An LLM failure aborts the turn and
    /// is surfaced to the caller, which synthesizes the apology
    /// message.
    ///
    /// # Errors
    ///
    /// Returns a tagged error when the LLM fails after retries.
    #[allow(clippy::too_many_lines)]
    pub async fn execute(&self, inputs: ExecutorInputs) -> RuntimeResult<ExecutorOutcome> {
        let base_meta = EventMeta::new(
            inputs.session_id,
            inputs.turn_number,
            inputs.provider.clone(),
            inputs.model.clone(),
        );

        let mut usage = Usage::default();
        let mut cost: u64 = 0;
        let mut tools_used: Vec<String> = Vec::new();
        let mut steps: Vec<TraceStep> = Vec::new();
        let mut component_payloads: Vec<Value> = Vec::new();
        let mut canvas_payloads: Vec<CanvasPayload> = Vec::new();

        let meta = |usage: &Usage, cost: u64| {
            base_meta.snapshot(usage.input_tokens, usage.output_tokens, cost)
        };

        self.sink
            .emit(ConversationEvent::ConversationAgentStart {
                meta: meta(&usage, cost),
                query: inputs.query.clone(),
            })
            .await;

        // INIT: system + filtered history + current user message.
        let mut messages: Vec<Message> = inputs.history.clone();
        if inputs.multimodal_parts.is_empty() {
            messages.push(Message::user(&inputs.query));
        } else {
            let mut parts = vec![ContentPart::Text {
                text: inputs.query.clone(),
            }];
            parts.extend(inputs.multimodal_parts.clone());
            messages.push(Message::user_multipart(parts));
        }

        let canvas_tool_bound = inputs
            .tools
            .iter()
            .any(|t| t.name.to_lowercase().contains("canvas"));

        let mut step_number: u64 = 0;
        let mut final_answer = String::new();

        for iteration in 0..inputs.max_iterations {
            if self.cancel.is_cancelled() {
                return Ok(self
                    .finish_cancelled(&meta(&usage, cost), usage, cost, tools_used, steps)
                    .await);
            }

            // LLM_CALL with per-call timeout and bounded backoff.
            self.indicator(&meta(&usage, cost), IndicatorTarget::Llm, IndicatorState::Busy)
                .await;
            let llm = Arc::clone(&self.llm);
            let call_messages = messages.clone();
            let call_tools = inputs.tools.clone();
            let system = inputs.system_prompt.clone();
            let response = retry(inputs.retry, "llm completion", move || {
                let llm = Arc::clone(&llm);
                let messages = call_messages.clone();
                let tools = call_tools.clone();
                let system = system.clone();
                async move {
                    llm.complete(&messages, &tools, &system)
                        .await
                        .map_err(StrataError::from)
                }
            })
            .await;
            self.indicator(&meta(&usage, cost), IndicatorTarget::Llm, IndicatorState::Idle)
                .await;

            let response = match response {
                Ok(response) => response,
                Err(err) => {
                    self.sink
                        .emit(ConversationEvent::ConversationAgentComplete {
                            meta: meta(&usage, cost),
                            success: false,
                            cancelled: false,
                            tools_used: tools_used.clone(),
                            answer: String::new(),
                        })
                        .await;
                    return Err(err.into());
                },
            };

            usage.add(response.usage);
            cost = cost.saturating_add(
                inputs
                    .pricing
                    .cost_micro_usd(response.usage.input_tokens, response.usage.output_tokens),
            );

            step_number = step_number.saturating_add(1);
            let step_name = if response.has_tool_calls {
                "Tool Selection"
            } else {
                "Response Generation"
            };
            self.sink
                .emit(ConversationEvent::ConversationLlmStep {
                    meta: meta(&usage, cost),
                    step_number,
                    step_name: step_name.to_string(),
                })
                .await;

            let tool_calls = response.message.tool_calls().unwrap_or(&[]).to_vec();
            if tool_calls.is_empty() {
                // FINAL.
                final_answer = response.answer_text().to_string();
                break;
            }

            messages.push(response.message.clone());

            // TOOL_CALL*: execute each call, feeding results (or
            // errors) back to the LLM.
            for call in &tool_calls {
                if self.cancel.is_cancelled() {
                    return Ok(self
                        .finish_cancelled(&meta(&usage, cost), usage, cost, tools_used, steps)
                        .await);
                }

                self.sink
                    .emit(ConversationEvent::ConversationToolInvoked {
                        meta: meta(&usage, cost),
                        tool_name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    })
                    .await;
                self.indicator(&meta(&usage, cost), IndicatorTarget::Db, IndicatorState::Busy)
                    .await;

                let started = Instant::now();
                let result = match self.tool_runner.as_ref() {
                    Some(runner) => runner.run(&call.name, &call.arguments).await,
                    None => Err(strata_mcp::McpError::NotConnected),
                };
                let duration_ms = duration_ms(started.elapsed());

                self.indicator(&meta(&usage, cost), IndicatorTarget::Db, IndicatorState::Idle)
                    .await;

                if self.cancel.is_cancelled() {
                    // The call finished but cancellation was observed:
                    // discard its output.
                    return Ok(self
                        .finish_cancelled(&meta(&usage, cost), usage, cost, tools_used, steps)
                        .await);
                }

                if !tools_used.contains(&call.name) {
                    tools_used.push(call.name.clone());
                }

                match result {
                    Ok(output) => {
                        let success = !output.is_error;
                        let preview = truncate_chars(&output.content, PREVIEW_CHAR_CAP);
                        self.sink
                            .emit(ConversationEvent::ConversationToolCompleted {
                                meta: meta(&usage, cost),
                                tool_name: call.name.clone(),
                                success,
                                preview: preview.clone(),
                                duration_ms,
                                error: (!success).then(|| output.content.clone()),
                            })
                            .await;

                        capture_component_payloads(
                            output.metadata.as_ref(),
                            &mut component_payloads,
                            &mut canvas_payloads,
                        );
                        // Sub-window payloads stream in real time.
                        for payload in sub_window_payloads(output.metadata.as_ref()) {
                            self.sink
                                .emit(ConversationEvent::ComponentRender {
                                    meta: meta(&usage, cost),
                                    payload,
                                })
                                .await;
                        }

                        steps.push(trace_step(call, &output.content, success, output.metadata));
                        messages.push(Message::tool_result(if success {
                            strata_llm::ToolCallResult::success(&call.id, &output.content)
                        } else {
                            strata_llm::ToolCallResult::error(&call.id, &output.content)
                        }));
                    },
                    Err(err) => {
                        // Surface the failure to the LLM for recovery;
                        // the loop continues.
                        let message = err.to_string();
                        warn!(tool = %call.name, error = %message, "Tool call failed");
                        self.sink
                            .emit(ConversationEvent::ConversationToolCompleted {
                                meta: meta(&usage, cost),
                                tool_name: call.name.clone(),
                                success: false,
                                preview: truncate_chars(&message, PREVIEW_CHAR_CAP),
                                duration_ms,
                                error: Some(message.clone()),
                            })
                            .await;
                        steps.push(trace_step(call, &message, false, None));
                        messages.push(Message::tool_result(
                            strata_llm::ToolCallResult::error(&call.id, &message),
                        ));
                    },
                }
            }

            if iteration.saturating_add(1) == inputs.max_iterations {
                debug!(max = inputs.max_iterations, "Iteration cap reached");
                final_answer =
                    "I reached the tool-call limit for this turn before finishing. \
                     The partial results gathered so far are recorded above."
                        .to_string();
            }
        }

        // Auto-canvas: promote fenced blocks when a Canvas tool was
        // bound but no canvas payload was produced.
        if canvas_tool_bound && canvas_payloads.is_empty() {
            let (extracted, cleaned) = extract_canvas_payloads(&final_answer);
            if !extracted.is_empty() {
                canvas_payloads = extracted;
                final_answer = cleaned;
            }
        }

        self.sink
            .emit(ConversationEvent::ConversationLlmComplete {
                meta: meta(&usage, cost),
            })
            .await;
        self.sink
            .emit(ConversationEvent::ConversationAgentComplete {
                meta: meta(&usage, cost),
                success: true,
                cancelled: false,
                tools_used: tools_used.clone(),
                answer: final_answer.clone(),
            })
            .await;

        Ok(ExecutorOutcome {
            success: true,
            cancelled: false,
            answer: final_answer,
            tools_used,
            usage,
            cost_micro_usd: cost,
            steps,
            component_payloads,
            canvas_payloads,
        })
    }

    async fn finish_cancelled(
        &self,
        meta: &EventMeta,
        usage: Usage,
        cost: u64,
        tools_used: Vec<String>,
        steps: Vec<TraceStep>,
    ) -> ExecutorOutcome {
        debug!("Turn cancelled");
        self.sink
            .emit(ConversationEvent::ConversationAgentComplete {
                meta: meta.clone(),
                success: false,
                cancelled: true,
                tools_used: tools_used.clone(),
                answer: String::new(),
            })
            .await;
        ExecutorOutcome {
            success: false,
            cancelled: true,
            answer: String::new(),
            tools_used,
            usage,
            cost_micro_usd: cost,
            steps,
            component_payloads: Vec::new(),
            canvas_payloads: Vec::new(),
        }
    }
}

impl std::fmt::Debug for ConversationExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationExecutor")
            .field("model", &self.llm.model())
            .finish_non_exhaustive()
    }
}

fn duration_ms(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

/// Truncate to a character-count cap on a char boundary.
fn truncate_chars(text: &str, cap: usize) -> String {
    if text.chars().count() <= cap {
        return text.to_string();
    }
    let truncated: String = text.chars().take(cap).collect();
    format!("{truncated}… (truncated)")
}

/// Build a workflow trace step. Tool output that parses as a JSON
/// array becomes row results so plan hydration can summarize it.
fn trace_step(
    call: &strata_llm::ToolCall,
    content: &str,
    success: bool,
    metadata: Option<Value>,
) -> TraceStep {
    let results: Vec<Value> = serde_json::from_str::<Value>(content)
        .ok()
        .and_then(|v| v.as_array().cloned())
        .unwrap_or_else(|| vec![Value::String(truncate_chars(content, 2_000))]);

    TraceStep {
        action: ToolAction {
            tool_name: call.name.clone(),
            args: call.arguments.clone(),
        },
        output_summary: serde_json::json!({
            "status": if success { "success" } else { "error" },
            "results": results,
            "metadata": metadata,
        }),
    }
}

/// Pull component payloads out of tool metadata.
fn capture_component_payloads(
    metadata: Option<&Value>,
    component_payloads: &mut Vec<Value>,
    canvas_payloads: &mut Vec<CanvasPayload>,
) {
    for payload in all_payloads(metadata) {
        if payload.get("component").and_then(Value::as_str) == Some("canvas")
            && let Ok(canvas) = serde_json::from_value::<CanvasPayload>(payload.clone())
        {
            canvas_payloads.push(canvas);
        }
        component_payloads.push(payload);
    }
}

fn sub_window_payloads(metadata: Option<&Value>) -> Vec<Value> {
    all_payloads(metadata)
        .into_iter()
        .filter(|p| p.get("render_target").and_then(Value::as_str) == Some("sub_window"))
        .collect()
}

fn all_payloads(metadata: Option<&Value>) -> Vec<Value> {
    let Some(metadata) = metadata else {
        return Vec::new();
    };
    if let Some(list) = metadata.get("component_payloads").and_then(Value::as_array) {
        return list.clone();
    }
    if metadata.get("component").is_some() {
        return vec![metadata.clone()];
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use strata_events::turn_channel;
    use strata_llm::{LlmResponse, LlmResult, StopReason, ToolCall};
    use strata_mcp::{McpResult, McpToolResult};

    /// LLM that emits one tool call, then a final answer.
    struct ScriptedLlm {
        responses: Mutex<Vec<LlmResponse>>,
    }

    impl ScriptedLlm {
        fn new(responses: Vec<LlmResponse>) -> Self {
            Self {
                responses: Mutex::new(responses),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedLlm {
        fn provider_id(&self) -> &str {
            "scripted"
        }
        fn model(&self) -> &str {
            "scripted-1"
        }
        async fn complete(
            &self,
            _messages: &[Message],
            _tools: &[LlmToolDefinition],
            _system: &str,
        ) -> LlmResult<LlmResponse> {
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(strata_llm::LlmError::InvalidResponse("script empty".into()));
            }
            Ok(responses.remove(0))
        }
        fn max_context_length(&self) -> usize {
            100_000
        }
    }

    struct OkRunner;

    #[async_trait]
    impl ToolRunner for OkRunner {
        async fn run(&self, _name: &str, _args: &Value) -> McpResult<McpToolResult> {
            Ok(McpToolResult::text(
                "[{\"product\": \"A\", \"sales\": 100}]",
            ))
        }
    }

    struct FailingRunner;

    #[async_trait]
    impl ToolRunner for FailingRunner {
        async fn run(&self, name: &str, _args: &Value) -> McpResult<McpToolResult> {
            Err(strata_mcp::McpError::ToolFailed {
                tool: name.to_string(),
                reason: "table does not exist".to_string(),
            })
        }
    }

    fn tool_call_response(tool: &str) -> LlmResponse {
        LlmResponse {
            message: Message::assistant_with_tools(vec![
                ToolCall::new("call_1", tool).with_arguments(serde_json::json!({"sql": "select 1"})),
            ]),
            has_tool_calls: true,
            stop_reason: StopReason::ToolUse,
            usage: Usage {
                input_tokens: 100,
                output_tokens: 10,
            },
        }
    }

    fn text_response(text: &str) -> LlmResponse {
        LlmResponse {
            message: Message::assistant(text),
            has_tool_calls: false,
            stop_reason: StopReason::EndTurn,
            usage: Usage {
                input_tokens: 50,
                output_tokens: 20,
            },
        }
    }

    fn inputs(tools: Vec<LlmToolDefinition>) -> ExecutorInputs {
        ExecutorInputs {
            session_id: SessionId::new(),
            owner_id: OwnerId::new(),
            turn_number: 1,
            provider: "scripted".into(),
            model: "scripted-1".into(),
            system_prompt: "You are a data analyst.".into(),
            history: Vec::new(),
            query: "show top 5 products by sales last month".into(),
            multimodal_parts: Vec::new(),
            tools,
            pricing: ModelPricing {
                input_per_million: 1_000_000,
                output_per_million: 3_000_000,
            },
            max_iterations: 5,
            retry: RetryConfig {
                max_attempts: 1,
                base_delay: Duration::from_millis(1),
                attempt_timeout: Duration::from_secs(5),
            },
        }
    }

    async fn drain(mut rx: strata_events::EventReceiver) -> Vec<ConversationEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_tool_loop_event_order() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            tool_call_response("base_readQuery"),
            text_response("Here are the top 5 products."),
        ]));
        let (sink, rx) = turn_channel(256);
        let executor = ConversationExecutor::new(
            llm,
            Some(Arc::new(OkRunner)),
            sink,
            CancellationToken::new(),
        );

        let outcome = executor
            .execute(inputs(vec![LlmToolDefinition::new("base_readQuery")]))
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.tools_used, vec!["base_readQuery"]);
        assert_eq!(outcome.answer, "Here are the top 5 products.");
        assert_eq!(outcome.usage.input_tokens, 150);
        assert_eq!(outcome.usage.output_tokens, 30);

        drop(executor);
        let events = drain(rx).await;
        let names: Vec<&str> = events
            .iter()
            .map(ConversationEvent::event_type)
            .filter(|n| *n != "status_indicator_update")
            .collect();
        assert_eq!(
            names,
            vec![
                "conversation_agent_start",
                "conversation_llm_step",
                "conversation_tool_invoked",
                "conversation_tool_completed",
                "conversation_llm_step",
                "conversation_llm_complete",
                "conversation_agent_complete",
            ]
        );

        // Step names match the loop phases.
        let steps: Vec<(u64, String)> = events
            .iter()
            .filter_map(|e| match e {
                ConversationEvent::ConversationLlmStep {
                    step_number,
                    step_name,
                    ..
                } => Some((*step_number, step_name.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(steps[0], (1, "Tool Selection".to_string()));
        assert_eq!(steps[1], (2, "Response Generation".to_string()));
    }

    #[tokio::test]
    async fn test_tool_failure_fed_back_to_llm() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            tool_call_response("base_readQuery"),
            text_response("That table does not exist; try another."),
        ]));
        let (sink, rx) = turn_channel(256);
        let executor = ConversationExecutor::new(
            llm,
            Some(Arc::new(FailingRunner)),
            sink,
            CancellationToken::new(),
        );

        let outcome = executor
            .execute(inputs(vec![LlmToolDefinition::new("base_readQuery")]))
            .await
            .unwrap();
        // The turn still completes.
        assert!(outcome.success);
        assert_eq!(outcome.steps.len(), 1);
        assert_eq!(outcome.steps[0].output_summary["status"], "error");

        drop(executor);
        let events = drain(rx).await;
        let failed = events.iter().any(|e| {
            matches!(
                e,
                ConversationEvent::ConversationToolCompleted { success: false, error: Some(_), .. }
            )
        });
        assert!(failed);
    }

    #[tokio::test]
    async fn test_llm_failure_aborts_with_failure_event() {
        let llm = Arc::new(ScriptedLlm::new(vec![]));
        let (sink, rx) = turn_channel(256);
        let executor =
            ConversationExecutor::new(llm, None, sink, CancellationToken::new());

        let result = executor.execute(inputs(Vec::new())).await;
        assert!(result.is_err());

        drop(executor);
        let events = drain(rx).await;
        let complete = events
            .iter()
            .find_map(|e| match e {
                ConversationEvent::ConversationAgentComplete {
                    success, cancelled, ..
                } => Some((*success, *cancelled)),
                _ => None,
            })
            .unwrap();
        assert_eq!(complete, (false, false));
    }

    #[tokio::test]
    async fn test_cancellation_before_first_iteration() {
        let llm = Arc::new(ScriptedLlm::new(vec![text_response("never sent")]));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (sink, rx) = turn_channel(256);
        let executor = ConversationExecutor::new(llm, None, sink, cancel);

        let outcome = executor.execute(inputs(Vec::new())).await.unwrap();
        assert!(outcome.cancelled);
        assert!(!outcome.success);

        drop(executor);
        let events = drain(rx).await;
        let cancelled = events.iter().any(|e| {
            matches!(
                e,
                ConversationEvent::ConversationAgentComplete { cancelled: true, .. }
            )
        });
        assert!(cancelled);
    }

    #[tokio::test]
    async fn test_auto_canvas_on_sql_answer() {
        let llm = Arc::new(ScriptedLlm::new(vec![text_response(
            "Use this query:\n```sql\nSELECT * FROM products LIMIT 5\n```\nDone.",
        )]));
        let (sink, _rx) = turn_channel(256);
        let executor =
            ConversationExecutor::new(llm, None, sink, CancellationToken::new());

        let outcome = executor
            .execute(inputs(vec![LlmToolDefinition::new("canvas_render")]))
            .await
            .unwrap();
        assert_eq!(outcome.canvas_payloads.len(), 1);
        assert_eq!(outcome.canvas_payloads[0].language, "sql");
        assert!(!outcome.answer.contains("```"));
    }

    #[tokio::test]
    async fn test_no_auto_canvas_without_canvas_tool() {
        let llm = Arc::new(ScriptedLlm::new(vec![text_response(
            "```sql\nSELECT 1\n```",
        )]));
        let (sink, _rx) = turn_channel(256);
        let executor =
            ConversationExecutor::new(llm, None, sink, CancellationToken::new());

        let outcome = executor.execute(inputs(Vec::new())).await.unwrap();
        assert!(outcome.canvas_payloads.is_empty());
        assert!(outcome.answer.contains("```"));
    }

    #[tokio::test]
    async fn test_cost_accumulation() {
        let llm = Arc::new(ScriptedLlm::new(vec![text_response("hi")]));
        let (sink, _rx) = turn_channel(256);
        let executor =
            ConversationExecutor::new(llm, None, sink, CancellationToken::new());

        let outcome = executor.execute(inputs(Vec::new())).await.unwrap();
        // 50 in * 1.0 + 20 out * 3.0 = 110 micro-USD.
        assert_eq!(outcome.cost_micro_usd, 110);
    }
}
