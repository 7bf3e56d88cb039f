//! Conversation event types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strata_core::SessionId;

/// Counters and attribution carried by every event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMeta {
    /// Session the turn belongs to.
    pub session_id: SessionId,
    /// Turn number within the session.
    pub turn_number: u64,
    /// LLM provider id.
    pub provider: String,
    /// Model name.
    pub model: String,
    /// Input tokens accumulated so far this turn.
    pub input_tokens: u64,
    /// Output tokens accumulated so far this turn.
    pub output_tokens: u64,
    /// Cumulative cost of the turn in micro-USD.
    pub cost_micro_usd: u64,
    /// Emission time.
    pub timestamp: DateTime<Utc>,
}

impl EventMeta {
    /// Create metadata for a turn with zeroed counters.
    #[must_use]
    pub fn new(
        session_id: SessionId,
        turn_number: u64,
        provider: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            session_id,
            turn_number,
            provider: provider.into(),
            model: model.into(),
            input_tokens: 0,
            output_tokens: 0,
            cost_micro_usd: 0,
            timestamp: Utc::now(),
        }
    }

    /// Copy with updated counters and a fresh timestamp.
    #[must_use]
    pub fn snapshot(&self, input_tokens: u64, output_tokens: u64, cost_micro_usd: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            cost_micro_usd,
            timestamp: Utc::now(),
            ..self.clone()
        }
    }
}

/// Which indicator an update targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndicatorTarget {
    /// The model indicator.
    Llm,
    /// The tool/database indicator.
    Db,
}

/// Indicator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndicatorState {
    /// Work in flight.
    Busy,
    /// Idle.
    Idle,
}

/// Compact summary of a tool invocation's output, recorded in the
/// turn's workflow trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutputSummary {
    /// "success" or "error".
    pub status: String,
    /// Result rows or text fragments (bounded by the caller).
    #[serde(default)]
    pub results: Vec<Value>,
    /// Tool-provided metadata.
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// An event in the conversation stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationEvent {
    /// Turn started.
    ConversationAgentStart {
        /// Event metadata.
        meta: EventMeta,
        /// The user's query.
        query: String,
    },
    /// One LLM invocation finished.
    ConversationLlmStep {
        /// Event metadata.
        meta: EventMeta,
        /// 1-based step number within the turn.
        step_number: u64,
        /// Human-readable phase name.
        step_name: String,
    },
    /// The LLM produced its final text.
    ConversationLlmComplete {
        /// Event metadata.
        meta: EventMeta,
    },
    /// A tool call is about to run.
    ConversationToolInvoked {
        /// Event metadata.
        meta: EventMeta,
        /// Tool name.
        tool_name: String,
        /// Arguments passed.
        arguments: Value,
    },
    /// A tool call finished.
    ConversationToolCompleted {
        /// Event metadata.
        meta: EventMeta,
        /// Tool name.
        tool_name: String,
        /// Whether the call succeeded.
        success: bool,
        /// Result preview, truncated to 5000 characters.
        preview: String,
        /// Wall-clock duration in milliseconds.
        duration_ms: u64,
        /// Error text when `success` is false.
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Turn finished.
    ConversationAgentComplete {
        /// Event metadata.
        meta: EventMeta,
        /// Whether the turn succeeded.
        success: bool,
        /// Whether the turn was cancelled by the client.
        #[serde(default)]
        cancelled: bool,
        /// Names of tools used this turn, in first-use order.
        tools_used: Vec<String>,
        /// Final answer text (empty on failure).
        answer: String,
    },
    /// Busy/idle indicator bracketing LLM and tool calls. Lossy.
    StatusIndicatorUpdate {
        /// Event metadata.
        meta: EventMeta,
        /// Which indicator.
        target: IndicatorTarget,
        /// New state.
        state: IndicatorState,
    },
    /// A component payload destined for a sub-window, forwarded in
    /// real time.
    ComponentRender {
        /// Event metadata.
        meta: EventMeta,
        /// The render payload.
        payload: Value,
    },
}

impl ConversationEvent {
    /// Wire name of the event type.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::ConversationAgentStart { .. } => "conversation_agent_start",
            Self::ConversationLlmStep { .. } => "conversation_llm_step",
            Self::ConversationLlmComplete { .. } => "conversation_llm_complete",
            Self::ConversationToolInvoked { .. } => "conversation_tool_invoked",
            Self::ConversationToolCompleted { .. } => "conversation_tool_completed",
            Self::ConversationAgentComplete { .. } => "conversation_agent_complete",
            Self::StatusIndicatorUpdate { .. } => "status_indicator_update",
            Self::ComponentRender { .. } => "component_render",
        }
    }

    /// Whether this event may be dropped under back-pressure.
    #[must_use]
    pub const fn is_lossy(&self) -> bool {
        matches!(self, Self::StatusIndicatorUpdate { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> EventMeta {
        EventMeta::new(SessionId::new(), 1, "anthropic", "claude-sonnet-4-20250514")
    }

    #[test]
    fn test_event_type_names() {
        let event = ConversationEvent::ConversationAgentStart {
            meta: meta(),
            query: "hi".into(),
        };
        assert_eq!(event.event_type(), "conversation_agent_start");

        let event = ConversationEvent::StatusIndicatorUpdate {
            meta: meta(),
            target: IndicatorTarget::Db,
            state: IndicatorState::Busy,
        };
        assert_eq!(event.event_type(), "status_indicator_update");
        assert!(event.is_lossy());
    }

    #[test]
    fn test_serde_tag_matches_event_type() {
        let event = ConversationEvent::ConversationLlmStep {
            meta: meta(),
            step_number: 1,
            step_name: "Tool Selection".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "conversation_llm_step");
        assert_eq!(json["step_name"], "Tool Selection");
    }

    #[test]
    fn test_meta_snapshot_updates_counters() {
        let base = meta();
        let snap = base.snapshot(100, 25, 450);
        assert_eq!(snap.input_tokens, 100);
        assert_eq!(snap.output_tokens, 25);
        assert_eq!(snap.cost_micro_usd, 450);
        assert_eq!(snap.turn_number, base.turn_number);
    }
}
