//! Session data model.
//!
//! A session holds the ordered chat object, per-turn workflow traces,
//! attachments, and module-scoped scratch state. Messages marked
//! invalid stay on disk for audit but are excluded from LLM context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use strata_core::{OwnerId, ProfileId, SessionId};

use crate::error::{SessionError, SessionResult};

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// End-user input.
    User,
    /// Agent output.
    Assistant,
}

/// One message in the session's chat object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role.
    pub role: ChatRole,
    /// Text content.
    pub content: String,
    /// Invalid messages are retained but excluded from LLM context.
    #[serde(default = "default_true")]
    pub is_valid: bool,
}

fn default_true() -> bool {
    true
}

impl ChatMessage {
    /// A valid user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            is_valid: true,
        }
    }

    /// A valid assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            is_valid: true,
        }
    }
}

/// The tool call recorded in a trace step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolAction {
    /// Tool name.
    pub tool_name: String,
    /// Arguments passed.
    pub args: Value,
}

/// Output summary recorded in a trace step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceStep {
    /// The action taken.
    pub action: ToolAction,
    /// Summarized output: status, bounded results, metadata.
    pub output_summary: Value,
}

/// Per-turn execution trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnTrace {
    /// Turn number within the session.
    pub turn_number: u64,
    /// Steps taken during the turn.
    pub execution_trace: Vec<TraceStep>,
    /// Whether the turn completed; invalid turns are skipped by
    /// plan hydration.
    pub is_valid: bool,
}

/// Monotonic per-session counters.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SessionCounters {
    /// Completed turns.
    pub turn_count: u64,
    /// Tool calls across all turns.
    pub tool_call_count: u64,
    /// Total input tokens.
    pub input_tokens: u64,
    /// Total output tokens.
    pub output_tokens: u64,
}

/// A conversation session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Session id.
    pub id: SessionId,
    /// Owning user.
    pub owner_id: OwnerId,
    /// Profile the session runs under (weak reference by id).
    pub profile_id: ProfileId,
    /// Display name, if set.
    #[serde(default)]
    pub name: Option<String>,
    /// Ordered message list.
    #[serde(default)]
    pub chat_object: Vec<ChatMessage>,
    /// Per-turn traces.
    #[serde(default)]
    pub workflow_history: Vec<TurnTrace>,
    /// Uploaded attachment references (document ids or paths).
    #[serde(default)]
    pub attachments: Vec<String>,
    /// Query currently being processed, if a turn is in flight.
    #[serde(default)]
    pub current_query: Option<String>,
    /// Snapshot of the last completed turn.
    #[serde(default)]
    pub last_turn_data: Option<Value>,
    /// Whether the session is archived.
    #[serde(default)]
    pub is_archived: bool,
    /// Counters.
    #[serde(default)]
    pub counters: SessionCounters,
    /// Module-scoped scratch state, cleared by module purge.
    #[serde(default)]
    pub module_state: HashMap<String, Value>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Create a fresh session.
    #[must_use]
    pub fn new(owner_id: OwnerId, profile_id: ProfileId) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            owner_id,
            profile_id,
            name: None,
            chat_object: Vec::new(),
            workflow_history: Vec::new(),
            attachments: Vec::new(),
            current_query: None,
            last_turn_data: None,
            is_archived: false,
            counters: SessionCounters::default(),
            module_state: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a message and bump `updated_at`.
    pub fn push_message(&mut self, message: ChatMessage) {
        self.chat_object.push(message);
        self.updated_at = Utc::now();
    }

    /// Append a turn trace.
    pub fn push_trace(&mut self, trace: TurnTrace) {
        self.workflow_history.push(trace);
        self.updated_at = Utc::now();
    }

    /// Messages eligible for LLM context.
    pub fn valid_messages(&self) -> impl Iterator<Item = &ChatMessage> {
        self.chat_object.iter().filter(|m| m.is_valid)
    }

    /// The most recent valid turn trace, if any.
    #[must_use]
    pub fn last_valid_trace(&self) -> Option<&TurnTrace> {
        self.workflow_history.iter().rev().find(|t| t.is_valid)
    }

    /// Mark the last message invalid (used when a turn fails after the
    /// user message was appended).
    pub fn invalidate_last_message(&mut self) {
        if let Some(last) = self.chat_object.last_mut() {
            last.is_valid = false;
            self.updated_at = Utc::now();
        }
    }

    /// Next turn number (1-based).
    #[must_use]
    pub const fn next_turn_number(&self) -> u64 {
        self.counters.turn_count.saturating_add(1)
    }

    /// Validate cross-field invariants after deserialization.
    ///
    /// # Errors
    ///
    /// Returns an error if trace turn numbers exceed the turn counter
    /// by more than the in-flight turn.
    pub fn check(&self) -> SessionResult<()> {
        let max_trace = self
            .workflow_history
            .iter()
            .map(|t| t.turn_number)
            .max()
            .unwrap_or(0);
        if max_trace > self.counters.turn_count.saturating_add(1) {
            return Err(SessionError::Corrupt {
                path: self.id.to_string(),
                reason: format!(
                    "trace turn {max_trace} exceeds counter {}",
                    self.counters.turn_count
                ),
            });
        }
        Ok(())
    }
}
