//! Consumption value types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strata_core::{OwnerId, SessionId};

/// Limits applied to an owner's consumption record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConsumptionLimits {
    /// Prompts per hour.
    pub prompts_per_hour: u32,
    /// Prompts per day.
    pub prompts_per_day: u32,
    /// Monthly input-token quota; `None` means unmetered.
    pub input_tokens_per_month: Option<u64>,
    /// Monthly output-token quota; `None` means unmetered.
    pub output_tokens_per_month: Option<u64>,
}

impl Default for ConsumptionLimits {
    fn default() -> Self {
        Self {
            prompts_per_hour: 100,
            prompts_per_day: 1_000,
            input_tokens_per_month: Some(10_000_000),
            output_tokens_per_month: Some(2_000_000),
        }
    }
}

/// Outcome of a rate or quota check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateDecision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Rejection reason when not allowed.
    pub reason: Option<String>,
    /// Seconds until the limiting window resets, when known.
    pub retry_after_secs: Option<u64>,
}

impl RateDecision {
    /// An allow decision.
    #[must_use]
    pub const fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
            retry_after_secs: None,
        }
    }

    /// A reject decision.
    pub fn reject(reason: impl Into<String>, retry_after_secs: Option<u64>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            retry_after_secs,
        }
    }
}

/// Final status of a recorded turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnStatus {
    /// Turn completed normally.
    Success,
    /// Turn aborted.
    Failure,
    /// Turn completed with degraded output.
    Partial,
}

impl TurnStatus {
    /// Column value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Partial => "partial",
        }
    }
}

/// Everything recorded for one completed turn.
#[derive(Debug, Clone)]
pub struct TurnRecord {
    /// Session the turn ran in.
    pub session_id: SessionId,
    /// Turn number (1-indexed).
    pub turn_number: u64,
    /// Input tokens consumed.
    pub input_tokens: u64,
    /// Output tokens produced.
    pub output_tokens: u64,
    /// LLM provider id.
    pub provider: String,
    /// Model name.
    pub model: String,
    /// Final status.
    pub status: TurnStatus,
    /// Whether RAG guidance was used.
    pub rag_used: bool,
    /// Output tokens the RAG strategy saved.
    pub rag_tokens_saved: u64,
    /// Cost in micro-USD.
    pub cost_micro_usd: u64,
    /// Preview of the user query (bounded by the caller).
    pub query_preview: Option<String>,
    /// Session display name at record time.
    pub session_name: Option<String>,
}

/// Full consumption snapshot for one owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumptionSummary {
    /// Owner.
    pub owner_id: OwnerId,
    /// Current accounting period (`YYYY-MM`).
    pub current_period: String,
    /// Requests in the current hour window.
    pub requests_this_hour: u32,
    /// Requests today.
    pub requests_today: u32,
    /// Hourly limit.
    pub prompts_per_hour_limit: u32,
    /// Daily limit.
    pub prompts_per_day_limit: u32,
    /// Remaining requests this hour.
    pub remaining_this_hour: u32,
    /// Remaining requests today.
    pub remaining_today: u32,
    /// Monthly input tokens used.
    pub total_input_tokens: u64,
    /// Monthly output tokens used.
    pub total_output_tokens: u64,
    /// Monthly input quota.
    pub input_tokens_limit: Option<u64>,
    /// Monthly output quota.
    pub output_tokens_limit: Option<u64>,
    /// Turns this period.
    pub total_turns: u64,
    /// Successful turns.
    pub successful_turns: u64,
    /// Failed turns.
    pub failed_turns: u64,
    /// RAG-guided turns.
    pub rag_guided_turns: u64,
    /// Output tokens saved by RAG.
    pub rag_output_tokens_saved: u64,
    /// Champion cases created.
    pub champion_cases_created: u64,
    /// Cost this period in micro-USD.
    pub estimated_cost_micro_usd: u64,
    /// Estimated cost saved by RAG, micro-USD.
    pub rag_cost_saved_micro_usd: u64,
    /// Sessions this period.
    pub total_sessions: u64,
    /// Sessions seen in the last 24 h (monotonic within the period).
    pub sessions_last_24h: u64,
    /// Turns in the last 24 h (monotonic within the period).
    pub turns_last_24h: u64,
    /// Peak requests per hour.
    pub peak_requests_per_hour: u32,
    /// Peak requests per day.
    pub peak_requests_per_day: u32,
    /// Turn count per model.
    pub models_used: HashMap<String, u64>,
    /// Turn count per provider.
    pub providers_used: HashMap<String, u64>,
    /// First usage in this period.
    pub first_usage_at: Option<DateTime<Utc>>,
    /// Most recent usage.
    pub last_usage_at: Option<DateTime<Utc>>,
}

/// One archived accounting period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodArchiveRow {
    /// Archived period (`YYYY-MM`).
    pub period: String,
    /// Input tokens in that period.
    pub total_input_tokens: u64,
    /// Output tokens in that period.
    pub total_output_tokens: u64,
    /// Turns in that period.
    pub total_turns: u64,
    /// Cost in micro-USD.
    pub estimated_cost_micro_usd: u64,
    /// When the period was archived.
    pub archived_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_decision() {
        let allow = RateDecision::allow();
        assert!(allow.allowed);
        let reject = RateDecision::reject("hourly limit exceeded (2 requests/hour)", Some(120));
        assert!(!reject.allowed);
        assert_eq!(reject.retry_after_secs, Some(120));
    }

    #[test]
    fn test_turn_status_str() {
        assert_eq!(TurnStatus::Success.as_str(), "success");
        assert_eq!(TurnStatus::Failure.as_str(), "failure");
    }
}
