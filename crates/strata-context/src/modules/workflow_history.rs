//! Workflow history module.
//!
//! Renders one summary line per executed tool call across past turns
//! (tool name, status, row count). Newest turns win under budget
//! pressure.

use async_trait::async_trait;
use serde_json::Value;

use strata_core::ProfileKind;
use strata_session::TurnTrace;

use crate::module::{AssemblyContext, ContextModule, Contribution};

/// Contributes per-turn workflow summaries.
pub struct WorkflowHistoryModule;

impl WorkflowHistoryModule {
    fn traces(ctx: &AssemblyContext) -> Vec<TurnTrace> {
        ctx.session
            .as_ref()
            .map(|s| {
                s.workflow_history
                    .iter()
                    .filter(|t| t.is_valid)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn row_count(summary: &Value) -> Option<usize> {
        summary
            .get("metadata")
            .and_then(|m| m.get("row_count"))
            .and_then(Value::as_u64)
            .map(|n| usize::try_from(n).unwrap_or(usize::MAX))
            .or_else(|| {
                summary
                    .get("results")
                    .and_then(Value::as_array)
                    .map(Vec::len)
            })
    }

    fn format_turn(trace: &TurnTrace) -> String {
        let mut lines = vec![format!("Turn {}:", trace.turn_number)];
        for step in &trace.execution_trace {
            let status = step
                .output_summary
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            let rows = Self::row_count(&step.output_summary)
                .map(|n| format!(", {n} rows"))
                .unwrap_or_default();
            lines.push(format!("  - {} ({status}{rows})", step.action.tool_name));
        }
        lines.join("\n")
    }

    /// Newest-first selection under a token budget, rendered oldest
    /// first for the LLM.
    fn render_within(traces: &[TurnTrace], budget: usize, ctx: &AssemblyContext) -> (String, usize) {
        let mut kept: Vec<String> = Vec::new();
        let mut used = 0usize;
        for trace in traces.iter().rev() {
            let text = Self::format_turn(trace);
            let cost = ctx.estimator.estimate(&text);
            if used.saturating_add(cost) > budget && !kept.is_empty() {
                break;
            }
            used = used.saturating_add(cost);
            kept.push(text);
        }
        kept.reverse();
        let count = kept.len();
        let mut content = kept.join("\n");
        if !content.is_empty() {
            content = format!("Previous tool activity:\n{content}");
        }
        (content, count)
    }
}

#[async_trait]
impl ContextModule for WorkflowHistoryModule {
    fn module_id(&self) -> &'static str {
        "workflow_history"
    }

    fn applies_to(&self, kind: ProfileKind) -> bool {
        matches!(kind, ProfileKind::ToolEnabled | ProfileKind::Genie)
    }

    async fn contribute(&self, budget: usize, ctx: &AssemblyContext) -> Contribution {
        let traces = Self::traces(ctx);
        if traces.is_empty() {
            return Contribution::empty("no workflow history");
        }
        let (content, kept) = Self::render_within(&traces, budget, ctx);
        Contribution::text(
            content,
            &ctx.estimator,
            serde_json::json!({"turns_kept": kept, "turns_available": traces.len()}),
            true,
        )
    }

    async fn condense(
        &self,
        _content: &str,
        target_tokens: usize,
        ctx: &AssemblyContext,
    ) -> Option<Contribution> {
        let traces = Self::traces(ctx);
        if traces.is_empty() {
            return Some(Contribution::empty("no workflow history"));
        }
        let (content, kept) = Self::render_within(&traces, target_tokens, ctx);
        Some(Contribution::text(
            content,
            &ctx.estimator,
            serde_json::json!({"turns_kept": kept, "condensed": true}),
            true,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use strata_core::{OwnerId, ProfileId};
    use strata_session::{Session, ToolAction, TraceStep};

    fn trace(turn: u64, tool: &str, rows: usize) -> TurnTrace {
        TurnTrace {
            turn_number: turn,
            execution_trace: vec![TraceStep {
                action: ToolAction {
                    tool_name: tool.to_string(),
                    args: serde_json::json!({}),
                },
                output_summary: serde_json::json!({
                    "status": "success",
                    "results": (0..rows).collect::<Vec<_>>(),
                }),
            }],
            is_valid: true,
        }
    }

    fn ctx_with_traces(traces: Vec<TurnTrace>) -> AssemblyContext {
        let mut session = Session::new(OwnerId::new(), ProfileId::new());
        session.counters.turn_count = traces.len() as u64;
        for t in traces {
            session.workflow_history.push(t);
        }
        let mut ctx = AssemblyContext::new(ProfileKind::ToolEnabled, 5, "q");
        ctx.session = Some(Arc::new(session));
        ctx
    }

    #[tokio::test]
    async fn test_summary_lines() {
        let ctx = ctx_with_traces(vec![trace(1, "base_readQuery", 3)]);
        let c = WorkflowHistoryModule.contribute(1000, &ctx).await;
        assert!(c.content.contains("Turn 1:"));
        assert!(c.content.contains("base_readQuery (success, 3 rows)"));
    }

    #[tokio::test]
    async fn test_newest_kept_under_pressure() {
        let traces: Vec<TurnTrace> = (1..=20)
            .map(|i| trace(i, &format!("tool_{i}_with_a_rather_long_name"), 5))
            .collect();
        let ctx = ctx_with_traces(traces);
        let c = WorkflowHistoryModule.contribute(40, &ctx).await;
        assert!(c.content.contains("Turn 20:"));
        assert!(!c.content.contains("Turn 1:\n"));
    }

    #[tokio::test]
    async fn test_invalid_turns_skipped() {
        let mut bad = trace(2, "broken_tool", 0);
        bad.is_valid = false;
        let ctx = ctx_with_traces(vec![trace(1, "good_tool", 1), bad]);
        let c = WorkflowHistoryModule.contribute(1000, &ctx).await;
        assert!(c.content.contains("good_tool"));
        assert!(!c.content.contains("broken_tool"));
    }
}
