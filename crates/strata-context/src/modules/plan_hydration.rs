//! Plan hydration module.
//!
//! Injects a snapshot of the previous turn's successful tool results
//! so the LLM reuses them instead of re-running idempotent calls.
//! Result lists longer than 20 rows are summarized as a row count
//! plus the first 5 rows.

use async_trait::async_trait;
use serde_json::Value;

use strata_core::ProfileKind;

use crate::module::{AssemblyContext, ContextModule, Contribution};
use crate::modules::tool_definitions::floor_char_boundary;

/// Rows above which a result list is summarized.
const SUMMARIZE_ABOVE_ROWS: usize = 20;

/// Rows shown in a summarized list.
const SUMMARY_HEAD_ROWS: usize = 5;

/// Contributes the previous turn's successful tool results.
pub struct PlanHydrationModule;

impl PlanHydrationModule {
    fn previous_results(ctx: &AssemblyContext) -> Vec<(String, Value)> {
        let Some(session) = ctx.session.as_ref() else {
            return Vec::new();
        };
        let Some(trace) = session.last_valid_trace() else {
            return Vec::new();
        };

        trace
            .execution_trace
            .iter()
            .filter(|step| {
                step.output_summary
                    .get("status")
                    .and_then(Value::as_str)
                    .is_some_and(|s| s == "success")
            })
            .map(|step| (step.action.tool_name.clone(), step.output_summary.clone()))
            .collect()
    }

    fn summarize_results(summary: &Value) -> Value {
        let Some(results) = summary.get("results").and_then(Value::as_array) else {
            return summary.clone();
        };
        if results.len() <= SUMMARIZE_ABOVE_ROWS {
            return summary.clone();
        }
        let head: Vec<Value> = results.iter().take(SUMMARY_HEAD_ROWS).cloned().collect();
        serde_json::json!({
            "status": summary.get("status").cloned().unwrap_or(Value::Null),
            "row_count": results.len(),
            "first_rows": head,
            "note": format!("{} rows total; first {} shown", results.len(), SUMMARY_HEAD_ROWS),
        })
    }

    fn format(results: &[(String, Value)], char_budget: usize) -> String {
        let mut lines = vec![
            "Results from the previous turn (reuse instead of re-running idempotent calls):"
                .to_string(),
        ];
        for (tool, summary) in results {
            let condensed = Self::summarize_results(summary);
            lines.push(format!("- {tool}: {condensed}"));
        }
        let mut content = lines.join("\n");
        if content.len() > char_budget {
            content.truncate(floor_char_boundary(&content, char_budget));
            content.push_str("\n... (hydration data truncated)");
        }
        content
    }
}

#[async_trait]
impl ContextModule for PlanHydrationModule {
    fn module_id(&self) -> &'static str {
        "plan_hydration"
    }

    fn applies_to(&self, kind: ProfileKind) -> bool {
        matches!(kind, ProfileKind::ToolEnabled | ProfileKind::Genie)
    }

    async fn contribute(&self, budget: usize, ctx: &AssemblyContext) -> Contribution {
        if ctx.is_first_turn() {
            return Contribution::empty("first turn");
        }
        let results = Self::previous_results(ctx);
        if results.is_empty() {
            return Contribution::empty("no previous results");
        }

        let content = Self::format(&results, ctx.estimator.chars_for(budget));
        Contribution::text(
            content,
            &ctx.estimator,
            serde_json::json!({"hydrated": true, "phases_available": results.len()}),
            true,
        )
    }

    async fn condense(
        &self,
        content: &str,
        target_tokens: usize,
        ctx: &AssemblyContext,
    ) -> Option<Contribution> {
        if content.is_empty() {
            return Some(Contribution::empty("nothing to condense"));
        }
        let char_budget = ctx.estimator.chars_for(target_tokens);
        let mut truncated = content.to_string();
        if truncated.len() > char_budget {
            truncated.truncate(floor_char_boundary(&truncated, char_budget));
            truncated.push_str("\n... (hydration data truncated)");
        }
        Some(Contribution::text(
            truncated,
            &ctx.estimator,
            serde_json::json!({"condensed": true, "strategy": "summary"}),
            true,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use strata_core::{OwnerId, ProfileId};
    use strata_session::{Session, ToolAction, TraceStep, TurnTrace};

    fn ctx_with_trace(rows: usize, status: &str) -> AssemblyContext {
        let mut session = Session::new(OwnerId::new(), ProfileId::new());
        session.workflow_history.push(TurnTrace {
            turn_number: 1,
            execution_trace: vec![TraceStep {
                action: ToolAction {
                    tool_name: "base_readQuery".to_string(),
                    args: serde_json::json!({"sql": "select 1"}),
                },
                output_summary: serde_json::json!({
                    "status": status,
                    "results": (0..rows).map(|i| serde_json::json!({"row": i})).collect::<Vec<_>>(),
                }),
            }],
            is_valid: true,
        });
        session.counters.turn_count = 1;
        let mut ctx = AssemblyContext::new(ProfileKind::ToolEnabled, 2, "q");
        ctx.session = Some(Arc::new(session));
        ctx
    }

    #[tokio::test]
    async fn test_first_turn_skipped() {
        let mut ctx = ctx_with_trace(3, "success");
        ctx.turn_number = 1;
        let c = PlanHydrationModule.contribute(1000, &ctx).await;
        assert_eq!(c.tokens_used, 0);
        assert_eq!(c.metadata["reason"], "first turn");
    }

    #[tokio::test]
    async fn test_successful_results_injected() {
        let ctx = ctx_with_trace(3, "success");
        let c = PlanHydrationModule.contribute(1000, &ctx).await;
        assert!(c.content.contains("base_readQuery"));
        assert_eq!(c.metadata["hydrated"], true);
    }

    #[tokio::test]
    async fn test_failed_results_excluded() {
        let ctx = ctx_with_trace(3, "error");
        let c = PlanHydrationModule.contribute(1000, &ctx).await;
        assert_eq!(c.tokens_used, 0);
    }

    #[tokio::test]
    async fn test_large_lists_summarized() {
        let ctx = ctx_with_trace(50, "success");
        let c = PlanHydrationModule.contribute(100_000, &ctx).await;
        assert!(c.content.contains("\"row_count\":50"));
        assert!(c.content.contains("first 5 shown"));
        // Only the first five rows appear.
        assert!(c.content.contains("{\"row\":4}"));
        assert!(!c.content.contains("{\"row\":7}"));
    }

    #[tokio::test]
    async fn test_small_lists_kept_whole() {
        let ctx = ctx_with_trace(3, "success");
        let c = PlanHydrationModule.contribute(100_000, &ctx).await;
        assert!(!c.content.contains("row_count"));
        assert!(c.content.contains("{\"row\":2}"));
    }
}
