//! RAG context module.
//!
//! Retrieves champion cases (proven execution strategies) from the
//! planner repository and formats them with a preamble and separators.
//! Condensation falls back to fewer examples.

use async_trait::async_trait;

use strata_core::ProfileKind;

use crate::module::{AssemblyContext, ContextModule, Contribution, RetrievedExample};

/// Tokens of allocation per retrieved case.
const TOKENS_PER_CASE: usize = 600;

/// Retrieval depth bounds.
const MIN_K: usize = 1;
const MAX_K: usize = 6;

/// Contributes champion cases for planning.
pub struct RagContextModule;

impl RagContextModule {
    fn k_for_budget(budget: usize) -> usize {
        (budget.wrapping_div(TOKENS_PER_CASE)).clamp(MIN_K, MAX_K)
    }

    fn format(cases: &[RetrievedExample]) -> String {
        if cases.is_empty() {
            return String::new();
        }
        let mut lines = vec![
            "Proven strategies from similar past queries (adapt, do not repeat blindly):"
                .to_string(),
        ];
        for case in cases {
            lines.push(format!("{}\n{}", case.title, case.content));
        }
        lines.join("\n---\n")
    }
}

#[async_trait]
impl ContextModule for RagContextModule {
    fn module_id(&self) -> &'static str {
        "rag_context"
    }

    fn applies_to(&self, kind: ProfileKind) -> bool {
        matches!(
            kind,
            ProfileKind::ToolEnabled | ProfileKind::RagFocused | ProfileKind::Genie
        )
    }

    async fn contribute(&self, budget: usize, ctx: &AssemblyContext) -> Contribution {
        let Some(retriever) = ctx.rag_retriever.as_ref() else {
            return Contribution::empty("no rag retriever");
        };
        let k = Self::k_for_budget(budget);
        let cases = retriever.retrieve(&ctx.query, k).await;
        if cases.is_empty() {
            return Contribution::empty("no matches");
        }
        let content = Self::format(&cases);
        Contribution::text(
            content,
            &ctx.estimator,
            serde_json::json!({"cases": cases.len(), "k": k}),
            true,
        )
    }

    async fn condense(
        &self,
        _content: &str,
        target_tokens: usize,
        ctx: &AssemblyContext,
    ) -> Option<Contribution> {
        let retriever = ctx.rag_retriever.as_ref()?;
        let k = Self::k_for_budget(target_tokens).min(1);
        let cases = retriever.retrieve(&ctx.query, k).await;
        let content = Self::format(&cases);
        Some(Contribution::text(
            content,
            &ctx.estimator,
            serde_json::json!({"cases": cases.len(), "condensed": true}),
            true,
        ))
    }
}
