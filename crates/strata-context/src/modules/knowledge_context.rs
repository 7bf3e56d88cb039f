//! Knowledge context module.
//!
//! Combines the pre-rendered knowledge-graph planner block with
//! examples retrieved from the profile's knowledge repository. The
//! retrieval depth scales with the allocation; condensation falls
//! back to fewer examples.

use async_trait::async_trait;

use strata_core::ProfileKind;

use crate::module::{AssemblyContext, ContextModule, Contribution, RetrievedExample};

/// Tokens of allocation per retrieved example.
const TOKENS_PER_EXAMPLE: usize = 500;

/// Retrieval depth bounds.
const MIN_K: usize = 1;
const MAX_K: usize = 8;

/// Contributes knowledge-graph context and knowledge-repository
/// examples.
pub struct KnowledgeContextModule;

impl KnowledgeContextModule {
    fn k_for_budget(budget: usize) -> usize {
        (budget.wrapping_div(TOKENS_PER_EXAMPLE)).clamp(MIN_K, MAX_K)
    }

    fn format(kg: Option<&str>, examples: &[RetrievedExample]) -> String {
        let mut sections: Vec<String> = Vec::new();
        if let Some(kg) = kg.filter(|s| !s.is_empty()) {
            sections.push(kg.to_string());
        }
        if !examples.is_empty() {
            let mut lines =
                vec!["Relevant knowledge entries (ground your answer in these):".to_string()];
            for example in examples {
                lines.push(format!("{}\n{}", example.title, example.content));
            }
            sections.push(lines.join("\n---\n"));
        }
        sections.join("\n\n")
    }

    async fn gather(ctx: &AssemblyContext, k: usize) -> Vec<RetrievedExample> {
        match ctx.knowledge_retriever.as_ref() {
            Some(retriever) => retriever.retrieve(&ctx.query, k).await,
            None => Vec::new(),
        }
    }
}

#[async_trait]
impl ContextModule for KnowledgeContextModule {
    fn module_id(&self) -> &'static str {
        "knowledge_context"
    }

    fn applies_to(&self, kind: ProfileKind) -> bool {
        matches!(
            kind,
            ProfileKind::ToolEnabled | ProfileKind::RagFocused | ProfileKind::Genie
        )
    }

    async fn contribute(&self, budget: usize, ctx: &AssemblyContext) -> Contribution {
        let k = Self::k_for_budget(budget);
        let examples = Self::gather(ctx, k).await;
        if ctx.kg_context.as_deref().is_none_or(str::is_empty) && examples.is_empty() {
            return Contribution::empty("no knowledge sources");
        }
        let content = Self::format(ctx.kg_context.as_deref(), &examples);
        Contribution::text(
            content,
            &ctx.estimator,
            serde_json::json!({
                "examples": examples.len(),
                "k": k,
                "kg_context": ctx.kg_context.is_some(),
            }),
            true,
        )
    }

    async fn condense(
        &self,
        _content: &str,
        target_tokens: usize,
        ctx: &AssemblyContext,
    ) -> Option<Contribution> {
        // Fewer examples; the KG block survives condensation since it
        // is what grounds SQL generation.
        let k = Self::k_for_budget(target_tokens).min(2);
        let examples = Self::gather(ctx, k).await;
        let content = Self::format(ctx.kg_context.as_deref(), &examples);
        Some(Contribution::text(
            content,
            &ctx.estimator,
            serde_json::json!({"examples": examples.len(), "condensed": true}),
            true,
        ))
    }
}
