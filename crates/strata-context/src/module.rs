//! The context-module capability trait and assembly inputs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use strata_core::{ProfileKind, TokenEstimator};
use strata_session::Session;

/// Minimum tokens a condensation target may be squeezed to.
pub const CONDENSE_FLOOR_TOKENS: usize = 64;

/// One module's output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contribution {
    /// Rendered context text.
    pub content: String,
    /// Estimated token cost of `content`.
    pub tokens_used: usize,
    /// Module-specific diagnostics.
    pub metadata: Value,
    /// Whether the assembler may condense or drop this contribution.
    pub condensable: bool,
}

impl Contribution {
    /// An empty, non-condensable contribution.
    #[must_use]
    pub fn empty(reason: &str) -> Self {
        Self {
            content: String::new(),
            tokens_used: 0,
            metadata: serde_json::json!({"mode": "empty", "reason": reason}),
            condensable: false,
        }
    }

    /// A text contribution with its cost estimated by `estimator`.
    #[must_use]
    pub fn text(content: String, estimator: &TokenEstimator, metadata: Value, condensable: bool) -> Self {
        let tokens_used = estimator.estimate(&content);
        Self {
            content,
            tokens_used,
            metadata,
            condensable,
        }
    }
}

/// Tool metadata surfaced to the tool-definitions module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolContextInfo {
    /// Tool name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Input JSON schema.
    pub input_schema: Value,
}

/// An uploaded-document extract.
#[derive(Debug, Clone)]
pub struct DocumentExtract {
    /// File name.
    pub name: String,
    /// Extracted text.
    pub content: String,
}

/// Instructions for one enabled Generative-UI component.
#[derive(Debug, Clone)]
pub struct ComponentInstruction {
    /// Component id ("chart", "canvas", ...).
    pub component: String,
    /// Instruction text for the chosen intensity.
    pub instructions: String,
}

/// A retrieved RAG or knowledge example.
#[derive(Debug, Clone)]
pub struct RetrievedExample {
    /// Short title.
    pub title: String,
    /// Example body.
    pub content: String,
}

/// Retrieval interface consumed by the RAG and knowledge modules.
///
/// Implementations wrap whatever vector store backs the profile's
/// collections; tests use a canned in-memory version.
#[async_trait]
pub trait ContextRetriever: Send + Sync {
    /// Retrieve up to `k` examples relevant to `query`.
    async fn retrieve(&self, query: &str, k: usize) -> Vec<RetrievedExample>;
}

/// Everything modules may read while contributing.
#[derive(Clone)]
pub struct AssemblyContext {
    /// Active profile kind.
    pub profile_kind: ProfileKind,
    /// 1-based turn number.
    pub turn_number: u64,
    /// The user's current query.
    pub query: String,
    /// System prompt for the profile.
    pub system_prompt: String,
    /// The session, when one exists (first turns of new sessions have
    /// one too; it is simply empty).
    pub session: Option<Arc<Session>>,
    /// Classified tools by category, already filtered to enabled ones.
    pub tools_by_category: BTreeMap<String, Vec<ToolContextInfo>>,
    /// Pre-rendered knowledge-graph planner context, if any.
    pub kg_context: Option<String>,
    /// Champion-case retriever (planner repository).
    pub rag_retriever: Option<Arc<dyn ContextRetriever>>,
    /// Knowledge-repository retriever.
    pub knowledge_retriever: Option<Arc<dyn ContextRetriever>>,
    /// Uploaded-document extracts attached to the session.
    pub documents: Vec<DocumentExtract>,
    /// Instructions for enabled Generative-UI components.
    pub component_instructions: Vec<ComponentInstruction>,
    /// Token estimator.
    pub estimator: TokenEstimator,
}

impl AssemblyContext {
    /// Minimal context for a profile kind and query.
    #[must_use]
    pub fn new(profile_kind: ProfileKind, turn_number: u64, query: impl Into<String>) -> Self {
        Self {
            profile_kind,
            turn_number,
            query: query.into(),
            system_prompt: String::new(),
            session: None,
            tools_by_category: BTreeMap::new(),
            kg_context: None,
            rag_retriever: None,
            knowledge_retriever: None,
            documents: Vec::new(),
            component_instructions: Vec::new(),
            estimator: TokenEstimator::new(),
        }
    }

    /// Whether this is the session's first turn.
    #[must_use]
    pub const fn is_first_turn(&self) -> bool {
        self.turn_number <= 1
    }
}

impl std::fmt::Debug for AssemblyContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssemblyContext")
            .field("profile_kind", &self.profile_kind)
            .field("turn_number", &self.turn_number)
            .field("documents", &self.documents.len())
            .finish_non_exhaustive()
    }
}

/// A context module: one independent contributor to the prompt.
#[async_trait]
pub trait ContextModule: Send + Sync {
    /// Stable module id, used as the map key and for reweighting.
    fn module_id(&self) -> &'static str;

    /// Whether the module participates for this profile kind.
    fn applies_to(&self, kind: ProfileKind) -> bool;

    /// Produce content under `budget` tokens.
    async fn contribute(&self, budget: usize, ctx: &AssemblyContext) -> Contribution;

    /// Re-render at a smaller target. `None` means the module cannot
    /// condense further.
    async fn condense(
        &self,
        _content: &str,
        _target_tokens: usize,
        _ctx: &AssemblyContext,
    ) -> Option<Contribution> {
        None
    }

    /// Clear module-scoped state accumulated in the session.
    fn purge(&self, session: &mut Session) {
        session.module_state.remove(self.module_id());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_contribution() {
        let c = Contribution::empty("no data");
        assert_eq!(c.tokens_used, 0);
        assert!(!c.condensable);
        assert_eq!(c.metadata["reason"], "no data");
    }

    #[test]
    fn test_text_contribution_estimates() {
        let estimator = TokenEstimator::new();
        let c = Contribution::text("abcdefgh".into(), &estimator, serde_json::json!({}), true);
        assert_eq!(c.tokens_used, 2);
        assert!(c.condensable);
    }

    #[test]
    fn test_first_turn() {
        assert!(AssemblyContext::new(ProfileKind::LlmOnly, 1, "q").is_first_turn());
        assert!(!AssemblyContext::new(ProfileKind::LlmOnly, 2, "q").is_first_turn());
    }
}
