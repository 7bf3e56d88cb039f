//! Document context module.
//!
//! Loads uploaded-document extracts with a per-file character cap and
//! a total budget. When the budget forces truncation, whole documents
//! are preferred over cut ones: a document that does not fit at all is
//! dropped, and only the last admitted document may be cut.

use async_trait::async_trait;

use strata_core::ProfileKind;

use crate::module::{AssemblyContext, ContextModule, Contribution, DocumentExtract};
use crate::modules::tool_definitions::floor_char_boundary;

/// Default per-file character cap.
pub const PER_FILE_CHAR_CAP: usize = 50_000;

/// Contributes uploaded-document extracts.
pub struct DocumentContextModule;

impl DocumentContextModule {
    fn render(documents: &[DocumentExtract], total_chars: usize) -> (String, usize, bool) {
        let mut sections: Vec<String> = Vec::new();
        let mut used = 0usize;
        let mut truncated = false;
        let mut included = 0usize;

        for doc in documents {
            let mut body = doc.content.as_str();
            if body.len() > PER_FILE_CHAR_CAP {
                body = &body[..floor_char_boundary(body, PER_FILE_CHAR_CAP)];
                truncated = true;
            }
            let header = format!("=== Document: {} ===\n", doc.name);
            let full_cost = header.len().saturating_add(body.len());
            let remaining = total_chars.saturating_sub(used);

            if full_cost <= remaining {
                sections.push(format!("{header}{body}"));
                used = used.saturating_add(full_cost);
                included = included.saturating_add(1);
            } else if included == 0 && remaining > header.len() {
                // Nothing fits whole: cut the first document rather
                // than returning nothing.
                let room = remaining.saturating_sub(header.len());
                let cut = &body[..floor_char_boundary(body, room)];
                sections.push(format!("{header}{cut}\n... (document truncated)"));
                truncated = true;
                included = 1;
                break;
            } else {
                truncated = true;
                break;
            }
        }

        (sections.join("\n\n"), included, truncated)
    }
}

#[async_trait]
impl ContextModule for DocumentContextModule {
    fn module_id(&self) -> &'static str {
        "document_context"
    }

    fn applies_to(&self, _kind: ProfileKind) -> bool {
        true
    }

    async fn contribute(&self, budget: usize, ctx: &AssemblyContext) -> Contribution {
        if ctx.documents.is_empty() {
            return Contribution::empty("no documents");
        }
        let (content, included, truncated) =
            Self::render(&ctx.documents, ctx.estimator.chars_for(budget));
        Contribution::text(
            content,
            &ctx.estimator,
            serde_json::json!({
                "documents_included": included,
                "documents_available": ctx.documents.len(),
                "truncated": truncated,
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
        if ctx.documents.is_empty() {
            return Some(Contribution::empty("no documents"));
        }
        let (content, included, _) =
            Self::render(&ctx.documents, ctx.estimator.chars_for(target_tokens));
        Some(Contribution::text(
            content,
            &ctx.estimator,
            serde_json::json!({"documents_included": included, "condensed": true}),
            true,
        ))
    }
}
