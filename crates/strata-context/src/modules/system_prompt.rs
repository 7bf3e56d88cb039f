//! System prompt module.
//!
//! Hard-required and never condensed or dropped.

use async_trait::async_trait;

use strata_core::ProfileKind;

use crate::module::{AssemblyContext, ContextModule, Contribution};

/// Contributes the profile's system prompt.
pub struct SystemPromptModule;

#[async_trait]
impl ContextModule for SystemPromptModule {
    fn module_id(&self) -> &'static str {
        "system_prompt"
    }

    fn applies_to(&self, _kind: ProfileKind) -> bool {
        true
    }

    async fn contribute(&self, _budget: usize, ctx: &AssemblyContext) -> Contribution {
        if ctx.system_prompt.is_empty() {
            return Contribution::empty("no system prompt");
        }
        Contribution::text(
            ctx.system_prompt.clone(),
            &ctx.estimator,
            serde_json::json!({"mode": "full"}),
            false,
        )
    }
}
