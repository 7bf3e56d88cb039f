//! Component instructions module.
//!
//! Injects usage instructions for each enabled Generative-UI component
//! at the profile's configured intensity.

use async_trait::async_trait;

use strata_core::ProfileKind;

use crate::module::{AssemblyContext, ContextModule, Contribution};

/// Contributes Generative-UI component instructions.
pub struct ComponentInstructionsModule;

#[async_trait]
impl ContextModule for ComponentInstructionsModule {
    fn module_id(&self) -> &'static str {
        "component_instructions"
    }

    fn applies_to(&self, _kind: ProfileKind) -> bool {
        true
    }

    async fn contribute(&self, _budget: usize, ctx: &AssemblyContext) -> Contribution {
        if ctx.component_instructions.is_empty() {
            return Contribution::empty("no components enabled");
        }
        let mut lines = vec!["Output component guidance:".to_string()];
        for instruction in &ctx.component_instructions {
            lines.push(format!(
                "[{}] {}",
                instruction.component, instruction.instructions
            ));
        }
        Contribution::text(
            lines.join("\n"),
            &ctx.estimator,
            serde_json::json!({"components": ctx.component_instructions.len()}),
            true,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::ComponentInstruction;

    #[tokio::test]
    async fn test_instructions_rendered() {
        let mut ctx = AssemblyContext::new(ProfileKind::ToolEnabled, 1, "q");
        ctx.component_instructions = vec![ComponentInstruction {
            component: "chart".to_string(),
            instructions: "Emit chart specs for numeric comparisons.".to_string(),
        }];
        let c = ComponentInstructionsModule.contribute(100, &ctx).await;
        assert!(c.content.contains("[chart]"));
    }

    #[tokio::test]
    async fn test_empty_when_no_components() {
        let ctx = AssemblyContext::new(ProfileKind::ToolEnabled, 1, "q");
        let c = ComponentInstructionsModule.contribute(100, &ctx).await;
        assert_eq!(c.tokens_used, 0);
    }
}
