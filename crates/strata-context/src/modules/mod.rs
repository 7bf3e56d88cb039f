//! Built-in context modules.

pub mod component_instructions;
pub mod conversation_history;
pub mod document_context;
pub mod knowledge_context;
pub mod plan_hydration;
pub mod rag_context;
pub mod system_prompt;
pub mod tool_definitions;
pub mod workflow_history;

use std::sync::Arc;

use crate::assembler::ModuleSpec;

pub use component_instructions::ComponentInstructionsModule;
pub use conversation_history::ConversationHistoryModule;
pub use document_context::DocumentContextModule;
pub use knowledge_context::KnowledgeContextModule;
pub use plan_hydration::PlanHydrationModule;
pub use rag_context::RagContextModule;
pub use system_prompt::SystemPromptModule;
pub use tool_definitions::ToolDefinitionsModule;
pub use workflow_history::WorkflowHistoryModule;

/// The standard module registry with default weights and priorities.
///
/// Weights sum to 1.0 before per-profile reweighting; priorities
/// decide drop order under extreme pressure (higher survives longer).
#[must_use]
pub fn standard_modules() -> Vec<ModuleSpec> {
    vec![
        ModuleSpec {
            module: Arc::new(SystemPromptModule),
            weight: 0.15,
            priority: 9,
        },
        ModuleSpec {
            module: Arc::new(ToolDefinitionsModule),
            weight: 0.15,
            priority: 7,
        },
        ModuleSpec {
            module: Arc::new(ConversationHistoryModule),
            weight: 0.25,
            priority: 8,
        },
        ModuleSpec {
            module: Arc::new(WorkflowHistoryModule),
            weight: 0.08,
            priority: 3,
        },
        ModuleSpec {
            module: Arc::new(PlanHydrationModule),
            weight: 0.10,
            priority: 4,
        },
        ModuleSpec {
            module: Arc::new(DocumentContextModule),
            weight: 0.08,
            priority: 5,
        },
        ModuleSpec {
            module: Arc::new(KnowledgeContextModule),
            weight: 0.08,
            priority: 6,
        },
        ModuleSpec {
            module: Arc::new(RagContextModule),
            weight: 0.08,
            priority: 2,
        },
        ModuleSpec {
            module: Arc::new(ComponentInstructionsModule),
            weight: 0.03,
            priority: 1,
        },
    ]
}
