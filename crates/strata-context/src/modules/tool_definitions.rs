//! Tool definitions module.
//!
//! First turn: full descriptions with argument schemas so the LLM
//! learns each tool. Later turns: names-only grouped by category,
//! which runs 60-70% smaller. Condensation forces names-only
//! regardless of turn.

use async_trait::async_trait;
use serde_json::Value;

use strata_core::ProfileKind;

use crate::module::{AssemblyContext, ContextModule, Contribution};

/// Contributes MCP tool definitions.
pub struct ToolDefinitionsModule;

impl ToolDefinitionsModule {
    fn format_full(ctx: &AssemblyContext) -> String {
        let mut lines = vec!["Available tools:\n".to_string()];
        for (category, tools) in &ctx.tools_by_category {
            if tools.is_empty() {
                continue;
            }
            lines.push(format!("**{category}**:"));
            for tool in tools {
                lines.push(format!("- `{}` (tool): {}", tool.name, tool.description));
                let properties = tool
                    .input_schema
                    .get("properties")
                    .and_then(Value::as_object);
                let required: Vec<&str> = tool
                    .input_schema
                    .get("required")
                    .and_then(Value::as_array)
                    .map(|a| a.iter().filter_map(Value::as_str).collect())
                    .unwrap_or_default();
                if let Some(properties) = properties {
                    for (arg, info) in properties {
                        let arg_type = info.get("type").and_then(Value::as_str).unwrap_or("string");
                        let arg_desc = info
                            .get("description")
                            .and_then(Value::as_str)
                            .unwrap_or("");
                        let req = if required.contains(&arg.as_str()) {
                            "required"
                        } else {
                            "optional"
                        };
                        lines.push(format!("  - `{arg}` ({arg_type}, {req}): {arg_desc}"));
                    }
                }
            }
            lines.push(String::new());
        }
        lines.join("\n")
    }

    fn format_condensed(ctx: &AssemblyContext) -> String {
        let mut lines = vec!["Available tools (condensed):\n".to_string()];
        for (category, tools) in &ctx.tools_by_category {
            if tools.is_empty() {
                continue;
            }
            let names: Vec<String> = tools.iter().map(|t| format!("`{}`", t.name)).collect();
            lines.push(format!("- **{category}**: {}", names.join(", ")));
        }
        lines.join("\n")
    }

    fn tool_count(ctx: &AssemblyContext) -> usize {
        ctx.tools_by_category.values().map(Vec::len).sum()
    }
}

#[async_trait]
impl ContextModule for ToolDefinitionsModule {
    fn module_id(&self) -> &'static str {
        "tool_definitions"
    }

    fn applies_to(&self, kind: ProfileKind) -> bool {
        matches!(kind, ProfileKind::ToolEnabled | ProfileKind::Genie)
    }

    async fn contribute(&self, budget: usize, ctx: &AssemblyContext) -> Contribution {
        if ctx.tools_by_category.is_empty() {
            return Contribution::empty("no tools");
        }

        let (mut content, mut mode) = if ctx.is_first_turn() {
            (Self::format_full(ctx), "full")
        } else {
            (Self::format_condensed(ctx), "names_only")
        };

        // Fall back to names-only when full form does not fit, then
        // hard-truncate as a last resort.
        let char_budget = ctx.estimator.chars_for(budget);
        if content.len() > char_budget && mode == "full" {
            content = Self::format_condensed(ctx);
            mode = "names_only";
        }
        if content.len() > char_budget {
            content.truncate(floor_char_boundary(&content, char_budget));
            content.push_str("\n... (truncated)");
        }

        Contribution::text(
            content,
            &ctx.estimator,
            serde_json::json!({
                "tool_count": Self::tool_count(ctx),
                "category_count": ctx.tools_by_category.len(),
                "mode": mode,
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
        if ctx.tools_by_category.is_empty() {
            return Some(Contribution::empty("no tools"));
        }
        let mut content = Self::format_condensed(ctx);
        let char_budget = ctx.estimator.chars_for(target_tokens);
        if content.len() > char_budget {
            content.truncate(floor_char_boundary(&content, char_budget));
            content.push_str("\n... (truncated)");
        }
        Some(Contribution::text(
            content,
            &ctx.estimator,
            serde_json::json!({
                "tool_count": Self::tool_count(ctx),
                "mode": "names_only",
                "condensed": true,
            }),
            true,
        ))
    }
}

/// Largest byte index `<= at` that lies on a char boundary.
pub(crate) fn floor_char_boundary(s: &str, at: usize) -> usize {
    if at >= s.len() {
        return s.len();
    }
    let mut idx = at;
    while idx > 0 && !s.is_char_boundary(idx) {
        idx = idx.saturating_sub(1);
    }
    idx
}
