//! MCP capability classification.
//!
//! Buckets an MCP server's advertised tools and prompts into
//! categories the planner can reason over. Two depths exist:
//!
//! - **Light**: deterministic name-based bucketing, no LLM call.
//! - **Full**: the LLM assigns categories; the light pass is the
//!   fallback when the response cannot be parsed.
//!
//! Results are cached on the profile together with the mode that
//! produced them; a mode mismatch invalidates the cache.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use strata_core::ClassificationMode;
use strata_llm::LlmProvider;
use strata_mcp::{McpPromptInfo, McpToolInfo};

/// Cached classification result stored on a profile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassificationCache {
    /// Tools by category.
    #[serde(default)]
    pub tools: BTreeMap<String, Vec<McpToolInfo>>,
    /// Prompts by category.
    #[serde(default)]
    pub prompts: BTreeMap<String, Vec<McpPromptInfo>>,
    /// Resources by category (servers rarely advertise these; the map
    /// is usually empty).
    #[serde(default)]
    pub resources: BTreeMap<String, Vec<String>>,
    /// When the pass ran.
    pub last_classified_at: Option<DateTime<Utc>>,
    /// Mode the pass ran in.
    pub classified_with_mode: Option<ClassificationMode>,
}

impl ClassificationCache {
    /// Whether this cache is valid for the requested mode.
    #[must_use]
    pub fn is_valid_for(&self, mode: ClassificationMode) -> bool {
        self.classified_with_mode == Some(mode) && !self.tools.is_empty()
    }

    /// Every classified tool name.
    #[must_use]
    pub fn tool_names(&self) -> Vec<String> {
        self.tools
            .values()
            .flat_map(|tools| tools.iter().map(|t| t.name.clone()))
            .collect()
    }

    /// Every classified prompt name.
    #[must_use]
    pub fn prompt_names(&self) -> Vec<String> {
        self.prompts
            .values()
            .flat_map(|prompts| prompts.iter().map(|p| p.name.clone()))
            .collect()
    }

    /// Tools by category with names outside `enabled` removed.
    /// Classification retains the full set; subtraction happens here,
    /// at read time.
    #[must_use]
    pub fn enabled_tools(
        &self,
        enabled: &std::collections::BTreeSet<String>,
    ) -> BTreeMap<String, Vec<McpToolInfo>> {
        self.tools
            .iter()
            .filter_map(|(category, tools)| {
                let kept: Vec<McpToolInfo> = tools
                    .iter()
                    .filter(|t| enabled.contains(&t.name))
                    .cloned()
                    .collect();
                (!kept.is_empty()).then(|| (category.clone(), kept))
            })
            .collect()
    }
}

/// Name-based category assignment.
fn bucket_for_name(name: &str) -> &'static str {
    let lower = name.to_lowercase();
    if ["read", "query", "select", "list", "get", "describe", "show"]
        .iter()
        .any(|k| lower.contains(k))
    {
        "query"
    } else if ["write", "insert", "update", "delete", "create", "drop"]
        .iter()
        .any(|k| lower.contains(k))
    {
        "mutation"
    } else if ["chart", "plot", "graph", "render", "canvas", "visual"]
        .iter()
        .any(|k| lower.contains(k))
    {
        "visualization"
    } else if ["search", "find", "lookup", "match"].iter().any(|k| lower.contains(k)) {
        "search"
    } else {
        "general"
    }
}

/// Deterministic light classification.
#[must_use]
pub fn light_classify(tools: &[McpToolInfo], prompts: &[McpPromptInfo]) -> ClassificationCache {
    let mut cache = ClassificationCache {
        last_classified_at: Some(Utc::now()),
        classified_with_mode: Some(ClassificationMode::Light),
        ..ClassificationCache::default()
    };
    for tool in tools {
        cache
            .tools
            .entry(bucket_for_name(&tool.name).to_string())
            .or_default()
            .push(tool.clone());
    }
    for prompt in prompts {
        cache
            .prompts
            .entry(bucket_for_name(&prompt.name).to_string())
            .or_default()
            .push(prompt.clone());
    }
    cache
}

/// Classify capabilities at the requested depth.
///
/// Full mode asks the LLM for a `{name: category}` JSON object over
/// the advertised names; anything unparseable degrades to the light
/// pass rather than failing activation.
pub async fn classify_capabilities(
    llm: &dyn LlmProvider,
    tools: &[McpToolInfo],
    prompts: &[McpPromptInfo],
    mode: ClassificationMode,
) -> ClassificationCache {
    match mode {
        ClassificationMode::Light => light_classify(tools, prompts),
        ClassificationMode::Full => match full_classify(llm, tools, prompts).await {
            Some(cache) => cache,
            None => {
                warn!("Full classification failed; falling back to light");
                let mut cache = light_classify(tools, prompts);
                // Record the requested mode so the cache stays valid
                // for this profile configuration.
                cache.classified_with_mode = Some(ClassificationMode::Full);
                cache
            },
        },
    }
}

async fn full_classify(
    llm: &dyn LlmProvider,
    tools: &[McpToolInfo],
    prompts: &[McpPromptInfo],
) -> Option<ClassificationCache> {
    let tool_lines: Vec<String> = tools
        .iter()
        .map(|t| format!("- {}: {}", t.name, t.description.as_deref().unwrap_or("")))
        .collect();
    let prompt_lines: Vec<String> = prompts
        .iter()
        .map(|p| format!("- {}: {}", p.name, p.description.as_deref().unwrap_or("")))
        .collect();

    let request = format!(
        "Categorize each capability below into exactly one of: query, mutation, \
         visualization, search, general. Respond with a single JSON object mapping \
         each name to its category and nothing else.\n\nTools:\n{}\n\nPrompts:\n{}",
        tool_lines.join("\n"),
        prompt_lines.join("\n")
    );

    let response = match llm.complete_simple(&request).await {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, "Classification LLM call failed");
            return None;
        },
    };

    let assignments: BTreeMap<String, String> = parse_json_object(&response)?;
    debug!(assigned = assignments.len(), "Full classification parsed");

    let mut cache = ClassificationCache {
        last_classified_at: Some(Utc::now()),
        classified_with_mode: Some(ClassificationMode::Full),
        ..ClassificationCache::default()
    };
    for tool in tools {
        let category = assignments
            .get(&tool.name)
            .map_or_else(|| bucket_for_name(&tool.name).to_string(), Clone::clone);
        cache.tools.entry(category).or_default().push(tool.clone());
    }
    for prompt in prompts {
        let category = assignments
            .get(&prompt.name)
            .map_or_else(|| bucket_for_name(&prompt.name).to_string(), Clone::clone);
        cache.prompts.entry(category).or_default().push(prompt.clone());
    }
    Some(cache)
}

/// Extract the first JSON object from a possibly fenced response.
fn parse_json_object(text: &str) -> Option<BTreeMap<String, String>> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    let candidate = &text[start..=end];
    let value: Value = serde_json::from_str(candidate).ok()?;
    let object = value.as_object()?;
    Some(
        object
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use strata_llm::{LlmResponse, LlmResult, LlmToolDefinition, Message};

    fn tool(name: &str) -> McpToolInfo {
        McpToolInfo {
            name: name.to_string(),
            description: Some(format!("{name} tool")),
            input_schema: serde_json::json!({"type": "object"}),
        }
    }

    struct CannedLlm(String);

    #[async_trait]
    impl LlmProvider for CannedLlm {
        fn provider_id(&self) -> &str {
            "canned"
        }
        fn model(&self) -> &str {
            "canned-1"
        }
        async fn complete(
            &self,
            _messages: &[Message],
            _tools: &[LlmToolDefinition],
            _system: &str,
        ) -> LlmResult<LlmResponse> {
            Ok(LlmResponse {
                message: Message::assistant(self.0.clone()),
                has_tool_calls: false,
                stop_reason: strata_llm::StopReason::EndTurn,
                usage: strata_llm::Usage::default(),
            })
        }
        fn max_context_length(&self) -> usize {
            100_000
        }
    }

    #[test]
    fn test_light_buckets_by_name() {
        let cache = light_classify(
            &[tool("base_readQuery"), tool("base_writeRow"), tool("renderChart")],
            &[],
        );
        assert!(cache.tools["query"].iter().any(|t| t.name == "base_readQuery"));
        assert!(cache.tools["mutation"].iter().any(|t| t.name == "base_writeRow"));
        assert!(cache.tools["visualization"].iter().any(|t| t.name == "renderChart"));
        assert_eq!(cache.classified_with_mode, Some(ClassificationMode::Light));
    }

    #[tokio::test]
    async fn test_full_uses_llm_assignments() {
        let llm = CannedLlm(r#"{"base_readQuery": "search"}"#.to_string());
        let cache =
            classify_capabilities(&llm, &[tool("base_readQuery")], &[], ClassificationMode::Full)
                .await;
        assert!(cache.tools["search"].iter().any(|t| t.name == "base_readQuery"));
        assert_eq!(cache.classified_with_mode, Some(ClassificationMode::Full));
    }

    #[tokio::test]
    async fn test_full_falls_back_on_garbage() {
        let llm = CannedLlm("no json here".to_string());
        let cache =
            classify_capabilities(&llm, &[tool("base_readQuery")], &[], ClassificationMode::Full)
                .await;
        // Light buckets, but recorded as a full-mode result so the
        // cache stays valid.
        assert!(cache.tools.contains_key("query"));
        assert_eq!(cache.classified_with_mode, Some(ClassificationMode::Full));
    }

    #[test]
    fn test_cache_validity() {
        let cache = light_classify(&[tool("a_read")], &[]);
        assert!(cache.is_valid_for(ClassificationMode::Light));
        assert!(!cache.is_valid_for(ClassificationMode::Full));
        assert!(!ClassificationCache::default().is_valid_for(ClassificationMode::Light));
    }

    #[test]
    fn test_enabled_subtraction() {
        let cache = light_classify(&[tool("base_readQuery"), tool("base_listTables")], &[]);
        let enabled: std::collections::BTreeSet<String> =
            ["base_readQuery".to_string()].into_iter().collect();
        let filtered = cache.enabled_tools(&enabled);
        let names: Vec<&str> = filtered
            .values()
            .flat_map(|tools| tools.iter().map(|t| t.name.as_str()))
            .collect();
        assert_eq!(names, vec!["base_readQuery"]);
        // The full set survives in the cache itself.
        assert_eq!(cache.tool_names().len(), 2);
    }

    #[test]
    fn test_parse_fenced_json() {
        let parsed =
            parse_json_object("```json\n{\"a\": \"query\"}\n```").expect("fenced json parses");
        assert_eq!(parsed["a"], "query");
    }
}
