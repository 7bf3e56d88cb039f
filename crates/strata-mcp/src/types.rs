//! Tool and prompt metadata surfaced to the classifier and executor.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool advertised by an MCP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpToolInfo {
    /// Tool name.
    pub name: String,
    /// Description, if the server provides one.
    pub description: Option<String>,
    /// Input JSON schema.
    pub input_schema: Value,
}

/// A prompt advertised by an MCP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpPromptInfo {
    /// Prompt name.
    pub name: String,
    /// Description, if the server provides one.
    pub description: Option<String>,
    /// Argument names the prompt accepts.
    #[serde(default)]
    pub arguments: Vec<String>,
}

/// Result of one tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpToolResult {
    /// Concatenated text content of the result.
    pub content: String,
    /// Whether the server flagged the result as an error.
    pub is_error: bool,
    /// Structured metadata the server attached, if any. Component
    /// render payloads ride along here.
    #[serde(default)]
    pub metadata: Option<Value>,
}

impl McpToolResult {
    /// A successful text result.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
            metadata: None,
        }
    }

    /// An error result.
    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
            metadata: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_constructors() {
        assert!(!McpToolResult::text("ok").is_error);
        assert!(McpToolResult::error("boom").is_error);
    }

    #[test]
    fn test_tool_info_serde() {
        let info = McpToolInfo {
            name: "base_readQuery".into(),
            description: Some("Run a read-only SQL query".into()),
            input_schema: serde_json::json!({"type": "object"}),
        };
        let json = serde_json::to_string(&info).unwrap();
        let back: McpToolInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(back.name, "base_readQuery");
    }
}
