//! Typed identifiers and shared enums.
//!
//! Every entity in the data model is keyed by a UUID newtype so that ids
//! of different kinds cannot be confused at compile time. Cross-entity
//! references (session → profile, profile → LLM config) are stored as
//! plain ids and resolved on demand; no parent pointers are held in
//! memory.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a fresh random id.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID.
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Parse from string form.
            ///
            /// # Errors
            ///
            /// Returns an error if the input is not a valid UUID.
            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

id_type!(
    /// Identifies a user (tenant). Every stored object is scoped by owner.
    OwnerId
);
id_type!(
    /// Identifies a profile (LLM + optional MCP server + policy).
    ProfileId
);
id_type!(
    /// Identifies a conversation session.
    SessionId
);
id_type!(
    /// Identifies an LLM provider configuration.
    LlmConfigId
);
id_type!(
    /// Identifies a registered MCP server.
    McpServerId
);
id_type!(
    /// Identifies a RAG collection.
    CollectionId
);
id_type!(
    /// Correlates log lines and error responses for a single request.
    TraceId
);

/// User tier, consulted when assigning a consumption profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Free tier with default limits.
    #[default]
    Free,
    /// Paid tier.
    Pro,
    /// Unmetered internal tier.
    Internal,
}

/// Profile activation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileKind {
    /// LLM with an attached MCP tool server.
    ToolEnabled,
    /// LLM only, no tools.
    LlmOnly,
    /// LLM with RAG retrieval as primary grounding.
    RagFocused,
    /// Coordinator profile dispatching to child profiles.
    Genie,
}

impl ProfileKind {
    /// Whether activation of this kind requires a reachable MCP server.
    #[must_use]
    pub const fn requires_mcp(self) -> bool {
        matches!(self, Self::ToolEnabled)
    }
}

impl fmt::Display for ProfileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ToolEnabled => "tool_enabled",
            Self::LlmOnly => "llm_only",
            Self::RagFocused => "rag_focused",
            Self::Genie => "genie",
        };
        f.write_str(s)
    }
}

/// Depth of the capability classification pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationMode {
    /// Name-based bucketing only; no LLM round-trip per tool.
    #[default]
    Light,
    /// Full LLM-driven categorization of every tool and prompt.
    Full,
}

impl fmt::Display for ClassificationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Light => f.write_str("light"),
            Self::Full => f.write_str("full"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_roundtrip() {
        let id = SessionId::new();
        let parsed = SessionId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_ids_are_distinct_types() {
        // Serde-transparent: serializes as a bare UUID string.
        let id = OwnerId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert!(json.starts_with('"'));
        let back: OwnerId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn test_profile_kind_serde() {
        let json = serde_json::to_string(&ProfileKind::ToolEnabled).unwrap();
        assert_eq!(json, "\"tool_enabled\"");
        assert!(ProfileKind::ToolEnabled.requires_mcp());
        assert!(!ProfileKind::Genie.requires_mcp());
    }

    #[test]
    fn test_classification_mode_display() {
        assert_eq!(ClassificationMode::Light.to_string(), "light");
        assert_eq!(ClassificationMode::Full.to_string(), "full");
    }
}
