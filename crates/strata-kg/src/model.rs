//! Knowledge graph value types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strata_core::{OwnerId, ProfileId};

use crate::error::{KgError, KgResult};

/// Entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// A database.
    Database,
    /// A table within a database.
    Table,
    /// A column within a table.
    Column,
    /// A foreign-key junction node.
    ForeignKey,
    /// A business concept.
    BusinessConcept,
    /// A taxonomy node.
    Taxonomy,
    /// A metric definition.
    Metric,
    /// A business domain.
    Domain,
}

impl EntityType {
    /// Column value / wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Database => "database",
            Self::Table => "table",
            Self::Column => "column",
            Self::ForeignKey => "foreign_key",
            Self::BusinessConcept => "business_concept",
            Self::Taxonomy => "taxonomy",
            Self::Metric => "metric",
            Self::Domain => "domain",
        }
    }

    /// Parse from a column value.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown type names.
    pub fn parse(s: &str) -> KgResult<Self> {
        match s {
            "database" => Ok(Self::Database),
            "table" => Ok(Self::Table),
            "column" => Ok(Self::Column),
            "foreign_key" => Ok(Self::ForeignKey),
            "business_concept" => Ok(Self::BusinessConcept),
            "taxonomy" => Ok(Self::Taxonomy),
            "metric" => Ok(Self::Metric),
            "domain" => Ok(Self::Domain),
            other => Err(KgError::Invalid(format!("unknown entity type '{other}'"))),
        }
    }

    /// Structural types the FK-chain traversal expands through.
    #[must_use]
    pub const fn is_expandable_structural(self) -> bool {
        matches!(self, Self::Table | Self::ForeignKey)
    }

    /// Semantic types added during enrichment.
    #[must_use]
    pub const fn is_semantic(self) -> bool {
        matches!(
            self,
            Self::BusinessConcept | Self::Metric | Self::Taxonomy | Self::Domain
        )
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relationship type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    /// Containment (database → table, table → column).
    Contains,
    /// Foreign-key link.
    ForeignKey,
    /// Subtype link.
    IsA,
    /// Property attachment.
    HasProperty,
    /// A metric measuring an entity.
    Measures,
    /// Derivation lineage.
    DerivesFrom,
    /// Dependency.
    DependsOn,
    /// Untyped association.
    RelatesTo,
}

impl RelationshipType {
    /// Column value / wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Contains => "contains",
            Self::ForeignKey => "foreign_key",
            Self::IsA => "is_a",
            Self::HasProperty => "has_property",
            Self::Measures => "measures",
            Self::DerivesFrom => "derives_from",
            Self::DependsOn => "depends_on",
            Self::RelatesTo => "relates_to",
        }
    }

    /// Parse from a column value.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown type names.
    pub fn parse(s: &str) -> KgResult<Self> {
        match s {
            "contains" => Ok(Self::Contains),
            "foreign_key" => Ok(Self::ForeignKey),
            "is_a" => Ok(Self::IsA),
            "has_property" => Ok(Self::HasProperty),
            "measures" => Ok(Self::Measures),
            "derives_from" => Ok(Self::DerivesFrom),
            "depends_on" => Ok(Self::DependsOn),
            "relates_to" => Ok(Self::RelatesTo),
            other => Err(KgError::Invalid(format!(
                "unknown relationship type '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KgEntity {
    /// Row id.
    pub id: i64,
    /// Owning user.
    pub owner_id: OwnerId,
    /// Profile scope.
    pub profile_id: ProfileId,
    /// Entity name. Unique per (owner, profile, name, type).
    pub name: String,
    /// Entity type.
    pub entity_type: EntityType,
    /// Free-form properties (description, `data_type`, ...).
    pub properties: Value,
    /// Provenance ("manual", "tool:base_readQuery", ...).
    pub source: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

impl KgEntity {
    /// String property accessor.
    #[must_use]
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }
}

/// A stored relationship.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KgRelationship {
    /// Row id.
    pub id: i64,
    /// Owning user.
    pub owner_id: OwnerId,
    /// Profile scope.
    pub profile_id: ProfileId,
    /// Source entity id.
    pub source_id: i64,
    /// Target entity id.
    pub target_id: i64,
    /// Relationship type. Unique per (owner, profile, source, target, type).
    pub relationship_type: RelationshipType,
    /// Cardinality annotation ("1:N", ...), if known.
    pub cardinality: Option<String>,
    /// Free-form metadata (description, ...).
    pub metadata: Value,
    /// Provenance.
    pub source: String,
}

/// Input for an entity upsert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEntity {
    /// Entity name.
    pub name: String,
    /// Entity type.
    pub entity_type: EntityType,
    /// Properties; merged over existing ones on upsert.
    #[serde(default)]
    pub properties: Value,
    /// Provenance.
    #[serde(default = "default_source")]
    pub source: String,
}

/// Input for a relationship upsert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRelationship {
    /// Source entity id.
    pub source_id: i64,
    /// Target entity id.
    pub target_id: i64,
    /// Relationship type.
    pub relationship_type: RelationshipType,
    /// Cardinality annotation.
    #[serde(default)]
    pub cardinality: Option<String>,
    /// Metadata.
    #[serde(default)]
    pub metadata: Value,
    /// Provenance.
    #[serde(default = "default_source")]
    pub source: String,
}

fn default_source() -> String {
    "manual".to_string()
}

/// A relationship in a bulk import, referencing endpoints by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkRelationship {
    /// Source entity name.
    pub source_name: String,
    /// Target entity name.
    pub target_name: String,
    /// Relationship type.
    pub relationship_type: RelationshipType,
    /// Cardinality annotation.
    #[serde(default)]
    pub cardinality: Option<String>,
    /// Metadata.
    #[serde(default)]
    pub metadata: Value,
    /// Provenance.
    #[serde(default = "default_source")]
    pub source: String,
}

/// Counts reported by a bulk import.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ImportCounts {
    /// Entities inserted or updated.
    pub entities: usize,
    /// Relationships inserted or updated.
    pub relationships: usize,
    /// Relationships skipped because an endpoint name was unknown.
    pub skipped_relationships: usize,
}

/// A relationship inside an extracted subgraph, with endpoint names
/// resolved for rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubgraphRelationship {
    /// Source entity id.
    pub source_id: i64,
    /// Target entity id.
    pub target_id: i64,
    /// Source entity name.
    pub source_name: String,
    /// Target entity name.
    pub target_name: String,
    /// Relationship type.
    pub relationship_type: RelationshipType,
    /// Cardinality annotation.
    pub cardinality: Option<String>,
    /// Metadata.
    pub metadata: Value,
}

/// An extracted subgraph: a bounded entity set plus the relationships
/// whose endpoints both fall inside it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Subgraph {
    /// Entities.
    pub entities: Vec<KgEntity>,
    /// Relationships with both endpoints in `entities`.
    pub relationships: Vec<SubgraphRelationship>,
}

impl Subgraph {
    /// Whether nothing was extracted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Graph statistics for one (owner, profile) graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphStats {
    /// Total entities.
    pub entity_count: usize,
    /// Total relationships.
    pub relationship_count: usize,
    /// Entity count per type.
    pub entities_by_type: std::collections::HashMap<String, usize>,
    /// Weakly connected component count.
    pub connected_components: usize,
    /// Whether the directed graph contains a cycle.
    pub has_cycles: bool,
    /// Top entities by degree centrality: (id, name, centrality).
    pub top_central_entities: Vec<(i64, String, f64)>,
}
