//! Planner context rendering.
//!
//! Renders an extracted subgraph as the structured text block injected
//! into LLM context. Section order is fixed: header, table schemas,
//! joinable columns, grouped non-column entities, known relationships,
//! footer. Table→column `contains` edges already shown in the schema
//! section are excluded from the relationship list.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::model::{EntityType, RelationshipType, Subgraph};

/// Render a subgraph into the planner context block.
///
/// Returns an empty string for an empty subgraph.
#[must_use]
#[allow(clippy::too_many_lines)]
pub fn format_subgraph_for_prompt(subgraph: &Subgraph) -> String {
    if subgraph.entities.is_empty() {
        return String::new();
    }

    let mut lines = vec![
        "--- KNOWLEDGE GRAPH CONTEXT ---".to_string(),
        "The following known entities and relationships may inform your planning:".to_string(),
    ];

    let db_names: HashSet<&str> = subgraph
        .entities
        .iter()
        .filter(|e| e.entity_type == EntityType::Database)
        .map(|e| e.name.as_str())
        .collect();
    let table_names: HashSet<&str> = subgraph
        .entities
        .iter()
        .filter(|e| e.entity_type == EntityType::Table)
        .map(|e| e.name.as_str())
        .collect();
    let columns_by_name: HashMap<&str, &crate::model::KgEntity> = subgraph
        .entities
        .iter()
        .filter(|e| e.entity_type == EntityType::Column)
        .map(|e| (e.name.as_str(), e))
        .collect();

    // database --[contains]--> table, propagated to that table's columns.
    let mut entity_db: HashMap<String, String> = HashMap::new();
    for rel in &subgraph.relationships {
        if rel.relationship_type == RelationshipType::Contains
            && db_names.contains(rel.source_name.as_str())
        {
            entity_db.insert(rel.target_name.clone(), rel.source_name.clone());
        }
    }
    let table_db = entity_db.clone();
    for rel in &subgraph.relationships {
        if rel.relationship_type == RelationshipType::Contains
            && let Some(db) = table_db.get(&rel.source_name)
        {
            entity_db.insert(rel.target_name.clone(), db.clone());
        }
    }

    // table -> [(column, type)] from contains edges.
    let mut table_columns: BTreeMap<String, Vec<(String, String)>> = BTreeMap::new();
    let mut schema_edges: HashSet<(String, String)> = HashSet::new();
    for rel in &subgraph.relationships {
        if rel.relationship_type == RelationshipType::Contains
            && table_names.contains(rel.source_name.as_str())
            && let Some(column) = columns_by_name.get(rel.target_name.as_str())
        {
            let col_type = column
                .property("CType")
                .or_else(|| column.property("data_type"))
                .unwrap_or("")
                .to_string();
            table_columns
                .entry(rel.source_name.clone())
                .or_default()
                .push((rel.target_name.clone(), col_type));
            schema_edges.insert((rel.source_name.clone(), rel.target_name.clone()));
        }
    }

    if !table_columns.is_empty() {
        lines.push("\nTABLE SCHEMAS (use these to validate SQL column references):".to_string());
        for (table, cols) in &table_columns {
            let col_strs: Vec<String> = cols
                .iter()
                .map(|(name, ctype)| {
                    if ctype.is_empty() {
                        name.clone()
                    } else {
                        format!("{name}({ctype})")
                    }
                })
                .collect();
            let db_prefix = entity_db
                .get(table)
                .map(|db| format!("{db}."))
                .unwrap_or_default();
            lines.push(format!("  {db_prefix}{table}: {}", col_strs.join(", ")));
        }

        // Columns appearing in two or more tables are join candidates.
        let mut col_tables: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (table, cols) in &table_columns {
            for (col, _) in cols {
                col_tables.entry(col.clone()).or_default().push(table.clone());
            }
        }
        let joinable: Vec<(&String, &Vec<String>)> = col_tables
            .iter()
            .filter(|(_, tables)| tables.len() > 1)
            .collect();
        if !joinable.is_empty() {
            lines.push(
                "\nJOINABLE COLUMNS (shared across tables — use for JOIN conditions):".to_string(),
            );
            for (col, tables) in joinable {
                let mut sorted = tables.clone();
                sorted.sort();
                lines.push(format!("  {col}: {}", sorted.join(", ")));
            }
        }
    }

    // Group remaining entities by type; columns are already shown in
    // the schema section.
    let mut by_type: BTreeMap<&'static str, Vec<&crate::model::KgEntity>> = BTreeMap::new();
    for entity in &subgraph.entities {
        if entity.entity_type == EntityType::Column && !table_columns.is_empty() {
            continue;
        }
        by_type
            .entry(entity.entity_type.as_str())
            .or_default()
            .push(entity);
    }

    for (etype, entities) in by_type {
        lines.push(format!("\n{} ENTITIES:", etype.to_uppercase()));
        for entity in entities {
            let mut parts = Vec::new();
            if let Some(desc) = entity.property("description").filter(|s| !s.is_empty()) {
                parts.push(desc.to_string());
            }
            if let Some(dtype) = entity
                .property("data_type")
                .or_else(|| entity.property("CType"))
                .filter(|s| !s.is_empty())
            {
                parts.push(format!("type: {dtype}"));
            }
            if let Some(db) = entity_db.get(&entity.name) {
                parts.push(format!("database: {db}"));
            }
            if let Some(biz) = entity
                .property("business_meaning")
                .filter(|s| !s.is_empty())
            {
                parts.push(format!("business: {biz}"));
            }
            if parts.is_empty() {
                lines.push(format!("  - {}", entity.name));
            } else {
                lines.push(format!("  - {} ({})", entity.name, parts.join("; ")));
            }
        }
    }

    let non_schema_rels: Vec<&crate::model::SubgraphRelationship> = subgraph
        .relationships
        .iter()
        .filter(|rel| {
            !(rel.relationship_type == RelationshipType::Contains
                && schema_edges.contains(&(rel.source_name.clone(), rel.target_name.clone())))
        })
        .collect();
    if !non_schema_rels.is_empty() {
        lines.push("\nKNOWN RELATIONSHIPS:".to_string());
        for rel in non_schema_rels {
            let card = rel
                .cardinality
                .as_ref()
                .map(|c| format!(" [{c}]"))
                .unwrap_or_default();
            let desc = rel
                .metadata
                .get("description")
                .and_then(serde_json::Value::as_str)
                .filter(|s| !s.is_empty())
                .map(|d| format!(" — {d}"))
                .unwrap_or_default();
            lines.push(format!(
                "  - {} --[{}{card}]--> {}{desc}",
                rel.source_name,
                rel.relationship_type.as_str(),
                rel.target_name
            ));
        }
    }

    lines.push("--- END KNOWLEDGE GRAPH CONTEXT ---".to_string());
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{KgEntity, SubgraphRelationship};
    use chrono::Utc;
    use strata_core::{OwnerId, ProfileId};

    fn entity(id: i64, name: &str, entity_type: EntityType, props: serde_json::Value) -> KgEntity {
        KgEntity {
            id,
            owner_id: OwnerId::from_uuid(uuid::Uuid::nil()),
            profile_id: ProfileId::from_uuid(uuid::Uuid::nil()),
            name: name.to_string(),
            entity_type,
            properties: props,
            source: "test".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn rel(
        source: (i64, &str),
        target: (i64, &str),
        t: RelationshipType,
        metadata: serde_json::Value,
    ) -> SubgraphRelationship {
        SubgraphRelationship {
            source_id: source.0,
            target_id: target.0,
            source_name: source.1.to_string(),
            target_name: target.1.to_string(),
            relationship_type: t,
            cardinality: None,
            metadata,
        }
    }

    fn retail_subgraph() -> Subgraph {
        Subgraph {
            entities: vec![
                entity(10, "retail", EntityType::Database, serde_json::json!({})),
                entity(1, "orders", EntityType::Table, serde_json::json!({})),
                entity(2, "customers", EntityType::Table, serde_json::json!({})),
                entity(
                    3,
                    "customer_id",
                    EntityType::Column,
                    serde_json::json!({"data_type": "INTEGER"}),
                ),
                entity(
                    5,
                    "customer_id",
                    EntityType::Column,
                    serde_json::json!({"data_type": "INTEGER"}),
                ),
                entity(
                    20,
                    "Revenue",
                    EntityType::Metric,
                    serde_json::json!({"description": "Monthly revenue"}),
                ),
            ],
            relationships: vec![
                rel(
                    (10, "retail"),
                    (1, "orders"),
                    RelationshipType::Contains,
                    serde_json::json!({}),
                ),
                rel(
                    (10, "retail"),
                    (2, "customers"),
                    RelationshipType::Contains,
                    serde_json::json!({}),
                ),
                rel(
                    (1, "orders"),
                    (3, "customer_id"),
                    RelationshipType::Contains,
                    serde_json::json!({}),
                ),
                rel(
                    (2, "customers"),
                    (5, "customer_id"),
                    RelationshipType::Contains,
                    serde_json::json!({}),
                ),
                rel(
                    (20, "Revenue"),
                    (1, "orders"),
                    RelationshipType::Measures,
                    serde_json::json!({"description": "computed from order_total"}),
                ),
            ],
        }
    }

    #[test]
    fn test_empty_subgraph_renders_nothing() {
        assert_eq!(format_subgraph_for_prompt(&Subgraph::default()), "");
    }

    #[test]
    fn test_skeleton_markers_present() {
        let text = format_subgraph_for_prompt(&retail_subgraph());
        assert!(text.starts_with("--- KNOWLEDGE GRAPH CONTEXT ---"));
        assert!(text.ends_with("--- END KNOWLEDGE GRAPH CONTEXT ---"));
        assert!(text.contains("TABLE SCHEMAS (use these to validate SQL column references):"));
        assert!(text.contains(
            "JOINABLE COLUMNS (shared across tables — use for JOIN conditions):"
        ));
        assert!(text.contains("KNOWN RELATIONSHIPS:"));
    }

    #[test]
    fn test_schema_lines_carry_database_prefix_and_types() {
        let text = format_subgraph_for_prompt(&retail_subgraph());
        assert!(text.contains("  retail.orders: customer_id(INTEGER)"));
        assert!(text.contains("  retail.customers: customer_id(INTEGER)"));
    }

    #[test]
    fn test_joinable_columns_sorted() {
        let text = format_subgraph_for_prompt(&retail_subgraph());
        assert!(text.contains("  customer_id: customers, orders"));
    }

    #[test]
    fn test_schema_contains_edges_excluded_from_relationships() {
        let text = format_subgraph_for_prompt(&retail_subgraph());
        // table -> column contains edges are not repeated...
        assert!(!text.contains("orders --[contains]--> customer_id"));
        // ...but database -> table contains edges remain.
        assert!(text.contains("retail --[contains]--> orders"));
        // Semantic relationship with description.
        assert!(text.contains("Revenue --[measures]--> orders — computed from order_total"));
    }

    #[test]
    fn test_entity_sections_grouped_by_type() {
        let text = format_subgraph_for_prompt(&retail_subgraph());
        assert!(text.contains("METRIC ENTITIES:"));
        assert!(text.contains("  - Revenue (Monthly revenue)"));
        // Columns never appear as a section when schemas are present.
        assert!(!text.contains("COLUMN ENTITIES:"));
    }
}
