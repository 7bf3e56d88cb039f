//! Adaptive subgraph extraction.
//!
//! Uniform BFS with a fixed depth either misses multi-hop join chains
//! or drowns the LLM on large schemas. Extraction instead separates
//! structural discovery from detail expansion:
//!
//! - Phase 1a: unbounded BFS through table/foreign-key nodes. Seeds of
//!   other types first promote to their adjacent structural neighbors.
//! - Phase 1b: up to three rounds of joinable-table discovery by
//!   case-insensitive shared column names, for join paths that exist
//!   in the data but not as FK edges.
//! - Phase 1c: database parents of discovered tables, included but
//!   never expanded.
//! - Phase 2: column children, budget-aware, query-matched tables
//!   first and then by structural distance from the seeds.
//! - Phase 3: semantic neighbors (business concept, metric, taxonomy,
//!   domain), capped at 50.

use std::collections::{HashMap, HashSet, VecDeque};
use tracing::debug;

use crate::graph::MemGraph;
use crate::model::EntityType;

/// Maximum joinable-table discovery rounds.
const MAX_JOIN_DISCOVERY_ROUNDS: usize = 3;

/// Cap on semantic-enrichment nodes.
const SEMANTIC_CAP: usize = 50;

/// Extract a bounded, planner-relevant subgraph around the seeds.
///
/// `query_matched` is the subset of seeds that directly matched the
/// user query; those tables win column budget first. `None` treats
/// every seed as query-matched. Returns the selected entity ids.
#[must_use]
#[allow(clippy::too_many_lines)]
pub fn extract_subgraph_adaptive(
    graph: &MemGraph,
    seed_ids: &[i64],
    query_matched: Option<&[i64]>,
    max_nodes: usize,
) -> HashSet<i64> {
    if seed_ids.is_empty() {
        return HashSet::new();
    }
    let query_set: HashSet<i64> = query_matched
        .map_or_else(|| seed_ids.iter().copied().collect(), |ids| {
            ids.iter().copied().collect()
        });

    // Phase 1a: FK-chain traversal, unbounded.
    let mut discovered_tables: HashSet<i64> = HashSet::new();
    let mut discovered_fk_nodes: HashSet<i64> = HashSet::new();
    let mut distance: HashMap<i64, usize> = HashMap::new();
    let mut queue: VecDeque<(i64, usize)> = VecDeque::new();

    let mut admit = |id: i64,
                     entity_type: EntityType,
                     d: usize,
                     tables: &mut HashSet<i64>,
                     fks: &mut HashSet<i64>,
                     distance: &mut HashMap<i64, usize>,
                     queue: &mut VecDeque<(i64, usize)>| {
        let target = if entity_type == EntityType::Table {
            tables
        } else {
            fks
        };
        if target.insert(id) {
            distance.insert(id, d);
            queue.push_back((id, d));
        }
    };

    for &seed in seed_ids {
        let Some(node) = graph.node(seed) else {
            continue;
        };
        if node.entity_type.is_expandable_structural() {
            admit(
                seed,
                node.entity_type,
                0,
                &mut discovered_tables,
                &mut discovered_fk_nodes,
                &mut distance,
                &mut queue,
            );
        } else {
            // Non-expandable seed: promote to adjacent structural nodes.
            for nbr in graph.neighbors_undirected(seed) {
                if let Some(nbr_node) = graph.node(nbr)
                    && nbr_node.entity_type.is_expandable_structural()
                {
                    admit(
                        nbr,
                        nbr_node.entity_type,
                        0,
                        &mut discovered_tables,
                        &mut discovered_fk_nodes,
                        &mut distance,
                        &mut queue,
                    );
                }
            }
        }
    }

    while let Some((node_id, d)) = queue.pop_front() {
        for nbr in graph.neighbors_undirected(node_id) {
            if discovered_tables.contains(&nbr) || discovered_fk_nodes.contains(&nbr) {
                continue;
            }
            let Some(nbr_node) = graph.node(nbr) else {
                continue;
            };
            if !nbr_node.entity_type.is_expandable_structural() {
                continue;
            }
            admit(
                nbr,
                nbr_node.entity_type,
                d.saturating_add(1),
                &mut discovered_tables,
                &mut discovered_fk_nodes,
                &mut distance,
                &mut queue,
            );
        }
    }

    let fk_depth = distance.values().copied().max().unwrap_or(0);
    debug!(
        tables = discovered_tables.len(),
        fk_nodes = discovered_fk_nodes.len(),
        fk_depth,
        "Adaptive extraction phase 1a"
    );

    // Phase 1b: joinable-table discovery by shared column names.
    let all_tables: Vec<i64> = graph
        .nodes()
        .filter(|n| n.entity_type == EntityType::Table)
        .map(|n| n.id)
        .collect();

    let column_names_for = |tables: &HashSet<i64>| -> HashSet<String> {
        let mut names = HashSet::new();
        for &tid in tables {
            for succ in graph.successors(tid) {
                if let Some(node) = graph.node(succ)
                    && node.entity_type == EntityType::Column
                    && !node.name.is_empty()
                {
                    names.insert(node.name.to_lowercase());
                }
            }
        }
        names
    };

    for round in 0..MAX_JOIN_DISCOVERY_ROUNDS {
        let seed_col_names = column_names_for(&discovered_tables);
        if seed_col_names.is_empty() {
            break;
        }

        let mut new_tables: HashSet<i64> = HashSet::new();
        for &tid in &all_tables {
            if discovered_tables.contains(&tid) {
                continue;
            }
            let owns_match = graph.successors(tid).into_iter().any(|succ| {
                graph.node(succ).is_some_and(|n| {
                    n.entity_type == EntityType::Column
                        && !n.name.is_empty()
                        && seed_col_names.contains(&n.name.to_lowercase())
                })
            });
            if owns_match {
                new_tables.insert(tid);
            }
        }

        if new_tables.is_empty() {
            break;
        }
        for tid in new_tables {
            discovered_tables.insert(tid);
            // One logical hop deeper than the deepest prior node.
            distance
                .entry(tid)
                .or_insert_with(|| fk_depth.saturating_add(round).saturating_add(1));
        }
    }

    // Phase 1c: database parents of discovered tables (not expanded).
    let mut discovered_databases: HashSet<i64> = HashSet::new();
    for &tid in &discovered_tables {
        for pred in graph.predecessors(tid) {
            if graph
                .node(pred)
                .is_some_and(|n| n.entity_type == EntityType::Database)
            {
                discovered_databases.insert(pred);
            }
        }
    }

    // Assemble the structural set under the hard cap: seeds first,
    // then tables and FK nodes by distance, then database context.
    let mut visited: HashSet<i64> = HashSet::new();
    let mut admit_capped = |id: i64, visited: &mut HashSet<i64>| {
        if visited.len() < max_nodes {
            visited.insert(id);
        }
    };

    for &seed in seed_ids {
        if graph.contains(seed) {
            admit_capped(seed, &mut visited);
        }
    }
    let mut structural_order: Vec<i64> = discovered_tables
        .iter()
        .chain(&discovered_fk_nodes)
        .copied()
        .collect();
    structural_order.sort_by_key(|id| (distance.get(id).copied().unwrap_or(usize::MAX), *id));
    for id in structural_order {
        admit_capped(id, &mut visited);
    }
    let mut database_order: Vec<i64> = discovered_databases.iter().copied().collect();
    database_order.sort_unstable();
    for id in database_order {
        admit_capped(id, &mut visited);
    }

    // Phase 2: column expansion, budget-aware.
    let mut column_budget = max_nodes.saturating_sub(visited.len());
    let mut sorted_tables: Vec<i64> = discovered_tables.iter().copied().collect();
    sorted_tables.sort_by_key(|tid| {
        (
            usize::from(!query_set.contains(tid)),
            distance.get(tid).copied().unwrap_or(usize::MAX),
            *tid,
        )
    });

    for tid in sorted_tables {
        if column_budget == 0 {
            break;
        }
        let table_cols: Vec<i64> = graph
            .successors(tid)
            .into_iter()
            .filter(|succ| {
                !visited.contains(succ)
                    && graph
                        .node(*succ)
                        .is_some_and(|n| n.entity_type == EntityType::Column)
            })
            .collect();
        for col in table_cols.into_iter().take(column_budget) {
            visited.insert(col);
            column_budget = column_budget.saturating_sub(1);
        }
    }

    // Phase 3: semantic enrichment, capped.
    let mut semantic_budget = max_nodes.saturating_sub(visited.len()).min(SEMANTIC_CAP);
    if semantic_budget > 0 {
        let structural: Vec<i64> = discovered_tables
            .iter()
            .chain(&discovered_fk_nodes)
            .chain(&discovered_databases)
            .copied()
            .collect();
        'outer: for nid in structural {
            for nbr in graph.neighbors_undirected(nid) {
                if visited.contains(&nbr) {
                    continue;
                }
                if graph.node(nbr).is_some_and(|n| n.entity_type.is_semantic()) {
                    visited.insert(nbr);
                    semantic_budget = semantic_budget.saturating_sub(1);
                    if semantic_budget == 0 {
                        break 'outer;
                    }
                }
            }
        }
    }

    debug!(total = visited.len(), "Adaptive extraction complete");
    visited
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{KgEntity, KgRelationship, RelationshipType};
    use chrono::Utc;
    use strata_core::{OwnerId, ProfileId};

    fn entity(id: i64, name: &str, entity_type: EntityType) -> KgEntity {
        KgEntity {
            id,
            owner_id: OwnerId::from_uuid(uuid::Uuid::nil()),
            profile_id: ProfileId::from_uuid(uuid::Uuid::nil()),
            name: name.to_string(),
            entity_type,
            properties: serde_json::json!({}),
            source: "test".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn contains(id: i64, source: i64, target: i64) -> KgRelationship {
        KgRelationship {
            id,
            owner_id: OwnerId::from_uuid(uuid::Uuid::nil()),
            profile_id: ProfileId::from_uuid(uuid::Uuid::nil()),
            source_id: source,
            target_id: target,
            relationship_type: RelationshipType::Contains,
            cardinality: None,
            metadata: serde_json::json!({}),
            source: "test".to_string(),
        }
    }

    /// orders(1) and customers(2) each own a customer_id column; no FK
    /// edge connects them. A database(10) contains both.
    fn retail_graph() -> MemGraph {
        let entities = vec![
            entity(10, "retail", EntityType::Database),
            entity(1, "orders", EntityType::Table),
            entity(2, "customers", EntityType::Table),
            entity(3, "customer_id", EntityType::Column),
            entity(4, "order_total", EntityType::Column),
            entity(5, "customer_id", EntityType::Column),
            entity(6, "customer_name", EntityType::Column),
            entity(20, "Revenue", EntityType::Metric),
        ];
        let relationships = vec![
            contains(1, 10, 1),
            contains(2, 10, 2),
            contains(3, 1, 3),
            contains(4, 1, 4),
            contains(5, 2, 5),
            contains(6, 2, 6),
            KgRelationship {
                id: 7,
                owner_id: OwnerId::from_uuid(uuid::Uuid::nil()),
                profile_id: ProfileId::from_uuid(uuid::Uuid::nil()),
                source_id: 20,
                target_id: 1,
                relationship_type: RelationshipType::Measures,
                cardinality: None,
                metadata: serde_json::json!({}),
                source: "test".to_string(),
            },
        ];
        MemGraph::build(&entities, &relationships)
    }

    #[test]
    fn test_empty_seeds_yield_empty() {
        let graph = retail_graph();
        assert!(extract_subgraph_adaptive(&graph, &[], None, 50).is_empty());
    }

    #[test]
    fn test_joinable_table_discovered_via_shared_column() {
        let graph = retail_graph();
        // Seed only `orders`; `customers` shares the customer_id name.
        let result = extract_subgraph_adaptive(&graph, &[1], None, 50);
        assert!(result.contains(&1), "seed table present");
        assert!(result.contains(&2), "joinable table discovered");
        assert!(result.contains(&10), "database context included");
        assert!(result.contains(&3) && result.contains(&5), "shared columns present");
        assert!(result.contains(&20), "semantic neighbor included");
    }

    #[test]
    fn test_max_nodes_respected() {
        let graph = retail_graph();
        for max in 0..=10 {
            let result = extract_subgraph_adaptive(&graph, &[1, 2], None, max);
            assert!(result.len() <= max, "cap {max} produced {}", result.len());
        }
    }

    #[test]
    fn test_seeds_win_under_tiny_cap() {
        let graph = retail_graph();
        let result = extract_subgraph_adaptive(&graph, &[1, 2], None, 2);
        assert_eq!(result, HashSet::from([1, 2]));
    }

    #[test]
    fn test_structural_seeds_always_returned() {
        let graph = retail_graph();
        let result = extract_subgraph_adaptive(&graph, &[1, 2], None, 50);
        assert!(result.contains(&1));
        assert!(result.contains(&2));
    }

    #[test]
    fn test_column_seed_promotes_to_table() {
        let graph = retail_graph();
        // Seeding the customer_id column discovers its owning table.
        let result = extract_subgraph_adaptive(&graph, &[3], None, 50);
        assert!(result.contains(&1));
        assert!(result.contains(&3));
    }

    #[test]
    fn test_query_matched_tables_win_column_budget() {
        let graph = retail_graph();
        // Budget of 4 structural + 1 column: the query-matched table's
        // columns come first.
        let result = extract_subgraph_adaptive(&graph, &[1, 2], Some(&[2]), 4);
        // Structural set: orders, customers, retail (3 nodes) + budget 1 column.
        let customer_cols = [5i64, 6].iter().filter(|c| result.contains(c)).count();
        let order_cols = [3i64, 4].iter().filter(|c| result.contains(c)).count();
        assert!(customer_cols >= order_cols);
    }

    #[test]
    fn test_cycles_tolerated() {
        // a <-> b FK cycle must terminate.
        let entities = vec![
            entity(1, "a", EntityType::Table),
            entity(2, "b", EntityType::Table),
        ];
        let relationships = vec![
            KgRelationship {
                id: 1,
                owner_id: OwnerId::from_uuid(uuid::Uuid::nil()),
                profile_id: ProfileId::from_uuid(uuid::Uuid::nil()),
                source_id: 1,
                target_id: 2,
                relationship_type: RelationshipType::ForeignKey,
                cardinality: None,
                metadata: serde_json::json!({}),
                source: "test".to_string(),
            },
            KgRelationship {
                id: 2,
                owner_id: OwnerId::from_uuid(uuid::Uuid::nil()),
                profile_id: ProfileId::from_uuid(uuid::Uuid::nil()),
                source_id: 2,
                target_id: 1,
                relationship_type: RelationshipType::ForeignKey,
                cardinality: None,
                metadata: serde_json::json!({}),
                source: "test".to_string(),
            },
        ];
        let graph = MemGraph::build(&entities, &relationships);
        let result = extract_subgraph_adaptive(&graph, &[1], None, 10);
        assert_eq!(result, HashSet::from([1, 2]));
    }
}
