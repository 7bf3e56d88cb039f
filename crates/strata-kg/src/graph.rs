//! In-memory graph layer.
//!
//! The durable store materializes one `MemGraph` per (owner, profile)
//! on first use and caches it until a write invalidates it. All graph
//! algorithms (traversal, statistics, extraction) run against this
//! layer; SQLite is never consulted inside a traversal.

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};

use crate::model::{EntityType, KgEntity, KgRelationship, RelationshipType};

/// Node payload.
#[derive(Debug, Clone)]
pub struct NodeData {
    /// Entity id.
    pub id: i64,
    /// Entity name.
    pub name: String,
    /// Entity type.
    pub entity_type: EntityType,
    /// Properties.
    pub properties: Value,
}

/// Edge payload.
#[derive(Debug, Clone)]
pub struct EdgeData {
    /// Relationship id.
    pub rel_id: i64,
    /// Relationship type.
    pub relationship_type: RelationshipType,
    /// Cardinality annotation.
    pub cardinality: Option<String>,
    /// Metadata.
    pub metadata: Value,
}

/// Directed in-memory graph over one profile's entities.
#[derive(Debug, Default)]
pub struct MemGraph {
    graph: DiGraph<NodeData, EdgeData>,
    index_of: HashMap<i64, NodeIndex>,
}

impl MemGraph {
    /// Build from stored rows. Relationships referencing missing
    /// entities are skipped.
    #[must_use]
    pub fn build(entities: &[KgEntity], relationships: &[KgRelationship]) -> Self {
        let mut graph = DiGraph::new();
        let mut index_of = HashMap::new();

        for entity in entities {
            let idx = graph.add_node(NodeData {
                id: entity.id,
                name: entity.name.clone(),
                entity_type: entity.entity_type,
                properties: entity.properties.clone(),
            });
            index_of.insert(entity.id, idx);
        }

        for rel in relationships {
            if let (Some(&src), Some(&dst)) =
                (index_of.get(&rel.source_id), index_of.get(&rel.target_id))
            {
                graph.add_edge(
                    src,
                    dst,
                    EdgeData {
                        rel_id: rel.id,
                        relationship_type: rel.relationship_type,
                        cardinality: rel.cardinality.clone(),
                        metadata: rel.metadata.clone(),
                    },
                );
            }
        }

        Self { graph, index_of }
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Whether the entity exists in the graph.
    #[must_use]
    pub fn contains(&self, id: i64) -> bool {
        self.index_of.contains_key(&id)
    }

    /// Node payload for an entity id.
    #[must_use]
    pub fn node(&self, id: i64) -> Option<&NodeData> {
        self.index_of.get(&id).map(|&idx| &self.graph[idx])
    }

    /// All node payloads.
    pub fn nodes(&self) -> impl Iterator<Item = &NodeData> {
        self.graph.node_weights()
    }

    /// Successor entity ids (outgoing edges).
    #[must_use]
    pub fn successors(&self, id: i64) -> Vec<i64> {
        self.neighbors_in(id, Direction::Outgoing)
    }

    /// Predecessor entity ids (incoming edges).
    #[must_use]
    pub fn predecessors(&self, id: i64) -> Vec<i64> {
        self.neighbors_in(id, Direction::Incoming)
    }

    fn neighbors_in(&self, id: i64, dir: Direction) -> Vec<i64> {
        self.index_of.get(&id).map_or_else(Vec::new, |&idx| {
            self.graph
                .neighbors_directed(idx, dir)
                .map(|n| self.graph[n].id)
                .collect()
        })
    }

    /// Neighbors in both directions, deduplicated.
    #[must_use]
    pub fn neighbors_undirected(&self, id: i64) -> Vec<i64> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for nbr in self
            .successors(id)
            .into_iter()
            .chain(self.predecessors(id))
        {
            if seen.insert(nbr) {
                out.push(nbr);
            }
        }
        out
    }

    /// Edges whose endpoints are both inside `ids`, with endpoint ids
    /// and names resolved.
    #[must_use]
    pub fn edges_within(&self, ids: &HashSet<i64>) -> Vec<(i64, i64, &EdgeData)> {
        self.graph
            .edge_indices()
            .filter_map(|edge| {
                let (src, dst) = self.graph.edge_endpoints(edge)?;
                let src_id = self.graph[src].id;
                let dst_id = self.graph[dst].id;
                (ids.contains(&src_id) && ids.contains(&dst_id))
                    .then(|| (src_id, dst_id, &self.graph[edge]))
            })
            .collect()
    }

    /// Undirected BFS shortest path between two entities.
    #[must_use]
    pub fn shortest_path(&self, source: i64, target: i64) -> Option<Vec<i64>> {
        if !self.contains(source) || !self.contains(target) {
            return None;
        }
        if source == target {
            return Some(vec![source]);
        }

        let mut parent: HashMap<i64, i64> = HashMap::new();
        let mut queue = VecDeque::from([source]);
        let mut visited = HashSet::from([source]);

        while let Some(current) = queue.pop_front() {
            for nbr in self.neighbors_undirected(current) {
                if !visited.insert(nbr) {
                    continue;
                }
                parent.insert(nbr, current);
                if nbr == target {
                    let mut path = vec![target];
                    let mut cursor = target;
                    while let Some(&p) = parent.get(&cursor) {
                        path.push(p);
                        cursor = p;
                    }
                    path.reverse();
                    return Some(path);
                }
                queue.push_back(nbr);
            }
        }
        None
    }

    /// All ancestors (transitive predecessors) of an entity.
    #[must_use]
    pub fn ancestors(&self, id: i64) -> HashSet<i64> {
        self.reachable(id, Direction::Incoming)
    }

    /// All descendants (transitive successors) of an entity.
    #[must_use]
    pub fn descendants(&self, id: i64) -> HashSet<i64> {
        self.reachable(id, Direction::Outgoing)
    }

    fn reachable(&self, id: i64, dir: Direction) -> HashSet<i64> {
        let mut out = HashSet::new();
        let mut queue = VecDeque::from([id]);
        while let Some(current) = queue.pop_front() {
            for nbr in self.neighbors_in(current, dir) {
                if nbr != id && out.insert(nbr) {
                    queue.push_back(nbr);
                }
            }
        }
        out
    }

    /// Number of weakly connected components.
    #[must_use]
    pub fn connected_components(&self) -> usize {
        petgraph::algo::connected_components(&self.graph)
    }

    /// Whether the directed graph contains a cycle.
    #[must_use]
    pub fn has_cycles(&self) -> bool {
        petgraph::algo::is_cyclic_directed(&self.graph)
    }

    /// Degree centrality per entity: degree / (n - 1).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn degree_centrality(&self) -> HashMap<i64, f64> {
        let n = self.graph.node_count();
        if n < 2 {
            return self.index_of.keys().map(|&id| (id, 0.0)).collect();
        }
        let denom = (n.saturating_sub(1)) as f64;
        self.index_of
            .iter()
            .map(|(&id, &idx)| {
                let degree = self
                    .graph
                    .neighbors_undirected(idx)
                    .count();
                (id, degree as f64 / denom)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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

    fn rel(id: i64, source: i64, target: i64, t: RelationshipType) -> KgRelationship {
        KgRelationship {
            id,
            owner_id: OwnerId::from_uuid(uuid::Uuid::nil()),
            profile_id: ProfileId::from_uuid(uuid::Uuid::nil()),
            source_id: source,
            target_id: target,
            relationship_type: t,
            cardinality: None,
            metadata: serde_json::json!({}),
            source: "test".to_string(),
        }
    }

    fn chain_graph() -> MemGraph {
        // 1 -> 2 -> 3, plus isolated 4
        MemGraph::build(
            &[
                entity(1, "a", EntityType::Table),
                entity(2, "b", EntityType::Table),
                entity(3, "c", EntityType::Table),
                entity(4, "d", EntityType::Table),
            ],
            &[
                rel(1, 1, 2, RelationshipType::ForeignKey),
                rel(2, 2, 3, RelationshipType::ForeignKey),
            ],
        )
    }

    #[test]
    fn test_build_skips_dangling_edges() {
        let g = MemGraph::build(
            &[entity(1, "a", EntityType::Table)],
            &[rel(1, 1, 99, RelationshipType::Contains)],
        );
        assert_eq!(g.node_count(), 1);
        assert_eq!(g.edge_count(), 0);
    }

    #[test]
    fn test_shortest_path_undirected() {
        let g = chain_graph();
        // Path runs against edge direction too.
        assert_eq!(g.shortest_path(3, 1).unwrap(), vec![3, 2, 1]);
        assert_eq!(g.shortest_path(1, 1).unwrap(), vec![1]);
        assert!(g.shortest_path(1, 4).is_none());
    }

    #[test]
    fn test_ancestors_descendants() {
        let g = chain_graph();
        assert_eq!(g.descendants(1), HashSet::from([2, 3]));
        assert_eq!(g.ancestors(3), HashSet::from([1, 2]));
        assert!(g.ancestors(1).is_empty());
    }

    #[test]
    fn test_components_and_cycles() {
        let g = chain_graph();
        assert_eq!(g.connected_components(), 2);
        assert!(!g.has_cycles());

        let cyclic = MemGraph::build(
            &[
                entity(1, "a", EntityType::Table),
                entity(2, "b", EntityType::Table),
            ],
            &[
                rel(1, 1, 2, RelationshipType::DependsOn),
                rel(2, 2, 1, RelationshipType::DependsOn),
            ],
        );
        assert!(cyclic.has_cycles());
    }

    #[test]
    fn test_degree_centrality() {
        let g = chain_graph();
        let centrality = g.degree_centrality();
        // Node 2 touches both others: degree 2 of possible 3.
        assert!((centrality[&2] - 2.0 / 3.0).abs() < 1e-9);
        assert!((centrality[&4] - 0.0).abs() < 1e-9);
    }

    #[test]
    fn test_edges_within() {
        let g = chain_graph();
        let ids = HashSet::from([1, 2]);
        let edges = g.edges_within(&ids);
        assert_eq!(edges.len(), 1);
        assert_eq!((edges[0].0, edges[0].1), (1, 2));
    }
}
