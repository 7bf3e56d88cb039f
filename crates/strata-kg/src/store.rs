//! Durable knowledge graph store.
//!
//! SQLite tables keyed by (owner, profile) with natural-key upserts.
//! The in-memory graph for a (owner, profile) pair is materialized on
//! first use and invalidated by any write to that pair.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use strata_core::{OwnerId, ProfileId};

use crate::error::{KgError, KgResult};
use crate::extract::extract_subgraph_adaptive;
use crate::graph::MemGraph;
use crate::model::{
    BulkRelationship, EntityType, GraphStats, ImportCounts, KgEntity, KgRelationship, NewEntity,
    NewRelationship, RelationshipType, Subgraph, SubgraphRelationship,
};
use crate::render::format_subgraph_for_prompt;

/// Direction filter for relationship queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelDirection {
    /// Relationships where the entity is the source.
    Outgoing,
    /// Relationships where the entity is the target.
    Incoming,
    /// Both.
    Both,
}

type GraphKey = (OwnerId, ProfileId);

/// SQLite + in-memory knowledge graph store.
pub struct KgStore {
    conn: Mutex<Connection>,
    graphs: Mutex<HashMap<GraphKey, Arc<MemGraph>>>,
}

impl KgStore {
    /// Open (or create) the store at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn new(path: impl AsRef<Path>) -> KgResult<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            graphs: Mutex::new(HashMap::new()),
        })
    }

    /// In-memory store for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub fn in_memory() -> KgResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            graphs: Mutex::new(HashMap::new()),
        })
    }

    fn init_schema(conn: &Connection) -> KgResult<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kg_entities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id TEXT NOT NULL,
                profile_id TEXT NOT NULL,
                name TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                properties_json TEXT NOT NULL DEFAULT '{}',
                source TEXT NOT NULL DEFAULT 'manual',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(owner_id, profile_id, name, entity_type)
            );
            CREATE INDEX IF NOT EXISTS idx_kg_entities_scope
                ON kg_entities(owner_id, profile_id);
            CREATE TABLE IF NOT EXISTS kg_relationships (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id TEXT NOT NULL,
                profile_id TEXT NOT NULL,
                source_entity_id INTEGER NOT NULL,
                target_entity_id INTEGER NOT NULL,
                relationship_type TEXT NOT NULL,
                cardinality TEXT,
                metadata_json TEXT NOT NULL DEFAULT '{}',
                source TEXT NOT NULL DEFAULT 'manual',
                UNIQUE(owner_id, profile_id, source_entity_id, target_entity_id, relationship_type)
            );
            CREATE INDEX IF NOT EXISTS idx_kg_rels_scope
                ON kg_relationships(owner_id, profile_id);",
        )?;
        Ok(())
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> KgResult<T>) -> KgResult<T> {
        let conn = self
            .conn
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&conn)
    }

    fn invalidate(&self, owner_id: OwnerId, profile_id: ProfileId) {
        let mut graphs = self
            .graphs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        graphs.remove(&(owner_id, profile_id));
    }

    /// Materialize (or fetch the cached) in-memory graph for a scope.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    pub fn graph(&self, owner_id: OwnerId, profile_id: ProfileId) -> KgResult<Arc<MemGraph>> {
        {
            let graphs = self
                .graphs
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if let Some(graph) = graphs.get(&(owner_id, profile_id)) {
                return Ok(Arc::clone(graph));
            }
        }

        let entities = self.list_entities(owner_id, profile_id, None, usize::MAX)?;
        let relationships = self.list_relationships(owner_id, profile_id, None)?;
        let graph = Arc::new(MemGraph::build(&entities, &relationships));
        debug!(
            owner = %owner_id,
            profile = %profile_id,
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "Materialized knowledge graph"
        );

        let mut graphs = self
            .graphs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(Arc::clone(
            graphs
                .entry((owner_id, profile_id))
                .or_insert(graph),
        ))
    }

    /// Upsert an entity on its natural key (owner, profile, name, type).
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    pub fn add_entity(
        &self,
        owner_id: OwnerId,
        profile_id: ProfileId,
        entity: &NewEntity,
    ) -> KgResult<KgEntity> {
        let now = Utc::now();
        let properties = if entity.properties.is_object() {
            entity.properties.to_string()
        } else {
            "{}".to_string()
        };
        let id = self.with_conn(|conn| {
            conn.query_row(
                "INSERT INTO kg_entities
                    (owner_id, profile_id, name, entity_type, properties_json, source,
                     created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
                 ON CONFLICT(owner_id, profile_id, name, entity_type) DO UPDATE SET
                    properties_json = json_patch(kg_entities.properties_json, excluded.properties_json),
                    source = excluded.source,
                    updated_at = excluded.updated_at
                 RETURNING id",
                params![
                    owner_id.to_string(),
                    profile_id.to_string(),
                    entity.name,
                    entity.entity_type.as_str(),
                    properties,
                    entity.source,
                    now.to_rfc3339(),
                ],
                |row| row.get::<_, i64>(0),
            )
            .map_err(KgError::from)
        })?;

        self.invalidate(owner_id, profile_id);
        self.get_entity(owner_id, profile_id, id)?
            .ok_or(KgError::NotFound { what: "entity", id })
    }

    /// Fetch one entity by id.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    pub fn get_entity(
        &self,
        owner_id: OwnerId,
        profile_id: ProfileId,
        id: i64,
    ) -> KgResult<Option<KgEntity>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, name, entity_type, properties_json, source, created_at, updated_at
                 FROM kg_entities
                 WHERE id = ?1 AND owner_id = ?2 AND profile_id = ?3",
                params![id, owner_id.to_string(), profile_id.to_string()],
                |row| Ok(row_to_entity(row, owner_id, profile_id)),
            )
            .optional()?
            .transpose()
        })
    }

    /// Fetch one entity by name (and optionally type).
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    pub fn get_entity_by_name(
        &self,
        owner_id: OwnerId,
        profile_id: ProfileId,
        name: &str,
        entity_type: Option<EntityType>,
    ) -> KgResult<Option<KgEntity>> {
        self.with_conn(|conn| {
            let result = match entity_type {
                Some(t) => conn
                    .query_row(
                        "SELECT id, name, entity_type, properties_json, source, created_at, updated_at
                         FROM kg_entities
                         WHERE owner_id = ?1 AND profile_id = ?2 AND name = ?3 AND entity_type = ?4",
                        params![owner_id.to_string(), profile_id.to_string(), name, t.as_str()],
                        |row| Ok(row_to_entity(row, owner_id, profile_id)),
                    )
                    .optional()?,
                None => conn
                    .query_row(
                        "SELECT id, name, entity_type, properties_json, source, created_at, updated_at
                         FROM kg_entities
                         WHERE owner_id = ?1 AND profile_id = ?2 AND name = ?3
                         ORDER BY id LIMIT 1",
                        params![owner_id.to_string(), profile_id.to_string(), name],
                        |row| Ok(row_to_entity(row, owner_id, profile_id)),
                    )
                    .optional()?,
            };
            result.transpose()
        })
    }

    /// Case-insensitive substring search over names and properties.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    pub fn search_entities(
        &self,
        owner_id: OwnerId,
        profile_id: ProfileId,
        query: &str,
        limit: usize,
    ) -> KgResult<Vec<KgEntity>> {
        let pattern = format!("%{}%", query.to_lowercase());
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, entity_type, properties_json, source, created_at, updated_at
                 FROM kg_entities
                 WHERE owner_id = ?1 AND profile_id = ?2
                   AND (LOWER(name) LIKE ?3 OR LOWER(properties_json) LIKE ?3)
                 ORDER BY LENGTH(name) ASC
                 LIMIT ?4",
            )?;
            let rows = stmt.query_map(
                params![
                    owner_id.to_string(),
                    profile_id.to_string(),
                    pattern,
                    i64::try_from(limit).unwrap_or(i64::MAX),
                ],
                |row| Ok(row_to_entity(row, owner_id, profile_id)),
            )?;
            rows.map(|r| r.map_err(KgError::from).and_then(|inner| inner))
                .collect()
        })
    }

    /// List entities, optionally filtered by type.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    pub fn list_entities(
        &self,
        owner_id: OwnerId,
        profile_id: ProfileId,
        entity_type: Option<EntityType>,
        limit: usize,
    ) -> KgResult<Vec<KgEntity>> {
        self.with_conn(|conn| {
            let limit = i64::try_from(limit).unwrap_or(i64::MAX);
            let mut collect = |stmt: &mut rusqlite::Statement<'_>,
                               params: &[&dyn rusqlite::ToSql]|
             -> KgResult<Vec<KgEntity>> {
                let rows = stmt.query_map(params, |row| Ok(row_to_entity(row, owner_id, profile_id)))?;
                rows.map(|r| r.map_err(KgError::from).and_then(|inner| inner))
                    .collect()
            };

            match entity_type {
                Some(t) => {
                    let mut stmt = conn.prepare(
                        "SELECT id, name, entity_type, properties_json, source, created_at, updated_at
                         FROM kg_entities
                         WHERE owner_id = ?1 AND profile_id = ?2 AND entity_type = ?3
                         ORDER BY id LIMIT ?4",
                    )?;
                    collect(
                        &mut stmt,
                        &[
                            &owner_id.to_string(),
                            &profile_id.to_string(),
                            &t.as_str(),
                            &limit,
                        ],
                    )
                },
                None => {
                    let mut stmt = conn.prepare(
                        "SELECT id, name, entity_type, properties_json, source, created_at, updated_at
                         FROM kg_entities
                         WHERE owner_id = ?1 AND profile_id = ?2
                         ORDER BY id LIMIT ?3",
                    )?;
                    collect(
                        &mut stmt,
                        &[&owner_id.to_string(), &profile_id.to_string(), &limit],
                    )
                },
            }
        })
    }

    /// Replace an entity's properties.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    pub fn update_entity(
        &self,
        owner_id: OwnerId,
        profile_id: ProfileId,
        id: i64,
        properties: &Value,
    ) -> KgResult<bool> {
        let updated = self.with_conn(|conn| {
            conn.execute(
                "UPDATE kg_entities SET properties_json = ?4, updated_at = ?5
                 WHERE id = ?1 AND owner_id = ?2 AND profile_id = ?3",
                params![
                    id,
                    owner_id.to_string(),
                    profile_id.to_string(),
                    properties.to_string(),
                    Utc::now().to_rfc3339(),
                ],
            )
            .map_err(KgError::from)
        })?;
        if updated > 0 {
            self.invalidate(owner_id, profile_id);
        }
        Ok(updated > 0)
    }

    /// Delete an entity and cascade its relationships.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    pub fn delete_entity(
        &self,
        owner_id: OwnerId,
        profile_id: ProfileId,
        id: i64,
    ) -> KgResult<bool> {
        let deleted = self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM kg_relationships
                 WHERE owner_id = ?2 AND profile_id = ?3
                   AND (source_entity_id = ?1 OR target_entity_id = ?1)",
                params![id, owner_id.to_string(), profile_id.to_string()],
            )?;
            conn.execute(
                "DELETE FROM kg_entities
                 WHERE id = ?1 AND owner_id = ?2 AND profile_id = ?3",
                params![id, owner_id.to_string(), profile_id.to_string()],
            )
            .map_err(KgError::from)
        })?;
        if deleted > 0 {
            self.invalidate(owner_id, profile_id);
        }
        Ok(deleted > 0)
    }

    /// Upsert a relationship on its natural key.
    ///
    /// # Errors
    ///
    /// Returns [`KgError::NotFound`] if either endpoint does not exist
    /// in this scope.
    pub fn add_relationship(
        &self,
        owner_id: OwnerId,
        profile_id: ProfileId,
        rel: &NewRelationship,
    ) -> KgResult<KgRelationship> {
        for endpoint in [rel.source_id, rel.target_id] {
            if self.get_entity(owner_id, profile_id, endpoint)?.is_none() {
                return Err(KgError::NotFound {
                    what: "entity",
                    id: endpoint,
                });
            }
        }

        let metadata = if rel.metadata.is_object() {
            rel.metadata.to_string()
        } else {
            "{}".to_string()
        };
        let id = self.with_conn(|conn| {
            conn.query_row(
                "INSERT INTO kg_relationships
                    (owner_id, profile_id, source_entity_id, target_entity_id,
                     relationship_type, cardinality, metadata_json, source)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(owner_id, profile_id, source_entity_id, target_entity_id,
                             relationship_type) DO UPDATE SET
                    cardinality = excluded.cardinality,
                    metadata_json = excluded.metadata_json,
                    source = excluded.source
                 RETURNING id",
                params![
                    owner_id.to_string(),
                    profile_id.to_string(),
                    rel.source_id,
                    rel.target_id,
                    rel.relationship_type.as_str(),
                    rel.cardinality,
                    metadata,
                    rel.source,
                ],
                |row| row.get::<_, i64>(0),
            )
            .map_err(KgError::from)
        })?;

        self.invalidate(owner_id, profile_id);
        Ok(KgRelationship {
            id,
            owner_id,
            profile_id,
            source_id: rel.source_id,
            target_id: rel.target_id,
            relationship_type: rel.relationship_type,
            cardinality: rel.cardinality.clone(),
            metadata: rel.metadata.clone(),
            source: rel.source.clone(),
        })
    }

    /// Relationships touching an entity, filtered by direction.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    pub fn get_relationships(
        &self,
        owner_id: OwnerId,
        profile_id: ProfileId,
        entity_id: i64,
        direction: RelDirection,
    ) -> KgResult<Vec<KgRelationship>> {
        let clause = match direction {
            RelDirection::Outgoing => "source_entity_id = ?3",
            RelDirection::Incoming => "target_entity_id = ?3",
            RelDirection::Both => "(source_entity_id = ?3 OR target_entity_id = ?3)",
        };
        let sql = format!(
            "SELECT id, source_entity_id, target_entity_id, relationship_type,
                    cardinality, metadata_json, source
             FROM kg_relationships
             WHERE owner_id = ?1 AND profile_id = ?2 AND {clause}
             ORDER BY id"
        );
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(
                params![owner_id.to_string(), profile_id.to_string(), entity_id],
                |row| Ok(row_to_relationship(row, owner_id, profile_id)),
            )?;
            rows.map(|r| r.map_err(KgError::from).and_then(|inner| inner))
                .collect()
        })
    }

    /// All relationships in a scope, optionally filtered by type.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    pub fn list_relationships(
        &self,
        owner_id: OwnerId,
        profile_id: ProfileId,
        relationship_type: Option<RelationshipType>,
    ) -> KgResult<Vec<KgRelationship>> {
        self.with_conn(|conn| {
            let mut collect = |stmt: &mut rusqlite::Statement<'_>,
                               params: &[&dyn rusqlite::ToSql]|
             -> KgResult<Vec<KgRelationship>> {
                let rows =
                    stmt.query_map(params, |row| Ok(row_to_relationship(row, owner_id, profile_id)))?;
                rows.map(|r| r.map_err(KgError::from).and_then(|inner| inner))
                    .collect()
            };
            match relationship_type {
                Some(t) => {
                    let mut stmt = conn.prepare(
                        "SELECT id, source_entity_id, target_entity_id, relationship_type,
                                cardinality, metadata_json, source
                         FROM kg_relationships
                         WHERE owner_id = ?1 AND profile_id = ?2 AND relationship_type = ?3
                         ORDER BY id",
                    )?;
                    collect(
                        &mut stmt,
                        &[&owner_id.to_string(), &profile_id.to_string(), &t.as_str()],
                    )
                },
                None => {
                    let mut stmt = conn.prepare(
                        "SELECT id, source_entity_id, target_entity_id, relationship_type,
                                cardinality, metadata_json, source
                         FROM kg_relationships
                         WHERE owner_id = ?1 AND profile_id = ?2
                         ORDER BY id",
                    )?;
                    collect(&mut stmt, &[&owner_id.to_string(), &profile_id.to_string()])
                },
            }
        })
    }

    /// Delete one relationship.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    pub fn delete_relationship(
        &self,
        owner_id: OwnerId,
        profile_id: ProfileId,
        id: i64,
    ) -> KgResult<bool> {
        let deleted = self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM kg_relationships
                 WHERE id = ?1 AND owner_id = ?2 AND profile_id = ?3",
                params![id, owner_id.to_string(), profile_id.to_string()],
            )
            .map_err(KgError::from)
        })?;
        if deleted > 0 {
            self.invalidate(owner_id, profile_id);
        }
        Ok(deleted > 0)
    }

    /// Bulk import: upsert every entity, then resolve relationship
    /// endpoints by name. Relationships naming unknown entities are
    /// skipped and counted, not fatal.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    pub fn import_bulk(
        &self,
        owner_id: OwnerId,
        profile_id: ProfileId,
        entities: &[NewEntity],
        relationships: &[BulkRelationship],
    ) -> KgResult<ImportCounts> {
        let mut counts = ImportCounts::default();

        for entity in entities {
            self.add_entity(owner_id, profile_id, entity)?;
            counts.entities = counts.entities.saturating_add(1);
        }

        for rel in relationships {
            let source = self.get_entity_by_name(owner_id, profile_id, &rel.source_name, None)?;
            let target = self.get_entity_by_name(owner_id, profile_id, &rel.target_name, None)?;
            match (source, target) {
                (Some(source), Some(target)) => {
                    self.add_relationship(
                        owner_id,
                        profile_id,
                        &NewRelationship {
                            source_id: source.id,
                            target_id: target.id,
                            relationship_type: rel.relationship_type,
                            cardinality: rel.cardinality.clone(),
                            metadata: rel.metadata.clone(),
                            source: rel.source.clone(),
                        },
                    )?;
                    counts.relationships = counts.relationships.saturating_add(1);
                },
                _ => {
                    warn!(
                        source = %rel.source_name,
                        target = %rel.target_name,
                        "Skipping bulk relationship with unknown endpoint"
                    );
                    counts.skipped_relationships = counts.skipped_relationships.saturating_add(1);
                },
            }
        }

        Ok(counts)
    }

    /// Remove every entity and relationship in a scope. Returns
    /// (entities, relationships) removed.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    pub fn clear_graph(
        &self,
        owner_id: OwnerId,
        profile_id: ProfileId,
    ) -> KgResult<(usize, usize)> {
        let result = self.with_conn(|conn| {
            let rels = conn.execute(
                "DELETE FROM kg_relationships WHERE owner_id = ?1 AND profile_id = ?2",
                params![owner_id.to_string(), profile_id.to_string()],
            )?;
            let entities = conn.execute(
                "DELETE FROM kg_entities WHERE owner_id = ?1 AND profile_id = ?2",
                params![owner_id.to_string(), profile_id.to_string()],
            )?;
            Ok((entities, rels))
        })?;
        self.invalidate(owner_id, profile_id);
        Ok(result)
    }

    /// Graph statistics for a scope.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    pub fn stats(&self, owner_id: OwnerId, profile_id: ProfileId) -> KgResult<GraphStats> {
        let graph = self.graph(owner_id, profile_id)?;

        let mut entities_by_type: HashMap<String, usize> = HashMap::new();
        for node in graph.nodes() {
            let entry = entities_by_type
                .entry(node.entity_type.as_str().to_string())
                .or_insert(0);
            *entry = entry.saturating_add(1);
        }

        let centrality = graph.degree_centrality();
        let mut top: Vec<(i64, String, f64)> = centrality
            .into_iter()
            .filter_map(|(id, score)| graph.node(id).map(|n| (id, n.name.clone(), score)))
            .collect();
        top.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));
        top.truncate(10);

        Ok(GraphStats {
            entity_count: graph.node_count(),
            relationship_count: graph.edge_count(),
            entities_by_type,
            connected_components: graph.connected_components(),
            has_cycles: graph.has_cycles(),
            top_central_entities: top,
        })
    }

    /// Adaptive extraction returning a fully-resolved subgraph.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    pub fn extract_adaptive(
        &self,
        owner_id: OwnerId,
        profile_id: ProfileId,
        seed_ids: &[i64],
        query_matched: Option<&[i64]>,
        max_nodes: usize,
    ) -> KgResult<Subgraph> {
        let graph = self.graph(owner_id, profile_id)?;
        let ids = extract_subgraph_adaptive(&graph, seed_ids, query_matched, max_nodes);
        if ids.is_empty() {
            return Ok(Subgraph::default());
        }

        let mut entities: Vec<KgEntity> = self
            .list_entities(owner_id, profile_id, None, usize::MAX)?
            .into_iter()
            .filter(|e| ids.contains(&e.id))
            .collect();
        entities.sort_by_key(|e| e.id);

        let names: HashMap<i64, String> =
            entities.iter().map(|e| (e.id, e.name.clone())).collect();
        let relationships = graph
            .edges_within(&ids)
            .into_iter()
            .map(|(source_id, target_id, edge)| SubgraphRelationship {
                source_id,
                target_id,
                source_name: names.get(&source_id).cloned().unwrap_or_default(),
                target_name: names.get(&target_id).cloned().unwrap_or_default(),
                relationship_type: edge.relationship_type,
                cardinality: edge.cardinality.clone(),
                metadata: edge.metadata.clone(),
            })
            .collect();

        Ok(Subgraph {
            entities,
            relationships,
        })
    }

    /// Extract and render planner context for a query's seed entities.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    pub fn planner_context(
        &self,
        owner_id: OwnerId,
        profile_id: ProfileId,
        seed_ids: &[i64],
        query_matched: Option<&[i64]>,
        max_nodes: usize,
    ) -> KgResult<String> {
        let subgraph =
            self.extract_adaptive(owner_id, profile_id, seed_ids, query_matched, max_nodes)?;
        Ok(format_subgraph_for_prompt(&subgraph))
    }

    /// Per-profile graph inventory for an owner:
    /// (profile, entities, relationships).
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    pub fn list_all_graphs(&self, owner_id: OwnerId) -> KgResult<Vec<(ProfileId, usize, usize)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT e.profile_id, COUNT(DISTINCT e.id),
                        (SELECT COUNT(*) FROM kg_relationships r
                         WHERE r.owner_id = e.owner_id AND r.profile_id = e.profile_id)
                 FROM kg_entities e
                 WHERE e.owner_id = ?1
                 GROUP BY e.profile_id",
            )?;
            let rows = stmt.query_map(params![owner_id.to_string()], |row| {
                let profile: String = row.get(0)?;
                let entities: i64 = row.get(1)?;
                let rels: i64 = row.get(2)?;
                Ok((profile, entities, rels))
            })?;
            rows.map(|r| {
                let (profile, entities, rels) = r?;
                let profile_id = ProfileId::parse(&profile)
                    .map_err(|e| KgError::Corrupt(format!("profile_id: {e}")))?;
                Ok((
                    profile_id,
                    usize::try_from(entities).unwrap_or(0),
                    usize::try_from(rels).unwrap_or(0),
                ))
            })
            .collect()
        })
    }
}

impl std::fmt::Debug for KgStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KgStore").finish_non_exhaustive()
    }
}

fn row_to_entity(
    row: &rusqlite::Row<'_>,
    owner_id: OwnerId,
    profile_id: ProfileId,
) -> KgResult<KgEntity> {
    let properties_json: String = row.get(3).map_err(KgError::from)?;
    let created: String = row.get(5).map_err(KgError::from)?;
    let updated: String = row.get(6).map_err(KgError::from)?;
    let entity_type: String = row.get(2).map_err(KgError::from)?;
    Ok(KgEntity {
        id: row.get(0).map_err(KgError::from)?,
        owner_id,
        profile_id,
        name: row.get(1).map_err(KgError::from)?,
        entity_type: EntityType::parse(&entity_type)?,
        properties: serde_json::from_str(&properties_json)
            .map_err(|e| KgError::Corrupt(format!("properties_json: {e}")))?,
        source: row.get(4).map_err(KgError::from)?,
        created_at: parse_ts(&created),
        updated_at: parse_ts(&updated),
    })
}

fn row_to_relationship(
    row: &rusqlite::Row<'_>,
    owner_id: OwnerId,
    profile_id: ProfileId,
) -> KgResult<KgRelationship> {
    let relationship_type: String = row.get(3).map_err(KgError::from)?;
    let metadata_json: String = row.get(5).map_err(KgError::from)?;
    Ok(KgRelationship {
        id: row.get(0).map_err(KgError::from)?,
        owner_id,
        profile_id,
        source_id: row.get(1).map_err(KgError::from)?,
        target_id: row.get(2).map_err(KgError::from)?,
        relationship_type: RelationshipType::parse(&relationship_type)?,
        cardinality: row.get(4).map_err(KgError::from)?,
        metadata: serde_json::from_str(&metadata_json)
            .map_err(|e| KgError::Corrupt(format!("metadata_json: {e}")))?,
        source: row.get(6).map_err(KgError::from)?,
    })
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> (KgStore, OwnerId, ProfileId) {
        (KgStore::in_memory().unwrap(), OwnerId::new(), ProfileId::new())
    }

    fn new_entity(name: &str, t: EntityType, props: Value) -> NewEntity {
        NewEntity {
            name: name.to_string(),
            entity_type: t,
            properties: props,
            source: "test".to_string(),
        }
    }

    #[test]
    fn test_entity_upsert_merges_properties() {
        let (store, owner, profile) = scope();
        let first = store
            .add_entity(
                owner,
                profile,
                &new_entity("orders", EntityType::Table, serde_json::json!({"a": 1})),
            )
            .unwrap();
        let second = store
            .add_entity(
                owner,
                profile,
                &new_entity("orders", EntityType::Table, serde_json::json!({"b": 2})),
            )
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.properties["a"], 1);
        assert_eq!(second.properties["b"], 2);
    }

    #[test]
    fn test_same_name_different_type_is_distinct() {
        let (store, owner, profile) = scope();
        let table = store
            .add_entity(owner, profile, &new_entity("orders", EntityType::Table, serde_json::json!({})))
            .unwrap();
        let concept = store
            .add_entity(
                owner,
                profile,
                &new_entity("orders", EntityType::BusinessConcept, serde_json::json!({})),
            )
            .unwrap();
        assert_ne!(table.id, concept.id);
    }

    #[test]
    fn test_relationship_requires_endpoints() {
        let (store, owner, profile) = scope();
        let result = store.add_relationship(
            owner,
            profile,
            &NewRelationship {
                source_id: 1,
                target_id: 2,
                relationship_type: RelationshipType::Contains,
                cardinality: None,
                metadata: serde_json::json!({}),
                source: "test".to_string(),
            },
        );
        assert!(matches!(result, Err(KgError::NotFound { .. })));
    }

    #[test]
    fn test_delete_entity_cascades() {
        let (store, owner, profile) = scope();
        let a = store
            .add_entity(owner, profile, &new_entity("a", EntityType::Table, serde_json::json!({})))
            .unwrap();
        let b = store
            .add_entity(owner, profile, &new_entity("b", EntityType::Table, serde_json::json!({})))
            .unwrap();
        store
            .add_relationship(
                owner,
                profile,
                &NewRelationship {
                    source_id: a.id,
                    target_id: b.id,
                    relationship_type: RelationshipType::ForeignKey,
                    cardinality: None,
                    metadata: serde_json::json!({}),
                    source: "test".to_string(),
                },
            )
            .unwrap();

        assert!(store.delete_entity(owner, profile, a.id).unwrap());
        assert!(store.list_relationships(owner, profile, None).unwrap().is_empty());
    }

    #[test]
    fn test_owner_isolation() {
        let (store, owner, profile) = scope();
        let other_owner = OwnerId::new();
        store
            .add_entity(owner, profile, &new_entity("orders", EntityType::Table, serde_json::json!({})))
            .unwrap();
        assert!(store
            .list_entities(other_owner, profile, None, 100)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_cache_invalidated_on_write() {
        let (store, owner, profile) = scope();
        store
            .add_entity(owner, profile, &new_entity("a", EntityType::Table, serde_json::json!({})))
            .unwrap();
        let g1 = store.graph(owner, profile).unwrap();
        assert_eq!(g1.node_count(), 1);

        store
            .add_entity(owner, profile, &new_entity("b", EntityType::Table, serde_json::json!({})))
            .unwrap();
        let g2 = store.graph(owner, profile).unwrap();
        assert_eq!(g2.node_count(), 2);
    }

    #[test]
    fn test_bulk_import_resolves_names() {
        let (store, owner, profile) = scope();
        let counts = store
            .import_bulk(
                owner,
                profile,
                &[
                    new_entity("retail", EntityType::Database, serde_json::json!({})),
                    new_entity("orders", EntityType::Table, serde_json::json!({})),
                ],
                &[
                    BulkRelationship {
                        source_name: "retail".to_string(),
                        target_name: "orders".to_string(),
                        relationship_type: RelationshipType::Contains,
                        cardinality: None,
                        metadata: serde_json::json!({}),
                        source: "test".to_string(),
                    },
                    BulkRelationship {
                        source_name: "retail".to_string(),
                        target_name: "ghost".to_string(),
                        relationship_type: RelationshipType::Contains,
                        cardinality: None,
                        metadata: serde_json::json!({}),
                        source: "test".to_string(),
                    },
                ],
            )
            .unwrap();

        assert_eq!(counts.entities, 2);
        assert_eq!(counts.relationships, 1);
        assert_eq!(counts.skipped_relationships, 1);
    }

    #[test]
    fn test_search_matches_name_and_properties() {
        let (store, owner, profile) = scope();
        store
            .add_entity(
                owner,
                profile,
                &new_entity(
                    "orders",
                    EntityType::Table,
                    serde_json::json!({"description": "customer purchases"}),
                ),
            )
            .unwrap();

        assert_eq!(store.search_entities(owner, profile, "ORD", 10).unwrap().len(), 1);
        assert_eq!(
            store
                .search_entities(owner, profile, "purchases", 10)
                .unwrap()
                .len(),
            1
        );
        assert!(store.search_entities(owner, profile, "zzz", 10).unwrap().is_empty());
    }

    #[test]
    fn test_stats() {
        let (store, owner, profile) = scope();
        let a = store
            .add_entity(owner, profile, &new_entity("a", EntityType::Table, serde_json::json!({})))
            .unwrap();
        let b = store
            .add_entity(owner, profile, &new_entity("b", EntityType::Column, serde_json::json!({})))
            .unwrap();
        store
            .add_relationship(
                owner,
                profile,
                &NewRelationship {
                    source_id: a.id,
                    target_id: b.id,
                    relationship_type: RelationshipType::Contains,
                    cardinality: None,
                    metadata: serde_json::json!({}),
                    source: "test".to_string(),
                },
            )
            .unwrap();

        let stats = store.stats(owner, profile).unwrap();
        assert_eq!(stats.entity_count, 2);
        assert_eq!(stats.relationship_count, 1);
        assert_eq!(stats.entities_by_type["table"], 1);
        assert_eq!(stats.connected_components, 1);
        assert!(!stats.has_cycles);
    }

    #[test]
    fn test_end_to_end_extraction_and_rendering() {
        let (store, owner, profile) = scope();
        let counts = store
            .import_bulk(
                owner,
                profile,
                &[
                    new_entity("retail", EntityType::Database, serde_json::json!({})),
                    new_entity("orders", EntityType::Table, serde_json::json!({})),
                    new_entity("customers", EntityType::Table, serde_json::json!({})),
                    new_entity(
                        "customer_id",
                        EntityType::Column,
                        serde_json::json!({"data_type": "INTEGER"}),
                    ),
                ],
                &[
                    BulkRelationship {
                        source_name: "retail".to_string(),
                        target_name: "orders".to_string(),
                        relationship_type: RelationshipType::Contains,
                        cardinality: None,
                        metadata: serde_json::json!({}),
                        source: "test".to_string(),
                    },
                    BulkRelationship {
                        source_name: "orders".to_string(),
                        target_name: "customer_id".to_string(),
                        relationship_type: RelationshipType::Contains,
                        cardinality: None,
                        metadata: serde_json::json!({}),
                        source: "test".to_string(),
                    },
                ],
            )
            .unwrap();
        assert_eq!(counts.entities, 4);

        let orders = store
            .get_entity_by_name(owner, profile, "orders", Some(EntityType::Table))
            .unwrap()
            .unwrap();
        let text = store
            .planner_context(owner, profile, &[orders.id], None, 50)
            .unwrap();
        assert!(text.contains("--- KNOWLEDGE GRAPH CONTEXT ---"));
        assert!(text.contains("retail.orders: customer_id(INTEGER)"));
    }
}
