//! Strata KG - per-profile knowledge graph.
//!
//! Two layers back the graph:
//!
//! - A durable SQLite store of typed entities and relationships,
//!   keyed by (owner, profile), with natural-key upserts.
//! - A lazily materialized in-memory directed graph (petgraph),
//!   cached until any write to the backing store invalidates it.
//!
//! On top of these sit the graph algorithms the planner uses:
//! statistics, shortest paths, ancestors/descendants, the adaptive
//! subgraph extraction that bounds what a query drags into context,
//! and the fixed-format text rendering injected into LLM prompts.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod error;
pub mod extract;
pub mod graph;
pub mod model;
pub mod render;
pub mod store;

pub use error::{KgError, KgResult};
pub use extract::extract_subgraph_adaptive;
pub use graph::MemGraph;
pub use model::{
    BulkRelationship, EntityType, GraphStats, ImportCounts, KgEntity, KgRelationship, NewEntity,
    NewRelationship, RelationshipType, Subgraph, SubgraphRelationship,
};
pub use render::format_subgraph_for_prompt;
pub use store::{KgStore, RelDirection};
