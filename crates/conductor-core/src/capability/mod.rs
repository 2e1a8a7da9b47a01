//! Capability graph port
//!
//! The narrow interface the action registry calls into: relationships,
//! event publication, entity-graph reads and path finding. Domain services
//! provide an implementation at assembly time; [`MemoryGraph`] ships for
//! tests and single-process use.

mod builtin;
mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub use builtin::register_graph_actions;
pub use memory::MemoryGraph;

/// Error type for capability calls
#[derive(Debug, thiserror::Error)]
pub enum CapabilityError {
    /// Entity or path does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed request
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Provider-side failure
    #[error("capability backend error: {0}")]
    Backend(String),
}

/// A typed edge between two entities
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub id: Uuid,
    pub parent_id: i64,
    pub child_id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

/// A domain event anchored to a master record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityEvent {
    pub id: Uuid,
    pub master_id: i64,
    pub entity_type: String,
    pub event_type: String,
    pub payload: Value,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// One edge of a fetched subgraph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from: i64,
    pub to: i64,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Depth-bounded subgraph rooted at a master record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityGraph {
    pub root: i64,
    pub nodes: Vec<i64>,
    pub edges: Vec<GraphEdge>,
}

/// Shortest-hop path between two entities
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphPath {
    pub nodes: Vec<i64>,
}

/// Port into the graph-of-entities store
///
/// Entity graphs can contain cycles; implementations must keep traversal
/// depth-bounded and visited-set guarded.
#[async_trait]
pub trait GraphCapability: Send + Sync + 'static {
    /// Create a typed relationship, returning its id
    async fn create_relationship(
        &self,
        parent_id: i64,
        child_id: i64,
        kind: &str,
        metadata: Value,
    ) -> Result<Uuid, CapabilityError>;

    /// Relationships of a given type radiating from a master record
    async fn list_relationships(
        &self,
        master_id: i64,
        kind: &str,
    ) -> Result<Vec<Relationship>, CapabilityError>;

    /// Publish a domain event
    async fn publish_event(&self, event: EntityEvent) -> Result<(), CapabilityError>;

    /// Fetch the subgraph reachable from `master_id` within `depth` hops
    async fn get_entity_graph(
        &self,
        master_id: i64,
        depth: u32,
    ) -> Result<EntityGraph, CapabilityError>;

    /// Shortest-hop path from one entity to another
    async fn find_path(&self, from_id: i64, to_id: i64) -> Result<GraphPath, CapabilityError>;
}
