//! In-memory capability graph for tests and single-process assembly

use std::collections::{HashSet, VecDeque};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde_json::Value;
use uuid::Uuid;

use super::{
    CapabilityError, EntityEvent, EntityGraph, GraphCapability, GraphEdge, GraphPath, Relationship,
};

#[derive(Default)]
struct Inner {
    relationships: Vec<Relationship>,
    events: Vec<EntityEvent>,
}

/// In-memory [`GraphCapability`] implementation
///
/// Stores relationships and published events in process memory. Traversals
/// are breadth-first, depth-bounded and visited-set guarded, so cyclic
/// entity graphs terminate.
#[derive(Default)]
pub struct MemoryGraph {
    inner: RwLock<Inner>,
}

impl MemoryGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Published events, in publication order (for assertions)
    pub fn events(&self) -> Vec<EntityEvent> {
        self.inner.read().events.clone()
    }

    /// Number of stored relationships
    pub fn relationship_count(&self) -> usize {
        self.inner.read().relationships.len()
    }
}

#[async_trait]
impl GraphCapability for MemoryGraph {
    async fn create_relationship(
        &self,
        parent_id: i64,
        child_id: i64,
        kind: &str,
        metadata: Value,
    ) -> Result<Uuid, CapabilityError> {
        if kind.is_empty() {
            return Err(CapabilityError::InvalidArgument(
                "relationship type must not be empty".to_string(),
            ));
        }

        let id = Uuid::now_v7();
        self.inner.write().relationships.push(Relationship {
            id,
            parent_id,
            child_id,
            kind: kind.to_string(),
            metadata,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn list_relationships(
        &self,
        master_id: i64,
        kind: &str,
    ) -> Result<Vec<Relationship>, CapabilityError> {
        Ok(self
            .inner
            .read()
            .relationships
            .iter()
            .filter(|r| r.parent_id == master_id && r.kind == kind)
            .cloned()
            .collect())
    }

    async fn publish_event(&self, event: EntityEvent) -> Result<(), CapabilityError> {
        self.inner.write().events.push(event);
        Ok(())
    }

    async fn get_entity_graph(
        &self,
        master_id: i64,
        depth: u32,
    ) -> Result<EntityGraph, CapabilityError> {
        let inner = self.inner.read();

        let mut nodes = vec![master_id];
        let mut edges = Vec::new();
        let mut visited: HashSet<i64> = HashSet::from([master_id]);
        let mut frontier = VecDeque::from([(master_id, 0u32)]);

        while let Some((node, hops)) = frontier.pop_front() {
            if hops >= depth {
                continue;
            }
            for rel in inner.relationships.iter().filter(|r| r.parent_id == node) {
                edges.push(GraphEdge {
                    from: rel.parent_id,
                    to: rel.child_id,
                    kind: rel.kind.clone(),
                });
                if visited.insert(rel.child_id) {
                    nodes.push(rel.child_id);
                    frontier.push_back((rel.child_id, hops + 1));
                }
            }
        }

        Ok(EntityGraph {
            root: master_id,
            nodes,
            edges,
        })
    }

    async fn find_path(&self, from_id: i64, to_id: i64) -> Result<GraphPath, CapabilityError> {
        if from_id == to_id {
            return Ok(GraphPath {
                nodes: vec![from_id],
            });
        }

        let inner = self.inner.read();
        let mut visited: HashSet<i64> = HashSet::from([from_id]);
        let mut frontier = VecDeque::from([vec![from_id]]);

        while let Some(path) = frontier.pop_front() {
            let tail = *path.last().unwrap_or(&from_id);
            for rel in inner.relationships.iter().filter(|r| r.parent_id == tail) {
                if rel.child_id == to_id {
                    let mut found = path.clone();
                    found.push(to_id);
                    return Ok(GraphPath { nodes: found });
                }
                if visited.insert(rel.child_id) {
                    let mut next = path.clone();
                    next.push(rel.child_id);
                    frontier.push_back(next);
                }
            }
        }

        Err(CapabilityError::NotFound(format!(
            "no path from {from_id} to {to_id}"
        )))
    }
}
