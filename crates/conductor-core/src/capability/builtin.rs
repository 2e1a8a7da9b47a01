//! Built-in action buckets over the capability graph port
//!
//! Three buckets ship with the core: `relationship` (create, list), `event`
//! (publish) and `graph` (fetch_subgraph, find_path). Each declares its
//! parameter schema; the invokers close over the shared port handle.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::action::{
    ActionEntry, ActionError, ActionRegistry, ParamMap, ParameterDefinition, ParameterSource,
    ValueKind,
};

use super::{CapabilityError, EntityEvent, GraphCapability};

/// Default traversal depth when a graph step doesn't pin one
const DEFAULT_GRAPH_DEPTH: u32 = 3;

impl From<CapabilityError> for ActionError {
    fn from(err: CapabilityError) -> Self {
        match err {
            CapabilityError::Backend(msg) => ActionError::retryable(msg),
            other => ActionError::non_retryable(other.to_string()),
        }
    }
}

fn require_i64(params: &ParamMap, name: &str) -> Result<i64, ActionError> {
    params
        .get(name)
        .and_then(Value::as_i64)
        .ok_or_else(|| ActionError::non_retryable(format!("parameter \"{name}\" absent at invoke")))
}

fn require_str(params: &ParamMap, name: &str) -> Result<String, ActionError> {
    params
        .get(name)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ActionError::non_retryable(format!("parameter \"{name}\" absent at invoke")))
}

fn optional_object(params: &ParamMap, name: &str) -> Value {
    params.get(name).cloned().unwrap_or_else(|| json!({}))
}

/// Register the built-in `relationship`, `event` and `graph` buckets.
pub fn register_graph_actions(registry: &ActionRegistry, graph: Arc<dyn GraphCapability>) {
    let port = Arc::clone(&graph);
    registry.register(
        "relationship",
        "create",
        ActionEntry::new(
            vec![
                ParameterDefinition::required("parent_id", ParameterSource::Input, ValueKind::Integer),
                ParameterDefinition::required("child_id", ParameterSource::Input, ValueKind::Integer),
                ParameterDefinition::required("type", ParameterSource::Input, ValueKind::String),
                ParameterDefinition::optional("metadata", ParameterSource::Input, ValueKind::Object),
            ],
            move |params: ParamMap| {
                let port = Arc::clone(&port);
                async move {
                    let parent_id = require_i64(&params, "parent_id")?;
                    let child_id = require_i64(&params, "child_id")?;
                    let kind = require_str(&params, "type")?;
                    let metadata = optional_object(&params, "metadata");

                    let id = port
                        .create_relationship(parent_id, child_id, &kind, metadata)
                        .await?;
                    Ok(Value::String(id.to_string()))
                }
            },
        ),
    );

    let port = Arc::clone(&graph);
    registry.register(
        "relationship",
        "list",
        ActionEntry::new(
            vec![
                ParameterDefinition::required("master_id", ParameterSource::Input, ValueKind::Integer),
                ParameterDefinition::required("type", ParameterSource::Input, ValueKind::String),
            ],
            move |params: ParamMap| {
                let port = Arc::clone(&port);
                async move {
                    let master_id = require_i64(&params, "master_id")?;
                    let kind = require_str(&params, "type")?;

                    let relationships = port.list_relationships(master_id, &kind).await?;
                    serde_json::to_value(relationships)
                        .map_err(|e| ActionError::non_retryable(e.to_string()))
                }
            },
        ),
    );

    let port = Arc::clone(&graph);
    registry.register(
        "event",
        "publish",
        ActionEntry::new(
            vec![
                ParameterDefinition::required("master_id", ParameterSource::Input, ValueKind::Integer),
                ParameterDefinition::required("entity_type", ParameterSource::Input, ValueKind::String),
                ParameterDefinition::required("event_type", ParameterSource::Input, ValueKind::String),
                ParameterDefinition::optional("payload", ParameterSource::Input, ValueKind::Object),
            ],
            move |params: ParamMap| {
                let port = Arc::clone(&port);
                async move {
                    let event = EntityEvent {
                        id: Uuid::now_v7(),
                        master_id: require_i64(&params, "master_id")?,
                        entity_type: require_str(&params, "entity_type")?,
                        event_type: require_str(&params, "event_type")?,
                        payload: optional_object(&params, "payload"),
                        status: "published".to_string(),
                        created_at: Utc::now(),
                    };
                    let event_id = event.id;

                    port.publish_event(event).await?;
                    Ok(json!({"event_id": event_id.to_string(), "status": "ok"}))
                }
            },
        ),
    );

    let port = Arc::clone(&graph);
    registry.register(
        "graph",
        "fetch_subgraph",
        ActionEntry::new(
            vec![
                ParameterDefinition::required("master_id", ParameterSource::Input, ValueKind::Integer),
                ParameterDefinition::optional("depth", ParameterSource::Static, ValueKind::Integer),
            ],
            move |params: ParamMap| {
                let port = Arc::clone(&port);
                async move {
                    let master_id = require_i64(&params, "master_id")?;
                    let depth = params
                        .get("depth")
                        .and_then(Value::as_u64)
                        .map(|d| d as u32)
                        .unwrap_or(DEFAULT_GRAPH_DEPTH);

                    let graph = port.get_entity_graph(master_id, depth).await?;
                    serde_json::to_value(graph)
                        .map_err(|e| ActionError::non_retryable(e.to_string()))
                }
            },
        ),
    );

    let port = Arc::clone(&graph);
    registry.register(
        "graph",
        "find_path",
        ActionEntry::new(
            vec![
                ParameterDefinition::required("from_id", ParameterSource::Input, ValueKind::Integer),
                ParameterDefinition::required("to_id", ParameterSource::Input, ValueKind::Integer),
            ],
            move |params: ParamMap| {
                let port = Arc::clone(&port);
                async move {
                    let from_id = require_i64(&params, "from_id")?;
                    let to_id = require_i64(&params, "to_id")?;

                    let path = port.find_path(from_id, to_id).await?;
                    serde_json::to_value(path)
                        .map_err(|e| ActionError::non_retryable(e.to_string()))
                }
            },
        ),
    );
}
