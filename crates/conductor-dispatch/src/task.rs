//! Task and result model
//!
//! A task is one unit of typed crawl-shaped work: a target descriptor, a
//! depth budget and a filter list, linked back to a master record. Status
//! moves monotonically pending → processing → completed|failed; exactly one
//! result row exists per task id and redelivery upserts it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// The enumerated kinds of work the dispatcher routes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Fetch and extract a web page
    Web,

    /// Call a structured API endpoint
    Api,

    /// Expand a sitemap into further targets
    Sitemap,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::Api => "api",
            Self::Sitemap => "sitemap",
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Whether this status ends the lifecycle
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// One unit of typed work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,

    #[serde(rename = "type")]
    pub kind: TaskKind,

    /// What to work on (URL, endpoint, resource locator)
    pub target: String,

    /// Traversal depth budget
    #[serde(default)]
    pub depth: u32,

    /// Content/link filters applied by the handler
    #[serde(default)]
    pub filters: Vec<String>,

    pub status: TaskStatus,

    #[serde(default)]
    pub metadata: Map<String, Value>,

    /// Correlation key back to the owning master record
    pub master_id: i64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// A fresh pending task
    pub fn new(kind: TaskKind, target: &str, master_id: i64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            kind,
            target: target.to_string(),
            depth: 0,
            filters: Vec::new(),
            status: TaskStatus::Pending,
            metadata: Map::new(),
            master_id,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the depth budget
    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    /// Set the filter list
    pub fn with_filters(mut self, filters: Vec<String>) -> Self {
        self.filters = filters;
        self
    }

    /// Attach opaque metadata
    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// What a handler produced for one task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub id: Uuid,

    pub task_id: Uuid,

    pub status: TaskStatus,

    /// Extracted payload
    #[serde(default)]
    pub payload: Value,

    /// Extracted links, if any
    #[serde(default)]
    pub links: Vec<String>,

    /// Failure reason when status is failed
    #[serde(default)]
    pub error: Option<String>,

    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl TaskResult {
    /// A successful result
    pub fn completed(task_id: Uuid, payload: Value, links: Vec<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            task_id,
            status: TaskStatus::Completed,
            payload,
            links,
            error: None,
            metadata: Map::new(),
        }
    }

    /// A failed result carrying the reason
    pub fn failed(task_id: Uuid, error: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            task_id,
            status: TaskStatus::Failed,
            payload: Value::Null,
            links: Vec::new(),
            error: Some(error.into()),
            metadata: Map::new(),
        }
    }
}
