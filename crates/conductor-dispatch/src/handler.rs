//! Task handler port
//!
//! One handler per task kind. `process` runs under the dispatcher's
//! per-task deadline; `cleanup` runs exactly once during graceful drain
//! (temp files, browser processes, pooled clients).

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::task::Task;

/// Per-invocation context handed to a handler
#[derive(Debug, Clone)]
pub struct TaskContext {
    cancel: CancellationToken,
}

impl TaskContext {
    pub(crate) fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    /// Whether cancellation has been requested for this task
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves when cancellation is requested; long-running handlers
    /// should race their work against this.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}

/// What a successful handler run produced
#[derive(Debug, Clone, Default)]
pub struct TaskOutput {
    /// Extracted payload
    pub payload: Value,

    /// Extracted links
    pub links: Vec<String>,

    /// Handler-specific metadata carried onto the result row
    pub metadata: Map<String, Value>,
}

impl TaskOutput {
    /// An output carrying just a payload
    pub fn payload(payload: Value) -> Self {
        Self {
            payload,
            links: Vec::new(),
            metadata: Map::new(),
        }
    }

    /// Attach extracted links
    pub fn with_links(mut self, links: Vec<String>) -> Self {
        self.links = links;
        self
    }
}

/// Type-specific worker logic
///
/// Errors become failed results carrying the message; the dispatcher owns
/// delivery, timeouts and persistence.
#[async_trait]
pub trait TaskHandler: Send + Sync + 'static {
    /// Process one task
    async fn process(&self, ctx: &TaskContext, task: &Task) -> Result<TaskOutput, String>;

    /// Release resources held across tasks; called once at drain
    async fn cleanup(&self) {}
}
