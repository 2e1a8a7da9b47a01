//! Durable execution state
//!
//! Two maps keyed by step action name, persisted as one document under
//! `orchestration:state:<execution_id>`. `results` is seeded from the
//! caller's input bundle, so input keys and step results share a namespace
//! (validation keeps step actions off the reserved input keys). Readers
//! tolerate unknown keys so older cores can load newer documents.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Per-execution state: step results plus the replay guard
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionState {
    /// Caller input merged with each completed step's return value
    #[serde(default)]
    pub results: Map<String, Value>,

    /// Which steps have committed; the at-most-once replay guard
    #[serde(default)]
    pub completed: HashMap<String, bool>,
}

impl ExecutionState {
    /// Fresh state seeded from the caller's input bundle
    pub fn seeded(input: &Map<String, Value>) -> Self {
        Self {
            results: input.clone(),
            completed: HashMap::new(),
        }
    }

    /// Whether a step has committed in this execution
    pub fn is_completed(&self, action: &str) -> bool {
        self.completed.get(action).copied().unwrap_or(false)
    }
}
