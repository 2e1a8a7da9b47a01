//! Operation pattern model
//!
//! A pattern is a named, versioned DAG of steps executed against the action
//! registry. Records serialize as self-describing documents; step timeouts
//! use the human-readable duration form (`"5s"`).

mod store;
mod validate;

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use store::{PatternFilter, PatternStore};
pub use validate::{validate, ValidationError};

/// Who authored a pattern
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternOrigin {
    #[default]
    System,
    User,
}

impl PatternOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
        }
    }
}

impl std::fmt::Display for PatternOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step inside a pattern
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Registry bucket the action lives in
    #[serde(rename = "type")]
    pub step_type: String,

    /// Action name, unique within the pattern
    pub action: String,

    /// The step's own parameter mapping (the `static` source)
    #[serde(default)]
    pub parameters: Map<String, Value>,

    /// Action names this step waits for, all listed earlier in the pattern
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Retry budget; 0 means the first failure is final
    #[serde(default)]
    pub retries: u32,

    /// Per-attempt deadline, e.g. "5s"
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Step {
    /// A step with no parameters, dependencies or retries
    pub fn new(step_type: &str, action: &str, timeout: Duration) -> Self {
        Self {
            step_type: step_type.to_string(),
            action: action.to_string(),
            parameters: Map::new(),
            depends_on: Vec::new(),
            retries: 0,
            timeout,
        }
    }

    /// Set static parameters
    pub fn with_parameters(mut self, parameters: Map<String, Value>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Declare dependencies on earlier steps
    pub fn with_depends_on(mut self, depends_on: Vec<String>) -> Self {
        self.depends_on = depends_on;
        self
    }

    /// Set the retry budget
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }
}

/// A named, versioned DAG of steps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    /// Generated (UUID v7) when left empty at store time
    #[serde(default)]
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Bumped by the store on every update
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub origin: PatternOrigin,

    /// Free-form tag used for the category index
    #[serde(default)]
    pub category: String,

    pub steps: Vec<Step>,

    #[serde(default)]
    pub metadata: Map<String, Value>,

    #[serde(default)]
    pub created_by: String,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,

    #[serde(default = "default_true")]
    pub is_active: bool,

    /// Completed executions observed so far
    #[serde(default)]
    pub usage_count: u64,

    /// Streaming mean of execution outcomes, in [0, 1]
    #[serde(default)]
    pub success_rate: f64,
}

fn default_version() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

impl Pattern {
    /// A fresh, unstored pattern
    pub fn new(name: &str, steps: Vec<Step>) -> Self {
        Self {
            id: String::new(),
            name: name.to_string(),
            description: String::new(),
            version: 1,
            origin: PatternOrigin::System,
            category: String::new(),
            steps,
            metadata: Map::new(),
            created_by: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            is_active: true,
            usage_count: 0,
            success_rate: 0.0,
        }
    }

    /// Set the category tag
    pub fn with_category(mut self, category: &str) -> Self {
        self.category = category.to_string();
        self
    }

    /// Mark as user-authored
    pub fn with_author(mut self, author: &str) -> Self {
        self.origin = PatternOrigin::User;
        self.created_by = author.to_string();
        self
    }

    /// Set the description
    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    /// Find a step by action name
    pub fn step(&self, action: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.action == action)
    }
}
