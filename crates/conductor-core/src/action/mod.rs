//! Action registry
//!
//! A two-level lookup table keyed by `(step type, action)`. Each slot holds
//! the action's parameter schema together with its async invoker, so the
//! executor validates and coerces parameters in one place before dispatch.
//! Capabilities register at startup; there is no runtime code loading.

mod params;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{Map, Value};
use tracing::info;

use crate::error::CoreError;

pub use params::{resolve_parameters, ParameterDefinition, ParameterSource, ValueKind};

/// Resolved, coerced parameters handed to an invoker
pub type ParamMap = Map<String, Value>;

/// Error type for action invocations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionError {
    /// Error message
    pub message: String,

    /// Whether the executor may retry the step
    ///
    /// Non-retryable errors fail the step immediately regardless of its
    /// remaining retry budget.
    pub retryable: bool,
}

impl ActionError {
    /// Create a retryable error
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    /// Create a non-retryable error
    pub fn non_retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}

impl std::fmt::Display for ActionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ActionError {}

impl From<anyhow::Error> for ActionError {
    fn from(err: anyhow::Error) -> Self {
        Self::retryable(err.to_string())
    }
}

/// Future returned by an invoker
pub type ActionFuture = Pin<Box<dyn Future<Output = Result<Value, ActionError>> + Send>>;

/// Type-erased async invoker
type ActionInvoker = Box<dyn Fn(ParamMap) -> ActionFuture + Send + Sync>;

/// Parameter schema plus invoker for one action
pub struct ActionEntry {
    parameters: Vec<ParameterDefinition>,
    invoker: ActionInvoker,
}

impl ActionEntry {
    /// Create an entry from a parameter schema and an async closure
    pub fn new<F, Fut>(parameters: Vec<ParameterDefinition>, invoker: F) -> Self
    where
        F: Fn(ParamMap) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ActionError>> + Send + 'static,
    {
        Self {
            parameters,
            invoker: Box::new(move |params| Box::pin(invoker(params))),
        }
    }

    /// The declared parameter schema
    pub fn parameters(&self) -> &[ParameterDefinition] {
        &self.parameters
    }

    /// Validate and coerce parameters against this entry's schema
    pub fn resolve(
        &self,
        static_params: &Map<String, Value>,
        inputs: &Map<String, Value>,
    ) -> Result<ParamMap, CoreError> {
        resolve_parameters(&self.parameters, static_params, inputs)
    }

    /// Invoke the handler with already-resolved parameters
    pub async fn invoke(&self, params: ParamMap) -> Result<Value, ActionError> {
        (self.invoker)(params).await
    }
}

impl std::fmt::Debug for ActionEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionEntry")
            .field("parameters", &self.parameters)
            .finish()
    }
}

/// Registry of actions keyed by `(step type, action)`
///
/// Writes happen only at startup registration; lookups are concurrent.
#[derive(Default)]
pub struct ActionRegistry {
    buckets: RwLock<HashMap<String, HashMap<String, Arc<ActionEntry>>>>,
}

impl ActionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an action under a step-type bucket, replacing any previous
    /// entry for the same pair.
    pub fn register(&self, step_type: &str, action: &str, entry: ActionEntry) {
        let mut buckets = self.buckets.write();
        buckets
            .entry(step_type.to_string())
            .or_default()
            .insert(action.to_string(), Arc::new(entry));
        info!(step_type, action, "registered action");
    }

    /// Look up an action, or fail with the missing pair named.
    pub fn lookup(&self, step_type: &str, action: &str) -> Result<Arc<ActionEntry>, CoreError> {
        let buckets = self.buckets.read();
        buckets
            .get(step_type)
            .and_then(|bucket| bucket.get(action))
            .cloned()
            .ok_or_else(|| {
                CoreError::NotFound(format!("no capability for action {step_type}.{action}"))
            })
    }

    /// Whether the pair is registered
    pub fn contains(&self, step_type: &str, action: &str) -> bool {
        self.buckets
            .read()
            .get(step_type)
            .is_some_and(|bucket| bucket.contains_key(action))
    }

    /// Registered step-type bucket names
    pub fn step_types(&self) -> Vec<String> {
        self.buckets.read().keys().cloned().collect()
    }
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("step_types", &self.step_types())
            .finish()
    }
}
