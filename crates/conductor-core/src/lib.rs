//! # Orchestration Core
//!
//! Turns declarative operation patterns — DAGs of typed steps against a
//! graph-of-entities store — into durable, resumable, partially-parallel
//! executions.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      PatternExecutor                         │
//! │  (dependency gating, retries, timeouts, durable resume)     │
//! └─────────────────────────────────────────────────────────────┘
//!            │                                   │
//!            ▼                                   ▼
//! ┌──────────────────────────┐      ┌──────────────────────────┐
//! │      ActionRegistry       │      │      shared Cache         │
//! │ (param schemas + invokers)│      │ (state, patterns, locks)  │
//! └──────────────────────────┘      └──────────────────────────┘
//!            │
//!            ▼
//! ┌──────────────────────────┐
//! │   GraphCapability port    │
//! │ (relationships, events,   │
//! │  entity graph, paths)     │
//! └──────────────────────────┘
//! ```
//!
//! Everything is explicitly constructed: the executor, store, registrar and
//! sink take their cache and registry as inputs, so assembly owns wiring
//! and there is no process-wide default instance.
//!
//! ## Example
//!
//! ```ignore
//! use conductor_core::prelude::*;
//!
//! let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());
//! let registry = Arc::new(ActionRegistry::new());
//! register_graph_actions(&registry, Arc::new(MemoryGraph::new()));
//!
//! let executor = PatternExecutor::new(cache, registry);
//! let id = executor.register(pattern)?;
//! let results = executor.execute(&id, "order-1234", input).await?;
//! ```

pub mod action;
pub mod capability;
pub mod dlq;
pub mod error;
pub mod executor;
pub mod pattern;
pub mod registrar;
pub mod state;

/// Prelude for common imports
pub mod prelude {
    pub use crate::action::{
        ActionEntry, ActionError, ActionRegistry, ParamMap, ParameterDefinition, ParameterSource,
        ValueKind,
    };
    pub use crate::capability::{register_graph_actions, GraphCapability, MemoryGraph};
    pub use crate::dlq::{DeadLetterRecord, DeadLetterSink};
    pub use crate::error::{CoreError, ErrorKind};
    pub use crate::executor::{ExecutorConfig, PatternExecutor};
    pub use crate::pattern::{Pattern, PatternFilter, PatternOrigin, PatternStore, Step};
    pub use crate::registrar::{EventCatalog, EventName, EventState, ServiceRegistrar};
    pub use crate::state::ExecutionState;
}

// Re-export key types at crate root
pub use action::{
    ActionEntry, ActionError, ActionRegistry, ParamMap, ParameterDefinition, ParameterSource,
    ValueKind,
};
pub use capability::{
    register_graph_actions, CapabilityError, EntityEvent, EntityGraph, GraphCapability, GraphEdge,
    GraphPath, MemoryGraph, Relationship,
};
pub use dlq::{DeadLetterRecord, DeadLetterSink};
pub use error::{CoreError, ErrorKind};
pub use executor::{ExecutorConfig, PatternExecutor};
pub use pattern::{validate, Pattern, PatternFilter, PatternOrigin, PatternStore, Step, ValidationError};
pub use registrar::{EventCatalog, EventName, EventState, RegistrarConfig, ServiceRegistrar};
pub use state::ExecutionState;
