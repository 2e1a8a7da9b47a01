//! Cache trait definition

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

/// Error type for cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Key (or hash field) is not present
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// A value could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The key holds a different shape than the operation expects
    /// (e.g. a set operation against a plain document)
    #[error("wrong kind for key {key}: {detail}")]
    WrongKind { key: String, detail: String },

    /// Backend round-trip failure
    #[error("cache backend error: {0}")]
    Backend(String),
}

impl CacheError {
    /// Whether this error means "the key simply isn't there"
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::KeyNotFound(_))
    }
}

/// A single command inside a pipelined batch
#[derive(Debug, Clone)]
pub enum PipelineCommand {
    /// Write a document (plain key when `field` is empty, hash field otherwise)
    Set {
        key: String,
        field: String,
        value: Value,
        ttl: Option<Duration>,
    },

    /// Read a document; a miss yields `PipelineReply::Document(None)`
    /// instead of failing the batch
    Get { key: String, field: String },

    /// Delete a key or hash field
    Delete { key: String, field: String },

    /// Add members to a set
    SetAdd { key: String, members: Vec<String> },

    /// Remove members from a set
    SetRemove { key: String, members: Vec<String> },
}

/// Reply for one pipelined command, in submission order
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineReply {
    /// Write/delete/set mutation acknowledged
    Done,

    /// Result of a `Get`; `None` on a miss
    Document(Option<Value>),
}

impl PipelineReply {
    /// Extract the document from a `Get` reply
    pub fn into_document(self) -> Option<Value> {
        match self {
            Self::Document(doc) => doc,
            Self::Done => None,
        }
    }
}

/// Shared key/value store with TTLs, hash fields, sets and pipelines
///
/// Implementations must be thread-safe and support concurrent access.
/// Values are self-describing JSON documents.
#[async_trait]
pub trait Cache: Send + Sync + 'static {
    /// Write a document under `key` (plain key when `field` is empty,
    /// hash field otherwise), with an optional TTL on the key.
    async fn set(
        &self,
        key: &str,
        field: &str,
        value: &Value,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError>;

    /// Read a document. A missing key or field is `CacheError::KeyNotFound`.
    async fn get(&self, key: &str, field: &str) -> Result<Value, CacheError>;

    /// Delete a key, or a single hash field when `field` is non-empty.
    /// Deleting something absent is not an error.
    async fn delete(&self, key: &str, field: &str) -> Result<(), CacheError>;

    /// Add members to the set at `key`, creating it if absent.
    async fn set_add(&self, key: &str, members: &[String]) -> Result<(), CacheError>;

    /// Remove members from the set at `key`. Absent keys/members are ignored.
    async fn set_remove(&self, key: &str, members: &[String]) -> Result<(), CacheError>;

    /// All members of the set at `key`; an absent set is empty.
    async fn set_members(&self, key: &str) -> Result<Vec<String>, CacheError>;

    /// Intersection of the sets at `keys`; any absent set makes it empty.
    async fn set_intersect(&self, keys: &[String]) -> Result<Vec<String>, CacheError>;

    /// Write `value` under `key` only when the key is absent. Returns whether
    /// the write happened. This is the primitive behind short-TTL locks.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &Value,
        ttl: Option<Duration>,
    ) -> Result<bool, CacheError>;

    /// Execute a batch of commands in order, returning one reply per command.
    ///
    /// Read misses inside a batch surface as `Document(None)` so one bad
    /// record cannot fail the whole batch.
    async fn pipeline(
        &self,
        commands: Vec<PipelineCommand>,
    ) -> Result<Vec<PipelineReply>, CacheError>;
}
