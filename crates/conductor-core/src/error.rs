//! Error taxonomy for the orchestration core
//!
//! Classification happens at the boundary of the failing component; callers
//! get a stable kind plus a human-readable message. Retries live only at the
//! step level inside the executor, never across calls.

use conductor_cache::CacheError;

/// Stable classification of a core error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing/ill-typed parameter, unknown pattern id, malformed event name
    InvalidArgument,

    /// Pattern, execution, or capability lookup came up empty
    NotFound,

    /// Duplicate action name, dependency ordering violation, execution
    /// already in flight
    Conflict,

    /// Bounded resource (queue, pool) is full
    ResourceExhausted,

    /// A step, run, or drain deadline lapsed
    TimedOut,

    /// A completed step could not be persisted; non-retryable, the caller
    /// resumes with the same execution id once the cache is healthy
    StateCommitFailed,

    /// A capability handler returned an error after its retry budget
    HandlerFailed,

    /// Cache round-trip or decode failure not otherwise classified
    Internal,
}

/// Error type for core operations
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("timed out: {0}")]
    TimedOut(String),

    #[error("state commit failed: {0}")]
    StateCommitFailed(String),

    #[error("handler failed: {0}")]
    HandlerFailed(String),

    #[error("internal: {0}")]
    Internal(String),
}

impl CoreError {
    /// The stable kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::ResourceExhausted(_) => ErrorKind::ResourceExhausted,
            Self::TimedOut(_) => ErrorKind::TimedOut,
            Self::StateCommitFailed(_) => ErrorKind::StateCommitFailed,
            Self::HandlerFailed(_) => ErrorKind::HandlerFailed,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Classify a cache failure observed while touching `what`
    pub fn from_cache(err: CacheError, what: &str) -> Self {
        match err {
            CacheError::KeyNotFound(_) => Self::NotFound(what.to_string()),
            other => Self::Internal(format!("{what}: {other}")),
        }
    }
}
