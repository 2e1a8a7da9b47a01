//! # Cache Abstraction
//!
//! The shared persistence contract for the orchestration core. Every durable
//! piece of state — pattern records, execution state, task rows, dead-letter
//! records — goes through the [`Cache`] trait so components never talk to a
//! concrete backend directly.
//!
//! Semantics callers rely on:
//!
//! - A miss is a first-class [`CacheError::KeyNotFound`]; callers never have
//!   to interpret an empty document as "absent".
//! - `field = ""` addresses a plain key; any other field addresses a hash
//!   field under that key.
//! - [`Cache::pipeline`] executes commands in submission order. It batches
//!   round-trips; it does not promise a cross-command transaction.
//! - [`Cache::set_if_absent`] is the lock primitive (short-TTL mutexes).

pub mod keys;
mod memory;
mod store;

pub use memory::MemoryCache;
pub use store::{Cache, CacheError, PipelineCommand, PipelineReply};
