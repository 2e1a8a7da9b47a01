//! # Task Dispatcher
//!
//! Bounded producer/consumer pipeline for typed work items.
//!
//! ```text
//! submit ──▶ persist row ──▶ bounded queue ──▶ W workers ──▶ results channel
//!                 │                                │               │
//!                 ▼                                ▼               ▼
//!           dispatch:task:<id>           per-task deadline   result processor
//!                                        + rate limiter      (upsert + status
//!                                                             reconcile)
//! ```
//!
//! Ordering: submission order holds only up to dequeue; concurrent workers
//! interleave nondeterministically after that. The queue is the
//! backpressure signal — submitters see a fast failure and the persisted
//! row stays pending. Graceful shutdown closes the queue, drains workers
//! and the processor, and runs each handler's cleanup hook exactly once.

mod dispatcher;
mod handler;
mod task;

pub use dispatcher::{DispatchError, DispatcherConfig, DispatcherStatus, TaskDispatcher};
pub use handler::{TaskContext, TaskHandler, TaskOutput};
pub use task::{Task, TaskKind, TaskResult, TaskStatus};
