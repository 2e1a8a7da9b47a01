//! Bounded task dispatcher
//!
//! Producer/consumer pipeline: `submit` persists the task row and enqueues
//! into a bounded queue; W workers share the queue behind an async mutex,
//! each pacing itself with a minimum inter-task interval; results flow over
//! a many-producer-single-consumer channel into one processor that persists
//! the result row and reconciles terminal task status. The queue is the
//! backpressure signal — a full queue fails the submit immediately and the
//! persisted row stays pending.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use conductor_cache::{keys, Cache, CacheError};

use crate::handler::{TaskContext, TaskHandler};
use crate::task::{Task, TaskKind, TaskResult, TaskStatus};

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Bounded queue capacity (Q)
    pub queue_capacity: usize,

    /// Worker pool size (W)
    pub workers: usize,

    /// Minimum inter-task interval per worker
    pub min_task_interval: Duration,

    /// Default per-task deadline
    pub task_timeout: Duration,

    /// Per-kind deadline overrides
    pub kind_timeouts: HashMap<TaskKind, Duration>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            workers: 4,
            min_task_interval: Duration::from_millis(100),
            task_timeout: Duration::from_secs(300),
            kind_timeouts: HashMap::new(),
        }
    }
}

impl DispatcherConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the queue capacity
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Set the worker pool size
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Set the per-worker pacing interval
    pub fn with_min_task_interval(mut self, interval: Duration) -> Self {
        self.min_task_interval = interval;
        self
    }

    /// Set the default per-task deadline
    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }

    /// Override the deadline for one task kind
    pub fn with_kind_timeout(mut self, kind: TaskKind, timeout: Duration) -> Self {
        self.kind_timeouts.insert(kind, timeout);
        self
    }

    fn timeout_for(&self, kind: TaskKind) -> Duration {
        self.kind_timeouts.get(&kind).copied().unwrap_or(self.task_timeout)
    }
}

/// Dispatcher lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherStatus {
    /// Created, not yet started
    Idle,
    /// Accepting and processing tasks
    Running,
    /// Draining: queue closed, workers finishing current tasks
    Draining,
    /// Fully stopped
    Stopped,
}

/// Dispatcher errors
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Task failed validation before submission
    #[error("invalid task: {0}")]
    InvalidTask(String),

    /// The bounded queue is full; the persisted row stays pending
    #[error("task queue exhausted")]
    QueueExhausted,

    /// Dispatcher is not accepting work
    #[error("dispatcher is not running")]
    NotRunning,

    /// Start called twice
    #[error("dispatcher is already running")]
    AlreadyRunning,

    /// Graceful drain missed its deadline; workers may still be finishing
    #[error("graceful shutdown timed out")]
    ShutdownTimeout,

    /// Task or result row lookup failed
    #[error("task not found: {0}")]
    TaskNotFound(Uuid),

    /// Cache round-trip failure
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// Row decode failure
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Bounded worker-pool dispatcher for typed tasks
///
/// # Example
///
/// ```ignore
/// use conductor_dispatch::{DispatcherConfig, TaskDispatcher};
///
/// let dispatcher = TaskDispatcher::new(cache, DispatcherConfig::default());
/// dispatcher.register_handler(TaskKind::Web, Arc::new(WebHandler::new()));
/// dispatcher.start()?;
///
/// let task_id = dispatcher.submit(task).await?;
///
/// // ... later
/// dispatcher.shutdown(Duration::from_secs(30)).await?;
/// ```
pub struct TaskDispatcher {
    cache: Arc<dyn Cache>,
    config: DispatcherConfig,
    handlers: parking_lot::RwLock<HashMap<TaskKind, Arc<dyn TaskHandler>>>,
    status: parking_lot::RwLock<DispatcherStatus>,
    queue_tx: parking_lot::Mutex<Option<mpsc::Sender<Task>>>,
    worker_handles: parking_lot::Mutex<Vec<JoinHandle<()>>>,
    processor_handle: parking_lot::Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl TaskDispatcher {
    /// Create a dispatcher over the shared cache
    pub fn new(cache: Arc<dyn Cache>, config: DispatcherConfig) -> Self {
        Self {
            cache,
            config,
            handlers: parking_lot::RwLock::new(HashMap::new()),
            status: parking_lot::RwLock::new(DispatcherStatus::Idle),
            queue_tx: parking_lot::Mutex::new(None),
            worker_handles: parking_lot::Mutex::new(Vec::new()),
            processor_handle: parking_lot::Mutex::new(None),
            cancel: CancellationToken::new(),
        }
    }

    /// Register the handler for one task kind; call before `start`.
    pub fn register_handler(&self, kind: TaskKind, handler: Arc<dyn TaskHandler>) {
        self.handlers.write().insert(kind, handler);
        info!(kind = %kind, "registered task handler");
    }

    /// Current lifecycle status
    pub fn status(&self) -> DispatcherStatus {
        *self.status.read()
    }

    /// Token cancelling every in-flight task; cancelled tasks deliver a
    /// failed result carrying the reason.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Spawn the worker pool and result processor.
    #[instrument(skip(self), fields(workers = self.config.workers, queue = self.config.queue_capacity))]
    pub fn start(&self) -> Result<(), DispatchError> {
        {
            let mut status = self.status.write();
            if *status == DispatcherStatus::Running {
                return Err(DispatchError::AlreadyRunning);
            }
            *status = DispatcherStatus::Running;
        }

        let (queue_tx, queue_rx) = mpsc::channel::<Task>(self.config.queue_capacity);
        let (result_tx, result_rx) = mpsc::channel::<TaskResult>(self.config.queue_capacity);
        let queue_rx = Arc::new(AsyncMutex::new(queue_rx));
        let handlers: HashMap<TaskKind, Arc<dyn TaskHandler>> = self.handlers.read().clone();

        let mut workers = Vec::with_capacity(self.config.workers);
        for index in 0..self.config.workers {
            workers.push(tokio::spawn(worker_loop(
                index,
                Arc::clone(&self.cache),
                Arc::clone(&queue_rx),
                handlers.clone(),
                result_tx.clone(),
                self.config.clone(),
                self.cancel.clone(),
            )));
        }
        // Workers hold the only result senders; when the last worker exits
        // the processor's channel closes and it drains out.
        drop(result_tx);

        let processor = tokio::spawn(process_results(Arc::clone(&self.cache), result_rx));

        *self.queue_tx.lock() = Some(queue_tx);
        *self.worker_handles.lock() = workers;
        *self.processor_handle.lock() = Some(processor);

        info!("dispatcher started");
        Ok(())
    }

    /// Validate, persist and enqueue one task.
    ///
    /// The row persists with status pending before the enqueue attempt, so
    /// a full queue fails fast with the row intact for a later re-submit.
    #[instrument(skip(self, task), fields(task_id = %task.id, kind = %task.kind))]
    pub async fn submit(&self, mut task: Task) -> Result<Uuid, DispatchError> {
        if self.status() != DispatcherStatus::Running {
            return Err(DispatchError::NotRunning);
        }
        if task.target.trim().is_empty() {
            return Err(DispatchError::InvalidTask(
                "task target must not be empty".to_string(),
            ));
        }

        task.status = TaskStatus::Pending;
        task.updated_at = Utc::now();
        persist_task(&self.cache, &task).await?;

        let sender = self
            .queue_tx
            .lock()
            .clone()
            .ok_or(DispatchError::NotRunning)?;

        let task_id = task.id;
        match sender.try_send(task) {
            Ok(()) => {
                debug!(%task_id, "task enqueued");
                Ok(task_id)
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(%task_id, "queue exhausted, rejecting submit");
                Err(DispatchError::QueueExhausted)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(DispatchError::NotRunning),
        }
    }

    /// Fetch a task row
    pub async fn task(&self, id: Uuid) -> Result<Task, DispatchError> {
        let doc = match self.cache.get(&keys::task(&id.to_string()), "").await {
            Ok(doc) => doc,
            Err(err) if err.is_not_found() => return Err(DispatchError::TaskNotFound(id)),
            Err(err) => return Err(err.into()),
        };
        serde_json::from_value(doc).map_err(|e| DispatchError::Serialization(e.to_string()))
    }

    /// Fetch the result row for a task
    pub async fn result(&self, task_id: Uuid) -> Result<TaskResult, DispatchError> {
        let doc = match self
            .cache
            .get(&keys::task_result(&task_id.to_string()), "")
            .await
        {
            Ok(doc) => doc,
            Err(err) if err.is_not_found() => return Err(DispatchError::TaskNotFound(task_id)),
            Err(err) => return Err(err.into()),
        };
        serde_json::from_value(doc).map_err(|e| DispatchError::Serialization(e.to_string()))
    }

    /// Graceful drain, bounded by `deadline`:
    ///
    /// 1. close the queue (no new tasks accepted)
    /// 2. wait for workers to finish their current tasks
    /// 3. wait for the result processor to drain
    /// 4. run every handler cleanup hook once
    ///
    /// Stopping twice is a no-op. On deadline expiry the error reports the
    /// timeout and waiting stops; misbehaving workers may leak.
    #[instrument(skip(self))]
    pub async fn shutdown(&self, deadline: Duration) -> Result<(), DispatchError> {
        {
            let mut status = self.status.write();
            match *status {
                DispatcherStatus::Stopped | DispatcherStatus::Draining => return Ok(()),
                _ => *status = DispatcherStatus::Draining,
            }
        }
        info!("dispatcher draining");

        // Closing the queue lets idle workers exit; busy workers finish
        // their current task first.
        self.queue_tx.lock().take();

        let workers: Vec<JoinHandle<()>> = std::mem::take(&mut *self.worker_handles.lock());
        let processor = self.processor_handle.lock().take();

        let drained = tokio::time::timeout(deadline, async {
            for worker in workers {
                if let Err(err) = worker.await {
                    error!("worker task died: {err}");
                }
            }
            if let Some(processor) = processor {
                if let Err(err) = processor.await {
                    error!("result processor died: {err}");
                }
            }
        })
        .await;

        if drained.is_err() {
            *self.status.write() = DispatcherStatus::Stopped;
            return Err(DispatchError::ShutdownTimeout);
        }

        let handlers: Vec<Arc<dyn TaskHandler>> = self.handlers.read().values().cloned().collect();
        for handler in handlers {
            handler.cleanup().await;
        }

        *self.status.write() = DispatcherStatus::Stopped;
        info!("dispatcher stopped");
        Ok(())
    }
}

/// Persist a task row under `dispatch:task:<id>`
async fn persist_task(cache: &Arc<dyn Cache>, task: &Task) -> Result<(), DispatchError> {
    let doc = serde_json::to_value(task)
        .map_err(|e| DispatchError::Serialization(e.to_string()))?;
    cache
        .set(&keys::task(&task.id.to_string()), "", &doc, None)
        .await?;
    Ok(())
}

/// One worker: pace, dequeue, mark processing, run the handler under its
/// deadline, forward the result.
async fn worker_loop(
    index: usize,
    cache: Arc<dyn Cache>,
    queue: Arc<AsyncMutex<mpsc::Receiver<Task>>>,
    handlers: HashMap<TaskKind, Arc<dyn TaskHandler>>,
    result_tx: mpsc::Sender<TaskResult>,
    config: DispatcherConfig,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(config.min_task_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        // Rate limit: at most one task per interval per worker.
        ticker.tick().await;

        let task = {
            let mut rx = queue.lock().await;
            rx.recv().await
        };
        let Some(mut task) = task else {
            debug!(worker = index, "queue closed, worker exiting");
            break;
        };

        task.status = TaskStatus::Processing;
        task.updated_at = Utc::now();
        if let Err(err) = persist_task(&cache, &task).await {
            error!(task_id = %task.id, "failed to mark task processing: {err}");
        }

        let result = match handlers.get(&task.kind) {
            None => {
                warn!(task_id = %task.id, kind = %task.kind, "no handler registered");
                TaskResult::failed(task.id, format!("unsupported task type: {}", task.kind))
            }
            Some(handler) => {
                run_task(handler, &task, config.timeout_for(task.kind), &cancel).await
            }
        };

        if result_tx.send(result).await.is_err() {
            warn!(worker = index, "results channel closed, dropping result");
            break;
        }
    }
}

/// Run one task under its deadline and cancellation, shaping the outcome
/// into a result row.
async fn run_task(
    handler: &Arc<dyn TaskHandler>,
    task: &Task,
    timeout: Duration,
    cancel: &CancellationToken,
) -> TaskResult {
    let ctx = TaskContext::new(cancel.child_token());

    tokio::select! {
        _ = cancel.cancelled() => {
            TaskResult::failed(task.id, "task cancelled")
        }
        outcome = tokio::time::timeout(timeout, handler.process(&ctx, task)) => {
            match outcome {
                Ok(Ok(output)) => {
                    let mut result = TaskResult::completed(task.id, output.payload, output.links);
                    result.metadata = output.metadata;
                    result
                }
                Ok(Err(message)) => TaskResult::failed(task.id, message),
                Err(_) => TaskResult::failed(
                    task.id,
                    format!("task timed out after {timeout:?}"),
                ),
            }
        }
    }
}

/// Single consumer: upsert the result row, then reconcile the task's
/// terminal status from it.
async fn process_results(cache: Arc<dyn Cache>, mut results: mpsc::Receiver<TaskResult>) {
    while let Some(result) = results.recv().await {
        let task_id = result.task_id;

        match serde_json::to_value(&result) {
            Ok(doc) => {
                if let Err(err) = cache
                    .set(&keys::task_result(&task_id.to_string()), "", &doc, None)
                    .await
                {
                    error!(%task_id, "failed to persist result: {err}");
                    continue;
                }
            }
            Err(err) => {
                error!(%task_id, "failed to encode result: {err}");
                continue;
            }
        }

        // Reconcile the task row to the result's terminal status.
        match cache.get(&keys::task(&task_id.to_string()), "").await {
            Ok(doc) => match serde_json::from_value::<Task>(doc) {
                Ok(mut task) => {
                    task.status = result.status;
                    task.updated_at = Utc::now();
                    if let Err(err) = persist_task(&cache, &task).await {
                        error!(%task_id, "failed to reconcile task status: {err}");
                    }
                }
                Err(err) => error!(%task_id, "failed to decode task row: {err}"),
            },
            Err(err) => error!(%task_id, "task row missing during reconcile: {err}"),
        }

        debug!(%task_id, status = %result.status, "result processed");
    }

    debug!("result processor drained");
}
