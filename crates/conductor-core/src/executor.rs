//! Pattern executor
//!
//! Drives a registered pattern to completion for a caller-chosen execution
//! id. State loads from the cache before anything runs — the same execution
//! id resumes instead of restarting, which is what makes step invocation
//! at-most-once per execution. Steps fan out concurrently; a step waits
//! only on its own declared dependencies, never on a whole topological
//! layer. A completion becomes visible to dependents only after its persist
//! has succeeded.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde_json::{json, Map, Value};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use conductor_cache::{keys, Cache};

use crate::action::{ActionRegistry, ParamMap};
use crate::dlq::{DeadLetterRecord, DeadLetterSink};
use crate::error::CoreError;
use crate::pattern::{validate, Pattern, PatternStore, Step};
use crate::state::ExecutionState;

/// Configuration for the pattern executor
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Deadline for one `execute` call as a whole
    pub run_timeout: Duration,

    /// Pause between step retry attempts
    pub retry_delay: Duration,

    /// Jitter factor (0.0-1.0) applied to the retry pause
    pub retry_jitter: f64,

    /// TTL on persisted execution state; long enough to resume much later
    pub state_ttl: Duration,

    /// Reject a second concurrent `execute` for the same execution id
    pub single_flight: bool,

    /// TTL on the single-flight lock
    pub lock_ttl: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            run_timeout: Duration::from_secs(300),
            retry_delay: Duration::from_millis(200),
            retry_jitter: 0.1,
            state_ttl: Duration::from_secs(30 * 24 * 60 * 60),
            single_flight: true,
            lock_ttl: Duration::from_secs(60),
        }
    }
}

impl ExecutorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the whole-run deadline
    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = timeout;
        self
    }

    /// Set the pause between retry attempts
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Set the TTL on persisted execution state
    pub fn with_state_ttl(mut self, ttl: Duration) -> Self {
        self.state_ttl = ttl;
        self
    }

    /// Enable or disable the single-flight execution lock
    pub fn with_single_flight(mut self, enabled: bool) -> Self {
        self.single_flight = enabled;
        self
    }
}

/// Where a step stands within one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepPhase {
    Pending,
    Completed,
    Failed,
}

/// Shared context for one run's step tasks
struct RunContext {
    cache: Arc<dyn Cache>,
    registry: Arc<ActionRegistry>,
    state: tokio::sync::RwLock<ExecutionState>,
    state_key: String,
    config: ExecutorConfig,
    dead_letters: Option<Arc<DeadLetterSink>>,
    newly_completed: AtomicUsize,
}

/// Executor for registered patterns
///
/// Takes its cache and registry as constructor inputs; there is no
/// process-wide default instance.
pub struct PatternExecutor {
    cache: Arc<dyn Cache>,
    registry: Arc<ActionRegistry>,
    patterns: parking_lot::RwLock<HashMap<String, Arc<Pattern>>>,
    store: Option<Arc<PatternStore>>,
    dead_letters: Option<Arc<DeadLetterSink>>,
    config: ExecutorConfig,
}

impl PatternExecutor {
    /// Create an executor over the shared cache and action registry
    pub fn new(cache: Arc<dyn Cache>, registry: Arc<ActionRegistry>) -> Self {
        Self {
            cache,
            registry,
            patterns: parking_lot::RwLock::new(HashMap::new()),
            store: None,
            dead_letters: None,
            config: ExecutorConfig::default(),
        }
    }

    /// Use a custom configuration
    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    /// Attach the pattern store so completed runs update usage statistics
    pub fn with_pattern_store(mut self, store: Arc<PatternStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Attach the dead-letter sink for steps that exhaust their retries
    pub fn with_dead_letters(mut self, sink: Arc<DeadLetterSink>) -> Self {
        self.dead_letters = Some(sink);
        self
    }

    /// Validate and register a pattern, returning its id.
    ///
    /// Registration is the only write to the pattern map.
    pub fn register(&self, mut pattern: Pattern) -> Result<String, CoreError> {
        validate(&pattern)?;
        if pattern.id.is_empty() {
            pattern.id = Uuid::now_v7().to_string();
        }

        let id = pattern.id.clone();
        self.patterns.write().insert(id.clone(), Arc::new(pattern));
        info!(pattern_id = %id, "registered pattern");
        Ok(id)
    }

    /// Fetch a registered pattern
    pub fn pattern(&self, id: &str) -> Option<Arc<Pattern>> {
        self.patterns.read().get(id).cloned()
    }

    /// Execute a pattern under a fresh cancellation token
    pub async fn execute(
        &self,
        pattern_id: &str,
        execution_id: &str,
        input: Map<String, Value>,
    ) -> Result<Map<String, Value>, CoreError> {
        self.execute_with_cancel(pattern_id, execution_id, input, CancellationToken::new())
            .await
    }

    /// Execute a pattern; `cancel` propagates into every in-flight step.
    ///
    /// Committed steps stay committed — cancellation abandons work that has
    /// not started and interrupts work in flight, and a later call with the
    /// same execution id resumes past everything already persisted.
    #[instrument(skip(self, input, cancel))]
    pub async fn execute_with_cancel(
        &self,
        pattern_id: &str,
        execution_id: &str,
        input: Map<String, Value>,
        cancel: CancellationToken,
    ) -> Result<Map<String, Value>, CoreError> {
        if execution_id.is_empty() {
            return Err(CoreError::InvalidArgument(
                "execution id must not be empty".to_string(),
            ));
        }

        let pattern = self
            .pattern(pattern_id)
            .ok_or_else(|| CoreError::NotFound(format!("pattern {pattern_id}")))?;
        if !pattern.is_active {
            return Err(CoreError::InvalidArgument(format!(
                "pattern {pattern_id} is inactive"
            )));
        }

        let lock_key = keys::execution_lock(execution_id);
        if self.config.single_flight {
            let acquired = self
                .cache
                .set_if_absent(
                    &lock_key,
                    &json!({"pattern_id": pattern_id}),
                    Some(self.config.lock_ttl),
                )
                .await
                .map_err(|e| CoreError::Internal(format!("acquire execution lock: {e}")))?;
            if !acquired {
                return Err(CoreError::Conflict(format!(
                    "execution {execution_id} is already in flight"
                )));
            }
        }

        let outcome = self.run(&pattern, execution_id, input, cancel).await;

        if self.config.single_flight {
            if let Err(err) = self.cache.delete(&lock_key, "").await {
                warn!(%execution_id, "failed to release execution lock: {err}");
            }
        }

        if let Some(store) = &self.store {
            let sample = match &outcome {
                Ok((_, newly_completed)) if *newly_completed > 0 => Some(true),
                Ok(_) => None,
                Err(_) => Some(false),
            };
            if let Some(success) = sample {
                if let Err(err) = store.record_outcome(&pattern.id, success).await {
                    warn!(pattern_id = %pattern.id, "failed to record outcome: {err}");
                }
            }
        }

        outcome.map(|(results, _)| results)
    }

    /// One pass over the pattern: load-or-init state, fan the runnable
    /// steps out, join them, and report the first captured error.
    async fn run(
        &self,
        pattern: &Arc<Pattern>,
        execution_id: &str,
        input: Map<String, Value>,
        cancel: CancellationToken,
    ) -> Result<(Map<String, Value>, usize), CoreError> {
        let state_key = keys::execution_state(execution_id);

        let state = match self.cache.get(&state_key, "").await {
            Ok(doc) => {
                let state: ExecutionState = serde_json::from_value(doc).map_err(|e| {
                    CoreError::Internal(format!("decode execution state {state_key}: {e}"))
                })?;
                debug!(%execution_id, completed = state.completed.len(), "resuming execution");
                state
            }
            Err(err) if err.is_not_found() => {
                let state = ExecutionState::seeded(&input);
                let doc = serde_json::to_value(&state)
                    .map_err(|e| CoreError::Internal(format!("encode execution state: {e}")))?;
                self.cache
                    .set(&state_key, "", &doc, Some(self.config.state_ttl))
                    .await
                    .map_err(|e| {
                        CoreError::Internal(format!("initialize execution state: {e}"))
                    })?;
                debug!(%execution_id, "starting fresh execution");
                state
            }
            Err(err) => {
                return Err(CoreError::Internal(format!(
                    "load execution state {state_key}: {err}"
                )))
            }
        };

        // One phase channel per step; steps committed by an earlier run are
        // seeded Completed so dependents pass their gate immediately.
        let mut senders: HashMap<String, watch::Sender<StepPhase>> = HashMap::new();
        let mut receivers: HashMap<String, watch::Receiver<StepPhase>> = HashMap::new();
        for step in &pattern.steps {
            let initial = if state.is_completed(&step.action) {
                StepPhase::Completed
            } else {
                StepPhase::Pending
            };
            let (tx, rx) = watch::channel(initial);
            senders.insert(step.action.clone(), tx);
            receivers.insert(step.action.clone(), rx);
        }

        let ctx = Arc::new(RunContext {
            cache: Arc::clone(&self.cache),
            registry: Arc::clone(&self.registry),
            state: tokio::sync::RwLock::new(state),
            state_key,
            config: self.config.clone(),
            dead_letters: self.dead_letters.clone(),
            newly_completed: AtomicUsize::new(0),
        });

        let run_token = cancel.child_token();
        let mut steps = JoinSet::new();
        for step in &pattern.steps {
            let Some(tx) = senders.remove(&step.action) else {
                continue;
            };
            if *tx.borrow() == StepPhase::Completed {
                debug!(step = %step.action, "step already completed, skipping");
                continue;
            }

            let deps: Vec<watch::Receiver<StepPhase>> = step
                .depends_on
                .iter()
                .filter_map(|dep| receivers.get(dep).cloned())
                .collect();

            steps.spawn(run_step(
                Arc::clone(&ctx),
                step.clone(),
                tx,
                deps,
                run_token.clone(),
            ));
        }

        let first_error = if steps.is_empty() {
            None
        } else {
            let drained = tokio::time::timeout(self.config.run_timeout, async {
                let mut first_error: Option<CoreError> = None;
                while let Some(joined) = steps.join_next().await {
                    match joined {
                        Ok(Ok(())) => {}
                        Ok(Err(err)) => {
                            if first_error.is_none() {
                                first_error = Some(err);
                            }
                        }
                        Err(join_err) => {
                            if first_error.is_none() {
                                first_error =
                                    Some(CoreError::Internal(format!("step task died: {join_err}")));
                            }
                        }
                    }
                }
                first_error
            })
            .await;

            match drained {
                Ok(first_error) => first_error,
                Err(_) => {
                    // Stop whatever is still in flight; committed steps keep
                    // their persisted state for a later resume.
                    run_token.cancel();
                    while steps.join_next().await.is_some() {}
                    Some(CoreError::TimedOut(format!(
                        "execution {execution_id} exceeded its run deadline"
                    )))
                }
            }
        };

        match first_error {
            Some(err) => Err(err),
            None => {
                let state = ctx.state.read().await;
                let newly_completed = ctx.newly_completed.load(Ordering::Relaxed);
                Ok((state.results.clone(), newly_completed))
            }
        }
    }
}

/// Execute one step: gate on dependencies, resolve parameters, invoke under
/// the step deadline with retries, then commit result and completion.
async fn run_step(
    ctx: Arc<RunContext>,
    step: Step,
    tx: watch::Sender<StepPhase>,
    deps: Vec<watch::Receiver<StepPhase>>,
    token: CancellationToken,
) -> Result<(), CoreError> {
    // Dependency gate: a dependency's Completed is only ever published
    // after its persist succeeded, so passing this gate implies durability.
    for mut dep in deps {
        let phase = tokio::select! {
            _ = token.cancelled() => {
                let _ = tx.send(StepPhase::Failed);
                return Err(CoreError::TimedOut(format!(
                    "step \"{}\" cancelled before start", step.action
                )));
            }
            changed = dep.wait_for(|phase| *phase != StepPhase::Pending) => {
                match changed {
                    Ok(phase) => *phase,
                    Err(_) => StepPhase::Failed,
                }
            }
        };

        if phase == StepPhase::Failed {
            // The dependency's own error is the one the run reports.
            debug!(step = %step.action, "dependency failed, not invoking");
            let _ = tx.send(StepPhase::Failed);
            return Ok(());
        }
    }

    let entry = match ctx.registry.lookup(&step.step_type, &step.action) {
        Ok(entry) => entry,
        Err(err) => {
            let _ = tx.send(StepPhase::Failed);
            return Err(err);
        }
    };

    let max_attempts = step.retries + 1;
    let mut last_error: Option<CoreError> = None;
    let mut last_params: Option<ParamMap> = None;

    for attempt in 1..=max_attempts {
        // Parameters resolve against the live results under a read lock;
        // the invocation itself runs on a snapshot, lock-free.
        let resolved = {
            let state = ctx.state.read().await;
            entry.resolve(&step.parameters, &state.results)
        };
        let params = match resolved {
            Ok(params) => params,
            Err(err) => {
                let _ = tx.send(StepPhase::Failed);
                return Err(err);
            }
        };
        last_params = Some(params.clone());

        let invocation = tokio::select! {
            _ = token.cancelled() => {
                let _ = tx.send(StepPhase::Failed);
                return Err(CoreError::TimedOut(format!(
                    "step \"{}\" cancelled", step.action
                )));
            }
            outcome = tokio::time::timeout(step.timeout, entry.invoke(params)) => outcome,
        };

        match invocation {
            Ok(Ok(value)) => {
                return commit_step(&ctx, &step, value, &tx).await;
            }
            Ok(Err(action_err)) => {
                debug!(step = %step.action, attempt, "handler failed: {}", action_err.message);
                let retryable = action_err.retryable;
                last_error = Some(CoreError::HandlerFailed(format!(
                    "step \"{}\": {}",
                    step.action, action_err.message
                )));
                if !retryable {
                    break;
                }
            }
            Err(_) => {
                debug!(step = %step.action, attempt, "attempt exceeded step timeout");
                last_error = Some(CoreError::TimedOut(format!(
                    "step \"{}\" exceeded its {:?} timeout",
                    step.action, step.timeout
                )));
            }
        }

        if attempt < max_attempts {
            tokio::time::sleep(retry_pause(&ctx.config)).await;
        }
    }

    let err = last_error
        .unwrap_or_else(|| CoreError::HandlerFailed(format!("step \"{}\"", step.action)));

    if let Some(sink) = &ctx.dead_letters {
        let payload = last_params.map(Value::Object).unwrap_or_else(|| json!({}));
        let record = DeadLetterRecord::new(
            format!("{}:{}", step.step_type, step.action),
            payload,
            err.to_string(),
        );
        if let Err(sink_err) = sink.append(record).await {
            warn!(step = %step.action, "failed to dead-letter step: {sink_err}");
        }
    }

    let _ = tx.send(StepPhase::Failed);
    Err(err)
}

/// Commit under the exclusive state write: mutate, persist, publish.
/// A failed persist rolls the mutation back and is fatal to the step —
/// publishing an unpersisted completion would break resume.
async fn commit_step(
    ctx: &RunContext,
    step: &Step,
    value: Value,
    tx: &watch::Sender<StepPhase>,
) -> Result<(), CoreError> {
    let mut state = ctx.state.write().await;
    let previous = state.results.insert(step.action.clone(), value);
    state.completed.insert(step.action.clone(), true);

    let persisted = match serde_json::to_value(&*state) {
        Ok(doc) => ctx
            .cache
            .set(&ctx.state_key, "", &doc, Some(ctx.config.state_ttl))
            .await
            .map_err(|e| e.to_string()),
        Err(e) => Err(format!("encode execution state: {e}")),
    };

    match persisted {
        Ok(()) => {
            drop(state);
            ctx.newly_completed.fetch_add(1, Ordering::Relaxed);
            debug!(step = %step.action, "step committed");
            let _ = tx.send(StepPhase::Completed);
            Ok(())
        }
        Err(err) => {
            state.completed.remove(&step.action);
            match previous {
                Some(previous) => {
                    state.results.insert(step.action.clone(), previous);
                }
                None => {
                    state.results.remove(&step.action);
                }
            }
            drop(state);
            let _ = tx.send(StepPhase::Failed);
            Err(CoreError::StateCommitFailed(format!(
                "step \"{}\": {err}",
                step.action
            )))
        }
    }
}

fn retry_pause(config: &ExecutorConfig) -> Duration {
    if config.retry_jitter <= 0.0 {
        return config.retry_delay;
    }
    let base = config.retry_delay.as_secs_f64();
    let spread = base * config.retry_jitter;
    let offset = rand::thread_rng().gen_range(-spread..=spread);
    Duration::from_secs_f64((base + offset).max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ExecutorConfig::default();
        assert_eq!(config.run_timeout, Duration::from_secs(300));
        assert!(config.single_flight);
        assert_eq!(config.state_ttl, Duration::from_secs(30 * 24 * 60 * 60));
    }

    #[test]
    fn test_retry_pause_stays_near_base() {
        let config = ExecutorConfig::default().with_retry_delay(Duration::from_millis(100));
        for _ in 0..50 {
            let pause = retry_pause(&config);
            assert!(pause >= Duration::from_millis(80));
            assert!(pause <= Duration::from_millis(120));
        }
    }

    #[test]
    fn test_register_rejects_invalid_patterns() {
        let cache: Arc<dyn Cache> = Arc::new(conductor_cache::MemoryCache::new());
        let executor = PatternExecutor::new(cache, Arc::new(ActionRegistry::new()));

        let err = executor.register(Pattern::new("p", vec![])).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidArgument);
    }
}
