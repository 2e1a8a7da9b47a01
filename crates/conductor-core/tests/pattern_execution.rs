//! End-to-end executor behavior: fresh runs, resume, retries, gating,
//! timeouts, commit failures and statistics.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use conductor_cache::{keys, Cache, CacheError, MemoryCache, PipelineCommand, PipelineReply};
use conductor_core::{
    register_graph_actions, ActionEntry, ActionError, ActionRegistry, CapabilityError,
    DeadLetterSink, EntityEvent, EntityGraph, ErrorKind, ExecutionState, ExecutorConfig,
    GraphCapability, GraphPath, MemoryGraph, ParamMap, Pattern, PatternExecutor, PatternStore,
    Relationship, Step,
};

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("expected object"),
    }
}

/// Graph port that counts invocations of each action
struct CountingGraph {
    inner: MemoryGraph,
    creates: AtomicUsize,
    publishes: AtomicUsize,
}

impl CountingGraph {
    fn new() -> Self {
        Self {
            inner: MemoryGraph::new(),
            creates: AtomicUsize::new(0),
            publishes: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl GraphCapability for CountingGraph {
    async fn create_relationship(
        &self,
        parent_id: i64,
        child_id: i64,
        kind: &str,
        metadata: Value,
    ) -> Result<Uuid, CapabilityError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.inner
            .create_relationship(parent_id, child_id, kind, metadata)
            .await
    }

    async fn list_relationships(
        &self,
        master_id: i64,
        kind: &str,
    ) -> Result<Vec<Relationship>, CapabilityError> {
        self.inner.list_relationships(master_id, kind).await
    }

    async fn publish_event(&self, event: EntityEvent) -> Result<(), CapabilityError> {
        self.publishes.fetch_add(1, Ordering::SeqCst);
        self.inner.publish_event(event).await
    }

    async fn get_entity_graph(
        &self,
        master_id: i64,
        depth: u32,
    ) -> Result<EntityGraph, CapabilityError> {
        self.inner.get_entity_graph(master_id, depth).await
    }

    async fn find_path(&self, from_id: i64, to_id: i64) -> Result<GraphPath, CapabilityError> {
        self.inner.find_path(from_id, to_id).await
    }
}

fn two_step_pattern() -> Pattern {
    Pattern::new(
        "relate-and-announce",
        vec![
            Step::new("relationship", "create", Duration::from_secs(10)),
            Step::new("event", "publish", Duration::from_secs(5))
                .with_depends_on(vec!["create".to_string()]),
        ],
    )
}

fn full_input() -> Map<String, Value> {
    object(json!({
        "parent_id": 1,
        "child_id": 2,
        "master_id": 1,
        "type": "owner",
        "metadata": {},
        "entity_type": "user",
        "event_type": "created",
        "payload": {}
    }))
}

struct Harness {
    cache: Arc<MemoryCache>,
    graph: Arc<CountingGraph>,
    executor: PatternExecutor,
    pattern_id: String,
}

fn harness() -> Harness {
    let cache = Arc::new(MemoryCache::new());
    let graph = Arc::new(CountingGraph::new());
    let registry = Arc::new(ActionRegistry::new());
    register_graph_actions(&registry, Arc::clone(&graph) as Arc<dyn GraphCapability>);

    let executor = PatternExecutor::new(
        Arc::clone(&cache) as Arc<dyn Cache>,
        registry,
    );
    let pattern_id = executor.register(two_step_pattern()).unwrap();

    Harness {
        cache,
        graph,
        executor,
        pattern_id,
    }
}

async fn load_state(cache: &Arc<MemoryCache>, execution_id: &str) -> ExecutionState {
    let doc = cache
        .get(&keys::execution_state(execution_id), "")
        .await
        .unwrap();
    serde_json::from_value(doc).unwrap()
}

#[test_log::test(tokio::test)]
async fn test_fresh_two_step_run() {
    let h = harness();

    let results = h
        .executor
        .execute(&h.pattern_id, "E1", full_input())
        .await
        .unwrap();

    // The create step produced a fresh relationship id; publish reported ok.
    let rel_id = results.get("create").and_then(Value::as_str).unwrap();
    assert!(Uuid::parse_str(rel_id).is_ok());
    assert_eq!(
        results.get("publish").and_then(|v| v.get("status")),
        Some(&json!("ok"))
    );

    // Input keys remain alongside step results.
    assert_eq!(results.get("master_id"), Some(&json!(1)));

    let state = load_state(&h.cache, "E1").await;
    assert!(state.is_completed("create"));
    assert!(state.is_completed("publish"));

    assert_eq!(h.graph.creates.load(Ordering::SeqCst), 1);
    assert_eq!(h.graph.publishes.load(Ordering::SeqCst), 1);
    assert_eq!(h.graph.inner.events().len(), 1);
}

#[tokio::test]
async fn test_resume_is_idempotent() {
    let h = harness();

    let first = h
        .executor
        .execute(&h.pattern_id, "E1", full_input())
        .await
        .unwrap();
    let second = h
        .executor
        .execute(&h.pattern_id, "E1", full_input())
        .await
        .unwrap();

    // Handlers ran at most once per step for this execution id.
    assert_eq!(h.graph.creates.load(Ordering::SeqCst), 1);
    assert_eq!(h.graph.publishes.load(Ordering::SeqCst), 1);

    // The results map comes back identical.
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_distinct_execution_ids_run_independently() {
    let h = harness();

    h.executor
        .execute(&h.pattern_id, "E1", full_input())
        .await
        .unwrap();
    h.executor
        .execute(&h.pattern_id, "E2", full_input())
        .await
        .unwrap();

    assert_eq!(h.graph.creates.load(Ordering::SeqCst), 2);
}

fn flaky_entry(remaining_failures: u32, calls: Arc<AtomicUsize>) -> ActionEntry {
    let budget = Arc::new(AtomicUsize::new(remaining_failures as usize));
    ActionEntry::new(vec![], move |_params: ParamMap| {
        let budget = Arc::clone(&budget);
        let calls = Arc::clone(&calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            if budget
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                Err(ActionError::retryable("injected failure"))
            } else {
                Ok(json!(42))
            }
        }
    })
}

fn retry_harness(failures: u32, retries: u32) -> (PatternExecutor, Arc<AtomicUsize>, String) {
    let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());
    let registry = Arc::new(ActionRegistry::new());
    let calls = Arc::new(AtomicUsize::new(0));
    registry.register("test", "flaky", flaky_entry(failures, Arc::clone(&calls)));

    let executor = PatternExecutor::new(cache, registry).with_config(
        ExecutorConfig::default().with_retry_delay(Duration::from_millis(5)),
    );
    let pattern_id = executor
        .register(Pattern::new(
            "flaky-once",
            vec![Step::new("test", "flaky", Duration::from_secs(1)).with_retries(retries)],
        ))
        .unwrap();
    (executor, calls, pattern_id)
}

#[tokio::test]
async fn test_retry_then_succeed_within_budget() {
    let (executor, calls, pattern_id) = retry_harness(2, 2);

    let results = executor
        .execute(&pattern_id, "R1", Map::new())
        .await
        .unwrap();

    assert_eq!(results.get("flaky"), Some(&json!(42)));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_failures_beyond_budget_abort() {
    let (executor, calls, pattern_id) = retry_harness(3, 2);

    let err = executor
        .execute(&pattern_id, "R2", Map::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::HandlerFailed);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_zero_retries_first_failure_aborts() {
    let (executor, calls, pattern_id) = retry_harness(1, 0);

    let err = executor
        .execute(&pattern_id, "R3", Map::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::HandlerFailed);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_missing_required_parameter_names_it() {
    let h = harness();
    let mut input = full_input();
    input.remove("parent_id");

    let err = h
        .executor
        .execute(&h.pattern_id, "E-missing", input)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    let message = err.to_string();
    assert!(message.contains("parent_id"), "got: {message}");
    assert!(message.contains("input"), "got: {message}");
}

#[tokio::test]
async fn test_non_integral_numeric_is_a_type_error() {
    let h = harness();
    let mut input = full_input();
    input.insert("parent_id".to_string(), json!(1.5));

    let err = h
        .executor
        .execute(&h.pattern_id, "E-badnum", input)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(err.to_string().contains("non-integral"));
}

#[tokio::test]
async fn test_integral_float_input_is_accepted() {
    let h = harness();
    let mut input = full_input();
    input.insert("parent_id".to_string(), json!(1.0));

    h.executor
        .execute(&h.pattern_id, "E-float", input)
        .await
        .unwrap();
    assert_eq!(h.graph.creates.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_step_timeout_spares_neighbors() {
    let cache = Arc::new(MemoryCache::new());
    let registry = Arc::new(ActionRegistry::new());
    let quick_calls = Arc::new(AtomicUsize::new(0));

    registry.register(
        "test",
        "slow",
        ActionEntry::new(vec![], |_params: ParamMap| async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            Ok(json!("late"))
        }),
    );
    let counter = Arc::clone(&quick_calls);
    registry.register(
        "test",
        "quick",
        ActionEntry::new(vec![], move |_params: ParamMap| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(json!("done"))
            }
        }),
    );

    let executor = PatternExecutor::new(Arc::clone(&cache) as Arc<dyn Cache>, registry);
    let pattern_id = executor
        .register(Pattern::new(
            "mixed",
            vec![
                Step::new("test", "slow", Duration::from_millis(50)),
                Step::new("test", "quick", Duration::from_secs(1)),
            ],
        ))
        .unwrap();

    let err = executor
        .execute(&pattern_id, "T1", Map::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TimedOut);

    // The independent neighbor committed and survives for resume.
    let state = load_state(&cache, "T1").await;
    assert!(state.is_completed("quick"));
    assert!(!state.is_completed("slow"));

    // Resuming skips the committed neighbor.
    let _ = executor.execute(&pattern_id, "T1", Map::new()).await;
    assert_eq!(quick_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_dependency_gating_orders_invocations() {
    let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());
    let registry = Arc::new(ActionRegistry::new());
    let log: Arc<parking_lot::Mutex<Vec<&'static str>>> =
        Arc::new(parking_lot::Mutex::new(Vec::new()));

    let first_log = Arc::clone(&log);
    registry.register(
        "test",
        "first",
        ActionEntry::new(vec![], move |_params: ParamMap| {
            let log = Arc::clone(&first_log);
            async move {
                log.lock().push("first:start");
                tokio::time::sleep(Duration::from_millis(80)).await;
                log.lock().push("first:end");
                Ok(json!(1))
            }
        }),
    );
    let second_log = Arc::clone(&log);
    registry.register(
        "test",
        "second",
        ActionEntry::new(vec![], move |_params: ParamMap| {
            let log = Arc::clone(&second_log);
            async move {
                log.lock().push("second:start");
                Ok(json!(2))
            }
        }),
    );

    let executor = PatternExecutor::new(cache, registry);
    let pattern_id = executor
        .register(Pattern::new(
            "chained",
            vec![
                Step::new("test", "first", Duration::from_secs(1)),
                Step::new("test", "second", Duration::from_secs(1))
                    .with_depends_on(vec!["first".to_string()]),
            ],
        ))
        .unwrap();

    executor.execute(&pattern_id, "G1", Map::new()).await.unwrap();

    let entries = log.lock().clone();
    let first_end = entries.iter().position(|e| *e == "first:end").unwrap();
    let second_start = entries.iter().position(|e| *e == "second:start").unwrap();
    assert!(
        first_end < second_start,
        "dependent started before dependency committed: {entries:?}"
    );
}

#[tokio::test]
async fn test_failed_dependency_skips_dependent() {
    let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());
    let registry = Arc::new(ActionRegistry::new());
    let dependent_calls = Arc::new(AtomicUsize::new(0));

    registry.register(
        "test",
        "doomed",
        ActionEntry::new(vec![], |_params: ParamMap| async move {
            Err::<Value, _>(ActionError::retryable("always fails"))
        }),
    );
    let counter = Arc::clone(&dependent_calls);
    registry.register(
        "test",
        "after",
        ActionEntry::new(vec![], move |_params: ParamMap| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(json!("ran"))
            }
        }),
    );

    let executor = PatternExecutor::new(cache, registry).with_config(
        ExecutorConfig::default().with_retry_delay(Duration::from_millis(5)),
    );
    let pattern_id = executor
        .register(Pattern::new(
            "doomed-chain",
            vec![
                Step::new("test", "doomed", Duration::from_secs(1)),
                Step::new("test", "after", Duration::from_secs(1))
                    .with_depends_on(vec!["doomed".to_string()]),
            ],
        ))
        .unwrap();

    let err = executor
        .execute(&pattern_id, "F1", Map::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::HandlerFailed);
    assert!(err.to_string().contains("doomed"));
    assert_eq!(dependent_calls.load(Ordering::SeqCst), 0);
}

/// Cache wrapper that fails plain-key writes to execution state after the
/// first one, simulating a cache outage at commit time.
struct FlakyStateCache {
    inner: MemoryCache,
    fail_state_writes: AtomicBool,
}

impl FlakyStateCache {
    fn new() -> Self {
        Self {
            inner: MemoryCache::new(),
            fail_state_writes: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Cache for FlakyStateCache {
    async fn set(
        &self,
        key: &str,
        field: &str,
        value: &Value,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        if key.starts_with("orchestration:state:") {
            if self.fail_state_writes.load(Ordering::SeqCst) {
                return Err(CacheError::Backend("connection reset".to_string()));
            }
            // Let the seed write through, then fail commits.
            self.fail_state_writes.store(true, Ordering::SeqCst);
        }
        self.inner.set(key, field, value, ttl).await
    }

    async fn get(&self, key: &str, field: &str) -> Result<Value, CacheError> {
        self.inner.get(key, field).await
    }

    async fn delete(&self, key: &str, field: &str) -> Result<(), CacheError> {
        self.inner.delete(key, field).await
    }

    async fn set_add(&self, key: &str, members: &[String]) -> Result<(), CacheError> {
        self.inner.set_add(key, members).await
    }

    async fn set_remove(&self, key: &str, members: &[String]) -> Result<(), CacheError> {
        self.inner.set_remove(key, members).await
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, CacheError> {
        self.inner.set_members(key).await
    }

    async fn set_intersect(&self, keys: &[String]) -> Result<Vec<String>, CacheError> {
        self.inner.set_intersect(keys).await
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &Value,
        ttl: Option<Duration>,
    ) -> Result<bool, CacheError> {
        self.inner.set_if_absent(key, value, ttl).await
    }

    async fn pipeline(
        &self,
        commands: Vec<PipelineCommand>,
    ) -> Result<Vec<PipelineReply>, CacheError> {
        self.inner.pipeline(commands).await
    }
}

#[tokio::test]
async fn test_unpersistable_commit_is_fatal() {
    let cache = Arc::new(FlakyStateCache::new());
    let registry = Arc::new(ActionRegistry::new());
    let calls = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&calls);
    registry.register(
        "test",
        "work",
        ActionEntry::new(vec![], move |_params: ParamMap| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(json!("done"))
            }
        }),
    );

    let executor = PatternExecutor::new(Arc::clone(&cache) as Arc<dyn Cache>, registry);
    let pattern_id = executor
        .register(Pattern::new(
            "commit-fail",
            vec![Step::new("test", "work", Duration::from_secs(1)).with_retries(3)],
        ))
        .unwrap();

    let err = executor
        .execute(&pattern_id, "C1", Map::new())
        .await
        .unwrap_err();

    // Non-retryable: the handler ran once and the error names the commit.
    assert_eq!(err.kind(), ErrorKind::StateCommitFailed);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // The persisted state still shows the step incomplete, so the same
    // execution id resumes it once the cache is healthy.
    let state: ExecutionState = serde_json::from_value(
        cache
            .inner
            .get(&keys::execution_state("C1"), "")
            .await
            .unwrap(),
    )
    .unwrap();
    assert!(!state.is_completed("work"));
}

#[tokio::test]
async fn test_single_flight_rejects_concurrent_execution() {
    let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());
    let registry = Arc::new(ActionRegistry::new());
    registry.register(
        "test",
        "linger",
        ActionEntry::new(vec![], |_params: ParamMap| async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(json!("done"))
        }),
    );

    let executor = Arc::new(PatternExecutor::new(cache, registry));
    let pattern_id = executor
        .register(Pattern::new(
            "lingering",
            vec![Step::new("test", "linger", Duration::from_secs(1))],
        ))
        .unwrap();

    let racing = Arc::clone(&executor);
    let racing_id = pattern_id.clone();
    let in_flight =
        tokio::spawn(async move { racing.execute(&racing_id, "S1", Map::new()).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    let err = executor
        .execute(&pattern_id, "S1", Map::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    in_flight.await.unwrap().unwrap();

    // With the lock released, the same id is accepted again (and resumes).
    executor.execute(&pattern_id, "S1", Map::new()).await.unwrap();
}

#[tokio::test]
async fn test_cancellation_abandons_unstarted_steps() {
    let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());
    let registry = Arc::new(ActionRegistry::new());
    registry.register(
        "test",
        "linger",
        ActionEntry::new(vec![], |_params: ParamMap| async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(json!("done"))
        }),
    );

    let executor = PatternExecutor::new(cache, registry);
    let pattern_id = executor
        .register(Pattern::new(
            "cancellable",
            vec![Step::new("test", "linger", Duration::from_secs(60))],
        ))
        .unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = executor
        .execute_with_cancel(&pattern_id, "X1", Map::new(), cancel)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TimedOut);
    assert!(err.to_string().contains("cancelled"));
}

#[tokio::test]
async fn test_statistics_update_once_per_finished_execution() {
    let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());
    let registry = Arc::new(ActionRegistry::new());
    registry.register(
        "test",
        "work",
        ActionEntry::new(vec![], |_params: ParamMap| async move { Ok(json!("ok")) }),
    );

    let store = Arc::new(PatternStore::new(Arc::clone(&cache)));
    let stored = store
        .store(Pattern::new(
            "counted",
            vec![Step::new("test", "work", Duration::from_secs(1))],
        ))
        .await
        .unwrap();

    let executor = PatternExecutor::new(Arc::clone(&cache), registry)
        .with_pattern_store(Arc::clone(&store));
    executor.register(stored.clone()).unwrap();

    executor.execute(&stored.id, "ST1", Map::new()).await.unwrap();
    let after_first = store.get(&stored.id).await.unwrap();
    assert_eq!(after_first.usage_count, 1);
    assert!((after_first.success_rate - 1.0).abs() < 1e-9);

    // Replaying the finished execution records nothing.
    executor.execute(&stored.id, "ST1", Map::new()).await.unwrap();
    let after_replay = store.get(&stored.id).await.unwrap();
    assert_eq!(after_replay.usage_count, 1);

    // A distinct execution records a second success.
    executor.execute(&stored.id, "ST2", Map::new()).await.unwrap();
    assert_eq!(store.get(&stored.id).await.unwrap().usage_count, 2);
}

#[tokio::test]
async fn test_exhausted_step_is_dead_lettered() {
    let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());
    let registry = Arc::new(ActionRegistry::new());
    registry.register(
        "test",
        "hopeless",
        ActionEntry::new(vec![], |_params: ParamMap| async move {
            Err::<Value, _>(ActionError::retryable("downstream unavailable"))
        }),
    );

    let sink = Arc::new(DeadLetterSink::new(Arc::clone(&cache)));
    let executor = PatternExecutor::new(cache, registry)
        .with_dead_letters(Arc::clone(&sink))
        .with_config(ExecutorConfig::default().with_retry_delay(Duration::from_millis(5)));
    let pattern_id = executor
        .register(Pattern::new(
            "hopeless",
            vec![Step::new("test", "hopeless", Duration::from_secs(1)).with_retries(1)],
        ))
        .unwrap();

    let err = executor
        .execute(&pattern_id, "D1", Map::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::HandlerFailed);

    let entries = sink.entries().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].event_type, "test:hopeless");
    assert!(entries[0].error.contains("downstream unavailable"));
}

#[tokio::test]
async fn test_unknown_pattern_and_inactive_pattern() {
    let h = harness();

    let err = h
        .executor
        .execute("no-such-pattern", "E1", Map::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let mut inactive = two_step_pattern();
    inactive.is_active = false;
    let inactive_id = h.executor.register(inactive).unwrap();
    let err = h
        .executor
        .execute(&inactive_id, "E1", full_input())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[tokio::test]
async fn test_run_deadline_bounds_the_whole_call() {
    let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());
    let registry = Arc::new(ActionRegistry::new());
    registry.register(
        "test",
        "endless",
        ActionEntry::new(vec![], |_params: ParamMap| async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(json!("never"))
        }),
    );

    let executor = PatternExecutor::new(cache, registry).with_config(
        ExecutorConfig::default().with_run_timeout(Duration::from_millis(100)),
    );
    let pattern_id = executor
        .register(Pattern::new(
            "endless",
            vec![Step::new("test", "endless", Duration::from_secs(60))],
        ))
        .unwrap();

    let err = executor
        .execute(&pattern_id, "RT1", Map::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TimedOut);
    assert!(err.to_string().contains("run deadline"));
}
