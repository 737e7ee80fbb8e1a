//! Shared fakes for the manager integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use courier_core::domain::StatusUpdate;
use courier_core::impls::InMemoryTaskStore;
use courier_core::ports::{Executor, TaskStore};
use courier_core::{ManagerConfig, Outcome, StoreError, Task, TaskId, TaskRecord};
use serde::{Deserialize, Serialize};
use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

/// Initialise tracing for tests (`RUST_LOG=debug cargo test` to see it).
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        fmt().with_env_filter(filter).with_test_writer().init();
    });
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub key: String,
}

impl Job {
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
        }
    }
}

impl Task for Job {
    const TYPE: &'static str = "test.job.run.v1";

    fn task_id(&self) -> TaskId {
        TaskId::new(self.key.clone())
    }
}

/// Fast settings: 10ms base backoff without jitter, 10ms poll.
pub fn fast_config(concurrency_limit: usize, max_attempts: u32) -> ManagerConfig {
    ManagerConfig {
        concurrency_limit,
        max_attempts,
        backoff_base_ms: 10,
        backoff_max_ms: 40,
        backoff_jitter_fraction: 0.0,
        poll_interval_ms: 10,
        shutdown_grace_ms: 1_000,
    }
}

/// Poll `cond` until it holds; panics after five seconds.
pub async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// One executor call as seen by `ScriptedExecutor`.
#[derive(Debug, Clone)]
pub struct Call {
    pub id: String,
    pub attempts: u32,
    pub at: Instant,
}

/// Executor that plays back a per-id script of outcomes.
///
/// - ids without a script (or with an exhausted one) get `fallback`
/// - records every call, the peak number of concurrent calls, and any
///   overlap between two calls for the same id
pub struct ScriptedExecutor {
    scripts: Mutex<HashMap<String, VecDeque<Outcome>>>,
    fallback: Outcome,
    hold: Duration,
    calls: Mutex<Vec<Call>>,
    running: Mutex<HashSet<String>>,
    overlaps: AtomicUsize,
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedExecutor {
    pub fn new(fallback: Outcome) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            fallback,
            hold: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            running: Mutex::new(HashSet::new()),
            overlaps: AtomicUsize::new(0),
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Keep every call busy for `hold` so concurrency is observable.
    pub fn holding(mut self, hold: Duration) -> Self {
        self.hold = hold;
        self
    }

    pub fn script(self, id: &str, outcomes: Vec<Outcome>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(id.to_string(), outcomes.into());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, id: &str) -> Vec<Call> {
        self.calls().into_iter().filter(|c| c.id == id).collect()
    }

    pub fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Executor<Job> for ScriptedExecutor {
    async fn execute(&self, task: &TaskRecord<Job>) -> Outcome {
        let id = task.id.to_string();
        if !self.running.lock().unwrap().insert(id.clone()) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        let now_running = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now_running, Ordering::SeqCst);
        self.calls.lock().unwrap().push(Call {
            id: id.clone(),
            attempts: task.attempts,
            at: Instant::now(),
        });

        if !self.hold.is_zero() {
            tokio::time::sleep(self.hold).await;
        }

        let outcome = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&id)
            .and_then(|script| script.pop_front())
            .unwrap_or_else(|| self.fallback.clone());

        self.current.fetch_sub(1, Ordering::SeqCst);
        self.running.lock().unwrap().remove(&id);
        outcome
    }
}

/// Executor whose attempts never return, standing in for a process that
/// dies mid-attempt.
#[derive(Default)]
pub struct StuckExecutor {
    pub started: AtomicU32,
}

#[async_trait]
impl Executor<Job> for StuckExecutor {
    async fn execute(&self, _task: &TaskRecord<Job>) -> Outcome {
        self.started.fetch_add(1, Ordering::SeqCst);
        std::future::pending::<Outcome>().await
    }
}

/// In-memory store that fails a configurable number of upcoming writes.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: InMemoryTaskStore<Job>,
    failing_puts: AtomicU32,
    failing_updates: AtomicU32,
    pub failed_writes: AtomicU32,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail the next `n` calls to `put` or `insert_new`.
    pub fn fail_puts(&self, n: u32) {
        self.failing_puts.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` calls to `mark_status` or `remove`.
    pub fn fail_updates(&self, n: u32) {
        self.failing_updates.store(n, Ordering::SeqCst);
    }

    fn should_fail(&self, counter: &AtomicU32) -> bool {
        let failing = counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            self.failed_writes.fetch_add(1, Ordering::SeqCst);
        }
        failing
    }

    fn outage() -> StoreError {
        StoreError::Unavailable("injected outage".into())
    }
}

#[async_trait]
impl TaskStore<Job> for FlakyStore {
    async fn put(&self, task: &TaskRecord<Job>) -> Result<(), StoreError> {
        if self.should_fail(&self.failing_puts) {
            return Err(Self::outage());
        }
        self.inner.put(task).await
    }

    async fn insert_new(&self, task: &TaskRecord<Job>) -> Result<bool, StoreError> {
        if self.should_fail(&self.failing_puts) {
            return Err(Self::outage());
        }
        self.inner.insert_new(task).await
    }

    async fn mark_status(&self, id: &TaskId, update: &StatusUpdate) -> Result<(), StoreError> {
        if self.should_fail(&self.failing_updates) {
            return Err(Self::outage());
        }
        self.inner.mark_status(id, update).await
    }

    async fn remove(&self, id: &TaskId) -> Result<(), StoreError> {
        if self.should_fail(&self.failing_updates) {
            return Err(Self::outage());
        }
        self.inner.remove(id).await
    }

    async fn list_pending(&self) -> Result<Vec<TaskRecord<Job>>, StoreError> {
        self.inner.list_pending().await
    }

    async fn get(&self, id: &TaskId) -> Result<Option<TaskRecord<Job>>, StoreError> {
        self.inner.get(id).await
    }

    async fn list_abandoned(&self) -> Result<Vec<TaskRecord<Job>>, StoreError> {
        self.inner.list_abandoned().await
    }

    async fn purge_abandoned(&self, id: &TaskId) -> Result<bool, StoreError> {
        self.inner.purge_abandoned(id).await
    }
}
