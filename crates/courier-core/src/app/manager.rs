//! Manager - 永続化付きリトライエンジンの公開 API
//!
//! # ライフサイクル
//! 1. `ManagerBuilder::start()` で store から未完了 task を復元し、worker を起動
//! 2. `add()` は store への書き込みが成功してから受理を返す
//! 3. `close()` で新規 dispatch を止め、猶予時間だけ実行中の attempt を待つ

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{info, warn};

use super::builder::ManagerBuilder;
use super::config::ManagerConfig;
use super::dispatcher::{Dispatcher, store_retry_policy};
use super::ready_set::ReadySet;
use super::status::QueueCounts;
use super::worker_loop::WorkerGroup;
use crate::domain::{
    CourierError, DomainEvent, RetryDecider, StoreError, TaskId, TaskRecord, TaskStatus,
};
use crate::ports::{Clock, EventSink, Executor, TaskStore};
use crate::typed::Task;

/// Result of a successful `add`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Persisted and queued.
    Accepted,
    /// A task with the same id is already live in memory or already has a
    /// row in the store (including a dead letter); nothing was written.
    Deduplicated,
}

/// Result of `close`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every worker stopped within the grace period.
    Drained,
    /// The grace period ran out. These tasks stay InFlight in the store and
    /// are re-run on the next start.
    GraceExpired { in_flight: usize },
}

/// Durable retrying executor for one task kind.
///
/// # 使用例
/// ```ignore
/// let manager = Manager::start(config, store, executor).await?;
/// manager.add(task).await?;
/// manager.close(Duration::from_secs(10)).await;
/// ```
pub struct Manager<T: Task> {
    dispatcher: Arc<Dispatcher<T>>,
    workers: Mutex<Option<WorkerGroup>>,
    closed: AtomicBool,
    config: ManagerConfig,
}

impl<T: Task> Manager<T> {
    /// Start with the system clock and tracing event sink.
    pub async fn start(
        config: ManagerConfig,
        store: Arc<dyn TaskStore<T>>,
        executor: Arc<dyn Executor<T>>,
    ) -> Result<Self, CourierError> {
        ManagerBuilder::new(config, store, executor).start().await
    }

    pub fn builder(
        config: ManagerConfig,
        store: Arc<dyn TaskStore<T>>,
        executor: Arc<dyn Executor<T>>,
    ) -> ManagerBuilder<T> {
        ManagerBuilder::new(config, store, executor)
    }

    /// Recover from the store and spawn workers. `config` is already validated.
    pub(crate) async fn launch(
        config: ManagerConfig,
        store: Arc<dyn TaskStore<T>>,
        executor: Arc<dyn Executor<T>>,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventSink>,
    ) -> Result<Self, CourierError> {
        let dispatcher = Arc::new(Dispatcher {
            store,
            executor,
            decider: RetryDecider::new(config.backoff_policy(), config.max_attempts),
            clock,
            events,
            poll_interval: config.poll_interval(),
            store_retry: store_retry_policy(),
            ready: Mutex::new(ReadySet::new()),
            notify: Notify::new(),
        });

        let recovered = recover(&dispatcher, &config).await?;
        let workers = WorkerGroup::spawn(config.concurrency_limit, Arc::clone(&dispatcher));
        info!(
            kind = T::TYPE,
            workers = config.concurrency_limit,
            recovered,
            "manager started"
        );

        Ok(Self {
            dispatcher,
            workers: Mutex::new(Some(workers)),
            closed: AtomicBool::new(false),
            config,
        })
    }

    /// Persist `task` and queue it for execution.
    ///
    /// Returns only after the store has accepted the write; a store failure
    /// is returned as `CourierError::Submit` and nothing is queued. A task
    /// whose id is already live, or already stored as a dead letter, is
    /// ignored: terminal tasks are never re-dispatched.
    pub async fn add(&self, task: T) -> Result<Submission, CourierError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CourierError::Closed(T::TYPE));
        }

        let d = &self.dispatcher;
        let id = task.task_id();
        let record = TaskRecord::new(id.clone(), task, d.clock.now());

        if !d.ready().reserve(&record) {
            d.emit(DomainEvent::TaskDeduplicated { kind: T::TYPE, id });
            return Ok(Submission::Deduplicated);
        }

        match d.store.insert_new(&record).await {
            Ok(true) => {}
            Ok(false) => {
                d.ready().release(&id);
                d.emit(DomainEvent::TaskDeduplicated { kind: T::TYPE, id });
                return Ok(Submission::Deduplicated);
            }
            Err(source) => {
                d.ready().release(&id);
                return Err(CourierError::Submit { id, source });
            }
        }

        d.enqueue(record, Instant::now());
        d.emit(DomainEvent::TaskAdded { kind: T::TYPE, id });
        Ok(Submission::Accepted)
    }

    /// Live task counts.
    pub fn status(&self) -> QueueCounts {
        self.dispatcher.ready().counts()
    }

    /// Live tasks (queued, waiting for retry, or in flight) matching `pred`.
    pub fn find(&self, pred: impl Fn(&TaskRecord<T>) -> bool) -> Vec<TaskRecord<T>> {
        self.dispatcher.ready().find(pred)
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.dispatcher.ready().contains(id)
    }

    /// Dead letters of this kind, oldest first.
    pub async fn abandoned(&self) -> Result<Vec<TaskRecord<T>>, CourierError> {
        Ok(self.dispatcher.store.list_abandoned().await?)
    }

    /// Delete a dead letter.
    ///
    /// The delete itself is conditional on the row being Abandoned; the
    /// follow-up read only picks the error to report.
    pub async fn purge(&self, id: &TaskId) -> Result<(), CourierError> {
        let store = &self.dispatcher.store;
        if store.purge_abandoned(id).await? {
            return Ok(());
        }
        match store.get(id).await? {
            None => Err(CourierError::Store(StoreError::NotFound(id.clone()))),
            Some(record) => Err(CourierError::NotAbandoned {
                id: id.clone(),
                status: record.status,
            }),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Stop dispatching and wait up to `grace` for in-flight attempts.
    ///
    /// Attempts still running after `grace` are left to finish in the
    /// background; their store rows stay InFlight until they do.
    pub async fn close(&self, grace: Duration) -> ShutdownOutcome {
        self.closed.store(true, Ordering::SeqCst);

        let group = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(group) = group else {
            return ShutdownOutcome::Drained;
        };

        if group.shutdown_within(grace).await {
            info!(kind = T::TYPE, "manager closed");
            ShutdownOutcome::Drained
        } else {
            let in_flight = self.dispatcher.ready().in_flight();
            warn!(
                kind = T::TYPE,
                in_flight,
                grace_ms = grace.as_millis() as u64,
                "shutdown grace expired with tasks in flight"
            );
            ShutdownOutcome::GraceExpired { in_flight }
        }
    }
}

impl<T: Task> Drop for Manager<T> {
    fn drop(&mut self) {
        let workers = self
            .workers
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(group) = workers.as_ref() {
            group.request_shutdown();
        }
    }
}

/// Seed the ready set from the store.
///
/// - InFlight rows lost their worker: they go back to Pending, attempts kept.
/// - Failed rows wait out the remainder of their nominal backoff.
/// - Failed rows already at the attempt budget are abandoned.
async fn recover<T: Task>(
    d: &Dispatcher<T>,
    config: &ManagerConfig,
) -> Result<usize, CourierError> {
    let pending = d
        .store
        .list_pending()
        .await
        .map_err(CourierError::Recovery)?;
    let backoff = config.backoff_policy();
    let now = d.clock.now();
    let instant_now = Instant::now();

    let mut recovered = 0;
    for mut record in pending {
        record.recover();

        if record.status == TaskStatus::Failed && record.attempts >= config.max_attempts {
            let reason = format!(
                "max attempts reached ({}/{}): {}",
                record.attempts,
                config.max_attempts,
                record.last_error.as_deref().unwrap_or("unknown error")
            );
            record.mark_abandoned(reason.clone());
            d.store
                .mark_status(&record.id, &record.status_update())
                .await
                .map_err(CourierError::Recovery)?;
            d.emit(DomainEvent::TaskAbandoned {
                kind: T::TYPE,
                id: record.id.clone(),
                attempts: record.attempts,
                reason,
            });
            continue;
        }

        let mut eligible_at = instant_now;
        if record.status == TaskStatus::Failed
            && let Some(last) = record.last_attempt_at
        {
            let elapsed = (now - last).to_std().unwrap_or(Duration::ZERO);
            eligible_at += backoff.nominal_delay(record.attempts).saturating_sub(elapsed);
        }

        d.emit(DomainEvent::TaskRecovered {
            kind: T::TYPE,
            id: record.id.clone(),
            attempts: record.attempts,
        });
        d.ready().enqueue(record, eligible_at);
        recovered += 1;
    }
    Ok(recovered)
}
