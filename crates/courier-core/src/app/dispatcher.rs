//! Dispatcher - worker が共有する状態と、1 task 分の遷移処理
//!
//! # フロー（1 attempt）
//! 1. ReadySet::claim で task を取得（InFlight）
//! 2. attempts += 1 して TaskStore に InFlight を書く
//! 3. Executor 実行 → Outcome
//! 4. Decider 実行 → Decision
//! 5. Decision を TaskStore と ReadySet に反映
//!
//! # 不変条件
//! - ReadySet のロックを持ったまま await しない
//! - store への書き込みが成功するまで in-memory の slot は残す
//!   （同じ id の再投入は重複として扱われる）

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{Notify, watch};
use tokio::time::Instant;
use tracing::{debug, error, warn};

use super::ready_set::{Claim, ReadySet};
use crate::domain::{
    BackoffPolicy, Decider, Decision, DomainEvent, RetryDecider, StatusUpdate, StoreError,
    TaskId, TaskRecord,
};
use crate::ports::{Clock, EventSink, Executor, TaskStore};
use crate::typed::Task;

/// Backoff between retries of a failed store write.
pub(crate) fn store_retry_policy() -> BackoffPolicy {
    BackoffPolicy::new(Duration::from_millis(50), Duration::from_secs(10), 0.5)
}

/// A write applied to the store after an attempt.
#[derive(Debug, Clone)]
enum StoreOp {
    MarkStatus(StatusUpdate),
    Remove,
}

impl StoreOp {
    fn name(&self) -> &'static str {
        match self {
            StoreOp::MarkStatus(_) => "mark_status",
            StoreOp::Remove => "remove",
        }
    }
}

enum ClaimWrite {
    Persisted,
    /// Shutdown arrived while the write was being retried.
    Interrupted,
    /// The store will never accept this write.
    Rejected(StoreError),
}

pub(crate) struct Dispatcher<T: Task> {
    pub(crate) store: Arc<dyn TaskStore<T>>,
    pub(crate) executor: Arc<dyn Executor<T>>,
    pub(crate) decider: RetryDecider,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) events: Arc<dyn EventSink>,
    pub(crate) poll_interval: Duration,
    pub(crate) store_retry: BackoffPolicy,
    pub(crate) ready: Mutex<ReadySet<T>>,
    pub(crate) notify: Notify,
}

impl<T: Task> Dispatcher<T> {
    pub(crate) fn ready(&self) -> MutexGuard<'_, ReadySet<T>> {
        self.ready.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn emit(&self, event: DomainEvent) {
        self.events.emit(&event);
    }

    /// Make `record` dispatchable at `eligible_at` and wake one worker.
    pub(crate) fn enqueue(&self, record: TaskRecord<T>, eligible_at: Instant) {
        self.ready().enqueue(record, eligible_at);
        self.notify.notify_one();
    }

    /// Wait until a task is eligible and claim it.
    ///
    /// Cancel safe: a task is only claimed in the same poll that returns it.
    pub(crate) async fn next_ready(&self) -> TaskRecord<T> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let now = Instant::now();
            let claim = self.ready().claim(now);
            let wake_at = match claim {
                Claim::Ready(record) => return record,
                Claim::WaitUntil(at) => at.min(now + self.poll_interval),
                Claim::Empty => now + self.poll_interval,
            };

            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }

    /// Run one attempt of a claimed task and apply the decision.
    pub(crate) async fn dispatch(
        &self,
        worker_id: usize,
        claimed: TaskRecord<T>,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) {
        let mut record = claimed.clone();
        record.start_attempt(self.clock.now());

        match self.persist_claim(&record, shutdown_rx).await {
            ClaimWrite::Persisted => {}
            ClaimWrite::Interrupted => {
                // Not started: hand the task back untouched.
                self.enqueue(claimed, Instant::now());
                return;
            }
            ClaimWrite::Rejected(err) => {
                error!(
                    kind = T::TYPE,
                    task_id = %record.id,
                    error = %err,
                    "cannot record dispatch, dropping task from memory"
                );
                self.ready().remove(&record.id);
                return;
            }
        }

        self.ready().update(&record);
        self.emit(DomainEvent::TaskDispatched {
            kind: T::TYPE,
            id: record.id.clone(),
            attempts: record.attempts,
        });
        debug!(worker_id, kind = T::TYPE, task_id = %record.id, attempts = record.attempts, "executing");

        let outcome = self.executor.execute(&record).await;

        match self.decider.decide(record.attempts, &outcome) {
            Decision::Retire => {
                record.mark_succeeded();
                self.write(&record.id, StoreOp::Remove).await;
                self.ready().remove(&record.id);
                self.emit(DomainEvent::TaskSucceeded {
                    kind: T::TYPE,
                    id: record.id.clone(),
                    attempts: record.attempts,
                });
            }
            Decision::Retry { delay, reason } => {
                record.schedule_retry(reason.clone());
                self.write(&record.id, StoreOp::MarkStatus(record.status_update()))
                    .await;
                self.emit(DomainEvent::TaskRetryScheduled {
                    kind: T::TYPE,
                    id: record.id.clone(),
                    attempts: record.attempts,
                    delay,
                    reason,
                });
                self.enqueue(record, Instant::now() + delay);
            }
            Decision::Abandon { reason } => {
                record.mark_abandoned(reason.clone());
                self.write(&record.id, StoreOp::MarkStatus(record.status_update()))
                    .await;
                self.ready().remove(&record.id);
                self.emit(DomainEvent::TaskAbandoned {
                    kind: T::TYPE,
                    id: record.id.clone(),
                    attempts: record.attempts,
                    reason,
                });
            }
        }
    }

    /// Record InFlight before executing. Retries until it sticks or shutdown.
    async fn persist_claim(
        &self,
        record: &TaskRecord<T>,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> ClaimWrite {
        let update = record.status_update();
        let mut failures = 0u32;
        loop {
            match self.store.mark_status(&record.id, &update).await {
                Ok(()) => return ClaimWrite::Persisted,
                Err(err) if !err.is_retryable() => return ClaimWrite::Rejected(err),
                Err(err) => {
                    failures += 1;
                    self.report_write_failure(&record.id, "mark_status", &err);
                }
            }

            if *shutdown_rx.borrow() {
                return ClaimWrite::Interrupted;
            }
            let delay = self.store_retry.delay(failures);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown_rx.changed() => return ClaimWrite::Interrupted,
            }
        }
    }

    /// Apply a post-attempt write, retrying with backoff until it succeeds.
    ///
    /// Errors that cannot succeed on retry are logged and dropped; the record
    /// is left as the store last saw it and is picked up again on restart.
    async fn write(&self, id: &TaskId, op: StoreOp) {
        let mut failures = 0u32;
        loop {
            let result = match &op {
                StoreOp::MarkStatus(update) => self.store.mark_status(id, update).await,
                StoreOp::Remove => self.store.remove(id).await,
            };
            match result {
                Ok(()) => return,
                Err(err) if !err.is_retryable() => {
                    error!(
                        kind = T::TYPE,
                        task_id = %id,
                        operation = op.name(),
                        error = %err,
                        "store write cannot succeed, giving up"
                    );
                    return;
                }
                Err(err) => {
                    failures += 1;
                    self.report_write_failure(id, op.name(), &err);
                    tokio::time::sleep(self.store_retry.delay(failures)).await;
                }
            }
        }
    }

    fn report_write_failure(&self, id: &TaskId, operation: &'static str, err: &StoreError) {
        warn!(kind = T::TYPE, task_id = %id, operation, error = %err, "store write failed, will retry");
        self.emit(DomainEvent::StoreWriteFailed {
            kind: T::TYPE,
            id: id.clone(),
            operation,
            error: err.to_string(),
        });
    }
}
