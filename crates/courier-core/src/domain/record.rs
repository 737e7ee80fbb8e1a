//! Task record: payload + execution metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{TaskId, TaskStatus};

/// Metadata + payload for a task owned by the manager.
///
/// Design:
/// - The store holds the durable copy; the manager's ready set holds a mirror.
/// - All status transitions happen through the methods below.
/// - `attempts` only ever grows, by exactly one per `start_attempt`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord<T> {
    pub id: TaskId,
    pub payload: T,
    pub status: TaskStatus,

    /// Number of dispatches so far (including the current one while InFlight).
    pub attempts: u32,

    pub created_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,

    /// Reason reported by the most recent failed attempt.
    pub last_error: Option<String>,
}

impl<T> TaskRecord<T> {
    pub fn new(id: TaskId, payload: T, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            payload,
            status: TaskStatus::Pending,
            attempts: 0,
            created_at,
            last_attempt_at: None,
            last_error: None,
        }
    }

    /// Mark as in flight (increment attempts).
    pub fn start_attempt(&mut self, now: DateTime<Utc>) {
        debug_assert!(!self.status.is_terminal(), "terminal task re-dispatched");
        self.status = TaskStatus::InFlight;
        self.attempts += 1;
        self.last_attempt_at = Some(now);
    }

    /// Mark as failed-but-retryable.
    pub fn schedule_retry(&mut self, error: impl Into<String>) {
        self.status = TaskStatus::Failed;
        self.last_error = Some(error.into());
    }

    /// Mark as a dead letter.
    pub fn mark_abandoned(&mut self, error: impl Into<String>) {
        self.status = TaskStatus::Abandoned;
        self.last_error = Some(error.into());
    }

    pub fn mark_succeeded(&mut self) {
        self.status = TaskStatus::Succeeded;
    }

    /// An InFlight record found at startup lost its worker with the crash.
    /// It goes back to Pending; the interrupted attempt stays counted.
    pub fn recover(&mut self) {
        if self.status == TaskStatus::InFlight {
            self.status = TaskStatus::Pending;
        }
    }

    /// The mutable fields, as written by `TaskStore::mark_status`.
    pub fn status_update(&self) -> StatusUpdate {
        StatusUpdate {
            status: self.status,
            attempts: self.attempts,
            last_attempt_at: self.last_attempt_at,
            last_error: self.last_error.clone(),
        }
    }

    /// Apply a status update to this record (used by stores).
    pub fn apply(&mut self, update: &StatusUpdate) {
        self.status = update.status;
        self.attempts = update.attempts;
        self.last_attempt_at = update.last_attempt_at;
        self.last_error = update.last_error.clone();
    }
}

/// Mutable fields of a task record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub status: TaskStatus,
    pub attempts: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn new_record_is_pending_with_no_attempts() {
        let record = TaskRecord::new(TaskId::new("a"), (), at(0));
        assert_eq!(record.status, TaskStatus::Pending);
        assert_eq!(record.attempts, 0);
        assert_eq!(record.last_attempt_at, None);
    }

    #[test]
    fn each_attempt_increments_by_one() {
        let mut record = TaskRecord::new(TaskId::new("a"), (), at(0));

        record.start_attempt(at(1));
        assert_eq!(record.status, TaskStatus::InFlight);
        assert_eq!(record.attempts, 1);
        assert_eq!(record.last_attempt_at, Some(at(1)));

        record.schedule_retry("boom");
        assert_eq!(record.status, TaskStatus::Failed);
        assert_eq!(record.attempts, 1);

        record.start_attempt(at(5));
        assert_eq!(record.attempts, 2);
        assert_eq!(record.last_attempt_at, Some(at(5)));
        assert_eq!(record.last_error.as_deref(), Some("boom"));
    }

    #[test]
    fn recover_keeps_attempt_count() {
        let mut record = TaskRecord::new(TaskId::new("a"), (), at(0));
        record.start_attempt(at(1));
        record.recover();
        assert_eq!(record.status, TaskStatus::Pending);
        assert_eq!(record.attempts, 1);
    }

    #[test]
    fn recover_leaves_failed_alone() {
        let mut record = TaskRecord::new(TaskId::new("a"), (), at(0));
        record.start_attempt(at(1));
        record.schedule_retry("x");
        record.recover();
        assert_eq!(record.status, TaskStatus::Failed);
    }

    #[test]
    fn status_update_roundtrips_through_apply() {
        let mut source = TaskRecord::new(TaskId::new("a"), 7u8, at(0));
        source.start_attempt(at(2));
        source.mark_abandoned("rejected");

        let mut copy = TaskRecord::new(TaskId::new("a"), 7u8, at(0));
        copy.apply(&source.status_update());
        assert_eq!(copy, source);
    }
}
