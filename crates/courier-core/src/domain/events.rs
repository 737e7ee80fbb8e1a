//! Events - ドメインイベント
//!
//! Manager は状態遷移のたびに DomainEvent を EventSink へ送ります。
//! メトリクスやログの出力先はここに差し込みます。

use std::time::Duration;

use super::TaskId;

/// Something that happened to a task.
///
/// `kind` is the task kind (`Task::TYPE`) so one sink can serve several managers.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    TaskAdded {
        kind: &'static str,
        id: TaskId,
    },
    TaskDeduplicated {
        kind: &'static str,
        id: TaskId,
    },
    TaskRecovered {
        kind: &'static str,
        id: TaskId,
        attempts: u32,
    },
    TaskDispatched {
        kind: &'static str,
        id: TaskId,
        attempts: u32,
    },
    TaskSucceeded {
        kind: &'static str,
        id: TaskId,
        attempts: u32,
    },
    TaskRetryScheduled {
        kind: &'static str,
        id: TaskId,
        attempts: u32,
        delay: Duration,
        reason: String,
    },
    TaskAbandoned {
        kind: &'static str,
        id: TaskId,
        attempts: u32,
        reason: String,
    },
    StoreWriteFailed {
        kind: &'static str,
        id: TaskId,
        operation: &'static str,
        error: String,
    },
}

impl DomainEvent {
    /// Stable event name, usable as a metric name suffix.
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::TaskAdded { .. } => "task_added",
            DomainEvent::TaskDeduplicated { .. } => "task_deduplicated",
            DomainEvent::TaskRecovered { .. } => "task_recovered",
            DomainEvent::TaskDispatched { .. } => "task_dispatched",
            DomainEvent::TaskSucceeded { .. } => "task_succeeded",
            DomainEvent::TaskRetryScheduled { .. } => "task_retry_scheduled",
            DomainEvent::TaskAbandoned { .. } => "task_abandoned",
            DomainEvent::StoreWriteFailed { .. } => "store_write_failed",
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DomainEvent::TaskAdded { kind, .. }
            | DomainEvent::TaskDeduplicated { kind, .. }
            | DomainEvent::TaskRecovered { kind, .. }
            | DomainEvent::TaskDispatched { kind, .. }
            | DomainEvent::TaskSucceeded { kind, .. }
            | DomainEvent::TaskRetryScheduled { kind, .. }
            | DomainEvent::TaskAbandoned { kind, .. }
            | DomainEvent::StoreWriteFailed { kind, .. } => kind,
        }
    }

    pub fn task_id(&self) -> &TaskId {
        match self {
            DomainEvent::TaskAdded { id, .. }
            | DomainEvent::TaskDeduplicated { id, .. }
            | DomainEvent::TaskRecovered { id, .. }
            | DomainEvent::TaskDispatched { id, .. }
            | DomainEvent::TaskSucceeded { id, .. }
            | DomainEvent::TaskRetryScheduled { id, .. }
            | DomainEvent::TaskAbandoned { id, .. }
            | DomainEvent::StoreWriteFailed { id, .. } => id,
        }
    }
}
