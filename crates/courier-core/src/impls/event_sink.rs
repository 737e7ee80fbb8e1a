//! EventSink の実装

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use tracing::{debug, info, warn};

use crate::domain::DomainEvent;
use crate::ports::EventSink;

/// 何もしない sink
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _event: &DomainEvent) {}
}

/// tracing にイベントを流す sink（Manager のデフォルト）
///
/// 失敗系は warn、正常系は info / debug に振り分けます。
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: &DomainEvent) {
        let kind = event.kind();
        let task_id = event.task_id().as_str();
        match event {
            DomainEvent::TaskAdded { .. } => {
                debug!(kind, task_id, "task added");
            }
            DomainEvent::TaskDeduplicated { .. } => {
                debug!(kind, task_id, "task already queued, ignoring duplicate");
            }
            DomainEvent::TaskRecovered { attempts, .. } => {
                info!(kind, task_id, attempts, "task recovered from store");
            }
            DomainEvent::TaskDispatched { attempts, .. } => {
                debug!(kind, task_id, attempts, "task dispatched");
            }
            DomainEvent::TaskSucceeded { attempts, .. } => {
                info!(kind, task_id, attempts, "task succeeded");
            }
            DomainEvent::TaskRetryScheduled {
                attempts,
                delay,
                reason,
                ..
            } => {
                info!(
                    kind,
                    task_id,
                    attempts,
                    delay_ms = delay.as_millis() as u64,
                    reason = %reason,
                    "task failed, retry scheduled"
                );
            }
            DomainEvent::TaskAbandoned {
                attempts, reason, ..
            } => {
                warn!(kind, task_id, attempts, reason = %reason, "task abandoned");
            }
            DomainEvent::StoreWriteFailed {
                operation, error, ..
            } => {
                warn!(kind, task_id, operation, error = %error, "store write failed");
            }
        }
    }
}

/// イベント名ごとに件数を数える sink
///
/// テストでの待ち合わせや、簡易メトリクスとして使います。
#[derive(Debug, Default)]
pub struct CountingEventSink {
    counts: Mutex<HashMap<&'static str, u64>>,
}

impl CountingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// `name` は `DomainEvent::name()` の値
    pub fn count(&self, name: &str) -> u64 {
        self.counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    pub fn snapshot(&self) -> HashMap<&'static str, u64> {
        self.counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl EventSink for CountingEventSink {
    fn emit(&self, event: &DomainEvent) {
        *self
            .counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event.name())
            .or_insert(0) += 1;
    }
}
