//! Status - Manager の状態集計

use serde::{Deserialize, Serialize};

/// Live task counts for one manager.
///
/// Terminal tasks are not counted: succeeded tasks are gone, abandoned ones
/// are listed through `Manager::abandoned`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    /// Waiting for a first (or recovered) dispatch.
    pub queued: usize,
    /// Failed at least once, waiting for the backoff to elapse.
    pub retry_scheduled: usize,
    pub in_flight: usize,
}

impl QueueCounts {
    pub fn total(&self) -> usize {
        self.queued + self.retry_scheduled + self.in_flight
    }

    pub fn is_idle(&self) -> bool {
        self.total() == 0
    }
}
