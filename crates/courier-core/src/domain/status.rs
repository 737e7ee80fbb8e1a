//! Task status state machine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Task status.
///
/// State transitions:
/// - Pending -> InFlight -> Succeeded (removed from the store)
/// - Pending -> InFlight -> Failed -> InFlight ... (loop until max_attempts)
/// - Pending -> InFlight -> Abandoned (retries exhausted or permanent failure)
///
/// `Failed` is the persisted form of "pending again, but only after a backoff delay".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Accepted and waiting for its first dispatch.
    Pending,

    /// Currently owned by a worker.
    InFlight,

    /// Last attempt failed transiently; eligible again after backoff.
    Failed,

    /// Executed successfully.
    Succeeded,

    /// Retained as a dead letter (retries exhausted or permanent failure).
    Abandoned,
}

impl TaskStatus {
    /// Is this a terminal status (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Abandoned)
    }

    /// Should a record with this status be reloaded on startup?
    pub fn is_recoverable(self) -> bool {
        matches!(
            self,
            TaskStatus::Pending | TaskStatus::InFlight | TaskStatus::Failed
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InFlight => "in_flight",
            TaskStatus::Failed => "failed",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Abandoned => "abandoned",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(TaskStatus::Pending),
            "in_flight" => Some(TaskStatus::InFlight),
            "failed" => Some(TaskStatus::Failed),
            "succeeded" => Some(TaskStatus::Succeeded),
            "abandoned" => Some(TaskStatus::Abandoned),
            _ => None,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
