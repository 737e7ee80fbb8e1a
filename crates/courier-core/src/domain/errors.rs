//! Errors - エラー型と分類
//!
//! - `StoreError`: 永続化層のエラー（SQLite / in-memory）
//! - `ConfigError`: ManagerConfig の検証エラー
//! - `CourierError`: Manager API が呼び出し側に返すエラー

use thiserror::Error;

use super::{TaskId, TaskStatus};

/// Error raised by a `TaskStore`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] sqlx::Error),

    #[error("payload codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("corrupt record {id}: {reason}")]
    Corrupt { id: String, reason: String },

    #[error("task {0} not found")]
    NotFound(TaskId),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Can retrying the same write succeed later?
    ///
    /// A missing row or an undecodable record will not fix itself.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Sqlite(_) | StoreError::Unavailable(_))
    }
}

/// ConfigError は設定の検証エラー
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("concurrency_limit must be at least 1")]
    ZeroConcurrency,

    #[error("max_attempts must be at least 1")]
    ZeroMaxAttempts,

    #[error("backoff_base_ms must be at least 1")]
    ZeroBackoffBase,

    #[error("backoff_max_ms ({max}) must not be below backoff_base_ms ({base})")]
    BackoffMaxBelowBase { max: u64, base: u64 },

    #[error("backoff_jitter_fraction must be in [0, 1), got {0}")]
    JitterOutOfRange(f64),

    #[error("poll_interval_ms must be at least 1")]
    ZeroPollInterval,
}

/// Error returned by the manager API.
#[derive(Debug, Error)]
pub enum CourierError {
    /// The task was not persisted, so it was not accepted.
    #[error("failed to persist task {id}: {source}")]
    Submit {
        id: TaskId,
        #[source]
        source: StoreError,
    },

    #[error("failed to recover tasks from store: {0}")]
    Recovery(#[source] StoreError),

    #[error("manager for {0} is closed")]
    Closed(&'static str),

    #[error("task {id} is {status}, only abandoned tasks can be purged")]
    NotAbandoned { id: TaskId, status: TaskStatus },

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_io_style_errors_are_retryable() {
        assert!(StoreError::Unavailable("disk".into()).is_retryable());
        assert!(!StoreError::NotFound(TaskId::new("a")).is_retryable());
        assert!(
            !StoreError::Corrupt {
                id: "a".into(),
                reason: "bad status".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn submit_error_names_the_task() {
        let err = CourierError::Submit {
            id: TaskId::new("ns|blob"),
            source: StoreError::Unavailable("disk full".into()),
        };
        let msg = err.to_string();
        assert!(msg.contains("ns|blob"));
        assert!(msg.contains("disk full"));
    }
}
