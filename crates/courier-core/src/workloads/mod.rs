//! Workloads - エンジンに載せる具体的な仕事
//!
//! - **tag_replication**: tag → digest の対応をリモートクラスタへ複製
//! - **writeback**: ローカルキャッシュの blob をバックエンドへ書き戻し
//!
//! ネットワーククライアントは trait として定義し、実装はこのクレートの外に置きます。
//! クライアントのエラーはここで transient / permanent に分類します。

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use crate::domain::Outcome;

pub mod remotes;
pub mod tag_replication;
pub mod writeback;

pub use self::remotes::{RemoteConfig, Remotes, RemotesError};
pub use self::tag_replication::{
    OriginClient, TagClient, TagClientProvider, TagReplicationExecutor, TagReplicationTask,
    prune_stale_destinations,
};
pub use self::writeback::{
    BackendClient, BackendResolver, Backends, BlobCache, WriteBackExecutor, WriteBackTask,
};

/// Error reported by a remote collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("remote unavailable: {0}")]
    Unavailable(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("remote returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rejected: {0}")]
    Rejected(String),
}

impl ClientError {
    /// Will the same request fail again no matter how often it is retried?
    ///
    /// 4xx statuses are permanent except 408 (timeout) and 429 (throttled).
    pub fn is_permanent(&self) -> bool {
        match self {
            ClientError::Unavailable(_) | ClientError::Timeout(_) => false,
            ClientError::Status { status, .. } => {
                (400..500).contains(status) && *status != 408 && *status != 429
            }
            ClientError::NotFound(_) | ClientError::Rejected(_) => true,
        }
    }
}

/// Classify a client call result for the manager.
pub fn outcome_of(result: Result<(), ClientError>) -> Outcome {
    match result {
        Ok(()) => Outcome::success(),
        Err(err) if err.is_permanent() => Outcome::permanent(err.to_string()),
        Err(err) => Outcome::transient(err.to_string()),
    }
}

/// Bound one attempt by `limit`; running out is a `ClientError::Timeout`.
pub async fn with_timeout<F, T>(limit: Duration, attempt: F) -> Result<T, ClientError>
where
    F: Future<Output = Result<T, ClientError>>,
{
    tokio::time::timeout(limit, attempt)
        .await
        .unwrap_or(Err(ClientError::Timeout(limit)))
}
