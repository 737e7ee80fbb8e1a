//! Tag replication: propagate a tag → digest mapping to a remote cluster.
//!
//! One task per (destination, tag, digest). An attempt:
//! 1. asks the remote tag service which origin cluster serves it
//! 2. asks the local origin to push every dependency blob to that origin
//! 3. writes the tag on the remote ("duplicate put", no further replication)
//!
//! Every step is idempotent on the remote side, so re-running a crashed
//! attempt only repeats work.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::remotes::Remotes;
use super::{ClientError, outcome_of, with_timeout};
use crate::domain::{Outcome, StoreError, TaskId, TaskRecord};
use crate::ports::{Executor, TaskStore};
use crate::typed::Task;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagReplicationTask {
    pub tag: String,
    pub digest: String,
    /// Blob digests the tag depends on (layers, manifest).
    pub dependencies: Vec<String>,
    /// Address of the remote tag service.
    pub destination: String,
}

impl Task for TagReplicationTask {
    const TYPE: &'static str = "courier.tag.replicate.v1";

    fn task_id(&self) -> TaskId {
        TaskId::compose(&[&self.destination, &self.tag, &self.digest])
    }
}

/// Local origin cluster.
#[async_trait]
pub trait OriginClient: Send + Sync {
    /// Push blob `digest` to the origin cluster at `remote_origin`.
    async fn replicate_to_remote(&self, digest: &str, remote_origin: &str)
    -> Result<(), ClientError>;
}

/// A remote tag service.
#[async_trait]
pub trait TagClient: Send + Sync {
    /// Address of the origin cluster backing this tag service.
    async fn origin(&self) -> Result<String, ClientError>;

    /// Write `tag → digest` without triggering replication from the remote.
    async fn duplicate_put(&self, tag: &str, digest: &str) -> Result<(), ClientError>;
}

/// Hands out a tag client per remote address.
pub trait TagClientProvider: Send + Sync {
    fn provide(&self, address: &str) -> Arc<dyn TagClient>;
}

pub struct TagReplicationExecutor {
    origin: Arc<dyn OriginClient>,
    tag_clients: Arc<dyn TagClientProvider>,
    timeout: Duration,
}

impl TagReplicationExecutor {
    pub fn new(
        origin: Arc<dyn OriginClient>,
        tag_clients: Arc<dyn TagClientProvider>,
        timeout: Duration,
    ) -> Self {
        Self {
            origin,
            tag_clients,
            timeout,
        }
    }

    async fn replicate(&self, task: &TagReplicationTask) -> Result<(), ClientError> {
        let remote = self.tag_clients.provide(&task.destination);
        let remote_origin = remote.origin().await?;

        for dependency in &task.dependencies {
            self.origin
                .replicate_to_remote(dependency, &remote_origin)
                .await?;
        }
        debug!(
            tag = %task.tag,
            destination = %task.destination,
            blobs = task.dependencies.len(),
            "dependencies replicated"
        );

        remote.duplicate_put(&task.tag, &task.digest).await
    }
}

#[async_trait]
impl Executor<TagReplicationTask> for TagReplicationExecutor {
    async fn execute(&self, task: &TaskRecord<TagReplicationTask>) -> Outcome {
        outcome_of(with_timeout(self.timeout, self.replicate(&task.payload)).await)
    }
}

/// Drop pending tasks whose destination is no longer configured.
///
/// Run before starting the manager so removed remotes are not retried forever.
pub async fn prune_stale_destinations(
    store: &dyn TaskStore<TagReplicationTask>,
    remotes: &Remotes,
) -> Result<usize, StoreError> {
    let mut pruned = 0;
    for record in store.list_pending().await? {
        if !remotes.contains(&record.payload.destination) {
            store.remove(&record.id).await?;
            info!(
                task_id = %record.id,
                destination = %record.payload.destination,
                "pruned replication task for removed remote"
            );
            pruned += 1;
        }
    }
    Ok(pruned)
}
