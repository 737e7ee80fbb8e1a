//! WorkerLoop - 固定数の worker でタスクを実行する
//!
//! - worker 数 = `concurrency_limit` なので、InFlight は常にそれ以下
//! - shutdown は watch channel で通知する（実行中の Executor は中断しない）

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::dispatcher::Dispatcher;
use crate::typed::Task;

/// Worker group handle.
/// - `request_shutdown()` で新しい task の取得を止める
/// - `shutdown_within()` で猶予付きで全 worker の終了を待つ
pub(crate) struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    /// Spawn `n` workers over the dispatcher's ready set.
    pub(crate) fn spawn<T: Task>(n: usize, dispatcher: Arc<Dispatcher<T>>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let joins = (0..n)
            .map(|worker_id| {
                let dispatcher = Arc::clone(&dispatcher);
                let rx = shutdown_rx.clone();
                tokio::spawn(worker_loop(worker_id, dispatcher, rx))
            })
            .collect();

        Self { shutdown_tx, joins }
    }

    pub(crate) fn request_shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    /// Stop all workers and wait up to `grace` for them to finish.
    ///
    /// Returns false if the grace period ran out. Workers still running are
    /// detached, not aborted: their current attempt completes on its own.
    pub(crate) async fn shutdown_within(self, grace: Duration) -> bool {
        self.request_shutdown();
        let deadline = Instant::now() + grace;

        let mut drained = true;
        for join in self.joins {
            if tokio::time::timeout_at(deadline, join).await.is_err() {
                drained = false;
            }
        }
        drained
    }
}

async fn worker_loop<T: Task>(
    worker_id: usize,
    dispatcher: Arc<Dispatcher<T>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    debug!(worker_id, kind = T::TYPE, "worker started");
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let record = tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    // group dropped without an explicit shutdown
                    warn!(worker_id, kind = T::TYPE, "worker group dropped, stopping");
                    break;
                }
                continue;
            }
            record = dispatcher.next_ready() => record,
        };

        dispatcher.dispatch(worker_id, record, &mut shutdown_rx).await;
    }
    debug!(worker_id, kind = T::TYPE, "worker stopped");
}
