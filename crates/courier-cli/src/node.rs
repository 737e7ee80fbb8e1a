//! Subcommand bodies: wire the local database, the two managers and their
//! executors together.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use courier_core::impls::LocalDb;
use courier_core::workloads::{
    Backends, Remotes, TagReplicationExecutor, TagReplicationTask, WriteBackExecutor,
    WriteBackTask, prune_stale_destinations,
};
use courier_core::{Manager, ShutdownOutcome, TaskId};
use tracing::{info, warn};

use crate::clients::{FsBlobCache, LogOnlyBackend, LogOnlyOrigin, LogOnlyTagClients};
use crate::config::NodeConfig;

async fn open_db(config: &NodeConfig) -> Result<LocalDb> {
    let path = &config.localdb.path;
    LocalDb::open(path)
        .await
        .with_context(|| format!("opening local database {}", path.display()))
}

/// `courier serve`: run both managers until Ctrl-C, then drain them.
///
/// Nothing here calls `Manager::add`; the managers only work through the
/// tasks recovered from the local database.
pub async fn serve(config: NodeConfig, loopback: bool) -> Result<()> {
    let db = open_db(&config).await?;

    let remotes = Remotes::build(&config.remotes).context("building remotes")?;
    if remotes.is_empty() {
        warn!("no remotes configured; tag replication has nowhere to go");
    }
    let tag_store = Arc::new(db.task_store::<TagReplicationTask>());
    let pruned = prune_stale_destinations(tag_store.as_ref(), &remotes)
        .await
        .context("pruning tasks for removed remotes")?;
    if pruned > 0 {
        info!(pruned, "dropped tag replication tasks for removed remotes");
    }

    let tag_executor = TagReplicationExecutor::new(
        Arc::new(LogOnlyOrigin::new(loopback)),
        Arc::new(LogOnlyTagClients::new(loopback)),
        config.tag_replication.timeout(),
    );
    let tags = Manager::<TagReplicationTask>::start(
        config.tag_replication.manager.clone(),
        tag_store,
        Arc::new(tag_executor),
    )
    .await
    .context("starting tag replication manager")?;

    let mut backends = Backends::new();
    for backend in &config.backends {
        backends = backends
            .register(&backend.namespace, Arc::new(LogOnlyBackend::new(loopback)))
            .with_context(|| format!("backend namespace pattern {:?}", backend.namespace))?;
    }
    let writeback_executor = WriteBackExecutor::new(
        Arc::new(FsBlobCache::new(config.blob_cache.dir.clone())),
        Arc::new(backends),
        config.write_back.timeout(),
    );
    let write_back = Manager::<WriteBackTask>::start(
        config.write_back.manager.clone(),
        Arc::new(db.task_store::<WriteBackTask>()),
        Arc::new(writeback_executor),
    )
    .await
    .context("starting write-back manager")?;

    info!(
        db = %config.localdb.path.display(),
        loopback,
        tag_tasks = tags.status().total(),
        writeback_tasks = write_back.status().total(),
        "courier node ready"
    );

    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;
    info!("shutting down");

    let (tag_outcome, writeback_outcome) = tokio::join!(
        tags.close(config.tag_replication.manager.shutdown_grace()),
        write_back.close(config.write_back.manager.shutdown_grace()),
    );
    for (kind, outcome) in [
        ("tag_replication", tag_outcome),
        ("write_back", writeback_outcome),
    ] {
        match outcome {
            ShutdownOutcome::Drained => info!(kind, "manager drained"),
            ShutdownOutcome::GraceExpired { in_flight } => {
                warn!(kind, in_flight, "grace period expired; tasks resume on next start")
            }
        }
    }

    db.close().await;
    Ok(())
}

/// `courier dead-letters`: one JSON object per abandoned task on stdout.
pub async fn dead_letters(config: NodeConfig, kind: Option<String>) -> Result<()> {
    let db = open_db(&config).await?;
    let letters = db
        .dead_letters(kind.as_deref())
        .await
        .context("listing dead letters")?;
    for letter in &letters {
        let line = serde_json::to_string(&serde_json::json!({
            "kind": letter.kind,
            "task": letter.record,
        }))?;
        println!("{line}");
    }
    info!(count = letters.len(), "dead letters listed");
    db.close().await;
    Ok(())
}

/// `courier purge`: delete one abandoned task.
pub async fn purge(config: NodeConfig, kind: String, id: String) -> Result<()> {
    let db = open_db(&config).await?;
    let removed = db
        .purge(&kind, &TaskId::new(id.clone()))
        .await
        .context("purging dead letter")?;
    db.close().await;
    if !removed {
        bail!("no abandoned {kind} task with id {id:?}");
    }
    info!(kind = %kind, id = %id, "dead letter purged");
    Ok(())
}
