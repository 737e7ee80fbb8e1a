//! Collaborators wired into the executors by `courier serve`.
//!
//! The remote clients only log. Without `--loopback` every call reports the
//! remote as unavailable, so tasks retry and end up in the dead-letter
//! table; with it every call succeeds.
//!
//! `serve` never submits tasks itself. The only work these clients see is
//! what the managers recover from the local database at startup, so with
//! `--loopback` a node simply drains the rows left by an earlier run.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use courier_core::workloads::{
    BackendClient, BlobCache, ClientError, OriginClient, TagClient, TagClientProvider,
};
use tracing::{info, warn};

fn unconfigured(what: &str) -> ClientError {
    ClientError::Unavailable(format!("no {what} client configured"))
}

pub struct LogOnlyOrigin {
    loopback: bool,
}

impl LogOnlyOrigin {
    pub fn new(loopback: bool) -> Self {
        Self { loopback }
    }
}

#[async_trait]
impl OriginClient for LogOnlyOrigin {
    async fn replicate_to_remote(
        &self,
        digest: &str,
        remote_origin: &str,
    ) -> Result<(), ClientError> {
        if !self.loopback {
            warn!(digest, remote_origin, "origin replication skipped");
            return Err(unconfigured("origin"));
        }
        info!(digest, remote_origin, "replicated blob to remote origin");
        Ok(())
    }
}

pub struct LogOnlyTagClients {
    loopback: bool,
}

impl LogOnlyTagClients {
    pub fn new(loopback: bool) -> Self {
        Self { loopback }
    }
}

impl TagClientProvider for LogOnlyTagClients {
    fn provide(&self, address: &str) -> Arc<dyn TagClient> {
        Arc::new(LogOnlyTagClient {
            address: address.to_string(),
            loopback: self.loopback,
        })
    }
}

struct LogOnlyTagClient {
    address: String,
    loopback: bool,
}

#[async_trait]
impl TagClient for LogOnlyTagClient {
    async fn origin(&self) -> Result<String, ClientError> {
        if !self.loopback {
            return Err(unconfigured("tag"));
        }
        Ok(format!("origin.{}", self.address))
    }

    async fn duplicate_put(&self, tag: &str, digest: &str) -> Result<(), ClientError> {
        if !self.loopback {
            return Err(unconfigured("tag"));
        }
        info!(remote = %self.address, tag, digest, "tag put on remote");
        Ok(())
    }
}

pub struct LogOnlyBackend {
    loopback: bool,
}

impl LogOnlyBackend {
    pub fn new(loopback: bool) -> Self {
        Self { loopback }
    }
}

#[async_trait]
impl BackendClient for LogOnlyBackend {
    async fn stat(&self, _name: &str) -> Result<bool, ClientError> {
        if !self.loopback {
            return Err(unconfigured("backend"));
        }
        Ok(false)
    }

    async fn upload(&self, name: &str, blob: Vec<u8>) -> Result<(), ClientError> {
        if !self.loopback {
            return Err(unconfigured("backend"));
        }
        info!(name, bytes = blob.len(), "blob uploaded to backend");
        Ok(())
    }
}

/// Blob cache backed by a flat directory: one file per blob name.
pub struct FsBlobCache {
    dir: PathBuf,
}

impl FsBlobCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl BlobCache for FsBlobCache {
    async fn read(&self, name: &str) -> Result<Option<Vec<u8>>, ClientError> {
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(ClientError::Rejected(format!("invalid blob name {name:?}")));
        }
        match tokio::fs::read(self.dir.join(name)).await {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ClientError::Unavailable(format!("blob cache: {e}"))),
        }
    }
}
