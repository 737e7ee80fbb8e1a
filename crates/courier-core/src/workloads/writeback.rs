//! Write-back: upload a locally cached blob to its namespace's backend.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{ClientError, outcome_of, with_timeout};
use crate::domain::{Outcome, TaskId, TaskRecord};
use crate::ports::Executor;
use crate::typed::Task;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteBackTask {
    pub namespace: String,
    /// Blob name (digest hex) inside the local cache.
    pub name: String,
}

impl Task for WriteBackTask {
    const TYPE: &'static str = "courier.blob.writeback.v1";

    fn task_id(&self) -> TaskId {
        TaskId::compose(&[&self.namespace, &self.name])
    }
}

/// Local blob cache.
#[async_trait]
pub trait BlobCache: Send + Sync {
    /// Blob content, or `None` if the blob is no longer cached.
    async fn read(&self, name: &str) -> Result<Option<Vec<u8>>, ClientError>;
}

/// Backend storage for one namespace.
#[async_trait]
pub trait BackendClient: Send + Sync {
    async fn stat(&self, name: &str) -> Result<bool, ClientError>;
    async fn upload(&self, name: &str, blob: Vec<u8>) -> Result<(), ClientError>;
}

pub trait BackendResolver: Send + Sync {
    fn resolve(&self, namespace: &str) -> Option<Arc<dyn BackendClient>>;
}

/// Namespace pattern → backend. The first matching pattern wins.
#[derive(Default)]
pub struct Backends {
    entries: Vec<(Regex, Arc<dyn BackendClient>)>,
}

impl Backends {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        mut self,
        namespace_pattern: &str,
        client: Arc<dyn BackendClient>,
    ) -> Result<Self, regex::Error> {
        self.entries.push((Regex::new(namespace_pattern)?, client));
        Ok(self)
    }
}

impl BackendResolver for Backends {
    fn resolve(&self, namespace: &str) -> Option<Arc<dyn BackendClient>> {
        self.entries
            .iter()
            .find(|(pattern, _)| pattern.is_match(namespace))
            .map(|(_, client)| Arc::clone(client))
    }
}

pub struct WriteBackExecutor {
    cache: Arc<dyn BlobCache>,
    backends: Arc<dyn BackendResolver>,
    timeout: Duration,
}

impl WriteBackExecutor {
    pub fn new(
        cache: Arc<dyn BlobCache>,
        backends: Arc<dyn BackendResolver>,
        timeout: Duration,
    ) -> Self {
        Self {
            cache,
            backends,
            timeout,
        }
    }

    async fn write_back(
        &self,
        backend: &dyn BackendClient,
        name: &str,
    ) -> Result<(), ClientError> {
        if backend.stat(name).await? {
            return Ok(());
        }
        let Some(blob) = self.cache.read(name).await? else {
            return Err(ClientError::NotFound(format!(
                "blob {name} is no longer in the local cache"
            )));
        };
        backend.upload(name, blob).await
    }
}

#[async_trait]
impl Executor<WriteBackTask> for WriteBackExecutor {
    async fn execute(&self, task: &TaskRecord<WriteBackTask>) -> Outcome {
        let WriteBackTask { namespace, name } = &task.payload;
        let Some(backend) = self.backends.resolve(namespace) else {
            return Outcome::permanent(format!("no backend configured for namespace {namespace}"));
        };
        outcome_of(with_timeout(self.timeout, self.write_back(backend.as_ref(), name)).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OutcomeKind;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FakeCache(HashMap<String, Vec<u8>>);

    #[async_trait]
    impl BlobCache for FakeCache {
        async fn read(&self, name: &str) -> Result<Option<Vec<u8>>, ClientError> {
            Ok(self.0.get(name).cloned())
        }
    }

    #[derive(Default)]
    struct FakeBackend {
        stored: Mutex<HashMap<String, Vec<u8>>>,
        upload_error: Option<ClientError>,
    }

    #[async_trait]
    impl BackendClient for FakeBackend {
        async fn stat(&self, name: &str) -> Result<bool, ClientError> {
            Ok(self.stored.lock().unwrap().contains_key(name))
        }

        async fn upload(&self, name: &str, blob: Vec<u8>) -> Result<(), ClientError> {
            if let Some(err) = &self.upload_error {
                return Err(err.clone());
            }
            self.stored.lock().unwrap().insert(name.to_string(), blob);
            Ok(())
        }
    }

    fn cache_with(name: &str) -> Arc<FakeCache> {
        Arc::new(FakeCache(HashMap::from([(name.to_string(), b"blob".to_vec())])))
    }

    fn record(namespace: &str, name: &str) -> TaskRecord<WriteBackTask> {
        let task = WriteBackTask {
            namespace: namespace.into(),
            name: name.into(),
        };
        TaskRecord::new(task.task_id(), task, Utc::now())
    }

    fn executor(cache: Arc<FakeCache>, backend: Arc<FakeBackend>) -> WriteBackExecutor {
        let backends = Backends::new().register("^library/", backend).unwrap();
        WriteBackExecutor::new(cache, Arc::new(backends), Duration::from_millis(100))
    }

    #[test]
    fn id_is_namespace_and_name() {
        let r = record("library/nginx", "abc123");
        assert_eq!(r.id.as_str(), "library/nginx|abc123");
    }

    #[tokio::test]
    async fn uploads_missing_blob() {
        let backend = Arc::new(FakeBackend::default());
        let outcome = executor(cache_with("abc"), backend.clone())
            .execute(&record("library/nginx", "abc"))
            .await;
        assert!(outcome.is_success());
        assert_eq!(backend.stored.lock().unwrap().get("abc"), Some(&b"blob".to_vec()));
    }

    #[tokio::test]
    async fn blob_already_in_backend_succeeds_without_cache() {
        let backend = Arc::new(FakeBackend::default());
        backend
            .stored
            .lock()
            .unwrap()
            .insert("abc".into(), b"old".to_vec());

        let outcome = executor(Arc::new(FakeCache(HashMap::new())), backend.clone())
            .execute(&record("library/nginx", "abc"))
            .await;
        assert!(outcome.is_success());
        assert_eq!(backend.stored.lock().unwrap().get("abc"), Some(&b"old".to_vec()));
    }

    #[tokio::test]
    async fn evicted_blob_is_permanent() {
        let outcome = executor(
            Arc::new(FakeCache(HashMap::new())),
            Arc::new(FakeBackend::default()),
        )
        .execute(&record("library/nginx", "abc"))
        .await;
        assert_eq!(outcome.kind(), OutcomeKind::Permanent);
    }

    #[tokio::test]
    async fn unknown_namespace_is_permanent() {
        let outcome = executor(cache_with("abc"), Arc::new(FakeBackend::default()))
            .execute(&record("team/app", "abc"))
            .await;
        assert_eq!(outcome.kind(), OutcomeKind::Permanent);
        assert!(outcome.reason().unwrap_or("").contains("team/app"));
    }

    #[tokio::test]
    async fn backend_outage_is_transient() {
        let backend = Arc::new(FakeBackend {
            upload_error: Some(ClientError::Status {
                status: 503,
                message: "slow down".into(),
            }),
            ..Default::default()
        });
        let outcome = executor(cache_with("abc"), backend)
            .execute(&record("library/nginx", "abc"))
            .await;
        assert_eq!(outcome.kind(), OutcomeKind::Transient);
    }
}
