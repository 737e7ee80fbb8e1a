//! InMemoryTaskStore - テスト・組み込み用の TaskStore
//!
//! プロセスと一緒に消えるので durable ではありませんが、同じ `Arc` を
//! 新しい Manager に渡せば「再起動」をシミュレートできます。

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::domain::{StatusUpdate, StoreError, TaskId, TaskRecord, TaskStatus};
use crate::ports::TaskStore;
use crate::typed::Task;

/// In-memory store keyed by task id.
///
/// # 実装詳細
/// - std Mutex で排他制御（ロックを持ったまま await しない）
/// - 一覧系は `created_at` 順に並べて返す
pub struct InMemoryTaskStore<T> {
    records: Mutex<HashMap<TaskId, TaskRecord<T>>>,
}

impl<T: Task> InMemoryTaskStore<T> {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Every record currently stored, oldest first.
    pub fn snapshot(&self) -> Vec<TaskRecord<T>> {
        self.select(|_| true)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<TaskId, TaskRecord<T>>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn select(&self, keep: impl Fn(TaskStatus) -> bool) -> Vec<TaskRecord<T>> {
        let mut out: Vec<TaskRecord<T>> = self
            .lock()
            .values()
            .filter(|r| keep(r.status))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        out
    }
}

impl<T: Task> Default for InMemoryTaskStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Task> TaskStore<T> for InMemoryTaskStore<T> {
    async fn put(&self, task: &TaskRecord<T>) -> Result<(), StoreError> {
        self.lock().insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn insert_new(&self, task: &TaskRecord<T>) -> Result<bool, StoreError> {
        let mut records = self.lock();
        if records.contains_key(&task.id) {
            return Ok(false);
        }
        records.insert(task.id.clone(), task.clone());
        Ok(true)
    }

    async fn mark_status(&self, id: &TaskId, update: &StatusUpdate) -> Result<(), StoreError> {
        let mut records = self.lock();
        let record = records
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        record.apply(update);
        Ok(())
    }

    async fn remove(&self, id: &TaskId) -> Result<(), StoreError> {
        self.lock().remove(id);
        Ok(())
    }

    async fn list_pending(&self) -> Result<Vec<TaskRecord<T>>, StoreError> {
        Ok(self.select(TaskStatus::is_recoverable))
    }

    async fn get(&self, id: &TaskId) -> Result<Option<TaskRecord<T>>, StoreError> {
        Ok(self.lock().get(id).cloned())
    }

    async fn list_abandoned(&self) -> Result<Vec<TaskRecord<T>>, StoreError> {
        Ok(self.select(|status| status == TaskStatus::Abandoned))
    }

    async fn purge_abandoned(&self, id: &TaskId) -> Result<bool, StoreError> {
        let mut records = self.lock();
        match records.get(id) {
            Some(record) if record.status == TaskStatus::Abandoned => {
                records.remove(id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typed::task::testing::TestTask;
    use chrono::{Duration, TimeZone, Utc};

    fn record(key: &str, offset_secs: i64) -> TaskRecord<TestTask> {
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(offset_secs);
        TaskRecord::new(TaskId::new(key), TestTask::new(key), created)
    }

    #[tokio::test]
    async fn put_then_get_roundtrip() {
        let store = InMemoryTaskStore::new();
        let r = record("a", 0);
        store.put(&r).await.unwrap();
        assert_eq!(store.get(&r.id).await.unwrap(), Some(r));
    }

    #[tokio::test]
    async fn list_pending_excludes_terminal_and_orders_by_creation() {
        let store = InMemoryTaskStore::new();
        let late = record("late", 10);
        let early = record("early", 1);
        let mut dead = record("dead", 0);
        dead.start_attempt(Utc::now());
        dead.mark_abandoned("rejected");

        store.put(&late).await.unwrap();
        store.put(&early).await.unwrap();
        store.put(&dead).await.unwrap();

        let pending: Vec<String> = store
            .list_pending()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id.to_string())
            .collect();
        assert_eq!(pending, vec!["early", "late"]);

        let abandoned = store.list_abandoned().await.unwrap();
        assert_eq!(abandoned.len(), 1);
        assert_eq!(abandoned[0].id.as_str(), "dead");
    }

    #[tokio::test]
    async fn mark_status_missing_is_not_found() {
        let store: InMemoryTaskStore<TestTask> = InMemoryTaskStore::new();
        let r = record("ghost", 0);
        let err = store
            .mark_status(&r.id, &r.status_update())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn insert_new_keeps_existing_rows() {
        let store = InMemoryTaskStore::new();
        let mut dead = record("a", 0);
        dead.start_attempt(Utc::now());
        dead.mark_abandoned("rejected");
        store.put(&dead).await.unwrap();

        assert!(!store.insert_new(&record("a", 5)).await.unwrap());
        assert_eq!(store.get(&dead.id).await.unwrap(), Some(dead));
        assert!(store.insert_new(&record("b", 5)).await.unwrap());
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn purge_abandoned_leaves_live_rows() {
        let store = InMemoryTaskStore::new();
        let live = record("live", 0);
        let mut dead = record("dead", 1);
        dead.start_attempt(Utc::now());
        dead.mark_abandoned("rejected");
        store.put(&live).await.unwrap();
        store.put(&dead).await.unwrap();

        assert!(!store.purge_abandoned(&live.id).await.unwrap());
        assert!(!store.purge_abandoned(&TaskId::new("ghost")).await.unwrap());
        assert!(store.purge_abandoned(&dead.id).await.unwrap());
        assert_eq!(store.snapshot(), vec![live]);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let store = InMemoryTaskStore::new();
        let r = record("a", 0);
        store.put(&r).await.unwrap();
        store.remove(&r.id).await.unwrap();
        store.remove(&r.id).await.unwrap();
        assert!(store.is_empty());
    }
}
