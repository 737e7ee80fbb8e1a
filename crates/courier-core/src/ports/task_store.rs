//! TaskStore port - 永続化された正本（source of truth）
//!
//! # 設計原則
//! - Manager が `add` を成功として返す前に `insert_new` がコミットされていること
//! - 既存の行（dead letter を含む）は `insert_new` で上書きされない
//! - 各操作は単独でアトミック（プロセスがクラッシュしても半端な行は残らない）
//! - Manager の in-memory 状態はすべて `list_pending` から再構築できる

use async_trait::async_trait;

use crate::domain::{StatusUpdate, StoreError, TaskId, TaskRecord};
use crate::typed::Task;

/// TaskStore は task record を kind ごとに永続化する
///
/// 実装:
/// - `InMemoryTaskStore`: テスト・組み込み用
/// - `SqliteTaskStore`: ノードのローカル DB
#[async_trait]
pub trait TaskStore<T: Task>: Send + Sync {
    /// Insert or replace the whole record.
    async fn put(&self, task: &TaskRecord<T>) -> Result<(), StoreError>;

    /// Insert the record unless a row with its id already exists, in any
    /// status. Returns false, leaving the existing row untouched, if it does.
    async fn insert_new(&self, task: &TaskRecord<T>) -> Result<bool, StoreError>;

    /// Update the mutable fields only.
    ///
    /// Returns `StoreError::NotFound` if no record has this id.
    async fn mark_status(&self, id: &TaskId, update: &StatusUpdate) -> Result<(), StoreError>;

    /// Delete a record. Deleting a missing record is not an error.
    async fn remove(&self, id: &TaskId) -> Result<(), StoreError>;

    /// All Pending, InFlight, and Failed records, oldest first.
    async fn list_pending(&self) -> Result<Vec<TaskRecord<T>>, StoreError>;

    async fn get(&self, id: &TaskId) -> Result<Option<TaskRecord<T>>, StoreError>;

    /// Dead letters, oldest first.
    async fn list_abandoned(&self) -> Result<Vec<TaskRecord<T>>, StoreError>;

    /// Delete the record only if it is Abandoned, in one atomic step.
    /// Returns whether a row was deleted.
    async fn purge_abandoned(&self, id: &TaskId) -> Result<bool, StoreError>;
}
