//! Executor port - タスクの副作用を実行し、結果を分類する
//!
//! # 契約
//! - 同じ task に対して複数回呼ばれても安全であること（at-least-once）
//! - 無期限にブロックしないこと（1 attempt ごとに自前の timeout を持つ）
//! - timeout は `Outcome::TransientFailure` として報告する

use async_trait::async_trait;

use crate::domain::{Outcome, TaskRecord};
use crate::typed::Task;

/// Executor は Task を実行して Outcome を返す
///
/// # ジェネリクスによる型安全性
/// - `Executor<TagReplicationTask>` は tag replication の record しか受け取れない
/// - Manager<T> との対応がコンパイル時に保証される
#[async_trait]
pub trait Executor<T: Task>: Send + Sync {
    /// Perform the side effect for `task` once.
    ///
    /// `task.attempts` already counts this attempt.
    async fn execute(&self, task: &TaskRecord<T>) -> Outcome;
}
