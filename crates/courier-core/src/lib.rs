//! courier-core
//!
//! Persisted retry engine: a durable task queue that drives retryable side
//! effects (tag replication, blob write-back) to completion across crashes.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, status, record, outcome, decision, errors, events）
//! - **typed**: 型付き Task API（payload 型と task kind の対応付け）
//! - **ports**: 抽象化レイヤー（TaskStore, Executor, Clock, EventSink）
//! - **impls**: ports の実装（InMemoryTaskStore, SQLite LocalDb, event sinks）
//! - **app**: スケジューラ本体（config, backoff, ready set, worker pool, Manager）
//! - **workloads**: エンジンに載る具体的な仕事（tag replication, write-back）

pub mod domain;
pub mod typed;
pub mod ports;
pub mod impls;
pub mod app;
pub mod workloads;

pub use app::{Manager, ManagerBuilder, ManagerConfig, ShutdownOutcome, Submission};
pub use domain::{CourierError, Outcome, StoreError, TaskId, TaskRecord, TaskStatus};
pub use typed::Task;
