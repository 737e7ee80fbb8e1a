//! App - アプリケーション層
//!
//! ports を組み合わせてリトライエンジンを実装します。
//!
//! # 主要コンポーネント
//! - **ManagerBuilder**: 設定検証とワイヤリング
//! - **Manager**: 公開 API（add / close / status / find / abandoned / purge）
//! - **Dispatcher**: claim→execute→decide→persist の 1 attempt 分の処理
//! - **WorkerGroup**: 固定数の worker ループと shutdown
//! - **ReadySet**: store から再構築できる in-memory の実行待ち集合

pub mod builder;
pub mod config;
mod dispatcher;
pub mod manager;
mod ready_set;
pub mod status;
mod worker_loop;

pub use self::builder::ManagerBuilder;
pub use self::config::ManagerConfig;
pub use crate::domain::{BackoffPolicy, ConfigError};
pub use self::manager::{Manager, ShutdownOutcome, Submission};
pub use self::status::QueueCounts;
