//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」を定義します。
//! Manager はここの trait だけに依存し、SQLite やリモートクライアントの詳細を知りません。
//!
//! # 設計原則
//! - TaskStore が source of truth（正本）
//! - Manager の ready set は TaskStore から再構築できるキャッシュ
//! - 時刻とイベント出力は注入する（グローバル状態に頼らない）

pub mod clock;
pub mod event_sink;
pub mod executor;
pub mod task_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::event_sink::EventSink;
pub use self::executor::Executor;
pub use self::task_store::TaskStore;
