//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **InMemoryTaskStore**: テスト・組み込み用の TaskStore
//! - **LocalDb / SqliteTaskStore**: ノードのローカル DB（SQLite）
//! - **EventSink**: Noop / Tracing / Counting

pub mod event_sink;
pub mod memory_store;
pub mod sqlite_store;

pub use self::event_sink::{CountingEventSink, NoopEventSink, TracingEventSink};
pub use self::memory_store::InMemoryTaskStore;
pub use self::sqlite_store::{DeadLetter, LocalDb, SqliteTaskStore};
