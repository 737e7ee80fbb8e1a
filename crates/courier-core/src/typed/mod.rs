//! Typed - 型付き Task API
//!
//! payload の型と task kind（永続化時の `kind` 列）を静的に対応付けます。
//! Manager / TaskStore / Executor はすべて `T: Task` でパラメータ化されます。

pub mod task;

pub use self::task::Task;
