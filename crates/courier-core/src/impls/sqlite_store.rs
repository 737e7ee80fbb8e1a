//! SQLite-backed task store (the node's local database).
//!
//! One `retry_tasks` table holds every workload; rows are keyed by
//! (`kind`, `id`) where `kind` is `Task::TYPE`. Payloads are stored as JSON
//! text, timestamps as fixed-width RFC 3339 so that text order is time order.
//!
//! Each statement is a single SQLite write, so a crash leaves either the old
//! row or the new one.

use std::marker::PhantomData;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};

use crate::domain::{StatusUpdate, StoreError, TaskId, TaskRecord, TaskStatus};
use crate::ports::TaskStore;
use crate::typed::Task;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS retry_tasks (
    kind            TEXT NOT NULL,
    id              TEXT NOT NULL,
    payload         TEXT NOT NULL,
    status          TEXT NOT NULL,
    attempts        INTEGER NOT NULL,
    created_at      TEXT NOT NULL,
    last_attempt_at TEXT NULL,
    last_error      TEXT NULL,
    PRIMARY KEY (kind, id)
)
"#;

const STATUS_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS retry_tasks_kind_status ON retry_tasks (kind, status)";

const COLUMNS: &str = "kind, id, payload, status, attempts, created_at, last_attempt_at, last_error";

/// Handle to the local database. Cheap to clone.
#[derive(Debug, Clone)]
pub struct LocalDb {
    pool: SqlitePool,
}

/// An abandoned task of any kind, with its payload left as JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct DeadLetter {
    pub kind: String,
    pub record: TaskRecord<serde_json::Value>,
}

impl LocalDb {
    /// Open (or create) the database file at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Unavailable(format!("create {}: {e}", parent.display()))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        Self::from_pool(pool).await
    }

    /// A private database that lives as long as this handle.
    ///
    /// The pool is pinned to one connection that never expires, since every
    /// SQLite connection to `:memory:` is its own database.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::query(SCHEMA).execute(&pool).await?;
        sqlx::query(STATUS_INDEX).execute(&pool).await?;
        Ok(Self { pool })
    }

    /// Typed view over the rows of one task kind.
    pub fn task_store<T: Task>(&self) -> SqliteTaskStore<T> {
        SqliteTaskStore {
            pool: self.pool.clone(),
            _marker: PhantomData,
        }
    }

    /// Dead letters across kinds (or one kind), oldest first.
    pub async fn dead_letters(&self, kind: Option<&str>) -> Result<Vec<DeadLetter>, StoreError> {
        let rows = match kind {
            Some(kind) => {
                sqlx::query(&format!(
                    "SELECT {COLUMNS} FROM retry_tasks WHERE kind = ?1 AND status = ?2 \
                     ORDER BY created_at, id"
                ))
                .bind(kind)
                .bind(TaskStatus::Abandoned.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {COLUMNS} FROM retry_tasks WHERE status = ?1 \
                     ORDER BY created_at, kind, id"
                ))
                .bind(TaskStatus::Abandoned.as_str())
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter()
            .map(|row| {
                Ok(DeadLetter {
                    kind: row.try_get("kind")?,
                    record: decode_row(row)?,
                })
            })
            .collect()
    }

    /// Delete one dead letter. Returns false if there was no abandoned row.
    pub async fn purge(&self, kind: &str, id: &TaskId) -> Result<bool, StoreError> {
        delete_abandoned(&self.pool, kind, id).await
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// `TaskStore` for one task kind, backed by the `retry_tasks` table.
pub struct SqliteTaskStore<T> {
    pool: SqlitePool,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for SqliteTaskStore<T> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: Task> SqliteTaskStore<T> {
    async fn select_status(&self, statuses: &[TaskStatus]) -> Result<Vec<TaskRecord<T>>, StoreError> {
        let placeholders: Vec<String> = (0..statuses.len()).map(|i| format!("?{}", i + 2)).collect();
        let sql = format!(
            "SELECT {COLUMNS} FROM retry_tasks WHERE kind = ?1 AND status IN ({}) \
             ORDER BY created_at, id",
            placeholders.join(", ")
        );
        let mut query = sqlx::query(&sql).bind(T::TYPE);
        for status in statuses {
            query = query.bind(status.as_str());
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(decode_row).collect()
    }
}

#[async_trait]
impl<T: Task> TaskStore<T> for SqliteTaskStore<T> {
    async fn put(&self, task: &TaskRecord<T>) -> Result<(), StoreError> {
        let payload = serde_json::to_string(&task.payload)?;
        sqlx::query(
            r#"
            INSERT INTO retry_tasks (
                kind, id, payload, status, attempts, created_at, last_attempt_at, last_error
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT (kind, id) DO UPDATE SET
                payload = excluded.payload,
                status = excluded.status,
                attempts = excluded.attempts,
                created_at = excluded.created_at,
                last_attempt_at = excluded.last_attempt_at,
                last_error = excluded.last_error
            "#,
        )
        .bind(T::TYPE)
        .bind(task.id.as_str())
        .bind(payload)
        .bind(task.status.as_str())
        .bind(i64::from(task.attempts))
        .bind(format_time(task.created_at))
        .bind(task.last_attempt_at.map(format_time))
        .bind(task.last_error.clone())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_new(&self, task: &TaskRecord<T>) -> Result<bool, StoreError> {
        let payload = serde_json::to_string(&task.payload)?;
        let result = sqlx::query(
            r#"
            INSERT INTO retry_tasks (
                kind, id, payload, status, attempts, created_at, last_attempt_at, last_error
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT (kind, id) DO NOTHING
            "#,
        )
        .bind(T::TYPE)
        .bind(task.id.as_str())
        .bind(payload)
        .bind(task.status.as_str())
        .bind(i64::from(task.attempts))
        .bind(format_time(task.created_at))
        .bind(task.last_attempt_at.map(format_time))
        .bind(task.last_error.clone())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_status(&self, id: &TaskId, update: &StatusUpdate) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE retry_tasks
            SET status = ?1, attempts = ?2, last_attempt_at = ?3, last_error = ?4
            WHERE kind = ?5 AND id = ?6
            "#,
        )
        .bind(update.status.as_str())
        .bind(i64::from(update.attempts))
        .bind(update.last_attempt_at.map(format_time))
        .bind(update.last_error.clone())
        .bind(T::TYPE)
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.clone()));
        }
        Ok(())
    }

    async fn remove(&self, id: &TaskId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM retry_tasks WHERE kind = ?1 AND id = ?2")
            .bind(T::TYPE)
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_pending(&self) -> Result<Vec<TaskRecord<T>>, StoreError> {
        self.select_status(&[TaskStatus::Pending, TaskStatus::InFlight, TaskStatus::Failed])
            .await
    }

    async fn get(&self, id: &TaskId) -> Result<Option<TaskRecord<T>>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM retry_tasks WHERE kind = ?1 AND id = ?2"
        ))
        .bind(T::TYPE)
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(decode_row).transpose()
    }

    async fn list_abandoned(&self) -> Result<Vec<TaskRecord<T>>, StoreError> {
        self.select_status(&[TaskStatus::Abandoned]).await
    }

    async fn purge_abandoned(&self, id: &TaskId) -> Result<bool, StoreError> {
        delete_abandoned(&self.pool, T::TYPE, id).await
    }
}

/// Single-statement delete guarded on status, so a row revived between a
/// read and this call is never removed.
async fn delete_abandoned(pool: &SqlitePool, kind: &str, id: &TaskId) -> Result<bool, StoreError> {
    let result = sqlx::query("DELETE FROM retry_tasks WHERE kind = ?1 AND id = ?2 AND status = ?3")
        .bind(kind)
        .bind(id.as_str())
        .bind(TaskStatus::Abandoned.as_str())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

fn format_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_time(id: &str, value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt {
            id: id.to_string(),
            reason: format!("bad timestamp {value:?}: {e}"),
        })
}

fn decode_row<P: DeserializeOwned>(row: &SqliteRow) -> Result<TaskRecord<P>, StoreError> {
    let id: String = row.try_get("id")?;
    let payload: String = row.try_get("payload")?;
    let status: String = row.try_get("status")?;
    let attempts: i64 = row.try_get("attempts")?;
    let created_at: String = row.try_get("created_at")?;
    let last_attempt_at: Option<String> = row.try_get("last_attempt_at")?;
    let last_error: Option<String> = row.try_get("last_error")?;

    let status = TaskStatus::parse(&status).ok_or_else(|| StoreError::Corrupt {
        id: id.clone(),
        reason: format!("unknown status {status:?}"),
    })?;
    let attempts = u32::try_from(attempts).map_err(|_| StoreError::Corrupt {
        id: id.clone(),
        reason: format!("attempts out of range: {attempts}"),
    })?;
    let created_at = parse_time(&id, &created_at)?;
    let last_attempt_at = last_attempt_at
        .as_deref()
        .map(|t| parse_time(&id, t))
        .transpose()?;

    Ok(TaskRecord {
        id: TaskId::new(id),
        payload: serde_json::from_str(&payload)?,
        status,
        attempts,
        created_at,
        last_attempt_at,
        last_error,
    })
}
