//! Domain identifiers.
//!
//! # TaskId
//! TaskId は呼び出し側（tag server / write-back path）が組み立てる安定した識別子です。
//! 同じ論理操作を二度 `add` すると同じ TaskId になり、重複排除されます。
//!
//! 例:
//! - tag replication: `{destination}|{tag}|{digest}`
//! - write-back: `{namespace}|{name}`

use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator used by [`TaskId::compose`].
pub const ID_SEPARATOR: char = '|';

/// Identifier of a task, unique per logical unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Join the parts of a logical key into one id.
    ///
    /// Parts are joined with [`ID_SEPARATOR`]; callers pick parts that never
    /// contain it (tags, digests, host:port addresses, namespaces).
    pub fn compose(parts: &[&str]) -> Self {
        let mut value = String::new();
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                value.push(ID_SEPARATOR);
            }
            value.push_str(part);
        }
        Self(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}
