//! ManagerConfig - Manager の設定
//!
//! 設定ファイルでは時間はすべてミリ秒（`*_ms`）で書きます。
//! 省略したフィールドはデフォルト値になります。

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{BackoffPolicy, ConfigError};

/// Tuning knobs for one manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Number of workers, i.e. the maximum number of tasks in flight.
    pub concurrency_limit: usize,
    /// Attempts before a transiently failing task is abandoned.
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Jitter as a fraction of the delay, in `[0, 1)`.
    pub backoff_jitter_fraction: f64,
    /// Upper bound on how long an idle worker sleeps before re-checking.
    pub poll_interval_ms: u64,
    pub shutdown_grace_ms: u64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: 8,
            max_attempts: 10,
            backoff_base_ms: 1_000,
            backoff_max_ms: 5 * 60 * 1_000,
            backoff_jitter_fraction: 0.5,
            poll_interval_ms: 1_000,
            shutdown_grace_ms: 10_000,
        }
    }
}

impl ManagerConfig {
    /// 起動前の検証（Fail-fast）
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency_limit == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::ZeroMaxAttempts);
        }
        if self.backoff_base_ms == 0 {
            return Err(ConfigError::ZeroBackoffBase);
        }
        if self.backoff_max_ms < self.backoff_base_ms {
            return Err(ConfigError::BackoffMaxBelowBase {
                max: self.backoff_max_ms,
                base: self.backoff_base_ms,
            });
        }
        if !(0.0..1.0).contains(&self.backoff_jitter_fraction) {
            return Err(ConfigError::JitterOutOfRange(self.backoff_jitter_fraction));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::ZeroPollInterval);
        }
        Ok(())
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            self.backoff_base(),
            self.backoff_max(),
            self.backoff_jitter_fraction,
        )
    }
}
