//! Decision model: what the manager does with a task after an attempt.
//!
//! This module defines the Decision type (what to do next) and the Decider trait
//! (how to determine it from the attempt count and the outcome).

use std::time::Duration;

use super::{BackoffPolicy, Outcome};

/// The next action to take for a task.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Done: remove the task from the store.
    Retire,

    /// Put the task back with a delay.
    Retry { delay: Duration, reason: String },

    /// Keep the task as a dead letter.
    Abandon { reason: String },
}

/// Decides the next action for a task.
///
/// Deciders are pure: given the attempt count and the observed outcome, they
/// return the next action without side effects. The manager applies it.
pub trait Decider: Send + Sync {
    /// # Arguments
    /// * `attempts` - Attempts made so far, including the one that produced `outcome`.
    /// * `outcome` - The outcome of the most recent attempt.
    fn decide(&self, attempts: u32, outcome: &Outcome) -> Decision;
}

/// Attempt-budget decider with backoff:
/// - success retires the task
/// - transient failures retry while `attempts < max_attempts`
/// - permanent failures and exhausted budgets abandon the task
#[derive(Debug, Clone)]
pub struct RetryDecider {
    backoff: BackoffPolicy,
    max_attempts: u32,
}

impl RetryDecider {
    pub fn new(backoff: BackoffPolicy, max_attempts: u32) -> Self {
        Self {
            backoff,
            max_attempts,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Decider for RetryDecider {
    fn decide(&self, attempts: u32, outcome: &Outcome) -> Decision {
        match outcome {
            Outcome::Success => Decision::Retire,
            Outcome::PermanentFailure(reason) => Decision::Abandon {
                reason: format!("permanent failure: {reason}"),
            },
            Outcome::TransientFailure(reason) if attempts >= self.max_attempts => {
                Decision::Abandon {
                    reason: format!(
                        "max attempts reached ({}/{}): {reason}",
                        attempts, self.max_attempts
                    ),
                }
            }
            Outcome::TransientFailure(reason) => Decision::Retry {
                delay: self.backoff.delay(attempts),
                reason: reason.clone(),
            },
        }
    }
}
