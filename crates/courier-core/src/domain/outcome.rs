//! Outcome model: how an executor classifies one attempt.
//!
//! This module does not assume queues, workers, or persistence. It only
//! defines the shape of results that the manager turns into decisions.

use serde::{Deserialize, Serialize};

/// Classification of an attempt result, without the reason text.
///
/// Serialized as SCREAMING_SNAKE_CASE: SUCCESS / TRANSIENT / PERMANENT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeKind {
    Success,
    Transient,
    Permanent,
}

/// Result of one `Executor::execute` call.
///
/// - `Success`: the side effect is applied (or was already applied).
/// - `TransientFailure`: the remote side may recover; retry with backoff.
/// - `PermanentFailure`: retrying cannot help; the task becomes a dead letter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum Outcome {
    Success,
    TransientFailure(String),
    PermanentFailure(String),
}

impl Outcome {
    pub fn success() -> Self {
        Outcome::Success
    }

    pub fn transient(reason: impl Into<String>) -> Self {
        Outcome::TransientFailure(reason.into())
    }

    pub fn permanent(reason: impl Into<String>) -> Self {
        Outcome::PermanentFailure(reason.into())
    }

    pub fn kind(&self) -> OutcomeKind {
        match self {
            Outcome::Success => OutcomeKind::Success,
            Outcome::TransientFailure(_) => OutcomeKind::Transient,
            Outcome::PermanentFailure(_) => OutcomeKind::Permanent,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Outcome::Success => None,
            Outcome::TransientFailure(reason) | Outcome::PermanentFailure(reason) => Some(reason),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_kind_serializes_as_required_names() {
        let s = serde_json::to_string(&OutcomeKind::Success).unwrap();
        assert_eq!(s, "\"SUCCESS\"");

        let s = serde_json::to_string(&OutcomeKind::Transient).unwrap();
        assert_eq!(s, "\"TRANSIENT\"");

        let s = serde_json::to_string(&OutcomeKind::Permanent).unwrap();
        assert_eq!(s, "\"PERMANENT\"");
    }

    #[test]
    fn failures_carry_their_reason() {
        let o = Outcome::transient("connection refused");
        assert_eq!(o.kind(), OutcomeKind::Transient);
        assert_eq!(o.reason(), Some("connection refused"));

        let o = Outcome::permanent("tag rejected");
        assert_eq!(o.kind(), OutcomeKind::Permanent);
        assert_eq!(o.reason(), Some("tag rejected"));

        assert_eq!(Outcome::success().reason(), None);
        assert!(Outcome::success().is_success());
    }

    #[test]
    fn outcome_is_tagged_enum() {
        let v = serde_json::to_value(Outcome::transient("timeout")).unwrap();
        assert_eq!(v["kind"], "transient_failure");
        assert_eq!(v["reason"], "timeout");
    }
}
