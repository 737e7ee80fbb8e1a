//! Domain model (ids, status, records, outcomes, backoff, decisions, errors, events).
//!
//! Depends on nothing above it: `app` and `impls` build on these types.

pub mod backoff;
pub mod decision;
pub mod errors;
pub mod events;
pub mod ids;
pub mod outcome;
pub mod record;
pub mod status;

pub use backoff::BackoffPolicy;
pub use decision::{Decider, Decision, RetryDecider};
pub use errors::{ConfigError, CourierError, StoreError};
pub use events::DomainEvent;
pub use ids::TaskId;
pub use outcome::{Outcome, OutcomeKind};
pub use record::{StatusUpdate, TaskRecord};
pub use status::TaskStatus;
