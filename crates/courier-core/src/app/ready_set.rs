//! Ready set: the manager's in-memory mirror of its live tasks.
//!
//! Every task the manager owns has exactly one slot here, from the moment
//! `add` reserves its id until it succeeds or is abandoned. A slot is in one
//! of three phases:
//!
//! - `Submitting`: `add` is writing it to the store; not dispatchable yet
//! - `Queued`: waiting for `eligible_at`
//! - `InFlight`: owned by one worker
//!
//! Dispatch order comes from a min-heap keyed by (eligible_at, created_at,
//! seq). Heap entries are never removed eagerly; an entry whose generation no
//! longer matches its slot is skipped when it reaches the top.

use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::{BinaryHeap, HashMap};

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use super::status::QueueCounts;
use crate::domain::{TaskId, TaskRecord, TaskStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Submitting,
    Queued { eligible_at: Instant },
    InFlight,
}

#[derive(Debug)]
struct Slot<T> {
    record: TaskRecord<T>,
    phase: Phase,
    generation: u64,
}

/// Heap entry. Ordering is reversed so `BinaryHeap` pops the earliest first.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Scheduled {
    eligible_at: Instant,
    created_at: DateTime<Utc>,
    seq: u64,
    id: TaskId,
    generation: u64,
}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .eligible_at
            .cmp(&self.eligible_at)
            .then_with(|| other.created_at.cmp(&self.created_at))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Result of asking for the next task.
#[derive(Debug)]
pub(crate) enum Claim<T> {
    /// The task is now InFlight and owned by the caller.
    Ready(TaskRecord<T>),
    /// Nothing is eligible before this instant.
    WaitUntil(Instant),
    /// Nothing is queued at all.
    Empty,
}

#[derive(Debug)]
pub(crate) struct ReadySet<T> {
    slots: HashMap<TaskId, Slot<T>>,
    heap: BinaryHeap<Scheduled>,
    seq: u64,
}

impl<T: Clone> ReadySet<T> {
    pub(crate) fn new() -> Self {
        Self {
            slots: HashMap::new(),
            heap: BinaryHeap::new(),
            seq: 0,
        }
    }

    /// Claim the id for a submission. False if the id is already live.
    pub(crate) fn reserve(&mut self, record: &TaskRecord<T>) -> bool {
        match self.slots.entry(record.id.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                vacant.insert(Slot {
                    record: record.clone(),
                    phase: Phase::Submitting,
                    generation: 0,
                });
                true
            }
        }
    }

    /// Undo a `reserve` whose store write failed.
    pub(crate) fn release(&mut self, id: &TaskId) {
        if let Some(slot) = self.slots.get(id)
            && slot.phase == Phase::Submitting
        {
            self.slots.remove(id);
        }
    }

    /// Make a task dispatchable at `eligible_at`, replacing any previous slot.
    pub(crate) fn enqueue(&mut self, record: TaskRecord<T>, eligible_at: Instant) {
        let generation = self.slots.get(&record.id).map_or(0, |s| s.generation + 1);
        self.seq += 1;
        self.heap.push(Scheduled {
            eligible_at,
            created_at: record.created_at,
            seq: self.seq,
            id: record.id.clone(),
            generation,
        });
        self.slots.insert(
            record.id.clone(),
            Slot {
                record,
                phase: Phase::Queued { eligible_at },
                generation,
            },
        );
    }

    /// Pop the earliest task eligible at `now` and mark it InFlight.
    pub(crate) fn claim(&mut self, now: Instant) -> Claim<T> {
        while let Some(top) = self.heap.peek() {
            let live = self.slots.get(&top.id).is_some_and(|slot| {
                slot.generation == top.generation && matches!(slot.phase, Phase::Queued { .. })
            });
            if !live {
                self.heap.pop();
                continue;
            }
            if top.eligible_at > now {
                return Claim::WaitUntil(top.eligible_at);
            }

            let Some(entry) = self.heap.pop() else {
                break;
            };
            if let Some(slot) = self.slots.get_mut(&entry.id) {
                slot.phase = Phase::InFlight;
                return Claim::Ready(slot.record.clone());
            }
        }
        Claim::Empty
    }

    /// Refresh the mirrored record of a live task (phase unchanged).
    pub(crate) fn update(&mut self, record: &TaskRecord<T>) {
        if let Some(slot) = self.slots.get_mut(&record.id) {
            slot.record = record.clone();
        }
    }

    pub(crate) fn remove(&mut self, id: &TaskId) {
        self.slots.remove(id);
    }

    pub(crate) fn contains(&self, id: &TaskId) -> bool {
        self.slots.contains_key(id)
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.slots
            .values()
            .filter(|slot| slot.phase == Phase::InFlight)
            .count()
    }

    pub(crate) fn counts(&self) -> QueueCounts {
        let mut counts = QueueCounts::default();
        for slot in self.slots.values() {
            match slot.phase {
                Phase::Submitting => {}
                Phase::InFlight => counts.in_flight += 1,
                Phase::Queued { .. } if slot.record.status == TaskStatus::Failed => {
                    counts.retry_scheduled += 1
                }
                Phase::Queued { .. } => counts.queued += 1,
            }
        }
        counts
    }

    /// Live records matching `pred`, oldest first.
    pub(crate) fn find(&self, pred: impl Fn(&TaskRecord<T>) -> bool) -> Vec<TaskRecord<T>> {
        let mut out: Vec<TaskRecord<T>> = self
            .slots
            .values()
            .filter(|slot| slot.phase != Phase::Submitting && pred(&slot.record))
            .map(|slot| slot.record.clone())
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;

    fn record(key: &str, created_secs: i64) -> TaskRecord<()> {
        let created = Utc.timestamp_opt(1_700_000_000 + created_secs, 0).unwrap();
        TaskRecord::new(TaskId::new(key), (), created)
    }

    fn claimed_id(claim: Claim<()>) -> String {
        match claim {
            Claim::Ready(r) => r.id.to_string(),
            other => panic!("expected a ready task, got {other:?}"),
        }
    }

    #[test]
    fn reserve_rejects_live_ids() {
        let mut set = ReadySet::new();
        let r = record("a", 0);
        assert!(set.reserve(&r));
        assert!(!set.reserve(&r));

        set.release(&r.id);
        assert!(set.reserve(&r));
    }

    #[test]
    fn release_does_not_drop_queued_tasks() {
        let mut set = ReadySet::new();
        let r = record("a", 0);
        set.enqueue(r.clone(), Instant::now());
        set.release(&r.id);
        assert!(set.contains(&r.id));
    }

    #[test]
    fn submitting_tasks_are_not_dispatchable() {
        let mut set = ReadySet::new();
        assert!(set.reserve(&record("a", 0)));
        assert!(matches!(set.claim(Instant::now()), Claim::Empty));
    }

    #[test]
    fn ties_on_eligibility_break_by_creation_time() {
        let mut set = ReadySet::new();
        let now = Instant::now();
        set.enqueue(record("young", 5), now);
        set.enqueue(record("old", 1), now);
        set.enqueue(record("middle", 3), now);

        assert_eq!(claimed_id(set.claim(now)), "old");
        assert_eq!(claimed_id(set.claim(now)), "middle");
        assert_eq!(claimed_id(set.claim(now)), "young");
        assert!(matches!(set.claim(now), Claim::Empty));
    }

    #[test]
    fn delayed_tasks_wait_for_eligibility() {
        let mut set = ReadySet::new();
        let now = Instant::now();
        let later = now + Duration::from_secs(5);
        set.enqueue(record("retry", 0), later);

        match set.claim(now) {
            Claim::WaitUntil(at) => assert_eq!(at, later),
            other => panic!("expected wait, got {other:?}"),
        }
        assert_eq!(claimed_id(set.claim(later)), "retry");
    }

    #[test]
    fn claimed_task_is_not_claimed_twice() {
        let mut set = ReadySet::new();
        let now = Instant::now();
        set.enqueue(record("a", 0), now);

        assert_eq!(claimed_id(set.claim(now)), "a");
        assert!(matches!(set.claim(now), Claim::Empty));
        assert_eq!(set.in_flight(), 1);
    }

    #[test]
    fn requeue_supersedes_stale_heap_entries() {
        let mut set = ReadySet::new();
        let now = Instant::now();
        set.enqueue(record("a", 0), now);
        assert_eq!(claimed_id(set.claim(now)), "a");

        // retried: back in the heap with a later eligibility
        let later = now + Duration::from_secs(1);
        set.enqueue(record("a", 0), later);
        assert!(matches!(set.claim(now), Claim::WaitUntil(_)));
        assert_eq!(claimed_id(set.claim(later)), "a");
        assert!(matches!(set.claim(later), Claim::Empty));
    }

    #[test]
    fn removed_tasks_leave_no_trace() {
        let mut set = ReadySet::new();
        let now = Instant::now();
        let r = record("a", 0);
        set.enqueue(r.clone(), now);
        set.remove(&r.id);
        assert!(matches!(set.claim(now), Claim::Empty));
        assert!(!set.contains(&r.id));
    }

    #[test]
    fn counts_split_by_phase_and_status() {
        let mut set = ReadySet::new();
        let now = Instant::now();

        set.enqueue(record("fresh", 0), now);
        let mut failed = record("failed", 1);
        failed.start_attempt(Utc::now());
        failed.schedule_retry("503");
        set.enqueue(failed, now + Duration::from_secs(60));
        set.enqueue(record("running", 2), now);
        set.reserve(&record("submitting", 3));

        // "fresh" is older than "running", so it is claimed first
        assert_eq!(claimed_id(set.claim(now)), "fresh");

        let counts = set.counts();
        assert_eq!(counts.queued, 1);
        assert_eq!(counts.retry_scheduled, 1);
        assert_eq!(counts.in_flight, 1);
    }

    #[test]
    fn find_filters_live_records() {
        let mut set = ReadySet::new();
        let now = Instant::now();
        set.enqueue(record("b", 2), now);
        set.enqueue(record("a", 1), now);
        set.reserve(&record("c", 3));

        let ids: Vec<String> = set
            .find(|r| r.attempts == 0)
            .into_iter()
            .map(|r| r.id.to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
