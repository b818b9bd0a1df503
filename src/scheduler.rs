// ⏰ Callback Scheduler - cancellable min-heap of pending callbacks
//
// Array-backed binary heap ordered by (fire_at, seq) plus a side index
// id -> heap position. Cancellation swaps the target with the last slot,
// pops it, and sifts the moved element back into place: O(log n).
//
// At most one pending callback per account id. The scheduler does not
// deduplicate; the indexer cancels before it reschedules.

use crate::account::Account;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// ENTRIES
// ============================================================================

#[derive(Debug, Clone)]
pub struct PendingCallback {
    pub fire_at: DateTime<Utc>,
    pub account: Account,

    /// Scheduling order, breaks ties between equal fire times
    seq: u64,
}

impl PendingCallback {
    fn precedes(&self, other: &PendingCallback) -> bool {
        (self.fire_at, self.seq) < (other.fire_at, other.seq)
    }
}

/// Emitted when a callback comes due
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiredCallback {
    pub id: String,
    pub version: i64,
    pub fire_at: DateTime<Utc>,
}

// ============================================================================
// SCHEDULER
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct CallbackScheduler {
    heap: Vec<PendingCallback>,
    positions: HashMap<String, usize>,
    next_seq: u64,
}

impl CallbackScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a callback for `account` at `fire_at`
    pub fn schedule(&mut self, account: Account, fire_at: DateTime<Utc>) {
        debug_assert!(
            !self.positions.contains_key(&account.id),
            "callback for {} already pending",
            account.id
        );

        let seq = self.next_seq;
        self.next_seq += 1;

        let index = self.heap.len();
        self.positions.insert(account.id.clone(), index);
        self.heap.push(PendingCallback { fire_at, account, seq });
        self.sift_up(index);
    }

    /// Cancel the pending callback for `id`; no-op if none is pending
    pub fn cancel(&mut self, id: &str) -> Option<PendingCallback> {
        let index = self.positions.remove(id)?;
        Some(self.remove_at(index))
    }

    /// Fire every callback due at or before `now`, earliest first
    pub fn fire_due(&mut self, now: DateTime<Utc>) -> Vec<FiredCallback> {
        let mut fired = Vec::new();

        while let Some(next) = self.heap.first() {
            if next.fire_at > now {
                break;
            }
            let callback = self.remove_at(0);
            self.positions.remove(&callback.account.id);
            fired.push(FiredCallback {
                id: callback.account.id,
                version: callback.account.version,
                fire_at: callback.fire_at,
            });
        }

        fired
    }

    pub fn peek_next(&self) -> Option<&PendingCallback> {
        self.heap.first()
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.positions.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&PendingCallback> {
        self.positions.get(id).map(|&i| &self.heap[i])
    }

    pub fn fire_time(&self, id: &str) -> Option<DateTime<Utc>> {
        self.get(id).map(|c| c.fire_at)
    }

    /// Pending callbacks in heap order (not sorted)
    pub fn pending(&self) -> impl Iterator<Item = &PendingCallback> {
        self.heap.iter()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    // ------------------------------------------------------------------------
    // heap internals
    // ------------------------------------------------------------------------

    /// Remove the entry at `index`. The caller drops its position entry.
    fn remove_at(&mut self, index: usize) -> PendingCallback {
        let last = self.heap.len() - 1;
        if index != last {
            self.heap.swap(index, last);
            let moved_id = self.heap[index].account.id.clone();
            self.positions.insert(moved_id, index);
        }

        let removed = match self.heap.pop() {
            Some(entry) => entry,
            None => unreachable!("remove_at on empty heap"),
        };

        if index < self.heap.len() {
            // The moved element may belong above or below its new slot
            let index = self.sift_up(index);
            self.sift_down(index);
        }

        removed
    }

    fn sift_up(&mut self, mut index: usize) -> usize {
        while index > 0 {
            let parent = (index - 1) / 2;
            if !self.heap[index].precedes(&self.heap[parent]) {
                break;
            }
            self.swap_entries(index, parent);
            index = parent;
        }
        index
    }

    fn sift_down(&mut self, mut index: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * index + 1;
            let right = left + 1;
            let mut smallest = index;

            if left < len && self.heap[left].precedes(&self.heap[smallest]) {
                smallest = left;
            }
            if right < len && self.heap[right].precedes(&self.heap[smallest]) {
                smallest = right;
            }
            if smallest == index {
                break;
            }
            self.swap_entries(index, smallest);
            index = smallest;
        }
    }

    fn swap_entries(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        self.positions.insert(self.heap[a].account.id.clone(), a);
        self.positions.insert(self.heap[b].account.id.clone(), b);
    }

    /// Heap order and side index agree (used by invariant checks)
    pub(crate) fn is_consistent(&self) -> bool {
        if self.positions.len() != self.heap.len() {
            return false;
        }
        let indexed = self
            .heap
            .iter()
            .enumerate()
            .all(|(i, c)| self.positions.get(&c.account.id) == Some(&i));
        let ordered = (1..self.heap.len()).all(|i| !self.heap[i].precedes(&self.heap[(i - 1) / 2]));
        indexed && ordered
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn at(ms: i64) -> DateTime<Utc> {
        t0() + Duration::milliseconds(ms)
    }

    fn account(id: &str) -> Account {
        Account::new(id, "user", 0, 0, 1)
    }

    #[test]
    fn test_fire_due_in_time_order() {
        let mut scheduler = CallbackScheduler::new();
        scheduler.schedule(account("c"), at(300));
        scheduler.schedule(account("a"), at(100));
        scheduler.schedule(account("b"), at(200));

        let fired = scheduler.fire_due(at(1_000));

        let ids: Vec<&str> = fired.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(scheduler.is_empty());
        assert!(!scheduler.is_pending("a"));
    }

    #[test]
    fn test_fire_due_stops_at_first_future_entry() {
        let mut scheduler = CallbackScheduler::new();
        scheduler.schedule(account("a"), at(100));
        scheduler.schedule(account("b"), at(200));
        scheduler.schedule(account("c"), at(300));

        let fired = scheduler.fire_due(at(200));

        assert_eq!(fired.len(), 2);
        assert_eq!(scheduler.len(), 1);
        assert!(scheduler.is_pending("c"));
        assert_eq!(scheduler.peek_next().map(|c| c.fire_at), Some(at(300)));
    }

    #[test]
    fn test_fire_time_is_inclusive() {
        let mut scheduler = CallbackScheduler::new();
        scheduler.schedule(account("a"), at(100));

        assert!(scheduler.fire_due(at(99)).is_empty());
        assert_eq!(scheduler.fire_due(at(100)).len(), 1);
    }

    #[test]
    fn test_equal_fire_times_keep_schedule_order() {
        let mut scheduler = CallbackScheduler::new();
        for id in ["first", "second", "third"] {
            scheduler.schedule(account(id), at(50));
        }

        let ids: Vec<String> = scheduler.fire_due(at(50)).into_iter().map(|f| f.id).collect();
        assert_eq!(ids, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_cancel_removes_only_target() {
        let mut scheduler = CallbackScheduler::new();
        scheduler.schedule(account("a"), at(100));
        scheduler.schedule(account("b"), at(200));
        scheduler.schedule(account("c"), at(300));

        let cancelled = scheduler.cancel("b").unwrap();

        assert_eq!(cancelled.account.id, "b");
        assert!(!scheduler.is_pending("b"));
        assert!(scheduler.is_consistent());

        let ids: Vec<String> = scheduler.fire_due(at(1_000)).into_iter().map(|f| f.id).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn test_cancel_root_and_last() {
        let mut scheduler = CallbackScheduler::new();
        scheduler.schedule(account("a"), at(100));
        scheduler.schedule(account("b"), at(200));

        assert!(scheduler.cancel("a").is_some());
        assert!(scheduler.is_consistent());
        assert!(scheduler.cancel("b").is_some());
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_cancel_unknown_is_noop() {
        let mut scheduler = CallbackScheduler::new();
        scheduler.schedule(account("a"), at(100));

        assert!(scheduler.cancel("ghost").is_none());
        assert_eq!(scheduler.len(), 1);
    }

    #[test]
    fn test_cancel_moved_element_sifts_up() {
        // Removing a deep node can pull in a last element that is smaller
        // than the removed node's parent.
        let mut scheduler = CallbackScheduler::new();
        scheduler.schedule(account("root"), at(0));
        scheduler.schedule(account("l"), at(100));
        scheduler.schedule(account("r"), at(10));
        scheduler.schedule(account("ll"), at(110));
        scheduler.schedule(account("lr"), at(120));
        scheduler.schedule(account("rl"), at(20));

        scheduler.cancel("ll");
        assert!(scheduler.is_consistent());

        let ids: Vec<String> = scheduler.fire_due(at(1_000)).into_iter().map(|f| f.id).collect();
        assert_eq!(ids, vec!["root", "r", "rl", "l", "lr"]);
    }

    #[test]
    fn test_reschedule_after_cancel() {
        let mut scheduler = CallbackScheduler::new();
        scheduler.schedule(account("a"), at(100));
        scheduler.cancel("a");
        scheduler.schedule(Account::new("a", "user", 0, 0, 2), at(500));

        assert_eq!(scheduler.fire_time("a"), Some(at(500)));
        let fired = scheduler.fire_due(at(500));
        assert_eq!(fired[0].version, 2);
    }

    #[test]
    fn test_many_cancellations_keep_heap_consistent() {
        let mut scheduler = CallbackScheduler::new();
        for i in 0..50 {
            scheduler.schedule(account(&format!("acc{}", i)), at((i * 37 % 50) as i64));
        }
        for i in (0..50).step_by(3) {
            scheduler.cancel(&format!("acc{}", i));
            assert!(scheduler.is_consistent());
        }

        let fired = scheduler.fire_due(at(10_000));
        assert!(fired.windows(2).all(|w| w[0].fire_at <= w[1].fire_at));
        assert_eq!(fired.len(), 50 - 17);
    }
}
