// 📜 Audit journal - every state change is an event
//
// Ordering of events is the observable record of the reconciliation
// protocol (cancel old callback -> remove old snapshot -> index new one).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Indexed,
    Superseded,
    RejectedStale,
    RejectedMalformed,
    Evicted,
    CallbackScheduled,
    CallbackCancelled,
    CallbackFired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEvent {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
    pub account_id: String,
    /// None when the record never carried a usable version
    pub version: Option<i64>,
    pub data: serde_json::Value,
}

impl IndexEvent {
    pub fn new(
        kind: EventKind,
        account_id: &str,
        version: Option<i64>,
        timestamp: DateTime<Utc>,
        data: serde_json::Value,
    ) -> Self {
        IndexEvent {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp,
            kind,
            account_id: account_id.to_string(),
            version,
            data,
        }
    }
}

pub const DEFAULT_JOURNAL_CAPACITY: usize = 10_000;

/// In-memory ring of the most recent events; the oldest is dropped first
#[derive(Debug, Clone)]
pub struct Journal {
    capacity: usize,
    events: VecDeque<IndexEvent>,
    dropped: u64,
}

impl Default for Journal {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_JOURNAL_CAPACITY)
    }
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Journal {
            capacity,
            events: VecDeque::new(),
            dropped: 0,
        }
    }

    pub fn record(&mut self, event: IndexEvent) {
        self.events.push_back(event);
        while self.events.len() > self.capacity {
            self.events.pop_front();
            self.dropped += 1;
        }
    }

    /// Retained events, oldest first
    pub fn events(&self) -> impl Iterator<Item = &IndexEvent> {
        self.events.iter()
    }

    /// The last `limit` retained events, oldest first
    pub fn recent(&self, limit: usize) -> impl Iterator<Item = &IndexEvent> {
        self.events.iter().skip(self.events.len().saturating_sub(limit))
    }

    pub fn for_account<'a>(&'a self, account_id: &'a str) -> impl Iterator<Item = &'a IndexEvent> {
        self.events.iter().filter(move |e| e.account_id == account_id)
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.events.iter().filter(|e| e.kind == kind).count()
    }

    /// Events pushed out of the ring so far
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_filter() {
        let now = Utc::now();
        let mut journal = Journal::new();
        journal.record(IndexEvent::new(EventKind::Indexed, "a", Some(1), now, serde_json::json!({})));
        journal.record(IndexEvent::new(EventKind::Indexed, "b", Some(1), now, serde_json::json!({})));
        journal.record(IndexEvent::new(EventKind::CallbackFired, "a", Some(1), now, serde_json::json!({})));

        assert_eq!(journal.len(), 3);
        assert_eq!(journal.count(EventKind::Indexed), 2);
        let kinds: Vec<EventKind> = journal.for_account("a").map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EventKind::Indexed, EventKind::CallbackFired]);
    }

    #[test]
    fn test_event_ids_are_unique() {
        let now = Utc::now();
        let a = IndexEvent::new(EventKind::Evicted, "x", None, now, serde_json::Value::Null);
        let b = IndexEvent::new(EventKind::Evicted, "x", None, now, serde_json::Value::Null);
        assert_ne!(a.event_id, b.event_id);
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&EventKind::CallbackCancelled).unwrap();
        assert_eq!(json, "\"callback_cancelled\"");
    }

    #[test]
    fn test_ring_drops_oldest_events() {
        let now = Utc::now();
        let mut journal = Journal::with_capacity(3);
        for version in 1..=5 {
            journal.record(IndexEvent::new(EventKind::Indexed, "a", Some(version), now, serde_json::Value::Null));
        }

        assert_eq!(journal.len(), 3);
        assert_eq!(journal.dropped(), 2);
        let versions: Vec<Option<i64>> = journal.events().map(|e| e.version).collect();
        assert_eq!(versions, vec![Some(3), Some(4), Some(5)]);

        let last: Vec<Option<i64>> = journal.recent(2).map(|e| e.version).collect();
        assert_eq!(last, vec![Some(4), Some(5)]);
        assert_eq!(journal.recent(50).count(), 3);
    }

    #[test]
    fn test_zero_capacity_keeps_nothing() {
        let mut journal = Journal::with_capacity(0);
        journal.record(IndexEvent::new(EventKind::Evicted, "x", None, Utc::now(), serde_json::Value::Null));
        assert!(journal.is_empty());
        assert_eq!(journal.dropped(), 1);
    }
}
