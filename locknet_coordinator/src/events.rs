//! Append-only hardware event log.
//!
//! Immutable records for audit and for deriving reservation
//! transitions. Bounded retention: the oldest records are dropped once
//! the capacity is reached.

use chrono::{DateTime, Utc};
use locknet::consts::EVENT_LOG_CAPACITY;
use locknet::hw::CompartmentId;
use locknet::protocol::EventKind;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;

/// One logged hardware event.
#[derive(Debug, Clone, Serialize)]
pub struct EventRecord {
    pub compartment: CompartmentId,
    pub kind: EventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    /// Coordinator receive time.
    pub received_at: DateTime<Utc>,
}

/// Owned, bounded, append-only log.
pub struct EventLog {
    inner: Mutex<VecDeque<EventRecord>>,
    capacity: usize,
}

impl EventLog {
    pub fn new() -> Self {
        Self::with_capacity(EVENT_LOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
        }
    }

    /// Append a record, dropping the oldest past capacity.
    pub fn append(
        &self,
        compartment: CompartmentId,
        kind: EventKind,
        payload: Option<serde_json::Value>,
        received_at: DateTime<Utc>,
    ) {
        let mut inner = self.inner.lock();
        if inner.len() == self.capacity {
            inner.pop_front();
        }
        inner.push_back(EventRecord {
            compartment,
            kind,
            payload,
            received_at,
        });
    }

    /// Snapshot of the retained records, oldest first.
    pub fn records(&self) -> Vec<EventRecord> {
        self.inner.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use locknet::hw::ColumnId;

    fn comp(idx: u8) -> CompartmentId {
        CompartmentId::new(ColumnId::new("col-01"), idx)
    }

    #[test]
    fn appends_in_order() {
        let log = EventLog::new();
        log.append(comp(0), EventKind::DoorOpened, None, Utc::now());
        log.append(comp(0), EventKind::ItemRemoved, None, Utc::now());

        let records = log.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].kind, EventKind::DoorOpened);
        assert_eq!(records[1].kind, EventKind::ItemRemoved);
    }

    #[test]
    fn capacity_drops_oldest() {
        let log = EventLog::with_capacity(3);
        for i in 0..5u8 {
            log.append(comp(i), EventKind::DoorClosed, None, Utc::now());
        }
        let records = log.records();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].compartment.index, 2);
        assert_eq!(records[2].compartment.index, 4);
    }

    #[test]
    fn payload_retained() {
        let log = EventLog::new();
        log.append(
            comp(1),
            EventKind::Fault,
            Some(serde_json::json!({"detail": "motor fault"})),
            Utc::now(),
        );
        assert_eq!(
            log.records()[0].payload.as_ref().unwrap()["detail"],
            "motor fault"
        );
    }
}
