//! Column registry and online detection.
//!
//! Tracks every column that has ever announced: network address,
//! compartment count, last-seen timestamp and the most recent sensor
//! snapshot. A periodic sweep derives the online flag from staleness;
//! going offline never deletes the record or its cached compartments.

use locknet::consts::STALENESS_THRESHOLD;
use locknet::hw::{ColumnId, CompartmentId, SensorWord};
use locknet::protocol::{Announce, Heartbeat};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Everything the coordinator knows about one column.
#[derive(Debug, Clone)]
struct ColumnRecord {
    address: String,
    compartment_count: u8,
    firmware_version: String,
    last_seen: Instant,
    online: bool,
    uptime_s: u64,
    /// Cached sensor word per compartment, refreshed by heartbeats.
    snapshots: Vec<SensorWord>,
}

/// Read-only view of a column for the admin surface.
#[derive(Debug, Clone, Serialize)]
pub struct ColumnView {
    pub id: ColumnId,
    pub address: String,
    pub compartment_count: u8,
    pub firmware_version: String,
    pub online: bool,
    pub uptime_s: u64,
    /// Seconds since the last announce or heartbeat.
    pub last_seen_age_s: u64,
}

/// Owned registry service; all access goes through the interior lock.
pub struct ColumnRegistry {
    inner: Mutex<HashMap<ColumnId, ColumnRecord>>,
    staleness: Duration,
}

impl ColumnRegistry {
    pub fn new() -> Self {
        Self::with_staleness(STALENESS_THRESHOLD)
    }

    pub fn with_staleness(staleness: Duration) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            staleness,
        }
    }

    /// Record an announce: creates the column on first contact, updates
    /// address/count/firmware after a reboot, refreshes the online flag.
    pub fn record_announce(&self, msg: &Announce, now: Instant) {
        let mut inner = self.inner.lock();
        let record = inner
            .entry(msg.column_id.clone())
            .and_modify(|r| {
                r.address = msg.address.clone();
                r.firmware_version = msg.firmware_version.clone();
                if r.compartment_count != msg.compartment_count {
                    warn!(
                        column = %msg.column_id,
                        old = r.compartment_count,
                        new = msg.compartment_count,
                        "column re-announced with a different compartment count"
                    );
                    r.compartment_count = msg.compartment_count;
                    r.snapshots
                        .resize(msg.compartment_count as usize, SensorWord::empty());
                }
            })
            .or_insert_with(|| {
                info!(column = %msg.column_id, address = %msg.address, "column announced");
                ColumnRecord {
                    address: msg.address.clone(),
                    compartment_count: msg.compartment_count,
                    firmware_version: msg.firmware_version.clone(),
                    last_seen: now,
                    online: true,
                    uptime_s: 0,
                    snapshots: vec![SensorWord::empty(); msg.compartment_count as usize],
                }
            });
        record.last_seen = now;
        record.online = true;
    }

    /// Record a heartbeat. Returns false for a column that never
    /// announced; the column is expected to re-announce on that nack.
    pub fn record_heartbeat(&self, msg: &Heartbeat, now: Instant) -> bool {
        let mut inner = self.inner.lock();
        let Some(record) = inner.get_mut(&msg.column_id) else {
            warn!(column = %msg.column_id, "heartbeat from unknown column");
            return false;
        };
        record.last_seen = now;
        record.online = true;
        record.uptime_s = msg.uptime_s;
        for (idx, bits) in msg.sensors.iter().enumerate() {
            if let Some(slot) = record.snapshots.get_mut(idx) {
                *slot = SensorWord::from_bits_truncate(*bits);
            }
        }
        true
    }

    /// Refresh the last-seen timestamp (events count as liveness).
    pub fn touch(&self, column: &ColumnId, now: Instant) {
        if let Some(record) = self.inner.lock().get_mut(column) {
            record.last_seen = now;
            record.online = true;
        }
    }

    /// Mark stale columns offline. Records are never deleted.
    pub fn sweep(&self, now: Instant) {
        let mut inner = self.inner.lock();
        for (id, record) in inner.iter_mut() {
            if record.online && now.saturating_duration_since(record.last_seen) > self.staleness {
                record.online = false;
                warn!(column = %id, "column went offline (stale)");
            }
        }
    }

    /// Whether the column is currently online. `None` for unknown ids.
    pub fn is_online(&self, column: &ColumnId) -> Option<bool> {
        self.inner.lock().get(column).map(|r| r.online)
    }

    /// Network address of the column's command endpoint.
    pub fn address_of(&self, column: &ColumnId) -> Option<String> {
        self.inner.lock().get(column).map(|r| r.address.clone())
    }

    pub fn compartment_count(&self, column: &ColumnId) -> Option<u8> {
        self.inner.lock().get(column).map(|r| r.compartment_count)
    }

    /// Last reported sensor word for one compartment.
    pub fn snapshot(&self, compartment: &CompartmentId) -> Option<SensorWord> {
        self.inner
            .lock()
            .get(&compartment.column)
            .and_then(|r| r.snapshots.get(compartment.index as usize).copied())
    }

    /// Read-only column list with online flags.
    pub fn columns(&self, now: Instant) -> Vec<ColumnView> {
        let inner = self.inner.lock();
        let mut views: Vec<ColumnView> = inner
            .iter()
            .map(|(id, r)| ColumnView {
                id: id.clone(),
                address: r.address.clone(),
                compartment_count: r.compartment_count,
                firmware_version: r.firmware_version.clone(),
                online: r.online,
                uptime_s: r.uptime_s,
                last_seen_age_s: now.saturating_duration_since(r.last_seen).as_secs(),
            })
            .collect();
        views.sort_by(|a, b| a.id.cmp(&b.id));
        views
    }
}

impl Default for ColumnRegistry {
    fn default() -> Self {
        Self::new()
    }
}
