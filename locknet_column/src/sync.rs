//! Column synchronization client.
//!
//! Announces the column on startup (retried until acked), sends
//! full-snapshot heartbeats while announced, and emits edge-triggered
//! events on every control cycle. All sends are single bounded-timeout
//! fire-and-forget requests: a failed heartbeat or announce is retried
//! on its natural cycle, a failed event is permanently lost
//! (at-most-once delivery). Any send failure is treated as link loss
//! and clears the announced flag, forcing a re-announce.

use locknet::consts::{ANNOUNCE_RETRY, HEARTBEAT_INTERVAL, SEND_TIMEOUT};
use locknet::hw::{ColumnId, SensorWord};
use locknet::protocol::{Ack, Announce, EventKind, EventMsg, Heartbeat, InboundMessage};
use locknet::wire::{self, WireError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Outbound transport towards the coordinator.
///
/// One method per message kind; every call is bounded by the send
/// timeout and returns an error when the ack is missing or negative.
pub trait CoordinatorLink {
    fn announce(&mut self, msg: &Announce) -> Result<(), WireError>;
    fn heartbeat(&mut self, msg: &Heartbeat) -> Result<(), WireError>;
    fn event(&mut self, msg: &EventMsg) -> Result<(), WireError>;
}

/// JSON-line TCP link to the coordinator's inbound endpoint.
pub struct TcpCoordinatorLink {
    coordinator_addr: String,
    timeout: Duration,
}

impl TcpCoordinatorLink {
    pub fn new(coordinator_addr: impl Into<String>) -> Self {
        Self {
            coordinator_addr: coordinator_addr.into(),
            timeout: SEND_TIMEOUT,
        }
    }

    fn send(&self, msg: &InboundMessage) -> Result<(), WireError> {
        let ack: Ack = wire::request(&self.coordinator_addr, msg, self.timeout)?;
        if ack.ok {
            Ok(())
        } else {
            Err(WireError::Rejected(
                ack.error.unwrap_or_else(|| "unspecified".into()),
            ))
        }
    }
}

impl CoordinatorLink for TcpCoordinatorLink {
    fn announce(&mut self, msg: &Announce) -> Result<(), WireError> {
        self.send(&InboundMessage::Announce(msg.clone()))
    }

    fn heartbeat(&mut self, msg: &Heartbeat) -> Result<(), WireError> {
        self.send(&InboundMessage::Heartbeat(msg.clone()))
    }

    fn event(&mut self, msg: &EventMsg) -> Result<(), WireError> {
        self.send(&InboundMessage::Event(msg.clone()))
    }
}

/// Announce/heartbeat/event scheduler for one column.
pub struct SyncClient {
    column_id: ColumnId,
    /// Address of this column's command endpoint, reported on announce.
    command_addr: String,
    compartment_count: u8,
    announced: bool,
    started_at: Instant,
    last_announce_attempt: Option<Instant>,
    last_heartbeat: Option<Instant>,
    prev_sensors: Vec<SensorWord>,
    announce_retry: Duration,
    heartbeat_interval: Duration,
}

impl SyncClient {
    pub fn new(
        column_id: ColumnId,
        command_addr: impl Into<String>,
        compartment_count: u8,
        started_at: Instant,
    ) -> Self {
        Self {
            column_id,
            command_addr: command_addr.into(),
            compartment_count,
            announced: false,
            started_at,
            last_announce_attempt: None,
            last_heartbeat: None,
            prev_sensors: vec![SensorWord::empty(); compartment_count as usize],
            announce_retry: ANNOUNCE_RETRY,
            heartbeat_interval: HEARTBEAT_INTERVAL,
        }
    }

    /// Override the retry/heartbeat cadence (tests).
    pub fn with_intervals(mut self, announce_retry: Duration, heartbeat: Duration) -> Self {
        self.announce_retry = announce_retry;
        self.heartbeat_interval = heartbeat;
        self
    }

    /// Whether the coordinator has acked this boot's announce.
    #[inline]
    pub const fn announced(&self) -> bool {
        self.announced
    }

    /// Diff the previous and current sensor snapshot and emit one event
    /// per edge, best-effort. Runs every control cycle, announced or
    /// not.
    ///
    /// Edges reported: door-closed rising, door-open rising, occupancy
    /// change in either direction, motor-fault rising.
    pub fn emit_events<L: CoordinatorLink>(
        &mut self,
        link: &mut L,
        now: Instant,
        sensors: &[SensorWord],
    ) {
        for (idx, (&curr, prev)) in sensors.iter().zip(self.prev_sensors.iter_mut()).enumerate() {
            let was = *prev;
            *prev = curr;

            let mut edges: heapless::Vec<EventKind, 4> = heapless::Vec::new();
            if curr.contains(SensorWord::DOOR_CLOSED) && !was.contains(SensorWord::DOOR_CLOSED) {
                let _ = edges.push(EventKind::DoorClosed);
            }
            if curr.contains(SensorWord::DOOR_OPEN) && !was.contains(SensorWord::DOOR_OPEN) {
                let _ = edges.push(EventKind::DoorOpened);
            }
            if curr.contains(SensorWord::OCCUPIED) != was.contains(SensorWord::OCCUPIED) {
                let _ = edges.push(if curr.contains(SensorWord::OCCUPIED) {
                    EventKind::ItemDetected
                } else {
                    EventKind::ItemRemoved
                });
            }
            if curr.contains(SensorWord::MOTOR_FAULT) && !was.contains(SensorWord::MOTOR_FAULT) {
                let _ = edges.push(EventKind::Fault);
            }

            for kind in edges {
                let msg = EventMsg {
                    column_id: self.column_id.clone(),
                    compartment: idx as u8,
                    kind,
                    uptime_ms: now.saturating_duration_since(self.started_at).as_millis()
                        as u64,
                    payload: None,
                };
                if let Err(e) = link.event(&msg) {
                    // At-most-once: the event is gone.
                    debug!(compartment = idx, ?kind, error = %e, "event send failed; dropped");
                }
            }
        }
    }

    /// Run the announce/heartbeat schedule: at most one outbound send.
    ///
    /// Not yet announced: retry the announce when the retry interval
    /// has elapsed. Announced: send a heartbeat when due; a failed
    /// heartbeat clears the announced flag.
    pub fn service<L: CoordinatorLink>(
        &mut self,
        link: &mut L,
        now: Instant,
        sensors: &[SensorWord],
    ) {
        if !self.announced {
            let due = self
                .last_announce_attempt
                .is_none_or(|t| now.saturating_duration_since(t) >= self.announce_retry);
            if !due {
                return;
            }
            self.last_announce_attempt = Some(now);
            let msg = Announce {
                column_id: self.column_id.clone(),
                address: self.command_addr.clone(),
                compartment_count: self.compartment_count,
                firmware_version: env!("CARGO_PKG_VERSION").to_string(),
            };
            match link.announce(&msg) {
                Ok(()) => {
                    info!(column = %self.column_id, "announced to coordinator");
                    self.announced = true;
                    // First heartbeat goes out on the next due tick.
                    self.last_heartbeat = Some(now);
                }
                Err(e) => debug!(error = %e, "announce failed; will retry"),
            }
            return;
        }

        let due = self
            .last_heartbeat
            .is_none_or(|t| now.saturating_duration_since(t) >= self.heartbeat_interval);
        if !due {
            return;
        }
        self.last_heartbeat = Some(now);
        let msg = Heartbeat {
            column_id: self.column_id.clone(),
            uptime_s: now.saturating_duration_since(self.started_at).as_secs(),
            sensors: sensors.iter().map(|w| w.bits()).collect(),
        };
        if let Err(e) = link.heartbeat(&msg) {
            warn!(error = %e, "heartbeat failed; link assumed down, re-announcing");
            self.announced = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scripted link: records sends, fails on demand.
    #[derive(Default)]
    struct FakeLink {
        announces: Vec<Announce>,
        heartbeats: Vec<Heartbeat>,
        events: Vec<EventMsg>,
        fail_announce: bool,
        fail_heartbeat: bool,
        fail_event: bool,
    }

    impl CoordinatorLink for FakeLink {
        fn announce(&mut self, msg: &Announce) -> Result<(), WireError> {
            self.announces.push(msg.clone());
            if self.fail_announce {
                Err(WireError::Timeout)
            } else {
                Ok(())
            }
        }

        fn heartbeat(&mut self, msg: &Heartbeat) -> Result<(), WireError> {
            self.heartbeats.push(msg.clone());
            if self.fail_heartbeat {
                Err(WireError::Timeout)
            } else {
                Ok(())
            }
        }

        fn event(&mut self, msg: &EventMsg) -> Result<(), WireError> {
            self.events.push(msg.clone());
            if self.fail_event {
                Err(WireError::Timeout)
            } else {
                Ok(())
            }
        }
    }

    fn client() -> SyncClient {
        SyncClient::new(ColumnId::new("col-01"), "10.0.0.5:7710", 2, Instant::now())
            .with_intervals(Duration::from_secs(3), Duration::from_secs(5))
    }

    #[test]
    fn announce_retries_until_acked() {
        let mut sync = client();
        let mut link = FakeLink { fail_announce: true, ..Default::default() };
        let t0 = Instant::now();

        sync.service(&mut link, t0, &[]);
        assert_eq!(link.announces.len(), 1);
        assert!(!sync.announced());

        // Inside the retry interval: no resend.
        sync.service(&mut link, t0 + Duration::from_secs(1), &[]);
        assert_eq!(link.announces.len(), 1);

        // Retry due.
        sync.service(&mut link, t0 + Duration::from_secs(3), &[]);
        assert_eq!(link.announces.len(), 2);

        // Coordinator comes up.
        link.fail_announce = false;
        sync.service(&mut link, t0 + Duration::from_secs(6), &[]);
        assert!(sync.announced());
        assert_eq!(link.announces.len(), 3);
        assert_eq!(link.announces[2].compartment_count, 2);
    }

    #[test]
    fn heartbeats_flow_while_announced() {
        let mut sync = client();
        let mut link = FakeLink::default();
        let t0 = Instant::now();
        let sensors = [SensorWord::DOOR_CLOSED, SensorWord::DOOR_OPEN];

        sync.service(&mut link, t0, &sensors);
        assert!(sync.announced());
        assert!(link.heartbeats.is_empty());

        // Heartbeat due.
        sync.service(&mut link, t0 + Duration::from_secs(5), &sensors);
        assert_eq!(link.heartbeats.len(), 1);
        assert_eq!(link.heartbeats[0].sensors.len(), 2);
        assert_eq!(
            link.heartbeats[0].sensors[0],
            SensorWord::DOOR_CLOSED.bits()
        );
        assert_eq!(link.heartbeats[0].uptime_s, 5);

        // Not due again yet.
        sync.service(&mut link, t0 + Duration::from_secs(6), &sensors);
        assert_eq!(link.heartbeats.len(), 1);
    }

    #[test]
    fn failed_heartbeat_forces_reannounce() {
        let mut sync = client();
        let mut link = FakeLink::default();
        let t0 = Instant::now();

        sync.service(&mut link, t0, &[]);
        assert!(sync.announced());

        link.fail_heartbeat = true;
        sync.service(&mut link, t0 + Duration::from_secs(5), &[]);
        assert!(!sync.announced(), "link loss must clear the announced flag");

        // Next service cycle goes back to announcing.
        link.fail_heartbeat = false;
        sync.service(&mut link, t0 + Duration::from_secs(9), &[]);
        assert_eq!(link.announces.len(), 2);
    }

    #[test]
    fn edges_emit_events() {
        let mut sync = client();
        let mut link = FakeLink::default();
        let t0 = Instant::now();

        // Baseline: doors closed, nothing occupied.
        sync.emit_events(&mut link, t0, &[SensorWord::DOOR_CLOSED, SensorWord::DOOR_CLOSED]);
        // First cycle reports the door-closed rising edge from empty.
        let baseline = link.events.len();

        // Compartment 1: door opens and an item appears.
        sync.emit_events(
            &mut link,
            t0 + Duration::from_millis(20),
            &[
                SensorWord::DOOR_CLOSED,
                SensorWord::DOOR_OPEN | SensorWord::OCCUPIED,
            ],
        );
        let new: Vec<_> = link.events[baseline..].iter().collect();
        assert_eq!(new.len(), 2);
        assert!(new.iter().any(|e| e.kind == EventKind::DoorOpened && e.compartment == 1));
        assert!(new.iter().any(|e| e.kind == EventKind::ItemDetected && e.compartment == 1));

        // No change: no events.
        let count = link.events.len();
        sync.emit_events(
            &mut link,
            t0 + Duration::from_millis(40),
            &[
                SensorWord::DOOR_CLOSED,
                SensorWord::DOOR_OPEN | SensorWord::OCCUPIED,
            ],
        );
        assert_eq!(link.events.len(), count);
    }

    #[test]
    fn item_removed_edge() {
        let mut sync = client();
        let mut link = FakeLink::default();
        let t0 = Instant::now();

        sync.emit_events(&mut link, t0, &[SensorWord::OCCUPIED, SensorWord::empty()]);
        link.events.clear();

        sync.emit_events(
            &mut link,
            t0 + Duration::from_millis(20),
            &[SensorWord::empty(), SensorWord::empty()],
        );
        assert_eq!(link.events.len(), 1);
        assert_eq!(link.events[0].kind, EventKind::ItemRemoved);
        assert_eq!(link.events[0].compartment, 0);
    }

    #[test]
    fn failed_events_are_dropped_not_retried() {
        let mut sync = client();
        let mut link = FakeLink { fail_event: true, ..Default::default() };
        let t0 = Instant::now();

        sync.emit_events(&mut link, t0, &[SensorWord::OCCUPIED, SensorWord::empty()]);
        let sent = link.events.len();
        assert!(sent > 0);

        // Same snapshot again: the lost edge is not re-emitted.
        sync.emit_events(
            &mut link,
            t0 + Duration::from_millis(20),
            &[SensorWord::OCCUPIED, SensorWord::empty()],
        );
        assert_eq!(link.events.len(), sent);
    }

    #[test]
    fn motor_fault_edge_emits_fault_event() {
        let mut sync = client();
        let mut link = FakeLink::default();
        let t0 = Instant::now();

        sync.emit_events(&mut link, t0, &[SensorWord::empty(), SensorWord::empty()]);
        link.events.clear();

        sync.emit_events(
            &mut link,
            t0 + Duration::from_millis(20),
            &[SensorWord::MOTOR_FAULT, SensorWord::empty()],
        );
        assert_eq!(link.events.len(), 1);
        assert_eq!(link.events[0].kind, EventKind::Fault);
    }
}
