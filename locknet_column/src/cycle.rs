//! The single cooperative control loop.
//!
//! One cycle: advance every compartment's motion state machine, emit
//! edge events, service at most one inbound command request, then at
//! most one outbound announce-or-heartbeat send. All hardware bus
//! access happens here; a blocking command (solenoid pulse, jog) stalls
//! the whole loop for its duration, which the timeout constants in
//! `locknet::consts` account for.

use crate::bus::{BusIo, ShiftRegisterBus};
use crate::motion::Compartment;
use crate::server::{self, CommandEndpoint};
use crate::sync::{CoordinatorLink, SyncClient};
use locknet::consts::{CYCLE_TIME, MAX_COMPARTMENTS};
use locknet::hw::SensorWord;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::info;

/// O(1) per-cycle timing statistics.
#[derive(Debug, Clone, Default)]
pub struct CycleStats {
    /// Total cycles executed.
    pub cycle_count: u64,
    /// Last cycle duration.
    pub last_cycle: Duration,
    /// Maximum cycle duration.
    pub max_cycle: Duration,
    /// Running sum for average computation.
    pub sum_cycle: Duration,
    /// Cycles that exceeded the cycle budget.
    pub overruns: u64,
}

impl CycleStats {
    /// Record one cycle duration against the budget. O(1).
    #[inline]
    pub fn record(&mut self, duration: Duration, budget: Duration) {
        self.cycle_count += 1;
        self.last_cycle = duration;
        if duration > self.max_cycle {
            self.max_cycle = duration;
        }
        self.sum_cycle += duration;
        if duration > budget {
            self.overruns += 1;
        }
    }

    /// Average cycle duration (zero before the first cycle).
    pub fn avg_cycle(&self) -> Duration {
        if self.cycle_count == 0 {
            Duration::ZERO
        } else {
            self.sum_cycle / self.cycle_count as u32
        }
    }
}

/// The column controller's cooperative loop.
pub struct ControlLoop<B: BusIo, L: CoordinatorLink> {
    bus: ShiftRegisterBus<B>,
    compartments: heapless::Vec<Compartment, MAX_COMPARTMENTS>,
    sync: SyncClient,
    link: L,
    endpoint: Option<CommandEndpoint>,
    stats: CycleStats,
    cycle_time: Duration,
}

impl<B: BusIo, L: CoordinatorLink> ControlLoop<B, L> {
    /// Assemble the loop and derive every compartment's boot state from
    /// its current sensors.
    pub fn new(
        mut bus: ShiftRegisterBus<B>,
        mut compartments: heapless::Vec<Compartment, MAX_COMPARTMENTS>,
        sync: SyncClient,
        link: L,
        endpoint: Option<CommandEndpoint>,
    ) -> Self {
        for comp in &mut compartments {
            comp.init_from_sensors(&mut bus);
        }
        Self {
            bus,
            compartments,
            sync,
            link,
            endpoint,
            stats: CycleStats::default(),
            cycle_time: CYCLE_TIME,
        }
    }

    /// Override the loop period (tests).
    pub fn with_cycle_time(mut self, cycle_time: Duration) -> Self {
        self.cycle_time = cycle_time;
        self
    }

    #[inline]
    pub fn stats(&self) -> &CycleStats {
        &self.stats
    }

    pub fn compartments(&self) -> &[Compartment] {
        &self.compartments
    }

    pub fn bus_mut(&mut self) -> &mut ShiftRegisterBus<B> {
        &mut self.bus
    }

    pub fn sync(&self) -> &SyncClient {
        &self.sync
    }

    /// Execute one cycle at the injected instant.
    pub fn run_cycle(&mut self, now: Instant) {
        for comp in &mut self.compartments {
            comp.update(&mut self.bus, now);
        }

        let sensors: heapless::Vec<SensorWord, MAX_COMPARTMENTS> =
            self.compartments.iter().map(Compartment::sensors).collect();

        self.sync.emit_events(&mut self.link, now, &sensors);

        if let Some(endpoint) = self.endpoint.as_mut() {
            if let Some(request) = endpoint.poll() {
                let outcome =
                    server::execute(&request.command, &mut self.compartments, &mut self.bus, now);
                request.respond(&outcome);
            }
        }

        self.sync.service(&mut self.link, now, &sensors);
    }

    /// Run the wall-clock paced loop until `running` clears.
    pub fn run(&mut self, running: &Arc<AtomicBool>) {
        info!(
            compartments = self.compartments.len(),
            cycle_ms = self.cycle_time.as_millis() as u64,
            "control loop started"
        );
        while running.load(Ordering::SeqCst) {
            let start = Instant::now();
            self.run_cycle(start);
            let elapsed = start.elapsed();
            self.stats.record(elapsed, self.cycle_time);
            if let Some(rest) = self.cycle_time.checked_sub(elapsed) {
                std::thread::sleep(rest);
            }
        }
        info!(
            cycles = self.stats.cycle_count,
            overruns = self.stats.overruns,
            "control loop stopped"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::SimBus;
    use crate::motion::SafetyPolicy;
    use crate::sync::CoordinatorLink;
    use locknet::hw::{ColumnId, CompartmentState};
    use locknet::protocol::{Announce, EventMsg, Heartbeat};
    use locknet::wire::WireError;

    #[derive(Default)]
    struct NullLink {
        events: Vec<EventMsg>,
        heartbeats: usize,
    }

    impl CoordinatorLink for NullLink {
        fn announce(&mut self, _msg: &Announce) -> Result<(), WireError> {
            Ok(())
        }
        fn heartbeat(&mut self, _msg: &Heartbeat) -> Result<(), WireError> {
            self.heartbeats += 1;
            Ok(())
        }
        fn event(&mut self, msg: &EventMsg) -> Result<(), WireError> {
            self.events.push(msg.clone());
            Ok(())
        }
    }

    fn build_loop(n: u8) -> ControlLoop<SimBus, NullLink> {
        let bus = ShiftRegisterBus::new(SimBus::new(n), n);
        let mut comps = heapless::Vec::new();
        for i in 0..n {
            comps
                .push(Compartment::new(i, SafetyPolicy::default()))
                .ok()
                .unwrap();
        }
        let sync = SyncClient::new(ColumnId::new("col-test"), "127.0.0.1:0", n, Instant::now());
        ControlLoop::new(bus, comps, sync, NullLink::default(), None)
    }

    #[test]
    fn boot_states_derived_at_assembly() {
        let mut loop_ = build_loop(2);
        // SimBus defaults to door closed.
        loop_.run_cycle(Instant::now());
        assert!(loop_
            .compartments()
            .iter()
            .all(|c| c.state() == CompartmentState::Locked));
    }

    #[test]
    fn full_unlock_cycle_through_the_loop() {
        let mut loop_ = build_loop(1);
        let t0 = Instant::now();
        loop_.run_cycle(t0);

        // Drive the unlock directly (as the endpoint would).
        {
            let ControlLoop { bus, compartments, .. } = &mut loop_;
            compartments[0].unlock(bus, t0).unwrap();
        }

        // Let the simulated door travel open across cycles.
        for i in 1..=40 {
            loop_.bus_mut().io_mut().advance(Duration::from_millis(100));
            loop_.run_cycle(t0 + Duration::from_millis(100 * i));
        }
        assert_eq!(loop_.compartments()[0].state(), CompartmentState::Open);
    }

    #[test]
    fn stats_count_cycles() {
        let mut stats = CycleStats::default();
        stats.record(Duration::from_millis(5), Duration::from_millis(20));
        stats.record(Duration::from_millis(25), Duration::from_millis(20));
        assert_eq!(stats.cycle_count, 2);
        assert_eq!(stats.overruns, 1);
        assert_eq!(stats.max_cycle, Duration::from_millis(25));
        assert_eq!(stats.avg_cycle(), Duration::from_millis(15));
    }
}
