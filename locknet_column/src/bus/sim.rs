//! Simulated pin-level backend.
//!
//! Models the two register chains faithfully at the edge level: the
//! output stage shifts on every clock rising edge (the shift clock is
//! shared, as on real silicon) but commits to its latch only while its
//! chip select is asserted; the input stage parallel-loads on latch and
//! shifts out on clock while selected. A small plant model moves the
//! door, trips the end switches and reacts to the solenoid/UV outputs
//! so the full controller stack can run without hardware.
//!
//! `sleep_for` advances a virtual clock instead of sleeping, so a
//! simulated control cycle runs in microseconds of wall time.

use super::{BusIo, Line};
use locknet::consts::MAX_COMPARTMENTS;
use locknet::hw::{OutputWord, SensorWord};
use std::time::Duration;
use tracing::debug;

/// Seconds of motor travel between the two door end switches.
const DOOR_TRAVEL: f64 = 2.0;

/// Per-compartment simulated plant state.
#[derive(Debug, Clone)]
struct CompartmentPlant {
    /// Latched actuator word (what the hardware is actually doing).
    latched: u8,
    /// Output-stage shift register (churns during reads; harmless until latched).
    shift_reg: u8,
    /// Input-stage load register.
    load_reg: u8,
    /// Current sensor truth, before door-switch bits are derived.
    sensors: SensorWord,
    /// Door position: 0.0 closed … 1.0 open.
    door_pos: f64,
    /// Test hook: freeze the door regardless of motor bits.
    door_stuck: bool,
}

impl Default for CompartmentPlant {
    fn default() -> Self {
        Self {
            latched: 0,
            shift_reg: 0,
            load_reg: 0,
            sensors: SensorWord::DOOR_CLOSED
                | SensorWord::IR_CLEAR
                | SensorWord::TEMP_OK
                | SensorWord::SAFETY_OK,
            door_pos: 0.0,
            door_stuck: false,
        }
    }
}

impl CompartmentPlant {
    fn derive_door_bits(&mut self) {
        self.sensors
            .set(SensorWord::DOOR_CLOSED, self.door_pos <= 0.001);
        self.sensors.set(SensorWord::DOOR_OPEN, self.door_pos >= 0.999);
    }
}

/// Simulated bit-serial bus with a door/occupancy plant per compartment.
pub struct SimBus {
    plants: Vec<CompartmentPlant>,
    clock: bool,
    data: bool,
    latch: bool,
    out_select: [bool; MAX_COMPARTMENTS],
    in_select: [bool; MAX_COMPARTMENTS],
    /// Virtual time accumulated through `sleep_for`.
    elapsed: Duration,
}

impl SimBus {
    /// Create a simulated bus for `compartments` plants, doors closed.
    pub fn new(compartments: u8) -> Self {
        Self {
            plants: vec![CompartmentPlant::default(); compartments as usize],
            clock: false,
            data: false,
            latch: false,
            out_select: [false; MAX_COMPARTMENTS],
            in_select: [false; MAX_COMPARTMENTS],
            elapsed: Duration::ZERO,
        }
    }

    /// Virtual time consumed by bus operations so far.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Actuator word the simulated hardware is currently executing.
    pub fn latched_outputs(&self, compartment: u8) -> OutputWord {
        OutputWord::from_bits_truncate(self.plants[compartment as usize].latched)
    }

    /// Current sensor truth for a compartment.
    pub fn sensors(&self, compartment: u8) -> SensorWord {
        self.plants[compartment as usize].sensors
    }

    /// Override one sensor flag (test/fault injection).
    pub fn set_sensor(&mut self, compartment: u8, flag: SensorWord, on: bool) {
        self.plants[compartment as usize].sensors.set(flag, on);
    }

    /// Replace the whole sensor word for a compartment.
    pub fn set_sensors(&mut self, compartment: u8, word: SensorWord) {
        self.plants[compartment as usize].sensors = word;
    }

    /// Freeze or release the door (simulates a jammed mechanism).
    pub fn set_door_stuck(&mut self, compartment: u8, stuck: bool) {
        self.plants[compartment as usize].door_stuck = stuck;
    }

    /// Force the door to a position: 0.0 closed … 1.0 open.
    pub fn set_door_position(&mut self, compartment: u8, pos: f64) {
        let plant = &mut self.plants[compartment as usize];
        plant.door_pos = pos.clamp(0.0, 1.0);
        plant.derive_door_bits();
    }

    /// Advance the plant by `dt`: door travel follows the latched motor
    /// bits, end switches update from door position.
    pub fn advance(&mut self, dt: Duration) {
        let dt_s = dt.as_secs_f64();
        for (idx, plant) in self.plants.iter_mut().enumerate() {
            let outputs = OutputWord::from_bits_truncate(plant.latched);
            if outputs.contains(OutputWord::MOTOR_STEP) && !plant.door_stuck {
                let delta = dt_s / DOOR_TRAVEL;
                if outputs.contains(OutputWord::MOTOR_DIR) {
                    plant.door_pos = (plant.door_pos + delta).min(1.0);
                } else {
                    plant.door_pos = (plant.door_pos - delta).max(0.0);
                }
                plant.derive_door_bits();
                debug!(compartment = idx, pos = plant.door_pos, "door moved");
            }
        }
    }

    fn selected_out(&self) -> Option<usize> {
        self.out_select.iter().position(|&s| s)
    }

    fn selected_in(&self) -> Option<usize> {
        self.in_select.iter().position(|&s| s)
    }

    fn on_clock_rising(&mut self) {
        let data = self.data;
        // The shift clock is shared: every output stage shifts, selected
        // or not. Only the latch commit is gated per compartment, which
        // is why the driver re-asserts outputs after every read.
        for plant in &mut self.plants {
            plant.shift_reg = (plant.shift_reg << 1) | u8::from(data);
        }
        if let Some(idx) = self.selected_in() {
            self.plants[idx].load_reg <<= 1;
        }
    }

    fn on_latch_rising(&mut self) {
        if let Some(idx) = self.selected_out() {
            let plant = &mut self.plants[idx];
            plant.latched = plant.shift_reg;
        }
        if let Some(idx) = self.selected_in() {
            let plant = &mut self.plants[idx];
            plant.load_reg = plant.sensors.bits();
        }
    }
}

impl BusIo for SimBus {
    fn set_line(&mut self, line: Line, high: bool) {
        match line {
            Line::Clock => {
                let rising = high && !self.clock;
                self.clock = high;
                if rising {
                    self.on_clock_rising();
                }
            }
            Line::Data => self.data = high,
            Line::Latch => {
                let rising = high && !self.latch;
                self.latch = high;
                if rising {
                    self.on_latch_rising();
                }
            }
            Line::OutSelect(i) => self.out_select[i as usize] = high,
            Line::InSelect(i) => self.in_select[i as usize] = high,
            Line::Input => {}
        }
    }

    fn read_line(&mut self, line: Line) -> bool {
        match line {
            Line::Input => match self.selected_in() {
                Some(idx) => self.plants[idx].load_reg & 0x80 != 0,
                None => false,
            },
            Line::Clock => self.clock,
            Line::Data => self.data,
            Line::Latch => self.latch,
            Line::OutSelect(i) => self.out_select[i as usize],
            Line::InSelect(i) => self.in_select[i as usize],
        }
    }

    fn sleep_for(&mut self, d: Duration) {
        self.elapsed += d;
    }
}
