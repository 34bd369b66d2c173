//! Bit-serial I/O driver for the per-compartment shift-register chains.
//!
//! Outputs go to a daisy-chained output register (74HC595-class): shift
//! on clock, commit on latch. Inputs come from a separate parallel-load
//! register (74HC165-class) sharing the same clock line. Each
//! compartment owns an independent chip-select pair, so operations on
//! one compartment never touch another's actuators.
//!
//! The pin-level backend is behind [`BusIo`], so the full clock/data/
//! latch sequence runs unchanged against real GPIO or the simulated
//! backend, and timing is testable without a hardware rig.

pub mod sim;

pub use sim::SimBus;

use locknet::consts::{CLOCK_PULSE_US, INPUT_BITS, LATCH_PULSE_US, MAX_COMPARTMENTS, OUTPUT_BITS};
use locknet::hw::{OutputWord, SensorWord};
use std::time::Duration;
use tracing::trace;

/// One electrical line of the bit-serial bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Line {
    /// Shared shift clock for both register chains.
    Clock,
    /// Serial data out (towards the output registers).
    Data,
    /// Shared register latch / parallel-load strobe.
    Latch,
    /// Chip select for compartment `n`'s output register.
    OutSelect(u8),
    /// Chip select for compartment `n`'s input register.
    InSelect(u8),
    /// Serial data in (from the input registers).
    Input,
}

/// Pin-level backend contract.
///
/// Implementations: real GPIO on the controller board, [`SimBus`] for
/// tests and `--simulate` runs. All timing goes through `sleep_for` so
/// a simulated backend can run on a virtual clock.
pub trait BusIo {
    /// Drive a line high or low.
    fn set_line(&mut self, line: Line, high: bool);

    /// Sample a line.
    fn read_line(&mut self, line: Line) -> bool;

    /// Hold the current line states for at least `d`.
    fn sleep_for(&mut self, d: Duration);
}

/// Bit-serial driver over a [`BusIo`] backend.
///
/// Caches the last written output word per compartment and re-asserts
/// it after every input read: read pulses travel the shared clock line
/// and may disturb the output chain, so the re-assert is a hard
/// invariant of this driver, not an optimization.
pub struct ShiftRegisterBus<B: BusIo> {
    io: B,
    compartments: u8,
    last_written: [OutputWord; MAX_COMPARTMENTS],
}

impl<B: BusIo> ShiftRegisterBus<B> {
    /// Create a driver for `compartments` chained register pairs.
    ///
    /// All chip-select lines are released and every output word is
    /// driven to its all-off default.
    pub fn new(mut io: B, compartments: u8) -> Self {
        assert!(
            (compartments as usize) <= MAX_COMPARTMENTS,
            "at most {MAX_COMPARTMENTS} compartments per column"
        );
        for idx in 0..compartments {
            io.set_line(Line::OutSelect(idx), false);
            io.set_line(Line::InSelect(idx), false);
        }
        io.set_line(Line::Clock, false);
        io.set_line(Line::Latch, false);

        let mut bus = Self {
            io,
            compartments,
            last_written: [OutputWord::empty(); MAX_COMPARTMENTS],
        };
        for idx in 0..compartments {
            bus.write_outputs(idx, OutputWord::empty());
        }
        bus
    }

    /// Number of compartments this driver serves.
    #[inline]
    pub const fn compartments(&self) -> u8 {
        self.compartments
    }

    /// Last output word committed for `compartment`.
    #[inline]
    pub fn outputs(&self, compartment: u8) -> OutputWord {
        self.last_written[compartment as usize]
    }

    /// Access the pin-level backend (simulation control, tests).
    pub fn io_mut(&mut self) -> &mut B {
        &mut self.io
    }

    /// Drive `word` onto `compartment`'s output register.
    ///
    /// Sequence: assert chip select, shift MSB-first, pulse latch,
    /// release chip select. The select line is back in its idle state
    /// on exit. No error return: a dead chip silently keeps its old
    /// bits, which surfaces as a motion timeout upstream.
    pub fn write_outputs(&mut self, compartment: u8, word: OutputWord) {
        debug_assert!(compartment < self.compartments);
        trace!(compartment, bits = word.bits(), "write outputs");

        self.io.set_line(Line::OutSelect(compartment), true);
        self.shift_out(word.bits());
        self.pulse_latch();
        self.io.set_line(Line::OutSelect(compartment), false);

        self.last_written[compartment as usize] = word;
    }

    /// Capture one atomic sensor word from `compartment`'s input register.
    ///
    /// Sequence: assert chip select, pulse latch (parallel load), shift
    /// in MSB-first, release chip select — then re-assert the last
    /// written output word, because the read pulses ran on the shared
    /// clock/latch lines.
    pub fn read_inputs(&mut self, compartment: u8) -> SensorWord {
        debug_assert!(compartment < self.compartments);

        self.io.set_line(Line::InSelect(compartment), true);
        self.pulse_latch();

        let mut bits: u8 = 0;
        for _ in 0..INPUT_BITS {
            bits <<= 1;
            if self.io.read_line(Line::Input) {
                bits |= 1;
            }
            self.pulse_clock();
        }

        self.io.set_line(Line::InSelect(compartment), false);

        // Output state must never be corrupted by a read.
        let restore = self.last_written[compartment as usize];
        self.write_outputs(compartment, restore);

        trace!(compartment, bits, "read inputs");
        SensorWord::from_bits_truncate(bits)
    }

    /// Pulse the solenoid bit high for `pulse`, leaving the rest of the
    /// word untouched. Blocks for the pulse duration.
    pub fn pulse_solenoid(&mut self, compartment: u8, pulse: Duration) {
        let word = self.last_written[compartment as usize];
        self.write_outputs(compartment, word | OutputWord::SOLENOID);
        self.io.sleep_for(pulse);
        self.write_outputs(compartment, word - OutputWord::SOLENOID);
    }

    /// Emit `steps` motor step pulses with the given half-period.
    pub fn step_motor(&mut self, compartment: u8, steps: u16, half_period: Duration) {
        let word = self.last_written[compartment as usize];
        for _ in 0..steps {
            self.write_outputs(compartment, word | OutputWord::MOTOR_STEP);
            self.io.sleep_for(half_period);
            self.write_outputs(compartment, word - OutputWord::MOTOR_STEP);
            self.io.sleep_for(half_period);
        }
    }

    fn shift_out(&mut self, bits: u8) {
        for i in (0..OUTPUT_BITS).rev() {
            self.io.set_line(Line::Data, bits & (1 << i) != 0);
            self.pulse_clock();
        }
    }

    fn pulse_clock(&mut self) {
        self.io.set_line(Line::Clock, true);
        self.io.sleep_for(Duration::from_micros(CLOCK_PULSE_US));
        self.io.set_line(Line::Clock, false);
        self.io.sleep_for(Duration::from_micros(CLOCK_PULSE_US));
    }

    fn pulse_latch(&mut self) {
        self.io.set_line(Line::Latch, true);
        self.io.sleep_for(Duration::from_micros(LATCH_PULSE_US));
        self.io.set_line(Line::Latch, false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records every pin operation for sequence assertions.
    #[derive(Default)]
    struct RecordingIo {
        ops: Vec<(Line, bool)>,
        input_bits: u8,
        shift_pos: u8,
    }

    impl BusIo for RecordingIo {
        fn set_line(&mut self, line: Line, high: bool) {
            if line == Line::Latch && high {
                self.shift_pos = 0;
            }
            self.ops.push((line, high));
        }

        fn read_line(&mut self, _line: Line) -> bool {
            let bit = self.input_bits & (0x80 >> self.shift_pos.min(7)) != 0;
            self.shift_pos += 1;
            bit
        }

        fn sleep_for(&mut self, _d: Duration) {}
    }

    fn selects_idle(ops: &[(Line, bool)], compartments: u8) -> bool {
        let mut level = vec![false; compartments as usize * 2];
        for (line, high) in ops {
            match line {
                Line::OutSelect(i) => level[*i as usize * 2] = *high,
                Line::InSelect(i) => level[*i as usize * 2 + 1] = *high,
                _ => {}
            }
        }
        level.iter().all(|&l| !l)
    }

    #[test]
    fn write_asserts_and_releases_chip_select() {
        let mut bus = ShiftRegisterBus::new(RecordingIo::default(), 2);
        bus.io_mut().ops.clear();

        bus.write_outputs(1, OutputWord::LED);
        let ops = &bus.io_mut().ops;

        assert_eq!(ops.first(), Some(&(Line::OutSelect(1), true)));
        assert_eq!(ops.last(), Some(&(Line::OutSelect(1), false)));
        // Latch pulsed exactly once, inside the select window.
        let latches: Vec<_> = ops.iter().filter(|(l, h)| *l == Line::Latch && *h).collect();
        assert_eq!(latches.len(), 1);
        assert!(selects_idle(ops, 2));
    }

    #[test]
    fn write_never_touches_other_compartment_selects() {
        let mut bus = ShiftRegisterBus::new(RecordingIo::default(), 4);
        bus.io_mut().ops.clear();

        bus.write_outputs(2, OutputWord::HEATER);
        for (line, _) in &bus.io_mut().ops {
            match line {
                Line::OutSelect(i) | Line::InSelect(i) => assert_eq!(*i, 2),
                _ => {}
            }
        }
    }

    #[test]
    fn read_reassert_restores_output_word() {
        let mut bus = ShiftRegisterBus::new(RecordingIo::default(), 1);
        let word = OutputWord::LED | OutputWord::MOTOR_DIR;
        bus.write_outputs(0, word);
        bus.io_mut().ops.clear();

        let before = bus.outputs(0);
        bus.read_inputs(0);
        let after = bus.outputs(0);

        assert_eq!(before, word);
        assert_eq!(after, word);

        // The read must end with a full output re-assert: an OutSelect
        // window with a latch pulse inside it.
        let ops = &bus.io_mut().ops;
        let reassert_start = ops
            .iter()
            .position(|op| *op == (Line::OutSelect(0), true))
            .expect("no output re-assert after read");
        let in_release = ops
            .iter()
            .position(|op| *op == (Line::InSelect(0), false))
            .expect("input select never released");
        assert!(reassert_start > in_release);
        assert!(selects_idle(ops, 1));
    }

    #[test]
    fn read_decodes_msb_first() {
        let mut io = RecordingIo::default();
        io.input_bits = SensorWord::DOOR_CLOSED.bits() | SensorWord::SAFETY_OK.bits();
        let mut bus = ShiftRegisterBus::new(io, 1);

        let word = bus.read_inputs(0);
        assert!(word.contains(SensorWord::DOOR_CLOSED));
        assert!(word.contains(SensorWord::SAFETY_OK));
        assert!(!word.contains(SensorWord::MOTOR_FAULT));
    }

    #[test]
    fn solenoid_pulse_returns_to_prior_word() {
        let mut bus = ShiftRegisterBus::new(RecordingIo::default(), 1);
        bus.write_outputs(0, OutputWord::LED);

        bus.pulse_solenoid(0, Duration::from_millis(150));
        assert_eq!(bus.outputs(0), OutputWord::LED);
    }

    #[test]
    #[should_panic(expected = "at most")]
    fn too_many_compartments_panics() {
        let _ = ShiftRegisterBus::new(RecordingIo::default(), MAX_COMPARTMENTS as u8 + 1);
    }
}
