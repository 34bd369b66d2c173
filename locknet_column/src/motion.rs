//! Per-compartment hardware control state machine.
//!
//! One instance per compartment converts commands and sensor bits into
//! actuator bits. Time is injected: every operation takes `now`, so the
//! full timeout logic runs against a simulated timeline in tests.
//!
//! Failure semantics: `Busy`, `SafetyRejected`, `Obstruction` and
//! `DoorNotClosed` are recoverable caller-visible errors. Motor faults
//! and motion timeouts are terminal until an explicit `clear_fault`.

use crate::bus::{BusIo, ShiftRegisterBus};
use locknet::consts::{JOG_STEP_PULSE_US, MAX_JOG_STEPS, MOTION_TIMEOUT, SOLENOID_PULSE};
use locknet::hw::{CompartmentState, MotorDirection, OutputName, OutputWord, SensorWord};
use locknet::protocol::CompartmentReport;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

/// Caller-visible motion errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MotionError {
    /// A motion operation is already in progress; retry later.
    #[error("operation already in progress")]
    Busy,

    /// The safety interlock policy rejected the command.
    #[error("safety interlock rejected the command")]
    SafetyRejected,

    /// The IR beam reports an obstruction in the closing path.
    #[error("closing path obstructed")]
    Obstruction,

    /// Sanitizing requires the door closed and latched.
    #[error("door is not closed")]
    DoorNotClosed,

    /// The motion did not reach its target sensor in time.
    #[error("motion timed out")]
    MotionTimeout,

    /// Motor fault line asserted; requires an explicit fault clear.
    #[error("hardware fault present")]
    HardwareFault,
}

/// Safety-interlock gate checked before every motion command.
///
/// The bypass is an explicit configuration value, logged at
/// construction and at every bypassed check — never a compiled-out
/// path.
#[derive(Debug, Clone, Copy)]
pub struct SafetyPolicy {
    bypass: bool,
}

impl SafetyPolicy {
    pub fn new(bypass: bool) -> Self {
        if bypass {
            warn!("safety interlock bypass ENABLED by configuration");
        }
        Self { bypass }
    }

    /// Reject unless the safety chain is closed and no motor fault is
    /// present.
    pub fn check(&self, sensors: SensorWord) -> Result<(), MotionError> {
        let ok = sensors.contains(SensorWord::SAFETY_OK)
            && !sensors.contains(SensorWord::MOTOR_FAULT);
        if ok {
            return Ok(());
        }
        if self.bypass {
            warn!(sensors = sensors.bits(), "safety check bypassed by configuration");
            return Ok(());
        }
        Err(MotionError::SafetyRejected)
    }
}

impl Default for SafetyPolicy {
    fn default() -> Self {
        Self { bypass: false }
    }
}

/// State machine for one compartment.
#[derive(Debug)]
pub struct Compartment {
    index: u8,
    state: CompartmentState,
    outputs: OutputWord,
    sensors: SensorWord,
    policy: SafetyPolicy,
    /// Start of the in-flight motion, for timeout detection.
    op_started: Option<Instant>,
    /// End of the running UV cycle.
    sanitize_until: Option<Instant>,
    last_error: Option<String>,
    motion_timeout: Duration,
    solenoid_pulse: Duration,
}

impl Compartment {
    pub fn new(index: u8, policy: SafetyPolicy) -> Self {
        Self {
            index,
            state: CompartmentState::Idle,
            outputs: OutputWord::empty(),
            sensors: SensorWord::empty(),
            policy,
            op_started: None,
            sanitize_until: None,
            last_error: None,
            motion_timeout: MOTION_TIMEOUT,
            solenoid_pulse: SOLENOID_PULSE,
        }
    }

    /// Override the motion timeout (tests, slow mechanisms).
    pub fn with_motion_timeout(mut self, timeout: Duration) -> Self {
        self.motion_timeout = timeout;
        self
    }

    /// Derive the boot state from the current sensor sample:
    /// door closed ⇒ `Locked`, door open ⇒ `Open`, neither ⇒ `Idle`.
    pub fn init_from_sensors<B: BusIo>(&mut self, bus: &mut ShiftRegisterBus<B>) {
        self.sensors = bus.read_inputs(self.index);
        self.state = boot_state(self.sensors);
        info!(
            compartment = self.index,
            state = ?self.state,
            "initialized from sensors"
        );
    }

    #[inline]
    pub const fn index(&self) -> u8 {
        self.index
    }

    #[inline]
    pub const fn state(&self) -> CompartmentState {
        self.state
    }

    /// Last sensor sample taken by `update` or a command.
    #[inline]
    pub const fn sensors(&self) -> SensorWord {
        self.sensors
    }

    #[inline]
    pub const fn outputs(&self) -> OutputWord {
        self.outputs
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Release the lock and start driving the door open.
    ///
    /// Pulses the solenoid for the fixed release duration (blocking),
    /// sets motor direction open, turns the LED on and arms the motion
    /// timeout. Fails with `Busy` while a motion or UV cycle is in
    /// progress; fails with `SafetyRejected` per the interlock policy.
    /// Never transitions state on failure.
    pub fn unlock<B: BusIo>(
        &mut self,
        bus: &mut ShiftRegisterBus<B>,
        now: Instant,
    ) -> Result<(), MotionError> {
        if self.state.is_busy() {
            return Err(MotionError::Busy);
        }
        self.sensors = bus.read_inputs(self.index);
        self.policy.check(self.sensors)?;

        self.outputs |= OutputWord::LED | OutputWord::MOTOR_DIR | OutputWord::MOTOR_STEP;
        bus.write_outputs(self.index, self.outputs);
        bus.pulse_solenoid(self.index, self.solenoid_pulse);

        self.op_started = Some(now);
        self.state = CompartmentState::Unlocking;
        info!(compartment = self.index, "unlocking");
        Ok(())
    }

    /// Start driving the door closed.
    ///
    /// Fails with `Obstruction` while the IR beam is blocked and with
    /// `SafetyRejected` per the interlock policy. Never transitions
    /// state on failure.
    pub fn lock<B: BusIo>(
        &mut self,
        bus: &mut ShiftRegisterBus<B>,
        now: Instant,
    ) -> Result<(), MotionError> {
        self.sensors = bus.read_inputs(self.index);
        if !self.sensors.contains(SensorWord::IR_CLEAR) {
            return Err(MotionError::Obstruction);
        }
        self.policy.check(self.sensors)?;

        self.outputs -= OutputWord::MOTOR_DIR;
        self.outputs |= OutputWord::MOTOR_STEP;
        bus.write_outputs(self.index, self.outputs);

        self.op_started = Some(now);
        self.state = CompartmentState::Closing;
        info!(compartment = self.index, "closing");
        Ok(())
    }

    /// Start a UV sanitize cycle of the given duration.
    ///
    /// Requires the door closed and no motion in progress.
    pub fn start_sanitize<B: BusIo>(
        &mut self,
        bus: &mut ShiftRegisterBus<B>,
        now: Instant,
        duration: Duration,
    ) -> Result<(), MotionError> {
        if self.state.is_busy() {
            return Err(MotionError::Busy);
        }
        self.sensors = bus.read_inputs(self.index);
        if !self.sensors.contains(SensorWord::DOOR_CLOSED) {
            return Err(MotionError::DoorNotClosed);
        }

        self.outputs |= OutputWord::UVC;
        bus.write_outputs(self.index, self.outputs);

        self.sanitize_until = Some(now + duration);
        self.state = CompartmentState::Sanitizing;
        info!(compartment = self.index, ?duration, "sanitizing");
        Ok(())
    }

    /// Direct actuator toggle; no state transition, always permitted.
    pub fn set_output<B: BusIo>(
        &mut self,
        bus: &mut ShiftRegisterBus<B>,
        output: OutputName,
        on: bool,
    ) {
        self.outputs.set(output.bit(), on);
        bus.write_outputs(self.index, self.outputs);
    }

    /// Jog the door motor a bounded number of steps (maintenance).
    ///
    /// Blocks for the full step train. Steps beyond the jog bound are
    /// clamped.
    pub fn jog<B: BusIo>(
        &mut self,
        bus: &mut ShiftRegisterBus<B>,
        steps: u16,
        direction: MotorDirection,
    ) -> Result<(), MotionError> {
        if self.state.is_busy() {
            return Err(MotionError::Busy);
        }
        self.sensors = bus.read_inputs(self.index);
        self.policy.check(self.sensors)?;

        let steps = if steps > MAX_JOG_STEPS {
            warn!(compartment = self.index, steps, "jog clamped to {MAX_JOG_STEPS}");
            MAX_JOG_STEPS
        } else {
            steps
        };

        self.outputs
            .set(OutputWord::MOTOR_DIR, direction == MotorDirection::Open);
        bus.write_outputs(self.index, self.outputs);
        bus.step_motor(self.index, steps, Duration::from_micros(JOG_STEP_PULSE_US));
        Ok(())
    }

    /// Explicit fault-clear action.
    ///
    /// Refused while the motor fault line is still asserted; otherwise
    /// zeroes all outputs and re-derives state from sensors as at boot.
    pub fn clear_fault<B: BusIo>(
        &mut self,
        bus: &mut ShiftRegisterBus<B>,
    ) -> Result<(), MotionError> {
        self.sensors = bus.read_inputs(self.index);
        if self.sensors.contains(SensorWord::MOTOR_FAULT) {
            return Err(MotionError::HardwareFault);
        }

        self.outputs = OutputWord::empty();
        bus.write_outputs(self.index, self.outputs);
        self.op_started = None;
        self.sanitize_until = None;
        self.last_error = None;
        self.state = boot_state(self.sensors);
        info!(compartment = self.index, state = ?self.state, "fault cleared");
        Ok(())
    }

    /// Advance the state machine one control cycle.
    ///
    /// Re-samples sensors. A motor fault forces an emergency stop (all
    /// outputs zeroed) and `Fault`, ahead of every other rule.
    pub fn update<B: BusIo>(&mut self, bus: &mut ShiftRegisterBus<B>, now: Instant) {
        self.sensors = bus.read_inputs(self.index);

        if self.sensors.contains(SensorWord::MOTOR_FAULT)
            && self.state != CompartmentState::Fault
        {
            self.emergency_stop(bus, "motor fault");
            return;
        }

        match self.state {
            CompartmentState::Unlocking => {
                if self.sensors.contains(SensorWord::DOOR_OPEN) {
                    self.outputs -= OutputWord::MOTOR_STEP;
                    bus.write_outputs(self.index, self.outputs);
                    self.op_started = None;
                    self.state = CompartmentState::Open;
                } else if self.timed_out(now) {
                    self.fault(bus, "unlock timed out");
                }
            }
            CompartmentState::Closing => {
                if !self.sensors.contains(SensorWord::IR_CLEAR) {
                    // Obstruction: reverse and reopen rather than fault.
                    self.outputs |= OutputWord::MOTOR_DIR;
                    bus.write_outputs(self.index, self.outputs);
                    self.op_started = Some(now);
                    self.state = CompartmentState::Unlocking;
                    self.last_error = Some("obstruction while closing; reopening".into());
                    warn!(compartment = self.index, "obstruction while closing; reopening");
                } else if self.sensors.contains(SensorWord::DOOR_CLOSED) {
                    self.outputs -= OutputWord::LED | OutputWord::MOTOR_STEP;
                    bus.write_outputs(self.index, self.outputs);
                    self.op_started = None;
                    self.state = CompartmentState::Locked;
                } else if self.timed_out(now) {
                    self.fault(bus, "lock timed out");
                }
            }
            CompartmentState::Sanitizing => {
                if self.sanitize_until.is_some_and(|until| now >= until) {
                    self.outputs -= OutputWord::UVC;
                    bus.write_outputs(self.index, self.outputs);
                    self.sanitize_until = None;
                    self.state = CompartmentState::Locked;
                    info!(compartment = self.index, "sanitize complete");
                }
            }
            CompartmentState::Open => {
                if self.sensors.contains(SensorWord::DOOR_CLOSED) {
                    self.outputs -= OutputWord::LED;
                    bus.write_outputs(self.index, self.outputs);
                    self.state = CompartmentState::Locked;
                }
            }
            // No autonomous transition.
            CompartmentState::Idle | CompartmentState::Locked | CompartmentState::Fault => {}
        }
    }

    /// Build the status report slice for this compartment.
    pub fn report(&self) -> CompartmentReport {
        CompartmentReport {
            index: self.index,
            state: self.state,
            sensors: self.sensors.bits(),
            outputs: self.outputs.bits(),
            last_error: self.last_error.clone(),
        }
    }

    fn timed_out(&self, now: Instant) -> bool {
        self.op_started
            .is_some_and(|start| now.saturating_duration_since(start) > self.motion_timeout)
    }

    fn fault<B: BusIo>(&mut self, bus: &mut ShiftRegisterBus<B>, reason: &str) {
        self.outputs -= OutputWord::MOTOR_STEP;
        bus.write_outputs(self.index, self.outputs);
        self.op_started = None;
        self.state = CompartmentState::Fault;
        self.last_error = Some(reason.into());
        warn!(compartment = self.index, reason, "motion fault");
    }

    fn emergency_stop<B: BusIo>(&mut self, bus: &mut ShiftRegisterBus<B>, reason: &str) {
        self.outputs = OutputWord::empty();
        bus.write_outputs(self.index, self.outputs);
        self.op_started = None;
        self.sanitize_until = None;
        self.state = CompartmentState::Fault;
        self.last_error = Some(reason.into());
        warn!(compartment = self.index, reason, "emergency stop");
    }
}

/// Boot-state derivation shared by init and fault clear.
fn boot_state(sensors: SensorWord) -> CompartmentState {
    if sensors.contains(SensorWord::DOOR_CLOSED) {
        CompartmentState::Locked
    } else if sensors.contains(SensorWord::DOOR_OPEN) {
        CompartmentState::Open
    } else {
        CompartmentState::Idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::SimBus;

    fn rig(sensors: SensorWord) -> (ShiftRegisterBus<SimBus>, Compartment, Instant) {
        let mut bus = ShiftRegisterBus::new(SimBus::new(1), 1);
        bus.io_mut().set_sensors(0, sensors);
        let mut comp = Compartment::new(0, SafetyPolicy::default());
        comp.init_from_sensors(&mut bus);
        (bus, comp, Instant::now())
    }

    fn closed() -> SensorWord {
        SensorWord::DOOR_CLOSED | SensorWord::IR_CLEAR | SensorWord::TEMP_OK | SensorWord::SAFETY_OK
    }

    fn open() -> SensorWord {
        SensorWord::DOOR_OPEN | SensorWord::IR_CLEAR | SensorWord::TEMP_OK | SensorWord::SAFETY_OK
    }

    // ── Boot-state derivation ───────────────────────────────────────

    #[test]
    fn boot_door_closed_is_locked() {
        let (_, comp, _) = rig(closed());
        assert_eq!(comp.state(), CompartmentState::Locked);
    }

    #[test]
    fn boot_door_open_is_open() {
        let (_, comp, _) = rig(open());
        assert_eq!(comp.state(), CompartmentState::Open);
    }

    #[test]
    fn boot_neither_switch_is_idle() {
        let (_, comp, _) = rig(SensorWord::IR_CLEAR | SensorWord::SAFETY_OK);
        assert_eq!(comp.state(), CompartmentState::Idle);
    }

    // ── unlock ──────────────────────────────────────────────────────

    #[test]
    fn unlock_transitions_and_drives_outputs() {
        let (mut bus, mut comp, now) = rig(closed());

        comp.unlock(&mut bus, now).unwrap();
        assert_eq!(comp.state(), CompartmentState::Unlocking);
        assert!(comp.outputs().contains(OutputWord::LED));
        assert!(comp.outputs().contains(OutputWord::MOTOR_DIR));
        assert!(comp.outputs().contains(OutputWord::MOTOR_STEP));
        // Solenoid pulse already finished.
        assert!(!comp.outputs().contains(OutputWord::SOLENOID));
        assert_eq!(bus.io_mut().latched_outputs(0), comp.outputs());
    }

    #[test]
    fn unlock_busy_in_each_busy_state() {
        for state_setup in ["unlocking", "closing", "sanitizing"] {
            let (mut bus, mut comp, now) = rig(closed());
            match state_setup {
                "unlocking" => comp.unlock(&mut bus, now).unwrap(),
                "closing" => {
                    bus.io_mut().set_sensors(0, open());
                    comp.lock(&mut bus, now).unwrap();
                }
                _ => comp
                    .start_sanitize(&mut bus, now, Duration::from_secs(5))
                    .unwrap(),
            }
            let state_before = comp.state();
            assert_eq!(comp.unlock(&mut bus, now), Err(MotionError::Busy));
            assert_eq!(comp.state(), state_before, "failure must not transition");
        }
    }

    #[test]
    fn unlock_not_busy_in_settled_states() {
        for sensors in [closed(), open(), SensorWord::IR_CLEAR | SensorWord::SAFETY_OK] {
            let (mut bus, mut comp, now) = rig(sensors);
            assert_ne!(comp.unlock(&mut bus, now), Err(MotionError::Busy));
        }
    }

    #[test]
    fn unlock_safety_rejected_without_interlock() {
        let (mut bus, mut comp, now) = rig(closed() - SensorWord::SAFETY_OK);
        assert_eq!(comp.unlock(&mut bus, now), Err(MotionError::SafetyRejected));
        assert_eq!(comp.state(), CompartmentState::Locked);
        assert_eq!(comp.outputs(), OutputWord::empty());
    }

    #[test]
    fn safety_bypass_is_explicit_and_allows_unlock() {
        let mut bus = ShiftRegisterBus::new(SimBus::new(1), 1);
        bus.io_mut().set_sensors(0, closed() - SensorWord::SAFETY_OK);
        let mut comp = Compartment::new(0, SafetyPolicy::new(true));
        comp.init_from_sensors(&mut bus);

        assert!(comp.unlock(&mut bus, Instant::now()).is_ok());
    }

    #[test]
    fn unlock_completes_when_door_opens() {
        let (mut bus, mut comp, now) = rig(closed());
        comp.unlock(&mut bus, now).unwrap();

        bus.io_mut().set_sensors(0, open());
        comp.update(&mut bus, now + Duration::from_secs(1));
        assert_eq!(comp.state(), CompartmentState::Open);
        assert!(!comp.outputs().contains(OutputWord::MOTOR_STEP));
        // LED stays on while open.
        assert!(comp.outputs().contains(OutputWord::LED));
    }

    #[test]
    fn unlock_times_out_to_fault() {
        let (mut bus, mut comp, now) = rig(closed());
        comp.unlock(&mut bus, now).unwrap();

        // Door never moves (sensors stay door-closed).
        comp.update(&mut bus, now + Duration::from_secs(9));
        assert_eq!(comp.state(), CompartmentState::Fault);
        assert!(!comp.outputs().contains(OutputWord::MOTOR_STEP));
        assert!(comp.last_error().unwrap().contains("timed out"));

        // Terminal: further updates do not leave Fault.
        comp.update(&mut bus, now + Duration::from_secs(20));
        assert_eq!(comp.state(), CompartmentState::Fault);
    }

    // ── lock ────────────────────────────────────────────────────────

    #[test]
    fn lock_rejected_while_beam_blocked() {
        let (mut bus, mut comp, now) = rig(open() - SensorWord::IR_CLEAR);
        assert_eq!(comp.lock(&mut bus, now), Err(MotionError::Obstruction));
        assert_eq!(comp.state(), CompartmentState::Open);
    }

    #[test]
    fn lock_completes_when_door_closes() {
        let (mut bus, mut comp, now) = rig(open());
        comp.unlock(&mut bus, now).ok(); // LED on from a prior open
        bus.io_mut().set_sensors(0, open());
        comp.update(&mut bus, now);

        comp.lock(&mut bus, now).unwrap();
        assert_eq!(comp.state(), CompartmentState::Closing);
        assert!(!comp.outputs().contains(OutputWord::MOTOR_DIR));

        bus.io_mut().set_sensors(0, closed());
        comp.update(&mut bus, now + Duration::from_secs(2));
        assert_eq!(comp.state(), CompartmentState::Locked);
        assert!(!comp.outputs().contains(OutputWord::LED));
        assert!(!comp.outputs().contains(OutputWord::MOTOR_STEP));
    }

    #[test]
    fn lock_times_out_to_fault() {
        let (mut bus, mut comp, now) = rig(open());
        comp.lock(&mut bus, now).unwrap();

        comp.update(&mut bus, now + Duration::from_secs(9));
        assert_eq!(comp.state(), CompartmentState::Fault);
    }

    // ── Obstruction recovery ────────────────────────────────────────

    #[test]
    fn closing_obstruction_reopens_then_completes() {
        let (mut bus, mut comp, now) = rig(open());
        comp.unlock(&mut bus, now).ok();
        bus.io_mut().set_sensors(0, open());
        comp.update(&mut bus, now);
        comp.lock(&mut bus, now).unwrap();

        // Beam breaks mid-close.
        bus.io_mut()
            .set_sensors(0, SensorWord::TEMP_OK | SensorWord::SAFETY_OK);
        comp.update(&mut bus, now + Duration::from_secs(1));

        assert_eq!(comp.state(), CompartmentState::Unlocking);
        assert!(comp.outputs().contains(OutputWord::LED), "LED must stay on");
        assert!(comp.outputs().contains(OutputWord::MOTOR_DIR), "direction reversed");
        assert!(comp.last_error().unwrap().contains("obstruction"));

        // Door reaches open again.
        bus.io_mut().set_sensors(0, open());
        comp.update(&mut bus, now + Duration::from_secs(2));
        assert_eq!(comp.state(), CompartmentState::Open);
    }

    // ── Motor fault priority ────────────────────────────────────────

    #[test]
    fn motor_fault_forces_fault_and_zeroes_outputs_from_any_state() {
        let scenarios: [(&str, fn(&mut ShiftRegisterBus<SimBus>, &mut Compartment, Instant)); 5] = [
            ("locked", |_, _, _| {}),
            ("unlocking", |bus, comp, now| {
                comp.unlock(bus, now).unwrap();
            }),
            ("open", |bus, comp, now| {
                comp.unlock(bus, now).unwrap();
                bus.io_mut().set_sensors(
                    0,
                    SensorWord::DOOR_OPEN
                        | SensorWord::IR_CLEAR
                        | SensorWord::TEMP_OK
                        | SensorWord::SAFETY_OK,
                );
                comp.update(bus, now);
            }),
            ("closing", |bus, comp, now| {
                comp.unlock(bus, now).unwrap();
                bus.io_mut().set_sensors(
                    0,
                    SensorWord::DOOR_OPEN
                        | SensorWord::IR_CLEAR
                        | SensorWord::TEMP_OK
                        | SensorWord::SAFETY_OK,
                );
                comp.update(bus, now);
                comp.lock(bus, now).unwrap();
            }),
            ("sanitizing", |bus, comp, now| {
                comp.start_sanitize(bus, now, Duration::from_secs(60)).unwrap();
            }),
        ];

        for (name, setup) in scenarios {
            let mut bus = ShiftRegisterBus::new(SimBus::new(1), 1);
            bus.io_mut().set_sensors(0, closed());
            let mut comp = Compartment::new(0, SafetyPolicy::default());
            comp.init_from_sensors(&mut bus);
            let now = Instant::now();
            setup(&mut bus, &mut comp, now);

            let fault_word = bus.io_mut().sensors(0) | SensorWord::MOTOR_FAULT;
            bus.io_mut().set_sensors(0, fault_word);
            comp.update(&mut bus, now + Duration::from_millis(100));

            assert_eq!(comp.state(), CompartmentState::Fault, "from {name}");
            assert_eq!(comp.outputs(), OutputWord::empty(), "outputs zeroed from {name}");
            assert_eq!(
                bus.io_mut().latched_outputs(0),
                OutputWord::empty(),
                "hardware zeroed from {name}"
            );
        }
    }

    #[test]
    fn clear_fault_refused_while_fault_line_asserted() {
        let (mut bus, mut comp, now) = rig(closed());
        bus.io_mut().set_sensor(0, SensorWord::MOTOR_FAULT, true);
        comp.update(&mut bus, now);
        assert_eq!(comp.state(), CompartmentState::Fault);

        assert_eq!(comp.clear_fault(&mut bus), Err(MotionError::HardwareFault));
        assert_eq!(comp.state(), CompartmentState::Fault);
    }

    #[test]
    fn clear_fault_rederives_state_from_sensors() {
        let (mut bus, mut comp, now) = rig(closed());
        bus.io_mut().set_sensor(0, SensorWord::MOTOR_FAULT, true);
        comp.update(&mut bus, now);

        bus.io_mut().set_sensor(0, SensorWord::MOTOR_FAULT, false);
        comp.clear_fault(&mut bus).unwrap();
        assert_eq!(comp.state(), CompartmentState::Locked);
        assert!(comp.last_error().is_none());
    }

    // ── Sanitize ────────────────────────────────────────────────────

    #[test]
    fn sanitize_runs_to_completion() {
        let (mut bus, mut comp, now) = rig(closed());

        comp.start_sanitize(&mut bus, now, Duration::from_millis(5000))
            .unwrap();
        assert_eq!(comp.state(), CompartmentState::Sanitizing);
        assert!(comp.outputs().contains(OutputWord::UVC));

        // Not yet.
        comp.update(&mut bus, now + Duration::from_millis(4999));
        assert_eq!(comp.state(), CompartmentState::Sanitizing);

        // Elapsed.
        comp.update(&mut bus, now + Duration::from_millis(5000));
        assert_eq!(comp.state(), CompartmentState::Locked);
        assert!(!comp.outputs().contains(OutputWord::UVC));
    }

    #[test]
    fn sanitize_requires_closed_door() {
        let (mut bus, mut comp, now) = rig(open());
        assert_eq!(
            comp.start_sanitize(&mut bus, now, Duration::from_secs(5)),
            Err(MotionError::DoorNotClosed)
        );
        assert_eq!(comp.state(), CompartmentState::Open);
    }

    // ── Direct toggles / open-close ─────────────────────────────────

    #[test]
    fn output_toggles_always_permitted() {
        let (mut bus, mut comp, now) = rig(closed());
        comp.start_sanitize(&mut bus, now, Duration::from_secs(60)).unwrap();

        comp.set_output(&mut bus, OutputName::Heater, true);
        assert!(comp.outputs().contains(OutputWord::HEATER));
        comp.set_output(&mut bus, OutputName::Heater, false);
        assert!(!comp.outputs().contains(OutputWord::HEATER));
        // Toggling never changed state.
        assert_eq!(comp.state(), CompartmentState::Sanitizing);
    }

    #[test]
    fn open_door_closes_by_hand() {
        let (mut bus, mut comp, now) = rig(open());
        bus.io_mut().set_sensors(0, closed());
        comp.update(&mut bus, now);
        assert_eq!(comp.state(), CompartmentState::Locked);
    }

    #[test]
    fn jog_rejected_while_busy() {
        let (mut bus, mut comp, now) = rig(closed());
        comp.unlock(&mut bus, now).unwrap();
        assert_eq!(
            comp.jog(&mut bus, 10, MotorDirection::Open),
            Err(MotionError::Busy)
        );
    }

    #[test]
    fn report_carries_state_and_words() {
        let (mut bus, mut comp, now) = rig(closed());
        comp.unlock(&mut bus, now).unwrap();
        let report = comp.report();
        assert_eq!(report.index, 0);
        assert_eq!(report.state, CompartmentState::Unlocking);
        assert_eq!(report.outputs, comp.outputs().bits());
    }
}
