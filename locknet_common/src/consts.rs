//! Shared timing and sizing constants.
//!
//! All timeout arithmetic in the workspace derives from these values.
//! The column control loop is wall-clock paced at [`CYCLE_TIME_MS`]; a
//! blocking command (solenoid pulse) stalls the loop for its full
//! duration, so the coordinator-side relay timeout must cover the worst
//! case of one pulse plus one cycle.

use std::time::Duration;

/// Column control loop period in milliseconds (50 Hz).
pub const CYCLE_TIME_MS: u64 = 20;

/// Column control loop period as Duration.
pub const CYCLE_TIME: Duration = Duration::from_millis(CYCLE_TIME_MS);

/// Maximum compartments a single column may drive.
pub const MAX_COMPARTMENTS: usize = 16;

// ─── Bit-serial bus timing ──────────────────────────────────────────

/// Minimum clock half-period for the shift-register chains [µs].
pub const CLOCK_PULSE_US: u64 = 5;

/// Minimum latch pulse width [µs].
pub const LATCH_PULSE_US: u64 = 10;

/// Width of the actuator output word [bits].
pub const OUTPUT_BITS: u8 = 8;

/// Width of the sensor input word [bits].
pub const INPUT_BITS: u8 = 8;

// ─── Motion timing ──────────────────────────────────────────────────

/// Fixed solenoid release pulse length.
pub const SOLENOID_PULSE: Duration = Duration::from_millis(150);

/// A motion operation (unlock or lock) that has not reached its target
/// sensor within this bound is a fault.
pub const MOTION_TIMEOUT: Duration = Duration::from_secs(8);

/// Step pulse half-period for motor jogging [µs].
pub const JOG_STEP_PULSE_US: u64 = 400;

/// Upper bound on steps accepted by a single jog command.
pub const MAX_JOG_STEPS: u16 = 2000;

// ─── Synchronization timing ─────────────────────────────────────────

/// Interval between announce attempts until the coordinator acks.
pub const ANNOUNCE_RETRY: Duration = Duration::from_secs(3);

/// Interval between full-snapshot heartbeats while announced.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// Bound on every outbound column → coordinator send.
pub const SEND_TIMEOUT: Duration = Duration::from_millis(1500);

/// A column not heard from for longer than this is offline.
pub const STALENESS_THRESHOLD: Duration = Duration::from_secs(15);

/// Interval between coordinator staleness sweeps.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(2);

/// Bound on a coordinator → column command relay round-trip.
pub const RELAY_TIMEOUT: Duration = Duration::from_secs(2);

// ─── Pickup codes ───────────────────────────────────────────────────

/// Pickup code length in characters.
pub const PICKUP_CODE_LEN: usize = 6;

/// Unambiguous code alphabet: no 0/O, no 1/I.
pub const PICKUP_CODE_ALPHABET: &[u8] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZ";

// ─── Event log ──────────────────────────────────────────────────────

/// Maximum retained event records before the oldest are dropped.
pub const EVENT_LOG_CAPACITY: usize = 4096;

static_assertions::const_assert!(MAX_COMPARTMENTS <= u8::MAX as usize);
static_assertions::const_assert_eq!(PICKUP_CODE_ALPHABET.len(), 32);
