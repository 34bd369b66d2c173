//! Sensor/output words, compartment state and identity types.
//!
//! Words use the `bitflags` crate; state enums use `#[repr(u8)]` with
//! `from_u8` conversion so they can cross the wire as raw bytes.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

bitflags! {
    /// One atomic sensor sample for a single compartment.
    ///
    /// Seven independent booleans read together from the input shift
    /// register. `MOTOR_FAULT` takes priority over every state-machine
    /// transition.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SensorWord: u8 {
        /// Door end-switch: fully closed.
        const DOOR_CLOSED = 0x01;
        /// Door end-switch: fully open.
        const DOOR_OPEN   = 0x02;
        /// IR beam across the door path is unbroken.
        const IR_CLEAR    = 0x04;
        /// Occupancy sensor: an item is present.
        const OCCUPIED    = 0x08;
        /// Compartment temperature within limits.
        const TEMP_OK     = 0x10;
        /// Safety interlock chain closed.
        const SAFETY_OK   = 0x20;
        /// Motor driver fault line asserted.
        const MOTOR_FAULT = 0x40;
    }
}

impl Default for SensorWord {
    fn default() -> Self {
        Self::empty()
    }
}

bitflags! {
    /// Actuator output word for a single compartment.
    ///
    /// Persisted across polling cycles; the bus driver re-asserts the
    /// last written word after every input read.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OutputWord: u8 {
        /// Compartment LED.
        const LED        = 0x01;
        /// UV-C sanitizer lamp.
        const UVC        = 0x02;
        /// Lock release solenoid.
        const SOLENOID   = 0x04;
        /// Compartment heater.
        const HEATER     = 0x08;
        /// Door motor direction: set = opening, clear = closing.
        const MOTOR_DIR  = 0x10;
        /// Door motor step enable.
        const MOTOR_STEP = 0x20;
    }
}

impl Default for OutputWord {
    fn default() -> Self {
        Self::empty()
    }
}

/// Per-compartment hardware control state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum CompartmentState {
    /// No knowledge of door position (neither end-switch asserted at boot).
    Idle = 0,
    /// Solenoid released, door driving open.
    Unlocking = 1,
    /// Door fully open.
    Open = 2,
    /// Door driving closed.
    Closing = 3,
    /// Door closed and latched.
    Locked = 4,
    /// Motor fault or motion timeout; terminal until an explicit clear.
    Fault = 5,
    /// UV cycle running, door locked.
    Sanitizing = 6,
}

impl CompartmentState {
    /// Convert from raw `u8`. Returns `None` for invalid values.
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Idle),
            1 => Some(Self::Unlocking),
            2 => Some(Self::Open),
            3 => Some(Self::Closing),
            4 => Some(Self::Locked),
            5 => Some(Self::Fault),
            6 => Some(Self::Sanitizing),
            _ => None,
        }
    }

    /// States that reject new motion commands.
    #[inline]
    pub const fn is_busy(&self) -> bool {
        matches!(self, Self::Unlocking | Self::Closing | Self::Sanitizing)
    }
}

impl Default for CompartmentState {
    fn default() -> Self {
        Self::Idle
    }
}

/// Compartment size class used as an assignment filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SizeClass {
    Small,
    #[default]
    Medium,
    Large,
}

/// Nameable actuator outputs exposed through the command protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputName {
    Led,
    Uvc,
    Heater,
}

impl OutputName {
    /// The output-word bit this name addresses.
    #[inline]
    pub const fn bit(&self) -> OutputWord {
        match self {
            Self::Led => OutputWord::LED,
            Self::Uvc => OutputWord::UVC,
            Self::Heater => OutputWord::HEATER,
        }
    }
}

/// Door motor travel direction for jog commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MotorDirection {
    Open,
    Close,
}

/// Identity of one embedded column controller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnId(pub String);

impl ColumnId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of one physical locker cell: column plus index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CompartmentId {
    pub column: ColumnId,
    pub index: u8,
}

impl CompartmentId {
    pub fn new(column: ColumnId, index: u8) -> Self {
        Self { column, index }
    }
}

impl fmt::Display for CompartmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.column, self.index)
    }
}
