//! Hardware-facing types shared between the column controller and the
//! coordinator.
//!
//! The sensor and output words travel verbatim over the synchronization
//! protocol, so their bit assignments are part of the wire contract.

pub mod types;

pub use types::{
    ColumnId, CompartmentId, CompartmentState, MotorDirection, OutputName, OutputWord,
    SensorWord, SizeClass,
};
