//! Prelude module for common re-exports.
//!
//! Consumers can do `use locknet_common::prelude::*;` and get the most
//! important types without listing individual paths.

// ─── Logging / configuration ────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, LogLevel, SharedConfig};

// ─── Hardware words and identity ────────────────────────────────────
pub use crate::hw::{
    ColumnId, CompartmentId, CompartmentState, MotorDirection, OutputName, OutputWord,
    SensorWord, SizeClass,
};

// ─── Protocol ───────────────────────────────────────────────────────
pub use crate::protocol::{
    Ack, Announce, ColumnCommand, CommandOutcome, CompartmentReport, EventKind, EventMsg,
    Heartbeat, InboundMessage,
};

// ─── Wire ───────────────────────────────────────────────────────────
pub use crate::wire::WireError;

// ─── Timing constants ───────────────────────────────────────────────
pub use crate::consts::{CYCLE_TIME, CYCLE_TIME_MS, MAX_COMPARTMENTS};
