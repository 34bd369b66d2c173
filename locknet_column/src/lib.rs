//! # LOCKNET Column Controller Library
//!
//! One column controller drives a fixed set of locker compartments
//! through daisy-chained shift registers and keeps the coordinator
//! informed over the local network.
//!
//! # Module Structure
//!
//! - [`bus`] - Bit-serial I/O driver over a pin-level [`bus::BusIo`] backend
//! - [`motion`] - Per-compartment hardware control state machine
//! - [`sync`] - Announce/heartbeat/event synchronization client
//! - [`server`] - Synchronous command endpoint
//! - [`cycle`] - The single cooperative control loop
//! - [`config`] - Column configuration
//!
//! # Architecture
//!
//! ```text
//! coordinator ──commands──► server ──► motion ──► bus ──► shift registers
//! coordinator ◄──announce/heartbeat/events── sync ◄── motion/bus
//! ```
//!
//! Everything runs on one cooperative loop: no locking, no queueing.
//! The hardware bus is only ever touched from that loop; operation
//! ordering (assert chip-select, pulse, release) is the mutual-exclusion
//! discipline.

pub mod bus;
pub mod config;
pub mod cycle;
pub mod motion;
pub mod server;
pub mod sync;

pub use crate::bus::{BusIo, Line, ShiftRegisterBus, SimBus};
pub use crate::cycle::ControlLoop;
pub use crate::motion::{Compartment, MotionError, SafetyPolicy};
pub use crate::sync::{CoordinatorLink, SyncClient, TcpCoordinatorLink};
