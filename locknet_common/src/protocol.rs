//! Column ↔ coordinator synchronization protocol.
//!
//! Three inbound message kinds flow column → coordinator (announce,
//! heartbeat, event); the tagged [`ColumnCommand`] enum flows the other
//! way. Sensor and output words travel as raw `u8` bit patterns; use
//! [`SensorWord::from_bits_truncate`](crate::hw::SensorWord) on the
//! receiving side.

use serde::{Deserialize, Serialize};

use crate::hw::{ColumnId, CompartmentState, MotorDirection, OutputName};

/// One-time-per-boot registration message.
///
/// Retried at a fixed interval until the coordinator acks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announce {
    pub column_id: ColumnId,
    /// Address of the column's command endpoint.
    pub address: String,
    pub compartment_count: u8,
    pub firmware_version: String,
}

/// Periodic full-status message sent while announced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub column_id: ColumnId,
    /// Seconds since controller boot.
    pub uptime_s: u64,
    /// Raw sensor word per compartment, indexed by compartment.
    pub sensors: Vec<u8>,
}

/// Edge-triggered sensor transition kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    DoorOpened,
    DoorClosed,
    ItemDetected,
    ItemRemoved,
    Fault,
    FaultCleared,
}

/// Asynchronous, at-most-once notification of a single sensor transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMsg {
    pub column_id: ColumnId,
    pub compartment: u8,
    pub kind: EventKind,
    /// Milliseconds since controller boot at the edge.
    pub uptime_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

/// Envelope for all column → coordinator messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    Announce(Announce),
    Heartbeat(Heartbeat),
    Event(EventMsg),
}

/// Coordinator → column acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Ack {
    pub fn ok() -> Self {
        Self { ok: true, error: None }
    }

    pub fn err(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(reason.into()),
        }
    }
}

/// Command relayed from the coordinator to a column's command endpoint.
///
/// Exhaustive tagged variants: adding a command kind is a compile-time
/// checked change on both ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum ColumnCommand {
    Unlock { compartment: u8 },
    Lock { compartment: u8 },
    SetOutput {
        compartment: u8,
        output: OutputName,
        on: bool,
    },
    JogMotor {
        compartment: u8,
        steps: u16,
        direction: MotorDirection,
    },
    Sanitize { compartment: u8, duration_ms: u64 },
    ClearFault { compartment: u8 },
    Status,
}

/// Per-compartment slice of a status response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompartmentReport {
    pub index: u8,
    pub state: CompartmentState,
    /// Raw sensor word bits.
    pub sensors: u8,
    /// Raw output word bits.
    pub outputs: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Result of executing one [`ColumnCommand`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CommandOutcome {
    /// Command executed.
    Ok,
    /// Command refused; `reason` names the error kind.
    Rejected { reason: String },
    /// Full snapshot answering a `Status` request.
    Status { compartments: Vec<CompartmentReport> },
}
