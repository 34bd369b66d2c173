//! The owning coordinator service object.
//!
//! Composes the column registry, reservation service, event log and
//! command relay behind one explicitly constructed instance, injected
//! into the inbound server. Tests build a fresh `Coordinator` with a
//! fake transport per case.

use crate::events::{EventLog, EventRecord};
use crate::registry::{ColumnRegistry, ColumnView};
use crate::relay::{ColumnTransport, CommandRelay, RelayError};
use crate::reservation::{
    CompartmentStatus, CompartmentView, OrderId, ReservationError, ReservationService,
};
use chrono::Utc;
use locknet::hw::{ColumnId, CompartmentId, MotorDirection, OutputName, SizeClass};
use locknet::protocol::{Ack, ColumnCommand, CommandOutcome, EventKind, InboundMessage};
use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Per-compartment answer for `get_compartment_status`.
#[derive(Debug, Clone, Serialize)]
pub struct CompartmentStatusView {
    pub status: CompartmentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<OrderId>,
    /// Raw sensor word bits from the column's last heartbeat.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensors: Option<u8>,
    pub online: bool,
}

/// The coordinating service.
pub struct Coordinator {
    registry: ColumnRegistry,
    reservations: ReservationService,
    events: EventLog,
    relay: CommandRelay<Box<dyn ColumnTransport>>,
    /// Configured size layout per column; unlisted compartments are Medium.
    size_layouts: HashMap<ColumnId, Vec<SizeClass>>,
}

impl Coordinator {
    pub fn new(
        transport: Box<dyn ColumnTransport>,
        size_layouts: HashMap<ColumnId, Vec<SizeClass>>,
    ) -> Self {
        Self {
            registry: ColumnRegistry::new(),
            reservations: ReservationService::new(),
            events: EventLog::new(),
            relay: CommandRelay::new(transport),
            size_layouts,
        }
    }

    /// Coordinator with default size layouts (tests, small sites).
    pub fn with_transport(transport: Box<dyn ColumnTransport>) -> Self {
        Self::new(transport, HashMap::new())
    }

    /// Replace the registry staleness bound (tests).
    pub fn with_staleness(mut self, staleness: Duration) -> Self {
        self.registry = ColumnRegistry::with_staleness(staleness);
        self
    }

    // ─── Inbound (column → coordinator) ─────────────────────────────

    /// Dispatch one inbound message and produce the ack.
    pub fn handle_message(&self, msg: &InboundMessage, now: Instant) -> Ack {
        match msg {
            InboundMessage::Announce(announce) => {
                self.registry.record_announce(announce, now);
                let sizes = self
                    .size_layouts
                    .get(&announce.column_id)
                    .cloned()
                    .unwrap_or_default();
                self.reservations.register_column(
                    &announce.column_id,
                    announce.compartment_count,
                    &sizes,
                );
                Ack::ok()
            }
            InboundMessage::Heartbeat(heartbeat) => {
                if self.registry.record_heartbeat(heartbeat, now) {
                    Ack::ok()
                } else {
                    Ack::err("unknown column; announce first")
                }
            }
            InboundMessage::Event(event) => {
                if self.registry.is_online(&event.column_id).is_none() {
                    return Ack::err("unknown column; announce first");
                }
                self.registry.touch(&event.column_id, now);
                let compartment =
                    CompartmentId::new(event.column_id.clone(), event.compartment);
                self.events.append(
                    compartment.clone(),
                    event.kind,
                    event.payload.clone(),
                    Utc::now(),
                );
                self.reservations.handle_event(&compartment, event.kind);
                Ack::ok()
            }
        }
    }

    /// Periodic maintenance: staleness sweep plus sanitize completion.
    pub fn sweep(&self, now: Instant) {
        self.registry.sweep(now);
        self.reservations.sweep_sanitize(now);
    }

    // ─── Reservation API (admin/kiosk surface) ──────────────────────

    /// Bind an order to a compartment and return the pickup code.
    pub fn assign(
        &self,
        order: &OrderId,
        compartment: Option<CompartmentId>,
        size: Option<SizeClass>,
    ) -> Result<String, ReservationError> {
        self.reservations.assign(order, compartment, size)
    }

    /// Mark the order loaded and light the compartment LED.
    ///
    /// The state transition is the primary effect and commits first;
    /// the LED relay is best-effort and a failure only logs.
    pub fn mark_loaded(&self, order: &OrderId) -> Result<CompartmentId, ReservationError> {
        let compartment = self.reservations.mark_loaded(order)?;
        let led_on = ColumnCommand::SetOutput {
            compartment: compartment.index,
            output: OutputName::Led,
            on: true,
        };
        if let Err(e) = self.relay.command(&self.registry, &compartment.column, &led_on) {
            warn!(compartment = %compartment, error = %e, "loaded-LED relay failed");
        }
        Ok(compartment)
    }

    /// Validate a pickup code and unlock its compartment.
    ///
    /// The code is normalized before lookup. The local `Open`
    /// transition commits only after the unlock relay succeeds; a
    /// relay failure leaves the reservation untouched so the customer
    /// can retry.
    pub fn validate_and_unlock(&self, code: &str) -> Result<CompartmentId, ReservationError> {
        let (order, compartment) = self.reservations.validate_code(code)?;
        self.relay.command(
            &self.registry,
            &compartment.column,
            &ColumnCommand::Unlock {
                compartment: compartment.index,
            },
        )?;
        self.reservations.mark_open(&compartment);
        info!(order = %order, compartment = %compartment, "pickup unlock relayed");
        Ok(compartment)
    }

    /// Status, cached sensors and online flag for one compartment.
    pub fn get_compartment_status(
        &self,
        compartment: &CompartmentId,
    ) -> Result<CompartmentStatusView, ReservationError> {
        let (status, order) = self
            .reservations
            .status_of(compartment)
            .ok_or_else(|| ReservationError::CompartmentNotFound(compartment.clone()))?;
        Ok(CompartmentStatusView {
            status,
            order,
            sensors: self.registry.snapshot(compartment).map(|w| w.bits()),
            online: self
                .registry
                .is_online(&compartment.column)
                .unwrap_or(false),
        })
    }

    // ─── Maintenance commands ───────────────────────────────────────

    /// Relay a close command; the compartment shows `Closing` until the
    /// door-closed event resolves it.
    pub fn lock_compartment(&self, compartment: &CompartmentId) -> Result<(), ReservationError> {
        self.relay.command(
            &self.registry,
            &compartment.column,
            &ColumnCommand::Lock {
                compartment: compartment.index,
            },
        )?;
        self.reservations.mark_closing(compartment);
        Ok(())
    }

    /// Start a UV sanitize cycle on an available compartment.
    pub fn sanitize(
        &self,
        compartment: &CompartmentId,
        duration: Duration,
        now: Instant,
    ) -> Result<(), ReservationError> {
        // Check local state before touching hardware.
        match self.reservations.status_of(compartment) {
            None => {
                return Err(ReservationError::CompartmentNotFound(compartment.clone()));
            }
            Some((CompartmentStatus::Available, _)) => {}
            Some((status, _)) => {
                return Err(ReservationError::CompartmentUnavailable {
                    compartment: compartment.clone(),
                    status,
                });
            }
        }
        self.relay.command(
            &self.registry,
            &compartment.column,
            &ColumnCommand::Sanitize {
                compartment: compartment.index,
                duration_ms: duration.as_millis() as u64,
            },
        )?;
        self.reservations.start_sanitize(compartment, now + duration)?;
        Ok(())
    }

    /// Relay a direct output toggle (maintenance surface).
    pub fn set_output(
        &self,
        compartment: &CompartmentId,
        output: OutputName,
        on: bool,
    ) -> Result<(), ReservationError> {
        self.relay.command(
            &self.registry,
            &compartment.column,
            &ColumnCommand::SetOutput {
                compartment: compartment.index,
                output,
                on,
            },
        )?;
        Ok(())
    }

    /// Relay a bounded motor jog (maintenance surface).
    pub fn jog_motor(
        &self,
        compartment: &CompartmentId,
        steps: u16,
        direction: MotorDirection,
    ) -> Result<(), ReservationError> {
        self.relay.command(
            &self.registry,
            &compartment.column,
            &ColumnCommand::JogMotor {
                compartment: compartment.index,
                steps,
                direction,
            },
        )?;
        Ok(())
    }

    /// Operator fault clear: relay to the column, then release the
    /// coordinator-side `Fault` status.
    pub fn clear_fault(&self, compartment: &CompartmentId) -> Result<(), ReservationError> {
        self.relay.command(
            &self.registry,
            &compartment.column,
            &ColumnCommand::ClearFault {
                compartment: compartment.index,
            },
        )?;
        self.events.append(
            compartment.clone(),
            EventKind::FaultCleared,
            Some(serde_json::json!({ "source": "operator" })),
            Utc::now(),
        );
        self.reservations
            .handle_event(compartment, EventKind::FaultCleared);
        Ok(())
    }

    /// Fetch a full live snapshot from a column.
    pub fn column_status(&self, column: &ColumnId) -> Result<CommandOutcome, RelayError> {
        self.relay
            .command(&self.registry, column, &ColumnCommand::Status)
    }

    // ─── Read-only views ────────────────────────────────────────────

    pub fn columns(&self, now: Instant) -> Vec<ColumnView> {
        self.registry.columns(now)
    }

    pub fn compartments(&self) -> Vec<CompartmentView> {
        self.reservations.compartments()
    }

    pub fn event_log(&self) -> Vec<EventRecord> {
        self.events.records()
    }
}
