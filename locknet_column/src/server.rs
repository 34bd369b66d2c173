//! Synchronous command endpoint.
//!
//! Accepts one JSON-line command request at a time, executes the
//! corresponding state-machine operation and returns its result. No
//! request queueing, no concurrent sessions: the control loop polls for
//! at most one request per cycle.

use crate::bus::{BusIo, ShiftRegisterBus};
use crate::motion::Compartment;
use locknet::consts::SEND_TIMEOUT;
use locknet::protocol::{ColumnCommand, CommandOutcome};
use locknet::wire;
use std::io::BufReader;
use std::net::{TcpListener, TcpStream};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Execute one command against the compartment state machines.
///
/// Every refusal maps to `CommandOutcome::Rejected` with the error's
/// display text as the reason; the caller sees success or a specific
/// error kind, never a partial result.
pub fn execute<B: BusIo>(
    cmd: &ColumnCommand,
    compartments: &mut [Compartment],
    bus: &mut ShiftRegisterBus<B>,
    now: Instant,
) -> CommandOutcome {
    let result = match cmd {
        ColumnCommand::Unlock { compartment } => {
            with_compartment(compartments, *compartment, |c| c.unlock(bus, now))
        }
        ColumnCommand::Lock { compartment } => {
            with_compartment(compartments, *compartment, |c| c.lock(bus, now))
        }
        ColumnCommand::SetOutput { compartment, output, on } => {
            with_compartment(compartments, *compartment, |c| {
                c.set_output(bus, *output, *on);
                Ok(())
            })
        }
        ColumnCommand::JogMotor { compartment, steps, direction } => {
            with_compartment(compartments, *compartment, |c| {
                c.jog(bus, *steps, *direction)
            })
        }
        ColumnCommand::Sanitize { compartment, duration_ms } => {
            with_compartment(compartments, *compartment, |c| {
                c.start_sanitize(bus, now, Duration::from_millis(*duration_ms))
            })
        }
        ColumnCommand::ClearFault { compartment } => {
            with_compartment(compartments, *compartment, |c| c.clear_fault(bus))
        }
        ColumnCommand::Status => {
            return CommandOutcome::Status {
                compartments: compartments.iter().map(Compartment::report).collect(),
            };
        }
    };

    match result {
        Ok(()) => CommandOutcome::Ok,
        Err(reason) => CommandOutcome::Rejected { reason },
    }
}

fn with_compartment<F>(
    compartments: &mut [Compartment],
    index: u8,
    op: F,
) -> Result<(), String>
where
    F: FnOnce(&mut Compartment) -> Result<(), crate::motion::MotionError>,
{
    match compartments.get_mut(index as usize) {
        Some(c) => op(c).map_err(|e| e.to_string()),
        None => Err(format!("no such compartment: {index}")),
    }
}

/// One accepted, not-yet-answered command request.
pub struct PendingRequest {
    pub command: ColumnCommand,
    stream: TcpStream,
}

impl PendingRequest {
    /// Write the outcome line and close the connection.
    pub fn respond(mut self, outcome: &CommandOutcome) {
        if let Err(e) = wire::write_line(&mut self.stream, outcome) {
            warn!(error = %e, "failed to write command response");
        }
    }
}

/// Non-blocking single-session command listener.
pub struct CommandEndpoint {
    listener: TcpListener,
}

impl CommandEndpoint {
    /// Bind the endpoint; the listener is placed in non-blocking mode
    /// so the control loop can poll it once per cycle.
    pub fn bind(addr: &str) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        info!(addr = %listener.local_addr()?, "command endpoint listening");
        Ok(Self { listener })
    }

    /// Address the endpoint is actually bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept and parse at most one request. Returns `None` when no
    /// client is waiting or the request is malformed (the client gets
    /// an immediate rejection line in that case).
    pub fn poll(&mut self) -> Option<PendingRequest> {
        let (stream, peer) = match self.listener.accept() {
            Ok(conn) => conn,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return None,
            Err(e) => {
                warn!(error = %e, "accept failed");
                return None;
            }
        };

        // The connection itself is serviced synchronously with a bound.
        if stream.set_nonblocking(false).is_err()
            || stream.set_read_timeout(Some(SEND_TIMEOUT)).is_err()
            || stream.set_write_timeout(Some(SEND_TIMEOUT)).is_err()
        {
            return None;
        }

        let mut reader = BufReader::new(stream);
        match wire::read_line::<_, ColumnCommand>(&mut reader) {
            Ok(command) => {
                debug!(%peer, ?command, "command received");
                Some(PendingRequest {
                    command,
                    stream: reader.into_inner(),
                })
            }
            Err(e) => {
                debug!(%peer, error = %e, "malformed command request");
                let mut stream = reader.into_inner();
                let _ = wire::write_line(
                    &mut stream,
                    &CommandOutcome::Rejected { reason: format!("bad request: {e}") },
                );
                None
            }
        }
    }
}
