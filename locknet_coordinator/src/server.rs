//! Inbound message endpoint and periodic sweep.
//!
//! A single-consumer accept loop: connections are serviced one at a
//! time (announce/heartbeat/event traffic is short and sparse), and the
//! staleness/sanitize sweep runs between accepts on its own interval —
//! independent of any individual request.

use crate::coordinator::Coordinator;
use locknet::consts::{SEND_TIMEOUT, SWEEP_INTERVAL};
use locknet::protocol::InboundMessage;
use locknet::wire;
use std::io::BufReader;
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Inbound TCP endpoint for column traffic.
pub struct InboundServer {
    listener: TcpListener,
}

impl InboundServer {
    pub fn bind(addr: &str) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        info!(addr = %listener.local_addr()?, "inbound endpoint listening");
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until `running` clears, sweeping every `SWEEP_INTERVAL`.
    pub fn run(&self, coordinator: &Coordinator, running: &Arc<AtomicBool>) {
        let mut last_sweep = Instant::now();
        while running.load(Ordering::SeqCst) {
            match self.listener.accept() {
                Ok((stream, _)) => handle_connection(stream, coordinator),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(Duration::from_millis(10));
                }
                Err(e) => warn!(error = %e, "accept failed"),
            }

            let now = Instant::now();
            if now.saturating_duration_since(last_sweep) >= SWEEP_INTERVAL {
                coordinator.sweep(now);
                last_sweep = now;
            }
        }
        info!("inbound endpoint stopped");
    }
}

/// One request line, one ack line, close.
fn handle_connection(stream: TcpStream, coordinator: &Coordinator) {
    if stream.set_nonblocking(false).is_err()
        || stream.set_read_timeout(Some(SEND_TIMEOUT)).is_err()
        || stream.set_write_timeout(Some(SEND_TIMEOUT)).is_err()
    {
        return;
    }

    let mut reader = BufReader::new(stream);
    let message: InboundMessage = match wire::read_line(&mut reader) {
        Ok(msg) => msg,
        Err(e) => {
            debug!(error = %e, "malformed inbound message");
            return;
        }
    };

    let ack = coordinator.handle_message(&message, Instant::now());
    let mut stream = reader.into_inner();
    if let Err(e) = wire::write_line(&mut stream, &ack) {
        debug!(error = %e, "failed to write ack");
    }
}
