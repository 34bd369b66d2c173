//! Command relay to column controllers.
//!
//! A relay call is a single bounded-timeout synchronous request. A
//! column the registry reports offline is rejected immediately with
//! `ColumnOffline`, without any network I/O. There is no queue for
//! offline columns and no automatic retry; callers retry at the
//! application layer.

use crate::registry::ColumnRegistry;
use locknet::consts::RELAY_TIMEOUT;
use locknet::hw::ColumnId;
use locknet::protocol::{ColumnCommand, CommandOutcome};
use locknet::wire::{self, WireError};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Relay-layer errors.
#[derive(Debug, Clone, Error)]
pub enum RelayError {
    /// The column has never announced.
    #[error("unknown column: {0}")]
    ColumnUnknown(ColumnId),

    /// The column is known but currently offline; nothing was sent.
    #[error("column offline: {0}")]
    ColumnOffline(ColumnId),

    /// The network round-trip failed or timed out.
    #[error("communication failure: {0}")]
    Communication(String),

    /// The column executed the request and refused it.
    #[error("rejected by column: {0}")]
    Rejected(String),
}

/// Transport seam for coordinator → column requests.
///
/// The production impl speaks JSON lines over TCP; tests substitute a
/// scripted fake to observe (or forbid) traffic.
pub trait ColumnTransport: Send + Sync {
    fn send(&self, address: &str, cmd: &ColumnCommand) -> Result<CommandOutcome, RelayError>;
}

impl<T: ColumnTransport + ?Sized> ColumnTransport for Box<T> {
    fn send(&self, address: &str, cmd: &ColumnCommand) -> Result<CommandOutcome, RelayError> {
        (**self).send(address, cmd)
    }
}

/// JSON-line TCP transport with a bounded round-trip timeout.
pub struct TcpColumnTransport {
    timeout: Duration,
}

impl TcpColumnTransport {
    pub fn new() -> Self {
        Self {
            timeout: RELAY_TIMEOUT,
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for TcpColumnTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ColumnTransport for TcpColumnTransport {
    fn send(&self, address: &str, cmd: &ColumnCommand) -> Result<CommandOutcome, RelayError> {
        wire::request(address, cmd, self.timeout).map_err(|e| match e {
            WireError::Rejected(r) => RelayError::Rejected(r),
            other => RelayError::Communication(other.to_string()),
        })
    }
}

/// Registry-gated command relay.
pub struct CommandRelay<T: ColumnTransport> {
    transport: T,
}

impl<T: ColumnTransport> CommandRelay<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Relay `cmd` to `column`, checking the online flag first.
    ///
    /// A column-side refusal surfaces as `RelayError::Rejected`; a
    /// status response passes through untouched.
    pub fn command(
        &self,
        registry: &ColumnRegistry,
        column: &ColumnId,
        cmd: &ColumnCommand,
    ) -> Result<CommandOutcome, RelayError> {
        match registry.is_online(column) {
            None => return Err(RelayError::ColumnUnknown(column.clone())),
            Some(false) => return Err(RelayError::ColumnOffline(column.clone())),
            Some(true) => {}
        }
        let address = registry
            .address_of(column)
            .ok_or_else(|| RelayError::ColumnUnknown(column.clone()))?;

        debug!(column = %column, ?cmd, "relaying command");
        let outcome = self.transport.send(&address, cmd)?;
        match outcome {
            CommandOutcome::Rejected { reason } => {
                warn!(column = %column, reason, "command rejected by column");
                Err(RelayError::Rejected(reason))
            }
            other => Ok(other),
        }
    }
}
