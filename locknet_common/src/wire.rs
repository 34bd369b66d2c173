//! JSON-line transport helpers with bounded timeouts.
//!
//! Every exchange is a single request line followed by a single response
//! line over a fresh TCP connection. There is no session state and no
//! retry at this layer; callers decide whether a failure matters.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use thiserror::Error;
use tracing::trace;

/// Error type for wire operations.
#[derive(Debug, Clone, Error)]
pub enum WireError {
    /// Connection or socket I/O failed.
    #[error("i/o error: {0}")]
    Io(String),

    /// The peer did not respond within the bounded timeout.
    #[error("timed out waiting for peer")]
    Timeout,

    /// The peer answered with something that does not parse.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The peer answered with an explicit refusal.
    #[error("rejected by peer: {0}")]
    Rejected(String),
}

impl From<std::io::Error> for WireError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => Self::Timeout,
            _ => Self::Io(e.to_string()),
        }
    }
}

/// Send one request and read one response, all within `timeout`.
///
/// Resolves `addr`, connects with `timeout`, applies the same bound to
/// the read and write halves, writes `req` as one JSON line and parses
/// the first response line.
pub fn request<Req, Resp>(addr: &str, req: &Req, timeout: Duration) -> Result<Resp, WireError>
where
    Req: Serialize,
    Resp: DeserializeOwned,
{
    let sock_addr = addr
        .to_socket_addrs()
        .map_err(|e| WireError::Io(format!("resolve {addr}: {e}")))?
        .next()
        .ok_or_else(|| WireError::Io(format!("no address for {addr}")))?;

    trace!(addr, "wire request");
    let mut stream = TcpStream::connect_timeout(&sock_addr, timeout)?;
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))?;

    write_line(&mut stream, req)?;
    read_line(&mut BufReader::new(stream))
}

/// Serialize `value` as a single newline-terminated JSON line.
pub fn write_line<W: Write, T: Serialize>(writer: &mut W, value: &T) -> Result<(), WireError> {
    let mut line =
        serde_json::to_vec(value).map_err(|e| WireError::Protocol(e.to_string()))?;
    line.push(b'\n');
    writer.write_all(&line)?;
    writer.flush()?;
    Ok(())
}

/// Read and parse one JSON line.
pub fn read_line<R: BufRead, T: DeserializeOwned>(reader: &mut R) -> Result<T, WireError> {
    let mut line = String::new();
    let n = reader.read_line(&mut line)?;
    if n == 0 {
        return Err(WireError::Io("connection closed".into()));
    }
    serde_json::from_str(line.trim_end()).map_err(|e| WireError::Protocol(e.to_string()))
}
