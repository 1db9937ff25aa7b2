//! Transport trait definitions.
//!
//! Transports provide the byte stream the RPC session runs over. The
//! session owns exactly one and guards it with a lock, so implementations
//! need `Send` but not `Sync`.

use std::io;
use std::time::Duration;

/// A synchronous byte-stream transport to the backend node.
pub trait Transport: Send {
    /// Read raw bytes from the transport.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write some bytes to the transport, returning how many were accepted.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Flush any buffered data.
    fn flush(&mut self) -> io::Result<()>;

    /// Set read timeout. `None` blocks indefinitely.
    fn set_read_timeout(&mut self, dur: Option<Duration>) -> io::Result<()>;

    /// Set write timeout. `None` blocks indefinitely.
    fn set_write_timeout(&mut self, dur: Option<Duration>) -> io::Result<()>;

    /// Human-readable peer description for logs.
    fn peer(&self) -> String;
}

/// Whether an I/O error is a timeout reported by a socket with a deadline set.
pub fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}
