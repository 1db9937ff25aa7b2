//! Unix socket transport implementation.

use super::Transport;
use std::io::{self, Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A Unix socket transport.
///
/// Used when the backend node (or a local relay in front of it) listens on
/// a filesystem socket.
#[derive(Debug)]
pub struct UnixTransport {
    stream: UnixStream,
    path: Option<PathBuf>,
}

impl UnixTransport {
    /// Connect to a Unix socket at the given path.
    pub fn connect<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let stream = UnixStream::connect(path.as_ref())?;
        Ok(Self {
            stream,
            path: Some(path.as_ref().to_path_buf()),
        })
    }

    /// Create a transport from an existing UnixStream.
    pub fn from_stream(stream: UnixStream) -> Self {
        Self { stream, path: None }
    }

    /// Get a reference to the underlying stream.
    pub fn get_ref(&self) -> &UnixStream {
        &self.stream
    }
}

impl Transport for UnixTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }

    fn set_read_timeout(&mut self, dur: Option<Duration>) -> io::Result<()> {
        self.stream.set_read_timeout(dur)
    }

    fn set_write_timeout(&mut self, dur: Option<Duration>) -> io::Result<()> {
        self.stream.set_write_timeout(dur)
    }

    fn peer(&self) -> String {
        match &self.path {
            Some(path) => format!("unix:{}", path.display()),
            None => "unix:<unnamed>".to_string(),
        }
    }
}

impl AsRawFd for UnixTransport {
    fn as_raw_fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }
}

/// A Unix socket listener for accepting connections.
///
/// The bridge itself only connects; the listener serves test doubles and
/// local relays.
pub struct UnixListener {
    listener: std::os::unix::net::UnixListener,
}

impl UnixListener {
    /// Bind to a Unix socket path.
    pub fn bind<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        // Remove existing socket file if present
        let _ = std::fs::remove_file(path.as_ref());
        let listener = std::os::unix::net::UnixListener::bind(path)?;
        Ok(Self { listener })
    }

    /// Accept a new connection.
    pub fn accept(&self) -> io::Result<UnixStream> {
        let (stream, _) = self.listener.accept()?;
        Ok(stream)
    }
}
