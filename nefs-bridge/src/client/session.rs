//! RPC session to the backend node.
//!
//! The protocol carries no request ids, so replies are paired with requests
//! purely by order. One lock therefore guards the whole exchange: a caller
//! holds it from the first byte of its request until the last byte of its
//! reply, and concurrent FUSE requests queue behind it.
//!
//! ```text
//! caller A ──┐
//! caller B ──┼── Mutex<Transport> ── write frame ── read frame ── backend
//! caller C ──┘
//! ```

use crate::protocol::{
    decode, payload_len, unwrap_reply, DecodeError, RemoteCall, Term,
};
use crate::telemetry::CallCollector;
use crate::transport::{is_timeout, TcpTransport, Transport, UnixTransport};
use std::io;
use std::net::ToSocketAddrs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Default deadline for a single call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that make a call fail at the connection level.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    #[error("session closed after an earlier connection failure")]
    Closed,

    #[error("cannot encode request: {0}")]
    Encode(#[source] io::Error),

    #[error("malformed reply: {0}")]
    Decode(#[from] DecodeError),

    #[error("reply is not a {{rex, Reply}} envelope: {0}")]
    UnexpectedReply(Term),
}

/// Configuration for an RPC session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Deadline for one call (request write plus reply read). `None` waits forever.
    pub call_timeout: Option<Duration>,
    /// Sample every Nth call for telemetry (0 = disabled).
    pub trace_rate: u64,
    /// Collector receiving sampled calls.
    pub collector: Option<CallCollector>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            call_timeout: Some(DEFAULT_CALL_TIMEOUT),
            trace_rate: 0,
            collector: None,
        }
    }
}

impl SessionConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-call deadline.
    pub fn call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Set trace rate for telemetry.
    pub fn trace_rate(mut self, rate: u64) -> Self {
        self.trace_rate = rate;
        self
    }

    /// Set call collector for telemetry.
    pub fn collector(mut self, collector: CallCollector) -> Self {
        self.collector = Some(collector);
        self
    }
}

/// The blocking call primitive the filesystem handlers are written against.
pub trait Rpc: Send + Sync {
    /// Issue `call` and wait for the unwrapped reply term.
    fn call(&self, call: &RemoteCall) -> Result<Term, SessionError>;
}

impl<T: Rpc + ?Sized> Rpc for Arc<T> {
    fn call(&self, call: &RemoteCall) -> Result<Term, SessionError> {
        (**self).call(call)
    }
}

impl<T: Rpc + ?Sized> Rpc for &T {
    fn call(&self, call: &RemoteCall) -> Result<Term, SessionError> {
        (**self).call(call)
    }
}

/// The single connection to a backend node.
pub struct RpcSession {
    transport: Mutex<Box<dyn Transport>>,
    peer: String,
    /// Set once the stream position is unknown; never cleared.
    broken: AtomicBool,
    next_id: AtomicU64,
    config: SessionConfig,
}

impl std::fmt::Debug for RpcSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcSession")
            .field("peer", &self.peer)
            .field("broken", &self.broken)
            .field("next_id", &self.next_id)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RpcSession {
    /// Wrap an established transport.
    pub fn new(transport: Box<dyn Transport>, config: SessionConfig) -> Self {
        let peer = transport.peer();
        Self {
            transport: Mutex::new(transport),
            peer,
            broken: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
            config,
        }
    }

    /// Connect over a Unix socket.
    pub fn connect_unix<P: AsRef<Path>>(path: P, config: SessionConfig) -> io::Result<Self> {
        let transport = UnixTransport::connect(path)?;
        Ok(Self::new(Box::new(transport), config))
    }

    /// Connect over TCP. The call timeout doubles as the connect timeout.
    pub fn connect_tcp<A: ToSocketAddrs>(addr: A, config: SessionConfig) -> io::Result<Self> {
        let transport = TcpTransport::connect(addr, config.call_timeout)?;
        Ok(Self::new(Box::new(transport), config))
    }

    /// Liveness check issued once after connecting: `io:format([ping])`.
    pub fn ping(&self) -> Result<(), SessionError> {
        let reply = self.call(&RemoteCall::new("io", "format", vec![Term::atom("ping")]))?;
        if reply.is_atom("ok") {
            info!(target: "nefs::session", peer = %self.peer, "connected");
        } else {
            warn!(target: "nefs::session", peer = %self.peer, %reply, "unexpected ping reply");
        }
        Ok(())
    }

    /// Peer description (`unix:/path` or `tcp:host:port`).
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// True once a connection failure has closed the session.
    pub fn is_broken(&self) -> bool {
        self.broken.load(Ordering::Acquire)
    }

    /// Get the call collector, if one was configured.
    pub fn collector(&self) -> Option<&CallCollector> {
        self.config.collector.as_ref()
    }

    /// Write one request frame and read one reply frame.
    fn exchange(&self, transport: &mut dyn Transport, frame: &[u8]) -> Result<Vec<u8>, SessionError> {
        let timeout = self.config.call_timeout;
        let deadline = timeout.map(|t| Instant::now() + t);

        write_all_by(transport, frame, deadline, timeout)?;

        let mut header = [0u8; 4];
        read_exact_by(transport, &mut header, deadline, timeout)?;
        let mut payload = vec![0u8; payload_len(header)?];
        read_exact_by(transport, &mut payload, deadline, timeout)?;
        Ok(payload)
    }
}

/// Time left before `deadline`, or `None` when the call is unbounded.
fn remaining(deadline: Option<Instant>, timeout: Option<Duration>) -> Result<Option<Duration>, SessionError> {
    match deadline {
        Some(deadline) => {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return Err(SessionError::Timeout(timeout.unwrap_or_default()));
            }
            Ok(Some(left))
        }
        None => Ok(None),
    }
}

/// `write_all` bounded by the same absolute deadline as the reply read.
fn write_all_by(
    transport: &mut dyn Transport,
    buf: &[u8],
    deadline: Option<Instant>,
    timeout: Option<Duration>,
) -> Result<(), SessionError> {
    let mut written = 0;
    while written < buf.len() {
        transport.set_write_timeout(remaining(deadline, timeout)?)?;
        match transport.write(&buf[written..]) {
            Ok(0) => {
                return Err(SessionError::Io(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "backend stopped accepting data",
                )))
            }
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) if is_timeout(&e) && deadline.is_some() => {
                return Err(SessionError::Timeout(timeout.unwrap_or_default()))
            }
            Err(e) => return Err(e.into()),
        }
    }
    transport.flush()?;
    Ok(())
}

/// `read_exact` bounded by an absolute deadline rather than a per-read timeout.
fn read_exact_by(
    transport: &mut dyn Transport,
    buf: &mut [u8],
    deadline: Option<Instant>,
    timeout: Option<Duration>,
) -> Result<(), SessionError> {
    let timed_out = || SessionError::Timeout(timeout.unwrap_or_default());
    let mut filled = 0;
    while filled < buf.len() {
        transport.set_read_timeout(remaining(deadline, timeout)?)?;
        match transport.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(SessionError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "backend closed the connection",
                )))
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) if is_timeout(&e) && deadline.is_some() => return Err(timed_out()),
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

impl Rpc for RpcSession {
    fn call(&self, call: &RemoteCall) -> Result<Term, SessionError> {
        let unique = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = call.encode().map_err(SessionError::Encode)?;
        debug!(target: "nefs::session", unique, op = call.label(), len = frame.len(), "call");

        let queued = Instant::now();
        let (payload, wait, wire) = {
            let mut transport = self.transport.lock().unwrap_or_else(|e| e.into_inner());
            let wait = queued.elapsed();
            if self.is_broken() {
                return Err(SessionError::Closed);
            }

            let started = Instant::now();
            match self.exchange(transport.as_mut(), &frame) {
                Ok(payload) => (payload, wait, started.elapsed()),
                Err(e) => {
                    // A partial write or a late reply would desynchronise the
                    // stream for the next caller.
                    self.broken.store(true, Ordering::Release);
                    warn!(
                        target: "nefs::session",
                        unique,
                        op = call.label(),
                        peer = %self.peer,
                        error = %e,
                        "connection lost, closing session"
                    );
                    return Err(e);
                }
            }
        };

        let should_trace = self.config.trace_rate > 0 && unique % self.config.trace_rate == 0;
        if should_trace {
            if let Some(collector) = &self.config.collector {
                collector.record(unique, call.label(), wait, wire);
            }
        }

        let reply = unwrap_reply(decode(&payload)?).map_err(SessionError::UnexpectedReply)?;
        trace!(
            target: "nefs::session",
            unique,
            op = call.label(),
            elapsed_us = (wait + wire).as_micros() as u64,
            %reply,
            "reply"
        );
        Ok(reply)
    }
}
