//! Transport layer for the backend RPC connection.
//!
//! This module provides transport abstractions for different connection types:
//!
//! - **Unix sockets**: For a node (or relay) on the same host
//! - **TCP**: For a node reachable over the network
//!
//! # Example
//!
//! ```rust,ignore
//! use nefs_bridge::transport::{TcpTransport, UnixTransport};
//!
//! let transport = UnixTransport::connect("/run/nefs.sock")?;
//! let transport = TcpTransport::connect("node1:4370", None)?;
//! ```

mod tcp;
mod traits;
mod unix;

pub use tcp::TcpTransport;
pub use traits::{is_timeout, Transport};
pub use unix::{UnixListener, UnixTransport};
