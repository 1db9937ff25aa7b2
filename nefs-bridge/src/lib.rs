//! FUSE bridge to a nefs backend node.
//!
//! `nefs-bridge` exposes the files served by a remote backend node as a
//! read-only filesystem. Kernel requests become synchronous RPC calls on a
//! single session; replies are pattern-matched back into attributes,
//! directory listings and file data.
//!
//! - **Protocol**: term representation, external term format codec, framing
//! - **Matcher**: classifies replies against expected tuple shapes
//! - **Transport**: Unix socket and TCP transports
//! - **Client**: RPC session, filesystem handlers, `fuser` adapter, mount
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use nefs_bridge::{mount, Endpoint, MountConfig};
//!
//! // Blocks until the filesystem is unmounted
//! mount(&Endpoint::Tcp("node1:4370".into()), "/mnt/nefs", MountConfig::new())?;
//! ```
//!
//! # Features
//!
//! - `fuse-client` (default): Enable FUSE mount support via `fuser`

pub mod client;
pub mod matcher;
pub mod protocol;
pub mod telemetry;
pub mod transport;

// Re-export the common types at crate root for convenience
#[cfg(feature = "fuse-client")]
pub use client::{mount, mount_spawn, Endpoint, FuseClient, MountConfig, MountHandle};
pub use client::{
    FileHandle, FsError, NodeAttr, NodeFs, NodeKind, Rpc, RpcSession, SessionConfig, SessionError,
};
pub use matcher::{match_any, Bindings, MatchError, Pattern, Var};
pub use protocol::{
    decode, encode, read_message, write_message, Atom, DecodeError, EncodeError, Pid, RemoteCall,
    Term, TermKind, MAX_MESSAGE_SIZE,
};
pub use telemetry::CallCollector;
