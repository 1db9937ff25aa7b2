//! Bridge client: one backend session shared by every FUSE request.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────┐
//! │ kernel (FUSE requests)   │
//! └────────────┬─────────────┘
//!              │
//!       ┌──────┴──────┐
//!       │ FuseClient  │  inode/handle tables
//!       └──────┬──────┘
//!              │
//!       ┌──────┴──────┐
//!       │   NodeFs    │  get_attr, read_dir, open, read
//!       └──────┬──────┘
//!              │
//!       ┌──────┴──────┐
//!       │ RpcSession  │  one connection, one call at a time
//!       └──────┬──────┘
//!              │
//!       ┌──────┴──────┐
//!       │ backend node│
//!       └─────────────┘
//! ```
//!
//! # Feature
//!
//! `FuseClient` and the mount functions require the `fuse-client` feature
//! (enabled by default). The session and handlers are always available.

#[cfg(feature = "fuse-client")]
mod fuse;
#[cfg(feature = "fuse-client")]
mod mount;
mod ops;
mod session;
mod tables;

#[cfg(feature = "fuse-client")]
pub use fuse::FuseClient;
#[cfg(feature = "fuse-client")]
pub use mount::{mount, mount_spawn, mount_with, spawn_with, Endpoint, MountConfig, MountHandle};
pub use ops::{FileHandle, FsError, NodeAttr, NodeFs, NodeKind};
pub use session::{Rpc, RpcSession, SessionConfig, SessionError, DEFAULT_CALL_TIMEOUT};
pub use tables::{HandleTable, InodeTable, ROOT_INO};
