//! Shared helpers for commands that talk to the backend without mounting.

use anyhow::{bail, Result};
use nefs_bridge::{NodeFs, RpcSession};
use tracing::debug;

use crate::cli::ConnectArgs;

/// Connect, ping, and wrap the session in the filesystem handlers.
pub fn connect(conn: &ConnectArgs) -> Result<NodeFs<RpcSession>> {
    let endpoint = conn.endpoint()?;
    debug!(target: "nefs::cli", %endpoint, server = %conn.server, "connecting");
    let session = endpoint.connect(conn.session_config())?;
    Ok(NodeFs::with_server(session, conn.server.clone()))
}

/// Backend paths are absolute with no trailing slash (except the root).
pub fn normalize_path(path: &str) -> Result<String> {
    if !path.starts_with('/') {
        bail!("path must be absolute: {}", path);
    }
    let trimmed = path.trim_end_matches('/');
    Ok(if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    })
}
