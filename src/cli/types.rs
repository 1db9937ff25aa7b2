use super::args::ConnectArgs;
use anyhow::{bail, Result};
use nefs_bridge::{Endpoint, SessionConfig};
use std::time::Duration;

impl ConnectArgs {
    pub fn endpoint(&self) -> Result<Endpoint> {
        match (&self.socket, &self.addr) {
            (Some(path), None) => Ok(Endpoint::Unix(path.clone())),
            (None, Some(addr)) => Ok(Endpoint::Tcp(addr.clone())),
            (Some(_), Some(_)) => bail!("--socket and --addr are mutually exclusive"),
            (None, None) => bail!("no backend given: pass --socket or --addr (or set NEFS_SOCKET / NEFS_ADDR)"),
        }
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        match self.timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::new().call_timeout(self.call_timeout())
    }
}
