//! FUSE mount entry points.
//!
//! A mount owns exactly one backend session. The session is connected and
//! pinged before the kernel mount is attempted, so an unreachable node fails
//! startup instead of producing a filesystem where every call is `EIO`.

use super::fuse::FuseClient;
use super::ops::NodeFs;
use super::session::{Rpc, RpcSession, SessionConfig};
use crate::protocol::DEFAULT_SERVER;
use anyhow::Context;
use fuser::{MountOption, SessionUnmounter};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info};

/// Where the backend node listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Unix(PathBuf),
    /// `host:port`
    Tcp(String),
}

impl Endpoint {
    /// Open a session and run the startup ping.
    pub fn connect(&self, config: SessionConfig) -> anyhow::Result<RpcSession> {
        let session = match self {
            Endpoint::Unix(path) => RpcSession::connect_unix(path, config),
            Endpoint::Tcp(addr) => RpcSession::connect_tcp(addr.as_str(), config),
        }
        .with_context(|| format!("connecting to {}", self))?;

        session
            .ping()
            .with_context(|| format!("ping to {} failed", self))?;
        Ok(session)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Unix(path) => write!(f, "unix:{}", path.display()),
            Endpoint::Tcp(addr) => write!(f, "tcp:{}", addr),
        }
    }
}

/// Configuration for a FUSE mount.
#[derive(Debug, Clone)]
pub struct MountConfig {
    /// Registered name of the backend server process.
    pub server: String,
    /// Filesystem name shown in the mount table.
    pub fsname: String,
    pub allow_other: bool,
    pub auto_unmount: bool,
    pub session: SessionConfig,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            fsname: "nefs".to_string(),
            allow_other: false,
            auto_unmount: false,
            session: SessionConfig::default(),
        }
    }
}

impl MountConfig {
    /// Create a new mount config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn server(mut self, server: impl Into<String>) -> Self {
        self.server = server.into();
        self
    }

    pub fn fsname(mut self, fsname: impl Into<String>) -> Self {
        self.fsname = fsname.into();
        self
    }

    pub fn allow_other(mut self, allow: bool) -> Self {
        self.allow_other = allow;
        self
    }

    pub fn auto_unmount(mut self, auto: bool) -> Self {
        self.auto_unmount = auto;
        self
    }

    pub fn session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    fn options(&self) -> Vec<MountOption> {
        let mut options = vec![
            MountOption::FSName(self.fsname.clone()),
            MountOption::Subtype("nefs".to_string()),
            MountOption::RO,
            MountOption::NoSuid,
            MountOption::NoDev,
        ];
        if self.allow_other {
            options.push(MountOption::AllowOther);
        }
        if self.auto_unmount {
            options.push(MountOption::AutoUnmount);
        }
        options
    }
}

/// Handle for a spawned FUSE mount.
///
/// Created by [`mount_spawn`]. Automatically unmounts when dropped.
/// Use [`MountHandle::join`] to wait for an external unmount instead.
pub struct MountHandle {
    thread: Option<JoinHandle<anyhow::Result<()>>>,
    unmounter: Option<SessionUnmounter>,
}

impl Drop for MountHandle {
    fn drop(&mut self) {
        // Unmount first so session.run() returns, then reap the thread
        if let Some(mut unmounter) = self.unmounter.take() {
            debug!(target: "nefs::mount", "unmounting");
            let _ = unmounter.unmount();
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl MountHandle {
    /// Wait for an external unmount (e.g. `fusermount3 -u`) without triggering one.
    pub fn join(mut self) -> anyhow::Result<()> {
        self.unmounter.take();
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| anyhow::anyhow!("mount thread panicked"))?,
            None => Ok(()),
        }
    }
}

/// Connect to `endpoint` and mount at `mount_point`.
///
/// **Blocks** until the filesystem is unmounted. For programmatic unmount
/// control, use [`mount_spawn`] instead.
///
/// ```ignore
/// use nefs_bridge::{mount, Endpoint, MountConfig};
///
/// mount(&Endpoint::Unix("/run/nefs.sock".into()), "/mnt/nefs", MountConfig::new())?;
/// ```
pub fn mount<P: AsRef<Path>>(
    endpoint: &Endpoint,
    mount_point: P,
    config: MountConfig,
) -> anyhow::Result<()> {
    let session = endpoint.connect(config.session.clone())?;
    mount_with(session, mount_point, &config, None)
}

/// Like [`mount`], but runs the session in a thread and returns a handle.
/// The filesystem is unmounted when the handle is dropped.
pub fn mount_spawn<P: AsRef<Path> + Send + 'static>(
    endpoint: &Endpoint,
    mount_point: P,
    config: MountConfig,
) -> anyhow::Result<MountHandle> {
    let session = endpoint.connect(config.session.clone())?;
    spawn_with(session, mount_point, config)
}

/// Mount over an already-established RPC channel (spawned).
pub fn spawn_with<R, P>(rpc: R, mount_point: P, config: MountConfig) -> anyhow::Result<MountHandle>
where
    R: Rpc + 'static,
    P: AsRef<Path> + Send + 'static,
{
    let (tx, rx) = std::sync::mpsc::channel();
    let thread = thread::spawn(move || mount_with(rpc, mount_point, &config, Some(tx)));

    match rx.recv() {
        Ok(unmounter) => Ok(MountHandle {
            thread: Some(thread),
            unmounter: Some(unmounter),
        }),
        // The thread exits without sending only when mounting failed
        Err(_) => match thread.join() {
            Ok(Err(e)) => Err(e),
            _ => Err(anyhow::anyhow!("mount thread failed before sending unmounter")),
        },
    }
}

/// Mount over an already-established RPC channel (blocking).
pub fn mount_with<R: Rpc, P: AsRef<Path>>(
    rpc: R,
    mount_point: P,
    config: &MountConfig,
    unmounter_tx: Option<std::sync::mpsc::Sender<SessionUnmounter>>,
) -> anyhow::Result<()> {
    let mount_point = mount_point.as_ref();
    let destroyed = Arc::new(AtomicBool::new(false));
    // SAFETY: getuid/getgid cannot fail
    let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };
    let fs = FuseClient::with_destroyed_flag(
        NodeFs::with_server(rpc, config.server.clone()),
        Arc::clone(&destroyed),
    )
    .owner(uid, gid);

    let options = config.options();
    debug!(target: "nefs::mount", ?options, "using mount options");
    let mut session = fuser::Session::new(fs, mount_point, &options)
        .with_context(|| format!("mounting at {}", mount_point.display()))?;
    info!(target: "nefs::mount", mount_point = %mount_point.display(), server = %config.server, "mounted");

    // Send unmounter before blocking on run()
    if let Some(tx) = unmounter_tx {
        let _ = tx.send(session.unmount_callable());
    }

    let run_result = session.run();
    // Dropping the session calls destroy() if FUSE_DESTROY never arrived
    drop(session);

    if let Err(e) = run_result {
        if destroyed.load(Ordering::SeqCst) {
            debug!(target: "nefs::mount", error = %e, "session exited after destroy");
        } else {
            error!(target: "nefs::mount", error = %e, "FUSE session failed");
            return Err(e).context("FUSE session failed");
        }
    }
    info!(target: "nefs::mount", mount_point = %mount_point.display(), "Finished");
    Ok(())
}
