use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "nefs", version, about = "Mount a nefs backend node as a read-only filesystem")]
pub struct Cli {
    #[command(flatten)]
    pub conn: ConnectArgs,

    #[command(subcommand)]
    pub cmd: Commands,
}

/// How to reach the backend node. Exactly one of `--socket` / `--addr`.
#[derive(Args, Debug, Clone)]
pub struct ConnectArgs {
    /// Unix socket of the backend node (or a local relay)
    #[arg(long, global = true, env = "NEFS_SOCKET", conflicts_with = "addr")]
    pub socket: Option<PathBuf>,

    /// TCP address of the backend node, HOST:PORT
    #[arg(long, global = true, env = "NEFS_ADDR")]
    pub addr: Option<String>,

    /// Registered name of the filesystem server on the node
    #[arg(long, global = true, env = "NEFS_SERVER", default_value = "nefs")]
    pub server: String,

    /// Per-call deadline in seconds (0 = wait forever)
    #[arg(long, global = true, env = "NEFS_TIMEOUT_SECS", default_value_t = 30)]
    pub timeout_secs: u64,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Mount the backend at MOUNTPOINT (blocks until unmounted)
    Mount(MountArgs),
    /// Check that the backend node answers
    Ping,
    /// Show attributes of a backend path
    Stat(PathArgs),
    /// List a backend directory
    Ls(PathArgs),
    /// Print a backend file to stdout
    Cat(PathArgs),
}

#[derive(Args, Debug)]
pub struct MountArgs {
    /// Directory to mount on
    pub mountpoint: PathBuf,

    /// Allow other users to access the mount (needs user_allow_other in /etc/fuse.conf)
    #[arg(long)]
    pub allow_other: bool,

    /// Unmount automatically when the process exits
    #[arg(long)]
    pub auto_unmount: bool,

    /// Filesystem name shown in the mount table
    #[arg(long, default_value = "nefs")]
    pub fsname: String,

    /// Sample every Nth backend call for a latency summary at unmount (0 = off)
    #[arg(long, default_value_t = 0)]
    pub trace_rate: u64,
}

#[derive(Args, Debug)]
pub struct PathArgs {
    /// Absolute path on the backend
    #[arg(default_value = "/")]
    pub path: String,

    /// Output JSON
    #[arg(long)]
    pub json: bool,
}
