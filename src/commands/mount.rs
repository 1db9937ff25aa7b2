use anyhow::{Context, Result};
use nefs_bridge::{CallCollector, MountConfig};
use tracing::info;

use crate::cli::{ConnectArgs, MountArgs};

pub fn cmd_mount(conn: &ConnectArgs, args: MountArgs) -> Result<()> {
    let endpoint = conn.endpoint()?;
    std::fs::metadata(&args.mountpoint)
        .with_context(|| format!("mountpoint {}", args.mountpoint.display()))?;

    let collector = (args.trace_rate > 0).then(CallCollector::new);
    let mut session = conn.session_config().trace_rate(args.trace_rate);
    if let Some(collector) = &collector {
        session = session.collector(collector.clone());
    }

    let config = MountConfig::new()
        .server(conn.server.clone())
        .fsname(args.fsname)
        .allow_other(args.allow_other)
        .auto_unmount(args.auto_unmount)
        .session(session);

    info!(
        target: "nefs::cli",
        %endpoint,
        mountpoint = %args.mountpoint.display(),
        "nefs mount"
    );
    nefs_bridge::mount(&endpoint, &args.mountpoint, config)?;

    if let Some(collector) = collector {
        collector.print_summary();
    }
    Ok(())
}
