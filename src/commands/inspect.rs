//! Run the filesystem handlers directly, without a kernel mount.

use anyhow::{Context, Result};
use nefs_bridge::{NodeAttr, NodeKind};
use serde::Serialize;
use std::io::Write;

use super::common::{connect, normalize_path};
use crate::cli::{ConnectArgs, PathArgs};

/// Read size for `cat`, matching the kernel's usual max_read.
const CHUNK: usize = 128 * 1024;

#[derive(Debug, Serialize)]
struct StatInfo {
    path: String,
    kind: &'static str,
    mode: String,
    nlink: u32,
    size: u64,
}

impl StatInfo {
    fn new(path: String, attr: &NodeAttr) -> Self {
        let kind = match attr.kind() {
            Some(NodeKind::Directory) => "directory",
            Some(NodeKind::RegularFile) => "file",
            None => "unknown",
        };
        Self {
            path,
            kind,
            mode: format!("{:04o}", attr.perm()),
            nlink: attr.nlink,
            size: attr.size,
        }
    }
}

pub fn cmd_stat(conn: &ConnectArgs, args: PathArgs) -> Result<()> {
    let path = normalize_path(&args.path)?;
    let fs = connect(conn)?;
    let attr = fs
        .stat(&path)
        .with_context(|| format!("stat {}", path))?;
    let info = StatInfo::new(path, &attr);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        println!("  Path: {}", info.path);
        println!("  Type: {}", info.kind);
        println!("  Mode: {}", info.mode);
        println!(" Links: {}", info.nlink);
        println!("  Size: {}", info.size);
    }
    Ok(())
}

pub fn cmd_ls(conn: &ConnectArgs, args: PathArgs) -> Result<()> {
    let path = normalize_path(&args.path)?;
    let fs = connect(conn)?;
    let names = fs
        .read_dir(&path)
        .with_context(|| format!("ls {}", path))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&names)?);
    } else {
        for name in names {
            println!("{}", name);
        }
    }
    Ok(())
}

pub fn cmd_cat(conn: &ConnectArgs, args: PathArgs) -> Result<()> {
    let path = normalize_path(&args.path)?;
    let fs = connect(conn)?;
    let handle = fs
        .open(&path, libc::O_RDONLY)
        .with_context(|| format!("open {}", path))?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut buf = vec![0u8; CHUNK];
    let mut offset = 0u64;
    loop {
        let n = fs
            .read(&handle, offset, &mut buf)
            .with_context(|| format!("read {} at {}", path, offset))?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n])?;
        offset += n as u64;
    }
    out.flush()?;
    Ok(())
}
