//! fuser::Filesystem implementation backed by the node handlers.
//!
//! Only the read-only path is wired up: lookup, getattr, readdir, open, read
//! and release. Every other callback keeps fuser's default `ENOSYS` reply.

use super::ops::{FileHandle, FsError, NodeAttr, NodeFs, NodeKind};
use super::session::Rpc;
use super::tables::{join, HandleTable, InodeTable};
use fuser::{
    FileType, Filesystem, KernelConfig, ReplyAttr, ReplyData, ReplyDirectory, ReplyEmpty,
    ReplyEntry, ReplyOpen, Request,
};
use std::ffi::OsStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Nothing is cached by the kernel; every stat goes to the backend.
const TTL: Duration = Duration::ZERO;

const BLOCK_SIZE: u32 = 512;

/// FUSE client translating kernel requests into backend calls.
pub struct FuseClient<R> {
    fs: NodeFs<R>,
    inodes: InodeTable,
    handles: HandleTable,
    uid: u32,
    gid: u32,
    /// Set by `destroy()`, so the mount loop can tell a clean unmount from an error.
    destroyed: Arc<AtomicBool>,
}

impl<R: Rpc> FuseClient<R> {
    pub fn new(fs: NodeFs<R>) -> Self {
        Self::with_destroyed_flag(fs, Arc::new(AtomicBool::new(false)))
    }

    pub fn with_destroyed_flag(fs: NodeFs<R>, destroyed: Arc<AtomicBool>) -> Self {
        Self {
            fs,
            inodes: InodeTable::new(),
            handles: HandleTable::new(),
            uid: 0,
            gid: 0,
            destroyed,
        }
    }

    /// Report files as owned by this uid/gid.
    pub fn owner(mut self, uid: u32, gid: u32) -> Self {
        self.uid = uid;
        self.gid = gid;
        self
    }

    fn path(&self, ino: u64) -> Result<String, i32> {
        self.inodes.path(ino).ok_or(libc::ENOENT)
    }

    fn to_fuser_attr(&self, ino: u64, attr: &NodeAttr) -> fuser::FileAttr {
        let kind = match attr.kind() {
            Some(NodeKind::Directory) => FileType::Directory,
            _ => FileType::RegularFile,
        };

        fuser::FileAttr {
            ino,
            size: attr.size,
            blocks: attr.size.div_ceil(BLOCK_SIZE as u64),
            atime: UNIX_EPOCH,
            mtime: UNIX_EPOCH,
            ctime: UNIX_EPOCH,
            crtime: UNIX_EPOCH,
            kind,
            perm: attr.perm(),
            nlink: attr.nlink,
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            blksize: BLOCK_SIZE,
            flags: 0,
        }
    }

    /// Kind of a listed entry. Resolving it costs one get_attr per child.
    fn entry_kind(&self, dir: &str, name: &str) -> FileType {
        match name {
            "." | ".." => FileType::Directory,
            _ => match self.fs.stat(&join(dir, name)).map(|a| a.kind()) {
                Ok(Some(NodeKind::Directory)) => FileType::Directory,
                _ => FileType::RegularFile,
            },
        }
    }
}

fn log_error(op: &str, path: &str, err: &FsError) -> i32 {
    let errno = err.errno();
    match err {
        FsError::Connection(_) => {
            warn!(target: "nefs::fuse", op, path, errno, error = %err, "backend unavailable")
        }
        _ => debug!(target: "nefs::fuse", op, path, errno, error = %err, "failed"),
    }
    errno
}

impl<R: Rpc> Filesystem for FuseClient<R> {
    fn init(&mut self, _req: &Request<'_>, _config: &mut KernelConfig) -> Result<(), libc::c_int> {
        info!(target: "nefs::fuse", server = self.fs.server(), "filesystem initialized");
        Ok(())
    }

    fn destroy(&mut self) {
        debug!(target: "nefs::fuse", open_handles = self.handles.len(), "destroy");
        self.destroyed.store(true, Ordering::SeqCst);
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(name) = name.to_str() else {
            reply.error(libc::ENOENT);
            return;
        };
        let path = match self.inodes.child_path(parent, name) {
            Some(path) => path,
            None => return reply.error(libc::ENOENT),
        };

        match self.fs.stat(&path) {
            Ok(attr) => {
                let ino = self.inodes.intern(&path);
                reply.entry(&TTL, &self.to_fuser_attr(ino, &attr), 0);
            }
            Err(e) => reply.error(log_error("lookup", &path, &e)),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        let path = match self.path(ino) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };

        let mut attr = NodeAttr::default();
        match self.fs.get_attr(&path, &mut attr) {
            Ok(()) => reply.attr(&TTL, &self.to_fuser_attr(ino, &attr)),
            Err(e) => reply.error(log_error("getattr", &path, &e)),
        }
    }

    fn opendir(&mut self, _req: &Request<'_>, _ino: u64, _flags: i32, reply: ReplyOpen) {
        reply.opened(0, 0);
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let path = match self.path(ino) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };

        let names = match self.fs.read_dir(&path) {
            Ok(names) => names,
            Err(e) => return reply.error(log_error("readdir", &path, &e)),
        };

        let skip = usize::try_from(offset).unwrap_or(0);
        for (i, name) in names.iter().enumerate().skip(skip) {
            let entry_ino = self.inodes.intern(&join(&path, name));
            let kind = self.entry_kind(&path, name);
            // Offset is the index of the next entry
            if reply.add(entry_ino, (i + 1) as i64, kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn releasedir(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _flags: i32,
        reply: ReplyEmpty,
    ) {
        reply.ok();
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        let path = match self.path(ino) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };

        match self.fs.open(&path, flags) {
            Ok(handle) => {
                let fh = self.handles.insert(handle);
                debug!(target: "nefs::fuse", path, fh, "opened");
                reply.opened(fh, fuser::consts::FOPEN_DIRECT_IO);
            }
            Err(e) => reply.error(log_error("open", &path, &e)),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let handle: FileHandle = match self.handles.get(fh) {
            Some(handle) => handle,
            None => return reply.error(libc::EBADF),
        };
        let offset = match u64::try_from(offset) {
            Ok(offset) => offset,
            Err(_) => return reply.error(libc::EINVAL),
        };

        let mut buf = vec![0u8; size as usize];
        match self.fs.read(&handle, offset, &mut buf) {
            Ok(n) => reply.data(&buf[..n]),
            Err(e) => {
                let path = self.inodes.path(ino).unwrap_or_default();
                reply.error(log_error("read", &path, &e))
            }
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        // The backend owns the handle's lifetime; only the local slot goes
        self.handles.remove(fh);
        reply.ok();
    }
}
