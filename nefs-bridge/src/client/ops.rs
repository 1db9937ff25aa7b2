//! Filesystem operation handlers.
//!
//! Each handler follows the same steps: build the request, call the backend,
//! match the reply against the operation's expected shapes, then convert the
//! bindings into a result or an errno.
//!
//! | Operation | Reply shapes | Failure |
//! |-----------|--------------|---------|
//! | get_attr  | `{directory, Mode, Nlink}`, `{file, Mode, Nlink, Size}` | ENOENT |
//! | read_dir  | `{ok, Listing}` | ENOENT, no entries emitted |
//! | open      | `{ok, Fd}`, `{error, access}` | ENOENT / EACCES |
//! | read      | `{ok, Data}` | short read of 0 bytes |
//!
//! A broken connection is `EIO` for every operation.

use super::session::{Rpc, SessionError};
use crate::matcher::{match_any, MatchError, Pattern, Var};
use crate::protocol::{NodeRequest, Pid, Term, DEFAULT_SERVER};
use std::time::Instant;
use tracing::debug;

const DIRECTORY: Pattern = Pattern::Tuple(&[
    Pattern::Atom("directory"),
    Pattern::Var(Var::Mode),
    Pattern::Var(Var::Nlink),
]);

const FILE: Pattern = Pattern::Tuple(&[
    Pattern::Atom("file"),
    Pattern::Var(Var::Mode),
    Pattern::Var(Var::Nlink),
    Pattern::Var(Var::Size),
]);

const OK_LISTING: Pattern = Pattern::Tuple(&[Pattern::Atom("ok"), Pattern::Var(Var::Listing)]);

const OK_FD: Pattern = Pattern::Tuple(&[Pattern::Atom("ok"), Pattern::Var(Var::Fd)]);

const ERROR_ACCESS: Pattern = Pattern::Tuple(&[Pattern::Atom("error"), Pattern::Atom("access")]);

const OK_DATA: Pattern = Pattern::Tuple(&[Pattern::Atom("ok"), Pattern::Var(Var::Data)]);

const PERM_BITS: u32 = 0o7777;

/// Handler failure, convertible to an errno for the kernel.
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error("unexpected reply: {0}")]
    Mismatch(#[from] MatchError),

    #[error("invalid directory entry name {0:?}")]
    InvalidName(String),

    #[error("access denied")]
    AccessDenied,

    #[error(transparent)]
    Connection(#[from] SessionError),
}

impl FsError {
    pub fn errno(&self) -> i32 {
        match self {
            FsError::Mismatch(_) | FsError::InvalidName(_) => libc::ENOENT,
            FsError::AccessDenied => libc::EACCES,
            FsError::Connection(_) => libc::EIO,
        }
    }
}

/// File type reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Directory,
    RegularFile,
}

/// Attributes of one path, laid out like the fields of `struct stat` the
/// backend fills in. The default value is all zeroes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeAttr {
    /// File type bits plus permission bits.
    pub mode: u32,
    pub nlink: u32,
    /// Always 0 for directories.
    pub size: u64,
}

impl NodeAttr {
    /// File type, or `None` for a zeroed record.
    pub fn kind(&self) -> Option<NodeKind> {
        match self.mode & libc::S_IFMT {
            libc::S_IFDIR => Some(NodeKind::Directory),
            libc::S_IFREG => Some(NodeKind::RegularFile),
            _ => None,
        }
    }

    pub fn perm(&self) -> u16 {
        (self.mode & PERM_BITS) as u16
    }
}

/// Backend handle for an open file, passed back unchanged on every read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHandle(Pid);

impl FileHandle {
    pub fn pid(&self) -> &Pid {
        &self.0
    }
}

impl From<Pid> for FileHandle {
    fn from(pid: Pid) -> Self {
        FileHandle(pid)
    }
}

/// The four filesystem operations, written against any [`Rpc`].
///
/// The session is borrowed per call and never mutated, so one `NodeFs` can
/// be shared by every FUSE request.
pub struct NodeFs<R> {
    rpc: R,
    server: String,
}

impl<R: Rpc> NodeFs<R> {
    /// Address the default `nefs` server.
    pub fn new(rpc: R) -> Self {
        Self::with_server(rpc, DEFAULT_SERVER)
    }

    pub fn with_server(rpc: R, server: impl Into<String>) -> Self {
        Self {
            rpc,
            server: server.into(),
        }
    }

    pub fn rpc(&self) -> &R {
        &self.rpc
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    fn call(&self, request: NodeRequest<'_>) -> Result<Term, FsError> {
        let start = Instant::now();
        let result = self.rpc.call(&request.to_call(&self.server));
        let elapsed_us = start.elapsed().as_micros() as u64;
        match &result {
            Ok(reply) => {
                debug!(target: "nefs::fuse", op = request.op_name(), elapsed_us, %reply, "reply")
            }
            Err(e) => {
                debug!(target: "nefs::fuse", op = request.op_name(), elapsed_us, error = %e, "call failed")
            }
        }
        result.map_err(FsError::from)
    }

    /// Attribute lookup. `attr` is zeroed first and only filled on success.
    pub fn get_attr(&self, path: &str, attr: &mut NodeAttr) -> Result<(), FsError> {
        *attr = NodeAttr::default();
        let reply = self.call(NodeRequest::GetAttr { path })?;

        let (shape, b) = match_any(&reply, &[DIRECTORY, FILE])?;
        // The reply tag decides the file type; only permission bits come from Mode.
        let mode = b.integer_as::<u32>(Var::Mode)? & PERM_BITS;
        let nlink: u32 = b.integer_as(Var::Nlink)?;
        *attr = if shape == 0 {
            NodeAttr {
                mode: libc::S_IFDIR | mode,
                nlink,
                size: 0,
            }
        } else {
            NodeAttr {
                mode: libc::S_IFREG | mode,
                nlink,
                size: b.integer_as(Var::Size)?,
            }
        };
        Ok(())
    }

    /// Attribute lookup returning the record by value.
    pub fn stat(&self, path: &str) -> Result<NodeAttr, FsError> {
        let mut attr = NodeAttr::default();
        self.get_attr(path, &mut attr)?;
        Ok(attr)
    }

    /// Directory listing: `.` and `..` followed by the backend's names.
    ///
    /// The whole listing is validated before anything is returned, so a bad
    /// element yields an error and no entries at all.
    pub fn read_dir(&self, path: &str) -> Result<Vec<String>, FsError> {
        let reply = self.call(NodeRequest::ReadDir { path })?;

        let (_, b) = match_any(&reply, &[OK_LISTING])?;
        let listing = b.list(Var::Listing)?;

        let mut names = Vec::with_capacity(listing.len() + 2);
        names.push(".".to_string());
        names.push("..".to_string());
        for elem in listing {
            names.push(entry_name(elem)?);
        }
        Ok(names)
    }

    /// Directory listing delivered one name at a time.
    pub fn read_dir_with(&self, path: &str, mut filler: impl FnMut(&str)) -> Result<(), FsError> {
        for name in self.read_dir(path)? {
            filler(&name);
        }
        Ok(())
    }

    /// Open a file, returning the backend's handle for it.
    pub fn open(&self, path: &str, flags: i32) -> Result<FileHandle, FsError> {
        let reply = self.call(NodeRequest::Open { path, flags })?;

        match match_any(&reply, &[OK_FD, ERROR_ACCESS])? {
            (0, b) => Ok(FileHandle(b.pid(Var::Fd)?.clone())),
            _ => Err(FsError::AccessDenied),
        }
    }

    /// Read up to `buf.len()` bytes at `offset` into `buf`.
    ///
    /// Returns the number of bytes copied. A reply of the wrong shape is a
    /// short read of 0 bytes, not an error; only a connection failure errors.
    pub fn read(&self, handle: &FileHandle, offset: u64, buf: &mut [u8]) -> Result<usize, FsError> {
        let size = u32::try_from(buf.len()).unwrap_or(u32::MAX);
        let reply = self.call(NodeRequest::Pread {
            handle: &handle.0,
            offset,
            size,
        })?;

        let data = match match_any(&reply, &[OK_DATA]).and_then(|(_, b)| b.binary(Var::Data)) {
            Ok(data) => data,
            Err(e) => {
                debug!(target: "nefs::fuse", handle = %handle.0, offset, error = %e, "short read");
                return Ok(0);
            }
        };

        let n = data.len().min(buf.len());
        buf[..n].copy_from_slice(&data[..n]);
        Ok(n)
    }
}

/// Decode one listing element: a character list naming a single entry.
fn entry_name(elem: &Term) -> Result<String, FsError> {
    let chars = match elem {
        Term::List(chars) => chars,
        other => return Err(FsError::InvalidName(other.to_string())),
    };

    let mut name = String::with_capacity(chars.len());
    for c in chars {
        let c = match c {
            Term::Integer(v) => u32::try_from(*v).ok().and_then(char::from_u32),
            _ => None,
        };
        match c {
            Some(c) => name.push(c),
            None => return Err(FsError::InvalidName(elem.to_string())),
        }
    }

    if name.is_empty() || name.contains(['/', '\0']) {
        return Err(FsError::InvalidName(name));
    }
    Ok(name)
}
