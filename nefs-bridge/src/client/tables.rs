//! Inode and open-handle tables for the kernel adapter.
//!
//! The kernel addresses files by inode number while the backend addresses
//! them by path, so every path the kernel has seen is interned here. Entries
//! are never forgotten; inode numbers stay stable for the life of the mount.

use super::ops::FileHandle;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Inode number of the mount root, `/`.
pub const ROOT_INO: u64 = 1;

/// Bidirectional inode <-> absolute path map.
pub struct InodeTable {
    paths: DashMap<u64, String>,
    inodes: DashMap<String, u64>,
    next_ino: AtomicU64,
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl InodeTable {
    pub fn new() -> Self {
        let table = Self {
            paths: DashMap::new(),
            inodes: DashMap::new(),
            next_ino: AtomicU64::new(ROOT_INO + 1),
        };
        table.paths.insert(ROOT_INO, "/".to_string());
        table.inodes.insert("/".to_string(), ROOT_INO);
        table
    }

    /// Path for an inode the kernel was previously given.
    pub fn path(&self, ino: u64) -> Option<String> {
        self.paths.get(&ino).map(|p| p.value().clone())
    }

    /// Inode for `path`, allocating one on first sight.
    pub fn intern(&self, path: &str) -> u64 {
        if let Some(ino) = self.inodes.get(path) {
            return *ino;
        }
        // The entry lock makes allocation atomic per path
        let ino = *self
            .inodes
            .entry(path.to_string())
            .or_insert_with(|| self.next_ino.fetch_add(1, Ordering::Relaxed));
        self.paths.entry(ino).or_insert_with(|| path.to_string());
        ino
    }

    /// Absolute path of `name` inside directory `parent`.
    pub fn child_path(&self, parent: u64, name: &str) -> Option<String> {
        let dir = self.path(parent)?;
        Some(join(&dir, name))
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Join a directory path and an entry name; `.` and `..` are resolved.
pub fn join(dir: &str, name: &str) -> String {
    match name {
        "." => dir.to_string(),
        ".." => match dir.trim_end_matches('/').rsplit_once('/') {
            Some(("", _)) | None => "/".to_string(),
            Some((parent, _)) => parent.to_string(),
        },
        _ if dir.ends_with('/') => format!("{}{}", dir, name),
        _ => format!("{}/{}", dir, name),
    }
}

/// Maps the `fh` numbers given to the kernel onto backend handles.
pub struct HandleTable {
    handles: DashMap<u64, FileHandle>,
    next_fh: AtomicU64,
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

impl HandleTable {
    pub fn new() -> Self {
        Self {
            handles: DashMap::new(),
            next_fh: AtomicU64::new(1),
        }
    }

    /// Store a handle and return its kernel-facing number (never 0).
    pub fn insert(&self, handle: FileHandle) -> u64 {
        let fh = self.next_fh.fetch_add(1, Ordering::Relaxed);
        self.handles.insert(fh, handle);
        fh
    }

    pub fn get(&self, fh: u64) -> Option<FileHandle> {
        self.handles.get(&fh).map(|h| h.value().clone())
    }

    pub fn remove(&self, fh: u64) -> Option<FileHandle> {
        self.handles.remove(&fh).map(|(_, h)| h)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Atom, Pid};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_root_is_preallocated() {
        let table = InodeTable::new();
        assert_eq!(table.path(ROOT_INO).as_deref(), Some("/"));
        assert_eq!(table.intern("/"), ROOT_INO);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_intern_is_stable() {
        let table = InodeTable::new();
        let a = table.intern("/a");
        let b = table.intern("/a/b");
        assert_ne!(a, b);
        assert_eq!(table.intern("/a"), a);
        assert_eq!(table.path(b).as_deref(), Some("/a/b"));
        assert_eq!(table.child_path(a, "b").as_deref(), Some("/a/b"));
        assert!(table.child_path(999, "x").is_none());
    }

    #[test]
    fn test_concurrent_intern_agrees() {
        let table = Arc::new(InodeTable::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let table = Arc::clone(&table);
                thread::spawn(move || (0..100).map(|i| table.intern(&format!("/f{i}"))).collect::<Vec<_>>())
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for r in &results[1..] {
            assert_eq!(r, &results[0]);
        }
        assert_eq!(table.len(), 101);
    }

    #[test]
    fn test_join() {
        assert_eq!(join("/", "a"), "/a");
        assert_eq!(join("/a", "b"), "/a/b");
        assert_eq!(join("/a/b", "."), "/a/b");
        assert_eq!(join("/a/b", ".."), "/a");
        assert_eq!(join("/a", ".."), "/");
        assert_eq!(join("/", ".."), "/");
    }

    #[test]
    fn test_handle_table() {
        let table = HandleTable::new();
        let handle = FileHandle::from(Pid {
            node: Atom::from("n@h"),
            id: 1,
            serial: 2,
            creation: 3,
        });
        let fh = table.insert(handle.clone());
        assert_ne!(fh, 0);
        assert_eq!(table.get(fh), Some(handle.clone()));
        assert_eq!(table.remove(fh), Some(handle));
        assert!(table.get(fh).is_none());
        assert!(table.is_empty());
    }
}
