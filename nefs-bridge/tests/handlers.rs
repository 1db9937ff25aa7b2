//! Filesystem handlers against a fake backend node over a real socket.

mod common;

use common::{Behavior, FakeNode, Tree};
use nefs_bridge::{NodeFs, NodeKind, SessionError, Term};

fn tree() -> Tree {
    Tree::new()
        .dir("/docs")
        .file("/hello.txt", b"Hello, nefs!\n")
        .file("/docs/a.md", b"# A\n")
        .file("/docs/b.md", b"")
        .secret("/private.key")
}

#[test]
fn test_startup_ping() {
    let node = FakeNode::start(tree());
    let session = node.connect();
    session.ping().expect("ping");

    let calls = node.calls();
    assert_eq!(calls[0].module.as_str(), "io");
    assert_eq!(calls[0].function.as_str(), "format");
    assert_eq!(calls[0].args, vec![Term::atom("ping")]);
}

#[test]
fn test_stat_root_and_file() {
    let node = FakeNode::start(tree());
    let fs = NodeFs::new(node.connect());

    let root = fs.stat("/").expect("stat /");
    assert_eq!(root.kind(), Some(NodeKind::Directory));
    assert_eq!(root.perm(), 0o755);
    assert_eq!(root.nlink, 5);
    assert_eq!(root.size, 0);

    let file = fs.stat("/hello.txt").expect("stat file");
    assert_eq!(file.kind(), Some(NodeKind::RegularFile));
    assert_eq!(file.perm(), 0o644);
    assert_eq!(file.size, 13);

    let err = fs.stat("/missing").unwrap_err();
    assert_eq!(err.errno(), libc::ENOENT);
}

#[test]
fn test_list_directories() {
    let node = FakeNode::start(tree());
    let fs = NodeFs::new(node.connect());

    let root = fs.read_dir("/").expect("ls /");
    assert_eq!(root, vec![".", "..", "docs", "hello.txt", "private.key"]);

    let docs = fs.read_dir("/docs").expect("ls /docs");
    assert_eq!(docs, vec![".", "..", "a.md", "b.md"]);

    // Listing a file is a shape the handler does not expect
    assert_eq!(fs.read_dir("/hello.txt").unwrap_err().errno(), libc::ENOENT);
}

#[test]
fn test_open_and_read_whole_file() {
    let node = FakeNode::start(tree());
    let fs = NodeFs::new(node.connect());

    let handle = fs.open("/hello.txt", libc::O_RDONLY).expect("open");

    let mut contents = Vec::new();
    let mut buf = [0u8; 4];
    let mut offset = 0;
    loop {
        let n = fs.read(&handle, offset, &mut buf).expect("read");
        if n == 0 {
            break;
        }
        contents.extend_from_slice(&buf[..n]);
        offset += n as u64;
    }
    assert_eq!(contents, b"Hello, nefs!\n");

    // Every pread carried the handle from open
    let preads: Vec<_> = node
        .calls()
        .into_iter()
        .filter(|c| c.function.as_str() == "pread")
        .collect();
    assert_eq!(preads.len(), 5);
    for call in preads {
        assert_eq!(call.args[0], Term::Pid(handle.pid().clone()));
    }
}

#[test]
fn test_read_empty_file_is_short_read() {
    let node = FakeNode::start(tree());
    let fs = NodeFs::new(node.connect());

    let handle = fs.open("/docs/b.md", libc::O_RDONLY).expect("open");
    let mut buf = [0u8; 64];
    // The node answers `eof`, which is not {ok, Data}
    assert_eq!(fs.read(&handle, 0, &mut buf).expect("read"), 0);
}

#[test]
fn test_open_denied_and_missing() {
    let node = FakeNode::start(tree());
    let fs = NodeFs::new(node.connect());

    assert_eq!(
        fs.open("/private.key", libc::O_RDONLY).unwrap_err().errno(),
        libc::EACCES
    );
    assert_eq!(
        fs.open("/nope", libc::O_RDONLY).unwrap_err().errno(),
        libc::ENOENT
    );
}

#[test]
fn test_lost_connection_is_eio_then_closed() {
    let node = FakeNode::with_behavior(tree(), Behavior::HangUpAfter(1));
    let fs = NodeFs::new(node.connect());

    fs.stat("/").expect("first call is answered");

    let err = fs.stat("/").unwrap_err();
    assert_eq!(err.errno(), libc::EIO);

    match fs.read_dir("/").unwrap_err() {
        nefs_bridge::FsError::Connection(SessionError::Closed) => {}
        other => panic!("expected closed session, got {other}"),
    }
    assert!(fs.rpc().is_broken());
}
