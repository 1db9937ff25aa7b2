//! Shared test fixture: an in-process fake backend node.
//!
//! `FakeNode` serves a small in-memory tree over a Unix socket in a
//! dedicated thread, answering the same calls a real nefs server does:
//!
//! - `io:format([ping])`
//! - `gen_server:call(nefs, {get_attr | read_dir | open, ...})`
//! - `file:pread(Fd, {bof, Offset}, Size)`
//!
//! Every decoded request is recorded so tests can assert on the wire traffic.

// Allow dead code - these utilities are conditionally used by different test files
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use nefs_bridge::protocol::{decode, encode_frame, read_message, reply_term};
use nefs_bridge::transport::UnixListener;
use nefs_bridge::{Atom, Pid, RemoteCall, RpcSession, SessionConfig, Term};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Target name for fixture logs (consistent with library naming)
const TARGET: &str = "nefs::fixture";

/// Initialize tracing once for the test process.
static TRACING_INIT: Once = Once::new();

pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .init();
    });
}

/// Check if a path is a FUSE mount by looking in /proc/mounts.
pub fn is_fuse_mount(path: &Path) -> bool {
    if let Ok(mounts) = std::fs::read_to_string("/proc/mounts") {
        let path_str = path.to_str().unwrap_or("");
        mounts
            .lines()
            .any(|line| line.contains(path_str) && line.contains("fuse"))
    } else {
        false
    }
}

/// One entry of the fake tree.
#[derive(Debug, Clone)]
pub enum Node {
    Dir { mode: i64 },
    File { mode: i64, data: Vec<u8>, denied: bool },
}

/// Builder for the tree a [`FakeNode`] serves.
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: BTreeMap<String, Node>,
}

impl Default for Tree {
    fn default() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), Node::Dir { mode: 0o755 });
        Self { nodes }
    }
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dir(mut self, path: &str) -> Self {
        self.nodes.insert(path.to_string(), Node::Dir { mode: 0o755 });
        self
    }

    pub fn file(mut self, path: &str, data: &[u8]) -> Self {
        self.nodes.insert(
            path.to_string(),
            Node::File {
                mode: 0o644,
                data: data.to_vec(),
                denied: false,
            },
        );
        self
    }

    /// A file whose open is answered with `{error, access}`.
    pub fn secret(mut self, path: &str) -> Self {
        self.nodes.insert(
            path.to_string(),
            Node::File {
                mode: 0o600,
                data: Vec::new(),
                denied: true,
            },
        );
        self
    }

    fn children(&self, dir: &str) -> Vec<String> {
        let prefix = if dir == "/" {
            "/".to_string()
        } else {
            format!("{}/", dir)
        };
        self.nodes
            .keys()
            .filter_map(|p| p.strip_prefix(&prefix))
            .filter(|rest| !rest.is_empty() && !rest.contains('/'))
            .map(str::to_string)
            .collect()
    }
}

/// How the fake node behaves beyond answering from its tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Normal,
    /// Read requests but never reply.
    Silent,
    /// Close the connection after this many replies.
    HangUpAfter(usize),
}

struct State {
    tree: Tree,
    open: BTreeMap<u32, String>,
    next_fd: u32,
}

/// In-process fake backend node.
pub struct FakeNode {
    _dir: tempfile::TempDir,
    socket: PathBuf,
    calls: Arc<Mutex<Vec<RemoteCall>>>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl FakeNode {
    pub fn start(tree: Tree) -> Self {
        Self::with_behavior(tree, Behavior::Normal)
    }

    pub fn with_behavior(tree: Tree, behavior: Behavior) -> Self {
        init_tracing();
        let dir = tempfile::tempdir().expect("tempdir");
        let socket = dir.path().join("node.sock");
        let listener = UnixListener::bind(&socket).expect("bind node socket");

        let calls = Arc::new(Mutex::new(Vec::new()));
        let stop = Arc::new(AtomicBool::new(false));
        let state = State {
            tree,
            open: BTreeMap::new(),
            next_fd: 100,
        };

        let thread = {
            let calls = Arc::clone(&calls);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let stream = match listener.accept() {
                    Ok(stream) => stream,
                    Err(_) => return,
                };
                if stop.load(Ordering::SeqCst) {
                    return;
                }
                let _ = serve(stream, state, behavior, &calls, &stop);
            })
        };

        Self {
            _dir: dir,
            socket,
            calls,
            stop,
            thread: Some(thread),
        }
    }

    pub fn socket(&self) -> &Path {
        &self.socket
    }

    /// Connect a session with a short deadline suitable for tests.
    pub fn connect(&self) -> RpcSession {
        self.connect_with(SessionConfig::new().call_timeout(Some(Duration::from_secs(5))))
    }

    pub fn connect_with(&self, config: SessionConfig) -> RpcSession {
        RpcSession::connect_unix(&self.socket, config).expect("connect to fake node")
    }

    /// Requests received so far, in arrival order.
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Drop for FakeNode {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        // Unblock accept() if no client ever connected
        let _ = UnixStream::connect(&self.socket);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn serve(
    mut stream: UnixStream,
    mut state: State,
    behavior: Behavior,
    calls: &Mutex<Vec<RemoteCall>>,
    stop: &AtomicBool,
) -> io::Result<()> {
    // Poll so a dropped fixture is noticed even while the client is idle
    stream.set_read_timeout(Some(Duration::from_millis(100)))?;
    let mut replies = 0;
    loop {
        let body = match read_message(&mut stream) {
            Ok(body) => body,
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                if stop.load(Ordering::SeqCst) {
                    return Ok(());
                }
                continue;
            }
            Err(e) => return Err(e),
        };

        let term = decode(&body).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let call = RemoteCall::from_term(&term)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "not a call"))?;
        debug!(target: TARGET, call = %call.to_term(), "request");
        calls.lock().unwrap_or_else(|e| e.into_inner()).push(call.clone());

        if behavior == Behavior::Silent {
            continue;
        }
        if behavior == Behavior::HangUpAfter(replies) {
            return Ok(());
        }

        let reply = answer(&mut state, &call);
        stream.write_all(&encode_frame(&reply_term(reply))?)?;
        replies += 1;
    }
}

fn node_pid(id: u32) -> Pid {
    Pid {
        node: Atom::from("nefs@fake"),
        id,
        serial: 0,
        creation: 1,
    }
}

fn error(reason: &str) -> Term {
    Term::tuple(vec![Term::atom("error"), Term::atom(reason)])
}

fn answer(state: &mut State, call: &RemoteCall) -> Term {
    match (call.module.as_str(), call.function.as_str(), call.args.as_slice()) {
        ("io", "format", _) => Term::atom("ok"),
        ("gen_server", "call", [server, Term::Tuple(message)]) if server.is_atom("nefs") => {
            server_call(state, message)
        }
        ("file", "pread", [Term::Pid(fd), Term::Tuple(pos), Term::Integer(size)]) => {
            let path = match state.open.get(&fd.id) {
                Some(path) => path,
                None => return error("einval"),
            };
            let offset = match pos.as_slice() {
                [bof, Term::Integer(off)] if bof.is_atom("bof") => *off as usize,
                _ => return error("einval"),
            };
            match state.tree.nodes.get(path) {
                Some(Node::File { data, .. }) if offset < data.len() => {
                    let end = (offset + *size as usize).min(data.len());
                    Term::tuple(vec![Term::atom("ok"), Term::binary(&data[offset..end])])
                }
                _ => Term::atom("eof"),
            }
        }
        _ => Term::tuple(vec![Term::atom("badrpc"), Term::atom("undef")]),
    }
}

fn server_call(state: &mut State, message: &[Term]) -> Term {
    let path = match message.get(1) {
        Some(Term::Binary(path)) => String::from_utf8_lossy(path).into_owned(),
        _ => return error("badarg"),
    };
    let tag = match message.first() {
        Some(Term::Atom(tag)) => tag.as_str().to_string(),
        _ => return error("badarg"),
    };
    let node = match state.tree.nodes.get(&path) {
        Some(node) => node.clone(),
        None => return error("enoent"),
    };

    match (tag.as_str(), node) {
        ("get_attr", Node::Dir { mode }) => {
            let nlink = 2 + state.tree.children(&path).len() as i64;
            Term::tuple(vec![Term::atom("directory"), Term::Integer(mode), Term::Integer(nlink)])
        }
        ("get_attr", Node::File { mode, data, .. }) => Term::tuple(vec![
            Term::atom("file"),
            Term::Integer(mode),
            Term::Integer(1),
            Term::Integer(data.len() as i64),
        ]),
        ("read_dir", Node::Dir { .. }) => {
            let names: Vec<Term> = state
                .tree
                .children(&path)
                .iter()
                .map(|n| Term::charlist(n))
                .collect();
            Term::tuple(vec![Term::atom("ok"), Term::list(names)])
        }
        ("open", Node::File { denied: true, .. }) => error("access"),
        ("open", Node::File { .. }) => {
            let fd = state.next_fd;
            state.next_fd += 1;
            state.open.insert(fd, path);
            Term::tuple(vec![Term::atom("ok"), Term::Pid(node_pid(fd))])
        }
        _ => error("enotdir"),
    }
}
