//! Filesystem operation requests.

use super::term::{Pid, Term};
use super::wire::RemoteCall;

/// Default registered name of the backend filesystem server.
pub const DEFAULT_SERVER: &str = "nefs";

/// Requests the bridge sends to the backend node.
///
/// Path arguments travel as binaries, flags, offsets and sizes as integers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeRequest<'a> {
    /// `{get_attr, Path}` via `gen_server:call/2`.
    GetAttr { path: &'a str },

    /// `{read_dir, Path}` via `gen_server:call/2`.
    ReadDir { path: &'a str },

    /// `{open, Path, Flags}` via `gen_server:call/2`.
    Open { path: &'a str, flags: i32 },

    /// `file:pread(Fd, {bof, Offset}, Size)`.
    Pread {
        handle: &'a Pid,
        offset: u64,
        size: u32,
    },
}

impl NodeRequest<'_> {
    /// Get the operation name for logging and telemetry.
    pub fn op_name(&self) -> &'static str {
        match self {
            NodeRequest::GetAttr { .. } => "get_attr",
            NodeRequest::ReadDir { .. } => "read_dir",
            NodeRequest::Open { .. } => "open",
            NodeRequest::Pread { .. } => "pread",
        }
    }

    /// Build the remote call, addressing `server` for server messages.
    pub fn to_call(&self, server: &str) -> RemoteCall {
        let tag = Term::atom(self.op_name());
        match *self {
            NodeRequest::GetAttr { path } | NodeRequest::ReadDir { path } => {
                server_call(server, vec![tag, Term::binary(path.as_bytes())])
            }
            NodeRequest::Open { path, flags } => server_call(
                server,
                vec![tag, Term::binary(path.as_bytes()), Term::Integer(flags as i64)],
            ),
            NodeRequest::Pread {
                handle,
                offset,
                size,
            } => RemoteCall::new(
                "file",
                "pread",
                vec![
                    Term::Pid(handle.clone()),
                    Term::tuple(vec![Term::atom("bof"), offset_term(offset)]),
                    Term::Integer(size as i64),
                ],
            ),
        }
    }
}

/// `gen_server:call(Server, {Tag, Args...})`
fn server_call(server: &str, message: Vec<Term>) -> RemoteCall {
    RemoteCall::new(
        "gen_server",
        "call",
        vec![Term::atom(server), Term::Tuple(message)],
    )
}

/// Offsets beyond i64::MAX cannot be expressed as a position; clamp them.
fn offset_term(offset: u64) -> Term {
    Term::Integer(i64::try_from(offset).unwrap_or(i64::MAX))
}
