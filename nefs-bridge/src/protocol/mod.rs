//! Wire protocol between the bridge and the backend node.
//!
//! This module provides the term representation, the external term format
//! codec, and the framing used on the single RPC connection.
//!
//! # Architecture
//!
//! ```text
//! NodeRequest ──to_call──> RemoteCall ──encode──> {call,M,F,Args} frame
//!                                                        │
//!                                                   backend node
//!                                                        │
//! Term <──unwrap_reply── {rex,Reply} <──decode── reply frame
//! ```
//!
//! The protocol has no request ids: replies are matched to requests purely
//! by order, so a connection carries exactly one call at a time.

mod codec;
mod request;
mod term;
mod wire;

pub use codec::{decode, encode, encode_into, DecodeError, EncodeError, MAX_DEPTH, VERSION};
pub use request::{NodeRequest, DEFAULT_SERVER};
pub use term::{Atom, Pid, Term, TermKind};
pub use wire::{
    encode_frame, payload_len, read_message, reply_term, unwrap_reply, write_message, RemoteCall,
    MAX_MESSAGE_SIZE,
};
