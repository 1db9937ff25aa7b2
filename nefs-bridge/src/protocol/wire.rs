//! Wire framing and RPC envelope.
//!
//! # Frame Format
//!
//! ```text
//! +----------+---------------+
//! |  length  | encoded term  |
//! | (4 bytes)|   (N bytes)   |
//! +----------+---------------+
//! ```
//!
//! - Length is a big-endian u32 specifying the payload size
//! - Payload is one term in external term format
//!
//! A request payload is `{call, Module, Function, Args}`, the reply payload
//! is `{rex, Reply}`.

use super::codec::{self, EncodeError};
use super::term::{Atom, Term};
use std::io::{self, Read, Write};

/// Maximum message size (16 MB).
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// A synchronous `Module:Function(Args...)` call against the backend node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCall {
    pub module: Atom,
    pub function: Atom,
    pub args: Vec<Term>,
}

impl RemoteCall {
    pub fn new(module: &str, function: &str, args: Vec<Term>) -> Self {
        Self {
            module: Atom::from(module),
            function: Atom::from(function),
            args,
        }
    }

    /// Request term carried on the wire.
    pub fn to_term(&self) -> Term {
        Term::tuple(vec![
            Term::atom("call"),
            Term::Atom(self.module.clone()),
            Term::Atom(self.function.clone()),
            Term::List(self.args.clone()),
        ])
    }

    /// Parse a request term back into a call (used by backend-side tooling and tests).
    pub fn from_term(term: &Term) -> Option<Self> {
        match term {
            Term::Tuple(items) => match items.as_slice() {
                [tag, Term::Atom(module), Term::Atom(function), Term::List(args)]
                    if tag.is_atom("call") =>
                {
                    Some(Self {
                        module: module.clone(),
                        function: function.clone(),
                        args: args.clone(),
                    })
                }
                _ => None,
            },
            _ => None,
        }
    }

    /// Short operation name for logs and telemetry.
    ///
    /// Server calls are labelled by their message tag (`get_attr`), plain
    /// calls by their function name (`pread`).
    pub fn label(&self) -> &str {
        if self.module.as_str() == "gen_server" && self.function.as_str() == "call" {
            if let Some(Term::Tuple(message)) = self.args.get(1) {
                if let Some(Term::Atom(tag)) = message.first() {
                    return tag.as_str();
                }
            }
        }
        self.function.as_str()
    }

    /// Serialize to bytes with length prefix.
    pub fn encode(&self) -> io::Result<Vec<u8>> {
        encode_frame(&self.to_term())
    }
}

/// Wrap a reply term in the `{rex, Reply}` envelope.
pub fn reply_term(reply: Term) -> Term {
    Term::tuple(vec![Term::atom("rex"), reply])
}

/// Strip the `{rex, Reply}` envelope. Returns the original term on mismatch.
pub fn unwrap_reply(term: Term) -> Result<Term, Term> {
    match term {
        Term::Tuple(mut items) if items.len() == 2 && items[0].is_atom("rex") => {
            Ok(items.swap_remove(1))
        }
        other => Err(other),
    }
}

fn encode_error(e: EncodeError) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, e)
}

/// Reject payload lengths above [`MAX_MESSAGE_SIZE`].
fn check_len(len: usize) -> io::Result<usize> {
    if len > MAX_MESSAGE_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("message too large: {} bytes", len),
        ));
    }
    Ok(len)
}

/// Payload length announced by a frame header.
pub fn payload_len(header: [u8; 4]) -> io::Result<usize> {
    check_len(u32::from_be_bytes(header) as usize)
}

/// Encode a term into a length-prefixed frame.
pub fn encode_frame(term: &Term) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; 4];
    codec::encode_into(term, &mut buf).map_err(encode_error)?;

    let len = check_len(buf.len() - 4)?;
    buf[..4].copy_from_slice(&(len as u32).to_be_bytes());
    Ok(buf)
}

/// Blocking frame read for the serving side of a connection.
pub fn read_message<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut header = [0u8; 4];
    reader.read_exact(&mut header)?;
    let mut payload = vec![0u8; payload_len(header)?];
    reader.read_exact(&mut payload)?;
    Ok(payload)
}

/// Frame an already encoded payload.
pub fn write_message<W: Write>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    let len = check_len(payload.len())? as u32;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(payload)
}
