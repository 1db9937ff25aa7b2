//! External term format codec.
//!
//! # Layout
//!
//! ```text
//! +---------+-----+----------------+
//! | version | tag | tag-specific.. |
//! |  (131)  | (1) |                |
//! +---------+-----+----------------+
//! ```
//!
//! Only the tags the bridge exchanges with the backend are supported.
//! Anything else fails decoding with [`DecodeError::UnknownTag`].

use super::term::{Atom, Pid, Term};

/// Leading version byte of every encoded term.
pub const VERSION: u8 = 131;

/// Maximum nesting depth accepted by the decoder.
pub const MAX_DEPTH: usize = 128;

mod tag {
    pub const NEW_PID: u8 = 88;
    pub const SMALL_INTEGER: u8 = 97;
    pub const INTEGER: u8 = 98;
    pub const ATOM: u8 = 100;
    pub const PID: u8 = 103;
    pub const SMALL_TUPLE: u8 = 104;
    pub const LARGE_TUPLE: u8 = 105;
    pub const NIL: u8 = 106;
    pub const STRING: u8 = 107;
    pub const LIST: u8 = 108;
    pub const BINARY: u8 = 109;
    pub const SMALL_BIG: u8 = 110;
    pub const SMALL_ATOM: u8 = 115;
    pub const ATOM_UTF8: u8 = 118;
    pub const SMALL_ATOM_UTF8: u8 = 119;
}

/// Errors produced while decoding a term.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("truncated term at offset {0}")]
    Truncated(usize),

    #[error("unsupported term format version {0}")]
    BadVersion(u8),

    #[error("unknown term tag {tag} at offset {offset}")]
    UnknownTag { tag: u8, offset: usize },

    #[error("integer does not fit in 64 bits")]
    IntegerOverflow,

    #[error("improper list tail")]
    ImproperList,

    #[error("atom is not valid UTF-8")]
    InvalidAtom,

    #[error("pid node is not an atom")]
    InvalidPid,

    #[error("{0} trailing bytes after term")]
    TrailingBytes(usize),

    #[error("term nesting exceeds {MAX_DEPTH} levels")]
    TooDeep,
}

/// Errors produced while encoding a term.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    #[error("atom too long: {0} bytes")]
    AtomTooLong(usize),

    #[error("{what} too large: {len}")]
    TooLarge { what: &'static str, len: usize },
}

/// Encode a term, including the leading version byte.
pub fn encode(term: &Term) -> Result<Vec<u8>, EncodeError> {
    let mut buf = Vec::with_capacity(64);
    encode_into(term, &mut buf)?;
    Ok(buf)
}

/// Append an encoded term (with version byte) to `buf`.
pub fn encode_into(term: &Term, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
    buf.push(VERSION);
    encode_term(term, buf)
}

fn encode_term(term: &Term, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
    match term {
        Term::Integer(v) => encode_integer(*v, buf),
        Term::Atom(a) => encode_atom(a, buf)?,
        Term::Binary(bytes) => {
            let len = u32::try_from(bytes.len()).map_err(|_| EncodeError::TooLarge {
                what: "binary",
                len: bytes.len(),
            })?;
            buf.push(tag::BINARY);
            buf.extend_from_slice(&len.to_be_bytes());
            buf.extend_from_slice(bytes);
        }
        Term::Tuple(items) => {
            if let Ok(arity) = u8::try_from(items.len()) {
                buf.push(tag::SMALL_TUPLE);
                buf.push(arity);
            } else {
                let arity = u32::try_from(items.len()).map_err(|_| EncodeError::TooLarge {
                    what: "tuple",
                    len: items.len(),
                })?;
                buf.push(tag::LARGE_TUPLE);
                buf.extend_from_slice(&arity.to_be_bytes());
            }
            for item in items {
                encode_term(item, buf)?;
            }
        }
        Term::List(items) if items.is_empty() => buf.push(tag::NIL),
        Term::List(items) => {
            let len = u32::try_from(items.len()).map_err(|_| EncodeError::TooLarge {
                what: "list",
                len: items.len(),
            })?;
            buf.push(tag::LIST);
            buf.extend_from_slice(&len.to_be_bytes());
            for item in items {
                encode_term(item, buf)?;
            }
            buf.push(tag::NIL);
        }
        Term::Pid(pid) => {
            buf.push(tag::NEW_PID);
            encode_atom(&pid.node, buf)?;
            buf.extend_from_slice(&pid.id.to_be_bytes());
            buf.extend_from_slice(&pid.serial.to_be_bytes());
            buf.extend_from_slice(&pid.creation.to_be_bytes());
        }
    }
    Ok(())
}

fn encode_integer(v: i64, buf: &mut Vec<u8>) {
    if (0..=255).contains(&v) {
        buf.push(tag::SMALL_INTEGER);
        buf.push(v as u8);
    } else if let Ok(small) = i32::try_from(v) {
        buf.push(tag::INTEGER);
        buf.extend_from_slice(&small.to_be_bytes());
    } else {
        let digits = v.unsigned_abs().to_le_bytes();
        let n = 8 - digits.iter().rev().take_while(|d| **d == 0).count();
        buf.push(tag::SMALL_BIG);
        buf.push(n as u8);
        buf.push(u8::from(v < 0));
        buf.extend_from_slice(&digits[..n]);
    }
}

fn encode_atom(atom: &Atom, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
    let bytes = atom.as_str().as_bytes();
    if let Ok(len) = u8::try_from(bytes.len()) {
        buf.push(tag::SMALL_ATOM_UTF8);
        buf.push(len);
    } else {
        let len = u16::try_from(bytes.len()).map_err(|_| EncodeError::AtomTooLong(bytes.len()))?;
        buf.push(tag::ATOM_UTF8);
        buf.extend_from_slice(&len.to_be_bytes());
    }
    buf.extend_from_slice(bytes);
    Ok(())
}

/// Decode one complete term (version byte included) from `data`.
pub fn decode(data: &[u8]) -> Result<Term, DecodeError> {
    let mut dec = Decoder { buf: data, pos: 0 };
    let version = dec.u8()?;
    if version != VERSION {
        return Err(DecodeError::BadVersion(version));
    }
    let term = dec.term(0)?;
    let rest = data.len() - dec.pos;
    if rest > 0 {
        return Err(DecodeError::TrailingBytes(rest));
    }
    Ok(term)
}

struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.buf.len())
            .ok_or(DecodeError::Truncated(self.pos))?;
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, DecodeError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Element count for a collection, bounded by the bytes left so a
    /// bogus length cannot force a huge allocation.
    fn capacity_hint(&self, len: usize) -> usize {
        len.min(self.buf.len() - self.pos)
    }

    fn term(&mut self, depth: usize) -> Result<Term, DecodeError> {
        if depth > MAX_DEPTH {
            return Err(DecodeError::TooDeep);
        }
        let offset = self.pos;
        let t = self.u8()?;
        match t {
            tag::SMALL_INTEGER => Ok(Term::Integer(self.u8()? as i64)),
            tag::INTEGER => Ok(Term::Integer(self.u32()? as i32 as i64)),
            tag::SMALL_BIG => {
                let n = self.u8()? as usize;
                let sign = self.u8()?;
                let digits = self.take(n)?;
                big_to_i64(sign, digits).map(Term::Integer)
            }
            tag::ATOM | tag::SMALL_ATOM | tag::ATOM_UTF8 | tag::SMALL_ATOM_UTF8 => {
                self.atom_body(t).map(Term::Atom)
            }
            tag::SMALL_TUPLE | tag::LARGE_TUPLE => {
                let arity = if t == tag::SMALL_TUPLE {
                    self.u8()? as usize
                } else {
                    self.u32()? as usize
                };
                let mut items = Vec::with_capacity(self.capacity_hint(arity));
                for _ in 0..arity {
                    items.push(self.term(depth + 1)?);
                }
                Ok(Term::Tuple(items))
            }
            tag::NIL => Ok(Term::List(Vec::new())),
            tag::STRING => {
                let len = self.u16()? as usize;
                let bytes = self.take(len)?;
                Ok(Term::List(
                    bytes.iter().map(|b| Term::Integer(*b as i64)).collect(),
                ))
            }
            tag::LIST => {
                let len = self.u32()? as usize;
                let mut items = Vec::with_capacity(self.capacity_hint(len));
                for _ in 0..len {
                    items.push(self.term(depth + 1)?);
                }
                match self.term(depth + 1)? {
                    Term::List(tail) if tail.is_empty() => Ok(Term::List(items)),
                    _ => Err(DecodeError::ImproperList),
                }
            }
            tag::BINARY => {
                let len = self.u32()? as usize;
                Ok(Term::Binary(self.take(len)?.to_vec()))
            }
            tag::PID | tag::NEW_PID => {
                let node_tag = self.u8()?;
                if !matches!(
                    node_tag,
                    tag::ATOM | tag::SMALL_ATOM | tag::ATOM_UTF8 | tag::SMALL_ATOM_UTF8
                ) {
                    return Err(DecodeError::InvalidPid);
                }
                let node = self.atom_body(node_tag)?;
                let id = self.u32()?;
                let serial = self.u32()?;
                let creation = if t == tag::PID {
                    self.u8()? as u32
                } else {
                    self.u32()?
                };
                Ok(Term::Pid(Pid {
                    node,
                    id,
                    serial,
                    creation,
                }))
            }
            other => Err(DecodeError::UnknownTag { tag: other, offset }),
        }
    }

    /// Atom payload after its tag byte.
    fn atom_body(&mut self, t: u8) -> Result<Atom, DecodeError> {
        let len = match t {
            tag::SMALL_ATOM | tag::SMALL_ATOM_UTF8 => self.u8()? as usize,
            _ => self.u16()? as usize,
        };
        let bytes = self.take(len)?;
        let name = match t {
            // latin-1 maps byte-for-byte onto the first 256 code points
            tag::ATOM | tag::SMALL_ATOM => bytes.iter().map(|b| *b as char).collect(),
            _ => std::str::from_utf8(bytes)
                .map_err(|_| DecodeError::InvalidAtom)?
                .to_string(),
        };
        Ok(Atom::new(name))
    }
}

fn big_to_i64(sign: u8, digits: &[u8]) -> Result<i64, DecodeError> {
    if digits.iter().skip(8).any(|d| *d != 0) {
        return Err(DecodeError::IntegerOverflow);
    }
    let mut magnitude: u64 = 0;
    for (i, d) in digits.iter().take(8).enumerate() {
        magnitude |= (*d as u64) << (8 * i);
    }
    let value = if sign == 0 {
        magnitude as i128
    } else {
        -(magnitude as i128)
    };
    i64::try_from(value).map_err(|_| DecodeError::IntegerOverflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_known_bytes() {
        // {ok,<<"hi">>} as produced by term_to_binary/1
        let bytes = [
            131, 104, 2, 100, 0, 2, b'o', b'k', 109, 0, 0, 0, 2, b'h', b'i',
        ];
        let term = decode(&bytes).unwrap();
        assert_eq!(
            term,
            Term::tuple(vec![Term::atom("ok"), Term::binary("hi")])
        );
    }

    #[test]
    fn test_decode_string_ext_is_byte_list() {
        let bytes = [131, 107, 0, 3, b'a', b'b', b'c'];
        assert_eq!(decode(&bytes).unwrap(), Term::charlist("abc"));
    }

    #[test]
    fn test_integer_tag_selection() {
        assert_eq!(encode(&Term::Integer(7)).unwrap(), vec![131, 97, 7]);
        assert_eq!(
            encode(&Term::Integer(-1)).unwrap(),
            vec![131, 98, 0xff, 0xff, 0xff, 0xff]
        );
        // 2^32 needs a bignum: 5 little-endian digits, positive
        assert_eq!(
            encode(&Term::Integer(1 << 32)).unwrap(),
            vec![131, 110, 5, 0, 0, 0, 0, 0, 1]
        );
    }

    #[test]
    fn test_bignum_limits() {
        for v in [i64::MAX, i64::MIN, -(1 << 40), 1 << 33] {
            let bytes = encode(&Term::Integer(v)).unwrap();
            assert_eq!(decode(&bytes).unwrap(), Term::Integer(v));
        }

        // 2^64 does not fit
        let bytes = [131, 110, 9, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1];
        assert_eq!(decode(&bytes), Err(DecodeError::IntegerOverflow));
    }

    #[test]
    fn test_pid_preserved_verbatim() {
        let pid = Term::Pid(Pid {
            node: Atom::from("nefs@host"),
            id: 91,
            serial: 3,
            creation: 0x1234_5678,
        });
        let bytes = encode(&pid).unwrap();
        assert_eq!(bytes[1], tag::NEW_PID);
        assert_eq!(decode(&bytes).unwrap(), pid);
    }

    #[test]
    fn test_old_pid_ext() {
        let mut bytes = vec![131, tag::PID, tag::SMALL_ATOM, 1, b'n'];
        bytes.extend_from_slice(&5u32.to_be_bytes());
        bytes.extend_from_slice(&0u32.to_be_bytes());
        bytes.push(2);
        let Term::Pid(pid) = decode(&bytes).unwrap() else {
            panic!("expected pid");
        };
        assert_eq!(pid.node.as_str(), "n");
        assert_eq!((pid.id, pid.serial, pid.creation), (5, 0, 2));
    }

    #[test]
    fn test_truncated_input() {
        let bytes = encode(&Term::binary("hello")).unwrap();
        for cut in 1..bytes.len() {
            assert!(
                matches!(decode(&bytes[..cut]), Err(DecodeError::Truncated(_))),
                "cut at {}",
                cut
            );
        }
        assert_eq!(decode(&[]), Err(DecodeError::Truncated(0)));
    }

    #[test]
    fn test_bad_version_and_unknown_tag() {
        assert_eq!(decode(&[130, 106]), Err(DecodeError::BadVersion(130)));
        // NEW_FLOAT_EXT is not part of the supported subset
        assert_eq!(
            decode(&[131, 70, 0, 0, 0, 0, 0, 0, 0, 0]),
            Err(DecodeError::UnknownTag { tag: 70, offset: 1 })
        );
    }

    #[test]
    fn test_improper_list_rejected() {
        // [1|2]
        let bytes = [131, 108, 0, 0, 0, 1, 97, 1, 97, 2];
        assert_eq!(decode(&bytes), Err(DecodeError::ImproperList));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        assert_eq!(decode(&[131, 106, 0]), Err(DecodeError::TrailingBytes(1)));
    }

    #[test]
    fn test_depth_limit() {
        let mut bytes = vec![131];
        for _ in 0..=MAX_DEPTH + 1 {
            bytes.extend_from_slice(&[104, 1]);
        }
        bytes.push(106);
        assert_eq!(decode(&bytes), Err(DecodeError::TooDeep));
    }

    #[test]
    fn test_huge_declared_length_does_not_allocate() {
        // LIST_EXT claiming u32::MAX elements with nothing behind it
        let bytes = [131, 108, 0xff, 0xff, 0xff, 0xff];
        assert!(matches!(decode(&bytes), Err(DecodeError::Truncated(_))));
    }

    #[test]
    fn test_latin1_atom() {
        let bytes = [131, 115, 2, 0xe5, b'x'];
        assert_eq!(decode(&bytes).unwrap(), Term::atom("åx"));
    }
}
