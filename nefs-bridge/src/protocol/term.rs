//! In-memory representation of backend terms.

use std::fmt;

/// A symbolic tag such as `ok`, `error` or `directory`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Atom(String);

impl Atom {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Atom {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque backend process identifier.
///
/// The bridge never looks inside a pid; it only carries it from an `open`
/// reply into later `pread` requests, so every field is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pid {
    pub node: Atom,
    pub id: u32,
    pub serial: u32,
    pub creation: u32,
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}.{}.{}>", self.node, self.id, self.serial)
    }
}

/// A decoded backend value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    Integer(i64),
    Binary(Vec<u8>),
    /// Proper list; the empty list is `List(vec![])`.
    List(Vec<Term>),
    Tuple(Vec<Term>),
    Atom(Atom),
    Pid(Pid),
}

/// Primitive kind of a [`Term`], used by matcher guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermKind {
    Integer,
    Binary,
    List,
    Tuple,
    Atom,
    Pid,
}

impl fmt::Display for TermKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TermKind::Integer => "integer",
            TermKind::Binary => "binary",
            TermKind::List => "list",
            TermKind::Tuple => "tuple",
            TermKind::Atom => "atom",
            TermKind::Pid => "pid",
        };
        f.write_str(name)
    }
}

impl Term {
    pub fn atom(name: &str) -> Self {
        Term::Atom(Atom::from(name))
    }

    pub fn binary(bytes: impl Into<Vec<u8>>) -> Self {
        Term::Binary(bytes.into())
    }

    pub fn tuple(elements: impl Into<Vec<Term>>) -> Self {
        Term::Tuple(elements.into())
    }

    pub fn list(elements: impl Into<Vec<Term>>) -> Self {
        Term::List(elements.into())
    }

    /// Build a character list (the backend's plain string form).
    pub fn charlist(s: &str) -> Self {
        Term::List(s.chars().map(|c| Term::Integer(c as i64)).collect())
    }

    pub fn kind(&self) -> TermKind {
        match self {
            Term::Integer(_) => TermKind::Integer,
            Term::Binary(_) => TermKind::Binary,
            Term::List(_) => TermKind::List,
            Term::Tuple(_) => TermKind::Tuple,
            Term::Atom(_) => TermKind::Atom,
            Term::Pid(_) => TermKind::Pid,
        }
    }

    /// True if this term is the atom `name`.
    pub fn is_atom(&self, name: &str) -> bool {
        matches!(self, Term::Atom(a) if a.as_str() == name)
    }
}

impl From<i64> for Term {
    fn from(v: i64) -> Self {
        Term::Integer(v)
    }
}

impl From<Atom> for Term {
    fn from(a: Atom) -> Self {
        Term::Atom(a)
    }
}

impl From<Pid> for Term {
    fn from(p: Pid) -> Self {
        Term::Pid(p)
    }
}

fn write_seq(f: &mut fmt::Formatter<'_>, items: &[Term]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(",")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

/// Renders terms in the backend's literal syntax, for logs.
impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Integer(v) => write!(f, "{}", v),
            Term::Binary(bytes) => write!(f, "<<\"{}\">>", String::from_utf8_lossy(bytes)),
            Term::List(items) => {
                f.write_str("[")?;
                write_seq(f, items)?;
                f.write_str("]")
            }
            Term::Tuple(items) => {
                f.write_str("{")?;
                write_seq(f, items)?;
                f.write_str("}")
            }
            Term::Atom(a) => write!(f, "{}", a),
            Term::Pid(p) => write!(f, "{}", p),
        }
    }
}
