//! Reply matcher.
//!
//! Backend replies are classified by trying a list of tuple shapes in
//! declared order. A shape is a [`Pattern`] built from literal atoms,
//! wildcards and named holes ([`Var`]). A successful match yields
//! [`Bindings`], from which the handler pulls typed fields.
//!
//! ```rust,ignore
//! const DIRECTORY: Pattern = Pattern::Tuple(&[
//!     Pattern::Atom("directory"),
//!     Pattern::Var(Var::Mode),
//!     Pattern::Var(Var::Nlink),
//! ]);
//!
//! let (_, b) = match_any(&reply, &[DIRECTORY])?;
//! let mode = b.integer(Var::Mode)?;
//! ```
//!
//! Patterns are plain `const` data and can be shared freely between threads.

use crate::protocol::{Pid, Term, TermKind};
use std::fmt;

/// Hole identifiers. Closed set: one per field any handler extracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Var {
    Mode,
    Nlink,
    Size,
    Listing,
    Fd,
    Data,
}

impl Var {
    const COUNT: usize = 6;

    fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Var::Mode => "Mode",
            Var::Nlink => "Nlink",
            Var::Size => "Size",
            Var::Listing => "Listing",
            Var::Fd => "Fd",
            Var::Data => "Data",
        }
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A term template.
#[derive(Debug, Clone, Copy)]
pub enum Pattern {
    /// Matches any term without binding it.
    Any,
    /// Matches exactly this atom.
    Atom(&'static str),
    /// Binds the term. A hole used twice must bind equal terms.
    Var(Var),
    /// Matches a tuple of the same arity, element by element.
    Tuple(&'static [Pattern]),
}

impl Pattern {
    fn bind<'t>(&self, term: &'t Term, bindings: &mut Bindings<'t>) -> bool {
        match self {
            Pattern::Any => true,
            Pattern::Atom(name) => term.is_atom(name),
            Pattern::Var(var) => {
                let slot = &mut bindings.slots[var.index()];
                match slot {
                    Some(bound) => *bound == term,
                    None => {
                        *slot = Some(term);
                        true
                    }
                }
            }
            Pattern::Tuple(elements) => match term {
                Term::Tuple(items) if items.len() == elements.len() => elements
                    .iter()
                    .zip(items)
                    .all(|(p, t)| p.bind(t, bindings)),
                _ => false,
            },
        }
    }

    /// Match a single pattern.
    pub fn matches<'t>(&self, term: &'t Term) -> Option<Bindings<'t>> {
        let mut bindings = Bindings::default();
        self.bind(term, &mut bindings).then_some(bindings)
    }
}

/// Why a reply could not be turned into a result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatchError {
    #[error("reply matched none of the expected shapes")]
    NoMatch,

    #[error("{var} is a {found}, expected {expected}")]
    TypeMismatch {
        var: Var,
        expected: TermKind,
        found: TermKind,
    },

    #[error("{0} is not bound by the matched pattern")]
    Unbound(Var),

    #[error("{0} is out of range")]
    OutOfRange(Var),
}

/// Sub-terms bound by a successful match, indexed by [`Var`].
#[derive(Debug, Clone, Default)]
pub struct Bindings<'t> {
    slots: [Option<&'t Term>; Var::COUNT],
}

impl<'t> Bindings<'t> {
    pub fn get(&self, var: Var) -> Option<&'t Term> {
        self.slots[var.index()]
    }

    fn bound(&self, var: Var) -> Result<&'t Term, MatchError> {
        self.get(var).ok_or(MatchError::Unbound(var))
    }

    /// Fetch a bound sub-term, checking its primitive kind.
    pub fn extract(&self, var: Var, expected: TermKind) -> Result<&'t Term, MatchError> {
        let term = self.bound(var)?;
        if term.kind() != expected {
            return Err(mismatch(var, expected, term));
        }
        Ok(term)
    }

    pub fn integer(&self, var: Var) -> Result<i64, MatchError> {
        match self.bound(var)? {
            Term::Integer(v) => Ok(*v),
            other => Err(mismatch(var, TermKind::Integer, other)),
        }
    }

    /// Integer converted to a narrower or unsigned type.
    pub fn integer_as<T: TryFrom<i64>>(&self, var: Var) -> Result<T, MatchError> {
        T::try_from(self.integer(var)?).map_err(|_| MatchError::OutOfRange(var))
    }

    pub fn binary(&self, var: Var) -> Result<&'t [u8], MatchError> {
        match self.bound(var)? {
            Term::Binary(bytes) => Ok(bytes),
            other => Err(mismatch(var, TermKind::Binary, other)),
        }
    }

    pub fn list(&self, var: Var) -> Result<&'t [Term], MatchError> {
        match self.bound(var)? {
            Term::List(items) => Ok(items),
            other => Err(mismatch(var, TermKind::List, other)),
        }
    }

    pub fn pid(&self, var: Var) -> Result<&'t Pid, MatchError> {
        match self.bound(var)? {
            Term::Pid(pid) => Ok(pid),
            other => Err(mismatch(var, TermKind::Pid, other)),
        }
    }
}

fn mismatch(var: Var, expected: TermKind, found: &Term) -> MatchError {
    MatchError::TypeMismatch {
        var,
        expected,
        found: found.kind(),
    }
}

/// Try `patterns` in order; return the index of the first match and its bindings.
pub fn match_any<'t>(
    term: &'t Term,
    patterns: &[Pattern],
) -> Result<(usize, Bindings<'t>), MatchError> {
    patterns
        .iter()
        .enumerate()
        .find_map(|(i, p)| p.matches(term).map(|b| (i, b)))
        .ok_or(MatchError::NoMatch)
}
