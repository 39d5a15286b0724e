//! Error types for the tree engine.

use thiserror::Error;

/// Convenient Result type alias.
///
/// Instead of writing `Result<T, Error>` everywhere, we can write `Result<T>`.
pub type Result<T> = std::result::Result<T, Error>;

/// All errors produced by node primitives and tree construction.
///
/// Missing keys and duplicate keys are *not* errors: the tree reports them
/// through `Option` and `bool` results. Everything here signals either a bad
/// configuration or a broken internal invariant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A node accessor or mutator was given a position outside its bounds.
    ///
    /// This indicates a bug in the tree algorithms, not a user error.
    #[error("{what} index {index} out of range (len {len})")]
    IndexOutOfRange {
        what: &'static str,
        index: usize,
        len: usize,
    },

    /// A leaf-only or internal-only primitive was used on the wrong kind of node.
    #[error("invalid operation: {0}")]
    InvalidOperation(&'static str),

    /// The requested minimum degree is below 2.
    #[error("invalid degree {0}: minimum degree is 2")]
    InvalidDegree(usize),

    /// A structural check found a node that breaks the tree invariants.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}

impl Error {
    pub(crate) fn out_of_range(what: &'static str, index: usize, len: usize) -> Self {
        Error::IndexOutOfRange { what, index, len }
    }
}
