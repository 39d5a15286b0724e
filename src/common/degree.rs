//! Minimum degree of a tree.

use std::fmt;

use crate::common::config::MIN_DEGREE;
use crate::common::{Error, Result};

/// Minimum branching factor `d` of a tree.
///
/// Bounds every non-root node to `d - 1 ..= 2d - 1` keys. Only values of
/// at least [`MIN_DEGREE`] can be constructed.
///
/// # Example
/// ```
/// use multiway::Degree;
///
/// let degree = Degree::new(3).unwrap();
/// assert_eq!(degree.min_keys(), 2);
/// assert_eq!(degree.max_keys(), 5);
/// assert!(Degree::new(1).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Degree(pub(crate) usize);

impl Degree {
    /// Create a new degree.
    ///
    /// # Errors
    /// Returns `Error::InvalidDegree` if `d` is below [`MIN_DEGREE`].
    pub fn new(d: usize) -> Result<Self> {
        if d < MIN_DEGREE {
            return Err(Error::InvalidDegree(d));
        }
        Ok(Degree(d))
    }

    /// The raw value of `d`.
    #[inline]
    pub fn get(&self) -> usize {
        self.0
    }

    /// Fewest keys a non-root node may hold (`d - 1`).
    #[inline]
    pub fn min_keys(&self) -> usize {
        self.0 - 1
    }

    /// Most keys any node may hold (`2d - 1`).
    #[inline]
    pub fn max_keys(&self) -> usize {
        2 * self.0 - 1
    }

    /// Most children an internal node may hold (`2d`).
    #[inline]
    pub fn max_children(&self) -> usize {
        2 * self.0
    }
}

impl fmt::Display for Degree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
