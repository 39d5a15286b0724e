//! Configuration for tree instances.

use crate::common::{Degree, Layout, Result};

/// Smallest legal minimum degree.
///
/// With `d = 2` every node holds 1 to 3 keys (a 2-3-4 tree). Anything
/// smaller cannot satisfy the split invariant: a full node must leave at
/// least `d - 1` keys on each side of its median.
pub const MIN_DEGREE: usize = 2;

/// Default minimum degree for the keyed layout.
pub const DEFAULT_BTREE_DEGREE: usize = 3;

/// Default minimum degree for the leaf-value layout.
pub const DEFAULT_BPLUS_DEGREE: usize = 4;

/// Construction parameters of a tree.
///
/// Both fields are fixed for the lifetime of the tree.
///
/// # Example
/// ```
/// use multiway::{Layout, TreeConfig};
///
/// let config = TreeConfig::new(Layout::LeafValue, 8).unwrap();
/// assert_eq!(config.degree().get(), 8);
/// assert!(TreeConfig::new(Layout::Keyed, 1).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeConfig {
    degree: Degree,
    layout: Layout,
}

impl TreeConfig {
    /// Create a configuration.
    ///
    /// # Errors
    /// Returns `Error::InvalidDegree` if `degree` is below [`MIN_DEGREE`].
    pub fn new(layout: Layout, degree: usize) -> Result<Self> {
        Ok(Self {
            degree: Degree::new(degree)?,
            layout,
        })
    }

    /// Keyed layout with [`DEFAULT_BTREE_DEGREE`].
    pub fn keyed() -> Self {
        Self {
            degree: Degree(DEFAULT_BTREE_DEGREE),
            layout: Layout::Keyed,
        }
    }

    /// Leaf-value layout with [`DEFAULT_BPLUS_DEGREE`].
    pub fn leaf_value() -> Self {
        Self {
            degree: Degree(DEFAULT_BPLUS_DEGREE),
            layout: Layout::LeafValue,
        }
    }

    #[inline]
    pub fn degree(&self) -> Degree {
        self.degree
    }

    #[inline]
    pub fn layout(&self) -> Layout {
        self.layout
    }
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self::keyed()
    }
}
