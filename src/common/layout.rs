//! Node content layout.

use std::fmt;

/// Where a tree keeps its values.
///
/// Fixed for the lifetime of a tree; every node of the tree shares it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layout {
    /// Values live next to their keys at every level (B-tree).
    Keyed,

    /// Values live only in leaves; internal nodes hold separator copies and
    /// leaves are chained in ascending order (B+-tree).
    LeafValue,
}

impl Layout {
    /// Whether internal nodes of this layout carry values.
    #[inline]
    pub fn values_in_internal_nodes(&self) -> bool {
        matches!(self, Layout::Keyed)
    }

    /// Whether leaves of this layout are linked into a chain.
    #[inline]
    pub fn has_leaf_chain(&self) -> bool {
        matches!(self, Layout::LeafValue)
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layout::Keyed => write!(f, "B-Tree"),
            Layout::LeafValue => write!(f, "B+ Tree"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_flags() {
        assert!(Layout::Keyed.values_in_internal_nodes());
        assert!(!Layout::Keyed.has_leaf_chain());
        assert!(!Layout::LeafValue.values_in_internal_nodes());
        assert!(Layout::LeafValue.has_leaf_chain());
    }

    #[test]
    fn test_layout_display() {
        assert_eq!(format!("{}", Layout::Keyed), "B-Tree");
        assert_eq!(format!("{}", Layout::LeafValue), "B+ Tree");
    }
}
