//! Multiway - concurrent in-memory B-trees with per-node locking.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Tree<K, V>                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │        Operations (index/btree/tree.rs)                  │   │
//! │  │  insert (split on the way down) | find | range          │   │
//! │  │  remove (borrow / merge on the way down) | traverse     │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │        Nodes (index/btree/node.rs)                       │   │
//! │  │   Arc<RwLock<Node>>: keys | values | children | links    │   │
//! │  │   split | split_leaf | split_internal | append           │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │        Common (common/)                                  │   │
//! │  │     TreeConfig = Degree + Layout | Error | constants     │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Layouts
//! - [`Layout::Keyed`] - B-tree: every key with its value, at every level
//! - [`Layout::LeafValue`] - B+-tree: values only in leaves, leaves chained
//!   for range scans, internal nodes hold separator copies
//!
//! # Modules
//! - [`common`] - Shared primitives (Degree, Layout, Error, config)
//! - [`index`] - The tree and its nodes
//!
//! # Quick Start
//! ```
//! use multiway::Tree;
//!
//! let tree = Tree::btree(2).unwrap();
//! for key in [10, 20, 5, 6, 12, 30, 7, 17] {
//!     tree.insert(key, key * 100);
//! }
//! tree.remove(&6);
//!
//! assert_eq!(tree.find(&12), Some(1200));
//! assert_eq!(tree.keys(), vec![5, 7, 10, 12, 17, 20, 30]);
//! assert!(tree.validate().is_ok());
//! ```

pub mod common;
pub mod index;

// Re-export commonly used items at crate root for convenience
pub use common::config::{DEFAULT_BPLUS_DEGREE, DEFAULT_BTREE_DEGREE, MIN_DEGREE};
pub use common::{Degree, Error, Layout, Result, TreeConfig};

pub use index::btree::{Node, NodeRef, StatsSnapshot, Tree, TreeStats};
