//! Concurrent B-tree / B+-tree index.
//!
//! One engine serves both layouts (see [`Layout`](crate::Layout)):
//! keyed nodes carry a value for every key at every level, leaf-value nodes
//! keep values in chained leaves and route with separator copies.
//!
//! # Components
//! - [`Tree`] - Insert, lookup, delete, range scan and traversal
//! - [`Node`] - A lock-protected node and its positional primitives
//! - [`NodeRef`] / [`NodeReadGuard`] / [`NodeWriteGuard`] - Owning node handles
//! - [`TreeStats`] - Structural statistics

mod node;
mod stats;
mod tree;
mod validate;

pub use node::{Node, NodeReadGuard, NodeRef, NodeWriteGuard};
pub use stats::{StatsSnapshot, TreeStats};
pub use tree::Tree;
