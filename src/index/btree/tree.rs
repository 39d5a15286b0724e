//! Tree - the orchestrator that keeps every node within its bounds.
//!
//! The [`Tree`] provides:
//! - Insert with proactive (top-down) splitting
//! - Lookup, inclusive range scan and ordered traversal
//! - Delete with proactive borrow/merge rebalancing
//! - Root growth and collapse

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::common::{Degree, Error, Layout, Result, TreeConfig};
use crate::index::btree::node::{Node, NodeReadGuard, NodeRef, NodeWriteGuard};
use crate::index::btree::stats::TreeStats;
use crate::index::btree::validate;

/// The root slot: current root node plus the element counter.
///
/// The counter belongs to a *generation* of the tree rather than to one root
/// node: root growth and collapse keep it, `clear()` starts a new one, so a
/// writer still finishing on a cleared tree cannot skew the new count.
struct Root<K, V> {
    node: NodeRef<K, V>,
    len: Arc<AtomicUsize>,
}

impl<K, V> Root<K, V> {
    fn empty(config: TreeConfig) -> Self {
        Self {
            node: Node::new_ref(true, config),
            len: Arc::new(AtomicUsize::new(0)),
        }
    }
}

/// Outcome of one delete descent.
struct Removal {
    removed: bool,
    /// A merge left the root internal with no keys.
    root_emptied: bool,
}

/// A concurrent ordered map backed by a B-tree or a B+-tree.
///
/// # Architecture
/// ```text
/// ┌──────────────────────────────────────────────────────────────┐
/// │                           Tree                               │
/// │  ┌─────────────────────────┐   ┌──────────────────────────┐  │
/// │  │ root: RwLock<Root>      │   │ stats: TreeStats         │  │
/// │  │  node ─┐   len (atomic) │   │ config: degree + layout  │  │
/// │  └────────┼────────────────┘   └──────────────────────────┘  │
/// │           ▼                                                  │
/// │      [RwLock<Node>] ── children own ──▶ [RwLock<Node>] ...    │
/// │           ▲                                  │               │
/// │           └──────── weak parent link ────────┘               │
/// │      leaf-value layout: leaf ──next_leaf──▶ leaf ──▶ ...     │
/// └──────────────────────────────────────────────────────────────┘
/// ```
///
/// # Thread Safety
/// - `root`: `RwLock`, shared while a descent picks up the root node,
///   exclusive only while the root pointer is replaced or the tree cleared
/// - every node: its own `RwLock`; a descent locks the child before it
///   releases the parent
/// - `len` and `stats`: atomic counters
///
/// Locks are always taken top-down and, among siblings, left to right. No
/// operation ever waits on an ancestor while holding a descendant, which is
/// what keeps concurrent operations free of deadlock.
///
/// # Usage
/// ```
/// use multiway::{Tree, TreeConfig};
///
/// let tree = Tree::new(TreeConfig::leaf_value());
/// assert!(tree.insert(10, "ten"));
/// assert!(tree.insert(20, "twenty"));
/// assert!(!tree.insert(10, "again"));
///
/// assert_eq!(tree.find(&10), Some("ten"));
/// assert_eq!(tree.range(&5, &15), vec![(10, "ten")]);
/// assert!(tree.remove(&20));
/// assert_eq!(tree.len(), 1);
/// ```
pub struct Tree<K, V> {
    root: RwLock<Root<K, V>>,
    config: TreeConfig,
    stats: TreeStats,
}

impl<K, V> Tree<K, V> {
    /// Create an empty tree.
    pub fn new(config: TreeConfig) -> Self {
        Self {
            root: RwLock::new(Root::empty(config)),
            config,
            stats: TreeStats::new(),
        }
    }

    /// Create an empty keyed-layout tree (B-tree) of minimum degree `degree`.
    ///
    /// # Errors
    /// Returns `Error::InvalidDegree` if `degree < 2`.
    pub fn btree(degree: usize) -> Result<Self> {
        Ok(Self::new(TreeConfig::new(Layout::Keyed, degree)?))
    }

    /// Create an empty leaf-value-layout tree (B+-tree) of minimum degree `degree`.
    ///
    /// # Errors
    /// Returns `Error::InvalidDegree` if `degree < 2`.
    pub fn bplus(degree: usize) -> Result<Self> {
        Ok(Self::new(TreeConfig::new(Layout::LeafValue, degree)?))
    }

    // ========================================================================
    // Public API: Configuration and size
    // ========================================================================

    /// Degree and layout, fixed at construction.
    pub fn config(&self) -> TreeConfig {
        self.config
    }

    /// Where this tree keeps its values.
    pub fn layout(&self) -> Layout {
        self.config.layout()
    }

    /// Minimum degree of every node.
    pub fn degree(&self) -> Degree {
        self.config.degree()
    }

    /// Structural statistics.
    pub fn stats(&self) -> &TreeStats {
        &self.stats
    }

    /// Number of key/value pairs.
    pub fn len(&self) -> usize {
        self.root.read().len.load(Ordering::Relaxed)
    }

    /// True when the tree holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every entry, replacing the root with a fresh empty leaf.
    pub fn clear(&self) {
        let mut root = self.root.write();
        *root = Root::empty(self.config);
        tracing::debug!(layout = %self.layout(), "cleared tree");
    }

    /// Move the contents out, leaving this tree empty with the same configuration.
    pub fn take(&self) -> Self {
        let mut root = self.root.write();
        let contents = std::mem::replace(&mut *root, Root::empty(self.config));
        Self {
            root: RwLock::new(contents),
            config: self.config,
            stats: TreeStats::new(),
        }
    }

    /// Check every structural invariant of the tree.
    ///
    /// Holds a shared lock on the root node for the whole walk, so the check
    /// sees one consistent state.
    ///
    /// # Errors
    /// Returns `Error::InvariantViolation` describing the first broken rule.
    pub fn validate(&self) -> Result<()>
    where
        K: Ord,
    {
        let root = self.root.read();
        validate::check_tree(&root.node, Some(root.len.load(Ordering::Relaxed)), self.config)
    }

    /// Check the per-node invariants only: key order, occupancy, child counts,
    /// separator bounds, parent links and leaf depth.
    ///
    /// Unlike [`validate`](Self::validate) this holds while writers are
    /// active, so it can run concurrently with inserts and removes.
    ///
    /// # Errors
    /// Returns `Error::InvariantViolation` describing the first broken rule.
    pub fn validate_nodes(&self) -> Result<()>
    where
        K: Ord,
    {
        let root = self.root.read();
        validate::check_tree(&root.node, None, self.config)
    }

    /// Debug dump of the node structure, one node per line indented by depth.
    ///
    /// Diagnostic only; the format is not stable.
    pub fn dump(&self) -> String
    where
        K: fmt::Debug,
    {
        self.to_string()
    }

    /// Shared lock on the current root node.
    fn lock_root_shared(&self) -> NodeReadGuard<K, V> {
        let root = self.root.read();
        root.node.read_arc()
    }
}

impl<K: Ord + Clone, V: Clone> Tree<K, V> {
    // ========================================================================
    // Public API: Point operations
    // ========================================================================

    /// Insert `key` with `value`.
    ///
    /// Returns `false`, leaving the entries untouched, if `key` is present.
    pub fn insert(&self, key: K, value: V) -> bool {
        fatal(self.insert_entry(key, value))
    }

    /// Value stored under `key`, if any.
    pub fn find(&self, key: &K) -> Option<V> {
        fatal(self.with_value(key, V::clone))
    }

    /// Whether `key` is present, without cloning its value.
    pub fn contains_key(&self, key: &K) -> bool {
        fatal(self.with_value(key, |_| ())).is_some()
    }

    /// Remove `key`. Returns `false` if it was not present.
    pub fn remove(&self, key: &K) -> bool {
        fatal(self.remove_entry(key))
    }

    // ========================================================================
    // Public API: Ordered reads
    // ========================================================================

    /// Entries with `low <= key <= high`, ascending.
    ///
    /// Materialized fresh on every call. Empty when `low > high`.
    pub fn range(&self, low: &K, high: &K) -> Vec<(K, V)> {
        if low > high {
            return Vec::new();
        }
        fatal(self.collect(Some(low), Some(high)))
    }

    /// Every entry, ascending.
    pub fn entries(&self) -> Vec<(K, V)> {
        fatal(self.collect(None, None))
    }

    /// Every key, ascending.
    pub fn keys(&self) -> Vec<K> {
        self.entries().into_iter().map(|(key, _)| key).collect()
    }

    /// Call `visitor` on every entry in ascending key order.
    ///
    /// The entries are collected first; the visitor runs with no node locked
    /// and may call back into the tree.
    pub fn traverse<F>(&self, mut visitor: F)
    where
        F: FnMut(&K, &V),
    {
        for (key, value) in self.entries() {
            visitor(&key, &value);
        }
    }

    /// Entry with the smallest key.
    pub fn first(&self) -> Option<(K, V)> {
        let root = self.lock_root_shared();
        fatal(edge_entry(&root, Edge::First))
    }

    /// Entry with the largest key.
    pub fn last(&self) -> Option<(K, V)> {
        let root = self.lock_root_shared();
        fatal(edge_entry(&root, Edge::Last))
    }

    // ========================================================================
    // Internal: Lookup
    // ========================================================================

    fn with_value<R>(&self, key: &K, f: impl FnOnce(&V) -> R) -> Result<Option<R>> {
        let keyed = self.layout() == Layout::Keyed;
        let mut node = self.lock_root_shared();
        loop {
            if keyed || node.is_leaf() {
                if let Some(index) = node.find_key_index(key) {
                    return Ok(Some(f(node.value(index)?)));
                }
            }
            if node.is_leaf() {
                return Ok(None);
            }
            let child = node.child(node.find_child_index(key)?)?.read_arc();
            node = child;
        }
    }

    fn collect(&self, low: Option<&K>, high: Option<&K>) -> Result<Vec<(K, V)>> {
        let mut out = Vec::new();
        let root = self.lock_root_shared();
        match self.layout() {
            Layout::Keyed => collect_in_order(&root, low, high, &mut out)?,
            Layout::LeafValue => {
                let leaf = descend_to_leaf(root, low)?;
                scan_leaf_chain(leaf, low, high, &mut out);
            }
        }
        Ok(out)
    }

    // ========================================================================
    // Internal: Insertion
    // ========================================================================

    fn insert_entry(&self, key: K, value: V) -> Result<bool> {
        let keyed = self.layout() == Layout::Keyed;
        let (mut node, len) = self.lock_root_for_insert()?;

        loop {
            if (keyed || node.is_leaf()) && node.find_key_index(&key).is_some() {
                return Ok(false);
            }
            if node.is_leaf() {
                let index = node.lower_bound(&key);
                node.insert_key(key, index)?;
                node.insert_value(value, index)?;
                len.fetch_add(1, Ordering::Relaxed);
                return Ok(true);
            }

            let mut index = node.find_child_index(&key)?;
            let mut child = node.child(index)?.write_arc();
            if child.is_full() {
                self.split_child(&mut node, index, &mut child)?;
                let separator = node.key(index)?;
                if keyed && *separator == key {
                    return Ok(false);
                }
                if *separator <= key {
                    drop(child);
                    index += 1;
                    child = node.child(index)?.write_arc();
                }
            }
            node = child;
        }
    }

    /// Exclusive lock on a root that has room for one more key.
    ///
    /// A full root gets a new empty root grown above it, and is split under
    /// that new root before anyone else can reach it. A root emptied by a
    /// merge is collapsed first.
    fn lock_root_for_insert(&self) -> Result<(NodeWriteGuard<K, V>, Arc<AtomicUsize>)> {
        loop {
            {
                let root = self.root.read();
                let guard = root.node.write_arc();
                if is_emptied_root(&guard) {
                    drop(guard);
                    drop(root);
                    self.collapse_root()?;
                    continue;
                }
                if !guard.is_full() {
                    return Ok((guard, Arc::clone(&root.len)));
                }
            }

            let mut root = self.root.write();
            let old_root = Arc::clone(&root.node);
            let len = Arc::clone(&root.len);
            {
                let current = old_root.read();
                if is_emptied_root(&current) {
                    continue;
                }
                if !current.is_full() {
                    drop(current);
                    return Ok((old_root.write_arc(), len));
                }
            }

            let new_root = Node::new_ref(false, self.config);
            let mut guard = new_root.write_arc();
            guard.insert_child(old_root, 0)?;
            root.node = new_root;
            drop(root);

            let mut child = guard.child(0)?.write_arc();
            self.split_child(&mut guard, 0, &mut child)?;
            TreeStats::bump(&self.stats.root_splits);
            tracing::debug!(degree = self.degree().get(), layout = %self.layout(), "grew a new root");
            return Ok((guard, len));
        }
    }

    /// Split the full child at `index`, promoting into `parent`.
    fn split_child(
        &self,
        parent: &mut Node<K, V>,
        index: usize,
        child: &mut Node<K, V>,
    ) -> Result<()> {
        match self.layout() {
            Layout::Keyed => {
                let (key, value, sibling) = child.split()?;
                parent.insert_key(key, index)?;
                parent.insert_value(value, index)?;
                parent.insert_child(sibling, index + 1)?;
            }
            Layout::LeafValue => {
                let (separator, sibling) = if child.is_leaf() {
                    child.split_leaf()?
                } else {
                    child.split_internal()?
                };
                parent.insert_key(separator, index)?;
                parent.insert_child(sibling, index + 1)?;
            }
        }
        TreeStats::bump(&self.stats.splits);
        tracing::trace!(index, leaf = child.is_leaf(), "split child");
        Ok(())
    }

    // ========================================================================
    // Internal: Deletion
    // ========================================================================

    fn remove_entry(&self, key: &K) -> Result<bool> {
        let (root, len) = self.lock_root_for_remove()?;
        let outcome = match self.layout() {
            Layout::Keyed => self.remove_keyed(root, key.clone())?,
            Layout::LeafValue => self.remove_leaf_value(root, key)?,
        };

        if outcome.removed {
            len.fetch_sub(1, Ordering::Relaxed);
        }
        if outcome.root_emptied {
            self.collapse_root()?;
        }
        Ok(outcome.removed)
    }

    /// Exclusive lock on the root, collapsing a root emptied by a merge first.
    ///
    /// Only the thread whose merge emptied the root ever descends through
    /// it, and its merged child is well above the minimum.
    fn lock_root_for_remove(&self) -> Result<(NodeWriteGuard<K, V>, Arc<AtomicUsize>)> {
        loop {
            let root = self.root.read();
            let guard = root.node.write_arc();
            if !is_emptied_root(&guard) {
                return Ok((guard, Arc::clone(&root.len)));
            }
            drop(guard);
            drop(root);
            self.collapse_root()?;
        }
    }

    /// Delete descent for the keyed layout.
    ///
    /// `target` starts as the key to delete and becomes the predecessor or
    /// successor once an internal key has been replaced by it.
    fn remove_keyed(&self, mut node: NodeWriteGuard<K, V>, mut target: K) -> Result<Removal> {
        let mut at_root = true;
        let mut root_emptied = false;

        loop {
            let next = match node.find_key_index(&target) {
                Some(index) if node.is_leaf() => {
                    node.remove_key(index)?;
                    node.remove_value(index)?;
                    return Ok(Removal {
                        removed: true,
                        root_emptied,
                    });
                }
                Some(index) => self.remove_from_internal(&mut node, index, &mut target)?,
                None if node.is_leaf() => {
                    return Ok(Removal {
                        removed: false,
                        root_emptied,
                    });
                }
                None => {
                    let index = node.find_child_index(&target)?;
                    self.prepare_descent(&mut node, index)?
                }
            };
            root_emptied |= at_root && node.is_empty();
            at_root = false;
            node = next;
        }
    }

    /// Delete descent for the leaf-value layout. Separators are left alone:
    /// a stale separator is still a valid bound.
    fn remove_leaf_value(&self, mut node: NodeWriteGuard<K, V>, key: &K) -> Result<Removal> {
        let mut at_root = true;
        let mut root_emptied = false;

        loop {
            if node.is_leaf() {
                let removed = match node.find_key_index(key) {
                    Some(index) => {
                        node.remove_key(index)?;
                        node.remove_value(index)?;
                        true
                    }
                    None => false,
                };
                return Ok(Removal {
                    removed,
                    root_emptied,
                });
            }

            let index = node.find_child_index(key)?;
            let next = self.prepare_descent(&mut node, index)?;
            root_emptied |= at_root && node.is_empty();
            at_root = false;
            node = next;
        }
    }

    /// The key being deleted sits at `index` of an internal keyed node.
    ///
    /// Replaces it with its predecessor or successor when a neighbouring
    /// child can spare a key, otherwise merges the two children around it.
    /// Returns the child to continue in; `target` is updated to the key that
    /// must now be deleted from that child.
    fn remove_from_internal(
        &self,
        node: &mut Node<K, V>,
        index: usize,
        target: &mut K,
    ) -> Result<NodeWriteGuard<K, V>> {
        let mut left = node.child(index)?.write_arc();
        if left.can_lend() {
            let (key, value) = edge_entry(&left, Edge::Last)?
                .ok_or_else(|| empty_subtree("predecessor"))?;
            node.replace_key(index, key.clone())?;
            node.replace_value(index, value)?;
            *target = key;
            return Ok(left);
        }

        let right = node.child(index + 1)?.write_arc();
        if right.can_lend() {
            drop(left);
            let (key, value) = edge_entry(&right, Edge::First)?
                .ok_or_else(|| empty_subtree("successor"))?;
            node.replace_key(index, key.clone())?;
            node.replace_value(index, value)?;
            *target = key;
            return Ok(right);
        }

        self.merge_children(node, index, &mut left, right)?;
        Ok(left)
    }

    /// Make sure the child at `index` can lose a key, then return it locked.
    ///
    /// Siblings are locked left to right: left sibling, child, right sibling.
    /// The returned node may be the left sibling if the child was merged
    /// into it; it covers the same key range either way.
    fn prepare_descent(
        &self,
        parent: &mut Node<K, V>,
        index: usize,
    ) -> Result<NodeWriteGuard<K, V>> {
        let mut left = match index {
            0 => None,
            _ => Some(parent.child(index - 1)?.write_arc()),
        };
        let mut child = parent.child(index)?.write_arc();
        if child.can_lend() {
            return Ok(child);
        }

        if let Some(left) = left.as_mut() {
            if left.can_lend() {
                self.borrow_from_left(parent, index, left, &mut child)?;
                return Ok(child);
            }
        }

        if index + 1 < parent.num_children() {
            let mut right = parent.child(index + 1)?.write_arc();
            if right.can_lend() {
                drop(left);
                self.borrow_from_right(parent, index, &mut child, &mut right)?;
                return Ok(child);
            }
            if left.is_none() {
                self.merge_children(parent, index, &mut child, right)?;
                return Ok(child);
            }
        }

        match left {
            Some(mut left) => {
                self.merge_children(parent, index - 1, &mut left, child)?;
                Ok(left)
            }
            // Descents collapse an emptied root before passing through it.
            None => Err(Error::InvariantViolation(format!(
                "child {} has no sibling to rebalance with",
                index
            ))),
        }
    }

    /// Rotate the last entry of `left` through the parent into `child`.
    fn borrow_from_left(
        &self,
        parent: &mut Node<K, V>,
        index: usize,
        left: &mut Node<K, V>,
        child: &mut Node<K, V>,
    ) -> Result<()> {
        let last = left.len() - 1;
        let key = left.remove_key(last)?;

        if child.is_leaf() && self.layout() == Layout::LeafValue {
            let value = left.remove_value(last)?;
            parent.replace_key(index - 1, key.clone())?;
            child.insert_key(key, 0)?;
            child.insert_value(value, 0)?;
        } else {
            let separator = parent.replace_key(index - 1, key)?;
            child.insert_key(separator, 0)?;
            if self.layout() == Layout::Keyed {
                let value = left.remove_value(last)?;
                let separator_value = parent.replace_value(index - 1, value)?;
                child.insert_value(separator_value, 0)?;
            }
            if !child.is_leaf() {
                let moved = left.remove_child(left.num_children() - 1)?;
                child.insert_child(moved, 0)?;
            }
        }

        TreeStats::bump(&self.stats.borrows);
        tracing::trace!(index, "borrowed from left sibling");
        Ok(())
    }

    /// Rotate the first entry of `right` through the parent into `child`.
    fn borrow_from_right(
        &self,
        parent: &mut Node<K, V>,
        index: usize,
        child: &mut Node<K, V>,
        right: &mut Node<K, V>,
    ) -> Result<()> {
        let key = right.remove_key(0)?;
        let end = child.len();

        if child.is_leaf() && self.layout() == Layout::LeafValue {
            let value = right.remove_value(0)?;
            child.insert_key(key, end)?;
            child.insert_value(value, end)?;
            parent.replace_key(index, right.key(0)?.clone())?;
        } else {
            let separator = parent.replace_key(index, key)?;
            child.insert_key(separator, end)?;
            if self.layout() == Layout::Keyed {
                let value = right.remove_value(0)?;
                let separator_value = parent.replace_value(index, value)?;
                child.insert_value(separator_value, end)?;
            }
            if !child.is_leaf() {
                let moved = right.remove_child(0)?;
                let position = child.num_children();
                child.insert_child(moved, position)?;
            }
        }

        TreeStats::bump(&self.stats.borrows);
        tracing::trace!(index, "borrowed from right sibling");
        Ok(())
    }

    /// Merge the child at `index + 1` into the child at `index`.
    ///
    /// The separator moves down into the merged node, except between
    /// leaf-value leaves where it is only a copy and is dropped. `right` is
    /// unlocked before it is detached from the parent.
    fn merge_children(
        &self,
        parent: &mut Node<K, V>,
        index: usize,
        left: &mut Node<K, V>,
        mut right: NodeWriteGuard<K, V>,
    ) -> Result<()> {
        let separator = parent.remove_key(index)?;
        let separator_value = match self.layout() {
            Layout::Keyed => Some(parent.remove_value(index)?),
            Layout::LeafValue => None,
        };

        if !(left.is_leaf() && self.layout() == Layout::LeafValue) {
            let end = left.len();
            left.insert_key(separator, end)?;
            if let Some(value) = separator_value {
                let end = left.num_values();
                left.insert_value(value, end)?;
            }
        }

        left.append(&mut right)?;
        drop(right);
        parent.remove_child(index + 1)?;

        TreeStats::bump(&self.stats.merges);
        tracing::trace!(index, leaf = left.is_leaf(), "merged siblings");
        Ok(())
    }

    /// Replace an internal root with no keys by its only child, repeatedly.
    fn collapse_root(&self) -> Result<()> {
        let mut root = self.root.write();
        loop {
            let survivor = {
                let mut guard = root.node.write();
                if !is_emptied_root(&guard) {
                    return Ok(());
                }
                guard.remove_child(0)?
            };
            root.node = survivor;
            TreeStats::bump(&self.stats.root_collapses);
            tracing::debug!(layout = %self.layout(), "collapsed empty root");
        }
    }
}

impl<K, V> Default for Tree<K, V> {
    fn default() -> Self {
        Self::new(TreeConfig::default())
    }
}

impl<K: Clone, V: Clone> Clone for Tree<K, V> {
    /// Deep copy: fresh nodes, copied keys and values, a rebuilt leaf chain.
    fn clone(&self) -> Self {
        let source = self.lock_root_shared();
        let mut copy = SubtreeCopy {
            leaves: Vec::new(),
            entries: 0,
            layout: self.layout(),
        };
        let node = fatal(copy.copy(&source));
        drop(source);

        if self.layout().has_leaf_chain() {
            for pair in copy.leaves.windows(2) {
                fatal(pair[0].write().set_next_leaf(Some(&pair[1])));
            }
        }

        Self {
            root: RwLock::new(Root {
                node,
                len: Arc::new(AtomicUsize::new(copy.entries)),
            }),
            config: self.config,
            stats: TreeStats::new(),
        }
    }
}

impl<K, V> fmt::Debug for Tree<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tree")
            .field("layout", &self.layout())
            .field("degree", &self.degree().get())
            .field("len", &self.len())
            .finish()
    }
}

impl<K: fmt::Debug, V> fmt::Display for Tree<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let root = self.root.read();
        writeln!(
            f,
            "{} (degree {}, size {}):",
            self.layout(),
            self.degree(),
            root.len.load(Ordering::Relaxed)
        )?;
        let node = root.node.read_arc();
        drop(root);
        write_node(f, &node, 0)
    }
}

fn write_node<K: fmt::Debug, V>(
    f: &mut fmt::Formatter<'_>,
    node: &Node<K, V>,
    depth: usize,
) -> fmt::Result {
    let kind = if node.is_leaf() { "leaf" } else { "internal" };
    writeln!(f, "{:indent$}{:?} ({})", "", node.keys(), kind, indent = depth * 4)?;
    for child in node.children() {
        write_node(f, &child.read(), depth + 1)?;
    }
    Ok(())
}

// ============================================================================
// Traversal helpers
// ============================================================================

#[derive(Clone, Copy)]
enum Edge {
    First,
    Last,
}

impl Edge {
    fn pick(self, len: usize) -> usize {
        match self {
            Edge::First => 0,
            Edge::Last => len.saturating_sub(1),
        }
    }
}

/// Smallest or largest entry of the subtree under `node`.
fn edge_entry<K: Clone, V: Clone>(node: &Node<K, V>, edge: Edge) -> Result<Option<(K, V)>> {
    let mut current: Option<NodeReadGuard<K, V>> = None;
    loop {
        let at = current.as_deref().unwrap_or(node);
        if at.is_leaf() {
            if at.is_empty() {
                return Ok(None);
            }
            let index = edge.pick(at.len());
            return Ok(Some((at.key(index)?.clone(), at.value(index)?.clone())));
        }
        let next = at.child(edge.pick(at.num_children()))?.read_arc();
        current = Some(next);
    }
}

fn descend_to_leaf<K: Ord, V>(
    mut node: NodeReadGuard<K, V>,
    key: Option<&K>,
) -> Result<NodeReadGuard<K, V>> {
    while !node.is_leaf() {
        let index = match key {
            Some(key) => node.find_child_index(key)?,
            None => 0,
        };
        let child = node.child(index)?.read_arc();
        node = child;
    }
    Ok(node)
}

/// Walk the leaf chain from `leaf`, holding each leaf until the next is locked.
fn scan_leaf_chain<K: Ord + Clone, V: Clone>(
    mut leaf: NodeReadGuard<K, V>,
    low: Option<&K>,
    high: Option<&K>,
    out: &mut Vec<(K, V)>,
) {
    loop {
        for (key, value) in leaf.keys().iter().zip(leaf.values()) {
            if high.is_some_and(|high| key > high) {
                return;
            }
            if low.map_or(true, |low| key >= low) {
                out.push((key.clone(), value.clone()));
            }
        }
        match leaf.next_leaf() {
            Some(next) => {
                let guard = next.read_arc();
                leaf = guard;
            }
            None => return,
        }
    }
}

/// In-order walk of a keyed subtree, skipping children entirely outside
/// `[low, high]`. Ancestors stay share-locked while a child is visited.
fn collect_in_order<K: Ord + Clone, V: Clone>(
    node: &Node<K, V>,
    low: Option<&K>,
    high: Option<&K>,
    out: &mut Vec<(K, V)>,
) -> Result<()> {
    let start = low.map_or(0, |low| node.lower_bound(low));
    for index in start..=node.len() {
        if !node.is_leaf() {
            let child = node.child(index)?.read_arc();
            collect_in_order(&child, low, high, out)?;
        }
        let Some(key) = node.keys().get(index) else {
            break;
        };
        if high.is_some_and(|high| key > high) {
            break;
        }
        out.push((key.clone(), node.value(index)?.clone()));
    }
    Ok(())
}

/// State for a deep copy of a subtree.
struct SubtreeCopy<K, V> {
    leaves: Vec<NodeRef<K, V>>,
    entries: usize,
    layout: Layout,
}

impl<K: Clone, V: Clone> SubtreeCopy<K, V> {
    fn copy(&mut self, node: &Node<K, V>) -> Result<NodeRef<K, V>> {
        let copy = node.detached_copy();
        if node.is_leaf() || self.layout == Layout::Keyed {
            self.entries += node.len();
        }
        if node.is_leaf() {
            self.leaves.push(Arc::clone(&copy));
            return Ok(copy);
        }

        let mut guard = copy.write();
        for (index, child) in node.children().iter().enumerate() {
            let child_copy = self.copy(&child.read())?;
            guard.insert_child(child_copy, index)?;
        }
        drop(guard);
        Ok(copy)
    }
}

/// An internal root left with no keys, awaiting collapse onto its only child.
fn is_emptied_root<K, V>(node: &Node<K, V>) -> bool {
    !node.is_leaf() && node.is_empty()
}

fn empty_subtree(what: &str) -> Error {
    Error::InvariantViolation(format!("no {} in a subtree that can lend", what))
}

/// Unwrap the result of an internal step.
///
/// Node primitives only fail when the tree algorithms are wrong, so an error
/// here is a bug: log it and stop.
fn fatal<T>(result: Result<T>) -> T {
    match result {
        Ok(value) => value,
        Err(err) => {
            tracing::error!(error = %err, "tree invariant violated");
            panic!("tree invariant violated: {}", err);
        }
    }
}
