//! Node - one level of fan-out in the tree.
//!
//! A [`Node`] holds:
//! - A bounded, sorted run of keys
//! - Values co-located with the keys (every level in [`Layout::Keyed`],
//!   leaves only in [`Layout::LeafValue`])
//! - For internal nodes, the exclusively owned children
//! - Non-owning links to its parent and (leaf-value leaves) the next leaf
//!
//! Every node lives behind its own `RwLock`. Shared handles ([`NodeRef`])
//! exist so a descent can lock a child before releasing the parent; only the
//! parent's `children` vector owns a child, every other handle is a weak
//! link or a short-lived clone held for the duration of one lock.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::{RawRwLock, RwLock};

use crate::common::{Degree, Error, Layout, Result, TreeConfig};

/// Owning handle to a locked node.
pub type NodeRef<K, V> = Arc<RwLock<Node<K, V>>>;

/// Shared lock on a node that keeps the node alive on its own.
pub type NodeReadGuard<K, V> = ArcRwLockReadGuard<RawRwLock, Node<K, V>>;

/// Exclusive lock on a node that keeps the node alive on its own.
pub type NodeWriteGuard<K, V> = ArcRwLockWriteGuard<RawRwLock, Node<K, V>>;

type NodeLink<K, V> = Weak<RwLock<Node<K, V>>>;

/// A tree node.
///
/// All mutators are positional and bounds-checked. They do not check key
/// order: choosing an index that keeps the keys ascending is the caller's
/// job.
///
/// # Locking
/// A `Node` is only reachable through its `RwLock`, so read-only accessors
/// run under a shared lock and mutators under an exclusive one. Mutators that
/// rewire a child's parent link lock that child briefly; callers must not
/// already hold it.
pub struct Node<K, V> {
    keys: Vec<K>,
    values: Vec<V>,
    children: Vec<NodeRef<K, V>>,
    is_leaf: bool,
    config: TreeConfig,

    /// Weak self-reference, handed to children as their parent link.
    this: NodeLink<K, V>,
    parent: NodeLink<K, V>,
    next_leaf: NodeLink<K, V>,
}

impl<K, V> Node<K, V> {
    /// Create a new empty node behind its own lock.
    pub fn new_ref(is_leaf: bool, config: TreeConfig) -> NodeRef<K, V> {
        let degree = config.degree();
        Arc::new_cyclic(|this| {
            RwLock::new(Node {
                keys: Vec::with_capacity(degree.max_keys()),
                values: if is_leaf || config.layout().values_in_internal_nodes() {
                    Vec::with_capacity(degree.max_keys())
                } else {
                    Vec::new()
                },
                children: if is_leaf {
                    Vec::new()
                } else {
                    Vec::with_capacity(degree.max_children())
                },
                is_leaf,
                config,
                this: this.clone(),
                parent: Weak::new(),
                next_leaf: Weak::new(),
            })
        })
    }

    // ========================================================================
    // Node kind and occupancy
    // ========================================================================

    /// True for nodes without children.
    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.is_leaf
    }

    /// Layout of the tree this node belongs to.
    #[inline]
    pub fn layout(&self) -> Layout {
        self.config.layout()
    }

    /// Minimum degree bounding this node's occupancy.
    #[inline]
    pub fn degree(&self) -> Degree {
        self.config.degree()
    }

    /// Number of keys.
    #[inline]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// True when the node holds no keys.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Number of values; zero for internal nodes of a leaf-value tree.
    #[inline]
    pub fn num_values(&self) -> usize {
        self.values.len()
    }

    /// Number of children; zero for leaves.
    #[inline]
    pub fn num_children(&self) -> usize {
        self.children.len()
    }

    /// True when the node holds `2d - 1` keys and must split before growing.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.keys.len() >= self.degree().max_keys()
    }

    /// True when the node holds at least `d - 1` keys.
    #[inline]
    pub fn has_min_keys(&self) -> bool {
        self.keys.len() >= self.degree().min_keys()
    }

    /// True when the node can give up one key and still hold `d - 1`.
    #[inline]
    pub fn can_lend(&self) -> bool {
        self.keys.len() > self.degree().min_keys()
    }

    // ========================================================================
    // Positional access
    // ========================================================================

    /// Key at `index`.
    pub fn key(&self, index: usize) -> Result<&K> {
        self.keys
            .get(index)
            .ok_or_else(|| Error::out_of_range("key", index, self.keys.len()))
    }

    /// Value at `index`.
    pub fn value(&self, index: usize) -> Result<&V> {
        self.values
            .get(index)
            .ok_or_else(|| Error::out_of_range("value", index, self.values.len()))
    }

    /// Child at `index`. Fails on leaves.
    pub fn child(&self, index: usize) -> Result<&NodeRef<K, V>> {
        if self.is_leaf {
            return Err(Error::InvalidOperation("leaf nodes have no children"));
        }
        self.children
            .get(index)
            .ok_or_else(|| Error::out_of_range("child", index, self.children.len()))
    }

    /// Borrowed view of the keys, valid while the lock guard is held.
    #[inline]
    pub(crate) fn keys(&self) -> &[K] {
        &self.keys
    }

    #[inline]
    pub(crate) fn values(&self) -> &[V] {
        &self.values
    }

    // ========================================================================
    // Key and value mutation
    // ========================================================================

    /// Insert `key` at `index`, shifting later keys right.
    pub fn insert_key(&mut self, key: K, index: usize) -> Result<()> {
        if index > self.keys.len() {
            return Err(Error::out_of_range("key", index, self.keys.len()));
        }
        self.keys.insert(index, key);
        Ok(())
    }

    /// Remove and return the key at `index`.
    pub fn remove_key(&mut self, index: usize) -> Result<K> {
        if index >= self.keys.len() {
            return Err(Error::out_of_range("key", index, self.keys.len()));
        }
        Ok(self.keys.remove(index))
    }

    /// Overwrite the key at `index`, returning the previous one.
    pub fn replace_key(&mut self, index: usize, key: K) -> Result<K> {
        let len = self.keys.len();
        let slot = self
            .keys
            .get_mut(index)
            .ok_or_else(|| Error::out_of_range("key", index, len))?;
        Ok(std::mem::replace(slot, key))
    }

    /// Insert `value` at `index`. Fails on internal nodes of a leaf-value tree.
    pub fn insert_value(&mut self, value: V, index: usize) -> Result<()> {
        self.check_values_allowed()?;
        if index > self.values.len() {
            return Err(Error::out_of_range("value", index, self.values.len()));
        }
        self.values.insert(index, value);
        Ok(())
    }

    /// Remove and return the value at `index`.
    pub fn remove_value(&mut self, index: usize) -> Result<V> {
        self.check_values_allowed()?;
        if index >= self.values.len() {
            return Err(Error::out_of_range("value", index, self.values.len()));
        }
        Ok(self.values.remove(index))
    }

    /// Overwrite the value at `index`, returning the previous one.
    pub fn replace_value(&mut self, index: usize, value: V) -> Result<V> {
        self.check_values_allowed()?;
        let len = self.values.len();
        let slot = self
            .values
            .get_mut(index)
            .ok_or_else(|| Error::out_of_range("value", index, len))?;
        Ok(std::mem::replace(slot, value))
    }

    fn check_values_allowed(&self) -> Result<()> {
        if !self.is_leaf && !self.layout().values_in_internal_nodes() {
            return Err(Error::InvalidOperation(
                "internal nodes of a leaf-value tree carry no values",
            ));
        }
        Ok(())
    }

    // ========================================================================
    // Children (internal nodes only)
    // ========================================================================

    /// Insert `child` at `index` and point its parent link at this node.
    ///
    /// The child must be detached: a node still linked to a parent is
    /// rejected, so no node ever has two parents.
    pub fn insert_child(&mut self, child: NodeRef<K, V>, index: usize) -> Result<()> {
        if self.is_leaf {
            return Err(Error::InvalidOperation("cannot insert a child into a leaf"));
        }
        if index > self.children.len() {
            return Err(Error::out_of_range("child", index, self.children.len()));
        }
        {
            let mut node = child.write();
            if node.parent().is_some() {
                return Err(Error::InvalidOperation(
                    "child is still attached to a parent",
                ));
            }
            node.parent = self.this.clone();
        }
        self.children.insert(index, child);
        Ok(())
    }

    /// Remove the child at `index`, clearing its parent link.
    pub fn remove_child(&mut self, index: usize) -> Result<NodeRef<K, V>> {
        if self.is_leaf {
            return Err(Error::InvalidOperation("cannot remove a child from a leaf"));
        }
        if index >= self.children.len() {
            return Err(Error::out_of_range("child", index, self.children.len()));
        }
        let child = self.children.remove(index);
        child.write().parent = Weak::new();
        Ok(child)
    }

    /// Take ownership of `children`, appending them and relinking their parent.
    fn adopt(&mut self, children: Vec<NodeRef<K, V>>) {
        for child in &children {
            child.write().parent = self.this.clone();
        }
        self.children.extend(children);
    }

    /// Handles to every child, in order.
    pub fn children_snapshot(&self) -> Vec<NodeRef<K, V>> {
        self.children.clone()
    }

    #[inline]
    pub(crate) fn children(&self) -> &[NodeRef<K, V>] {
        &self.children
    }

    // ========================================================================
    // Links
    // ========================================================================

    /// The node that owns this one, if it is still attached.
    pub fn parent(&self) -> Option<NodeRef<K, V>> {
        self.parent.upgrade()
    }

    /// Whether this node's parent link points at `node`.
    pub fn is_child_of(&self, node: &NodeRef<K, V>) -> bool {
        std::ptr::eq(self.parent.as_ptr(), Arc::as_ptr(node))
    }

    /// Next leaf in ascending key order. Always `None` for internal nodes.
    pub fn next_leaf(&self) -> Option<NodeRef<K, V>> {
        if !self.is_leaf {
            return None;
        }
        self.next_leaf.upgrade()
    }

    /// Point the leaf chain at `next`. Only leaves of a leaf-value tree are chained.
    pub fn set_next_leaf(&mut self, next: Option<&NodeRef<K, V>>) -> Result<()> {
        if !self.is_leaf || !self.layout().has_leaf_chain() {
            return Err(Error::InvalidOperation(
                "only leaf-value leaves are chained",
            ));
        }
        self.next_leaf = next.map(Arc::downgrade).unwrap_or_default();
        Ok(())
    }

    // ========================================================================
    // Structural primitives
    // ========================================================================

    fn check_full(&self) -> Result<()> {
        if !self.is_full() {
            return Err(Error::InvalidOperation("only a full node can split"));
        }
        Ok(())
    }

    /// Split a full keyed-layout node around its median.
    ///
    /// Returns the median entry, which the caller inserts into the parent,
    /// and the new right sibling holding the upper half (and the upper
    /// half's children). The median leaves this node: its value ends up in
    /// the parent exactly once.
    pub fn split(&mut self) -> Result<(K, V, NodeRef<K, V>)> {
        if self.layout() != Layout::Keyed {
            return Err(Error::InvalidOperation(
                "split() is for keyed nodes; use split_leaf() or split_internal()",
            ));
        }
        self.check_full()?;

        let mid = self.keys.len() / 2;
        let sibling = Node::new_ref(self.is_leaf, self.config);
        {
            let mut right = sibling.write();
            right.keys = self.keys.split_off(mid + 1);
            right.values = self.values.split_off(mid + 1);
            if !self.is_leaf {
                right.adopt(self.children.split_off(mid + 1));
            }
        }

        let key = self
            .keys
            .pop()
            .ok_or(Error::InvalidOperation("split of an empty node"))?;
        let value = self
            .values
            .pop()
            .ok_or(Error::InvalidOperation("split of a node without values"))?;
        Ok((key, value, sibling))
    }

    /// Split a full leaf-value leaf.
    ///
    /// The upper half, median included, moves to the new sibling. Returns a
    /// copy of the sibling's first key to use as the parent separator. The
    /// sibling is spliced into the leaf chain right after this node.
    pub fn split_leaf(&mut self) -> Result<(K, NodeRef<K, V>)>
    where
        K: Clone,
    {
        if !self.layout().has_leaf_chain() || !self.is_leaf {
            return Err(Error::InvalidOperation(
                "split_leaf() is for leaves of a leaf-value tree",
            ));
        }
        self.check_full()?;

        let mid = self.keys.len() / 2;
        let sibling = Node::new_ref(true, self.config);
        let separator = {
            let mut right = sibling.write();
            right.keys = self.keys.split_off(mid);
            right.values = self.values.split_off(mid);
            right.next_leaf = std::mem::replace(&mut self.next_leaf, Arc::downgrade(&sibling));
            right.key(0)?.clone()
        };
        Ok((separator, sibling))
    }

    /// Split a full internal node of a leaf-value tree.
    ///
    /// The median key alone moves up; the keys and children above it go to
    /// the new sibling.
    pub fn split_internal(&mut self) -> Result<(K, NodeRef<K, V>)> {
        if !self.layout().has_leaf_chain() || self.is_leaf {
            return Err(Error::InvalidOperation(
                "split_internal() is for internal nodes of a leaf-value tree",
            ));
        }
        self.check_full()?;

        let mid = self.keys.len() / 2;
        let sibling = Node::new_ref(false, self.config);
        {
            let mut right = sibling.write();
            right.keys = self.keys.split_off(mid + 1);
            right.adopt(self.children.split_off(mid + 1));
        }

        let key = self
            .keys
            .pop()
            .ok_or(Error::InvalidOperation("split of an empty node"))?;
        Ok((key, sibling))
    }

    /// Move every key, value and child of `right` onto the end of this node.
    ///
    /// The caller inserts the separator (if the layout keeps it) first. For
    /// chained leaves this node takes over `right`'s successor.
    pub fn append(&mut self, right: &mut Node<K, V>) -> Result<()> {
        if self.is_leaf != right.is_leaf {
            return Err(Error::InvalidOperation(
                "cannot merge a leaf with an internal node",
            ));
        }
        self.keys.append(&mut right.keys);
        self.values.append(&mut right.values);
        if !self.is_leaf {
            let moved = std::mem::take(&mut right.children);
            self.adopt(moved);
        } else if self.layout().has_leaf_chain() {
            self.next_leaf = right.next_leaf.clone();
        }
        Ok(())
    }

    /// Detached copy of this node's keys and values, without children or links.
    pub(crate) fn detached_copy(&self) -> NodeRef<K, V>
    where
        K: Clone,
        V: Clone,
    {
        let copy = Node::new_ref(self.is_leaf, self.config);
        {
            let mut node = copy.write();
            node.keys = self.keys.clone();
            node.values = self.values.clone();
        }
        copy
    }
}

impl<K: Ord, V> Node<K, V> {
    /// Binary search for `key`; `None` if absent.
    pub fn find_key_index(&self, key: &K) -> Option<usize> {
        self.keys.binary_search(key).ok()
    }

    /// Index of the child whose subtree would hold `key` (upper bound).
    pub fn find_child_index(&self, key: &K) -> Result<usize> {
        if self.is_leaf {
            return Err(Error::InvalidOperation(
                "cannot pick a child index in a leaf",
            ));
        }
        Ok(self.keys.partition_point(|k| k <= key))
    }

    /// Position of the first key not less than `key`.
    pub fn lower_bound(&self, key: &K) -> usize {
        self.keys.partition_point(|k| k < key)
    }
}

impl<K: Clone, V: Clone> Node<K, V> {
    /// Copy of the keys. Never a reference into the node.
    pub fn keys_snapshot(&self) -> Vec<K> {
        self.keys.clone()
    }

    /// Copy of the values. Empty for internal nodes of a leaf-value tree.
    pub fn values_snapshot(&self) -> Vec<V> {
        self.values.clone()
    }
}

impl<K: fmt::Debug, V> fmt::Debug for Node<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("keys", &self.keys)
            .field("is_leaf", &self.is_leaf)
            .field("values", &self.values.len())
            .field("children", &self.children.len())
            .finish()
    }
}
