//! Structural invariant checks.

use std::sync::Arc;

use crate::common::{Error, Layout, Result, TreeConfig};
use crate::index::btree::node::{Node, NodeRef};

/// Walk the whole tree under `root` and check every structural rule.
///
/// Locks are taken top-down, shared, and held along the current path. With
/// `len` of `None` only per-node rules are checked: node contents, links to
/// parents and leaf depth. The size and the leaf chain are skipped, since
/// writers already below the root may still change them.
pub(crate) fn check_tree<K: Ord, V>(
    root: &NodeRef<K, V>,
    len: Option<usize>,
    config: TreeConfig,
) -> Result<()> {
    let guard = root.read();
    if guard.parent().is_some() {
        return Err(violation("root has a parent link".to_string()));
    }

    let mut checker = Checker {
        config,
        leaves: Vec::new(),
        leaf_depth: None,
        entries: 0,
    };
    if guard.is_leaf() && guard.next_leaf().is_some() {
        return Err(violation("root leaf links to a next leaf".to_string()));
    }
    checker.visit(root, &guard, 0, None, None)?;

    let Some(len) = len else {
        return Ok(());
    };
    if checker.entries != len {
        return Err(violation(format!(
            "tree holds {} entries but its size is {}",
            checker.entries, len
        )));
    }

    // Still holding the root keeps writers out while the chain is walked.
    if config.layout().has_leaf_chain() {
        checker.check_leaf_chain()?;
    }
    Ok(())
}

struct Checker<K, V> {
    config: TreeConfig,
    /// Leaves in depth-first order.
    leaves: Vec<NodeRef<K, V>>,
    leaf_depth: Option<usize>,
    entries: usize,
}

impl<K: Ord, V> Checker<K, V> {
    fn visit(
        &mut self,
        node_ref: &NodeRef<K, V>,
        node: &Node<K, V>,
        depth: usize,
        lower: Option<&K>,
        upper: Option<&K>,
    ) -> Result<()> {
        let keyed = self.config.layout() == Layout::Keyed;
        let degree = self.config.degree();
        let keys = node.keys();

        if keys.len() > degree.max_keys() {
            return Err(violation(format!(
                "node at depth {} holds {} keys (max {})",
                depth,
                keys.len(),
                degree.max_keys()
            )));
        }
        if depth > 0 && !node.has_min_keys() {
            return Err(violation(format!(
                "node at depth {} holds {} keys (min {})",
                depth,
                keys.len(),
                degree.min_keys()
            )));
        }
        if !keys.windows(2).all(|pair| pair[0] < pair[1]) {
            return Err(violation(format!(
                "keys at depth {} are not strictly ascending",
                depth
            )));
        }

        // Keyed subtrees are strictly inside their separators. A leaf-value
        // separator is a copy of the first key on its right, so the lower
        // bound is inclusive there.
        let above_lower = |key: &K| match lower {
            None => true,
            Some(lower) if keyed => key > lower,
            Some(lower) => key >= lower,
        };
        let below_upper = |key: &K| upper.map_or(true, |upper| key < upper);
        if !keys.iter().all(|key| above_lower(key) && below_upper(key)) {
            return Err(violation(format!(
                "a key at depth {} lies outside its separator bounds",
                depth
            )));
        }

        let expected_values = if node.is_leaf() || keyed { keys.len() } else { 0 };
        if node.num_values() != expected_values {
            return Err(violation(format!(
                "node at depth {} holds {} values for {} keys",
                depth,
                node.num_values(),
                keys.len()
            )));
        }
        if node.is_leaf() || keyed {
            self.entries += keys.len();
        }

        if node.is_leaf() {
            if node.num_children() != 0 {
                return Err(violation(format!("leaf at depth {} has children", depth)));
            }
            match self.leaf_depth {
                None => self.leaf_depth = Some(depth),
                Some(expected) if expected != depth => {
                    return Err(violation(format!(
                        "leaf at depth {} but other leaves are at depth {}",
                        depth, expected
                    )));
                }
                Some(_) => {}
            }
            return Ok(());
        }

        if node.num_children() != keys.len() + 1 {
            return Err(violation(format!(
                "internal node at depth {} has {} keys and {} children",
                depth,
                keys.len(),
                node.num_children()
            )));
        }

        for (index, child_ref) in node.children().iter().enumerate() {
            let child = child_ref.read();
            if !child.is_child_of(node_ref) {
                return Err(violation(format!(
                    "child {} at depth {} has a stale parent link",
                    index,
                    depth + 1
                )));
            }
            if child.is_leaf() {
                self.leaves.push(Arc::clone(child_ref));
            }
            let child_lower = match index {
                0 => lower,
                _ => keys.get(index - 1),
            };
            let child_upper = keys.get(index).or(upper);
            self.visit(child_ref, &child, depth + 1, child_lower, child_upper)?;
        }
        Ok(())
    }

    /// Following `next_leaf` from the first leaf visits exactly the leaves,
    /// in depth-first order.
    fn check_leaf_chain(&self) -> Result<()> {
        for (index, leaf) in self.leaves.iter().enumerate() {
            let next = leaf.read().next_leaf();
            match (next, self.leaves.get(index + 1)) {
                (None, None) => {}
                (Some(next), Some(expected)) if Arc::ptr_eq(&next, expected) => {}
                _ => {
                    return Err(violation(format!(
                        "leaf {} does not link to the leaf after it",
                        index
                    )));
                }
            }
        }
        Ok(())
    }
}

fn violation(message: String) -> Error {
    Error::InvariantViolation(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf_value() -> TreeConfig {
        TreeConfig::new(Layout::LeafValue, 2).unwrap()
    }

    fn leaf(config: TreeConfig, keys: &[u32]) -> NodeRef<u32, u32> {
        let node = Node::new_ref(true, config);
        {
            let mut guard = node.write();
            for (i, &k) in keys.iter().enumerate() {
                guard.insert_key(k, i).unwrap();
                guard.insert_value(k, i).unwrap();
            }
        }
        node
    }

    fn two_leaf_tree(left_keys: &[u32], separator: u32, right_keys: &[u32]) -> NodeRef<u32, u32> {
        let config = leaf_value();
        let left = leaf(config, left_keys);
        let right = leaf(config, right_keys);
        left.write().set_next_leaf(Some(&right)).unwrap();

        let root = Node::new_ref(false, config);
        {
            let mut guard = root.write();
            guard.insert_key(separator, 0).unwrap();
            guard.insert_child(left, 0).unwrap();
            guard.insert_child(right, 1).unwrap();
        }
        root
    }

    #[test]
    fn test_valid_tree_passes() {
        let root = two_leaf_tree(&[1, 2], 5, &[5, 7]);
        assert_eq!(check_tree(&root, Some(4), leaf_value()), Ok(()));
    }

    #[test]
    fn test_empty_leaf_root_passes() {
        let root = leaf(leaf_value(), &[]);
        assert_eq!(check_tree(&root, Some(0), leaf_value()), Ok(()));
    }

    #[test]
    fn test_size_mismatch_detected() {
        let root = two_leaf_tree(&[1, 2], 5, &[5, 7]);
        assert!(matches!(
            check_tree(&root, Some(3), leaf_value()),
            Err(Error::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_bound_violation_detected() {
        let root = two_leaf_tree(&[1, 6], 5, &[7]);
        assert!(check_tree(&root, Some(3), leaf_value()).is_err());
    }

    #[test]
    fn test_broken_chain_detected() {
        let root = two_leaf_tree(&[1], 5, &[5]);
        let first = root.read().child(0).unwrap().clone();
        first.write().set_next_leaf(None).unwrap();
        assert!(check_tree(&root, Some(2), leaf_value()).is_err());
    }

    #[test]
    fn test_underfull_child_detected() {
        let root = two_leaf_tree(&[], 5, &[5]);
        assert!(check_tree(&root, Some(1), leaf_value()).is_err());
    }

    #[test]
    fn test_node_check_skips_size_and_chain() {
        let root = two_leaf_tree(&[1], 5, &[5]);
        let first = root.read().child(0).unwrap().clone();
        first.write().set_next_leaf(None).unwrap();

        assert_eq!(check_tree(&root, None, leaf_value()), Ok(()));
        assert!(check_tree(&root, Some(2), leaf_value()).is_err());
    }

    #[test]
    fn test_node_check_still_catches_underfull_child() {
        let root = two_leaf_tree(&[], 5, &[5]);
        assert!(check_tree(&root, None, leaf_value()).is_err());
    }
}
