//! Property-based tests for the tree.
//!
//! Uses differential testing against `BTreeMap` as an oracle, for both
//! layouts and several degrees, and checks the structural invariants after
//! every run.

use multiway::{Layout, Tree, TreeConfig};
use proptest::prelude::*;
use std::collections::BTreeMap;

// ============================================================================
//  Strategies
// ============================================================================

/// Small key space so inserts collide and removes hit.
fn key() -> impl Strategy<Value = u16> {
    0u16..512
}

fn layout() -> impl Strategy<Value = Layout> {
    prop_oneof![Just(Layout::Keyed), Just(Layout::LeafValue)]
}

fn config() -> impl Strategy<Value = TreeConfig> {
    (layout(), 2usize..=5).prop_map(|(layout, degree)| TreeConfig::new(layout, degree).unwrap())
}

/// Operations for random testing.
#[derive(Debug, Clone)]
enum Op {
    Insert(u16, u32),
    Remove(u16),
    Find(u16),
    Range(u16, u16),
}

fn operations(max_ops: usize) -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(
        prop_oneof![
            4 => (key(), any::<u32>()).prop_map(|(k, v)| Op::Insert(k, v)),
            3 => key().prop_map(Op::Remove),
            2 => key().prop_map(Op::Find),
            1 => (key(), key()).prop_map(|(a, b)| Op::Range(a, b)),
        ],
        0..=max_ops,
    )
}

// ============================================================================
//  Oracle Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Every operation agrees with `BTreeMap` (first insert wins).
    #[test]
    fn ops_match_btreemap(config in config(), ops in operations(400)) {
        let tree = Tree::new(config);
        let mut oracle = BTreeMap::new();

        for op in ops {
            match op {
                Op::Insert(k, v) => {
                    let expected = !oracle.contains_key(&k);
                    if expected {
                        oracle.insert(k, v);
                    }
                    prop_assert_eq!(tree.insert(k, v), expected);
                }
                Op::Remove(k) => {
                    prop_assert_eq!(tree.remove(&k), oracle.remove(&k).is_some());
                }
                Op::Find(k) => {
                    prop_assert_eq!(tree.find(&k), oracle.get(&k).copied());
                }
                Op::Range(a, b) => {
                    let expected: Vec<(u16, u32)> = if a <= b {
                        oracle.range(a..=b).map(|(k, v)| (*k, *v)).collect()
                    } else {
                        Vec::new()
                    };
                    prop_assert_eq!(tree.range(&a, &b), expected);
                }
            }
            prop_assert_eq!(tree.len(), oracle.len());
        }

        prop_assert!(tree.validate().is_ok(), "{:?}", tree.validate());
        let expected: Vec<(u16, u32)> = oracle.into_iter().collect();
        prop_assert_eq!(tree.entries(), expected);
    }

    /// Invariants hold after each single step, not just at the end.
    #[test]
    fn invariants_hold_after_every_op(config in config(), ops in operations(120)) {
        let tree = Tree::new(config);
        for op in ops {
            match op {
                Op::Insert(k, v) => { tree.insert(k, v); }
                Op::Remove(k) => { tree.remove(&k); }
                Op::Find(_) | Op::Range(..) => {}
            }
            let check = tree.validate();
            prop_assert!(check.is_ok(), "{:?}", check);
        }
    }

    /// Each inserted value is stored exactly once: no duplicate or lost entry.
    #[test]
    fn insert_stores_each_value_once(
        config in config(),
        keys in prop::collection::btree_set(key(), 0..300),
    ) {
        let tree = Tree::new(config);
        for &k in &keys {
            prop_assert!(tree.insert(k, u32::from(k) * 3));
        }

        let entries = tree.entries();
        prop_assert_eq!(entries.len(), keys.len());
        for (k, v) in entries {
            prop_assert_eq!(v, u32::from(k) * 3);
        }
        prop_assert!(tree.validate().is_ok());
    }

    /// Traversal and a full-width range produce the same sequence.
    #[test]
    fn traverse_equals_full_range(config in config(), ops in operations(200)) {
        let tree = Tree::new(config);
        for op in ops {
            if let Op::Insert(k, v) = op {
                tree.insert(k, v);
            }
        }

        let mut visited = Vec::new();
        tree.traverse(|k, v| visited.push((*k, *v)));
        prop_assert_eq!(&visited, &tree.range(&0, &u16::MAX));
        prop_assert!(visited.windows(2).all(|w| w[0].0 < w[1].0));
    }

    /// A clone is equal in content and independent in structure.
    #[test]
    fn clone_is_independent(config in config(), ops in operations(150), extra in key()) {
        let tree = Tree::new(config);
        for op in ops {
            if let Op::Insert(k, v) = op {
                tree.insert(k, v);
            }
        }
        let before = tree.entries();
        let copy = tree.clone();
        prop_assert!(copy.validate().is_ok());
        prop_assert_eq!(copy.entries(), before.clone());

        copy.remove(&extra);
        copy.insert(extra, 0);
        prop_assert_eq!(tree.entries(), before);
        prop_assert!(copy.validate().is_ok());
    }
}
