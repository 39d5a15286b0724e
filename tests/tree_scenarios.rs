//! Integration tests for the tree.
//!
//! These tests drive both layouts through the public API only.

use multiway::{Error, Layout, Tree, TreeConfig};

fn tree_of(layout: Layout, degree: usize) -> Tree<i64, String> {
    Tree::new(TreeConfig::new(layout, degree).unwrap())
}

fn layouts() -> [Layout; 2] {
    [Layout::Keyed, Layout::LeafValue]
}

/// Ascending, descending and interleaved insert orders yield the same contents.
#[test]
fn test_insert_orders_agree() {
    for layout in layouts() {
        let ascending = tree_of(layout, 2);
        let descending = tree_of(layout, 2);
        let interleaved = tree_of(layout, 2);

        for key in 0..200 {
            ascending.insert(key, key.to_string());
            descending.insert(199 - key, (199 - key).to_string());
            let mixed = if key % 2 == 0 { key / 2 } else { 199 - key / 2 };
            interleaved.insert(mixed, mixed.to_string());
        }

        let expected: Vec<i64> = (0..200).collect();
        for tree in [&ascending, &descending, &interleaved] {
            tree.validate().unwrap();
            assert_eq!(tree.keys(), expected);
        }
    }
}

/// Values survive splits and rebalancing.
#[test]
fn test_values_follow_keys() {
    for layout in layouts() {
        let tree = tree_of(layout, 3);
        for key in (0..500).rev() {
            assert!(tree.insert(key, format!("value-{}", key)));
        }
        for key in (0..500).filter(|k| k % 3 == 0) {
            assert!(tree.remove(&key));
        }
        tree.validate().unwrap();

        for key in 0..500 {
            let expected = (key % 3 != 0).then(|| format!("value-{}", key));
            assert_eq!(tree.find(&key), expected, "{:?} key {}", layout, key);
        }
        for (key, value) in tree.entries() {
            assert_eq!(value, format!("value-{}", key));
        }
    }
}

/// Inserting into the same tree twice is idempotent on contents.
#[test]
fn test_duplicate_insert_keeps_first_value() {
    for layout in layouts() {
        let tree = tree_of(layout, 2);
        for key in 0..50 {
            tree.insert(key, "first".to_string());
        }
        for key in 0..50 {
            assert!(!tree.insert(key, "second".to_string()));
        }
        assert_eq!(tree.len(), 50);
        assert!(tree.entries().iter().all(|(_, v)| v == "first"));
        tree.validate().unwrap();
    }
}

/// Range results match a filter over the full traversal.
#[test]
fn test_range_matches_filtered_traversal() {
    for layout in layouts() {
        let tree = tree_of(layout, 2);
        for key in (0..300).map(|k| k * 7 % 307) {
            tree.insert(key, key.to_string());
        }

        for (low, high) in [(0, 0), (5, 17), (100, 250), (-10, 5), (290, 400), (150, 150)] {
            let expected: Vec<(i64, String)> = tree
                .entries()
                .into_iter()
                .filter(|(k, _)| (low..=high).contains(k))
                .collect();
            assert_eq!(tree.range(&low, &high), expected, "{:?} [{}, {}]", layout, low, high);
        }
    }
}

/// Removing in random-looking order shrinks the tree back to a single leaf.
#[test]
fn test_remove_all_in_scrambled_order() {
    for layout in layouts() {
        for degree in [2, 3, 5] {
            let tree = tree_of(layout, degree);
            let keys: Vec<i64> = (0..400).map(|k| k * 37 % 401).collect();
            for &key in &keys {
                tree.insert(key, String::new());
            }
            for (count, key) in keys.iter().rev().enumerate() {
                assert!(tree.remove(key));
                assert_eq!(tree.len(), keys.len() - count - 1);
            }
            tree.validate().unwrap();
            assert!(tree.is_empty());
            assert_eq!(tree.dump().lines().count(), 2);
        }
    }
}

/// Clearing one tree does not affect a clone taken before.
#[test]
fn test_clone_then_clear() {
    for layout in layouts() {
        let tree = tree_of(layout, 2);
        for key in 0..64 {
            tree.insert(key, key.to_string());
        }
        let copy = tree.clone();
        tree.clear();

        assert!(tree.is_empty());
        assert_eq!(copy.len(), 64);
        assert_eq!(copy.range(&10, &12).len(), 3);
        copy.validate().unwrap();
    }
}

/// `take()` hands the contents to a new tree.
#[test]
fn test_take_moves_contents() {
    let tree = tree_of(Layout::Keyed, 2);
    for key in 0..10 {
        tree.insert(key, key.to_string());
    }
    let taken = tree.take();

    assert_eq!(taken.keys(), (0..10).collect::<Vec<_>>());
    assert!(tree.is_empty());
    assert!(tree.insert(1, "again".to_string()));
    assert_eq!(taken.find(&1), Some("1".to_string()));
}

/// The dump header names the layout, degree and size.
#[test]
fn test_dump_header() {
    let keyed = tree_of(Layout::Keyed, 3);
    keyed.insert(1, String::new());
    assert!(keyed.dump().starts_with("B-Tree (degree 3, size 1):\n"));

    let bplus = tree_of(Layout::LeafValue, 4);
    assert_eq!(bplus.dump(), "B+ Tree (degree 4, size 0):\n[] (leaf)\n");
}

/// Degrees below two are rejected at construction.
#[test]
fn test_degree_validation() {
    assert_eq!(
        TreeConfig::new(Layout::LeafValue, 0).unwrap_err(),
        Error::InvalidDegree(0)
    );
    assert!(Tree::<i64, i64>::btree(1).is_err());
    assert!(Tree::<i64, i64>::bplus(1).is_err());
}

/// Leaf-value separators can outlive the key they were copied from.
#[test]
fn test_stale_separator_still_routes() {
    let tree = tree_of(Layout::LeafValue, 2);
    for key in [10, 20, 5, 6, 12, 30, 7, 17] {
        tree.insert(key, key.to_string());
    }
    // 12 is a separator; deleting it leaves the copy in the parent.
    assert!(tree.remove(&12));
    tree.validate().unwrap();

    assert_eq!(tree.find(&12), None);
    assert!(tree.insert(12, "back".to_string()));
    assert_eq!(tree.find(&12), Some("back".to_string()));
    assert_eq!(tree.range(&11, &13), vec![(12, "back".to_string())]);
    tree.validate().unwrap();
}

/// Statistics count structural work and reset to zero.
#[test]
fn test_stats_counters() {
    let tree = tree_of(Layout::Keyed, 2);
    for key in 0..100 {
        tree.insert(key, String::new());
    }
    for key in 0..100 {
        tree.remove(&key);
    }

    let snapshot = tree.stats().snapshot();
    assert!(snapshot.splits >= snapshot.root_splits);
    assert!(snapshot.root_splits > 0);
    assert!(snapshot.rebalances() > 0);
    assert!(snapshot.root_collapses > 0);

    tree.stats().reset();
    assert_eq!(tree.stats().snapshot().splits, 0);
}
