//! Structural statistics for a tree.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for the structural changes a tree has performed.
///
/// All fields are atomic so concurrent writers can bump them without locks.
///
/// # Memory Ordering
/// Every access uses `Ordering::Relaxed`: each counter only needs atomic
/// increments, and no code orders one counter against another.
///
/// # Example
/// ```
/// use multiway::TreeStats;
/// use std::sync::atomic::Ordering;
///
/// let stats = TreeStats::new();
/// stats.splits.fetch_add(1, Ordering::Relaxed);
/// assert_eq!(stats.snapshot().splits, 1);
/// ```
#[derive(Debug)]
pub struct TreeStats {
    /// Full nodes split into two (root splits included).
    pub splits: AtomicU64,

    /// Sibling pairs merged into one node.
    pub merges: AtomicU64,

    /// Entries rotated from a sibling through the parent.
    pub borrows: AtomicU64,

    /// Times a new root was grown above a full root.
    pub root_splits: AtomicU64,

    /// Times an empty internal root was replaced by its only child.
    pub root_collapses: AtomicU64,
}

impl TreeStats {
    /// Create a new stats tracker with all counters at zero.
    pub fn new() -> Self {
        Self {
            splits: AtomicU64::new(0),
            merges: AtomicU64::new(0),
            borrows: AtomicU64::new(0),
            root_splits: AtomicU64::new(0),
            root_collapses: AtomicU64::new(0),
        }
    }

    #[inline]
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a non-atomic copy of the current counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            splits: self.splits.load(Ordering::Relaxed),
            merges: self.merges.load(Ordering::Relaxed),
            borrows: self.borrows.load(Ordering::Relaxed),
            root_splits: self.root_splits.load(Ordering::Relaxed),
            root_collapses: self.root_collapses.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        self.splits.store(0, Ordering::Relaxed);
        self.merges.store(0, Ordering::Relaxed);
        self.borrows.store(0, Ordering::Relaxed);
        self.root_splits.store(0, Ordering::Relaxed);
        self.root_collapses.store(0, Ordering::Relaxed);
    }
}

impl Default for TreeStats {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time copy of [`TreeStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub splits: u64,
    pub merges: u64,
    pub borrows: u64,
    pub root_splits: u64,
    pub root_collapses: u64,
}

impl StatsSnapshot {
    /// Total number of rebalancing steps taken by deletions.
    pub fn rebalances(&self) -> u64 {
        self.merges + self.borrows
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Stats {{ splits: {}, merges: {}, borrows: {}, root splits: {}, root collapses: {} }}",
            self.splits, self.merges, self.borrows, self.root_splits, self.root_collapses
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_new() {
        let stats = TreeStats::new();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn test_stats_bump_and_snapshot() {
        let stats = TreeStats::new();
        TreeStats::bump(&stats.merges);
        TreeStats::bump(&stats.merges);
        TreeStats::bump(&stats.borrows);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.merges, 2);
        assert_eq!(snapshot.borrows, 1);
        assert_eq!(snapshot.rebalances(), 3);
    }

    #[test]
    fn test_stats_reset() {
        let stats = TreeStats::new();
        stats.splits.fetch_add(100, Ordering::Relaxed);

        stats.reset();

        assert_eq!(stats.splits.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_stats_display() {
        let stats = TreeStats::new();
        stats.splits.fetch_add(4, Ordering::Relaxed);
        stats.root_collapses.fetch_add(1, Ordering::Relaxed);

        let display = format!("{}", stats.snapshot());
        assert!(display.contains("splits: 4"));
        assert!(display.contains("root collapses: 1"));
    }
}
