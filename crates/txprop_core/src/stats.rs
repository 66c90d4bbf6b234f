//! Transaction manager statistics.
//!
//! # Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use txprop_core::{InMemoryStore, Propagation, TransactionManager};
//!
//! let tm = TransactionManager::new(Arc::new(InMemoryStore::new()));
//! tm.run(Propagation::Required, |_scope| Ok(())).unwrap();
//!
//! let stats = tm.stats().snapshot();
//! assert_eq!(stats.contexts_begun, 1);
//! assert_eq!(stats.commits, 1);
//! ```

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Manager counters.
///
/// All counters are atomic and monotonically increasing, so they can be read
/// while call chains on other threads are running.
#[derive(Debug, Default)]
pub struct ManagerStats {
    /// Contexts begun (top-level, independent and nested).
    contexts_begun: AtomicU64,
    /// Frames that joined an ambient context.
    joins: AtomicU64,
    /// Ambient contexts suspended.
    suspensions: AtomicU64,
    /// Savepoints created for nested contexts.
    savepoints: AtomicU64,
    /// Contexts committed to the durable store.
    commits: AtomicU64,
    /// Contexts rolled back (including to a savepoint).
    rollbacks: AtomicU64,
    /// Nested contexts released into their parent.
    releases: AtomicU64,
    /// Writes committed without a context.
    auto_commits: AtomicU64,
    /// Writes buffered into a context.
    buffered_writes: AtomicU64,
    /// Rollback-only contexts completed successfully by their owner.
    unexpected_rollbacks: AtomicU64,
    /// Calls rejected by the resolver.
    rejections: AtomicU64,
}

impl ManagerStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_begin(&self) {
        self.contexts_begun.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_join(&self) {
        self.joins.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_suspension(&self) {
        self.suspensions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_savepoint(&self) {
        self.savepoints.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_commit(&self) {
        self.commits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rollback(&self) {
        self.rollbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_release(&self) {
        self.releases.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_auto_commit(&self) {
        self.auto_commits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_buffered_write(&self) {
        self.buffered_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_unexpected_rollback(&self) {
        self.unexpected_rollbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejection(&self) {
        self.rejections.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of contexts begun.
    pub fn contexts_begun(&self) -> u64 {
        self.contexts_begun.load(Ordering::Relaxed)
    }

    /// Returns the number of frames that joined an ambient context.
    pub fn joins(&self) -> u64 {
        self.joins.load(Ordering::Relaxed)
    }

    /// Returns the number of suspensions.
    pub fn suspensions(&self) -> u64 {
        self.suspensions.load(Ordering::Relaxed)
    }

    /// Returns the number of savepoints created.
    pub fn savepoints(&self) -> u64 {
        self.savepoints.load(Ordering::Relaxed)
    }

    /// Returns the number of commits.
    pub fn commits(&self) -> u64 {
        self.commits.load(Ordering::Relaxed)
    }

    /// Returns the number of rollbacks.
    pub fn rollbacks(&self) -> u64 {
        self.rollbacks.load(Ordering::Relaxed)
    }

    /// Returns the number of nested contexts released into their parent.
    pub fn releases(&self) -> u64 {
        self.releases.load(Ordering::Relaxed)
    }

    /// Returns the number of auto-committed writes.
    pub fn auto_commits(&self) -> u64 {
        self.auto_commits.load(Ordering::Relaxed)
    }

    /// Returns the number of buffered writes.
    pub fn buffered_writes(&self) -> u64 {
        self.buffered_writes.load(Ordering::Relaxed)
    }

    /// Returns the number of unexpected rollbacks.
    pub fn unexpected_rollbacks(&self) -> u64 {
        self.unexpected_rollbacks.load(Ordering::Relaxed)
    }

    /// Returns the number of calls rejected by the resolver.
    pub fn rejections(&self) -> u64 {
        self.rejections.load(Ordering::Relaxed)
    }

    /// Returns a snapshot of all stats.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            contexts_begun: self.contexts_begun(),
            joins: self.joins(),
            suspensions: self.suspensions(),
            savepoints: self.savepoints(),
            commits: self.commits(),
            rollbacks: self.rollbacks(),
            releases: self.releases(),
            auto_commits: self.auto_commits(),
            buffered_writes: self.buffered_writes(),
            unexpected_rollbacks: self.unexpected_rollbacks(),
            rejections: self.rejections(),
        }
    }
}

/// A point-in-time snapshot of manager statistics.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct StatsSnapshot {
    /// Contexts begun.
    pub contexts_begun: u64,
    /// Frames that joined an ambient context.
    pub joins: u64,
    /// Ambient contexts suspended.
    pub suspensions: u64,
    /// Savepoints created.
    pub savepoints: u64,
    /// Contexts committed.
    pub commits: u64,
    /// Contexts rolled back.
    pub rollbacks: u64,
    /// Nested contexts released into their parent.
    pub releases: u64,
    /// Auto-committed writes.
    pub auto_commits: u64,
    /// Buffered writes.
    pub buffered_writes: u64,
    /// Unexpected rollbacks.
    pub unexpected_rollbacks: u64,
    /// Resolver rejections.
    pub rejections: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_stats_are_zero() {
        let stats = ManagerStats::new();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn record_transitions() {
        let stats = ManagerStats::new();

        stats.record_begin();
        stats.record_begin();
        stats.record_join();
        stats.record_suspension();
        stats.record_commit();
        stats.record_rollback();
        stats.record_release();

        let snap = stats.snapshot();
        assert_eq!(snap.contexts_begun, 2);
        assert_eq!(snap.joins, 1);
        assert_eq!(snap.suspensions, 1);
        assert_eq!(snap.commits, 1);
        assert_eq!(snap.rollbacks, 1);
        assert_eq!(snap.releases, 1);
    }

    #[test]
    fn concurrent_updates() {
        use std::sync::Arc;
        use std::thread;

        let stats = Arc::new(ManagerStats::new());
        let mut handles = vec![];

        for _ in 0..10 {
            let s = Arc::clone(&stats);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    s.record_buffered_write();
                    s.record_auto_commit();
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(stats.buffered_writes(), 1000);
        assert_eq!(stats.auto_commits(), 1000);
    }
}
