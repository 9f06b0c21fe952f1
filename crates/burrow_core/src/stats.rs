//! Operation counters.
//!
//! ```rust
//! use burrow_core::Database;
//!
//! let db = Database::open_in_memory().unwrap();
//! db.insert(None, b"k", b"v").unwrap();
//!
//! let stats = db.stats();
//! assert_eq!(stats.writes, 1);
//! assert_eq!(stats.auto_commits, 1);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters, updated with relaxed atomics while operations run.
#[derive(Debug, Default)]
pub struct DatabaseStats {
    reads: AtomicU64,
    writes: AtomicU64,
    erases: AtomicU64,
    transactions_started: AtomicU64,
    transactions_committed: AtomicU64,
    transactions_aborted: AtomicU64,
    begin_rejections: AtomicU64,
    auto_commits: AtomicU64,
    bytes_journaled: AtomicU64,
    checkpoints: AtomicU64,
    errors: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl DatabaseStats {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_read(&self) {
        bump(&self.reads);
    }

    pub(crate) fn record_write(&self) {
        bump(&self.writes);
    }

    pub(crate) fn record_erase(&self) {
        bump(&self.erases);
    }

    pub(crate) fn record_begin(&self) {
        bump(&self.transactions_started);
    }

    pub(crate) fn record_commit(&self) {
        bump(&self.transactions_committed);
    }

    pub(crate) fn record_abort(&self) {
        bump(&self.transactions_aborted);
    }

    pub(crate) fn record_begin_rejected(&self) {
        bump(&self.begin_rejections);
    }

    pub(crate) fn record_auto_commit(&self) {
        bump(&self.auto_commits);
    }

    pub(crate) fn record_journaled(&self, bytes: u64) {
        self.bytes_journaled.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_checkpoint(&self) {
        bump(&self.checkpoints);
    }

    pub(crate) fn record_error(&self) {
        bump(&self.errors);
    }

    /// Reads every counter.
    ///
    /// Counters are read one by one, so a snapshot taken under load is not
    /// a single consistent cut.
    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        StatsSnapshot {
            reads: load(&self.reads),
            writes: load(&self.writes),
            erases: load(&self.erases),
            transactions_started: load(&self.transactions_started),
            transactions_committed: load(&self.transactions_committed),
            transactions_aborted: load(&self.transactions_aborted),
            begin_rejections: load(&self.begin_rejections),
            auto_commits: load(&self.auto_commits),
            bytes_journaled: load(&self.bytes_journaled),
            checkpoints: load(&self.checkpoints),
            errors: load(&self.errors),
        }
    }
}

/// Plain copy of [`DatabaseStats`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Successful `find` calls.
    pub reads: u64,
    /// Successful `insert` calls.
    pub writes: u64,
    /// Successful `erase` calls.
    pub erases: u64,
    /// Transactions begun.
    pub transactions_started: u64,
    /// Transactions committed, including those committed at close.
    pub transactions_committed: u64,
    /// Transactions aborted, explicitly, by drop, or at close.
    pub transactions_aborted: u64,
    /// `begin` calls refused because every slot was taken.
    pub begin_rejections: u64,
    /// Operations run without a transaction.
    pub auto_commits: u64,
    /// Bytes appended to the journal.
    pub bytes_journaled: u64,
    /// Checkpoints taken.
    pub checkpoints: u64,
    /// Operations that returned an error other than `NotFound`.
    pub errors: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_zero() {
        assert_eq!(DatabaseStats::new().snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn transaction_counters() {
        let stats = DatabaseStats::new();
        stats.record_begin();
        stats.record_begin();
        stats.record_commit();
        stats.record_abort();
        stats.record_begin_rejected();

        let snap = stats.snapshot();
        assert_eq!(snap.transactions_started, 2);
        assert_eq!(snap.transactions_committed, 1);
        assert_eq!(snap.transactions_aborted, 1);
        assert_eq!(snap.begin_rejections, 1);
    }

    #[test]
    fn concurrent_updates() {
        use std::sync::Arc;
        use std::thread;

        let stats = Arc::new(DatabaseStats::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let s = Arc::clone(&stats);
                thread::spawn(move || {
                    for _ in 0..100 {
                        s.record_read();
                        s.record_journaled(3);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let snap = stats.snapshot();
        assert_eq!(snap.reads, 800);
        assert_eq!(snap.bytes_journaled, 2400);
    }
}
