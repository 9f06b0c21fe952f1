//! Transaction manager.

use crate::config::{ClosePolicy, Config};
use crate::error::{CoreError, CoreResult};
use crate::stats::DatabaseStats;
use crate::store::RecordStore;
use crate::transaction::handle::Transaction;
use crate::transaction::state::{TransactionState, TxnCore};
use crate::types::TransactionId;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub(crate) type SharedCore = Arc<Mutex<TxnCore>>;

#[derive(Debug, Default)]
struct ActiveSet {
    /// Keyed by id, which is begin order.
    txns: BTreeMap<TransactionId, SharedCore>,
    closed: bool,
}

/// Owns the bounded pool of active transactions for one database.
///
/// ## Locking
///
/// Locks are taken in the order transaction core, store, active set.
/// `shutdown` drains the active set and releases it before touching any
/// core, so a concurrent commit or drop never waits on it in reverse. The
/// key owner table is a leaf: nothing else is locked while it is held.
///
/// ## Write conflicts
///
/// A transaction that writes a key owns it until it commits or aborts.
/// Writes to an owned key from any other transaction or from an auto-commit
/// operation fail with `TransactionConflict`. Reads are not affected.
pub(crate) struct TransactionManager {
    store: Arc<RecordStore>,
    stats: Arc<DatabaseStats>,
    capacity: usize,
    enabled: bool,
    next_id: AtomicU64,
    active: Mutex<ActiveSet>,
    owners: Mutex<BTreeMap<Vec<u8>, TransactionId>>,
}

impl TransactionManager {
    pub(crate) fn new(store: Arc<RecordStore>, stats: Arc<DatabaseStats>, config: &Config) -> Self {
        Self {
            store,
            stats,
            capacity: config.max_transactions,
            enabled: config.enable_transactions,
            next_id: AtomicU64::new(1),
            active: Mutex::new(ActiveSet::default()),
            owners: Mutex::new(BTreeMap::new()),
        }
    }

    /// Maximum number of simultaneously active transactions.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of transactions currently holding a slot.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.lock().txns.len()
    }

    /// Returns `true` once `shutdown` has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.active.lock().closed
    }

    pub(crate) fn store(&self) -> &RecordStore {
        &self.store
    }

    #[cfg(test)]
    pub(crate) fn stats(&self) -> &DatabaseStats {
        &self.stats
    }

    /// Hands out the next id. Auto-commit operations draw from the same
    /// counter so every journaled batch names a distinct id in logs.
    pub(crate) fn next_id(&self) -> TransactionId {
        TransactionId::new(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Takes ownership of `key` for `id`. Returns `true` if the claim is new.
    ///
    /// Callers hold the store's commit lock so that no batch lands between
    /// the claim and their visibility check.
    pub(crate) fn claim(&self, id: TransactionId, key: &[u8]) -> CoreResult<bool> {
        let mut owners = self.owners.lock();
        match owners.get(key) {
            Some(&owner) if owner == id => Ok(false),
            Some(&owner) => Err(CoreError::TransactionConflict { owner }),
            None => {
                owners.insert(key.to_vec(), id);
                Ok(true)
            }
        }
    }

    /// Gives up a claim taken by an operation that then failed.
    pub(crate) fn unclaim(&self, key: &[u8]) {
        self.owners.lock().remove(key);
    }

    /// Fails with `TransactionConflict` if an active transaction owns `key`.
    pub(crate) fn ensure_unclaimed(&self, key: &[u8]) -> CoreResult<()> {
        match self.owners.lock().get(key) {
            Some(&owner) => Err(CoreError::TransactionConflict { owner }),
            None => Ok(()),
        }
    }

    fn release_keys(&self, keys: Vec<Vec<u8>>) {
        if keys.is_empty() {
            return;
        }
        let mut owners = self.owners.lock();
        for key in keys {
            owners.remove(&key);
        }
    }

    /// Counts an outcome in the stats.
    pub(crate) fn track<T>(&self, result: CoreResult<T>, on_ok: fn(&DatabaseStats)) -> CoreResult<T> {
        match &result {
            Ok(_) => on_ok(&self.stats),
            Err(CoreError::NotFound) => {}
            Err(_) => self.stats.record_error(),
        }
        result
    }

    /// Starts a transaction if a slot is free.
    ///
    /// The capacity check and the slot reservation happen under one lock,
    /// so two racing callers can never both take the last slot.
    pub(crate) fn begin(self: &Arc<Self>, read_only: bool) -> CoreResult<Transaction> {
        if !self.enabled {
            return Err(CoreError::TransactionsDisabled);
        }
        let created_at = self.store.last_sequence();

        let mut active = self.active.lock();
        if active.closed {
            return Err(CoreError::DatabaseClosed);
        }
        if active.txns.len() >= self.capacity {
            drop(active);
            self.stats.record_begin_rejected();
            tracing::warn!(capacity = self.capacity, "begin refused: transaction limit reached");
            return Err(CoreError::ResourceLimitReached {
                capacity: self.capacity,
            });
        }
        let id = self.next_id();
        let core = Arc::new(Mutex::new(TxnCore::new(id, created_at, read_only)));
        active.txns.insert(id, Arc::clone(&core));
        drop(active);

        self.stats.record_begin();
        tracing::debug!(%id, %created_at, read_only, "transaction begun");
        Ok(Transaction::new(core, Arc::clone(self)))
    }

    /// Applies the pending log and moves the transaction to `Committed`.
    ///
    /// A failed apply leaves the transaction `Aborted`; either way the slot
    /// is freed.
    pub(crate) fn commit(&self, core: &Mutex<TxnCore>) -> CoreResult<()> {
        let mut txn = core.lock();
        txn.ensure_active()?;
        let id = txn.id();
        let result = self.resolve_by_commit(&mut txn);
        drop(txn);
        self.release(id);
        result
    }

    /// Discards the pending log and moves the transaction to `Aborted`.
    pub(crate) fn abort(&self, core: &Mutex<TxnCore>) -> CoreResult<()> {
        let mut txn = core.lock();
        txn.ensure_active()?;
        let id = txn.id();
        let discarded = txn.pending_len();
        let keys = txn.touched_keys();
        txn.finish(TransactionState::Aborted);
        drop(txn);
        self.release(id);
        self.release_keys(keys);

        self.stats.record_abort();
        tracing::debug!(%id, discarded, "transaction aborted");
        Ok(())
    }

    /// Owned keys are released only after the batch has landed.
    fn resolve_by_commit(&self, txn: &mut TxnCore) -> CoreResult<()> {
        let id = txn.id();
        let keys = txn.touched_keys();
        let ops = txn.take_log();
        let count = ops.len();

        let outcome = match self.store.apply(id, move |_| Ok(ops)) {
            Ok(applied) => {
                txn.finish(TransactionState::Committed);
                self.stats.record_commit();
                self.stats.record_journaled(applied.bytes);
                tracing::debug!(%id, ops = count, sequence = ?applied.sequence, "transaction committed");
                Ok(())
            }
            // Applied and journaled, so it is committed, just not known durable.
            Err(e @ CoreError::SyncFailed { .. }) => {
                txn.finish(TransactionState::Committed);
                self.stats.record_commit();
                self.stats.record_error();
                tracing::error!(%id, error = %e, "transaction committed but journal sync failed");
                Err(e)
            }
            Err(e) => {
                txn.finish(TransactionState::Aborted);
                self.stats.record_abort();
                self.stats.record_error();
                tracing::error!(%id, error = %e, "commit failed, transaction aborted");
                Err(e)
            }
        };
        self.release_keys(keys);
        outcome
    }

    fn release(&self, id: TransactionId) {
        self.active.lock().txns.remove(&id);
    }

    /// Stops accepting transactions and resolves the active ones.
    ///
    /// With [`ClosePolicy::Refuse`] and active transactions nothing changes
    /// and `TransactionsStillOpen` is returned. Otherwise every active
    /// transaction is committed (oldest first) or aborted. If some
    /// auto-commit fails, the rest are still resolved and the first error is
    /// returned.
    pub(crate) fn shutdown(&self, policy: ClosePolicy) -> CoreResult<()> {
        let drained: Vec<SharedCore> = {
            let mut active = self.active.lock();
            if active.closed {
                return Ok(());
            }
            if policy == ClosePolicy::Refuse && !active.txns.is_empty() {
                return Err(CoreError::TransactionsStillOpen {
                    count: active.txns.len(),
                });
            }
            active.closed = true;
            std::mem::take(&mut active.txns).into_values().collect()
        };

        let mut first_error = None;
        for core in drained {
            let mut txn = core.lock();
            // Resolved by its owner after the drain.
            if txn.state() != TransactionState::Active {
                continue;
            }
            let id = txn.id();
            if policy == ClosePolicy::AutoCommit {
                if let Err(e) = self.resolve_by_commit(&mut txn) {
                    first_error.get_or_insert(e);
                }
            } else {
                tracing::warn!(%id, pending = txn.pending_len(), "aborting transaction left open at close");
                let keys = txn.touched_keys();
                txn.finish(TransactionState::Aborted);
                self.stats.record_abort();
                self.release_keys(keys);
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("capacity", &self.capacity)
            .field("enabled", &self.enabled)
            .field("active", &self.active_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::Journal;
    use burrow_storage::MemoryBackend;

    fn manager(capacity: usize) -> Arc<TransactionManager> {
        let (store, _) = RecordStore::recover(Journal::new(Box::new(MemoryBackend::new()), false)).unwrap();
        Arc::new(TransactionManager::new(
            Arc::new(store),
            Arc::new(DatabaseStats::new()),
            &Config::default().max_transactions(capacity),
        ))
    }

    #[test]
    fn begin_assigns_increasing_ids() {
        let tm = manager(4);
        let t1 = tm.begin(false).unwrap();
        let t2 = tm.begin(false).unwrap();
        assert!(t1.id() < t2.id());
        assert_eq!(tm.active_count(), 2);
    }

    #[test]
    fn capacity_is_enforced() {
        let tm = manager(1);
        let t1 = tm.begin(false).unwrap();
        assert!(matches!(
            tm.begin(false),
            Err(CoreError::ResourceLimitReached { capacity: 1 })
        ));
        assert_eq!(tm.active_count(), 1);
        assert_eq!(tm.stats().snapshot().begin_rejections, 1);

        t1.commit().unwrap();
        assert_eq!(tm.active_count(), 0);
        assert!(tm.begin(false).is_ok());
    }

    #[test]
    fn commit_twice_is_invalid_state() {
        let tm = manager(1);
        let txn = tm.begin(false).unwrap();
        txn.commit().unwrap();
        assert!(matches!(
            txn.commit(),
            Err(CoreError::InvalidState {
                state: TransactionState::Committed,
                ..
            })
        ));
        assert!(matches!(txn.abort(), Err(CoreError::InvalidState { .. })));
    }

    #[test]
    fn commit_applies_to_store() {
        let tm = manager(1);
        let txn = tm.begin(false).unwrap();
        txn.insert(b"k", b"v").unwrap();
        assert!(!tm.store().contains(b"k"));
        txn.commit().unwrap();
        assert_eq!(tm.store().get(b"k"), Some(b"v".to_vec()));
    }

    #[test]
    fn disabled_manager_refuses_begin() {
        let (store, _) = RecordStore::recover(Journal::new(Box::new(MemoryBackend::new()), false)).unwrap();
        let tm = Arc::new(TransactionManager::new(
            Arc::new(store),
            Arc::new(DatabaseStats::new()),
            &Config::default().enable_transactions(false),
        ));
        assert!(matches!(tm.begin(false), Err(CoreError::TransactionsDisabled)));
    }

    #[test]
    fn shutdown_auto_abort() {
        let tm = manager(2);
        let txn = tm.begin(false).unwrap();
        txn.insert(b"k", b"v").unwrap();

        tm.shutdown(ClosePolicy::AutoAbort).unwrap();
        assert_eq!(txn.state(), TransactionState::Aborted);
        assert!(!tm.store().contains(b"k"));
        assert!(matches!(tm.begin(false), Err(CoreError::DatabaseClosed)));
        assert!(matches!(txn.insert(b"x", b"y"), Err(CoreError::InvalidState { .. })));
    }

    #[test]
    fn shutdown_auto_commit_in_begin_order() {
        let tm = manager(2);
        let older = tm.begin(false).unwrap();
        let newer = tm.begin(false).unwrap();
        newer.insert(b"n", b"newer").unwrap();
        older.insert(b"o", b"older").unwrap();

        tm.shutdown(ClosePolicy::AutoCommit).unwrap();
        assert_eq!(older.state(), TransactionState::Committed);
        assert_eq!(newer.state(), TransactionState::Committed);
        assert_eq!(tm.store().len(), 2);
        assert_eq!(tm.owners.lock().len(), 0);
    }

    #[test]
    fn claims_are_exclusive_until_released() {
        let tm = manager(2);
        let (a, b) = (TransactionId::new(100), TransactionId::new(200));
        assert!(tm.claim(a, b"k").unwrap());
        assert!(!tm.claim(a, b"k").unwrap());
        assert!(matches!(
            tm.claim(b, b"k"),
            Err(CoreError::TransactionConflict { owner }) if owner == a
        ));
        assert!(tm.ensure_unclaimed(b"k").is_err());

        tm.release_keys(vec![b"k".to_vec()]);
        assert!(tm.ensure_unclaimed(b"k").is_ok());
        assert!(tm.claim(b, b"k").unwrap());
    }

    #[test]
    fn abort_and_commit_release_owned_keys() {
        let tm = manager(2);
        let t1 = tm.begin(false).unwrap();
        t1.insert(b"a", b"1").unwrap();
        t1.abort().unwrap();
        assert!(tm.ensure_unclaimed(b"a").is_ok());

        let t2 = tm.begin(false).unwrap();
        t2.insert(b"b", b"2").unwrap();
        assert!(tm.ensure_unclaimed(b"b").is_err());
        t2.commit().unwrap();
        assert!(tm.ensure_unclaimed(b"b").is_ok());
    }

    #[test]
    fn shutdown_refuse_leaves_everything() {
        let tm = manager(1);
        let txn = tm.begin(false).unwrap();
        assert!(matches!(
            tm.shutdown(ClosePolicy::Refuse),
            Err(CoreError::TransactionsStillOpen { count: 1 })
        ));
        assert!(txn.is_active());
        assert!(!tm.is_closed());

        txn.abort().unwrap();
        tm.shutdown(ClosePolicy::Refuse).unwrap();
        assert!(tm.is_closed());
    }
}
