//! The caller-facing transaction handle.

use crate::error::{CoreError, CoreResult};
use crate::journal::check_field;
use crate::stats::DatabaseStats;
use crate::transaction::manager::{SharedCore, TransactionManager};
use crate::transaction::state::{InsertMode, PendingWrite, TransactionState};
use crate::types::{SequenceNumber, TransactionId};
use std::sync::Arc;

/// A transaction on one database.
///
/// Writes go to a private pending log and become visible to others only on
/// [`commit`](Self::commit). Reads see the pending log layered over
/// committed state.
///
/// The handle is `Send + Sync` and every method takes `&self`, so the same
/// transaction may be used from several threads; its operations are
/// serialized. Dropping a handle that is still active aborts it.
///
/// ```rust
/// use burrow_core::{CoreError, Database};
///
/// let db = Database::open_in_memory().unwrap();
/// let txn = db.begin().unwrap();
/// txn.insert(b"greeting", b"hello").unwrap();
/// assert_eq!(txn.find(b"greeting").unwrap(), b"hello");
/// assert!(matches!(db.find(None, b"greeting"), Err(CoreError::NotFound)));
///
/// txn.commit().unwrap();
/// assert_eq!(db.find(None, b"greeting").unwrap(), b"hello");
/// ```
pub struct Transaction {
    core: SharedCore,
    manager: Arc<TransactionManager>,
}

impl Transaction {
    pub(crate) fn new(core: SharedCore, manager: Arc<TransactionManager>) -> Self {
        Self { core, manager }
    }

    pub(crate) fn belongs_to(&self, manager: &Arc<TransactionManager>) -> bool {
        Arc::ptr_eq(&self.manager, manager)
    }

    /// Returns the transaction ID.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.core.lock().id()
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.core.lock().state()
    }

    /// Returns `true` while the transaction accepts operations.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state() == TransactionState::Active
    }

    /// Returns `true` for transactions started with `begin_read_only`.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.core.lock().is_read_only()
    }

    /// Last committed sequence when the transaction began.
    #[must_use]
    pub fn created_at(&self) -> SequenceNumber {
        self.core.lock().created_at()
    }

    /// Number of operations in the pending log.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.core.lock().pending_len()
    }

    /// Inserts a key that is not yet visible to this transaction.
    ///
    /// # Errors
    ///
    /// `DuplicateKey` if the key is visible, `TransactionConflict` if another
    /// active transaction has written it, `ReadOnly`, `InvalidState`.
    pub fn insert(&self, key: &[u8], value: &[u8]) -> CoreResult<()> {
        self.insert_with(key, value, InsertMode::FailIfExists)
    }

    /// Inserts with an explicit [`InsertMode`].
    pub fn insert_with(&self, key: &[u8], value: &[u8], mode: InsertMode) -> CoreResult<()> {
        let result = self.insert_inner(key, value, mode);
        self.manager.track(result, DatabaseStats::record_write)
    }

    fn insert_inner(&self, key: &[u8], value: &[u8], mode: InsertMode) -> CoreResult<()> {
        check_field(key)?;
        check_field(value)?;

        let mut txn = self.core.lock();
        txn.ensure_writable()?;
        let id = txn.id();
        self.manager.store().with_commit_lock(|committed| {
            let claimed = self.manager.claim(id, key)?;
            let visible = match txn.pending(key) {
                Some(PendingWrite::Put(_)) => true,
                Some(PendingWrite::Erased) => false,
                None => committed.contains_key(key),
            };
            if visible && mode == InsertMode::FailIfExists {
                if claimed {
                    self.manager.unclaim(key);
                }
                return Err(CoreError::DuplicateKey);
            }
            Ok(())
        })?;
        txn.record_insert(key, value);
        Ok(())
    }

    /// Looks up a key, seeing this transaction's own pending writes.
    ///
    /// # Errors
    ///
    /// `NotFound` if the key is absent or erased by this transaction.
    pub fn find(&self, key: &[u8]) -> CoreResult<Vec<u8>> {
        let result = self.find_inner(key);
        self.manager.track(result, DatabaseStats::record_read)
    }

    fn find_inner(&self, key: &[u8]) -> CoreResult<Vec<u8>> {
        let txn = self.core.lock();
        txn.ensure_active()?;
        match txn.pending(key) {
            Some(PendingWrite::Put(value)) => Ok(value.clone()),
            Some(PendingWrite::Erased) => Err(CoreError::NotFound),
            None => self.manager.store().get(key).ok_or(CoreError::NotFound),
        }
    }

    /// Erases a key visible to this transaction.
    ///
    /// # Errors
    ///
    /// `NotFound` if the key is not visible, `TransactionConflict`,
    /// `ReadOnly`, `InvalidState`.
    pub fn erase(&self, key: &[u8]) -> CoreResult<()> {
        let result = self.erase_inner(key);
        self.manager.track(result, DatabaseStats::record_erase)
    }

    fn erase_inner(&self, key: &[u8]) -> CoreResult<()> {
        let mut txn = self.core.lock();
        txn.ensure_writable()?;
        let id = txn.id();
        self.manager.store().with_commit_lock(|committed| {
            let claimed = self.manager.claim(id, key)?;
            let visible = match txn.pending(key) {
                Some(PendingWrite::Put(_)) => true,
                Some(PendingWrite::Erased) => false,
                None => committed.contains_key(key),
            };
            if !visible {
                if claimed {
                    self.manager.unclaim(key);
                }
                return Err(CoreError::NotFound);
            }
            Ok(())
        })?;
        txn.record_erase(key);
        Ok(())
    }

    /// Committed key count plus the net effect of this transaction's
    /// pending writes.
    pub fn key_count(&self) -> CoreResult<u64> {
        let txn = self.core.lock();
        txn.ensure_active()?;
        Ok(self.manager.store().read(|committed| txn.count_over(committed)))
    }

    /// Commits the transaction.
    ///
    /// # Errors
    ///
    /// - `InvalidState` if already committed or aborted
    /// - `CommitFailed` / `NeedsRecovery` if the store cannot apply the
    ///   batch; the transaction is then aborted
    pub fn commit(&self) -> CoreResult<()> {
        self.manager.commit(&self.core)
    }

    /// Aborts the transaction, discarding its pending log.
    ///
    /// # Errors
    ///
    /// `InvalidState` if already committed or aborted.
    pub fn abort(&self) -> CoreResult<()> {
        self.manager.abort(&self.core)
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        // Only an active transaction still holds a slot.
        if self.core.lock().state() == TransactionState::Active {
            if let Err(e) = self.manager.abort(&self.core) {
                tracing::debug!(error = %e, "abort on drop failed");
            }
        }
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let txn = self.core.lock();
        f.debug_struct("Transaction")
            .field("id", &txn.id())
            .field("state", &txn.state())
            .field("read_only", &txn.is_read_only())
            .field("pending", &txn.pending_len())
            .finish()
    }
}
