//! Database handle.

use crate::config::{ClosePolicy, Config};
use crate::dir::DatabaseDir;
use crate::error::{CoreError, CoreResult};
use crate::journal::{check_field, Journal};
use crate::stats::{DatabaseStats, StatsSnapshot};
use crate::store::{RecordStore, RecoveryReport, StoreStatistics};
use crate::transaction::{InsertMode, Transaction, TransactionManager};
use crate::types::{Operation, SequenceNumber};
use burrow_storage::{FileBackend, MemoryBackend, StorageBackend};
use std::path::Path;
use std::sync::Arc;

/// An open database.
///
/// Every operation takes an optional transaction. With one, the operation
/// joins that transaction's pending log; without one it is auto-committed
/// as a single-operation batch.
///
/// ```rust
/// use burrow_core::{Config, CoreError, Database, MemoryBackend};
///
/// let db = Database::open_with_backend(
///     Config::default().max_transactions(1),
///     Box::new(MemoryBackend::new()),
/// )
/// .unwrap();
///
/// let txn = db.begin().unwrap();
/// assert!(matches!(db.begin(), Err(CoreError::ResourceLimitReached { capacity: 1 })));
///
/// db.insert(Some(&txn), b"key", b"value").unwrap();
/// assert_eq!(db.key_count(Some(&txn)).unwrap(), 1);
/// assert_eq!(db.key_count(None).unwrap(), 0);
///
/// db.commit(&txn).unwrap();
/// assert_eq!(db.find(None, b"key").unwrap(), b"value");
/// ```
///
/// `Database` is `Send + Sync`; share it between threads behind an `Arc`.
/// Dropping it closes it with the configured [`ClosePolicy`].
pub struct Database {
    config: Config,
    /// Holds the directory lock. `None` for databases on a bare backend.
    dir: Option<DatabaseDir>,
    store: Arc<RecordStore>,
    manager: Arc<TransactionManager>,
    stats: Arc<DatabaseStats>,
    recovery: RecoveryReport,
}

impl Database {
    /// Opens or creates the database in directory `path` with defaults.
    ///
    /// # Errors
    ///
    /// - `DatabaseLocked` if another handle has the directory open
    /// - `JournalCorruption` / `ChecksumMismatch` if the journal is damaged
    pub fn open(path: &Path) -> CoreResult<Self> {
        Self::open_with_config(path, Config::default())
    }

    /// Opens or creates the database in directory `path`.
    pub fn open_with_config(path: &Path, config: Config) -> CoreResult<Self> {
        config.validate()?;
        let dir = DatabaseDir::open(path, &config)?;
        let backend = FileBackend::open(&dir.journal_path())?;
        let mut db = Self::open_with_backend(config, Box::new(backend))?;
        tracing::info!(
            path = %dir.path().display(),
            keys = db.store.len(),
            last_sequence = %db.recovery.last_sequence,
            "database opened"
        );
        db.dir = Some(dir);
        Ok(db)
    }

    /// Opens a database whose journal lives on `backend`.
    ///
    /// No directory lock is taken.
    pub fn open_with_backend(config: Config, backend: Box<dyn StorageBackend>) -> CoreResult<Self> {
        config.validate()?;
        let journal = Journal::new(backend, config.sync_on_commit);
        let (store, recovery) = RecordStore::recover(journal)?;
        let store = Arc::new(store);
        let stats = Arc::new(DatabaseStats::new());
        let manager = Arc::new(TransactionManager::new(
            Arc::clone(&store),
            Arc::clone(&stats),
            &config,
        ));

        Ok(Self {
            config,
            dir: None,
            store,
            manager,
            stats,
            recovery,
        })
    }

    /// Opens an empty in-memory database with default configuration.
    pub fn open_in_memory() -> CoreResult<Self> {
        Self::open_with_backend(Config::default(), Box::new(MemoryBackend::new()))
    }

    fn ensure_open(&self) -> CoreResult<()> {
        if self.manager.is_closed() {
            Err(CoreError::DatabaseClosed)
        } else {
            Ok(())
        }
    }

    fn ensure_owned(&self, txn: &Transaction) -> CoreResult<()> {
        if txn.belongs_to(&self.manager) {
            Ok(())
        } else {
            Err(CoreError::ForeignTransaction { id: txn.id() })
        }
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Begins a transaction.
    ///
    /// # Errors
    ///
    /// - `ResourceLimitReached` if `max_transactions` are already active
    /// - `TransactionsDisabled`, `DatabaseClosed`
    pub fn begin(&self) -> CoreResult<Transaction> {
        self.manager.begin(false)
    }

    /// Begins a transaction that may only read.
    pub fn begin_read_only(&self) -> CoreResult<Transaction> {
        self.manager.begin(true)
    }

    /// Commits `txn`. Same as [`Transaction::commit`] after an ownership check.
    pub fn commit(&self, txn: &Transaction) -> CoreResult<()> {
        self.ensure_owned(txn)?;
        txn.commit()
    }

    /// Aborts `txn`. Same as [`Transaction::abort`] after an ownership check.
    pub fn abort(&self, txn: &Transaction) -> CoreResult<()> {
        self.ensure_owned(txn)?;
        txn.abort()
    }

    /// Runs `f` in a new transaction.
    ///
    /// Commits if `f` returns `Ok` and aborts if it returns `Err`.
    ///
    /// ```rust
    /// use burrow_core::Database;
    ///
    /// let db = Database::open_in_memory().unwrap();
    /// db.transaction(|txn| {
    ///     txn.insert(b"a", b"1")?;
    ///     txn.insert(b"b", b"2")
    /// })
    /// .unwrap();
    /// assert_eq!(db.key_count(None).unwrap(), 2);
    /// ```
    pub fn transaction<F, T>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce(&Transaction) -> CoreResult<T>,
    {
        let txn = self.begin()?;
        match f(&txn) {
            Ok(value) => {
                if txn.is_active() {
                    txn.commit()?;
                }
                Ok(value)
            }
            Err(e) => {
                if txn.is_active() {
                    txn.abort()?;
                }
                Err(e)
            }
        }
    }

    // ========================================================================
    // Records
    // ========================================================================

    /// Inserts a key that must not yet be visible.
    ///
    /// # Errors
    ///
    /// `DuplicateKey` if the key is visible to the caller,
    /// `TransactionConflict` if another active transaction has written it.
    pub fn insert(&self, txn: Option<&Transaction>, key: &[u8], value: &[u8]) -> CoreResult<()> {
        self.insert_with(txn, key, value, InsertMode::FailIfExists)
    }

    /// Inserts with an explicit [`InsertMode`].
    pub fn insert_with(
        &self,
        txn: Option<&Transaction>,
        key: &[u8],
        value: &[u8],
        mode: InsertMode,
    ) -> CoreResult<()> {
        match txn {
            Some(txn) => {
                self.ensure_owned(txn)?;
                txn.insert_with(key, value, mode)
            }
            None => {
                let result = self.auto_insert(key, value, mode);
                self.manager.track(result, DatabaseStats::record_write)
            }
        }
    }

    /// Looks up a key.
    ///
    /// # Errors
    ///
    /// `NotFound` if the key is not visible to the caller.
    pub fn find(&self, txn: Option<&Transaction>, key: &[u8]) -> CoreResult<Vec<u8>> {
        match txn {
            Some(txn) => {
                self.ensure_owned(txn)?;
                txn.find(key)
            }
            None => {
                let result = self
                    .ensure_open()
                    .and_then(|()| self.store.get(key).ok_or(CoreError::NotFound));
                self.manager.track(result, DatabaseStats::record_read)
            }
        }
    }

    /// Erases a key.
    ///
    /// # Errors
    ///
    /// `NotFound` if the key is not visible to the caller.
    pub fn erase(&self, txn: Option<&Transaction>, key: &[u8]) -> CoreResult<()> {
        match txn {
            Some(txn) => {
                self.ensure_owned(txn)?;
                txn.erase(key)
            }
            None => {
                let result = self.auto_erase(key);
                self.manager.track(result, DatabaseStats::record_erase)
            }
        }
    }

    /// Number of keys visible to the caller.
    pub fn key_count(&self, txn: Option<&Transaction>) -> CoreResult<u64> {
        match txn {
            Some(txn) => {
                self.ensure_owned(txn)?;
                txn.key_count()
            }
            None => {
                self.ensure_open()?;
                Ok(self.store.len() as u64)
            }
        }
    }

    fn auto_insert(&self, key: &[u8], value: &[u8], mode: InsertMode) -> CoreResult<()> {
        self.ensure_open()?;
        check_field(key)?;
        check_field(value)?;
        let id = self.manager.next_id();
        let applied = self.store.apply(id, |committed| {
            self.manager.ensure_unclaimed(key)?;
            if mode == InsertMode::FailIfExists && committed.contains_key(key) {
                return Err(CoreError::DuplicateKey);
            }
            Ok(vec![Operation::Insert {
                key: key.to_vec(),
                value: value.to_vec(),
            }])
        })?;
        self.stats.record_auto_commit();
        self.stats.record_journaled(applied.bytes);
        Ok(())
    }

    fn auto_erase(&self, key: &[u8]) -> CoreResult<()> {
        self.ensure_open()?;
        let id = self.manager.next_id();
        let applied = self.store.apply(id, |committed| {
            self.manager.ensure_unclaimed(key)?;
            if !committed.contains_key(key) {
                return Err(CoreError::NotFound);
            }
            Ok(vec![Operation::Erase { key: key.to_vec() }])
        })?;
        self.stats.record_auto_commit();
        self.stats.record_journaled(applied.bytes);
        Ok(())
    }

    // ========================================================================
    // Maintenance and introspection
    // ========================================================================

    /// Flushes and syncs the journal, making every commit so far durable
    /// even with `sync_on_commit` off.
    pub fn checkpoint(&self) -> CoreResult<()> {
        self.ensure_open()?;
        self.store.sync()?;
        self.stats.record_checkpoint();
        tracing::debug!(sequence = %self.store.last_sequence(), "checkpoint");
        Ok(())
    }

    /// Returns a copy of the operation counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Returns size statistics over committed state.
    #[must_use]
    pub fn statistics(&self) -> StoreStatistics {
        self.store.statistics()
    }

    /// Returns every committed pair, sorted by key.
    #[must_use]
    pub fn entries(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.store.entries()
    }

    /// Returns what was recovered from the journal at open.
    #[must_use]
    pub fn recovery(&self) -> RecoveryReport {
        self.recovery
    }

    /// Returns the sequence of the last applied batch.
    #[must_use]
    pub fn last_sequence(&self) -> SequenceNumber {
        self.store.last_sequence()
    }

    /// Returns the journal size in bytes.
    pub fn journal_size(&self) -> CoreResult<u64> {
        self.store.journal_size()
    }

    /// Returns `true` once a failed commit has poisoned the store.
    #[must_use]
    pub fn needs_recovery(&self) -> bool {
        self.store.is_poisoned()
    }

    /// Number of active transactions.
    #[must_use]
    pub fn active_transactions(&self) -> usize {
        self.manager.active_count()
    }

    /// Maximum number of simultaneously active transactions.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.manager.capacity()
    }

    /// Returns the configuration the database was opened with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the directory path, if the database lives in one.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.dir.as_ref().map(DatabaseDir::path)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Closes with the configured [`ClosePolicy`].
    pub fn close(&self) -> CoreResult<()> {
        self.close_with(self.config.close_policy)
    }

    /// Closes, resolving active transactions according to `policy`.
    ///
    /// Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// `TransactionsStillOpen` under [`ClosePolicy::Refuse`]; the database
    /// stays open in that case.
    pub fn close_with(&self, policy: ClosePolicy) -> CoreResult<()> {
        if self.manager.is_closed() {
            return Ok(());
        }
        let resolved = self.manager.shutdown(policy);
        let synced = self.store.sync();
        tracing::debug!(?policy, "database closed");
        resolved.and(synced)
    }

    /// Returns `true` until the database is closed.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.manager.is_closed()
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.path())
            .field("is_open", &self.is_open())
            .field("keys", &self.store.len())
            .field("active_transactions", &self.active_transactions())
            .field("last_sequence", &self.last_sequence())
            .finish_non_exhaustive()
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        match self.close() {
            Ok(()) => {}
            Err(CoreError::TransactionsStillOpen { count }) => {
                tracing::warn!(count, "dropping database with open transactions, aborting them");
                if let Err(e) = self.close_with(ClosePolicy::AutoAbort) {
                    tracing::error!(error = %e, "close failed");
                }
            }
            Err(e) => tracing::error!(error = %e, "close failed"),
        }
    }
}
