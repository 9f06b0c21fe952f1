//! Error types for BurrowDB core.

use crate::transaction::TransactionState;
use crate::types::{SequenceNumber, TransactionId};
use burrow_storage::StorageError;
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors returned by the engine.
///
/// Callers are expected to match on the variants: `NotFound` and
/// `DuplicateKey` are routine, `ResourceLimitReached` and
/// `TransactionConflict` are retryable,
/// `InvalidState` is a caller bug, and anything for which
/// [`CoreError::is_fatal`] returns `true` means the database must be reopened.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Every transaction slot is taken.
    #[error("transaction limit reached: {capacity} already active")]
    ResourceLimitReached {
        /// Configured maximum of concurrently active transactions.
        capacity: usize,
    },

    /// The transaction is not in the state the operation needs.
    #[error("{id} is {state:?}, expected Active")]
    InvalidState {
        /// The transaction the operation was attempted on.
        id: TransactionId,
        /// The state it was found in.
        state: TransactionState,
    },

    /// A transaction handle was passed to a database that did not create it.
    #[error("{id} belongs to another database")]
    ForeignTransaction {
        /// The foreign transaction.
        id: TransactionId,
    },

    /// The key is absent from the state visible to the caller.
    #[error("key not found")]
    NotFound,

    /// The key is already visible and the insert did not ask to overwrite.
    #[error("key already exists")]
    DuplicateKey,

    /// Another active transaction has a pending write on the key.
    #[error("key has a pending write in {owner}")]
    TransactionConflict {
        /// The transaction holding the key.
        owner: TransactionId,
    },

    /// A key or value does not fit the journal's 32-bit length fields.
    #[error("{len} bytes exceed the journal limit of {max}")]
    TooLarge {
        /// Offending length.
        len: usize,
        /// Largest accepted length.
        max: usize,
    },

    /// A write was attempted through a read-only transaction.
    #[error("{id} is read-only")]
    ReadOnly {
        /// The read-only transaction.
        id: TransactionId,
    },

    /// `begin` was called on a database opened without transactions.
    #[error("transactions are disabled for this database")]
    TransactionsDisabled,

    /// Close was refused because transactions are still active.
    #[error("{count} transaction(s) still active")]
    TransactionsStillOpen {
        /// Number of active transactions.
        count: usize,
    },

    /// Applying a commit to durable state failed part way.
    ///
    /// Nothing of the batch is visible, but the journal tail is suspect and
    /// the database has to be reopened.
    #[error("commit of {id} failed, database needs recovery: {source}")]
    CommitFailed {
        /// The transaction (or auto-commit pseudo transaction) being applied.
        id: TransactionId,
        /// The underlying storage failure.
        #[source]
        source: StorageError,
    },

    /// The batch was journaled and applied, but syncing the journal failed.
    ///
    /// The writes are visible and will most likely survive a reopen, but
    /// their durability is unknown. The store is poisoned.
    #[error("{id} applied as {sequence}, but the journal sync failed: {source}")]
    SyncFailed {
        /// The transaction (or auto-commit pseudo transaction) applied.
        id: TransactionId,
        /// Sequence the batch was journaled under.
        sequence: SequenceNumber,
        /// The underlying storage failure.
        #[source]
        source: StorageError,
    },

    /// An earlier apply failed; the store refuses further writes.
    #[error("database needs recovery after a failed commit")]
    NeedsRecovery,

    /// The database has been closed.
    #[error("database is closed")]
    DatabaseClosed,

    /// Another process holds the directory lock.
    #[error("database locked: another process has exclusive access")]
    DatabaseLocked,

    /// The configuration cannot be used to open a database.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// What is wrong with it.
        message: String,
    },

    /// The journal contains bytes that are not a valid frame.
    #[error("journal corruption at offset {offset}: {message}")]
    JournalCorruption {
        /// Byte offset of the offending frame.
        offset: u64,
        /// Description of the corruption.
        message: String,
    },

    /// A journal frame failed its checksum.
    #[error("checksum mismatch at offset {offset}: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Byte offset of the frame.
        offset: u64,
        /// Stored checksum.
        expected: u32,
        /// Computed checksum.
        actual: u32,
    },

    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O error outside the storage backend (directory handling).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CoreError {
    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Creates a journal corruption error.
    pub fn journal_corruption(offset: u64, message: impl Into<String>) -> Self {
        Self::JournalCorruption {
            offset,
            message: message.into(),
        }
    }

    /// Returns `true` for errors after which the database must be reopened.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::CommitFailed { .. }
                | Self::SyncFailed { .. }
                | Self::NeedsRecovery
                | Self::JournalCorruption { .. }
                | Self::ChecksumMismatch { .. }
        )
    }

    /// Returns `true` if retrying later may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ResourceLimitReached { .. } | Self::TransactionConflict { .. }
        )
    }
}
