//! Transaction state and pending log.

use crate::error::{CoreError, CoreResult};
use crate::store::CommittedMap;
use crate::types::{Operation, SequenceNumber, TransactionId};
use std::collections::BTreeMap;

/// Lifecycle state of a transaction.
///
/// `Committed` and `Aborted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Open; accepts operations.
    Active,
    /// Applied to the store.
    Committed,
    /// Discarded.
    Aborted,
}

/// How `insert` treats a key that is already visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InsertMode {
    /// Fail with `DuplicateKey`.
    #[default]
    FailIfExists,
    /// Replace the visible value.
    Overwrite,
}

/// Latest pending effect on one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingWrite {
    /// The key will hold this value.
    Put(Vec<u8>),
    /// The key will be gone.
    Erased,
}

/// The shared core of a transaction.
///
/// Owned jointly by the caller's handle and, while active, by the manager's
/// active set.
#[derive(Debug)]
pub(crate) struct TxnCore {
    id: TransactionId,
    created_at: SequenceNumber,
    read_only: bool,
    state: TransactionState,
    /// Operations in issue order; replayed at commit.
    log: Vec<Operation>,
    /// Latest effect per key; used for reads and counting.
    overlay: BTreeMap<Vec<u8>, PendingWrite>,
}

impl TxnCore {
    pub(crate) fn new(id: TransactionId, created_at: SequenceNumber, read_only: bool) -> Self {
        Self {
            id,
            created_at,
            read_only,
            state: TransactionState::Active,
            log: Vec::new(),
            overlay: BTreeMap::new(),
        }
    }

    pub(crate) fn id(&self) -> TransactionId {
        self.id
    }

    pub(crate) fn created_at(&self) -> SequenceNumber {
        self.created_at
    }

    pub(crate) fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub(crate) fn state(&self) -> TransactionState {
        self.state
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.log.len()
    }

    pub(crate) fn ensure_active(&self) -> CoreResult<()> {
        if self.state == TransactionState::Active {
            Ok(())
        } else {
            Err(CoreError::InvalidState {
                id: self.id,
                state: self.state,
            })
        }
    }

    pub(crate) fn ensure_writable(&self) -> CoreResult<()> {
        self.ensure_active()?;
        if self.read_only {
            return Err(CoreError::ReadOnly { id: self.id });
        }
        Ok(())
    }

    pub(crate) fn pending(&self, key: &[u8]) -> Option<&PendingWrite> {
        self.overlay.get(key)
    }

    pub(crate) fn record_insert(&mut self, key: &[u8], value: &[u8]) {
        self.log.push(Operation::Insert {
            key: key.to_vec(),
            value: value.to_vec(),
        });
        self.overlay
            .insert(key.to_vec(), PendingWrite::Put(value.to_vec()));
    }

    pub(crate) fn record_erase(&mut self, key: &[u8]) {
        self.log.push(Operation::Erase { key: key.to_vec() });
        self.overlay.insert(key.to_vec(), PendingWrite::Erased);
    }

    /// Keys this transaction has pending writes on.
    pub(crate) fn touched_keys(&self) -> Vec<Vec<u8>> {
        self.overlay.keys().cloned().collect()
    }

    /// Committed key count adjusted by this transaction's pending effects.
    pub(crate) fn count_over(&self, committed: &CommittedMap) -> u64 {
        let mut count = committed.len() as u64;
        for (key, write) in &self.overlay {
            match (write, committed.contains_key(key)) {
                (PendingWrite::Put(_), false) => count += 1,
                (PendingWrite::Erased, true) => count -= 1,
                _ => {}
            }
        }
        count
    }

    /// Hands the log over for commit. The overlay is dropped with it.
    pub(crate) fn take_log(&mut self) -> Vec<Operation> {
        self.overlay.clear();
        std::mem::take(&mut self.log)
    }

    pub(crate) fn finish(&mut self, state: TransactionState) {
        debug_assert_ne!(state, TransactionState::Active);
        self.state = state;
        self.log.clear();
        self.overlay.clear();
    }
}
