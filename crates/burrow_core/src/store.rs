//! Committed key/value state.
//!
//! The store knows nothing about transactions. It holds the committed map,
//! owns the journal, and applies resolved batches one at a time.

use crate::error::{CoreError, CoreResult};
use crate::journal::{Journal, Replay};
use crate::types::{Operation, SequenceNumber, TransactionId};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// Committed key/value map.
pub type CommittedMap = BTreeMap<Vec<u8>, Vec<u8>>;

/// Result of a successful apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Applied {
    /// Sequence assigned to the batch. `None` for an empty batch.
    pub sequence: Option<SequenceNumber>,
    /// Bytes appended to the journal.
    pub bytes: u64,
}

/// Size statistics over committed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreStatistics {
    /// Number of committed keys.
    pub key_count: u64,
    /// Sum of key lengths.
    pub total_key_bytes: u64,
    /// Shortest key, zero when empty.
    pub min_key_size: u64,
    /// Longest key.
    pub max_key_size: u64,
    /// Sum of value lengths.
    pub total_record_bytes: u64,
    /// Shortest value, zero when empty.
    pub min_record_size: u64,
    /// Longest value.
    pub max_record_size: u64,
}

/// What recovery found in the journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecoveryReport {
    /// Batches replayed.
    pub batches: usize,
    /// Highest sequence replayed.
    pub last_sequence: SequenceNumber,
    /// Bytes of torn tail that were cut off.
    pub torn_bytes: u64,
}

/// The durable record store.
#[derive(Debug)]
pub struct RecordStore {
    committed: RwLock<CommittedMap>,
    journal: Journal,
    /// Serializes apply and holds the last assigned sequence.
    commit_lock: Mutex<SequenceNumber>,
    poisoned: AtomicBool,
}

pub(crate) fn apply_ops(map: &mut CommittedMap, ops: impl IntoIterator<Item = Operation>) {
    for op in ops {
        match op {
            Operation::Insert { key, value } => {
                map.insert(key, value);
            }
            Operation::Erase { key } => {
                map.remove(&key);
            }
        }
    }
}

/// Rebuilds committed state from a replayed journal.
///
/// # Errors
///
/// Returns `JournalCorruption` if sequences do not strictly increase.
pub fn rebuild(replay: Replay) -> CoreResult<(CommittedMap, SequenceNumber)> {
    let mut map = CommittedMap::new();
    let mut last = SequenceNumber::default();
    for batch in replay.batches {
        if batch.sequence <= last {
            return Err(CoreError::journal_corruption(
                replay.valid_len,
                format!("{} replayed after {}", batch.sequence, last),
            ));
        }
        last = batch.sequence;
        apply_ops(&mut map, batch.ops);
    }
    Ok((map, last))
}

impl RecordStore {
    /// Replays `journal` and returns a store holding its committed state.
    ///
    /// A torn tail is cut off; corruption aborts the open.
    pub fn recover(journal: Journal) -> CoreResult<(Self, RecoveryReport)> {
        let replay = journal.replay()?;
        let torn_bytes = replay.torn_bytes;
        let valid_len = replay.valid_len;
        let batches = replay.batches.len();

        if torn_bytes > 0 {
            tracing::warn!(
                valid_len,
                torn_bytes,
                "cutting torn journal tail left by an interrupted write"
            );
            journal.cut_torn_tail(valid_len)?;
        }

        let (committed, last_sequence) = rebuild(replay)?;
        tracing::debug!(batches, %last_sequence, keys = committed.len(), "journal replayed");

        let store = Self {
            committed: RwLock::new(committed),
            journal,
            commit_lock: Mutex::new(last_sequence),
            poisoned: AtomicBool::new(false),
        };
        Ok((
            store,
            RecoveryReport {
                batches,
                last_sequence,
                torn_bytes,
            },
        ))
    }

    /// Returns the committed value for `key`.
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.committed.read().get(key).cloned()
    }

    /// Returns whether `key` is committed.
    pub fn contains(&self, key: &[u8]) -> bool {
        self.committed.read().contains_key(key)
    }

    /// Returns the number of committed keys.
    pub fn len(&self) -> usize {
        self.committed.read().len()
    }

    /// Runs `f` against committed state under the shared lock.
    pub fn read<R>(&self, f: impl FnOnce(&CommittedMap) -> R) -> R {
        f(&self.committed.read())
    }

    /// Returns whether an earlier apply failed.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::Acquire)
    }

    /// Returns the last sequence handed out.
    pub fn last_sequence(&self) -> SequenceNumber {
        *self.commit_lock.lock()
    }

    /// Runs `f` against committed state while holding the commit lock, so no
    /// batch lands until it returns.
    pub fn with_commit_lock<R>(&self, f: impl FnOnce(&CommittedMap) -> R) -> R {
        let _guard = self.commit_lock.lock();
        f(&self.committed.read())
    }

    /// Resolves and applies one batch.
    ///
    /// `build` runs under the commit lock with a view of committed state and
    /// returns the operations to apply. Its error is returned unchanged and
    /// nothing is written. A non-empty batch is journaled as one frame,
    /// applied to the map in order, then synced if configured.
    ///
    /// # Errors
    ///
    /// - `NeedsRecovery` if the store is poisoned
    /// - `CommitFailed` if the journal write fails; nothing was applied and
    ///   the store is poisoned
    /// - `SyncFailed` if only the sync fails; the batch was applied and the
    ///   store is poisoned
    pub fn apply<F>(&self, id: TransactionId, build: F) -> CoreResult<Applied>
    where
        F: FnOnce(&CommittedMap) -> CoreResult<Vec<Operation>>,
    {
        let mut last = self.commit_lock.lock();
        if self.is_poisoned() {
            return Err(CoreError::NeedsRecovery);
        }

        let ops = build(&self.committed.read())?;
        if ops.is_empty() {
            return Ok(Applied {
                sequence: None,
                bytes: 0,
            });
        }

        let sequence = last.next();
        let bytes = match self.journal.append(sequence, &ops) {
            Ok(bytes) => bytes,
            Err(CoreError::Storage(source)) => {
                self.poisoned.store(true, Ordering::Release);
                tracing::error!(%id, %sequence, error = %source, "journal append failed, store poisoned");
                return Err(CoreError::CommitFailed { id, source });
            }
            Err(e) => return Err(e),
        };

        apply_ops(&mut self.committed.write(), ops);
        *last = sequence;

        if let Err(e) = self.journal.sync_commit() {
            self.poisoned.store(true, Ordering::Release);
            tracing::error!(%id, %sequence, error = %e, "journal sync failed, store poisoned");
            return Err(match e {
                CoreError::Storage(source) => CoreError::SyncFailed {
                    id,
                    sequence,
                    source,
                },
                other => other,
            });
        }
        Ok(Applied {
            sequence: Some(sequence),
            bytes,
        })
    }

    /// Flushes and syncs the journal.
    pub fn sync(&self) -> CoreResult<()> {
        let _guard = self.commit_lock.lock();
        self.journal.sync()
    }

    /// Returns the journal size in bytes.
    pub fn journal_size(&self) -> CoreResult<u64> {
        self.journal.size()
    }

    /// Returns a sorted copy of committed pairs.
    pub fn entries(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.committed
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Computes size statistics over committed state.
    pub fn statistics(&self) -> StoreStatistics {
        statistics_of(&self.committed.read())
    }
}

/// Computes size statistics over any committed map.
pub fn statistics_of(map: &CommittedMap) -> StoreStatistics {
    let mut stats = StoreStatistics::default();
    for (i, (key, value)) in map.iter().enumerate() {
        let (k, v) = (key.len() as u64, value.len() as u64);
        stats.total_key_bytes += k;
        stats.total_record_bytes += v;
        if i == 0 {
            stats.min_key_size = k;
            stats.min_record_size = v;
        } else {
            stats.min_key_size = stats.min_key_size.min(k);
            stats.min_record_size = stats.min_record_size.min(v);
        }
        stats.max_key_size = stats.max_key_size.max(k);
        stats.max_record_size = stats.max_record_size.max(v);
    }
    stats.key_count = map.len() as u64;
    stats
}
