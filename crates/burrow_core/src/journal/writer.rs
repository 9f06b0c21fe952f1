//! Journal appends and replay.

use crate::error::CoreResult;
use crate::journal::frame::{decode_frame, encode_frame, Batch, Decoded};
use crate::types::{Operation, SequenceNumber};
use burrow_storage::StorageBackend;
use parking_lot::Mutex;

/// Everything recovered from a journal scan.
#[derive(Debug, Default)]
pub struct Replay {
    /// Complete, valid batches in journal order.
    pub batches: Vec<Batch>,
    /// Length of the valid prefix in bytes.
    pub valid_len: u64,
    /// Bytes after the valid prefix that form an incomplete frame.
    pub torn_bytes: u64,
}

impl Replay {
    /// Returns the highest sequence number seen, or zero for an empty journal.
    #[must_use]
    pub fn last_sequence(&self) -> SequenceNumber {
        self.batches
            .iter()
            .map(|batch| batch.sequence)
            .max()
            .unwrap_or_default()
    }
}

/// Append-only journal over a storage backend.
pub struct Journal {
    backend: Mutex<Box<dyn StorageBackend>>,
    sync_on_commit: bool,
}

impl Journal {
    /// Wraps a backend.
    pub fn new(backend: Box<dyn StorageBackend>, sync_on_commit: bool) -> Self {
        Self {
            backend: Mutex::new(backend),
            sync_on_commit,
        }
    }

    /// Appends one batch as a single frame.
    ///
    /// Returns the number of bytes written. The frame is not synced; see
    /// [`Journal::sync_commit`].
    ///
    /// # Errors
    ///
    /// [`crate::CoreError::TooLarge`] is returned before anything is written.
    /// [`crate::CoreError::Storage`] means the write failed. The journal is
    /// cut back to its previous size; if that cut fails too, the partial
    /// frame is left as a torn tail for the next open.
    pub fn append(&self, sequence: SequenceNumber, ops: &[Operation]) -> CoreResult<u64> {
        let frame = encode_frame(sequence, ops)?;

        let mut backend = self.backend.lock();
        let before = backend.size()?;
        if let Err(e) = backend.append(&frame) {
            if let Err(cut) = backend.truncate(before) {
                tracing::warn!(size = before, error = %cut, "could not cut back a failed append");
            }
            return Err(e.into());
        }
        Ok(frame.len() as u64)
    }

    /// Makes the frames appended so far durable if `sync_on_commit` is set.
    pub fn sync_commit(&self) -> CoreResult<()> {
        if self.sync_on_commit {
            self.sync()
        } else {
            Ok(())
        }
    }

    /// Scans the journal from the start.
    ///
    /// A torn tail is reported in [`Replay::torn_bytes`] but left in place.
    ///
    /// # Errors
    ///
    /// Returns the first corruption or checksum error met.
    pub fn replay(&self) -> CoreResult<Replay> {
        let bytes = self.backend.lock().read_all()?;
        let mut replay = Replay::default();
        let mut pos = 0usize;

        while pos < bytes.len() {
            match decode_frame(&bytes[pos..], pos as u64)? {
                Decoded::Frame { batch, len } => {
                    replay.batches.push(batch);
                    pos += len;
                }
                Decoded::Torn => {
                    replay.torn_bytes = (bytes.len() - pos) as u64;
                    break;
                }
            }
        }

        replay.valid_len = pos as u64;
        Ok(replay)
    }

    /// Drops everything after `valid_len`.
    pub fn cut_torn_tail(&self, valid_len: u64) -> CoreResult<()> {
        let mut backend = self.backend.lock();
        backend.truncate(valid_len)?;
        backend.sync()?;
        Ok(())
    }

    /// Flushes and syncs all appended frames.
    pub fn sync(&self) -> CoreResult<()> {
        let mut backend = self.backend.lock();
        backend.flush()?;
        backend.sync()?;
        Ok(())
    }

    /// Returns the journal size in bytes.
    pub fn size(&self) -> CoreResult<u64> {
        Ok(self.backend.lock().size()?)
    }
}

impl std::fmt::Debug for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Journal")
            .field("sync_on_commit", &self.sync_on_commit)
            .finish_non_exhaustive()
    }
}
