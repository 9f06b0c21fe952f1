//! Fault-injecting backend wrapper for crash and failure tests.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct FaultState {
    fail_appends: AtomicBool,
    torn_writes: AtomicBool,
    fail_syncs: AtomicBool,
    appends_before_failure: AtomicU64,
}

/// Remote control for a [`FaultyBackend`].
///
/// The switch stays with the test while the backend is moved into a
/// database, so faults can be armed at any point.
#[derive(Debug, Clone, Default)]
pub struct FaultSwitch {
    state: Arc<FaultState>,
}

impl FaultSwitch {
    /// Makes every following append fail.
    pub fn fail_appends(&self) {
        self.state.appends_before_failure.store(0, Ordering::SeqCst);
        self.state.fail_appends.store(true, Ordering::SeqCst);
    }

    /// Lets `count` more appends succeed, then fails the rest.
    pub fn fail_after(&self, count: u64) {
        self.state
            .appends_before_failure
            .store(count, Ordering::SeqCst);
        self.state.fail_appends.store(true, Ordering::SeqCst);
    }

    /// When set, a failing append first writes half of its bytes.
    pub fn tear_writes(&self, torn: bool) {
        self.state.torn_writes.store(torn, Ordering::SeqCst);
    }

    /// Makes every following `flush` and `sync` fail. Appends still land.
    pub fn fail_syncs(&self) {
        self.state.fail_syncs.store(true, Ordering::SeqCst);
    }

    /// Disarms all faults.
    pub fn heal(&self) {
        self.state.fail_appends.store(false, Ordering::SeqCst);
        self.state.torn_writes.store(false, Ordering::SeqCst);
        self.state.fail_syncs.store(false, Ordering::SeqCst);
    }

    fn syncs_fail(&self) -> bool {
        self.state.fail_syncs.load(Ordering::SeqCst)
    }

    fn should_fail(&self) -> bool {
        if !self.state.fail_appends.load(Ordering::SeqCst) {
            return false;
        }
        // Spend one allowance if any are left.
        self.state
            .appends_before_failure
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_err()
    }
}

/// Wraps a backend and fails appends when its [`FaultSwitch`] says so.
///
/// ```rust
/// use burrow_storage::{FaultyBackend, MemoryBackend, StorageBackend};
///
/// let (mut backend, switch) = FaultyBackend::new(MemoryBackend::new());
/// backend.append(b"ok").unwrap();
/// switch.fail_appends();
/// assert!(backend.append(b"boom").is_err());
/// ```
#[derive(Debug)]
pub struct FaultyBackend<B> {
    inner: B,
    switch: FaultSwitch,
}

impl<B: StorageBackend> FaultyBackend<B> {
    /// Wraps `inner` and returns the switch controlling it.
    pub fn new(inner: B) -> (Self, FaultSwitch) {
        let switch = FaultSwitch::default();
        (
            Self {
                inner,
                switch: switch.clone(),
            },
            switch,
        )
    }

    /// Returns the wrapped backend.
    pub fn into_inner(self) -> B {
        self.inner
    }
}

impl<B: StorageBackend> StorageBackend for FaultyBackend<B> {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.inner.read_at(offset, len)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        if self.switch.should_fail() {
            if self.switch.state.torn_writes.load(Ordering::SeqCst) {
                self.inner.append(&data[..data.len() / 2])?;
            }
            return Err(StorageError::Injected("append refused"));
        }
        self.inner.append(data)
    }

    fn flush(&mut self) -> StorageResult<()> {
        if self.switch.syncs_fail() {
            return Err(StorageError::Injected("flush refused"));
        }
        self.inner.flush()
    }

    fn sync(&mut self) -> StorageResult<()> {
        if self.switch.syncs_fail() {
            return Err(StorageError::Injected("sync refused"));
        }
        self.inner.sync()
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.inner.truncate(new_size)
    }

    fn read_all(&self) -> StorageResult<Vec<u8>> {
        self.inner.read_all()
    }
}
