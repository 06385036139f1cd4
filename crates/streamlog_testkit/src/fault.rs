//! Fault-injecting record store wrapper.
//!
//! Wraps any [`RecordStore`] and fails operations on demand, so tests can
//! exercise the error paths of flushing, rewriting, and recovery without a
//! real failing device.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use streamlog_store::{PhysicalRecord, RecordRange, RecordStore, StoreError, StoreResult};

/// A record store that injects failures.
///
/// Writes succeed until the configured budget is exhausted; reads can be
/// failed wholesale. Failure injection is controlled through shared-state
/// setters so a test can flip behavior while a stream session holds the
/// store.
pub struct FaultyRecordStore {
    inner: Box<dyn RecordStore>,
    writes_before_failure: AtomicUsize,
    fail_reads: AtomicBool,
}

impl FaultyRecordStore {
    /// Wraps `inner` with no failures armed.
    #[must_use]
    pub fn new(inner: Box<dyn RecordStore>) -> Self {
        Self {
            inner,
            writes_before_failure: AtomicUsize::new(usize::MAX),
            fail_reads: AtomicBool::new(false),
        }
    }

    /// Allows `budget` more writes, then fails every write after that.
    pub fn fail_writes_after(&self, budget: usize) {
        self.writes_before_failure.store(budget, Ordering::SeqCst);
    }

    /// Fails all reads while set.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Disarms all injected failures.
    pub fn reset(&self) {
        self.writes_before_failure
            .store(usize::MAX, Ordering::SeqCst);
        self.fail_reads.store(false, Ordering::SeqCst);
    }

    fn injected(kind: &str) -> StoreError {
        StoreError::Io(io::Error::other(format!("injected {kind} failure")))
    }

    fn check_read(&self) -> StoreResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Self::injected("read"));
        }
        Ok(())
    }
}

impl RecordStore for FaultyRecordStore {
    fn write(
        &mut self,
        key: u64,
        version: u64,
        metadata: &[u8],
        payload: &[u8],
        reservation: u64,
    ) -> StoreResult<()> {
        let budget = self.writes_before_failure.load(Ordering::SeqCst);
        if budget == 0 {
            return Err(Self::injected("write"));
        }
        if budget != usize::MAX {
            self.writes_before_failure
                .store(budget - 1, Ordering::SeqCst);
        }
        self.inner.write(key, version, metadata, payload, reservation)
    }

    fn read(&self, key: u64) -> StoreResult<PhysicalRecord> {
        self.check_read()?;
        self.inner.read(key)
    }

    fn read_next(&self, key: u64) -> StoreResult<PhysicalRecord> {
        self.check_read()?;
        self.inner.read_next(key)
    }

    fn read_previous(&self, key: u64) -> StoreResult<PhysicalRecord> {
        self.check_read()?;
        self.inner.read_previous(key)
    }

    fn read_containing(&self, key: u64) -> StoreResult<PhysicalRecord> {
        self.check_read()?;
        self.inner.read_containing(key)
    }

    fn truncate(&mut self, key: u64) -> StoreResult<()> {
        self.inner.truncate(key)
    }

    fn extend_reservation(&mut self, bytes: u64) -> StoreResult<()> {
        self.inner.extend_reservation(bytes)
    }

    fn contract_reservation(&mut self, bytes: u64) -> StoreResult<()> {
        self.inner.contract_reservation(bytes)
    }

    fn record_range(&self) -> StoreResult<RecordRange> {
        self.inner.record_range()
    }

    fn reserved_metadata_capacity(&self) -> usize {
        self.inner.reserved_metadata_capacity()
    }
}
