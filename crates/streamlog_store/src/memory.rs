//! In-memory record store for testing and ephemeral streams.

use crate::error::{StoreError, StoreResult};
use crate::store::{PhysicalRecord, RecordRange, RecordStore};
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Default capacity of the reserved metadata region, in bytes.
pub const DEFAULT_METADATA_CAPACITY: usize = 256;

#[derive(Debug, Default)]
struct Inner {
    records: BTreeMap<u64, PhysicalRecord>,
    highest_version: u64,
    truncation_key: Option<u64>,
    used_bytes: u64,
    reserved_bytes: u64,
}

/// An in-memory record store.
///
/// Suitable for unit tests, integration tests, and streams that do not need
/// persistence. Records live in a key-ordered map; version admission and
/// supersede-on-rewrite follow the [`RecordStore`] contract.
///
/// # Thread Safety
///
/// The store is thread-safe and can be shared across threads.
#[derive(Debug)]
pub struct InMemoryRecordStore {
    inner: RwLock<Inner>,
    capacity: Option<u64>,
    metadata_capacity: usize,
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRecordStore {
    /// Creates an empty store with unlimited capacity.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            capacity: None,
            metadata_capacity: DEFAULT_METADATA_CAPACITY,
        }
    }

    /// Creates an empty store that reports full beyond `capacity` bytes.
    #[must_use]
    pub fn with_capacity(capacity: u64) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            capacity: Some(capacity),
            metadata_capacity: DEFAULT_METADATA_CAPACITY,
        }
    }

    /// Overrides the reserved metadata region capacity.
    ///
    /// Small capacities force the logical layer to spill its header into the
    /// payload region, which is useful for exercising that path in tests.
    #[must_use]
    pub fn with_metadata_capacity(mut self, bytes: usize) -> Self {
        self.metadata_capacity = bytes;
        self
    }

    /// Number of retained records.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.inner.read().records.len()
    }

    /// Highest version the store has admitted.
    #[must_use]
    pub fn highest_admitted_version(&self) -> u64 {
        self.inner.read().highest_version
    }

    /// Flips one bit inside the metadata region of the record at `key`.
    ///
    /// For corruption tests; panics if the key or byte index is absent.
    pub fn corrupt_metadata(&self, key: u64, byte_index: usize) {
        let mut inner = self.inner.write();
        let record = inner.records.get_mut(&key).expect("no record at key");
        record.metadata[byte_index] ^= 0x01;
    }

    /// Flips one bit inside the payload region of the record at `key`.
    ///
    /// For corruption tests; panics if the key or byte index is absent.
    pub fn corrupt_payload(&self, key: u64, byte_index: usize) {
        let mut inner = self.inner.write();
        let record = inner.records.get_mut(&key).expect("no record at key");
        record.payload[byte_index] ^= 0x01;
    }

    /// Returns the keys of all retained records in order.
    #[must_use]
    pub fn keys(&self) -> Vec<u64> {
        self.inner.read().records.keys().copied().collect()
    }
}

impl RecordStore for InMemoryRecordStore {
    fn write(
        &mut self,
        key: u64,
        version: u64,
        metadata: &[u8],
        payload: &[u8],
        reservation: u64,
    ) -> StoreResult<()> {
        let mut inner = self.inner.write();

        if version <= inner.highest_version {
            return Err(StoreError::OutOfSequence {
                version,
                highest: inner.highest_version,
            });
        }

        if reservation > inner.reserved_bytes {
            return Err(StoreError::InsufficientReservation {
                requested: reservation,
                reserved: inner.reserved_bytes,
            });
        }

        let needed = (metadata.len() + payload.len()) as u64;
        let superseded: u64 = inner
            .records
            .range(key..)
            .map(|(_, r)| r.size())
            .sum();
        let used_after = inner.used_bytes - superseded;

        if let Some(capacity) = self.capacity {
            let allowed = capacity + reservation;
            if used_after + needed > allowed {
                return Err(StoreError::Full {
                    needed,
                    available: allowed.saturating_sub(used_after),
                });
            }
        }

        // Admission succeeded; supersede everything at or beyond the key.
        let superseded_tail = inner.records.split_off(&key);
        drop(superseded_tail);
        inner.used_bytes = used_after + needed;
        inner.reserved_bytes -= reservation;
        inner.highest_version = version;
        inner.records.insert(
            key,
            PhysicalRecord {
                key,
                version,
                metadata: metadata.to_vec(),
                payload: payload.to_vec(),
            },
        );
        Ok(())
    }

    fn read(&self, key: u64) -> StoreResult<PhysicalRecord> {
        self.inner
            .read()
            .records
            .get(&key)
            .cloned()
            .ok_or(StoreError::RecordNotFound { key })
    }

    fn read_next(&self, key: u64) -> StoreResult<PhysicalRecord> {
        self.inner
            .read()
            .records
            .range(key.saturating_add(1)..)
            .next()
            .map(|(_, r)| r.clone())
            .ok_or(StoreError::RecordNotFound { key })
    }

    fn read_previous(&self, key: u64) -> StoreResult<PhysicalRecord> {
        self.inner
            .read()
            .records
            .range(..key)
            .next_back()
            .map(|(_, r)| r.clone())
            .ok_or(StoreError::RecordNotFound { key })
    }

    fn read_containing(&self, key: u64) -> StoreResult<PhysicalRecord> {
        self.inner
            .read()
            .records
            .range(..=key)
            .next_back()
            .map(|(_, r)| r.clone())
            .ok_or(StoreError::RecordNotFound { key })
    }

    fn truncate(&mut self, key: u64) -> StoreResult<()> {
        let mut inner = self.inner.write();
        if inner.truncation_key.is_some_and(|t| key <= t) {
            return Ok(());
        }
        let retained = inner.records.split_off(&key);
        let dropped: u64 = inner.records.values().map(PhysicalRecord::size).sum();
        inner.records = retained;
        inner.used_bytes -= dropped;
        inner.truncation_key = Some(key);
        Ok(())
    }

    fn extend_reservation(&mut self, bytes: u64) -> StoreResult<()> {
        self.inner.write().reserved_bytes += bytes;
        Ok(())
    }

    fn contract_reservation(&mut self, bytes: u64) -> StoreResult<()> {
        let mut inner = self.inner.write();
        if bytes > inner.reserved_bytes {
            return Err(StoreError::InsufficientReservation {
                requested: bytes,
                reserved: inner.reserved_bytes,
            });
        }
        inner.reserved_bytes -= bytes;
        Ok(())
    }

    fn record_range(&self) -> StoreResult<RecordRange> {
        let inner = self.inner.read();
        Ok(RecordRange {
            lowest_key: inner.records.keys().next().copied(),
            highest_key: inner.records.keys().next_back().copied(),
            truncation_key: inner.truncation_key,
        })
    }

    fn reserved_metadata_capacity(&self) -> usize {
        self.metadata_capacity
    }
}
