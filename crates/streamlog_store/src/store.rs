//! Record store trait definition.

use crate::error::StoreResult;

/// One durable record as the store persists it.
///
/// The store does not interpret the metadata or payload bytes; the logical
/// layer above owns the framing inside them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhysicalRecord {
    /// Key the record was written under. The logical layer writes records
    /// keyed by their stream offset, so key order equals logical order.
    pub key: u64,
    /// Version the record was written with.
    pub version: u64,
    /// Fixed-capacity metadata region bytes.
    pub metadata: Vec<u8>,
    /// Payload region bytes.
    pub payload: Vec<u8>,
}

impl PhysicalRecord {
    /// Total bytes this record occupies against the store's capacity.
    #[must_use]
    pub fn size(&self) -> u64 {
        (self.metadata.len() + self.payload.len()) as u64
    }
}

/// Summary of the keys currently held by a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordRange {
    /// Lowest key with a retained record, if any records exist.
    pub lowest_key: Option<u64>,
    /// Highest key with a retained record, if any records exist.
    pub highest_key: Option<u64>,
    /// Key of the last applied head truncation, if any.
    pub truncation_key: Option<u64>,
}

/// A key-addressed durable record store.
///
/// Stores are **opaque record containers**: they persist
/// `(key, version, metadata, payload)` tuples and retrieve them by key.
/// All framing inside the metadata and payload regions belongs to the
/// logical layer; the store never inspects it.
///
/// # Invariants
///
/// - `write` is at-most-once per key: admission requires a version strictly
///   above every previously admitted version, and a write at key `k`
///   supersedes all retained records with key ≥ `k`
/// - `read(k)` returns exactly the bytes previously written under `k`
/// - key iteration order (`read_next` / `read_previous`) is numeric key order
/// - implementors must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`super::InMemoryRecordStore`] - for testing and ephemeral streams
pub trait RecordStore: Send + Sync {
    /// Persists a record durably under `key`.
    ///
    /// `reservation` bytes of previously extended reservation are consumed
    /// by this write and may carry it past the store's capacity limit.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `version` is not strictly above the highest admitted version
    /// - the store is at capacity and the reservation does not cover the write
    /// - an I/O error occurs
    fn write(
        &mut self,
        key: u64,
        version: u64,
        metadata: &[u8],
        payload: &[u8],
        reservation: u64,
    ) -> StoreResult<()>;

    /// Reads the record written exactly at `key`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::RecordNotFound`] if no record is retained
    /// at that key.
    fn read(&self, key: u64) -> StoreResult<PhysicalRecord>;

    /// Reads the retained record with the smallest key strictly above `key`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::RecordNotFound`] at the upper boundary.
    fn read_next(&self, key: u64) -> StoreResult<PhysicalRecord>;

    /// Reads the retained record with the largest key strictly below `key`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::RecordNotFound`] at the lower boundary.
    fn read_previous(&self, key: u64) -> StoreResult<PhysicalRecord>;

    /// Reads the retained record with the largest key at or below `key`.
    ///
    /// The store selects by key only; whether the record's contents actually
    /// cover `key` is for the caller to decide.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::RecordNotFound`] if every retained key is
    /// above `key`.
    fn read_containing(&self, key: u64) -> StoreResult<PhysicalRecord>;

    /// Discards retained records with keys strictly below `key`.
    ///
    /// Advisory: reclamation of the underlying space may lag this call.
    ///
    /// # Errors
    ///
    /// Returns an error if the truncation cannot be recorded.
    fn truncate(&mut self, key: u64) -> StoreResult<()>;

    /// Adds `bytes` to the reserved-capacity counter.
    ///
    /// # Errors
    ///
    /// Returns an error if the reservation cannot be extended.
    fn extend_reservation(&mut self, bytes: u64) -> StoreResult<()>;

    /// Removes `bytes` from the reserved-capacity counter.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::InsufficientReservation`] if fewer than
    /// `bytes` are currently reserved.
    fn contract_reservation(&mut self, bytes: u64) -> StoreResult<()>;

    /// Returns the lowest/highest retained keys and the truncation key.
    ///
    /// # Errors
    ///
    /// Returns an error if the range cannot be determined.
    fn record_range(&self) -> StoreResult<RecordRange>;

    /// Fixed capacity in bytes of each record's reserved metadata region.
    fn reserved_metadata_capacity(&self) -> usize;
}
