//! Recovery scan run once per stream open.
//!
//! Recovery reconstructs the tail and version of a stream from whatever the
//! store retained. The trusted floor is the most recently written
//! barrier-flagged record; records beyond it are admitted only while each
//! one validates and is sequence-consistent with its predecessor. The first
//! failure beyond the floor rolls the recovered tail all the way back to
//! the floor - partial progress past a failure is never trusted.

use crate::codec;
use crate::error::{LogError, LogResult};
use crate::types::{StreamId, Version};
use streamlog_store::{RecordStore, StoreError};
use tracing::{debug, warn};

/// Tracker state reconstructed by a recovery scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveredState {
    /// Recovered tail offset (next unwritten logical byte).
    pub tail_offset: u64,
    /// Recovered highest version.
    pub highest_version: Version,
    /// Offset of the barrier record used as the trusted floor, if any.
    pub last_barrier_offset: Option<u64>,
    /// Head truncation floor previously applied to the store, if any.
    pub truncation_floor: Option<u64>,
}

/// Replays the store's records and reconstructs the stream tail.
///
/// # Errors
///
/// Fails with [`LogError::RecoveryFailed`] when the stream holds records
/// but no valid barrier exists to anchor recovery, and propagates store
/// errors other than not-found.
pub fn recover(store: &dyn RecordStore, stream_id: StreamId) -> LogResult<RecoveredState> {
    let range = store.record_range()?;

    let Some(highest_key) = range.highest_key else {
        // Empty stream: recovered clean at offset zero.
        return Ok(RecoveredState {
            tail_offset: 0,
            highest_version: Version::default(),
            last_barrier_offset: None,
            truncation_floor: range.truncation_key,
        });
    };

    let floor = find_floor(store, stream_id, highest_key)?;
    let Some(floor) = floor else {
        return Err(LogError::recovery_failed(
            "stream holds records but no valid barrier record was found",
        ));
    };

    let mut tail_offset = floor.end_offset();
    let mut highest_version = floor.highest_version;
    let mut cursor = floor.stream_offset;

    // Admit records beyond the floor while they stay consistent; any
    // failure abandons everything beyond the floor.
    loop {
        let record = match store.read_next(cursor) {
            Ok(record) => record,
            Err(StoreError::RecordNotFound { .. }) => break,
            Err(e) => return Err(e.into()),
        };

        let decoded = match codec::decode(stream_id, &record.metadata, &record.payload) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(
                    stream = %stream_id,
                    key = record.key,
                    error = %e,
                    "record beyond recovery floor failed validation; tail rolled back to floor"
                );
                tail_offset = floor.end_offset();
                highest_version = floor.highest_version;
                break;
            }
        };

        let header = decoded.header;
        let consistent = header.stream_offset == tail_offset
            && header.highest_version > highest_version
            && header.stream_offset == record.key;
        if !consistent {
            warn!(
                stream = %stream_id,
                key = record.key,
                record_offset = header.stream_offset,
                expected_offset = tail_offset,
                "record beyond recovery floor out of sequence; tail rolled back to floor"
            );
            tail_offset = floor.end_offset();
            highest_version = floor.highest_version;
            break;
        }

        tail_offset = header.end_offset();
        highest_version = header.highest_version;
        cursor = record.key;
    }

    debug!(
        stream = %stream_id,
        tail = tail_offset,
        version = %highest_version,
        floor = floor.stream_offset,
        "stream recovered"
    );

    Ok(RecoveredState {
        tail_offset,
        highest_version,
        last_barrier_offset: Some(floor.stream_offset),
        truncation_floor: range.truncation_key,
    })
}

/// Scans backward from the highest key for the most recent valid barrier.
///
/// Records that fail validation during the backward scan are skipped; they
/// cannot anchor recovery, but an older barrier below them still can.
fn find_floor(
    store: &dyn RecordStore,
    stream_id: StreamId,
    highest_key: u64,
) -> LogResult<Option<codec::StreamRecordHeader>> {
    let mut cursor = Some(highest_key);
    while let Some(key) = cursor {
        let record = match store.read(key) {
            Ok(record) => record,
            Err(StoreError::RecordNotFound { .. }) => break,
            Err(e) => return Err(e.into()),
        };

        match codec::decode(stream_id, &record.metadata, &record.payload) {
            Ok(decoded) if decoded.header.is_barrier() => {
                return Ok(Some(decoded.header));
            }
            Ok(_) => {}
            Err(e) => {
                debug!(
                    stream = %stream_id,
                    key,
                    error = %e,
                    "invalid record skipped during barrier scan"
                );
            }
        }

        cursor = match store.read_previous(key) {
            Ok(prev) => Some(prev.key),
            Err(StoreError::RecordNotFound { .. }) => None,
            Err(e) => return Err(e.into()),
        };
    }
    Ok(None)
}
