//! Head truncation planning.
//!
//! Truncation requests are advisory. The planner aligns the requested
//! offset down to the start of a durably written record, then backs off a
//! configurable number of additional records because destaging to the
//! stream's durable store is asynchronous and the newest records may not be
//! confirmed there yet. The store keeps the applied floor monotonic, so a
//! request that computes a lower floor than an earlier one is a no-op.

use crate::error::LogResult;
use streamlog_store::{RecordStore, StoreError};
use tracing::debug;

/// Computes and applies a conservative head-truncation floor.
///
/// Returns the effective floor after the request, or `None` when the stream
/// has no records or nothing at or below `requested_offset`.
///
/// # Errors
///
/// Propagates store failures; not-found lookups are treated as "nothing to
/// truncate".
pub fn truncate_head(
    store: &mut dyn RecordStore,
    requested_offset: u64,
    tail_offset: u64,
    retention_margin: usize,
) -> LogResult<Option<u64>> {
    // Never let a request at or past the tail touch the tail-covering
    // record.
    let bounded = requested_offset.min(tail_offset.saturating_sub(1));

    let covering = match store.read_containing(bounded) {
        Ok(record) => record,
        Err(StoreError::RecordNotFound { .. }) => {
            return Ok(store.record_range()?.truncation_key);
        }
        Err(e) => return Err(e.into()),
    };

    // Align to the covering record's start, then retain extra records as
    // the destaging safety margin.
    let mut floor = covering.key;
    for _ in 0..retention_margin {
        match store.read_previous(floor) {
            Ok(previous) => floor = previous.key,
            Err(StoreError::RecordNotFound { .. }) => break,
            Err(e) => return Err(e.into()),
        }
    }

    store.truncate(floor)?;
    let effective = store.record_range()?.truncation_key;
    debug!(
        requested = requested_offset,
        floor, effective, "head truncation applied"
    );
    Ok(effective)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::Tracker;
    use crate::types::{StreamId, Version};
    use streamlog_store::InMemoryRecordStore;

    const STREAM: StreamId = StreamId::from_bytes([9; 16]);

    /// Six 10-byte records starting at 1, 11, 21, 31, 41, 51.
    fn seeded() -> (InMemoryRecordStore, Tracker) {
        let store = InMemoryRecordStore::new();
        let capacity = store.reserved_metadata_capacity();
        let mut store = store;
        let mut tracker = Tracker::new(STREAM, capacity);
        tracker.write(&mut store, 0, Version::new(1), b"?", false, 0).unwrap();
        for i in 0..6u64 {
            tracker
                .write(
                    &mut store,
                    1 + i * 10,
                    Version::new(i + 2),
                    b"0123456789",
                    false,
                    0,
                )
                .unwrap();
        }
        (store, tracker)
    }

    #[test]
    fn floor_aligns_to_record_start_below_request() {
        let (mut store, tracker) = seeded();
        let (tail, _) = tracker.tail_and_version();

        let floor = truncate_head(&mut store, 21, tail, 1).unwrap().unwrap();
        // Covering record starts at 21; one-record margin backs off to 11.
        assert_eq!(floor, 11);
        assert!(floor <= 21);

        // Reads at or above the floor still succeed.
        let view = crate::read::ReadView::new(&store, STREAM, tail);
        assert!(view.read_containing(floor).is_ok());
        assert!(view.read_containing(45).is_ok());
    }

    #[test]
    fn zero_margin_truncates_exactly_at_covering_record() {
        let (mut store, tracker) = seeded();
        let (tail, _) = tracker.tail_and_version();

        let floor = truncate_head(&mut store, 25, tail, 0).unwrap().unwrap();
        assert_eq!(floor, 21);
    }

    #[test]
    fn floor_never_regresses() {
        let (mut store, tracker) = seeded();
        let (tail, _) = tracker.tail_and_version();

        let first = truncate_head(&mut store, 41, tail, 0).unwrap().unwrap();
        assert_eq!(first, 41);
        let second = truncate_head(&mut store, 11, tail, 0).unwrap().unwrap();
        assert_eq!(second, first);
    }

    #[test]
    fn repeated_requests_converge_upward() {
        let (mut store, tracker) = seeded();
        let (tail, _) = tracker.tail_and_version();

        let a = truncate_head(&mut store, 21, tail, 1).unwrap().unwrap();
        let b = truncate_head(&mut store, 41, tail, 1).unwrap().unwrap();
        assert!(b >= a);
    }

    #[test]
    fn request_past_tail_keeps_tail_record() {
        let (mut store, tracker) = seeded();
        let (tail, _) = tracker.tail_and_version();

        let floor = truncate_head(&mut store, tail + 100, tail, 0).unwrap().unwrap();
        // The record covering the last written byte survives.
        assert_eq!(floor, 51);
        let view = crate::read::ReadView::new(&store, STREAM, tail);
        assert!(view.read_containing(tail - 1).is_ok());
    }

    #[test]
    fn empty_stream_is_a_no_op() {
        let mut store = InMemoryRecordStore::new();
        let floor = truncate_head(&mut store, 10, 0, 1).unwrap();
        assert_eq!(floor, None);
    }

    #[test]
    fn margin_larger_than_history_keeps_everything() {
        let (mut store, tracker) = seeded();
        let (tail, _) = tracker.tail_and_version();

        let floor = truncate_head(&mut store, 21, tail, 10).unwrap();
        // Backed all the way off to the first record; nothing removed.
        assert_eq!(floor, Some(0));
        assert_eq!(store.record_count(), 7);
    }
}
