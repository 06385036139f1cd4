//! Read assembly: point reads and multi-record spanning reads.
//!
//! Reads locate physical records by key, decode and verify them through the
//! codec, and clamp each record to the prefix that is still logically valid.
//! A record straddling a later rewrite point keeps only the bytes before the
//! rewrite record's start; everything at or past it is served from the newer
//! record. The clamp bound is the lesser of the next record's start and the
//! stream tail.

use crate::codec;
use crate::error::{LogError, LogResult};
use crate::types::{StreamId, Version};
use streamlog_store::{PhysicalRecord, RecordStore, StoreError};

/// One logically valid record as seen by a reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalRecord {
    /// Stream offset of the record's first payload byte.
    pub offset: u64,
    /// Version the record was written with.
    pub version: Version,
    /// Whether the record is a recovery barrier.
    pub is_barrier: bool,
    /// Payload bytes, clamped to the still-valid prefix.
    pub payload: Vec<u8>,
}

impl LogicalRecord {
    /// Offset one past the last valid payload byte.
    #[must_use]
    pub fn end_offset(&self) -> u64 {
        self.offset + self.payload.len() as u64
    }
}

/// Result of a spanning read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpanRead {
    /// Start offset of the first record the span touched.
    pub first_record_offset: u64,
    /// Version of the first record the span touched.
    pub first_record_version: Version,
    /// Total payload bytes copied into the caller's buffer.
    pub bytes_copied: usize,
}

/// Read-only view over one stream's records at a fixed tail.
///
/// Borrowed from the stream session for the duration of one read; the tail
/// it clamps against is the logical tail observed when the read began.
pub struct ReadView<'a> {
    store: &'a dyn RecordStore,
    stream_id: StreamId,
    tail_offset: u64,
}

impl<'a> ReadView<'a> {
    /// Creates a view over `store` clamped at `tail_offset`.
    #[must_use]
    pub fn new(store: &'a dyn RecordStore, stream_id: StreamId, tail_offset: u64) -> Self {
        Self {
            store,
            stream_id,
            tail_offset,
        }
    }

    /// Reads the record whose interval contains `offset`.
    ///
    /// # Errors
    ///
    /// [`LogError::NotFound`] when `offset` is at or past the tail, below
    /// the first retained record, or invalidated by a later rewrite;
    /// corruption errors when the covering record fails verification.
    pub fn read_containing(&self, offset: u64) -> LogResult<LogicalRecord> {
        if offset >= self.tail_offset {
            return Err(LogError::NotFound);
        }
        let record = self.locate_covering(offset)?;
        let logical = self.decode_clamped(&record)?;
        if offset < logical.offset || offset >= logical.end_offset() {
            return Err(LogError::NotFound);
        }
        Ok(logical)
    }

    /// Reads the record strictly after the one containing `offset`.
    ///
    /// # Errors
    ///
    /// [`LogError::NotFound`] at the stream tail; corruption errors when
    /// either record fails verification.
    pub fn read_next(&self, offset: u64) -> LogResult<LogicalRecord> {
        let covering = self.locate_covering(offset)?;
        let next = match self.store.read_next(covering.key) {
            Ok(record) => record,
            Err(StoreError::RecordNotFound { .. }) => return Err(LogError::NotFound),
            Err(e) => return Err(e.into()),
        };
        if next.key >= self.tail_offset {
            return Err(LogError::NotFound);
        }
        self.decode_clamped(&next)
    }

    /// Reads the record strictly before the one containing `offset`.
    ///
    /// # Errors
    ///
    /// [`LogError::NotFound`] at the stream head; corruption errors when
    /// either record fails verification.
    pub fn read_previous(&self, offset: u64) -> LogResult<LogicalRecord> {
        let covering = self.locate_covering(offset)?;
        let previous = match self.store.read_previous(covering.key) {
            Ok(record) => record,
            Err(StoreError::RecordNotFound { .. }) => return Err(LogError::NotFound),
            Err(e) => return Err(e.into()),
        };
        self.decode_clamped(&previous)
    }

    /// Walks forward from the record containing `offset`, concatenating
    /// successive records' valid payload bytes into `out` until the buffer
    /// fills or the tail is reached.
    ///
    /// Every record the span touches is independently verified; one corrupt
    /// record fails the whole call even when earlier records decoded
    /// cleanly and bytes were already staged.
    ///
    /// # Errors
    ///
    /// [`LogError::NotFound`] when `offset` is not readable at all;
    /// corruption errors from any record in the span.
    pub fn read_span(&self, offset: u64, out: &mut [u8]) -> LogResult<SpanRead> {
        let first = self.read_containing(offset)?;
        let span = SpanRead {
            first_record_offset: first.offset,
            first_record_version: first.version,
            bytes_copied: 0,
        };
        if out.is_empty() {
            return Ok(span);
        }

        let skip = (offset - first.offset) as usize;
        let mut copied = copy_prefix(&first.payload[skip..], out);
        let mut cursor = first;

        while copied < out.len() && cursor.end_offset() < self.tail_offset {
            let record = match self.store.read_next(cursor.offset) {
                Ok(record) => record,
                Err(StoreError::RecordNotFound { .. }) => break,
                Err(e) => return Err(e.into()),
            };
            let logical = self.decode_clamped(&record)?;
            copied += copy_prefix(&logical.payload, &mut out[copied..]);
            cursor = logical;
        }

        Ok(SpanRead {
            bytes_copied: copied,
            ..span
        })
    }

    /// Locates the physical record covering `offset`: the record with the
    /// greatest key at or below it. A zero-length barrier sitting exactly at
    /// `offset` defers to its nearest preceding record.
    fn locate_covering(&self, offset: u64) -> LogResult<PhysicalRecord> {
        let record = match self.store.read_containing(offset) {
            Ok(record) => record,
            Err(StoreError::RecordNotFound { .. }) => return Err(LogError::NotFound),
            Err(e) => return Err(e.into()),
        };
        if record.key == offset && record.payload.is_empty() && self.record_is_empty(&record)? {
            return match self.store.read_previous(record.key) {
                Ok(previous) => Ok(previous),
                Err(StoreError::RecordNotFound { .. }) => Err(LogError::NotFound),
                Err(e) => Err(e.into()),
            };
        }
        Ok(record)
    }

    /// Whether the record's header declares a zero-length payload.
    fn record_is_empty(&self, record: &PhysicalRecord) -> LogResult<bool> {
        let decoded = codec::decode(self.stream_id, &record.metadata, &record.payload)?;
        Ok(decoded.header.data_size == 0)
    }

    /// Decodes, verifies, and clamps one physical record.
    fn decode_clamped(&self, record: &PhysicalRecord) -> LogResult<LogicalRecord> {
        let decoded = codec::decode(self.stream_id, &record.metadata, &record.payload)?;
        let header = decoded.header;
        if header.stream_offset != record.key {
            return Err(LogError::corruption(format!(
                "record at key {} claims stream offset {}",
                record.key, header.stream_offset
            )));
        }

        // Clamp to the next record's start (a later rewrite supersedes this
        // record's suffix) and to the tail.
        let mut end = header.end_offset().min(self.tail_offset);
        match self.store.read_next(record.key) {
            Ok(next) => end = end.min(next.key),
            Err(StoreError::RecordNotFound { .. }) => {}
            Err(e) => return Err(e.into()),
        }

        let valid_len = end.saturating_sub(header.stream_offset) as usize;
        let mut payload = decoded.payload;
        payload.truncate(valid_len);

        Ok(LogicalRecord {
            offset: header.stream_offset,
            version: header.highest_version,
            is_barrier: header.is_barrier(),
            payload,
        })
    }
}

fn copy_prefix(src: &[u8], dst: &mut [u8]) -> usize {
    let n = src.len().min(dst.len());
    dst[..n].copy_from_slice(&src[..n]);
    n
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::Tracker;
    use streamlog_store::InMemoryRecordStore;

    const STREAM: StreamId = StreamId::from_bytes([5; 16]);

    fn seeded(writes: &[(u64, &[u8])]) -> (InMemoryRecordStore, Tracker) {
        let store = InMemoryRecordStore::new();
        let capacity = store.reserved_metadata_capacity();
        let mut tracker = Tracker::new(STREAM, capacity);
        let mut store = store;
        for (i, (offset, data)) in writes.iter().enumerate() {
            tracker
                .write(&mut store, *offset, Version::new(i as u64 + 1), data, false, 0)
                .unwrap();
        }
        (store, tracker)
    }

    fn view<'a>(store: &'a InMemoryRecordStore, tracker: &Tracker) -> ReadView<'a> {
        ReadView::new(store, STREAM, tracker.tail_and_version().0)
    }

    #[test]
    fn point_read_roundtrips_payload() {
        let (store, tracker) = seeded(&[(0, b"0123456789"), (10, b"abcdefghij")]);
        let view = view(&store, &tracker);

        let record = view.read_containing(13).unwrap();
        assert_eq!(record.offset, 10);
        assert_eq!(record.version, Version::new(2));
        assert_eq!(record.payload, b"abcdefghij");
    }

    #[test]
    fn read_at_or_past_tail_is_not_found() {
        let (store, tracker) = seeded(&[(0, b"0123456789")]);
        let view = view(&store, &tracker);

        assert!(matches!(view.read_containing(10), Err(LogError::NotFound)));
        assert!(matches!(view.read_containing(999), Err(LogError::NotFound)));
    }

    #[test]
    fn read_below_first_record_is_not_found() {
        let store = InMemoryRecordStore::new();
        let capacity = store.reserved_metadata_capacity();
        let mut store = store;
        let mut tracker = Tracker::new(STREAM, capacity);
        tracker.write(&mut store, 0, Version::new(1), b"xy", false, 0).unwrap();
        tracker.write(&mut store, 2, Version::new(2), b"0123456789", false, 0).unwrap();
        use streamlog_store::RecordStore as _;
        store.truncate(2).unwrap();

        let view = ReadView::new(&store, STREAM, tracker.tail_and_version().0);
        assert!(matches!(view.read_containing(0), Err(LogError::NotFound)));
        assert_eq!(view.read_containing(5).unwrap().offset, 2);
    }

    #[test]
    fn straddling_record_clamped_at_rewrite_point() {
        // [0,10) then rewrite at 5: the old record keeps only [0,5).
        let (mut store, mut tracker) = seeded(&[(0, b"0123456789")]);
        tracker
            .write(&mut store, 5, Version::new(2), b"REWRITE", false, 0)
            .unwrap();
        let view = view(&store, &tracker);

        let old = view.read_containing(3).unwrap();
        assert_eq!(old.payload, b"01234");
        assert_eq!(old.end_offset(), 5);

        let new = view.read_containing(5).unwrap();
        assert_eq!(new.offset, 5);
        assert_eq!(new.payload, b"REWRITE");
    }

    #[test]
    fn zero_length_rewrite_invalidates_suffix() {
        let (mut store, mut tracker) =
            seeded(&[(0, b"0123456789"), (10, b"0123456789"), (20, b"0123456789")]);
        tracker.write(&mut store, 15, Version::new(4), b"", false, 0).unwrap();
        let view = view(&store, &tracker);

        assert!(matches!(view.read_containing(15), Err(LogError::NotFound)));
        assert!(matches!(view.read_containing(25), Err(LogError::NotFound)));
        let straddler = view.read_containing(12).unwrap();
        assert_eq!(straddler.payload, b"01234");
    }

    #[test]
    fn next_and_previous_navigate_records() {
        let (store, tracker) = seeded(&[(0, b"aaaa"), (4, b"bbbb"), (8, b"cccc")]);
        let view = view(&store, &tracker);

        let next = view.read_next(5).unwrap();
        assert_eq!(next.offset, 8);
        assert_eq!(next.payload, b"cccc");

        let previous = view.read_previous(5).unwrap();
        assert_eq!(previous.offset, 0);
        assert_eq!(previous.payload, b"aaaa");

        assert!(matches!(view.read_next(9), Err(LogError::NotFound)));
        assert!(matches!(view.read_previous(2), Err(LogError::NotFound)));
    }

    #[test]
    fn span_concatenates_across_records() {
        let (store, tracker) = seeded(&[(0, b"0123456789"), (10, b"abcdefghij"), (20, b"KLMNO")]);
        let view = view(&store, &tracker);

        let mut out = vec![0u8; 20];
        let span = view.read_span(5, &mut out).unwrap();
        assert_eq!(span.first_record_offset, 0);
        assert_eq!(span.first_record_version, Version::new(1));
        assert_eq!(span.bytes_copied, 20);
        assert_eq!(&out, b"56789abcdefghijKLMNO");
    }

    #[test]
    fn span_stops_at_tail_when_buffer_is_larger() {
        let (store, tracker) = seeded(&[(0, b"0123456789"), (10, b"abc")]);
        let view = view(&store, &tracker);

        let mut out = vec![0u8; 64];
        let span = view.read_span(8, &mut out).unwrap();
        assert_eq!(span.bytes_copied, 5);
        assert_eq!(&out[..5], b"89abc");
    }

    #[test]
    fn span_fails_on_any_corrupt_record() {
        let (store, tracker) = seeded(&[(0, b"0123456789"), (10, b"abcdefghij")]);
        // Payload bytes sit in the metadata region after the descriptor and
        // header.
        store.corrupt_metadata(10, 74);
        let view = view(&store, &tracker);

        let mut out = vec![0u8; 20];
        let err = view.read_span(0, &mut out).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn corrupt_record_is_corruption_not_notfound() {
        let (store, tracker) = seeded(&[(0, b"0123456789")]);
        store.corrupt_metadata(0, 30);
        let view = view(&store, &tracker);

        let err = view.read_containing(4).unwrap_err();
        assert!(err.is_corruption());
        assert!(!err.is_not_found());
    }

    #[test]
    fn empty_output_buffer_copies_nothing() {
        let (store, tracker) = seeded(&[(0, b"0123456789")]);
        let view = view(&store, &tracker);

        let mut out = [0u8; 0];
        let span = view.read_span(3, &mut out).unwrap();
        assert_eq!(span.bytes_copied, 0);
        assert_eq!(span.first_record_offset, 0);
    }
}
