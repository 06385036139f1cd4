//! The per-stream session object.
//!
//! A [`LogStream`] owns all mutable state for one open stream: the tail
//! tracker, the coalescing buffer, the version counter, and any pending
//! flush waiters. The session holds the physical store behind a shared
//! handle and serializes operations through an interior mutex, so exactly
//! one write is outstanding per stream at a time while different streams
//! proceed independently.
//!
//! Close is a barrier: buffered data flushes with the barrier flag before
//! the session is marked closed, and every operation after close resolves
//! with [`LogError::NoLongerExists`].

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::coalesce::CoalesceBuffer;
use crate::config::LogConfig;
use crate::error::{LogError, LogResult};
use crate::notify::{self, Notifier, WaitHandle};
use crate::read::{LogicalRecord, ReadView, SpanRead};
use crate::recovery;
use crate::tracker::Tracker;
use crate::truncate;
use crate::types::{StreamId, Version};
use streamlog_store::RecordStore;

/// Shared handle to the physical record store.
pub type SharedStore = Arc<Mutex<Box<dyn RecordStore>>>;

/// Space accounting for one stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogUsage {
    /// Number of physical records currently retained.
    pub retained_records: usize,
    /// Logical bytes between the lowest retained record and the tail.
    pub retained_bytes: u64,
    /// Reservation bytes this session holds against the store.
    pub reserved_bytes: u64,
}

/// State that exists only while the stream is open.
struct Open {
    tracker: Tracker,
    buffer: CoalesceBuffer,
    last_version: Version,
    truncation_floor: Option<u64>,
    reserved_bytes: u64,
    flush_waiters: Vec<Notifier>,
}

impl Open {
    /// Logical tail including bytes still sitting in the coalescing buffer.
    fn logical_tail(&self) -> u64 {
        self.buffer
            .end_offset()
            .unwrap_or_else(|| self.tracker.tail_and_version().0)
    }

    /// Writes out any buffered bytes as one coalesced record.
    ///
    /// On failure the buffered bytes are restored, so nothing accepted is
    /// lost until a flush is acknowledged.
    fn flush(
        &mut self,
        store: &mut dyn RecordStore,
        barrier: bool,
        reservation: u64,
    ) -> LogResult<()> {
        let Some(pending) = self.buffer.take() else {
            return Ok(());
        };
        match self.tracker.write(
            store,
            pending.offset,
            pending.version,
            &pending.bytes,
            barrier,
            reservation,
        ) {
            Ok(_) => {
                for waiter in self.flush_waiters.drain(..) {
                    waiter.notify();
                }
                Ok(())
            }
            Err(e) => {
                self.buffer
                    .append(pending.offset, pending.version, &pending.bytes);
                Err(e)
            }
        }
    }
}

/// One open logical stream.
pub struct LogStream {
    stream_id: StreamId,
    config: LogConfig,
    store: SharedStore,
    state: Mutex<Option<Open>>,
}

impl LogStream {
    /// Opens a session over a freshly provisioned, empty stream.
    ///
    /// # Errors
    ///
    /// Propagates store failures from the capacity query.
    pub fn create(store: SharedStore, stream_id: StreamId, config: LogConfig) -> LogResult<Self> {
        let capacity = store.lock().reserved_metadata_capacity();
        let open = Open {
            tracker: Tracker::new(stream_id, capacity),
            buffer: CoalesceBuffer::new(config.coalesce_threshold, config.flush_interval),
            last_version: Version::default(),
            truncation_floor: None,
            reserved_bytes: 0,
            flush_waiters: Vec::new(),
        };
        Ok(Self {
            stream_id,
            config,
            store,
            state: Mutex::new(Some(open)),
        })
    }

    /// Opens a session over an existing stream, running the recovery scan.
    ///
    /// # Errors
    ///
    /// Fails when recovery cannot reconstruct a consistent tail; the
    /// failure is fatal to the open.
    pub fn recover(store: SharedStore, stream_id: StreamId, config: LogConfig) -> LogResult<Self> {
        let (recovered, capacity) = {
            let guard = store.lock();
            (
                recovery::recover(&**guard, stream_id)?,
                guard.reserved_metadata_capacity(),
            )
        };
        let open = Open {
            tracker: Tracker::recovered(
                stream_id,
                capacity,
                recovered.tail_offset,
                recovered.highest_version,
                recovered.last_barrier_offset,
            ),
            buffer: CoalesceBuffer::new(config.coalesce_threshold, config.flush_interval),
            last_version: recovered.highest_version,
            truncation_floor: recovered.truncation_floor,
            reserved_bytes: 0,
            flush_waiters: Vec::new(),
        };
        Ok(Self {
            stream_id,
            config,
            store,
            state: Mutex::new(Some(open)),
        })
    }

    /// The stream this session is bound to.
    #[must_use]
    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    /// Writes `data` at `offset` and returns the new logical tail.
    ///
    /// `offset` must be at or below the current logical tail: equal for a
    /// forward write, below for a truncate-by-rewrite that supersedes all
    /// bytes at or after `offset`. With coalescing enabled, forward writes
    /// are buffered and flushed on the configured triggers; buffered bytes
    /// are part of the logical tail immediately.
    ///
    /// # Errors
    ///
    /// [`LogError::OutOfSequence`] for an offset beyond the tail,
    /// [`LogError::NoLongerExists`] after close, and store errors when a
    /// flush or direct write fails (buffered bytes stay intact).
    pub fn write(&self, offset: u64, data: &[u8]) -> LogResult<u64> {
        self.write_inner(offset, data, false)
    }

    /// Writes `data` at `offset` as a barrier: the record establishes a
    /// trusted recovery boundary, and any coalesced bytes flush with it.
    ///
    /// # Errors
    ///
    /// As [`LogStream::write`].
    pub fn write_with_barrier(&self, offset: u64, data: &[u8]) -> LogResult<u64> {
        self.write_inner(offset, data, true)
    }

    fn write_inner(&self, offset: u64, data: &[u8], barrier: bool) -> LogResult<u64> {
        let mut state = self.state.lock();
        let open = state.as_mut().ok_or(LogError::NoLongerExists)?;
        let logical_tail = open.logical_tail();
        if offset > logical_tail {
            return Err(LogError::OutOfSequence {
                offset,
                tail: logical_tail,
            });
        }

        let version = open.last_version.next();
        let mut store = self.store.lock();
        let reservation = self.config.write_reservation;

        if offset == logical_tail {
            if self.config.coalescing_enabled {
                open.buffer.append(offset, version, data);
                open.last_version = version;
                if barrier {
                    open.flush(&mut **store, true, reservation)?;
                } else if open.buffer.flush_due() {
                    open.flush(&mut **store, false, reservation)?;
                }
            } else {
                open.tracker
                    .write(&mut **store, offset, version, data, barrier, reservation)?;
                open.last_version = version;
            }
        } else {
            // Rewrite: buffered bytes at or after the rewrite offset are
            // superseded before they ever hit the store; any surviving
            // prefix must be durable before the rewrite record lands.
            open.buffer.discard_from(offset);
            open.flush(&mut **store, false, reservation)?;
            open.tracker
                .write(&mut **store, offset, version, data, barrier, reservation)?;
            open.last_version = version;
        }

        Ok(open.logical_tail())
    }

    /// Flushes any buffered coalesced bytes to the store.
    ///
    /// # Errors
    ///
    /// [`LogError::NoLongerExists`] after close; store errors leave the
    /// buffered bytes intact.
    pub fn flush(&self) -> LogResult<()> {
        let mut state = self.state.lock();
        let open = state.as_mut().ok_or(LogError::NoLongerExists)?;
        let mut store = self.store.lock();
        open.flush(&mut **store, false, self.config.write_reservation)
    }

    /// Flushes with the barrier flag set, establishing a trusted recovery
    /// boundary.
    ///
    /// When nothing is buffered, a zero-length barrier record is written at
    /// the tail so the boundary exists even for an idle stream.
    ///
    /// # Errors
    ///
    /// [`LogError::NoLongerExists`] after close, or the store error from
    /// the barrier write.
    pub fn flush_with_barrier(&self) -> LogResult<()> {
        let mut state = self.state.lock();
        let open = state.as_mut().ok_or(LogError::NoLongerExists)?;
        let mut store = self.store.lock();
        if !open.buffer.is_empty() {
            return open.flush(&mut **store, true, self.config.write_reservation);
        }
        let (tail, _) = open.tracker.tail_and_version();
        let version = open.last_version.next();
        open.tracker.write(
            &mut **store,
            tail,
            version,
            &[],
            true,
            self.config.write_reservation,
        )?;
        open.last_version = version;
        Ok(())
    }

    /// Reads the record containing `offset`. See [`ReadView::read_containing`].
    ///
    /// # Errors
    ///
    /// [`LogError::NotFound`], corruption errors, or
    /// [`LogError::NoLongerExists`] after close.
    pub fn read_containing(&self, offset: u64) -> LogResult<LogicalRecord> {
        self.with_read_view(|view| view.read_containing(offset))
    }

    /// Reads the record after the one containing `offset`.
    ///
    /// # Errors
    ///
    /// As [`LogStream::read_containing`].
    pub fn read_next(&self, offset: u64) -> LogResult<LogicalRecord> {
        self.with_read_view(|view| view.read_next(offset))
    }

    /// Reads the record before the one containing `offset`.
    ///
    /// # Errors
    ///
    /// As [`LogStream::read_containing`].
    pub fn read_previous(&self, offset: u64) -> LogResult<LogicalRecord> {
        self.with_read_view(|view| view.read_previous(offset))
    }

    /// Copies bytes starting at `offset` into `out`, walking records until
    /// the buffer fills or the tail is reached.
    ///
    /// # Errors
    ///
    /// As [`LogStream::read_containing`]; one corrupt record anywhere in
    /// the span fails the whole call.
    pub fn read_span(&self, offset: u64, out: &mut [u8]) -> LogResult<SpanRead> {
        self.with_read_view(|view| view.read_span(offset, out))
    }

    /// Requests head truncation at `requested_offset`; returns the new
    /// effective floor.
    ///
    /// # Errors
    ///
    /// [`LogError::NoLongerExists`] after close, or store failures.
    pub fn truncate_head(&self, requested_offset: u64) -> LogResult<Option<u64>> {
        let mut state = self.state.lock();
        let open = state.as_mut().ok_or(LogError::NoLongerExists)?;
        let mut store = self.store.lock();
        let (tail, _) = open.tracker.tail_and_version();
        let floor = truncate::truncate_head(
            &mut **store,
            requested_offset,
            tail,
            self.config.retention_margin,
        )?;
        open.truncation_floor = floor;
        Ok(floor)
    }

    /// Current logical tail (including buffered bytes) and the version of
    /// the most recently accepted write.
    ///
    /// # Errors
    ///
    /// [`LogError::NoLongerExists`] after close.
    pub fn tail_and_version(&self) -> LogResult<(u64, Version)> {
        let state = self.state.lock();
        let open = state.as_ref().ok_or(LogError::NoLongerExists)?;
        Ok((open.logical_tail(), open.last_version))
    }

    /// The effective head-truncation floor, if one was ever applied.
    ///
    /// # Errors
    ///
    /// [`LogError::NoLongerExists`] after close.
    pub fn truncation_floor(&self) -> LogResult<Option<u64>> {
        let state = self.state.lock();
        let open = state.as_ref().ok_or(LogError::NoLongerExists)?;
        Ok(open.truncation_floor)
    }

    /// Space accounting computed from the store's record range.
    ///
    /// # Errors
    ///
    /// [`LogError::NoLongerExists`] after close, or store failures.
    pub fn usage(&self) -> LogResult<LogUsage> {
        let state = self.state.lock();
        let open = state.as_ref().ok_or(LogError::NoLongerExists)?;
        let store = self.store.lock();

        let range = store.record_range()?;
        let mut retained_records = 0;
        let mut cursor = range.lowest_key;
        while let Some(key) = cursor {
            retained_records += 1;
            cursor = match store.read_next(key) {
                Ok(next) => Some(next.key),
                Err(e) if e.is_not_found() => None,
                Err(e) => return Err(e.into()),
            };
        }

        let (tail, _) = open.tracker.tail_and_version();
        let retained_bytes = range
            .lowest_key
            .map_or(0, |lowest| tail.saturating_sub(lowest));

        Ok(LogUsage {
            retained_records,
            retained_bytes,
            reserved_bytes: open.reserved_bytes,
        })
    }

    /// Reserves `bytes` of store capacity for this stream's writes.
    ///
    /// # Errors
    ///
    /// [`LogError::NoLongerExists`] after close, or store failures.
    pub fn extend_reservation(&self, bytes: u64) -> LogResult<()> {
        let mut state = self.state.lock();
        let open = state.as_mut().ok_or(LogError::NoLongerExists)?;
        self.store.lock().extend_reservation(bytes)?;
        open.reserved_bytes += bytes;
        Ok(())
    }

    /// Releases `bytes` of previously reserved capacity.
    ///
    /// # Errors
    ///
    /// [`LogError::NoLongerExists`] after close, or store failures.
    pub fn contract_reservation(&self, bytes: u64) -> LogResult<()> {
        let mut state = self.state.lock();
        let open = state.as_mut().ok_or(LogError::NoLongerExists)?;
        self.store.lock().contract_reservation(bytes)?;
        open.reserved_bytes = open.reserved_bytes.saturating_sub(bytes);
        Ok(())
    }

    /// Returns a handle that resolves when the coalescing buffer next
    /// flushes successfully, or with no-longer-exists if the stream closes
    /// first. The handle can be cancelled at any time.
    ///
    /// # Errors
    ///
    /// [`LogError::NoLongerExists`] after close.
    pub fn flush_watch(&self) -> LogResult<WaitHandle> {
        let mut state = self.state.lock();
        let open = state.as_mut().ok_or(LogError::NoLongerExists)?;
        let (handle, notifier) = notify::wait_pair();
        open.flush_waiters.push(notifier);
        Ok(handle)
    }

    /// Closes the stream: flushes buffered data with the barrier flag,
    /// abandons outstanding waiters, and marks the session closed.
    ///
    /// # Errors
    ///
    /// [`LogError::NoLongerExists`] on a second close; a flush failure
    /// leaves the stream open with its buffered bytes intact so close can
    /// be retried.
    pub fn close(&self) -> LogResult<()> {
        let mut state = self.state.lock();
        let Some(mut open) = state.take() else {
            return Err(LogError::NoLongerExists);
        };

        {
            let mut store = self.store.lock();
            if let Err(e) = open.flush(&mut **store, true, self.config.write_reservation) {
                warn!(stream = %self.stream_id, error = %e, "close flush failed; stream stays open");
                *state = Some(open);
                return Err(e);
            }
        }

        for waiter in open.flush_waiters.drain(..) {
            waiter.abandon();
        }
        debug!(stream = %self.stream_id, tail = open.tracker.tail_and_version().0, "stream closed");
        Ok(())
    }

    /// Flushes pending bytes, then runs `f` over a read view clamped at the
    /// durable tail, so reads always observe accepted writes.
    fn with_read_view<T>(&self, f: impl FnOnce(&ReadView<'_>) -> LogResult<T>) -> LogResult<T> {
        let mut state = self.state.lock();
        let open = state.as_mut().ok_or(LogError::NoLongerExists)?;
        let mut store = self.store.lock();
        open.flush(&mut **store, false, self.config.write_reservation)?;
        let (tail, _) = open.tracker.tail_and_version();
        let view = ReadView::new(&**store, self.stream_id, tail);
        f(&view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::WaitOutcome;
    use streamlog_store::InMemoryRecordStore;

    fn shared_store() -> SharedStore {
        Arc::new(Mutex::new(
            Box::new(InMemoryRecordStore::new()) as Box<dyn RecordStore>
        ))
    }

    fn open_stream(config: LogConfig) -> (LogStream, SharedStore) {
        let store = shared_store();
        let stream = LogStream::create(Arc::clone(&store), StreamId::random(), config).unwrap();
        (stream, store)
    }

    #[test]
    fn write_and_read_roundtrip_without_coalescing() {
        let (stream, _) = open_stream(LogConfig::new().coalescing_enabled(false));

        assert_eq!(stream.write(0, b"hello ").unwrap(), 6);
        assert_eq!(stream.write(6, b"world").unwrap(), 11);

        let record = stream.read_containing(7).unwrap();
        assert_eq!(record.offset, 6);
        assert_eq!(record.payload, b"world");
    }

    #[test]
    fn write_and_read_roundtrip_with_coalescing() {
        let (stream, _) = open_stream(LogConfig::new());

        stream.write(0, b"hello ").unwrap();
        stream.write(6, b"world").unwrap();
        // Bytes are buffered; reads still observe them.
        let record = stream.read_containing(0).unwrap();
        assert_eq!(record.payload, b"hello world");
    }

    #[test]
    fn coalesced_writes_become_one_record() {
        let (stream, store) = open_stream(LogConfig::new().coalesce_threshold(1024));

        for i in 0..4u64 {
            stream.write(i * 4, b"abcd").unwrap();
        }
        stream.flush().unwrap();

        let range = store.lock().record_range().unwrap();
        assert_eq!(range.lowest_key, Some(0));
        assert_eq!(range.highest_key, Some(0));
    }

    #[test]
    fn threshold_flushes_buffer_on_write_path() {
        let (stream, store) = open_stream(LogConfig::new().coalesce_threshold(8));

        stream.write(0, b"12345678").unwrap();
        let range = store.lock().record_range().unwrap();
        assert_eq!(range.highest_key, Some(0));
    }

    #[test]
    fn gap_write_is_out_of_sequence() {
        let (stream, _) = open_stream(LogConfig::new());
        stream.write(0, b"abc").unwrap();

        let err = stream.write(10, b"def").unwrap_err();
        assert!(matches!(err, LogError::OutOfSequence { offset: 10, tail: 3 }));
    }

    #[test]
    fn rewrite_supersedes_buffered_and_durable_bytes() {
        let (stream, _) = open_stream(LogConfig::new());
        stream.write(0, b"0123456789").unwrap();
        stream.flush().unwrap();
        stream.write(10, b"buffered").unwrap();

        // Rewrite at 5 discards the buffered run entirely and clamps the
        // durable record to [0, 5).
        stream.write(5, b"NEW").unwrap();
        assert_eq!(stream.tail_and_version().unwrap().0, 8);

        assert_eq!(stream.read_containing(2).unwrap().payload, b"01234");
        assert_eq!(stream.read_containing(5).unwrap().payload, b"NEW");
        assert!(stream.read_containing(8).unwrap_err().is_not_found());
    }

    #[test]
    fn rewrite_inside_buffer_flushes_surviving_prefix() {
        let (stream, _) = open_stream(LogConfig::new());
        stream.write(0, b"abcdefgh").unwrap();

        stream.write(4, b"XY").unwrap();
        assert_eq!(stream.read_containing(0).unwrap().payload, b"abcd");
        assert_eq!(stream.read_containing(4).unwrap().payload, b"XY");
        assert_eq!(stream.tail_and_version().unwrap().0, 6);
    }

    #[test]
    fn close_is_idempotent_and_fences_operations() {
        let (stream, _) = open_stream(LogConfig::new());
        stream.write(0, b"data").unwrap();

        stream.close().unwrap();
        assert!(matches!(stream.close(), Err(LogError::NoLongerExists)));
        assert!(matches!(stream.write(4, b"x"), Err(LogError::NoLongerExists)));
        assert!(matches!(stream.read_containing(0), Err(LogError::NoLongerExists)));
        assert!(matches!(stream.truncate_head(0), Err(LogError::NoLongerExists)));
        assert!(matches!(stream.flush(), Err(LogError::NoLongerExists)));
    }

    #[test]
    fn close_then_recover_restores_tail_and_version() {
        let store = shared_store();
        let id = StreamId::random();
        let stream = LogStream::create(Arc::clone(&store), id, LogConfig::new()).unwrap();

        stream.write(0, b"0123456789").unwrap();
        stream.flush_with_barrier().unwrap();
        stream.write(10, b"abcde").unwrap();
        let before = stream.tail_and_version().unwrap();
        stream.close().unwrap();

        let reopened = LogStream::recover(store, id, LogConfig::new()).unwrap();
        let after = reopened.tail_and_version().unwrap();
        assert_eq!(after.0, before.0);
        assert_eq!(reopened.read_containing(12).unwrap().payload, b"abcde");
    }

    #[test]
    fn recover_after_barriers_and_plain_records() {
        let store = shared_store();
        let id = StreamId::random();
        let config = LogConfig::new().coalescing_enabled(false);
        let stream = LogStream::create(Arc::clone(&store), id, config.clone()).unwrap();

        for i in 0..3u64 {
            stream.write_with_barrier(i * 10, b"0123456789").unwrap();
        }
        for i in 3..5u64 {
            stream.write(i * 10, b"0123456789").unwrap();
        }
        stream.close().unwrap();

        let reopened = LogStream::recover(store, id, config).unwrap();
        assert_eq!(reopened.tail_and_version().unwrap().0, 50);
    }

    #[test]
    fn flush_watch_resolves_on_flush() {
        let (stream, _) = open_stream(LogConfig::new());
        stream.write(0, b"buffered").unwrap();
        let watch = stream.flush_watch().unwrap();
        assert_eq!(watch.try_wait(), None);

        stream.flush().unwrap();
        assert_eq!(watch.wait(), WaitOutcome::Notified);
    }

    #[test]
    fn flush_watch_abandoned_on_close() {
        let (stream, _) = open_stream(LogConfig::new());
        let watch = stream.flush_watch().unwrap();

        stream.close().unwrap();
        assert_eq!(watch.wait(), WaitOutcome::NoLongerExists);
    }

    #[test]
    fn flush_watch_cancellation_wins_when_first() {
        let (stream, _) = open_stream(LogConfig::new());
        let watch = stream.flush_watch().unwrap();
        watch.cancel();

        stream.write(0, b"x").unwrap();
        stream.flush().unwrap();
        assert_eq!(watch.wait(), WaitOutcome::Cancelled);
    }

    #[test]
    fn truncate_head_reports_floor() {
        let (stream, _) = open_stream(LogConfig::new().coalescing_enabled(false));
        for i in 0..6u64 {
            stream.write(i * 10, b"0123456789").unwrap();
        }

        let floor = stream.truncate_head(35).unwrap().unwrap();
        // Record covering 35 starts at 30; default margin retains one more.
        assert_eq!(floor, 20);
        assert_eq!(stream.truncation_floor().unwrap(), Some(20));
        assert!(stream.read_containing(10).unwrap_err().is_not_found());
        assert!(stream.read_containing(25).is_ok());
    }

    #[test]
    fn usage_reflects_records_and_reservation() {
        let (stream, _) = open_stream(LogConfig::new().coalescing_enabled(false));
        stream.write(0, b"0123456789").unwrap();
        stream.write(10, b"0123456789").unwrap();
        stream.extend_reservation(512).unwrap();

        let usage = stream.usage().unwrap();
        assert_eq!(usage.retained_records, 2);
        assert_eq!(usage.retained_bytes, 20);
        assert_eq!(usage.reserved_bytes, 512);

        stream.contract_reservation(512).unwrap();
        assert_eq!(stream.usage().unwrap().reserved_bytes, 0);
    }

    #[test]
    fn span_read_equals_point_reads_in_both_modes() {
        for coalescing in [true, false] {
            let (stream, _) = open_stream(LogConfig::new().coalescing_enabled(coalescing));
            stream.write(0, b"0123456789").unwrap();
            stream.write(10, b"abcdefghij").unwrap();
            stream.write(20, b"KLMNOPQRST").unwrap();

            let mut out = vec![0u8; 25];
            let span = stream.read_span(3, &mut out).unwrap();
            assert_eq!(span.bytes_copied, 25);

            let mut expected = Vec::new();
            let mut offset = 3u64;
            while expected.len() < 25 {
                let record = stream.read_containing(offset).unwrap();
                let skip = (offset - record.offset) as usize;
                expected.extend_from_slice(&record.payload[skip..]);
                offset = record.end_offset();
            }
            expected.truncate(25);
            assert_eq!(out, expected);
        }
    }

    #[test]
    fn flush_with_barrier_on_empty_buffer_anchors_recovery() {
        let store = shared_store();
        let id = StreamId::random();
        let config = LogConfig::new().coalescing_enabled(false);
        let stream = LogStream::create(Arc::clone(&store), id, config.clone()).unwrap();
        stream.flush_with_barrier().unwrap();
        stream.close().unwrap();

        let reopened = LogStream::recover(store, id, config).unwrap();
        assert_eq!(reopened.tail_and_version().unwrap().0, 0);
    }
}
