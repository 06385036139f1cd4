//! Write coalescing buffer.
//!
//! Small forward writes are accumulated in memory and emitted as one
//! physical record when a flush trigger fires: the size threshold, an
//! explicit flush or barrier, stream close, or buffered data older than the
//! configured interval. Buffered bytes are contiguous with the durable tail
//! and carry the highest version among the writes they came from.

use std::time::{Duration, Instant};

use crate::types::Version;

/// A drained run of buffered bytes ready to be written as one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFlush {
    /// Stream offset of the first buffered byte.
    pub offset: u64,
    /// Highest version among the coalesced writes.
    pub version: Version,
    /// The coalesced payload.
    pub bytes: Vec<u8>,
}

/// Accumulates contiguous forward writes until a flush trigger fires.
#[derive(Debug)]
pub struct CoalesceBuffer {
    threshold: usize,
    interval: Duration,
    base_offset: u64,
    bytes: Vec<u8>,
    version: Version,
    first_buffered_at: Option<Instant>,
}

impl CoalesceBuffer {
    /// Creates an empty buffer with the given flush threshold and age
    /// interval (`Duration::ZERO` disables age-based flushing).
    #[must_use]
    pub fn new(threshold: usize, interval: Duration) -> Self {
        Self {
            threshold,
            interval,
            base_offset: 0,
            bytes: Vec::new(),
            version: Version::default(),
            first_buffered_at: None,
        }
    }

    /// True when nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Number of buffered bytes.
    #[must_use]
    pub fn buffered_bytes(&self) -> usize {
        self.bytes.len()
    }

    /// Stream offset one past the last buffered byte, or `None` when empty.
    #[must_use]
    pub fn end_offset(&self) -> Option<u64> {
        if self.bytes.is_empty() {
            None
        } else {
            Some(self.base_offset + self.bytes.len() as u64)
        }
    }

    /// Appends a forward write to the buffer.
    ///
    /// The caller guarantees `offset` continues the buffered run (or starts
    /// a new one when empty) and that `version` exceeds every version
    /// already buffered.
    pub fn append(&mut self, offset: u64, version: Version, data: &[u8]) {
        if self.bytes.is_empty() {
            self.base_offset = offset;
            self.first_buffered_at = Some(Instant::now());
        }
        debug_assert_eq!(offset, self.base_offset + self.bytes.len() as u64);
        debug_assert!(version > self.version || self.bytes.is_empty());
        self.bytes.extend_from_slice(data);
        self.version = version;
    }

    /// Whether an automatic flush is due: the size threshold was reached or
    /// the oldest buffered byte has exceeded the age interval.
    #[must_use]
    pub fn flush_due(&self) -> bool {
        if self.bytes.is_empty() {
            return false;
        }
        if self.bytes.len() >= self.threshold {
            return true;
        }
        if self.interval > Duration::ZERO {
            if let Some(first) = self.first_buffered_at {
                return first.elapsed() >= self.interval;
            }
        }
        false
    }

    /// Drains the buffer, returning the coalesced run if anything was
    /// buffered.
    pub fn take(&mut self) -> Option<PendingFlush> {
        if self.bytes.is_empty() {
            return None;
        }
        self.first_buffered_at = None;
        Some(PendingFlush {
            offset: self.base_offset,
            version: self.version,
            bytes: std::mem::take(&mut self.bytes),
        })
    }

    /// Drops buffered bytes at or after `offset` ahead of a tail rewrite.
    ///
    /// Bytes before `offset` remain buffered and must be flushed before the
    /// rewrite record is written, so that the rewrite supersedes a fully
    /// persisted prefix.
    pub fn discard_from(&mut self, offset: u64) {
        if self.bytes.is_empty() || offset >= self.base_offset + self.bytes.len() as u64 {
            return;
        }
        if offset <= self.base_offset {
            self.bytes.clear();
            self.first_buffered_at = None;
            return;
        }
        self.bytes.truncate((offset - self.base_offset) as usize);
    }
}
