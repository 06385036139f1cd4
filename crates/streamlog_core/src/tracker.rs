//! Tail and version tracking for one open stream.
//!
//! The tracker owns the logical tail offset and the monotonic version
//! counter, validates write sequencing, and encodes accepted writes into
//! physical records keyed by their stream offset. It is the only component
//! that advances stream state, and it advances only after the store has
//! confirmed the write.

use crate::codec::{self, EncodeContext};
use crate::error::{LogError, LogResult};
use crate::types::{StreamId, Version};
use streamlog_store::RecordStore;
use tracing::debug;

/// How an accepted write related to the tail at the time it was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    /// Appended at the tail.
    Forward,
    /// Rewrote the tail from an offset below it, superseding history.
    Rewrite,
}

/// Per-stream tail and version state machine.
///
/// # Invariants
///
/// - `tail_offset` is the next unwritten logical byte
/// - `highest_version` strictly increases across every accepted write
/// - a failed store write leaves both unchanged
#[derive(Debug)]
pub struct Tracker {
    stream_id: StreamId,
    tail_offset: u64,
    highest_version: Version,
    last_barrier_offset: Option<u64>,
    metadata_capacity: usize,
}

impl Tracker {
    /// Creates tracker state for a freshly created stream.
    #[must_use]
    pub fn new(stream_id: StreamId, metadata_capacity: usize) -> Self {
        Self {
            stream_id,
            tail_offset: 0,
            highest_version: Version::default(),
            last_barrier_offset: None,
            metadata_capacity,
        }
    }

    /// Creates tracker state from a completed recovery scan.
    #[must_use]
    pub fn recovered(
        stream_id: StreamId,
        metadata_capacity: usize,
        tail_offset: u64,
        highest_version: Version,
        last_barrier_offset: Option<u64>,
    ) -> Self {
        Self {
            stream_id,
            tail_offset,
            highest_version,
            last_barrier_offset,
            metadata_capacity,
        }
    }

    /// The stream this tracker belongs to.
    #[must_use]
    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    /// Returns the current tail offset and highest version.
    #[must_use]
    pub fn tail_and_version(&self) -> (u64, Version) {
        (self.tail_offset, self.highest_version)
    }

    /// Offset of the most recent barrier record, if one was written
    /// or recovered.
    #[must_use]
    pub fn last_barrier_offset(&self) -> Option<u64> {
        self.last_barrier_offset
    }

    /// Validates sequencing for a write at `offset` with `version` without
    /// applying it.
    ///
    /// # Errors
    ///
    /// Returns the sequencing error the write would fail with.
    pub fn check_sequencing(&self, offset: u64, version: Version) -> LogResult<WriteKind> {
        if version <= self.highest_version {
            return Err(LogError::StaleVersion {
                given: version,
                current: self.highest_version,
            });
        }
        if offset > self.tail_offset {
            return Err(LogError::OutOfSequence {
                offset,
                tail: self.tail_offset,
            });
        }
        Ok(if offset == self.tail_offset {
            WriteKind::Forward
        } else {
            WriteKind::Rewrite
        })
    }

    /// Applies one write: encodes the record and persists it at
    /// `key == offset`.
    ///
    /// A forward write (`offset == tail`) appends; a write below the tail
    /// is a truncate-by-rewrite that supersedes everything at or after
    /// `offset`. Rewrite records are always persisted with the barrier flag
    /// so recovery can trust the rewrite point.
    ///
    /// # Errors
    ///
    /// Returns a sequencing error for a stale version or an offset gap, or
    /// the store's error if persistence fails; in both cases the tracked
    /// tail and version are unchanged.
    pub fn write(
        &mut self,
        store: &mut dyn RecordStore,
        offset: u64,
        version: Version,
        payload: &[u8],
        is_barrier: bool,
        reservation: u64,
    ) -> LogResult<WriteKind> {
        let kind = self.check_sequencing(offset, version)?;

        // A rewrite supersedes durable history; it must be a trusted
        // recovery boundary regardless of what the caller asked for.
        let barrier = is_barrier || kind == WriteKind::Rewrite;

        let encoded = codec::encode(EncodeContext {
            stream_id: self.stream_id,
            stream_offset: offset,
            version,
            payload,
            is_barrier: barrier,
            metadata_capacity: self.metadata_capacity,
        })?;

        store.write(
            offset,
            version.as_u64(),
            &encoded.metadata,
            &encoded.payload,
            reservation,
        )?;

        if kind == WriteKind::Rewrite {
            debug!(
                stream = %self.stream_id,
                offset,
                old_tail = self.tail_offset,
                "tail rewritten"
            );
        }

        self.tail_offset = offset + payload.len() as u64;
        self.highest_version = version;
        if barrier {
            self.last_barrier_offset = Some(offset);
        }
        Ok(kind)
    }
}
