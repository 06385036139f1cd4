//! Error types for the logical log core.

use crate::types::Version;
use thiserror::Error;

/// Result type for logical log operations.
pub type LogResult<T> = Result<T, LogError>;

/// Errors that can occur in logical log operations.
///
/// Corruption is always reported distinctly from [`LogError::NotFound`], so
/// callers can never mistake unsafe data for absent data.
#[derive(Debug, Error)]
pub enum LogError {
    /// Record store error.
    #[error("store error: {0}")]
    Store(#[from] streamlog_store::StoreError),

    /// A write targeted an offset beyond the current tail.
    #[error("out of sequence: offset {offset} is beyond tail {tail}")]
    OutOfSequence {
        /// The offset the write quoted.
        offset: u64,
        /// The stream tail at the time of the write.
        tail: u64,
    },

    /// A write quoted a version at or below the tracked high-water mark.
    #[error("stale version: {given} is not above {current}")]
    StaleVersion {
        /// The version the write quoted.
        given: Version,
        /// The currently tracked highest version.
        current: Version,
    },

    /// A record's header or payload failed validation.
    #[error("corruption: {message}")]
    Corruption {
        /// Description of the corruption.
        message: String,
    },

    /// A stored checksum did not match the recomputed value.
    #[error("checksum mismatch: expected {expected:016x}, got {actual:016x}")]
    ChecksumMismatch {
        /// Checksum persisted with the record.
        expected: u64,
        /// Checksum recomputed from the bytes read.
        actual: u64,
    },

    /// No record covers the requested offset.
    ///
    /// Expected for reads past the tail, below the truncation floor, or
    /// before the first record; never produced for unsafe data.
    #[error("not found")]
    NotFound,

    /// The operation was cancelled by its caller.
    #[error("cancelled")]
    Cancelled,

    /// The stream has been closed or no longer exists.
    #[error("stream no longer exists")]
    NoLongerExists,

    /// Recovery could not reconstruct a consistent tail.
    ///
    /// Fatal to the stream open that ran the recovery.
    #[error("recovery failed: {message}")]
    RecoveryFailed {
        /// Description of the failure.
        message: String,
    },
}

impl LogError {
    /// Creates a corruption error.
    pub fn corruption(message: impl Into<String>) -> Self {
        Self::Corruption {
            message: message.into(),
        }
    }

    /// Creates a recovery failure error.
    pub fn recovery_failed(message: impl Into<String>) -> Self {
        Self::RecoveryFailed {
            message: message.into(),
        }
    }

    /// Returns true for the expected not-found outcome.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound => true,
            Self::Store(e) => e.is_not_found(),
            _ => false,
        }
    }

    /// Returns true for corruption-class failures.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::Corruption { .. }
                | Self::ChecksumMismatch { .. }
                | Self::Store(streamlog_store::StoreError::Corrupted(_))
        )
    }
}
