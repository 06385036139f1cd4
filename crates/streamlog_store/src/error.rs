//! Error types for record store operations.

use std::io;
use thiserror::Error;

/// Result type for record store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during record store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// No record exists for the requested key.
    ///
    /// This is an expected outcome for reads past the highest key or below
    /// the truncation key, not a data-integrity failure.
    #[error("record not found: key {key}")]
    RecordNotFound {
        /// The key that was looked up.
        key: u64,
    },

    /// A write quoted a version at or below the highest admitted version.
    #[error("out of sequence: version {version} not above highest admitted {highest}")]
    OutOfSequence {
        /// The version quoted by the write.
        version: u64,
        /// The highest version the store has admitted.
        highest: u64,
    },

    /// The store is at capacity and the write's reservation does not cover it.
    #[error("store full: {needed} bytes needed, {available} available")]
    Full {
        /// Bytes the write required.
        needed: u64,
        /// Bytes remaining before the capacity limit.
        available: u64,
    },

    /// A reservation contraction exceeded the reserved amount.
    #[error("insufficient reservation: requested {requested} bytes, reserved {reserved}")]
    InsufficientReservation {
        /// Bytes the caller asked to release or consume.
        requested: u64,
        /// Bytes currently reserved.
        reserved: u64,
    },

    /// The store has been closed.
    #[error("store is closed")]
    Closed,

    /// The stored bytes are invalid at the store's own framing level.
    #[error("store corrupted: {0}")]
    Corrupted(String),
}

impl StoreError {
    /// Returns true when the error is the expected not-found outcome.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::RecordNotFound { .. })
    }
}
