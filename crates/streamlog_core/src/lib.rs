//! # Streamlog Core
//!
//! The logical log protocol layer: a continuous, randomly-truncatable
//! logical byte stream encoded onto the discrete, key-addressed records of
//! a [`streamlog_store::RecordStore`].
//!
//! This crate provides:
//! - Record codec with per-record CRC-64 integrity verification
//! - Tail/version tracking with truncate-by-rewrite semantics
//! - Write coalescing for small sequential writes
//! - Point and spanning reads with straddling-record clamping
//! - Barrier-anchored crash recovery of the stream tail
//! - Conservative head-truncation planning
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use parking_lot::Mutex;
//! use streamlog_core::{LogConfig, LogStream, StreamId};
//! use streamlog_store::InMemoryRecordStore;
//!
//! let store: streamlog_core::SharedStore =
//!     Arc::new(Mutex::new(Box::new(InMemoryRecordStore::new())));
//! let stream = LogStream::create(store, StreamId::random(), LogConfig::new()).unwrap();
//!
//! stream.write(0, b"hello world").unwrap();
//! let record = stream.read_containing(0).unwrap();
//! assert_eq!(record.payload, b"hello world");
//! stream.close().unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod codec;
mod coalesce;
mod config;
mod error;
mod notify;
mod read;
mod recovery;
mod stream;
mod tracker;
mod truncate;
mod types;

pub use coalesce::{CoalesceBuffer, PendingFlush};
pub use config::LogConfig;
pub use error::{LogError, LogResult};
pub use notify::{WaitHandle, WaitOutcome};
pub use read::{LogicalRecord, ReadView, SpanRead};
pub use recovery::{recover, RecoveredState};
pub use stream::{LogStream, LogUsage, SharedStore};
pub use tracker::{Tracker, WriteKind};
pub use truncate::truncate_head;
pub use types::{StreamId, Version};
