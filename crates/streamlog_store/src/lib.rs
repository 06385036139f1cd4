//! # streamlog Store
//!
//! Record store trait and implementations for streamlog.
//!
//! This crate defines the lowest-level persistence boundary of streamlog:
//! a key-addressed store of `(key, version, metadata, payload)` records.
//! Stores are **opaque record containers** - they never interpret the
//! metadata or payload bytes they hold.
//!
//! ## Design Principles
//!
//! - Stores persist and retrieve whole records by key
//! - Version admission is strictly increasing; a write at key `k`
//!   supersedes every retained record with key ≥ `k`
//! - No knowledge of the logical log's header framing or offsets
//! - Must be `Send + Sync` for concurrent access
//!
//! ## Available Stores
//!
//! - [`InMemoryRecordStore`] - for testing and ephemeral streams
//!
//! ## Example
//!
//! ```rust
//! use streamlog_store::{InMemoryRecordStore, RecordStore};
//!
//! let mut store = InMemoryRecordStore::new();
//! store.write(0, 1, b"meta", b"payload", 0).unwrap();
//! let record = store.read(0).unwrap();
//! assert_eq!(&record.payload, b"payload");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod memory;
mod store;

pub use error::{StoreError, StoreResult};
pub use memory::{InMemoryRecordStore, DEFAULT_METADATA_CAPACITY};
pub use store::{PhysicalRecord, RecordRange, RecordStore};
