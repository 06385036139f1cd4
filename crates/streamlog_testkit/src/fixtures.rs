//! Test fixtures and stream helpers.
//!
//! Provides convenience wrappers for setting up in-memory streams and
//! reopening them through the recovery path.

use std::sync::Arc;

use parking_lot::Mutex;
use streamlog_core::{LogConfig, LogResult, LogStream, SharedStore, StreamId};
use streamlog_store::{InMemoryRecordStore, RecordStore};

/// A test stream backed by an in-memory record store.
///
/// Keeps the store handle alongside the session so tests can reopen the
/// stream (simulating a process restart) or inspect the store directly.
pub struct TestStream {
    /// The open session.
    pub stream: LogStream,
    /// The shared store handle, outliving any one session.
    pub store: SharedStore,
    /// The stream id used across reopens.
    pub stream_id: StreamId,
    config: LogConfig,
}

impl TestStream {
    /// Creates a fresh stream over an empty in-memory store.
    pub fn memory() -> Self {
        Self::with_config(LogConfig::new())
    }

    /// Creates a fresh stream with the given configuration.
    pub fn with_config(config: LogConfig) -> Self {
        let store: SharedStore = Arc::new(Mutex::new(
            Box::new(InMemoryRecordStore::new()) as Box<dyn RecordStore>
        ));
        let stream_id = StreamId::random();
        let stream = LogStream::create(Arc::clone(&store), stream_id, config.clone())
            .expect("create in-memory stream");
        Self {
            stream,
            store,
            stream_id,
            config,
        }
    }

    /// Wraps an already-populated store, opening through recovery.
    pub fn recover_from(store: SharedStore, stream_id: StreamId, config: LogConfig) -> LogResult<Self> {
        let stream = LogStream::recover(Arc::clone(&store), stream_id, config.clone())?;
        Ok(Self {
            stream,
            store,
            stream_id,
            config,
        })
    }

    /// Closes the session cleanly and reopens it through recovery.
    pub fn reopen(self) -> LogResult<Self> {
        self.stream.close()?;
        Self::recover_from(self.store, self.stream_id, self.config)
    }

    /// Drops the session without closing (a simulated crash) and reopens
    /// through recovery.
    pub fn crash_and_reopen(self) -> LogResult<Self> {
        drop(self.stream);
        Self::recover_from(self.store, self.stream_id, self.config)
    }
}

impl std::ops::Deref for TestStream {
    type Target = LogStream;

    fn deref(&self) -> &LogStream {
        &self.stream
    }
}
