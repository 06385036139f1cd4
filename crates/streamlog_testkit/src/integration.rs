//! Cross-crate integration scenarios.
//!
//! End-to-end checks that drive a whole stream session (codec, tracker,
//! coalescing, reads, recovery, truncation together) through the behaviors
//! a correct logical log must exhibit.

use streamlog_core::LogConfig;

use crate::fixtures::TestStream;

/// Writes five 10-byte records starting at offset 1, then applies a
/// zero-length rewrite at offset 21.
///
/// Used by the rewrite-invalidation scenario; returns the stream for
/// further assertions.
#[must_use]
pub fn rewrite_invalidation_stream(config: LogConfig) -> TestStream {
    let stream = TestStream::with_config(config);
    stream.write(0, b"_").expect("pad to offset 1");
    for i in 0..5u64 {
        stream
            .write(1 + i * 10, b"0123456789")
            .expect("sequential write");
    }
    stream.write(21, b"").expect("zero-length rewrite");
    stream
}
