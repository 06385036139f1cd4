//! Crash recovery harness.
//!
//! Drives a stream through a scripted sequence of writes while mirroring
//! the expected logical content and the expected durable prefix in a plain
//! model. A "crash" drops the session without closing, reopens through
//! recovery, and checks the recovered tail against the model: buffered but
//! unflushed bytes are lost, everything flushed survives.

use streamlog_core::{LogConfig, LogError, LogResult};

use crate::fixtures::TestStream;
use crate::generators::WriteOp;

/// A stream under test paired with its expected state.
pub struct CrashHarness {
    stream: TestStream,
    /// Expected logical content, including bytes still buffered.
    model: Vec<u8>,
    /// Expected durable prefix length.
    durable_len: u64,
    /// Whether a barrier record has ever been made durable.
    barrier_written: bool,
    coalescing: bool,
    threshold: usize,
}

impl CrashHarness {
    /// Creates a harness over a fresh in-memory stream.
    #[must_use]
    pub fn new(config: LogConfig) -> Self {
        let coalescing = config.coalescing_enabled;
        let threshold = config.coalesce_threshold;
        Self {
            stream: TestStream::with_config(config),
            model: Vec::new(),
            durable_len: 0,
            barrier_written: false,
            coalescing,
            threshold,
        }
    }

    /// Expected logical tail.
    #[must_use]
    pub fn expected_tail(&self) -> u64 {
        self.model.len() as u64
    }

    /// Applies one scripted operation to both the stream and the model.
    ///
    /// # Errors
    ///
    /// Propagates any stream error; the harness does not script failures.
    pub fn apply(&mut self, op: &WriteOp) -> LogResult<()> {
        let tail = self.model.len() as u64;
        match op {
            WriteOp::Append(data) => {
                self.stream.write(tail, data)?;
                self.append_model(data, false);
            }
            WriteOp::AppendBarrier(data) => {
                self.stream.write_with_barrier(tail, data)?;
                self.append_model(data, true);
            }
            WriteOp::Rewrite { data, .. } => {
                let offset = op.offset(tail);
                if offset == tail {
                    // Degenerate rewrite at the tail is an ordinary append.
                    self.stream.write(tail, data)?;
                    self.append_model(data, false);
                } else {
                    self.stream.write(offset, data)?;
                    self.model.truncate(offset as usize);
                    self.model.extend_from_slice(data);
                    // A rewrite flushes the surviving prefix and lands as a
                    // barrier record, so everything becomes durable.
                    self.durable_len = self.model.len() as u64;
                    self.barrier_written = true;
                }
            }
            WriteOp::Flush => {
                self.stream.flush()?;
                self.durable_len = self.model.len() as u64;
            }
        }
        Ok(())
    }

    fn append_model(&mut self, data: &[u8], barrier: bool) {
        self.model.extend_from_slice(data);
        let logical = self.model.len() as u64;
        if barrier {
            self.durable_len = logical;
            self.barrier_written = true;
        } else if !self.coalescing {
            self.durable_len = logical;
        } else if (logical - self.durable_len) as usize >= self.threshold {
            self.durable_len = logical;
        }
    }

    /// Verifies the live stream's tail and full content against the model.
    ///
    /// Reading flushes buffered bytes, so the durable prefix catches up to
    /// the logical tail as a side effect.
    ///
    /// # Errors
    ///
    /// Propagates read failures.
    pub fn verify_content(&mut self) -> LogResult<()> {
        let (tail, _) = self.stream.tail_and_version()?;
        assert_eq!(tail, self.expected_tail(), "logical tail diverged");

        if !self.model.is_empty() {
            let mut out = vec![0u8; self.model.len()];
            let span = self.stream.read_span(0, &mut out)?;
            assert_eq!(span.bytes_copied, self.model.len(), "span length diverged");
            assert_eq!(out, self.model, "stream content diverged");
            self.durable_len = tail;
        }
        Ok(())
    }

    /// Simulates a crash and reopens through recovery, checking the
    /// recovered tail against the expected durable prefix.
    ///
    /// # Errors
    ///
    /// Propagates recovery failures other than the expected
    /// no-barrier-yet case.
    pub fn crash_and_recover(&mut self) -> LogResult<()> {
        let placeholder = TestStream::memory();
        let crashed = std::mem::replace(&mut self.stream, placeholder);

        match crashed.crash_and_reopen() {
            Ok(reopened) => {
                self.stream = reopened;
                let (tail, _) = self.stream.tail_and_version()?;
                assert_eq!(tail, self.durable_len, "recovered tail diverged");
                self.model.truncate(self.durable_len as usize);
                Ok(())
            }
            Err(LogError::RecoveryFailed { .. }) if !self.barrier_written => {
                // Durable records with no barrier cannot be recovered; the
                // harness stops here and the scenario counts as exercised.
                Err(LogError::recovery_failed("expected: no barrier yet"))
            }
            Err(e) => Err(e),
        }
    }

    /// Closes cleanly and reopens, checking that nothing accepted was lost.
    ///
    /// # Errors
    ///
    /// Propagates close or recovery failures.
    pub fn close_and_recover(&mut self) -> LogResult<()> {
        let placeholder = TestStream::memory();
        let closing = std::mem::replace(&mut self.stream, placeholder);

        let expected = self.expected_tail();
        self.stream = closing.reopen()?;
        let (tail, _) = self.stream.tail_and_version()?;
        assert_eq!(tail, expected, "tail lost across clean close");
        self.durable_len = expected;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffered_bytes_lost_on_crash_flushed_bytes_survive() {
        let mut harness = CrashHarness::new(LogConfig::new());
        harness
            .apply(&WriteOp::AppendBarrier(b"durable".to_vec()))
            .unwrap();
        harness.apply(&WriteOp::Append(b"buffered".to_vec())).unwrap();
        assert_eq!(harness.expected_tail(), 15);

        harness.crash_and_recover().unwrap();
        assert_eq!(harness.expected_tail(), 7);
        harness.verify_content().unwrap();
    }

    #[test]
    fn clean_close_loses_nothing() {
        let mut harness = CrashHarness::new(LogConfig::new());
        harness
            .apply(&WriteOp::AppendBarrier(b"first".to_vec()))
            .unwrap();
        harness.apply(&WriteOp::Append(b"second".to_vec())).unwrap();

        harness.close_and_recover().unwrap();
        harness.verify_content().unwrap();
    }

    #[test]
    fn rewrite_then_crash_recovers_at_rewrite_chain() {
        let mut harness = CrashHarness::new(LogConfig::new().coalescing_enabled(false));
        harness
            .apply(&WriteOp::AppendBarrier(b"0123456789".to_vec()))
            .unwrap();
        harness.apply(&WriteOp::Append(b"abcdefghij".to_vec())).unwrap();
        harness
            .apply(&WriteOp::Rewrite {
                numerator: 0,
                data: b"NEW".to_vec(),
            })
            .unwrap();

        harness.crash_and_recover().unwrap();
        assert_eq!(harness.expected_tail(), 3);
        harness.verify_content().unwrap();
    }
}
