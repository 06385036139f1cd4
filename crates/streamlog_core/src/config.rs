//! Stream configuration.

use std::time::Duration;

/// Configuration for opening a logical stream.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Whether small forward writes are coalesced into fewer records.
    ///
    /// Disabling does not change correctness, only I/O amplification:
    /// each logical write becomes one physical record.
    pub coalescing_enabled: bool,

    /// Buffered bytes at which the coalescing buffer flushes.
    pub coalesce_threshold: usize,

    /// Buffered data older than this flushes on the next write
    /// (`Duration::ZERO` = never flush on age alone).
    pub flush_interval: Duration,

    /// Records retained below the computed head-truncation floor.
    ///
    /// Destaging to the durable per-stream store is asynchronous, so the
    /// planner keeps this many extra records as a safety margin.
    pub retention_margin: usize,

    /// Reservation bytes passed through to the store with each write.
    pub write_reservation: u64,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            coalescing_enabled: true,
            coalesce_threshold: 64 * 1024, // 64 KB
            flush_interval: Duration::ZERO,
            retention_margin: 1,
            write_reservation: 0,
        }
    }
}

impl LogConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether coalescing is enabled.
    #[must_use]
    pub const fn coalescing_enabled(mut self, value: bool) -> Self {
        self.coalescing_enabled = value;
        self
    }

    /// Sets the coalescing flush threshold.
    #[must_use]
    pub const fn coalesce_threshold(mut self, bytes: usize) -> Self {
        self.coalesce_threshold = bytes;
        self
    }

    /// Sets the age-based flush interval.
    #[must_use]
    pub const fn flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Sets the truncation retention margin, in records.
    #[must_use]
    pub const fn retention_margin(mut self, records: usize) -> Self {
        self.retention_margin = records;
        self
    }

    /// Sets the per-write reservation passed to the store.
    #[must_use]
    pub const fn write_reservation(mut self, bytes: u64) -> Self {
        self.write_reservation = bytes;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = LogConfig::default();
        assert!(config.coalescing_enabled);
        assert_eq!(config.retention_margin, 1);
        assert_eq!(config.flush_interval, Duration::ZERO);
    }

    #[test]
    fn builder_pattern() {
        let config = LogConfig::new()
            .coalescing_enabled(false)
            .coalesce_threshold(128)
            .retention_margin(3);

        assert!(!config.coalescing_enabled);
        assert_eq!(config.coalesce_threshold, 128);
        assert_eq!(config.retention_margin, 3);
    }
}
