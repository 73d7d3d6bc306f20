//! Mining statistics for the run summary.

use std::time::Duration;

/// Mining statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MiningStats {
    /// Total hashes computed.
    pub total_hashes: u64,
    /// Wall-clock time spent searching.
    pub elapsed: Duration,
    /// Current hash rate (hashes per second).
    pub hash_rate: f64,
}

impl MiningStats {
    /// Stats for `total_hashes` computed over `elapsed`.
    pub fn new(total_hashes: u64, elapsed: Duration) -> Self {
        let mut stats = MiningStats {
            total_hashes,
            elapsed,
            hash_rate: 0.0,
        };
        stats.update_hash_rate();
        stats
    }

    /// Update hash rate based on elapsed time.
    pub fn update_hash_rate(&mut self) {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.hash_rate = self.total_hashes as f64 / secs;
        }
    }

    /// Format hash rate for display.
    pub fn format_hash_rate(&self) -> String {
        if self.hash_rate >= 1_000_000_000.0 {
            format!("{:.2} GH/s", self.hash_rate / 1_000_000_000.0)
        } else if self.hash_rate >= 1_000_000.0 {
            format!("{:.2} MH/s", self.hash_rate / 1_000_000.0)
        } else if self.hash_rate >= 1_000.0 {
            format!("{:.2} KH/s", self.hash_rate / 1_000.0)
        } else {
            format!("{:.2} H/s", self.hash_rate)
        }
    }
}
