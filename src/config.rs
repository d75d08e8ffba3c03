//! Watch session tuning knobs.
//!
//! The defaults mirror the behavior hosts depend on: a one second poll
//! interval bounds cancellation latency, and a 500 ms settle delay gives
//! writers time to close a freshly created package file before it is
//! reported. Tests shorten both to keep runtime down.

use std::time::Duration;

/// Configuration for one watch session.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Maximum time the background loop blocks waiting for kernel events.
    /// Also the upper bound on how long `stop()` may wait for the loop to
    /// notice cancellation.
    pub poll_interval: Duration,
    /// Grace period between a raw change record and the existence re-check
    /// that confirms the file as arrived.
    pub settle_delay: Duration,
    /// Target file suffix, matched case-insensitively against entry names.
    /// Includes the leading dot.
    pub extension: String,
}

impl WatchConfig {
    /// Returns true if `name` ends with the configured suffix,
    /// ASCII-case-insensitively. Names shorter than the suffix never match.
    ///
    /// Operates on raw bytes so entries with non-UTF-8 names are handled.
    pub fn matches_name(&self, name: &[u8]) -> bool {
        let suffix = self.extension.as_bytes();
        name.len() >= suffix.len()
            && name[name.len() - suffix.len()..].eq_ignore_ascii_case(suffix)
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            settle_delay: Duration::from_millis(500),
            extension: ".apk".to_string(),
        }
    }
}
