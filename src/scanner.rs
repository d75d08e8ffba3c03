//! Scanning collaborator boundary.
//!
//! Scanning is a separate resource from watching: implementations are plain
//! values with their own create/destroy lifecycle, independent of any watch
//! session. The watcher never calls a scanner; hosts drain detections from
//! their sink and decide scheduling themselves, typically off the watcher
//! thread so a slow scan cannot stall delivery of subsequent files.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Verdict for one scanned file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    /// Whether the file is judged malicious.
    pub is_malicious: bool,
    /// Detection confidence, 0 to 100.
    pub confidence: u8,
    /// Threat labels, most significant first. Empty for clean files.
    pub threats: Vec<String>,
    /// Wall-clock time the scan took.
    pub scan_duration: Duration,
}

impl ScanResult {
    /// A clean verdict with no threats.
    pub fn clean(scan_duration: Duration) -> Self {
        Self {
            is_malicious: false,
            confidence: 0,
            threats: Vec::new(),
            scan_duration,
        }
    }
}

impl fmt::Display for ScanResult {
    /// One-line summary in the form hosts log verdicts.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "malicious={} confidence={} threats={} duration_ms={}",
            self.is_malicious,
            self.confidence,
            self.threats.len(),
            self.scan_duration.as_millis()
        )
    }
}

/// Errors a scanner may report instead of a verdict.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Scan failed: {0}")]
    Failed(String),
}

/// Scanning collaborator interface.
///
/// `scan` is synchronous and may take arbitrary time (blocking or CPU-bound).
/// No timeout is imposed here; the caller owns scheduling.
pub trait Scanner: Send + Sync {
    fn scan(&self, path: &Path) -> Result<ScanResult, ScanError>;
}

/// Shared handle to a scanner.
pub type SharedScanner = Arc<dyn Scanner>;
