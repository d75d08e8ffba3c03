//! Directory watching for newly-written package files.
//!
//! This crate provides the watch engine a host wires between its filesystem
//! and its malware scanner:
//! - Kernel change-notification source for one directory (inotify)
//! - Bounds-checked decoding of the packed change-record stream
//! - Settle-and-verify confirmation of finished writes
//! - Panic-contained delivery to thread or async consumers
//! - The scanning collaborator boundary (trait and verdict types)
//!
//! The watch engine itself is Linux/Android only; the decoder, sinks, and
//! scanner boundary build everywhere.
//!
//! # Wiring
//!
//! ```no_run
//! use std::sync::Arc;
//! use apkwatch::{ApkWatcher, ChannelSink, WatchConfig};
//!
//! let (tx, rx) = crossbeam_channel::unbounded();
//! let watcher = ApkWatcher::new(WatchConfig::default());
//! watcher.start("/incoming", Arc::new(ChannelSink::new(tx)))?;
//!
//! // Drain detections on your own thread; hand paths to a scanner there so
//! // slow scans never stall delivery of subsequent files.
//! std::thread::spawn(move || {
//!     for event in rx {
//!         println!("arrived: {}", event.path.display());
//!     }
//! });
//! # Ok::<(), apkwatch::WatchError>(())
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod scanner;
pub mod sink;

#[cfg(any(target_os = "linux", target_os = "android"))]
pub mod inotify;
#[cfg(any(target_os = "linux", target_os = "android"))]
pub mod watcher;

// Re-export main types
pub use config::WatchConfig;
pub use error::{Result, WatchError};
pub use event::{ChangeRecord, ChangeRecords, EventFlags};
pub use scanner::{ScanError, ScanResult, Scanner, SharedScanner};
pub use sink::{ChannelSink, DetectionEvent, DetectionSink, SharedSink, TokioSink};

#[cfg(any(target_os = "linux", target_os = "android"))]
pub use inotify::InotifyStream;
#[cfg(any(target_os = "linux", target_os = "android"))]
pub use watcher::ApkWatcher;
