//! Directory watcher for newly-written package files.
//!
//! One [`ApkWatcher`] runs at most one watch session at a time. `start()`
//! validates the directory and registers the kernel watch before spawning
//! the session thread, so every setup failure surfaces synchronously from
//! `start()`. The session thread exclusively owns the kernel handle and its
//! clone of the consumer sink; `stop()` flips the shared cancel flag and
//! joins the thread, returning only after both are released. The cancel flag
//! is polled once per wait, so stop latency is bounded by the poll interval
//! plus any in-flight settle/deliver cycle.
//!
//! Delivery is at-least-once: the kernel may emit several records for one
//! file (create followed by close-write), and each matching record gets its
//! own settle check and delivery. Consumers needing exactly-once semantics
//! deduplicate on their side.

use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::WatchConfig;
use crate::error::{Result, WatchError};
use crate::event::{ChangeRecords, EventFlags};
use crate::inotify::InotifyStream;
use crate::sink::{deliver, DetectionEvent, SharedSink};

// ---------------------------------------------------------------------------
// Session constants
// ---------------------------------------------------------------------------

/// Events that signal an arriving or finished file: final write close,
/// rename into the directory, bare creation.
const WATCH_MASK: EventFlags = EventFlags::CLOSE_WRITE
    .union(EventFlags::MOVED_TO)
    .union(EventFlags::CREATE);

/// One kernel read must hold the largest burst the queue can deliver.
const EVENT_BUFFER_LEN: usize = 1024 * 1024;

// ---------------------------------------------------------------------------
// Watcher
// ---------------------------------------------------------------------------

/// Watches a single directory, non-recursively, for package-file arrivals.
///
/// Public operations may be called from any thread; lifecycle transitions
/// are serialized internally. Dropping an active watcher stops it.
pub struct ApkWatcher {
    config: WatchConfig,
    session: Mutex<Option<WatchSession>>,
    active: Arc<AtomicBool>,
    last_error: Arc<Mutex<Option<WatchError>>>,
}

/// Live state of one active watch: the cancel flag shared with the session
/// thread, and the thread itself. The kernel handle and the sink reference
/// live inside the thread.
struct WatchSession {
    cancel: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl ApkWatcher {
    /// Creates an idle watcher; nothing happens until `start()`.
    pub fn new(config: WatchConfig) -> Self {
        Self {
            config,
            session: Mutex::new(None),
            active: Arc::new(AtomicBool::new(false)),
            last_error: Arc::new(Mutex::new(None)),
        }
    }

    /// Starts a watch session on `directory`.
    ///
    /// Subscribes to change events before spawning the session thread, so
    /// registration failures surface here and no event is lost between
    /// return and the thread's first poll (the kernel queues from
    /// registration time).
    pub fn start(&self, directory: impl AsRef<Path>, sink: SharedSink) -> Result<()> {
        let directory = directory.as_ref();
        let mut session = self.session.lock();

        if session.is_some() {
            if self.active.load(Ordering::Relaxed) {
                return Err(WatchError::AlreadyActive);
            }
            // The previous session ended itself after a stream failure;
            // collect the finished thread before starting anew.
            if let Some(previous) = session.take() {
                if previous.thread.join().is_err() {
                    log::warn!("previous watcher thread panicked");
                }
            }
        }

        let is_dir = std::fs::metadata(directory)
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !is_dir {
            return Err(WatchError::DirectoryNotFound(directory.to_path_buf()));
        }

        let source =
            InotifyStream::open(directory, WATCH_MASK).map_err(WatchError::Subscription)?;

        let cancel = Arc::new(AtomicBool::new(false));
        let ctx = SessionContext {
            directory: directory.to_path_buf(),
            config: self.config.clone(),
            cancel: cancel.clone(),
            active: self.active.clone(),
            last_error: self.last_error.clone(),
        };

        self.active.store(true, Ordering::SeqCst);
        let thread = match thread::Builder::new()
            .name("apkwatch-session".to_string())
            .spawn(move || run_session(source, sink, ctx))
        {
            Ok(handle) => handle,
            Err(err) => {
                self.active.store(false, Ordering::SeqCst);
                return Err(WatchError::Subscription(err));
            }
        };

        *self.last_error.lock() = None;
        *session = Some(WatchSession { cancel, thread });
        log::info!(
            "package watch started dir={} extension={}",
            directory.display(),
            self.config.extension
        );
        Ok(())
    }

    /// Stops the active session, if any. Idempotent.
    ///
    /// Blocks until the session thread has exited and released the kernel
    /// handle and its sink reference; an in-flight settle/deliver cycle runs
    /// to completion first. Holding the session slot for the whole teardown
    /// also makes concurrent `stop()` callers wait it out.
    pub fn stop(&self) {
        let mut session = self.session.lock();
        let Some(live) = session.take() else {
            return;
        };
        log::info!("package watch stop requested");
        live.cancel.store(true, Ordering::SeqCst);
        if live.thread.join().is_err() {
            log::error!("watcher thread panicked during session");
        }
    }

    /// Lock-free session status.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    /// Terminal error of the last session, if it ended on its own.
    ///
    /// A session that hits a non-transient stream failure releases its
    /// resources and goes inactive by itself; the failure is parked here
    /// for the host to collect after observing `is_active() == false`.
    /// Cleared by the next successful `start()`.
    pub fn take_last_error(&self) -> Option<WatchError> {
        self.last_error.lock().take()
    }
}

impl Default for ApkWatcher {
    fn default() -> Self {
        Self::new(WatchConfig::default())
    }
}

impl Drop for ApkWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// Session loop
// ---------------------------------------------------------------------------

/// Everything the session thread needs, cloned out of the watcher at start.
struct SessionContext {
    directory: PathBuf,
    config: WatchConfig,
    cancel: Arc<AtomicBool>,
    active: Arc<AtomicBool>,
    last_error: Arc<Mutex<Option<WatchError>>>,
}

/// Body of the session thread: wait, read, decode, filter, settle, deliver,
/// until cancelled or the stream fails.
fn run_session(source: InotifyStream, sink: SharedSink, ctx: SessionContext) {
    let mut buffer = vec![0u8; EVENT_BUFFER_LEN];

    while !ctx.cancel.load(Ordering::Relaxed) {
        match source.wait(ctx.config.poll_interval) {
            Ok(false) => continue,
            Ok(true) => {}
            Err(err) => {
                log::error!("event wait failed dir={}: {err}", ctx.directory.display());
                *ctx.last_error.lock() = Some(WatchError::Read(err));
                break;
            }
        }
        let len = match source.read(&mut buffer) {
            Ok(len) => len,
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => continue,
            Err(err) => {
                log::error!("event read failed dir={}: {err}", ctx.directory.display());
                *ctx.last_error.lock() = Some(WatchError::Read(err));
                break;
            }
        };
        handle_records(&buffer[..len], &ctx, &sink);
    }

    // Release order per the session contract: kernel watch and handle first,
    // then the consumer reference, then the visible inactive flip.
    drop(source);
    drop(sink);
    ctx.active.store(false, Ordering::SeqCst);
    log::info!("package watch ended dir={}", ctx.directory.display());
}

/// Decodes one read buffer and, for each record in stream order, applies the
/// name filter, the settle confirmation, and delivery. Per-candidate failures
/// are logged and never end the session.
fn handle_records(buffer: &[u8], ctx: &SessionContext, sink: &SharedSink) {
    for record in ChangeRecords::new(buffer) {
        if !ctx.config.matches_name(record.name) {
            continue;
        }
        let path = ctx.directory.join(OsStr::from_bytes(record.name));
        if !confirm_settled(&path, ctx.config.settle_delay) {
            log::debug!("candidate vanished during settle path={}", path.display());
            continue;
        }
        log::info!("package file detected path={}", path.display());
        if let Err(err) = deliver(sink.as_ref(), DetectionEvent { path: path.clone() }) {
            log::warn!("delivery failed path={}: {err}", path.display());
        }
    }
}

/// Settle-then-verify: waits out the settle delay so the writer can finish
/// and close the file, then trusts the candidate only if it still exists as
/// a regular file.
///
/// Known false-negative window: a file removed or renamed during the delay
/// is dropped silently. The sleep blocks the session thread, so a burst of
/// near-simultaneous arrivals is verified one file at a time.
fn confirm_settled(path: &Path, settle_delay: Duration) -> bool {
    thread::sleep(settle_delay);
    std::fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}
