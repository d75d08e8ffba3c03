//! Detection delivery across the consumer boundary.
//!
//! The watcher thread hands confirmed arrivals to a [`DetectionSink`]. Sinks
//! run consumer code, so delivery is panic-contained: a panicking consumer
//! surfaces as a delivery failure and never unwinds into the watch loop.
//! Channel adapters cover the two common consumer shapes: a plain thread
//! draining a crossbeam channel, and an async task draining a tokio channel.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WatchError};

// ---------------------------------------------------------------------------
// Detection event
// ---------------------------------------------------------------------------

/// One confirmed package-file arrival.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionEvent {
    /// Full path of the file inside the watched directory.
    pub path: PathBuf,
}

// ---------------------------------------------------------------------------
// Sink trait
// ---------------------------------------------------------------------------

/// Consumer boundary for detections.
///
/// Invoked zero or more times per session from the watcher's background
/// thread, never from the thread that called `start()` or `stop()`. The
/// session holds its own reference for exactly as long as it runs and
/// releases it when the session ends.
pub trait DetectionSink: Send + Sync {
    fn on_file_detected(&self, event: DetectionEvent);
}

/// Shared handle to a sink, cloned into each watch session.
pub type SharedSink = Arc<dyn DetectionSink>;

impl<F> DetectionSink for F
where
    F: Fn(DetectionEvent) + Send + Sync,
{
    fn on_file_detected(&self, event: DetectionEvent) {
        self(event)
    }
}

// ---------------------------------------------------------------------------
// Bridge
// ---------------------------------------------------------------------------

/// Invokes the sink for one event, containing panics.
///
/// A panicking consumer yields [`WatchError::Delivery`] instead of unwinding
/// into the watch loop; the caller logs it and the session continues.
pub(crate) fn deliver(sink: &dyn DetectionSink, event: DetectionEvent) -> Result<()> {
    catch_unwind(AssertUnwindSafe(|| sink.on_file_detected(event))).map_err(|panic_info| {
        let message = if let Some(s) = panic_info.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.downcast_ref::<String>() {
            s.clone()
        } else {
            "detection sink panicked".to_string()
        };
        WatchError::Delivery(message)
    })
}

// ---------------------------------------------------------------------------
// Channel adapters
// ---------------------------------------------------------------------------

/// Forwards detections into a crossbeam channel drained by a consumer thread.
///
/// A disconnected receiver is tolerated: the event is dropped with a warning
/// and the session keeps running.
pub struct ChannelSink {
    tx: crossbeam_channel::Sender<DetectionEvent>,
}

impl ChannelSink {
    pub fn new(tx: crossbeam_channel::Sender<DetectionEvent>) -> Self {
        Self { tx }
    }
}

impl DetectionSink for ChannelSink {
    fn on_file_detected(&self, event: DetectionEvent) {
        if let Err(err) = self.tx.send(event) {
            log::warn!(
                "detection channel disconnected, dropping event path={}",
                err.into_inner().path.display()
            );
        }
    }
}

/// Forwards detections into a tokio unbounded channel drained by an async
/// consumer. The send never blocks, so it is safe from the watcher thread.
pub struct TokioSink {
    tx: tokio::sync::mpsc::UnboundedSender<DetectionEvent>,
}

impl TokioSink {
    pub fn new(tx: tokio::sync::mpsc::UnboundedSender<DetectionEvent>) -> Self {
        Self { tx }
    }
}

impl DetectionSink for TokioSink {
    fn on_file_detected(&self, event: DetectionEvent) {
        if let Err(err) = self.tx.send(event) {
            log::warn!(
                "async detection channel closed, dropping event path={}",
                err.0.path.display()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Duration;

    fn event(path: &str) -> DetectionEvent {
        DetectionEvent { path: PathBuf::from(path) }
    }

    #[test]
    fn closure_sink_receives_the_event() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_in_sink = seen.clone();
        let sink: SharedSink = Arc::new(move |e: DetectionEvent| {
            seen_in_sink.lock().push(e.path);
        });

        deliver(&*sink, event("/watch/a.apk")).unwrap();

        assert_eq!(*seen.lock(), vec![PathBuf::from("/watch/a.apk")]);
    }

    #[test]
    fn panicking_sink_is_contained_as_delivery_error() {
        struct Exploding;
        impl DetectionSink for Exploding {
            fn on_file_detected(&self, _event: DetectionEvent) {
                panic!("consumer fell over");
            }
        }

        let err = deliver(&Exploding, event("/watch/b.apk")).unwrap_err();
        match err {
            WatchError::Delivery(message) => assert!(message.contains("consumer fell over")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn channel_sink_forwards_to_a_receiver() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let sink = ChannelSink::new(tx);

        deliver(&sink, event("/watch/c.apk")).unwrap();

        let received = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(received.path, PathBuf::from("/watch/c.apk"));
    }

    #[test]
    fn channel_sink_survives_a_dropped_receiver() {
        let (tx, rx) = crossbeam_channel::unbounded();
        drop(rx);
        let sink = ChannelSink::new(tx);

        assert!(deliver(&sink, event("/watch/d.apk")).is_ok());
    }

    #[tokio::test]
    async fn tokio_sink_forwards_into_an_async_consumer() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let sink = TokioSink::new(tx);

        deliver(&sink, event("/watch/e.apk")).unwrap();

        let received = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.path, PathBuf::from("/watch/e.apk"));
    }

    #[test]
    fn tokio_sink_survives_a_closed_channel() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        drop(rx);
        let sink = TokioSink::new(tx);

        assert!(deliver(&sink, event("/watch/f.apk")).is_ok());
    }
}
