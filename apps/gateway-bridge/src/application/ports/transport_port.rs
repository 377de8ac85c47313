//! Gateway Transport Port (Driven Port)
//!
//! Raw send/receive against the gateway. No protocol knowledge: requests and
//! replies are opaque JSON text, subscribe frames are stamped with their
//! arrival order and handed over a bounded channel.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Transport errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// A send or receive leg did not complete in time.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// Which leg timed out.
        operation: &'static str,
        /// Configured bound.
        after: Duration,
    },

    /// Socket could not be created or connected.
    #[error("connection error: {0}")]
    Connection(String),

    /// Reply frame was not valid text.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// Transport has been shut down.
    #[error("transport closed")]
    Closed,
}

impl TransportError {
    /// Whether this is a timeout.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// One subscribe-channel frame as received.
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Monotonic arrival number assigned by the transport.
    pub arrival: u64,
    /// When the frame came off the socket.
    pub received_at: Instant,
    /// JSON payload.
    pub payload: String,
}

impl RawFrame {
    /// Create a frame stamped now.
    #[must_use]
    pub fn new(arrival: u64, payload: impl Into<String>) -> Self {
        Self {
            arrival,
            received_at: Instant::now(),
            payload: payload.into(),
        }
    }
}

/// Handle to a running subscriber worker.
///
/// Stopping is idempotent: the first call cancels the worker and waits for
/// it, later calls return immediately.
#[derive(Debug)]
pub struct SubscriberHandle {
    cancel: CancellationToken,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl SubscriberHandle {
    /// Wrap a spawned worker.
    #[must_use]
    pub fn new(cancel: CancellationToken, join: JoinHandle<()>) -> Self {
        Self {
            cancel,
            join: Mutex::new(Some(join)),
        }
    }

    /// Whether the worker is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.join
            .lock()
            .as_ref()
            .is_some_and(|join| !join.is_finished())
    }

    /// Cancel the worker and wait for it to exit.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let join = self.join.lock().take();
        if let Some(join) = join
            && let Err(e) = join.await
        {
            tracing::warn!(error = %e, "Subscriber worker ended abnormally");
        }
    }
}

/// Port for the two gateway channels.
#[async_trait]
pub trait GatewayTransport: Send + Sync {
    /// Send one request and wait for exactly one reply.
    ///
    /// Never retries. Fails with [`TransportError::Timeout`] if either leg
    /// exceeds the request timeout.
    async fn send_request(&self, request: String) -> Result<String, TransportError>;

    /// Start the single subscriber worker feeding `frames` in arrival order.
    async fn start_subscriber(
        &self,
        frames: mpsc::Sender<RawFrame>,
    ) -> Result<SubscriberHandle, TransportError>;

    /// Stop a subscriber worker. Safe to call more than once.
    async fn stop_subscriber(&self, handle: &SubscriberHandle) {
        handle.stop().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stop_is_idempotent() {
        let cancel = CancellationToken::new();
        let worker_cancel = cancel.clone();
        let join = tokio::spawn(async move { worker_cancel.cancelled().await });
        let handle = SubscriberHandle::new(cancel, join);
        assert!(handle.is_running());

        tokio::time::timeout(Duration::from_secs(1), handle.stop())
            .await
            .expect("first stop completes");
        tokio::time::timeout(Duration::from_secs(1), handle.stop())
            .await
            .expect("second stop completes");
        assert!(!handle.is_running());
    }

    #[test]
    fn timeout_classification() {
        let err = TransportError::Timeout {
            operation: "receive",
            after: Duration::from_secs(20),
        };
        assert!(err.is_timeout());
        assert!(!TransportError::Closed.is_timeout());
        assert_eq!(err.to_string(), "receive timed out after 20s");
    }
}
