//! ZeroMQ Gateway Transport
//!
//! The two gateway channels over ZeroMQ:
//!
//! - **Request/reply**: a fresh REQ socket per call, one frame out, one
//!   frame back, each leg bounded by the request timeout. Never retried.
//! - **Subscribe**: one SUB socket subscribed to every topic, read by a
//!   single worker task that stamps each frame with its arrival number and
//!   pushes it into the bounded frame channel.
//!
//! The worker survives socket errors: it closes the socket, backs off and
//! reconnects. It exits only when cancelled or when nobody is reading the
//! frame channel any more.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use zeromq::{ReqSocket, Socket, SocketRecv, SocketSend, SubSocket, ZmqMessage};

use super::reconnect::{Backoff, BackoffConfig};
use crate::application::ports::{GatewayTransport, RawFrame, SubscriberHandle, TransportError};

/// Subscriber connection errors (internal to the worker loop).
#[derive(Debug, Error)]
enum SubscriberError {
    #[error("zeromq error: {0}")]
    Zmq(#[from] zeromq::ZmqError),

    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("non-text frame: {0}")]
    InvalidFrame(&'static str),
}

/// Why a connected subscriber session ended without an error.
enum SubscriberExit {
    Cancelled,
    ChannelClosed,
}

/// Transport configuration.
#[derive(Debug, Clone)]
pub struct ZmqTransportConfig {
    /// Request/reply endpoint, e.g. `tcp://10.0.0.5:5555`.
    pub request_endpoint: String,
    /// Publish/subscribe endpoint, e.g. `tcp://10.0.0.5:5556`.
    pub subscribe_endpoint: String,
    /// Bound on each request/reply leg.
    pub request_timeout: Duration,
    /// Idle receive tick on the subscribe socket.
    pub subscribe_timeout: Duration,
    /// Backoff between subscriber reconnects.
    pub backoff: BackoffConfig,
}

impl ZmqTransportConfig {
    /// Build endpoints from a host (with or without `tcp://`) and two ports.
    #[must_use]
    pub fn new(host: &str, request_port: u16, subscribe_port: u16) -> Self {
        let base = if host.contains("://") {
            host.trim_end_matches('/').to_string()
        } else {
            format!("tcp://{host}")
        };
        Self {
            request_endpoint: format!("{base}:{request_port}"),
            subscribe_endpoint: format!("{base}:{subscribe_port}"),
            request_timeout: Duration::from_secs(20),
            subscribe_timeout: Duration::from_secs(40),
            backoff: BackoffConfig::default(),
        }
    }
}

/// ZeroMQ implementation of [`GatewayTransport`].
#[derive(Debug)]
pub struct ZmqTransport {
    config: ZmqTransportConfig,
    arrival: Arc<AtomicU64>,
}

impl ZmqTransport {
    /// Create a transport. No socket is opened until first use.
    #[must_use]
    pub fn new(config: ZmqTransportConfig) -> Self {
        Self {
            config,
            arrival: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Transport configuration.
    #[must_use]
    pub const fn config(&self) -> &ZmqTransportConfig {
        &self.config
    }

    async fn exchange(&self, request: String) -> Result<String, TransportError> {
        let timeout = self.config.request_timeout;
        let mut socket = ReqSocket::new();

        bounded("connect", timeout, socket.connect(&self.config.request_endpoint))
            .await?
            .map_err(|e| TransportError::Connection(e.to_string()))?;
        bounded("send", timeout, socket.send(ZmqMessage::from(request)))
            .await?
            .map_err(|e| TransportError::Connection(e.to_string()))?;
        let reply = bounded("receive", timeout, socket.recv())
            .await?
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        String::try_from(reply).map_err(|e| TransportError::InvalidFrame(e.to_string()))
    }
}

#[async_trait]
impl GatewayTransport for ZmqTransport {
    async fn send_request(&self, request: String) -> Result<String, TransportError> {
        tracing::trace!(endpoint = %self.config.request_endpoint, "Sending gateway request");
        let result = self.exchange(request).await;
        if let Err(e) = &result {
            tracing::warn!(endpoint = %self.config.request_endpoint, error = %e, "Gateway request failed");
        }
        result
    }

    async fn start_subscriber(
        &self,
        frames: mpsc::Sender<RawFrame>,
    ) -> Result<SubscriberHandle, TransportError> {
        let cancel = CancellationToken::new();
        let worker = SubscriberWorker {
            endpoint: self.config.subscribe_endpoint.clone(),
            idle_timeout: self.config.subscribe_timeout,
            backoff: self.config.backoff,
            arrival: Arc::clone(&self.arrival),
            frames,
            cancel: cancel.clone(),
        };
        tracing::info!(endpoint = %worker.endpoint, "Starting gateway subscriber");
        let join = tokio::spawn(worker.run());
        Ok(SubscriberHandle::new(cancel, join))
    }
}

async fn bounded<F: Future>(
    operation: &'static str,
    after: Duration,
    future: F,
) -> Result<F::Output, TransportError> {
    tokio::time::timeout(after, future)
        .await
        .map_err(|_| TransportError::Timeout { operation, after })
}

struct SubscriberWorker {
    endpoint: String,
    idle_timeout: Duration,
    backoff: BackoffConfig,
    arrival: Arc<AtomicU64>,
    frames: mpsc::Sender<RawFrame>,
    cancel: CancellationToken,
}

impl SubscriberWorker {
    async fn run(self) {
        let mut backoff = Backoff::new(self.backoff);

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            match self.connect_and_run(&mut backoff).await {
                Ok(SubscriberExit::Cancelled) => break,
                Ok(SubscriberExit::ChannelClosed) => {
                    tracing::info!("Frame channel closed, subscriber stopping");
                    break;
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    tracing::warn!(
                        endpoint = %self.endpoint,
                        error = %e,
                        attempt = backoff.attempts(),
                        delay_ms = delay.as_millis(),
                        "Subscriber connection error, reconnecting"
                    );
                    tokio::select! {
                        () = self.cancel.cancelled() => break,
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        tracing::info!(endpoint = %self.endpoint, "Gateway subscriber stopped");
    }

    async fn connect_and_run(&self, backoff: &mut Backoff) -> Result<SubscriberExit, SubscriberError> {
        let mut socket = SubSocket::new();
        tokio::select! {
            () = self.cancel.cancelled() => return Ok(SubscriberExit::Cancelled),
            connected = tokio::time::timeout(self.idle_timeout, socket.connect(&self.endpoint)) => {
                connected.map_err(|_| SubscriberError::ConnectTimeout(self.idle_timeout))??;
            }
        }
        socket.subscribe("").await?;
        backoff.reset();
        tracing::info!(endpoint = %self.endpoint, "Gateway subscriber connected");

        let exit = self.receive_loop(&mut socket).await;

        for e in socket.close().await {
            tracing::debug!(error = %e, "Error closing subscribe socket");
        }
        exit
    }

    async fn receive_loop(&self, socket: &mut SubSocket) -> Result<SubscriberExit, SubscriberError> {
        loop {
            let received = tokio::select! {
                () = self.cancel.cancelled() => return Ok(SubscriberExit::Cancelled),
                received = tokio::time::timeout(self.idle_timeout, socket.recv()) => received,
            };

            let Ok(message) = received else {
                tracing::debug!(
                    idle_secs = self.idle_timeout.as_secs(),
                    "No subscribe traffic within receive timeout"
                );
                continue;
            };

            let payload = String::try_from(message?).map_err(SubscriberError::InvalidFrame)?;
            let arrival = self.arrival.fetch_add(1, Ordering::SeqCst);
            let frame = RawFrame::new(arrival, payload);

            tokio::select! {
                () = self.cancel.cancelled() => return Ok(SubscriberExit::Cancelled),
                sent = self.frames.send(frame) => {
                    if sent.is_err() {
                        return Ok(SubscriberExit::ChannelClosed);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_from_host() {
        let config = ZmqTransportConfig::new("tcp://10.0.0.5", 5555, 5556);
        assert_eq!(config.request_endpoint, "tcp://10.0.0.5:5555");
        assert_eq!(config.subscribe_endpoint, "tcp://10.0.0.5:5556");

        let bare = ZmqTransportConfig::new("gateway.local", 1, 2);
        assert_eq!(bare.request_endpoint, "tcp://gateway.local:1");
        assert_eq!(config.request_timeout, Duration::from_secs(20));
        assert_eq!(config.subscribe_timeout, Duration::from_secs(40));
    }

    #[tokio::test]
    async fn bounded_reports_timeout_leg() {
        let result = bounded("receive", Duration::from_millis(10), std::future::pending::<()>()).await;
        assert!(matches!(
            result,
            Err(TransportError::Timeout {
                operation: "receive",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn subscriber_stops_on_cancel_without_gateway() {
        let mut config = ZmqTransportConfig::new("tcp://127.0.0.1", 1, 1);
        config.backoff = BackoffConfig::with_bounds(Duration::from_millis(10), Duration::from_millis(20));
        let transport = ZmqTransport::new(config);
        let (tx, _rx) = mpsc::channel(4);

        let handle = transport.start_subscriber(tx).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        tokio::time::timeout(Duration::from_secs(2), transport.stop_subscriber(&handle))
            .await
            .expect("subscriber should stop");
        transport.stop_subscriber(&handle).await;
        assert!(!handle.is_running());
    }
}
