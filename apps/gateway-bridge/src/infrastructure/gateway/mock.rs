//! In-Memory Gateway
//!
//! Scripted stand-ins for the sockets and the venue calendar, used by unit
//! and integration tests. Replies are served from a queue in order; every
//! request is recorded; subscribe frames are injected with
//! [`MockGatewayTransport::push_frame`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{
    GatewayTransport, RawFrame, SubscriberHandle, TradingCalendar, TransportError,
};

/// Scripted transport.
#[derive(Debug, Default)]
pub struct MockGatewayTransport {
    responses: Mutex<VecDeque<Result<String, TransportError>>>,
    fallback: Mutex<Option<String>>,
    requests: Mutex<Vec<String>>,
    response_delay: Mutex<Duration>,
    subscriber: Mutex<Option<mpsc::Sender<RawFrame>>>,
    arrival: AtomicU64,
    subscribers_started: AtomicUsize,
}

impl MockGatewayTransport {
    /// Transport with no scripted replies.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one reply.
    pub fn push_response(&self, response: &str) {
        self.responses.lock().push_back(Ok(response.to_string()));
    }

    /// Queue one failed exchange.
    pub fn push_error(&self, error: TransportError) {
        self.responses.lock().push_back(Err(error));
    }

    /// Reply used once the queue is empty.
    pub fn set_fallback_response(&self, response: &str) {
        *self.fallback.lock() = Some(response.to_string());
    }

    /// Delay every reply, simulating a slow gateway.
    pub fn set_response_delay(&self, delay: Duration) {
        *self.response_delay.lock() = delay;
    }

    /// Requests sent so far, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }

    /// Number of requests sent so far.
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// How many subscriber workers have been started.
    #[must_use]
    pub fn subscribers_started(&self) -> usize {
        self.subscribers_started.load(Ordering::SeqCst)
    }

    /// Deliver one subscribe frame to the running subscriber.
    ///
    /// Returns `false` if no subscriber is running or its channel is closed.
    pub async fn push_frame(&self, payload: &str) -> bool {
        let sender = self.subscriber.lock().clone();
        let Some(sender) = sender else {
            return false;
        };
        let arrival = self.arrival.fetch_add(1, Ordering::SeqCst);
        sender.send(RawFrame::new(arrival, payload)).await.is_ok()
    }

    /// Deliver several frames in order.
    pub async fn push_frames(&self, payloads: &[&str]) -> usize {
        let mut delivered = 0;
        for payload in payloads {
            if self.push_frame(payload).await {
                delivered += 1;
            }
        }
        delivered
    }
}

#[async_trait]
impl GatewayTransport for MockGatewayTransport {
    async fn send_request(&self, request: String) -> Result<String, TransportError> {
        self.requests.lock().push(request);

        let delay = *self.response_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.responses.lock().pop_front();
        match scripted {
            Some(reply) => reply,
            None => self
                .fallback
                .lock()
                .clone()
                .ok_or_else(|| TransportError::Connection("no scripted reply".to_string())),
        }
    }

    async fn start_subscriber(
        &self,
        frames: mpsc::Sender<RawFrame>,
    ) -> Result<SubscriberHandle, TransportError> {
        *self.subscriber.lock() = Some(frames);
        self.subscribers_started.fetch_add(1, Ordering::SeqCst);

        let cancel = CancellationToken::new();
        let worker_cancel = cancel.clone();
        let join = tokio::spawn(async move { worker_cancel.cancelled().await });
        Ok(SubscriberHandle::new(cancel, join))
    }

    async fn stop_subscriber(&self, handle: &SubscriberHandle) {
        self.subscriber.lock().take();
        handle.stop().await;
    }
}

/// Calendar whose answer is set by the test.
#[derive(Debug)]
pub struct FixedCalendar {
    open: AtomicBool,
}

impl FixedCalendar {
    /// Calendar that is always open or always closed.
    #[must_use]
    pub const fn new(open: bool) -> Self {
        Self {
            open: AtomicBool::new(open),
        }
    }

    /// Flip the answer.
    pub fn set_open(&self, open: bool) {
        self.open.store(open, Ordering::SeqCst);
    }
}

impl TradingCalendar for FixedCalendar {
    fn is_open(&self, _at: DateTime<Utc>) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn serves_replies_in_order_then_fallback() {
        let transport = MockGatewayTransport::new();
        transport.push_response("first");
        transport.push_response("second");
        transport.set_fallback_response("rest");

        assert_eq!(transport.send_request("a".into()).await.unwrap(), "first");
        assert_eq!(transport.send_request("b".into()).await.unwrap(), "second");
        assert_eq!(transport.send_request("c".into()).await.unwrap(), "rest");
        assert_eq!(transport.requests(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn unscripted_request_fails() {
        let transport = MockGatewayTransport::new();
        assert!(matches!(
            transport.send_request("a".into()).await,
            Err(TransportError::Connection(_))
        ));
    }

    #[tokio::test]
    async fn frames_reach_subscriber_with_arrival_order() {
        let transport = MockGatewayTransport::new();
        let (tx, mut rx) = mpsc::channel(4);
        let handle = transport.start_subscriber(tx).await.unwrap();

        assert_eq!(transport.push_frames(&["x", "y"]).await, 2);
        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!((first.arrival, first.payload.as_str()), (0, "x"));
        assert_eq!((second.arrival, second.payload.as_str()), (1, "y"));

        transport.stop_subscriber(&handle).await;
        transport.stop_subscriber(&handle).await;
        assert!(!transport.push_frame("z").await);
    }
}
