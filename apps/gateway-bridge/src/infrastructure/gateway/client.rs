//! Gateway Client
//!
//! Runtime assembly of the bridge. Owns the tasks:
//!
//! - the transport's subscriber worker, feeding the bounded frame channel;
//! - the reconciler consumer loop, draining it into the dispatch gate;
//! - the heartbeat monitor and the supervisor acting on its decisions.
//!
//! One cancellation token stops all of them. A fatal reconciliation error
//! cancels it too, so the host observes [`GatewayClient::closed`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::auth::Credentials;
use crate::application::events::{BridgeEvent, EventPublisher};
use crate::application::ports::{
    ExecutionReportHandler, GatewayTransport, RawFrame, SubscriberHandle, TradingCalendar,
    TransportError,
};
use crate::application::services::{
    DispatchGate, GateSnapshot, HeartbeatConfig, HeartbeatEvent, HeartbeatMonitor, HeartbeatState,
    OrderRouter, SequenceReconciler, SessionController, SessionInfo, SessionStatus,
};
use crate::domain::sequence::SequenceSnapshot;
use crate::error::BridgeError;
use crate::infrastructure::metrics;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct GatewayClientConfig {
    /// Gateway client id (tag 109).
    pub client_id: String,
    /// Trading account (tag 1).
    pub account: String,
    /// Heartbeat supervision.
    pub heartbeat: HeartbeatConfig,
    /// How long the gate stays locked after a call.
    pub unlock_grace: Duration,
    /// Capacity of the subscriber-to-reconciler channel.
    pub frame_channel_capacity: usize,
}

impl GatewayClientConfig {
    /// Defaults for the given client id and account.
    #[must_use]
    pub fn new(client_id: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            account: account.into(),
            heartbeat: HeartbeatConfig::default(),
            unlock_grace: Duration::ZERO,
            frame_channel_capacity: 1024,
        }
    }
}

/// Read-only view of the whole bridge.
#[derive(Debug, Clone, Serialize)]
pub struct BridgeSnapshot {
    /// Session state.
    pub session: SessionStatus,
    /// Sequence tracker state.
    pub sequence: SequenceSnapshot,
    /// Dispatch gate state.
    pub gate: GateSnapshot,
    /// Whether the subscriber worker is running.
    pub subscriber_running: bool,
    /// Consecutive silent heartbeat intervals.
    pub silent_ticks: u32,
    /// The fatal error that stopped the bridge, if any.
    pub fatal_error: Option<String>,
}

/// The assembled bridge.
pub struct GatewayClient {
    config: GatewayClientConfig,
    transport: Arc<dyn GatewayTransport>,
    session: Arc<SessionController>,
    gate: Arc<DispatchGate>,
    reconciler: Arc<SequenceReconciler>,
    heartbeat: Arc<HeartbeatState>,
    orders: OrderRouter,
    events: EventPublisher,
    cancel: CancellationToken,
    frame_tx: mpsc::Sender<RawFrame>,
    frame_rx: Mutex<Option<mpsc::Receiver<RawFrame>>>,
    subscriber: Mutex<Option<Arc<SubscriberHandle>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    fatal_error: Mutex<Option<String>>,
    shut_down: AtomicBool,
}

impl GatewayClient {
    /// Assemble the bridge. Nothing runs until [`connect`](Self::connect).
    #[must_use]
    pub fn new(
        transport: Arc<dyn GatewayTransport>,
        calendar: Arc<dyn TradingCalendar>,
        handler: Arc<dyn ExecutionReportHandler>,
        credentials: Credentials,
        config: GatewayClientConfig,
        events: EventPublisher,
    ) -> Arc<Self> {
        let session = Arc::new(SessionController::new(
            Arc::clone(&transport),
            calendar,
            credentials,
        ));
        let gate = Arc::new(DispatchGate::with_grace(handler, config.unlock_grace));
        let heartbeat = Arc::new(HeartbeatState::new());
        let reconciler = Arc::new(SequenceReconciler::new(
            Arc::clone(&session),
            Arc::clone(&gate),
            Arc::clone(&heartbeat),
            events.clone(),
        ));
        let orders = OrderRouter::new(
            Arc::clone(&session),
            Arc::clone(&gate),
            config.client_id.clone(),
            config.account.clone(),
        );
        let (frame_tx, frame_rx) = mpsc::channel(config.frame_channel_capacity.max(1));

        Arc::new(Self {
            config,
            transport,
            session,
            gate,
            reconciler,
            heartbeat,
            orders,
            events,
            cancel: CancellationToken::new(),
            frame_tx,
            frame_rx: Mutex::new(Some(frame_rx)),
            subscriber: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
            fatal_error: Mutex::new(None),
            shut_down: AtomicBool::new(false),
        })
    }

    /// Start the subscriber, the reconciler and the heartbeat supervisor,
    /// then log on with a fresh session.
    ///
    /// # Errors
    ///
    /// Returns an error if the client was already connected or shut down,
    /// if the subscriber cannot be started, or if the logon fails. A logon
    /// refused during trading hours is fatal and stops the bridge.
    pub async fn connect(self: &Arc<Self>) -> Result<SessionInfo, BridgeError> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(BridgeError::ShutDown);
        }
        let Some(frame_rx) = self.frame_rx.lock().take() else {
            return Err(TransportError::Connection("gateway client already connected".to_string()).into());
        };

        self.reconciler.reset_sequence();
        self.start_subscriber().await?;
        self.spawn_reconciler(frame_rx);

        let info = match self.session.logon(None).await {
            Ok(info) => info,
            Err(e) => {
                metrics::record_error(e.kind());
                if e.is_fatal() {
                    self.fail(&e);
                }
                return Err(e);
            }
        };
        if info.authenticated {
            self.events
                .publish(BridgeEvent::SessionOpened { replay_from: None });
        }
        self.heartbeat.reset();
        self.spawn_heartbeat();

        tracing::info!(
            authenticated = info.authenticated,
            client_id = %self.config.client_id,
            "Gateway client connected"
        );
        Ok(info)
    }

    /// Stop every task. Idempotent.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("Shutting down gateway client");

        self.cancel.cancel();
        self.gate.release_now();
        self.stop_subscriber().await;

        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Bridge task ended abnormally");
            }
        }
        tracing::info!("Gateway client stopped");
    }

    /// Resolves once the bridge has stopped, by shutdown or fatal error.
    pub async fn closed(&self) {
        self.cancel.cancelled().await;
    }

    /// Order entry.
    #[must_use]
    pub const fn orders(&self) -> &OrderRouter {
        &self.orders
    }

    /// The dispatch gate, for host calls that must not race reports.
    #[must_use]
    pub const fn gate(&self) -> &Arc<DispatchGate> {
        &self.gate
    }

    /// The session controller.
    #[must_use]
    pub const fn session(&self) -> &Arc<SessionController> {
        &self.session
    }

    /// Read-only view of the bridge.
    #[must_use]
    pub fn snapshot(&self) -> BridgeSnapshot {
        BridgeSnapshot {
            session: self.session.snapshot(),
            sequence: self.reconciler.snapshot(),
            gate: self.gate.snapshot(),
            subscriber_running: self
                .subscriber
                .lock()
                .as_ref()
                .is_some_and(|handle| handle.is_running()),
            silent_ticks: self.heartbeat.silent_ticks(),
            fatal_error: self.fatal_error.lock().clone(),
        }
    }

    async fn start_subscriber(&self) -> Result<(), BridgeError> {
        let handle = self
            .transport
            .start_subscriber(self.frame_tx.clone())
            .await?;
        *self.subscriber.lock() = Some(Arc::new(handle));
        self.session.set_connected(true);
        Ok(())
    }

    async fn stop_subscriber(&self) {
        self.session.set_connected(false);
        let handle = self.subscriber.lock().take();
        if let Some(handle) = handle {
            self.transport.stop_subscriber(&handle).await;
        }
    }

    fn spawn_reconciler(self: &Arc<Self>, frames: mpsc::Receiver<RawFrame>) {
        let client = Arc::clone(self);
        let task = tokio::spawn(async move {
            if let Err(e) = client.reconciler.run(frames, client.cancel.clone()).await {
                client.fail(&e);
            }
        });
        self.tasks.lock().push(task);
    }

    fn spawn_heartbeat(self: &Arc<Self>) {
        let (event_tx, event_rx) = mpsc::channel(8);
        let monitor = HeartbeatMonitor::new(
            self.config.heartbeat,
            Arc::clone(&self.heartbeat),
            Arc::clone(&self.session),
            event_tx,
            self.cancel.clone(),
        );
        let monitor_task = tokio::spawn(monitor.run());
        let supervisor_task = tokio::spawn(Arc::clone(self).supervise(event_rx));

        let mut tasks = self.tasks.lock();
        tasks.push(monitor_task);
        tasks.push(supervisor_task);
    }

    async fn supervise(self: Arc<Self>, mut events: mpsc::Receiver<HeartbeatEvent>) {
        loop {
            let event = tokio::select! {
                () = self.cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            match event {
                HeartbeatEvent::SessionExpired => {
                    self.events.publish(BridgeEvent::SessionExpired);
                }
                HeartbeatEvent::Reconnect {
                    silent_ticks,
                    session_open,
                } => {
                    if let Err(e) = self.restart(silent_ticks, session_open).await {
                        metrics::record_error(e.kind());
                        tracing::error!(error = %e, "Subscriber restart failed, retrying next interval");
                    }
                }
            }
        }
        tracing::debug!("Heartbeat supervisor stopped");
    }

    async fn restart(&self, silent_ticks: u32, session_open: bool) -> Result<(), BridgeError> {
        let cause = BridgeError::HeartbeatStale { silent_ticks };
        tracing::warn!(reason = %cause, session_open, "Restarting gateway subscriber");

        self.stop_subscriber().await;
        tokio::select! {
            () = self.cancel.cancelled() => return Err(BridgeError::ShutDown),
            () = tokio::time::sleep(self.config.heartbeat.settle_delay) => {}
        }
        self.reconciler.reset_sequence();
        self.start_subscriber().await?;

        let info = self.session.logon(None).await?;
        self.heartbeat.reset();
        metrics::record_subscriber_restart();
        self.events
            .publish(BridgeEvent::SubscriberRestarted { silent_ticks });
        if info.authenticated {
            self.events
                .publish(BridgeEvent::SessionOpened { replay_from: None });
        }
        Ok(())
    }

    fn fail(&self, error: &BridgeError) {
        tracing::error!(error = %error, kind = error.kind(), "Fatal bridge error, stopping");
        *self.fatal_error.lock() = Some(error.to_string());
        self.events.publish(BridgeEvent::Fatal(error.to_string()));
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayClient")
            .field("client_id", &self.config.client_id)
            .field("session", &self.session)
            .field("shut_down", &self.shut_down.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::RecordingReportHandler;
    use crate::infrastructure::gateway::mock::{FixedCalendar, MockGatewayTransport};

    fn client(transport: &Arc<MockGatewayTransport>) -> Arc<GatewayClient> {
        GatewayClient::new(
            transport.clone(),
            Arc::new(FixedCalendar::new(true)),
            Arc::new(RecordingReportHandler::new()),
            Credentials::new("user", "pass").unwrap(),
            GatewayClientConfig::new("CLIENT", "ACC"),
            EventPublisher::disabled(),
        )
    }

    #[tokio::test]
    async fn connect_starts_subscriber_and_logs_on() {
        let transport = Arc::new(MockGatewayTransport::new());
        transport.push_response(r#"{"status":0,"SessionId":"s1"}"#);
        let client = client(&transport);

        let info = client.connect().await.unwrap();
        assert!(info.authenticated);
        let snapshot = client.snapshot();
        assert!(snapshot.session.open);
        assert!(snapshot.session.connected);
        assert!(snapshot.subscriber_running);
        assert_eq!(transport.subscribers_started(), 1);

        client.shutdown().await;
    }

    #[tokio::test]
    async fn second_connect_is_refused() {
        let transport = Arc::new(MockGatewayTransport::new());
        transport.set_fallback_response(r#"{"status":0,"SessionId":"s1"}"#);
        let client = client(&transport);

        client.connect().await.unwrap();
        assert!(client.connect().await.is_err());
        client.shutdown().await;
    }

    #[tokio::test]
    async fn fatal_logon_closes_client() {
        let transport = Arc::new(MockGatewayTransport::new());
        transport.push_response(r#"{"status":1,"Text":"denied"}"#);
        let client = client(&transport);

        let err = client.connect().await.unwrap_err();
        assert!(err.is_fatal());
        tokio::time::timeout(Duration::from_secs(1), client.closed())
            .await
            .expect("client should close after fatal logon");
        assert!(client.snapshot().fatal_error.is_some());
        client.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let transport = Arc::new(MockGatewayTransport::new());
        transport.push_response(r#"{"status":0,"SessionId":"s1"}"#);
        let client = client(&transport);
        client.connect().await.unwrap();

        tokio::time::timeout(Duration::from_secs(1), client.shutdown())
            .await
            .expect("first shutdown completes");
        tokio::time::timeout(Duration::from_secs(1), client.shutdown())
            .await
            .expect("second shutdown completes");
        assert!(!client.snapshot().subscriber_running);
        assert!(matches!(client.connect().await, Err(BridgeError::ShutDown)));
    }
}
