//! Gateway Bridge Binary
//!
//! Connects to the order gateway, reconciles the execution report stream
//! and logs every report it delivers.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin gateway-bridge
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `GATEWAY_HOST`: Gateway host (`tcp://` optional)
//! - `GATEWAY_REQ_PORT`: Request/reply port
//! - `GATEWAY_SUB_PORT`: Publish/subscribe port
//! - `GATEWAY_USERNAME`, `GATEWAY_PASSWORD`: Logon credentials
//! - `GATEWAY_CLIENT_ID`: Gateway client id
//!
//! ## Optional
//! - `GATEWAY_ACCOUNT`: Trading account (default: DEFAULT)
//! - `GATEWAY_HEARTBEAT_INTERVAL_SECS`, `GATEWAY_HEARTBEAT_MAX_MISSED`
//! - `GATEWAY_UNLOCK_GRACE_MS`: Dispatch gate grace period (default: 0)
//! - `GATEWAY_VENUE_TIMEZONE`, `GATEWAY_SESSION_OPEN`, `GATEWAY_SESSION_CLOSE`
//! - `BRIDGE_HEALTH_PORT`: Health check HTTP port (default: 8083)
//! - `OTEL_ENABLED`, `OTEL_EXPORTER_OTLP_ENDPOINT`, `OTEL_SERVICE_NAME`
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use gateway_bridge::application::events::{BridgeEvent, EventPublisher};
use gateway_bridge::application::ports::ExecutionReportHandler;
use gateway_bridge::domain::report::{ExecutionReport, ReportKind};
use gateway_bridge::infrastructure::gateway::{GatewayClient, ZmqTransport};
use gateway_bridge::infrastructure::health::{HealthServer, HealthServerState};
use gateway_bridge::infrastructure::telemetry;
use gateway_bridge::{BridgeConfig, init_metrics};
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Host event channel capacity.
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Gateway Bridge");

    // Initialize Prometheus metrics
    let _metrics_handle = init_metrics();

    let config = BridgeConfig::from_env().context("loading bridge configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    tokio::spawn(handle_bridge_events(event_rx));

    let client = GatewayClient::new(
        Arc::new(ZmqTransport::new(config.transport_config())),
        Arc::new(config.venue),
        Arc::new(LoggingReportHandler),
        config.credentials.clone(),
        config.client_config(),
        EventPublisher::new(event_tx),
    );

    // Spawn health server
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&client),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );
    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    let session = client.connect().await.context("connecting to gateway")?;
    tracing::info!(
        authenticated = session.authenticated,
        text = session.text.as_deref().unwrap_or_default(),
        "Gateway bridge ready"
    );

    tokio::select! {
        () = await_shutdown() => {}
        () = client.closed() => {
            tracing::error!(
                error = client.snapshot().fatal_error.as_deref().unwrap_or("unknown"),
                "Bridge stopped on fatal error"
            );
        }
    }

    shutdown_token.cancel();
    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, client.shutdown())
        .await
        .is_err()
    {
        tracing::warn!("Bridge shutdown timed out");
    }

    let fatal = client.snapshot().fatal_error;
    tracing::info!("Gateway bridge stopped");
    match fatal {
        Some(error) => Err(anyhow::anyhow!(error)),
        None => Ok(()),
    }
}

/// Host stand-in: logs each reconciled report.
struct LoggingReportHandler;

impl ExecutionReportHandler for LoggingReportHandler {
    fn on_report(&self, report: ExecutionReport) {
        match &report.kind {
            ReportKind::Fill(fill) => tracing::info!(
                cl_ord_id = %report.client_order_id,
                last_px = %fill.last_px,
                last_qty = %fill.last_qty,
                partial = fill.partial,
                "Fill"
            ),
            ReportKind::CancelReject { reason } => tracing::warn!(
                cl_ord_id = %report.client_order_id,
                orig_cl_ord_id = report.orig_client_order_id.as_deref().unwrap_or_default(),
                reason = %reason,
                "Cancel rejected"
            ),
            ReportKind::Acknowledgement => tracing::info!(
                cl_ord_id = %report.client_order_id,
                ord_status = report.order_status.as_deref().unwrap_or_default(),
                exec_type = report.exec_type.as_deref().unwrap_or_default(),
                "Order acknowledged"
            ),
        }
    }
}

/// Log bridge lifecycle events.
async fn handle_bridge_events(mut rx: mpsc::Receiver<BridgeEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            BridgeEvent::SessionOpened { replay_from } => {
                tracing::info!(replay_from, "Gateway session opened");
            }
            BridgeEvent::SessionExpired => tracing::info!("Gateway session expired"),
            BridgeEvent::ResyncStarted { from, observed } => {
                tracing::warn!(from, observed, "Replaying execution reports");
            }
            BridgeEvent::ResyncCompleted { seq } => {
                tracing::info!(seq, "Execution report stream back in order");
            }
            BridgeEvent::SubscriberRestarted { silent_ticks } => {
                tracing::warn!(silent_ticks, "Gateway subscriber restarted");
            }
            BridgeEvent::Fatal(error) => tracing::error!(error = %error, "Bridge failed"),
        }
    }
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &BridgeConfig) {
    let transport = config.transport_config();
    tracing::info!(
        client_id = %config.client_id,
        account = %config.account,
        username = config.credentials.username(),
        health_port = config.server.health_port,
        "Configuration loaded"
    );
    tracing::debug!(
        request_endpoint = %transport.request_endpoint,
        subscribe_endpoint = %transport.subscribe_endpoint,
        heartbeat_secs = config.session.heartbeat_interval.as_secs(),
        unlock_grace_ms = config.session.unlock_grace.as_millis(),
        venue_timezone = config.venue.timezone().name(),
        "Gateway endpoints"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn await_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
