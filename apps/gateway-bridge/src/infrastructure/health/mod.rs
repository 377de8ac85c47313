//! Bridge Status Endpoint
//!
//! Serves the bridge snapshot over HTTP alongside the Prometheus scrape.
//!
//! | Route      | Body                         | 503 when                       |
//! |------------|------------------------------|--------------------------------|
//! | `/health`  | [`HealthResponse`] JSON      | unhealthy                      |
//! | `/healthz` | `OK`                         | never                          |
//! | `/readyz`  | [`Readiness`] JSON           | any readiness blocker present  |
//! | `/metrics` | Prometheus text format       | recorder not installed         |

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::domain::sequence::SyncState;
use crate::infrastructure::gateway::{BridgeSnapshot, GatewayClient};
use crate::infrastructure::metrics::get_metrics_handle;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Overall bridge condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Session open, subscriber running, sequence in order.
    Healthy,
    /// Serving, but resyncing or quiet.
    Degraded,
    /// Not ready.
    Unhealthy,
}

impl HealthStatus {
    /// Classify a bridge snapshot.
    #[must_use]
    pub fn from_snapshot(bridge: &BridgeSnapshot) -> Self {
        if !Readiness::from_snapshot(bridge).ready {
            Self::Unhealthy
        } else if bridge.sequence.state == SyncState::AwaitingResync || bridge.silent_ticks > 0 {
            Self::Degraded
        } else {
            Self::Healthy
        }
    }

    const fn http_status(self) -> StatusCode {
        match self {
            Self::Healthy | Self::Degraded => StatusCode::OK,
            Self::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Body of `/readyz`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Readiness {
    /// True when nothing blocks report delivery.
    pub ready: bool,
    /// What is currently blocking delivery.
    pub blockers: Vec<&'static str>,
}

impl Readiness {
    /// Collect readiness blockers from a snapshot.
    #[must_use]
    pub fn from_snapshot(bridge: &BridgeSnapshot) -> Self {
        let blockers: Vec<&'static str> = [
            (bridge.fatal_error.is_some(), "fatal_error"),
            (!bridge.session.open, "session_closed"),
            (!bridge.subscriber_running, "subscriber_stopped"),
        ]
        .into_iter()
        .filter_map(|(blocked, name)| blocked.then_some(name))
        .collect();

        Self {
            ready: blockers.is_empty(),
            blockers,
        }
    }
}

/// Body of `/health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall condition.
    pub status: HealthStatus,
    /// Bridge version.
    pub version: String,
    /// Seconds since the status server started.
    pub uptime_secs: u64,
    /// Time the response was built.
    pub current_time: DateTime<Utc>,
    /// Full bridge snapshot.
    pub bridge: BridgeSnapshot,
}

/// Shared state behind the status routes.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    client: Arc<GatewayClient>,
}

impl HealthServerState {
    /// Wrap the client whose snapshot is served.
    #[must_use]
    pub fn new(version: String, client: Arc<GatewayClient>) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            client,
        }
    }

    fn response(&self) -> HealthResponse {
        let bridge = self.client.snapshot();
        HealthResponse {
            status: HealthStatus::from_snapshot(&bridge),
            version: self.version.clone(),
            uptime_secs: self.started_at.elapsed().as_secs(),
            current_time: Utc::now(),
            bridge,
        }
    }
}

/// HTTP status server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Bind to `port` on all interfaces when run.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Serve until the token is cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if the port cannot be bound or the server
    /// stops with an I/O error.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;
        tracing::info!(port = self.port, "Status server listening");

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Status server stopped");
        Ok(())
    }
}

fn router(state: Arc<HealthServerState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/healthz", get(|| async { "OK" }))
        .route("/readyz", get(readiness))
        .route("/metrics", get(metrics))
        .with_state(state)
}

async fn health(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = state.response();
    (response.status.http_status(), Json(response))
}

async fn readiness(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let readiness = Readiness::from_snapshot(&state.client.snapshot());
    let code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(readiness))
}

async fn metrics() -> impl IntoResponse {
    match get_metrics_handle() {
        Some(handle) => (
            StatusCode::OK,
            [("content-type", PROMETHEUS_CONTENT_TYPE)],
            handle.render(),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [("content-type", "text/plain")],
            "metrics recorder not installed".to_string(),
        ),
    }
}

/// Status server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Port could not be bound.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server stopped with an error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::{GateSnapshot, SessionStatus};
    use crate::domain::sequence::SequenceSnapshot;

    fn open_bridge() -> BridgeSnapshot {
        BridgeSnapshot {
            session: SessionStatus {
                open: true,
                connected: true,
                venue_open: true,
                logons: 1,
                last_logon_at: Some(Utc::now()),
            },
            sequence: SequenceSnapshot::default(),
            gate: GateSnapshot {
                locked: false,
                buffered: 0,
                dispatched_live: 0,
                dispatched_replayed: 0,
                release_pending: false,
            },
            subscriber_running: true,
            silent_ticks: 0,
            fatal_error: None,
        }
    }

    #[test]
    fn open_session_in_order_is_healthy() {
        let bridge = open_bridge();
        assert_eq!(
            Readiness::from_snapshot(&bridge),
            Readiness {
                ready: true,
                blockers: vec![]
            }
        );
        assert_eq!(HealthStatus::from_snapshot(&bridge), HealthStatus::Healthy);
    }

    #[test]
    fn resync_or_silence_is_degraded() {
        let mut bridge = open_bridge();
        bridge.sequence.state = SyncState::AwaitingResync;
        assert_eq!(HealthStatus::from_snapshot(&bridge), HealthStatus::Degraded);

        let mut bridge = open_bridge();
        bridge.silent_ticks = 2;
        assert_eq!(HealthStatus::from_snapshot(&bridge), HealthStatus::Degraded);
        assert_eq!(HealthStatus::Degraded.http_status(), StatusCode::OK);
    }

    #[test]
    fn blockers_are_all_reported() {
        let mut bridge = open_bridge();
        bridge.session.open = false;
        bridge.subscriber_running = false;
        bridge.fatal_error = Some("logon rejected".to_string());

        let readiness = Readiness::from_snapshot(&bridge);
        assert!(!readiness.ready);
        assert_eq!(
            readiness.blockers,
            vec!["fatal_error", "session_closed", "subscriber_stopped"]
        );
        assert_eq!(HealthStatus::from_snapshot(&bridge), HealthStatus::Unhealthy);
        assert_eq!(
            HealthStatus::Unhealthy.http_status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_value(Readiness::from_snapshot(&open_bridge())).unwrap();
        assert_eq!(json["ready"], true);
        assert_eq!(
            serde_json::to_string(&HealthStatus::Degraded).unwrap(),
            "\"degraded\""
        );
    }
}
