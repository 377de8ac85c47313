//! Prometheus Metrics Module
//!
//! Exposes bridge metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Frames**: Subscribe frames received and dropped, by reason
//! - **Sequencing**: Gaps detected and resync outcomes
//! - **Dispatch**: Reports delivered live or from the replay buffer
//! - **Session**: Session state, logons, subscriber restarts
//! - **Latency**: Request/reply round trips
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Idempotent. If another global recorder is already installed, the handle
/// still renders but only metrics recorded through it appear.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let recorder = PrometheusBuilder::new().build_recorder();
            let handle = recorder.handle();
            if let Err(e) = metrics::set_global_recorder(recorder) {
                tracing::warn!(error = %e, "Metrics recorder already installed");
            }
            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "gateway_bridge_frames_received_total",
        "Subscribe frames received from the gateway"
    );
    describe_counter!(
        "gateway_bridge_frames_dropped_total",
        "Subscribe frames dropped, by reason"
    );
    describe_counter!(
        "gateway_bridge_sequence_gaps_total",
        "Sequence gaps detected on the subscribe channel"
    );
    describe_counter!(
        "gateway_bridge_resyncs_total",
        "Replay relogons after a gap, by outcome"
    );
    describe_counter!(
        "gateway_bridge_reports_dispatched_total",
        "Execution reports delivered to the host, by kind and path"
    );
    describe_gauge!(
        "gateway_bridge_replay_buffer_depth",
        "Reports held while a synchronous call is in flight"
    );
    describe_gauge!(
        "gateway_bridge_session_open",
        "1 while a gateway session token is held"
    );
    describe_counter!(
        "gateway_bridge_logons_total",
        "Logon attempts, by outcome"
    );
    describe_counter!(
        "gateway_bridge_subscriber_restarts_total",
        "Subscriber teardown and relogon cycles"
    );
    describe_counter!(
        "gateway_bridge_errors_total",
        "Bridge errors, by kind"
    );
    describe_histogram!(
        "gateway_bridge_request_seconds",
        "Request/reply round-trip time"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Why a subscribe frame was dropped.
#[derive(Debug, Clone, Copy)]
pub enum DropReason {
    /// Could not be decoded.
    Malformed,
    /// Duplicate or stale replay.
    Stale,
    /// Revealed a gap.
    Gap,
    /// Queued behind a gap and discarded for the gateway's replay.
    Discarded,
}

impl DropReason {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::Stale => "stale",
            Self::Gap => "gap",
            Self::Discarded => "discarded",
        }
    }
}

/// How a report reached the host.
#[derive(Debug, Clone, Copy)]
pub enum DispatchPath {
    /// Delivered immediately.
    Live,
    /// Delivered from the replay buffer after a call completed.
    Replayed,
}

impl DispatchPath {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Replayed => "replayed",
        }
    }
}

/// Outcome label for logons and resyncs.
#[derive(Debug, Clone, Copy)]
pub enum Outcome {
    /// Succeeded.
    Success,
    /// Refused or failed.
    Failure,
    /// Refused while the venue was closed; tolerated.
    Closed,
}

impl Outcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Closed => "closed",
        }
    }
}

/// Record a subscribe frame received.
pub fn record_frame_received() {
    counter!("gateway_bridge_frames_received_total").increment(1);
}

/// Record a dropped subscribe frame.
pub fn record_frame_dropped(reason: DropReason) {
    counter!(
        "gateway_bridge_frames_dropped_total",
        "reason" => reason.as_str()
    )
    .increment(1);
}

/// Record a detected gap.
pub fn record_sequence_gap() {
    counter!("gateway_bridge_sequence_gaps_total").increment(1);
}

/// Record a resync relogon.
pub fn record_resync(outcome: Outcome) {
    counter!(
        "gateway_bridge_resyncs_total",
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Record a report delivered to the host.
pub fn record_report_dispatched(kind: &'static str, path: DispatchPath) {
    counter!(
        "gateway_bridge_reports_dispatched_total",
        "kind" => kind,
        "path" => path.as_str()
    )
    .increment(1);
}

/// Update the replay buffer depth.
#[allow(clippy::cast_precision_loss)]
pub fn set_replay_buffer_depth(depth: usize) {
    gauge!("gateway_bridge_replay_buffer_depth").set(depth as f64);
}

/// Update whether a session is open.
pub fn set_session_open(open: bool) {
    gauge!("gateway_bridge_session_open").set(if open { 1.0 } else { 0.0 });
}

/// Record a logon attempt.
pub fn record_logon(outcome: Outcome) {
    counter!(
        "gateway_bridge_logons_total",
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Record a subscriber restart.
pub fn record_subscriber_restart() {
    counter!("gateway_bridge_subscriber_restarts_total").increment(1);
}

/// Record a bridge error.
pub fn record_error(kind: &'static str) {
    counter!(
        "gateway_bridge_errors_total",
        "kind" => kind
    )
    .increment(1);
}

/// Record a request/reply round trip.
pub fn record_request_duration(duration: Duration) {
    histogram!("gateway_bridge_request_seconds").record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================
