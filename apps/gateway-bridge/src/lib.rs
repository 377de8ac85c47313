#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Gateway Bridge - Execution Report Reconciliation
//!
//! Connects a trading host to a remote order-execution gateway and delivers
//! the gateway's execution reports to the host in order, gap-free and
//! exactly once, while the host's own order calls run synchronously.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Pure reconciliation types
//!   - `report`: Execution report variants and frame bodies
//!   - `sequence`: Sequence continuity state machine
//!   - `calendar`: Venue trading hours
//!   - `order`: Order tickets and FIX codes
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Gateway transport, trading calendar, report handler
//!   - `services`: Session controller, sequence reconciler, dispatch gate,
//!     heartbeat monitor, order router
//!   - `events`: Lifecycle notifications for the host
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `gateway`: ZeroMQ transport, JSON codec, assembled client
//!   - `config`: Environment configuration
//!   - `health`: Health check HTTP endpoint
//!   - `metrics`, `telemetry`: Prometheus and OpenTelemetry
//!
//! # Data Flow
//!
//! ```text
//!                 REQ/REP (logon, orders)
//! Host ──calls──► DispatchGate ──► SessionController ──► Gateway
//!   ▲                 ▲
//!   │ reports         │ submit
//!   │                 │
//!   └──────── SequenceReconciler ◄── frames ◄── SUB worker ◄── Gateway
//!                     │
//!                     └─ gap ──► relogon with replay start
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Reconciliation types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

/// Bridge error taxonomy.
pub mod error;

// =============================================================================
// Re-exports
// =============================================================================

// Errors
pub use error::BridgeError;

// Domain types
pub use domain::calendar::VenueHours;
pub use domain::order::{CancelTicket, OrderSide, OrderTicket, ReplaceTicket};
pub use domain::report::{ExecutionReport, FillDetails, ReportKind, SeqNum};
pub use domain::sequence::{SequenceSnapshot, SyncState};

// Ports and services
pub use application::events::{BridgeEvent, EventPublisher};
pub use application::ports::{
    ExecutionReportHandler, GatewayTransport, RecordingReportHandler, TradingCalendar,
};
pub use application::services::{
    DispatchGate, FrameOutcome, GateSnapshot, HeartbeatConfig, OrderRouter, SequenceReconciler,
    SessionController, SessionInfo, SessionStatus, SubmitAck, Submission,
};

// Gateway client
pub use infrastructure::gateway::{
    BridgeSnapshot, Credentials, GatewayClient, GatewayClientConfig, ZmqTransport,
    ZmqTransportConfig,
};

// Configuration
pub use infrastructure::config::{BridgeConfig, ConfigError};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
