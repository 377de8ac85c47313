//! Application Services
//!
//! The reconciliation core and the services built on it:
//!
//! - `SessionController`: logon, session token, signed requests
//! - `HeartbeatMonitor`: silence detection and daily session expiry
//! - `SequenceReconciler`: gap detection, replay, duplicate suppression
//! - `DispatchGate`: holds reports back while an order call is in flight
//! - `OrderRouter`: new/cancel/replace requests through the gate

pub mod dispatch;
pub mod heartbeat;
pub mod orders;
pub mod reconciler;
pub mod session;

pub use dispatch::{DispatchGate, GateSnapshot, Submission};
pub use heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatMonitor, HeartbeatState};
pub use orders::{OrderRouter, SubmitAck};
pub use reconciler::{FrameOutcome, SequenceReconciler};
pub use session::{SessionController, SessionInfo, SessionStatus};
