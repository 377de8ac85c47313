//! Bridge error taxonomy.
//!
//! Every failure the reconciliation core can produce, classified as fatal
//! (escalated, the bridge stops) or transient (logged or returned to the
//! caller, the bridge keeps running).
//!
//! | Variant          | Fatal | Handling                                   |
//! |------------------|-------|--------------------------------------------|
//! | `Transport`      | no    | returned to the synchronous caller         |
//! | `Auth`           | yes   | logon rejected while the venue is open     |
//! | `ResyncFailed`   | yes   | gap relogon failed, order flow unreliable  |
//! | `SequenceGap`    | no    | internal, triggers resync                  |
//! | `Malformed`      | no    | frame dropped and logged                   |
//! | `HeartbeatStale` | no    | internal, triggers reconnect and relogon   |
//! | `NoSession`      | no    | signed request attempted without a session |
//! | `Rejected`       | no    | gateway refused an order request           |

use thiserror::Error;

use crate::application::ports::TransportError;
use crate::domain::report::SeqNum;
use crate::infrastructure::gateway::{AuthError, CodecError};

/// Errors surfaced by the bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A request/reply leg failed or timed out.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Logon rejected while the venue was open.
    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Replay relogon after a gap failed.
    #[error("resync from {last_contiguous} failed after observing {observed}: {reason}")]
    ResyncFailed {
        /// Replay start that was requested.
        last_contiguous: SeqNum,
        /// Sequence number that revealed the gap.
        observed: SeqNum,
        /// Why the relogon failed.
        reason: String,
    },

    /// A hole in the subscribe sequence.
    #[error("sequence gap: expected {expected}, observed {observed}")]
    SequenceGap {
        /// Next number that was expected.
        expected: SeqNum,
        /// Number that arrived.
        observed: SeqNum,
    },

    /// Frame or reply could not be decoded.
    #[error("malformed message: {0}")]
    Malformed(#[from] CodecError),

    /// No heartbeat within the silence threshold.
    #[error("no gateway traffic for {silent_ticks} heartbeat intervals")]
    HeartbeatStale {
        /// Consecutive silent intervals.
        silent_ticks: u32,
    },

    /// Signed request attempted without a session.
    #[error("no open gateway session")]
    NoSession,

    /// Gateway answered a request with a non-zero status.
    #[error("request rejected ({status}): {text}")]
    Rejected {
        /// Gateway status code.
        status: i64,
        /// Gateway text.
        text: String,
    },

    /// Bridge is shutting down.
    #[error("bridge is shut down")]
    ShutDown,
}

impl BridgeError {
    /// Whether the bridge must stop.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth(_) | Self::ResyncFailed { .. })
    }

    /// Short label for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Auth(_) => "auth",
            Self::ResyncFailed { .. } => "resync_failed",
            Self::SequenceGap { .. } => "sequence_gap",
            Self::Malformed(_) => "malformed",
            Self::HeartbeatStale { .. } => "heartbeat_stale",
            Self::NoSession => "no_session",
            Self::Rejected { .. } => "rejected",
            Self::ShutDown => "shut_down",
        }
    }
}
