//! Execution Reports
//!
//! The asynchronous order events published by the gateway, normalized into a
//! closed set of variants at parse time:
//!
//! | Wire condition                         | Variant          |
//! |----------------------------------------|------------------|
//! | `ExecType` is `FILL` or `PARTIAL_FILL` | `Fill`           |
//! | `CxlRejReason` present                 | `CancelReject`   |
//! | any other `ExecType`                   | `Acknowledgement`|
//! | neither field                          | not a report     |

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Gateway sequence number (`MsgSeqNum`).
pub type SeqNum = u64;

/// `ExecType` value for a complete fill.
pub const EXEC_TYPE_FILL: &str = "FILL";

/// `ExecType` value for a partial fill.
pub const EXEC_TYPE_PARTIAL_FILL: &str = "PARTIAL_FILL";

/// FIX `UTCTimestamp` layout used by the gateway (`20210204-18:24:07.387`).
const FIX_TIMESTAMP_FORMAT: &str = "%Y%m%d-%H:%M:%S%.3f";

/// An execution report ready for the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// Client order id (`ClOrdID`).
    pub client_order_id: String,
    /// Prior client order id (`OrigClOrdID`), set on cancel/replace flows.
    pub orig_client_order_id: Option<String>,
    /// Order status code (`OrdStatus`).
    pub order_status: Option<String>,
    /// Execution type code (`ExecType`).
    pub exec_type: Option<String>,
    /// Free-text message (`Text`).
    pub text: Option<String>,
    /// Transaction time (`TransactTime`).
    pub transact_time: Option<DateTime<Utc>>,
    /// Variant-specific payload.
    pub kind: ReportKind,
}

impl ExecutionReport {
    /// Report with only the client order id and variant set.
    #[must_use]
    pub fn new(client_order_id: impl Into<String>, kind: ReportKind) -> Self {
        Self {
            client_order_id: client_order_id.into(),
            orig_client_order_id: None,
            order_status: None,
            exec_type: None,
            text: None,
            transact_time: None,
            kind,
        }
    }

    /// The id the broker tracks this order under.
    ///
    /// Replace and cancel flows report against the original client order id.
    #[must_use]
    pub fn broker_order_id(&self) -> &str {
        self.orig_client_order_id
            .as_deref()
            .unwrap_or(&self.client_order_id)
    }

    /// Short label for logging and metrics.
    #[must_use]
    pub const fn kind_label(&self) -> &'static str {
        self.kind.as_str()
    }
}

/// Report variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReportKind {
    /// Order accepted, replaced, cancelled, or otherwise changed state.
    Acknowledgement,
    /// Full or partial execution.
    Fill(FillDetails),
    /// Cancel or cancel/replace request rejected.
    CancelReject {
        /// `CxlRejReason` as sent by the gateway.
        reason: String,
    },
}

impl ReportKind {
    /// Decide the variant from the discriminating wire fields.
    ///
    /// Returns `None` when the message is not an execution report at all.
    #[must_use]
    pub fn classify(
        exec_type: Option<&str>,
        cxl_rej_reason: Option<&str>,
        last_px: Option<Decimal>,
        last_qty: Option<Decimal>,
    ) -> Option<Self> {
        match (exec_type, cxl_rej_reason) {
            (Some(exec @ (EXEC_TYPE_FILL | EXEC_TYPE_PARTIAL_FILL)), _) => {
                Some(Self::Fill(FillDetails {
                    last_px: last_px.unwrap_or_default(),
                    last_qty: last_qty.unwrap_or_default(),
                    partial: exec == EXEC_TYPE_PARTIAL_FILL,
                }))
            }
            (_, Some(reason)) => Some(Self::CancelReject {
                reason: reason.to_string(),
            }),
            (Some(_), None) => Some(Self::Acknowledgement),
            (None, None) => None,
        }
    }

    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Acknowledgement => "acknowledgement",
            Self::Fill(_) => "fill",
            Self::CancelReject { .. } => "cancel_reject",
        }
    }
}

/// Fill payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillDetails {
    /// Execution price (`LastPx`).
    pub last_px: Decimal,
    /// Executed quantity (`LastShares`).
    pub last_qty: Decimal,
    /// Whether the order still has open quantity.
    pub partial: bool,
}

/// A decoded subscribe-channel frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencedMessage {
    /// `MsgSeqNum`; heartbeats may omit it.
    pub seq: Option<SeqNum>,
    /// Raw `MsgType`.
    pub msg_type: String,
    /// Decoded body.
    pub body: InboundMessage,
}

/// Body categories carried on the subscribe channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    /// Liveness signal.
    Heartbeat,
    /// An execution report for the host.
    Report(Box<ExecutionReport>),
    /// Anything else (position reports, news). Consumes a sequence number only.
    Other,
    /// Sequenced frame whose body could not be decoded. Consumes its number,
    /// then is dropped.
    Undecodable {
        /// Decode failure.
        reason: String,
    },
}

impl InboundMessage {
    /// Whether this is a heartbeat.
    #[must_use]
    pub const fn is_heartbeat(&self) -> bool {
        matches!(self, Self::Heartbeat)
    }
}

/// Parse a FIX `UTCTimestamp` (`YYYYMMDD-HH:MM:SS[.sss]`).
///
/// # Errors
///
/// Returns the underlying chrono parse error when neither layout matches.
pub fn parse_fix_timestamp(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(value, "%Y%m%d-%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y%m%d-%H:%M:%S"))
        .map(|naive| naive.and_utc())
}

/// Format a timestamp as a FIX `UTCTimestamp` with millisecond precision.
#[must_use]
pub fn format_fix_timestamp(at: DateTime<Utc>) -> String {
    at.format(FIX_TIMESTAMP_FORMAT).to_string()
}
