//! Gateway Wire Messages
//!
//! JSON shapes exchanged with the order gateway. Keys are FIX tag numbers
//! or FIX field names, exactly as the gateway expects them.
//!
//! # Request/Reply
//!
//! ```json
//! {"MsgType":"A","553":"user","554":"pass","MsgSeqNum":2147483647}
//! {"status":0,"Text":"Logon successful","SessionId":"9f1c...","SendingTime":"20240315-13:30:00.000"}
//! ```
//!
//! # Publish/Subscribe
//!
//! ```json
//! {"MsgType":"Heartbeat","status":0,"Text":"Heartbeat","SendingTime":"20240315-13:30:00.000"}
//! {"MsgType":"8","MsgSeqNum":17,"ClOrdID":"a1b2","ExecType":"FILL","OrdStatus":"FILLED","LastPx":101.5,"LastShares":100}
//! ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::order::{CancelTicket, OrderTicket, ReplaceTicket};
use crate::domain::report::{SeqNum, format_fix_timestamp};

/// `MsgType` values.
pub mod msg_type {
    /// Logon.
    pub const LOGON: &str = "A";
    /// New single order.
    pub const NEW_ORDER: &str = "D";
    /// Order cancel request.
    pub const CANCEL: &str = "F";
    /// Order cancel/replace request.
    pub const CANCEL_REPLACE: &str = "G";
    /// Subscribe-channel heartbeat.
    pub const HEARTBEAT: &str = "Heartbeat";
}

/// `MsgSeqNum` a fresh logon sends to ask for no replay.
pub const NO_REPLAY_SEQ: SeqNum = 2_147_483_647;

/// Key the signed session token travels under.
pub const SESSION_ID_KEY: &str = "SessionId";

// =============================================================================
// Requests
// =============================================================================

/// Logon request.
#[derive(Clone, Serialize)]
pub struct LogonRequest {
    #[serde(rename = "MsgType")]
    msg_type: &'static str,
    #[serde(rename = "553")]
    username: String,
    #[serde(rename = "554")]
    password: String,
    /// Sequence number to replay from, or [`NO_REPLAY_SEQ`].
    #[serde(rename = "MsgSeqNum")]
    pub msg_seq_num: SeqNum,
}

impl LogonRequest {
    /// Build a logon. `replay_from = None` starts a brand-new session.
    #[must_use]
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        replay_from: Option<SeqNum>,
    ) -> Self {
        Self {
            msg_type: msg_type::LOGON,
            username: username.into(),
            password: password.into(),
            msg_seq_num: replay_from.unwrap_or(NO_REPLAY_SEQ),
        }
    }
}

impl std::fmt::Debug for LogonRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogonRequest")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("msg_seq_num", &self.msg_seq_num)
            .finish()
    }
}

/// New order single.
#[derive(Debug, Clone, Serialize)]
pub struct NewOrderRequest {
    #[serde(rename = "MsgType")]
    msg_type: &'static str,
    #[serde(rename = "109")]
    client_id: String,
    /// Client order id (tag 11).
    #[serde(rename = "11")]
    pub cl_ord_id: String,
    #[serde(rename = "54")]
    side: &'static str,
    #[serde(rename = "55")]
    symbol: String,
    #[serde(rename = "38", with = "rust_decimal::serde::float")]
    order_qty: Decimal,
    #[serde(
        rename = "44",
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    price: Option<Decimal>,
    #[serde(
        rename = "99",
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    stop_px: Option<Decimal>,
    #[serde(rename = "59")]
    time_in_force: &'static str,
    #[serde(rename = "40")]
    ord_type: &'static str,
    #[serde(rename = "60")]
    transact_time: String,
    #[serde(rename = "1")]
    account: String,
    #[serde(rename = "100", skip_serializing_if = "Option::is_none")]
    ex_destination: Option<String>,
    #[serde(rename = "18", skip_serializing_if = "Option::is_none")]
    exec_inst: Option<String>,
    #[serde(rename = "21", skip_serializing_if = "Option::is_none")]
    handl_inst: Option<String>,
    #[serde(rename = "7552", skip_serializing_if = "Option::is_none")]
    routing_policy: Option<String>,
    #[serde(rename = "5700", skip_serializing_if = "Option::is_none")]
    locate_broker_id: Option<String>,
    #[serde(rename = "114", skip_serializing_if = "Option::is_none")]
    locate_required: Option<&'static str>,
}

impl NewOrderRequest {
    /// Build from a ticket.
    #[must_use]
    pub fn from_ticket(
        ticket: &OrderTicket,
        client_id: &str,
        account: &str,
        cl_ord_id: String,
        transact_time: DateTime<Utc>,
    ) -> Self {
        Self {
            msg_type: msg_type::NEW_ORDER,
            client_id: client_id.to_string(),
            cl_ord_id,
            side: ticket.side.fix_code(),
            symbol: ticket.symbol.clone(),
            order_qty: ticket.quantity,
            price: ticket.limit_price,
            stop_px: ticket.stop_price,
            time_in_force: ticket.time_in_force.fix_code(),
            ord_type: ticket.kind.fix_code(),
            transact_time: format_fix_timestamp(transact_time),
            account: account.to_string(),
            ex_destination: ticket.ex_destination.clone(),
            exec_inst: ticket.exec_inst.clone(),
            handl_inst: ticket.handl_inst.clone(),
            routing_policy: ticket.routing_policy.clone(),
            locate_broker_id: ticket.locate.as_ref().map(|l| l.broker_id.clone()),
            locate_required: ticket
                .locate
                .as_ref()
                .map(|l| if l.required { "Y" } else { "N" }),
        }
    }
}

/// Order cancel request.
#[derive(Debug, Clone, Serialize)]
pub struct CancelOrderRequest {
    #[serde(rename = "MsgType")]
    msg_type: &'static str,
    #[serde(rename = "109")]
    client_id: String,
    /// Client order id for the cancel itself (tag 11).
    #[serde(rename = "11")]
    pub cl_ord_id: String,
    #[serde(rename = "41")]
    orig_cl_ord_id: String,
    #[serde(rename = "60")]
    transact_time: String,
}

impl CancelOrderRequest {
    /// Build from a ticket.
    #[must_use]
    pub fn from_ticket(
        ticket: &CancelTicket,
        client_id: &str,
        cl_ord_id: String,
        transact_time: DateTime<Utc>,
    ) -> Self {
        Self {
            msg_type: msg_type::CANCEL,
            client_id: client_id.to_string(),
            cl_ord_id,
            orig_cl_ord_id: ticket.orig_client_order_id.clone(),
            transact_time: format_fix_timestamp(transact_time),
        }
    }
}

/// Order cancel/replace request.
#[derive(Debug, Clone, Serialize)]
pub struct CancelReplaceRequest {
    #[serde(rename = "MsgType")]
    msg_type: &'static str,
    #[serde(rename = "109")]
    client_id: String,
    /// Client order id for the replacement (tag 11).
    #[serde(rename = "11")]
    pub cl_ord_id: String,
    #[serde(rename = "41")]
    orig_cl_ord_id: String,
    #[serde(rename = "60")]
    transact_time: String,
    #[serde(rename = "38", with = "rust_decimal::serde::float")]
    order_qty: Decimal,
    #[serde(
        rename = "44",
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    price: Option<Decimal>,
    #[serde(
        rename = "99",
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    stop_px: Option<Decimal>,
    #[serde(
        rename = "211",
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    peg_difference: Option<Decimal>,
}

impl CancelReplaceRequest {
    /// Build from a ticket.
    #[must_use]
    pub fn from_ticket(
        ticket: &ReplaceTicket,
        client_id: &str,
        cl_ord_id: String,
        transact_time: DateTime<Utc>,
    ) -> Self {
        Self {
            msg_type: msg_type::CANCEL_REPLACE,
            client_id: client_id.to_string(),
            cl_ord_id,
            orig_cl_ord_id: ticket.orig_client_order_id.clone(),
            transact_time: format_fix_timestamp(transact_time),
            order_qty: ticket.quantity,
            price: ticket.limit_price,
            stop_px: ticket.stop_price,
            peg_difference: ticket.peg_difference,
        }
    }
}

// =============================================================================
// Replies
// =============================================================================

/// Reply to any request/reply message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GatewayResponse {
    /// Zero on success.
    pub status: i64,
    #[serde(rename = "Text", default)]
    text: Option<String>,
    #[serde(rename = "58", default)]
    text_tag: Option<String>,
    /// Session token (logon replies).
    #[serde(rename = "SessionId", default)]
    pub session_id: Option<String>,
    /// Gateway send time.
    #[serde(rename = "SendingTime", default)]
    pub sending_time: Option<String>,
    /// Accepted client order id (order replies).
    #[serde(rename = "ClOrdID", default)]
    pub cl_ord_id: Option<String>,
}

impl GatewayResponse {
    /// Whether the gateway accepted the request.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status == 0
    }

    /// Human-readable message, from `Text` or tag 58.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref().or(self.text_tag.as_deref())
    }
}

// =============================================================================
// Subscribe Frames
// =============================================================================

/// Report fields of a subscribe frame. Envelope fields (`MsgType`,
/// `MsgSeqNum`) are read by the codec separately.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportFields {
    /// `ClOrdID`.
    #[serde(rename = "ClOrdID", default)]
    pub cl_ord_id: Option<String>,
    /// `OrigClOrdID`.
    #[serde(rename = "OrigClOrdID", default)]
    pub orig_cl_ord_id: Option<String>,
    /// `OrdStatus`.
    #[serde(rename = "OrdStatus", default)]
    pub ord_status: Option<String>,
    /// `ExecType`.
    #[serde(rename = "ExecType", default)]
    pub exec_type: Option<String>,
    /// `CxlRejReason`.
    #[serde(rename = "CxlRejReason", default)]
    pub cxl_rej_reason: Option<String>,
    /// `Text`.
    #[serde(rename = "Text", default)]
    pub text: Option<String>,
    /// `TransactTime`.
    #[serde(rename = "TransactTime", default)]
    pub transact_time: Option<String>,
    /// `LastPx`.
    #[serde(rename = "LastPx", default)]
    pub last_px: Option<Decimal>,
    /// `LastShares`.
    #[serde(rename = "LastShares", default)]
    pub last_shares: Option<Decimal>,
}
