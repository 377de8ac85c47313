//! Gateway JSON Codec
//!
//! Decodes subscribe frames into [`SequencedMessage`]s and request replies
//! into [`GatewayResponse`]s, and encodes outbound requests (optionally
//! signed with the session token).

use serde::Serialize;
use serde_json::Value;

use super::messages::{GatewayResponse, ReportFields, SESSION_ID_KEY, msg_type};
use crate::domain::report::{
    ExecutionReport, InboundMessage, ReportKind, SeqNum, SequencedMessage, parse_fix_timestamp,
};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// `MsgType` missing or empty.
    #[error("message type is not specified")]
    MissingMsgType,

    /// Non-heartbeat frame without `MsgSeqNum`.
    #[error("message {0} has no sequence number")]
    MissingSeqNum(String),

    /// Invalid message format.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),
}

/// JSON codec for both gateway channels.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new JSON codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode one subscribe frame.
    ///
    /// `MsgType` is matched case-insensitively on both key and value.
    /// Heartbeats may omit `MsgSeqNum`; every other frame must carry it.
    /// Once the header is readable, a bad body yields
    /// [`InboundMessage::Undecodable`] so the number is still tracked.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid JSON, a missing `MsgType`, or a missing or
    /// non-numeric `MsgSeqNum`.
    pub fn decode_frame(&self, text: &str) -> Result<SequencedMessage, CodecError> {
        let value: Value = serde_json::from_str(text.trim())?;
        let Value::Object(ref fields) = value else {
            return Err(CodecError::InvalidFormat(format!(
                "expected JSON object, got: {}...",
                truncate(text, 50)
            )));
        };

        let msg_type = fields
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case("MsgType"))
            .and_then(|(_, v)| v.as_str())
            .filter(|s| !s.is_empty())
            .ok_or(CodecError::MissingMsgType)?
            .to_string();

        let seq = match fields.get("MsgSeqNum") {
            None | Some(Value::Null) => None,
            Some(raw) => Some(parse_seq(raw)?),
        };

        if msg_type.eq_ignore_ascii_case(msg_type::HEARTBEAT) {
            return Ok(SequencedMessage {
                seq,
                msg_type,
                body: InboundMessage::Heartbeat,
            });
        }

        if seq.is_none() {
            return Err(CodecError::MissingSeqNum(msg_type));
        }

        let body = match serde_json::from_value::<ReportFields>(value)
            .map_err(CodecError::from)
            .and_then(Self::to_report)
        {
            Ok(Some(report)) => InboundMessage::Report(Box::new(report)),
            Ok(None) => InboundMessage::Other,
            Err(e) => InboundMessage::Undecodable {
                reason: e.to_string(),
            },
        };

        Ok(SequencedMessage {
            seq,
            msg_type,
            body,
        })
    }

    /// Decode a request/reply response.
    ///
    /// # Errors
    ///
    /// Returns an error if the reply is not a JSON object with a numeric `status`.
    pub fn decode_response(&self, text: &str) -> Result<GatewayResponse, CodecError> {
        Ok(serde_json::from_str(text.trim())?)
    }

    /// Encode a value to a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<String, CodecError> {
        Ok(serde_json::to_string(value)?)
    }

    /// Encode a request with the session token attached as `SessionId`.
    ///
    /// # Errors
    ///
    /// Returns an error if the value does not serialize to a JSON object.
    pub fn encode_signed<T: Serialize>(
        &self,
        value: &T,
        session_id: &str,
    ) -> Result<String, CodecError> {
        let mut json = serde_json::to_value(value)?;
        let Some(fields) = json.as_object_mut() else {
            return Err(CodecError::InvalidFormat(
                "signed request must be a JSON object".to_string(),
            ));
        };
        fields.insert(
            SESSION_ID_KEY.to_string(),
            Value::String(session_id.to_string()),
        );
        Ok(serde_json::to_string(&json)?)
    }

    fn to_report(fields: ReportFields) -> Result<Option<ExecutionReport>, CodecError> {
        let Some(kind) = ReportKind::classify(
            fields.exec_type.as_deref(),
            fields.cxl_rej_reason.as_deref(),
            fields.last_px,
            fields.last_shares,
        ) else {
            return Ok(None);
        };

        let transact_time = fields
            .transact_time
            .as_deref()
            .map(|raw| {
                parse_fix_timestamp(raw)
                    .map_err(|e| CodecError::InvalidFormat(format!("TransactTime {raw}: {e}")))
            })
            .transpose()?;

        Ok(Some(ExecutionReport {
            client_order_id: fields.cl_ord_id.unwrap_or_default(),
            orig_client_order_id: fields.orig_cl_ord_id.filter(|s| !s.is_empty()),
            order_status: fields.ord_status,
            exec_type: fields.exec_type,
            text: fields.text,
            transact_time,
            kind,
        }))
    }
}

fn parse_seq(raw: &Value) -> Result<SeqNum, CodecError> {
    match raw {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .ok_or_else(|| CodecError::InvalidFormat(format!("MsgSeqNum is not a sequence number: {raw}")))
}

fn truncate(text: &str, max: usize) -> &str {
    text.char_indices()
        .nth(max)
        .map_or(text, |(idx, _)| &text[..idx])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::gateway::messages::LogonRequest;
    use rust_decimal::Decimal;

    #[test]
    fn decodes_fill() {
        let frame = r#"{"MsgType":"8","MsgSeqNum":17,"ClOrdID":"a1","ExecType":"FILL","OrdStatus":"FILLED","LastPx":101.5,"LastShares":100,"TransactTime":"20210204-18:24:07.387"}"#;
        let msg = JsonCodec::new().decode_frame(frame).unwrap();

        assert_eq!(msg.seq, Some(17));
        let InboundMessage::Report(report) = msg.body else {
            panic!("expected report");
        };
        assert_eq!(report.client_order_id, "a1");
        assert!(report.transact_time.is_some());
        match report.kind {
            ReportKind::Fill(fill) => {
                assert_eq!(fill.last_px, Decimal::new(1015, 1));
                assert_eq!(fill.last_qty, Decimal::from(100));
                assert!(!fill.partial);
            }
            other => panic!("expected fill, got {other:?}"),
        }
    }

    #[test]
    fn decodes_cancel_reject() {
        let frame = r#"{"MsgType":"9","MsgSeqNum":"5","ClOrdID":"c2","OrigClOrdID":"c1","CxlRejReason":"TOO_LATE_TO_CANCEL","Text":"too late"}"#;
        let msg = JsonCodec::new().decode_frame(frame).unwrap();

        assert_eq!(msg.seq, Some(5));
        let InboundMessage::Report(report) = msg.body else {
            panic!("expected report");
        };
        assert_eq!(report.broker_order_id(), "c1");
        assert_eq!(
            report.kind,
            ReportKind::CancelReject {
                reason: "TOO_LATE_TO_CANCEL".to_string()
            }
        );
    }

    #[test]
    fn heartbeat_without_sequence() {
        let frame = r#"{"MsgType":"heartbeat","status":0,"Text":"Heartbeat","SendingTime":"20240315-13:30:00.000"}"#;
        let msg = JsonCodec::new().decode_frame(frame).unwrap();
        assert_eq!(msg.seq, None);
        assert!(msg.body.is_heartbeat());
    }

    #[test]
    fn non_report_is_other() {
        let frame = r#"{"MsgType":"AP","MsgSeqNum":3,"Symbol":"AAPL","LongQty":100}"#;
        let msg = JsonCodec::new().decode_frame(frame).unwrap();
        assert_eq!(msg.body, InboundMessage::Other);
    }

    #[test]
    fn msg_type_key_is_case_insensitive() {
        let msg = JsonCodec::new()
            .decode_frame(r#"{"msgtype":"8","MsgSeqNum":1,"ExecType":"NEW","ClOrdID":"x"}"#)
            .unwrap();
        assert_eq!(msg.msg_type, "8");
    }

    #[test]
    fn rejects_malformed_frames() {
        let codec = JsonCodec::new();
        assert!(matches!(codec.decode_frame("not json"), Err(CodecError::Json(_))));
        assert!(matches!(
            codec.decode_frame("[1,2]"),
            Err(CodecError::InvalidFormat(_))
        ));
        assert!(matches!(
            codec.decode_frame(r#"{"MsgSeqNum":1}"#),
            Err(CodecError::MissingMsgType)
        ));
        assert!(matches!(
            codec.decode_frame(r#"{"MsgType":"8","ExecType":"NEW"}"#),
            Err(CodecError::MissingSeqNum(_))
        ));
        assert!(matches!(
            codec.decode_frame(r#"{"MsgType":"8","MsgSeqNum":"abc"}"#),
            Err(CodecError::InvalidFormat(_))
        ));
    }

    #[test]
    fn bad_body_keeps_sequence_number() {
        let codec = JsonCodec::new();
        for frame in [
            r#"{"MsgType":"8","MsgSeqNum":2,"ExecType":"NEW","TransactTime":"yesterday"}"#,
            r#"{"MsgType":"8","MsgSeqNum":3,"ExecType":"FILL","LastPx":"cheap"}"#,
        ] {
            let msg = codec.decode_frame(frame).unwrap();
            assert!(msg.seq.is_some());
            assert!(
                matches!(msg.body, InboundMessage::Undecodable { .. }),
                "{frame}"
            );
        }
    }

    #[test]
    fn signed_encoding_adds_session_id() {
        let codec = JsonCodec::new();
        let text = codec
            .encode_signed(&LogonRequest::new("u", "p", None), "token-1")
            .unwrap();
        let json: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["SessionId"], "token-1");
        assert_eq!(json["MsgType"], "A");
    }

    #[test]
    fn signed_encoding_requires_object() {
        assert!(matches!(
            JsonCodec::new().encode_signed(&[1, 2, 3], "t"),
            Err(CodecError::InvalidFormat(_))
        ));
    }

    #[test]
    fn decodes_response() {
        let response = JsonCodec::new()
            .decode_response(r#"{"status":0,"SessionId":"abc"}"#)
            .unwrap();
        assert!(response.is_success());
        assert_eq!(response.session_id.as_deref(), Some("abc"));
    }
}
