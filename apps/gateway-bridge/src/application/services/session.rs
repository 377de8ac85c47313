//! Session Controller
//!
//! Owns the gateway session token and the logon exchange. Every non-logon
//! request goes through [`SessionController::send_signed`], which attaches
//! the token; without one the request is refused before it reaches the
//! socket.
//!
//! A logon refused while the venue is open is fatal. Outside trading hours
//! the gateway refuses logons routinely, so a refusal there just leaves the
//! session closed until the heartbeat supervisor tries again.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::application::ports::{GatewayTransport, TradingCalendar};
use crate::domain::report::SeqNum;
use crate::error::BridgeError;
use crate::infrastructure::gateway::{AuthError, Credentials, GatewayResponse, JsonCodec};
use crate::infrastructure::metrics::{self, Outcome};

/// Result of a logon attempt that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    /// A session token is now held.
    pub authenticated: bool,
    /// The token, when authenticated.
    pub session_id: Option<String>,
    /// Replay start that was requested, if any.
    pub replay_from: Option<SeqNum>,
    /// Gateway text.
    pub text: Option<String>,
    /// Gateway send time.
    pub sending_time: Option<String>,
}

/// Read-only view of the session for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    /// Whether a session token is held.
    pub open: bool,
    /// Whether the subscriber is connected.
    pub connected: bool,
    /// Whether the venue calendar says trading is open.
    pub venue_open: bool,
    /// Successful logons since start.
    pub logons: u64,
    /// Time of the last successful logon.
    pub last_logon_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct SessionState {
    session_id: Option<String>,
    connected: bool,
    logons: u64,
    last_logon_at: Option<DateTime<Utc>>,
}

/// Gateway session owner.
pub struct SessionController {
    transport: Arc<dyn GatewayTransport>,
    calendar: Arc<dyn TradingCalendar>,
    credentials: Credentials,
    codec: JsonCodec,
    state: RwLock<SessionState>,
    logon_lock: tokio::sync::Mutex<()>,
}

impl SessionController {
    /// Create a controller with no session.
    #[must_use]
    pub fn new(
        transport: Arc<dyn GatewayTransport>,
        calendar: Arc<dyn TradingCalendar>,
        credentials: Credentials,
    ) -> Self {
        Self {
            transport,
            calendar,
            credentials,
            codec: JsonCodec::new(),
            state: RwLock::new(SessionState::default()),
            logon_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Log on to the gateway.
    ///
    /// `replay_from = None` asks for a brand-new session; `Some(n)` asks the
    /// gateway to replay the subscribe stream after `n`. Attempts are
    /// serialized.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::Auth`] if the gateway refuses while the venue is open
    /// - [`BridgeError::Transport`] if the request/reply exchange fails
    /// - [`BridgeError::Malformed`] if the reply cannot be decoded
    pub async fn logon(&self, replay_from: Option<SeqNum>) -> Result<SessionInfo, BridgeError> {
        let _serialized = self.logon_lock.lock().await;

        let request = self.credentials.to_logon(replay_from);
        let payload = self.codec.encode(&request)?;

        tracing::info!(
            username = %self.credentials.username(),
            msg_seq_num = request.msg_seq_num,
            replay = replay_from.is_some(),
            "Logging on to gateway"
        );

        let response = match self.exchange(payload).await {
            Ok(response) => response,
            Err(e) => {
                metrics::record_logon(Outcome::Failure);
                return Err(e);
            }
        };

        let venue_open = self.calendar.is_open_now();
        let text = response.text().map(str::to_string);

        if !response.is_success() {
            self.clear_session();
            if venue_open {
                metrics::record_logon(Outcome::Failure);
                tracing::error!(
                    status = response.status,
                    text = text.as_deref().unwrap_or_default(),
                    "Gateway refused logon during trading hours"
                );
                return Err(AuthError::Rejected {
                    status: response.status,
                    message: text.unwrap_or_default(),
                }
                .into());
            }

            metrics::record_logon(Outcome::Closed);
            tracing::info!(
                status = response.status,
                text = text.as_deref().unwrap_or_default(),
                "Gateway refused logon outside trading hours, session stays closed"
            );
            return Ok(SessionInfo {
                authenticated: false,
                session_id: None,
                replay_from,
                text,
                sending_time: response.sending_time,
            });
        }

        let Some(session_id) = response.session_id.filter(|id| !id.is_empty()) else {
            self.clear_session();
            if venue_open {
                metrics::record_logon(Outcome::Failure);
                return Err(AuthError::MissingSessionId.into());
            }
            metrics::record_logon(Outcome::Closed);
            return Ok(SessionInfo {
                authenticated: false,
                session_id: None,
                replay_from,
                text,
                sending_time: response.sending_time,
            });
        };

        {
            let mut state = self.state.write();
            state.session_id = Some(session_id.clone());
            state.logons = state.logons.saturating_add(1);
            state.last_logon_at = Some(Utc::now());
        }
        metrics::record_logon(Outcome::Success);
        metrics::set_session_open(true);
        tracing::info!(replay_from = ?replay_from, "Gateway session opened");

        Ok(SessionInfo {
            authenticated: true,
            session_id: Some(session_id),
            replay_from,
            text,
            sending_time: response.sending_time,
        })
    }

    /// Send a request signed with the session token.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::NoSession`] without sending when no session is
    /// held, or the transport/codec error of the exchange.
    pub async fn send_signed<T: Serialize + Sync>(
        &self,
        request: &T,
    ) -> Result<GatewayResponse, BridgeError> {
        let Some(session_id) = self.session_id() else {
            tracing::error!("Signed request attempted without a gateway session");
            return Err(BridgeError::NoSession);
        };
        let payload = self.codec.encode_signed(request, &session_id)?;
        self.exchange(payload).await
    }

    async fn exchange(&self, payload: String) -> Result<GatewayResponse, BridgeError> {
        let started = Instant::now();
        let reply = self.transport.send_request(payload).await;
        metrics::record_request_duration(started.elapsed());
        Ok(self.codec.decode_response(&reply?)?)
    }

    /// Current session token.
    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        self.state.read().session_id.clone()
    }

    /// Whether a session token is held.
    #[must_use]
    pub fn is_session_open(&self) -> bool {
        self.state.read().session_id.is_some()
    }

    /// Drop the session token. Returns whether one was held.
    pub fn expire_session(&self) -> bool {
        let expired = self.state.write().session_id.take().is_some();
        if expired {
            metrics::set_session_open(false);
        }
        expired
    }

    fn clear_session(&self) {
        self.expire_session();
    }

    /// Whether the venue calendar says trading is open now.
    #[must_use]
    pub fn is_venue_open(&self) -> bool {
        self.calendar.is_open_now()
    }

    /// Record whether the subscriber is connected.
    pub fn set_connected(&self, connected: bool) {
        self.state.write().connected = connected;
    }

    /// Whether the subscriber is connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state.read().connected
    }

    /// Read-only view for health reporting. Never exposes the token.
    #[must_use]
    pub fn snapshot(&self) -> SessionStatus {
        let state = self.state.read();
        SessionStatus {
            open: state.session_id.is_some(),
            connected: state.connected,
            venue_open: self.calendar.is_open_now(),
            logons: state.logons,
            last_logon_at: state.last_logon_at,
        }
    }
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("username", &self.credentials.username())
            .field("session_open", &self.is_session_open())
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}
