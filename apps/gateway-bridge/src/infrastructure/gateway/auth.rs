//! Gateway Authentication
//!
//! Credentials for the gateway logon and the errors a logon can produce.
//!
//! # Logon Flow
//!
//! 1. Send `{"MsgType":"A","553":user,"554":password,"MsgSeqNum":N}`
//! 2. Receive `{"status":0,"SessionId":"..."}` on success
//! 3. Sign every later request with `SessionId`
//!
//! A non-zero status is fatal only while the venue is open; outside trading
//! hours the gateway routinely refuses logons and the session simply stays
//! closed until the next heartbeat tick.

use thiserror::Error;

use super::messages::LogonRequest;
use crate::domain::report::SeqNum;

/// Errors that can occur during authentication.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Gateway refused the logon while the venue was open.
    #[error("logon rejected ({status}): {message}")]
    Rejected {
        /// Gateway status code.
        status: i64,
        /// Gateway text, if any.
        message: String,
    },

    /// Logon succeeded but no session token came back.
    #[error("logon reply carried no session id")]
    MissingSessionId,

    /// Credentials unusable.
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),
}

/// Gateway credentials.
///
/// The `Debug` implementation redacts the password for safe logging.
#[derive(Clone)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    /// Create new credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if either username or password is empty.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Result<Self, AuthError> {
        let username = username.into();
        let password = password.into();

        if username.is_empty() {
            return Err(AuthError::InvalidCredentials(
                "username cannot be empty".to_string(),
            ));
        }
        if password.is_empty() {
            return Err(AuthError::InvalidCredentials(
                "password cannot be empty".to_string(),
            ));
        }

        Ok(Self { username, password })
    }

    /// Get the username.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Build a logon request. `replay_from = None` starts a new session.
    #[must_use]
    pub fn to_logon(&self, replay_from: Option<SeqNum>) -> LogonRequest {
        LogonRequest::new(self.username.clone(), self.password.clone(), replay_from)
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::gateway::messages::NO_REPLAY_SEQ;

    #[test]
    fn test_credentials_new() {
        let creds = Credentials::new("trader", "secret").unwrap();
        assert_eq!(creds.username(), "trader");
    }

    #[test]
    fn test_credentials_empty_username_fails() {
        assert!(matches!(
            Credentials::new("", "secret"),
            Err(AuthError::InvalidCredentials(_))
        ));
    }

    #[test]
    fn test_credentials_empty_password_fails() {
        assert!(Credentials::new("trader", "").is_err());
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials::new("trader", "hunter2").unwrap();
        let debug = format!("{creds:?}");
        assert!(debug.contains("trader"));
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_to_logon_sequence() {
        let creds = Credentials::new("trader", "secret").unwrap();
        assert_eq!(creds.to_logon(None).msg_seq_num, NO_REPLAY_SEQ);
        assert_eq!(creds.to_logon(Some(12)).msg_seq_num, 12);
    }

    #[test]
    fn test_rejected_display() {
        let err = AuthError::Rejected {
            status: 3,
            message: "bad password".to_string(),
        };
        assert_eq!(err.to_string(), "logon rejected (3): bad password");
    }
}
