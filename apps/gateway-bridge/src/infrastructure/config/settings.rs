//! Bridge Configuration Settings
//!
//! Configuration types for the gateway bridge, loaded from environment
//! variables. Connection settings are required; everything else has a
//! default.

use std::time::Duration;

use crate::application::services::HeartbeatConfig;
use crate::domain::calendar::{CalendarError, VenueHours};
use crate::infrastructure::gateway::{
    AuthError, BackoffConfig, Credentials, GatewayClientConfig, ZmqTransportConfig,
};

/// Gateway connection settings.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    /// Gateway host, with or without `tcp://`.
    pub host: String,
    /// Request/reply port.
    pub request_port: u16,
    /// Publish/subscribe port.
    pub subscribe_port: u16,
    /// Bound on each request/reply leg.
    pub request_timeout: Duration,
    /// Idle receive tick on the subscribe socket.
    pub subscribe_timeout: Duration,
    /// Initial subscriber reconnect delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum subscriber reconnect delay.
    pub reconnect_delay_max: Duration,
}

impl GatewaySettings {
    const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
    const DEFAULT_SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(40);
    const DEFAULT_RECONNECT_DELAY_INITIAL: Duration = Duration::from_millis(250);
    const DEFAULT_RECONNECT_DELAY_MAX: Duration = Duration::from_secs(30);
}

/// Session supervision and dispatch settings.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Heartbeat check interval.
    pub heartbeat_interval: Duration,
    /// Silent intervals tolerated before reconnecting.
    pub heartbeat_max_missed: u32,
    /// How long the dispatch gate stays locked after a call.
    pub unlock_grace: Duration,
    /// Capacity of the subscriber-to-reconciler channel.
    pub frame_channel_capacity: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(60),
            heartbeat_max_missed: 5,
            unlock_grace: Duration::ZERO,
            frame_channel_capacity: 1024,
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Health check and metrics HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8083 }
    }
}

/// Complete bridge configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Gateway connection settings.
    pub gateway: GatewaySettings,
    /// Gateway credentials.
    pub credentials: Credentials,
    /// Gateway client id (tag 109).
    pub client_id: String,
    /// Trading account (tag 1).
    pub account: String,
    /// Session supervision settings.
    pub session: SessionSettings,
    /// Venue trading hours.
    pub venue: VenueHours,
    /// Server port settings.
    pub server: ServerSettings,
}

impl BridgeConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or
    /// empty, or if a port, timezone or session time cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from any key/value source.
    ///
    /// # Errors
    ///
    /// As [`from_env`](Self::from_env).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let gateway = GatewaySettings {
            host: env.required("GATEWAY_HOST")?,
            request_port: env.required_port("GATEWAY_REQ_PORT")?,
            subscribe_port: env.required_port("GATEWAY_SUB_PORT")?,
            request_timeout: env.duration_secs(
                "GATEWAY_REQUEST_TIMEOUT_SECS",
                GatewaySettings::DEFAULT_REQUEST_TIMEOUT,
            ),
            subscribe_timeout: env.duration_secs(
                "GATEWAY_SUBSCRIBE_TIMEOUT_SECS",
                GatewaySettings::DEFAULT_SUBSCRIBE_TIMEOUT,
            ),
            reconnect_delay_initial: env.duration_millis(
                "GATEWAY_RECONNECT_DELAY_INITIAL_MS",
                GatewaySettings::DEFAULT_RECONNECT_DELAY_INITIAL,
            ),
            reconnect_delay_max: env.duration_secs(
                "GATEWAY_RECONNECT_DELAY_MAX_SECS",
                GatewaySettings::DEFAULT_RECONNECT_DELAY_MAX,
            ),
        };

        let credentials = Credentials::new(
            env.required("GATEWAY_USERNAME")?,
            env.required("GATEWAY_PASSWORD")?,
        )?;
        let client_id = env.required("GATEWAY_CLIENT_ID")?;
        let account = env
            .optional("GATEWAY_ACCOUNT")
            .unwrap_or_else(|| "DEFAULT".to_string());

        let defaults = SessionSettings::default();
        let session = SessionSettings {
            heartbeat_interval: env
                .duration_secs("GATEWAY_HEARTBEAT_INTERVAL_SECS", defaults.heartbeat_interval),
            heartbeat_max_missed: env
                .parsed("GATEWAY_HEARTBEAT_MAX_MISSED", defaults.heartbeat_max_missed),
            unlock_grace: env.duration_millis("GATEWAY_UNLOCK_GRACE_MS", defaults.unlock_grace),
            frame_channel_capacity: env
                .parsed(
                    "GATEWAY_FRAME_CHANNEL_CAPACITY",
                    defaults.frame_channel_capacity,
                )
                .max(1),
        };

        let venue_defaults = VenueHours::default();
        let venue = match (
            env.optional("GATEWAY_VENUE_TIMEZONE"),
            env.optional("GATEWAY_SESSION_OPEN"),
            env.optional("GATEWAY_SESSION_CLOSE"),
        ) {
            (None, None, None) => venue_defaults,
            (timezone, open, close) => VenueHours::parse(
                &timezone.unwrap_or_else(|| venue_defaults.timezone().name().to_string()),
                &open.unwrap_or_else(|| venue_defaults.open().format("%H:%M").to_string()),
                &close.unwrap_or_else(|| venue_defaults.close().format("%H:%M").to_string()),
            )?,
        };

        let server = ServerSettings {
            health_port: env.parsed("BRIDGE_HEALTH_PORT", ServerSettings::default().health_port),
        };

        Ok(Self {
            gateway,
            credentials,
            client_id,
            account,
            session,
            venue,
            server,
        })
    }

    /// Transport settings derived from this configuration.
    #[must_use]
    pub fn transport_config(&self) -> ZmqTransportConfig {
        ZmqTransportConfig {
            request_timeout: self.gateway.request_timeout,
            subscribe_timeout: self.gateway.subscribe_timeout,
            backoff: BackoffConfig::with_bounds(
                self.gateway.reconnect_delay_initial,
                self.gateway.reconnect_delay_max,
            ),
            ..ZmqTransportConfig::new(
                &self.gateway.host,
                self.gateway.request_port,
                self.gateway.subscribe_port,
            )
        }
    }

    /// Client settings derived from this configuration.
    #[must_use]
    pub fn client_config(&self) -> GatewayClientConfig {
        GatewayClientConfig {
            heartbeat: HeartbeatConfig {
                interval: self.session.heartbeat_interval,
                max_missed: self.session.heartbeat_max_missed,
                ..HeartbeatConfig::default()
            },
            unlock_grace: self.session.unlock_grace,
            frame_channel_capacity: self.session.frame_channel_capacity,
            ..GatewayClientConfig::new(self.client_id.clone(), self.account.clone())
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable could not be parsed.
    #[error("environment variable {key} has invalid value {value:?}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Offending value.
        value: String,
    },
    /// Venue calendar settings are invalid.
    #[error("invalid venue calendar: {0}")]
    Calendar(#[from] CalendarError),
    /// Credentials are unusable.
    #[error("invalid gateway credentials: {0}")]
    Credentials(#[from] AuthError),
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        let value = (self.0)(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))?;
        let value = value.trim();
        if value.is_empty() {
            return Err(ConfigError::EmptyValue(key.to_string()));
        }
        Ok(value.to_string())
    }

    fn required_port(&self, key: &str) -> Result<u16, ConfigError> {
        let value = self.required(key)?;
        value.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value,
        })
    }

    fn parsed<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.optional(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn duration_secs(&self, key: &str, default: Duration) -> Duration {
        self.optional(key)
            .and_then(|v| v.parse::<u64>().ok())
            .map_or(default, Duration::from_secs)
    }

    fn duration_millis(&self, key: &str, default: Duration) -> Duration {
        self.optional(key)
            .and_then(|v| v.parse::<u64>().ok())
            .map_or(default, Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: &[(&str, &str)] = &[
        ("GATEWAY_HOST", "tcp://10.0.0.5"),
        ("GATEWAY_REQ_PORT", "5555"),
        ("GATEWAY_SUB_PORT", "5556"),
        ("GATEWAY_USERNAME", "trader"),
        ("GATEWAY_PASSWORD", "secret"),
        ("GATEWAY_CLIENT_ID", "CLIENT1"),
    ];

    fn with(extra: &[(&'static str, &'static str)]) -> Vec<(&'static str, &'static str)> {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend_from_slice(extra);
        pairs
    }

    #[test]
    fn defaults_apply() {
        let config = BridgeConfig::from_lookup(lookup(REQUIRED)).unwrap();
        assert_eq!(config.account, "DEFAULT");
        assert_eq!(config.gateway.request_timeout, Duration::from_secs(20));
        assert_eq!(config.gateway.subscribe_timeout, Duration::from_secs(40));
        assert_eq!(config.session.heartbeat_interval, Duration::from_secs(60));
        assert_eq!(config.session.heartbeat_max_missed, 5);
        assert_eq!(config.session.unlock_grace, Duration::ZERO);
        assert_eq!(config.session.frame_channel_capacity, 1024);
        assert_eq!(config.server.health_port, 8083);
        assert_eq!(config.venue, VenueHours::default());
    }

    #[test]
    fn derived_transport_and_client_config() {
        let config = BridgeConfig::from_lookup(lookup(&with(&[
            ("GATEWAY_REQUEST_TIMEOUT_SECS", "5"),
            ("GATEWAY_UNLOCK_GRACE_MS", "250"),
            ("GATEWAY_ACCOUNT", "ACC7"),
        ])))
        .unwrap();

        let transport = config.transport_config();
        assert_eq!(transport.request_endpoint, "tcp://10.0.0.5:5555");
        assert_eq!(transport.subscribe_endpoint, "tcp://10.0.0.5:5556");
        assert_eq!(transport.request_timeout, Duration::from_secs(5));

        let client = config.client_config();
        assert_eq!(client.client_id, "CLIENT1");
        assert_eq!(client.account, "ACC7");
        assert_eq!(client.unlock_grace, Duration::from_millis(250));
        assert_eq!(client.heartbeat.settle_delay, Duration::from_millis(100));
    }

    #[test]
    fn missing_required_var() {
        let err = BridgeConfig::from_lookup(lookup(&REQUIRED[1..])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref key) if key == "GATEWAY_HOST"));
    }

    #[test]
    fn empty_password_rejected() {
        let err = BridgeConfig::from_lookup(lookup(&with(&[("GATEWAY_PASSWORD", " ")]))).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyValue(ref key) if key == "GATEWAY_PASSWORD"));
    }

    #[test]
    fn invalid_port_rejected() {
        let err = BridgeConfig::from_lookup(lookup(&with(&[("GATEWAY_REQ_PORT", "http")]))).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "GATEWAY_REQ_PORT"));
    }

    #[test]
    fn venue_overrides() {
        let config = BridgeConfig::from_lookup(lookup(&with(&[
            ("GATEWAY_VENUE_TIMEZONE", "Europe/London"),
            ("GATEWAY_SESSION_OPEN", "08:00"),
        ])))
        .unwrap();
        assert_eq!(config.venue.timezone(), chrono_tz::Europe::London);
        assert_eq!(config.venue.open().format("%H:%M").to_string(), "08:00");
        assert_eq!(config.venue.close().format("%H:%M").to_string(), "20:00");

        let err = BridgeConfig::from_lookup(lookup(&with(&[("GATEWAY_VENUE_TIMEZONE", "Mars/Base")])))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Calendar(_)));
    }

    #[test]
    fn credentials_redacted_debug() {
        let config = BridgeConfig::from_lookup(lookup(REQUIRED)).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
