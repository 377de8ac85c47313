//! Configuration Module
//!
//! Configuration loading for the gateway bridge.

mod settings;

pub use settings::{BridgeConfig, ConfigError, GatewaySettings, ServerSettings, SessionSettings};
