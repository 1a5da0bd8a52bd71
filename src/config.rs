//! Router configuration
//!
//! The host supplies an options bag when it creates the sandbox; it is
//! deserialized into [`HostConfig`] (wire field names follow the host
//! contract) and combined with the logging capability into an immutable
//! [`RouterConfig`]. Every field is validated before any network activity
//! starts; the first invalid field is named in the error.

use crate::observability::logging::LoggerFactory;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Default delay before a scheduled reconnection attempt fires
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 500;

/// Configuration errors - fatal, raised before any I/O
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("invalid field `{field}`: {message}")]
    InvalidField {
        field: &'static str,
        message: String,
    },
}

impl ConfigError {
    fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            message: message.into(),
        }
    }
}

/// Host-supplied options bag, as received over the sandbox boundary.
///
/// Timeout fields keep the host contract's naming: `CONNECTION_TIMEOUT` and
/// `PUBLISH_TIMEOUT` are milliseconds, `KEEP_ALIVE_INTERVAL` is seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostConfig {
    /// Opaque identifier for log correlation
    #[serde(rename = "logId")]
    pub log_id: String,
    /// Protocol-level client identifier, unique per broker
    #[serde(rename = "clientId")]
    pub client_id: String,
    /// Broker hostname
    pub host: String,
    /// Broker port
    pub port: u16,
    /// Use TLS for the broker connection
    #[serde(rename = "useSSL")]
    pub use_ssl: bool,
    /// Connect deadline in milliseconds
    #[serde(rename = "CONNECTION_TIMEOUT")]
    pub connection_timeout_ms: u64,
    /// MQTT keep-alive interval in seconds
    #[serde(rename = "KEEP_ALIVE_INTERVAL")]
    pub keep_alive_interval_secs: u64,
    /// Publish acknowledgment deadline in milliseconds
    #[serde(rename = "PUBLISH_TIMEOUT")]
    pub publish_timeout_ms: u64,
    /// Delay before a scheduled reconnection attempt, in milliseconds
    #[serde(rename = "RECONNECT_DELAY", default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,
}

fn default_reconnect_delay() -> u64 {
    DEFAULT_RECONNECT_DELAY_MS
}

/// Immutable configuration owned by one Router for its lifetime
#[derive(Clone)]
pub struct RouterConfig {
    pub log_id: String,
    pub client_id: String,
    pub host: String,
    pub port: u16,
    pub use_ssl: bool,
    pub connection_timeout_ms: u64,
    pub keep_alive_interval_secs: u64,
    pub publish_timeout_ms: u64,
    pub reconnect_delay_ms: u64,
    /// Logging capability; produces the Router's logger at construction
    pub logger: Arc<dyn LoggerFactory>,
}

impl std::fmt::Debug for RouterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterConfig")
            .field("log_id", &self.log_id)
            .field("client_id", &self.client_id)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("use_ssl", &self.use_ssl)
            .field("connection_timeout_ms", &self.connection_timeout_ms)
            .field("keep_alive_interval_secs", &self.keep_alive_interval_secs)
            .field("publish_timeout_ms", &self.publish_timeout_ms)
            .field("reconnect_delay_ms", &self.reconnect_delay_ms)
            .finish_non_exhaustive()
    }
}

impl RouterConfig {
    /// Combine the host's wire config with the injected logging capability
    pub fn from_host(host: HostConfig, logger: Arc<dyn LoggerFactory>) -> Self {
        Self {
            log_id: host.log_id,
            client_id: host.client_id,
            host: host.host,
            port: host.port,
            use_ssl: host.use_ssl,
            connection_timeout_ms: host.connection_timeout_ms,
            keep_alive_interval_secs: host.keep_alive_interval_secs,
            publish_timeout_ms: host.publish_timeout_ms,
            reconnect_delay_ms: host.reconnect_delay_ms,
            logger,
        }
    }

    /// Validate all fields, naming the first invalid one
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.log_id.trim().is_empty() {
            return Err(ConfigError::MissingField("logId"));
        }
        if self.client_id.trim().is_empty() {
            return Err(ConfigError::MissingField("clientId"));
        }
        if self.host.trim().is_empty() {
            return Err(ConfigError::MissingField("host"));
        }
        if self.port == 0 {
            return Err(ConfigError::invalid("port", "must be non-zero"));
        }
        if self.connection_timeout_ms == 0 {
            return Err(ConfigError::invalid(
                "CONNECTION_TIMEOUT",
                "must be a positive number of milliseconds",
            ));
        }
        if self.keep_alive_interval_secs == 0 {
            return Err(ConfigError::invalid(
                "KEEP_ALIVE_INTERVAL",
                "must be a positive number of seconds",
            ));
        }
        if self.publish_timeout_ms == 0 {
            return Err(ConfigError::invalid(
                "PUBLISH_TIMEOUT",
                "must be a positive number of milliseconds",
            ));
        }
        if self.reconnect_delay_ms == 0 {
            return Err(ConfigError::invalid(
                "RECONNECT_DELAY",
                "must be a positive number of milliseconds",
            ));
        }
        Ok(())
    }
}
