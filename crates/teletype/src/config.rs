//! Server configuration.
//!
//! All limits live in one [`ServerConfig`]; the transport, hub and pump
//! each get their slice of it. Values can be overridden from `TELETYPE_*`
//! environment variables.

use std::str::FromStr;
use std::time::Duration;

use teletype_hub::HubConfig;
use teletype_transport::WebSocketSettings;

/// Errors produced while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable held something that doesn't parse.
    #[error("{key}: cannot parse {value:?}")]
    Unparsable { key: &'static str, value: String },

    /// A value parsed but is out of range.
    #[error("{key}: {reason}")]
    Invalid { key: &'static str, reason: &'static str },
}

/// Timing and size limits used by each connection's pumps.
#[derive(Debug, Clone)]
pub struct PumpConfig {
    /// Largest inbound message in bytes.
    pub max_message_size: usize,
    /// Deadline for every transport write, ping and close.
    pub write_timeout: Duration,
    /// Period of the keep-alive ping.
    pub ping_interval: Duration,
}

impl Default for PumpConfig {
    fn default() -> Self {
        ServerConfig::default().pump_config()
    }
}

/// Full server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to.
    pub bind_addr: String,
    /// Largest inbound message in bytes. Bigger frames end the connection.
    pub max_message_size: usize,
    /// Capacity of each connection's outbound queue.
    pub outbound_capacity: usize,
    /// Deadline for every transport write, ping and close.
    pub write_timeout: Duration,
    /// Period of the keep-alive ping. Must be shorter than `idle_timeout`.
    pub ping_interval: Duration,
    /// How long a connection may stay silent before it is dropped.
    pub idle_timeout: Duration,
    /// Deadline for the WebSocket upgrade.
    pub handshake_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let idle_timeout = Duration::from_secs(60);
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            max_message_size: 512,
            outbound_capacity: 256,
            write_timeout: Duration::from_secs(10),
            ping_interval: idle_timeout * 9 / 10,
            idle_timeout,
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

impl ServerConfig {
    /// Loads defaults overridden by `TELETYPE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads defaults overridden by whatever `lookup` returns for each
    /// `TELETYPE_*` key.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(addr) = lookup("TELETYPE_BIND") {
            config.bind_addr = addr;
        }
        if let Some(v) = parse(&lookup, "TELETYPE_MAX_MESSAGE_SIZE")? {
            config.max_message_size = v;
        }
        if let Some(v) = parse(&lookup, "TELETYPE_OUTBOUND_CAPACITY")? {
            config.outbound_capacity = v;
        }
        if let Some(v) = parse(&lookup, "TELETYPE_WRITE_TIMEOUT_SECS")? {
            config.write_timeout = Duration::from_secs(v);
        }
        if let Some(v) = parse(&lookup, "TELETYPE_IDLE_TIMEOUT_SECS")? {
            config.idle_timeout = Duration::from_secs(v);
            config.ping_interval = config.idle_timeout * 9 / 10;
        }
        if let Some(v) = parse(&lookup, "TELETYPE_PING_INTERVAL_SECS")? {
            config.ping_interval = Duration::from_secs(v);
        }
        if let Some(v) = parse(&lookup, "TELETYPE_HANDSHAKE_TIMEOUT_SECS")? {
            config.handshake_timeout = Duration::from_secs(v);
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks that the limits are usable together.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_message_size == 0 {
            return Err(ConfigError::Invalid {
                key: "max_message_size",
                reason: "must be greater than zero",
            });
        }
        if self.outbound_capacity == 0 {
            return Err(ConfigError::Invalid {
                key: "outbound_capacity",
                reason: "must be greater than zero",
            });
        }
        if self.write_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                key: "write_timeout",
                reason: "must be greater than zero",
            });
        }
        if self.ping_interval.is_zero() || self.ping_interval >= self.idle_timeout {
            return Err(ConfigError::Invalid {
                key: "ping_interval",
                reason: "must be non-zero and shorter than idle_timeout",
            });
        }
        if self.handshake_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                key: "handshake_timeout",
                reason: "must be greater than zero",
            });
        }
        Ok(())
    }

    /// Limits for the hub.
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            outbound_capacity: self.outbound_capacity,
        }
    }

    /// Limits for each connection's pumps.
    pub fn pump_config(&self) -> PumpConfig {
        PumpConfig {
            max_message_size: self.max_message_size,
            write_timeout: self.write_timeout,
            ping_interval: self.ping_interval,
        }
    }

    /// Limits for the WebSocket listener.
    pub fn websocket_settings(&self) -> WebSocketSettings {
        WebSocketSettings {
            max_message_size: self.max_message_size,
            idle_timeout: self.idle_timeout,
            handshake_timeout: self.handshake_timeout,
        }
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Unparsable { key, value }),
    }
}
