//! Server Configuration
//!
//! Plain configuration struct with development defaults (port 4000, any
//! origin) that can be overridden from `LOBBY_*` environment variables.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::lobby::policy::{CoordinatorPolicy, ParsePolicyError};

/// Default listening port.
pub const DEFAULT_PORT: u16 = 4000;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections, counted from accept.
    pub max_connections: usize,
    /// Time allowed for the WebSocket handshake.
    pub connection_timeout: Duration,
    /// Per-connection outbound queue length.
    pub outbound_buffer: usize,
    /// Coordinator command queue length.
    pub command_buffer: usize,
    /// Only accept handshakes with this `Origin` header. None accepts any.
    pub allowed_origin: Option<String>,
    /// Coordinator policies.
    pub policy: CoordinatorPolicy,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            max_connections: 1000,
            connection_timeout: Duration::from_secs(30),
            outbound_buffer: 64,
            command_buffer: 1024,
            allowed_origin: None,
            policy: CoordinatorPolicy::default(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Value could not be parsed.
    #[error("invalid value for {var}: {value:?}")]
    InvalidValue {
        /// Environment variable name.
        var: &'static str,
        /// Rejected value.
        value: String,
    },

    /// Unknown policy name.
    #[error("{var}: {source}")]
    Policy {
        /// Environment variable name.
        var: &'static str,
        /// Parse failure.
        #[source]
        source: ParsePolicyError,
    },
}

impl ServerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Create config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = lookup("LOBBY_BIND_ADDR") {
            config.bind_addr = parse_value("LOBBY_BIND_ADDR", &v)?;
        }
        if let Some(v) = lookup("LOBBY_MAX_CONNECTIONS") {
            config.max_connections = parse_value("LOBBY_MAX_CONNECTIONS", &v)?;
        }
        if let Some(v) = lookup("LOBBY_CONNECTION_TIMEOUT_SECS") {
            let secs = parse_nonzero("LOBBY_CONNECTION_TIMEOUT_SECS", &v)?;
            config.connection_timeout = Duration::from_secs(secs as u64);
        }
        if let Some(v) = lookup("LOBBY_OUTBOUND_BUFFER") {
            config.outbound_buffer = parse_nonzero("LOBBY_OUTBOUND_BUFFER", &v)?;
        }
        if let Some(v) = lookup("LOBBY_COMMAND_BUFFER") {
            config.command_buffer = parse_nonzero("LOBBY_COMMAND_BUFFER", &v)?;
        }
        config.allowed_origin = lookup("LOBBY_ALLOWED_ORIGIN").filter(|o| !o.trim().is_empty());

        if let Some(v) = lookup("LOBBY_LEADER_POLICY") {
            config.policy.leader = parse_policy("LOBBY_LEADER_POLICY", &v)?;
        }
        if let Some(v) = lookup("LOBBY_REJOIN_POLICY") {
            config.policy.rejoin = parse_policy("LOBBY_REJOIN_POLICY", &v)?;
        }
        if let Some(v) = lookup("LOBBY_AUTHORIZATION") {
            config.policy.authorization = parse_policy("LOBBY_AUTHORIZATION", &v)?;
        }

        Ok(config)
    }

    /// Check whether a handshake `Origin` header is acceptable.
    pub fn origin_allowed(&self, origin: Option<&str>) -> bool {
        match &self.allowed_origin {
            None => true,
            Some(allowed) => origin == Some(allowed.as_str()),
        }
    }
}

fn parse_value<T: FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        var,
        value: value.to_string(),
    })
}

fn parse_nonzero(var: &'static str, value: &str) -> Result<usize, ConfigError> {
    match parse_value::<usize>(var, value)? {
        0 => Err(ConfigError::InvalidValue { var, value: value.to_string() }),
        n => Ok(n),
    }
}

fn parse_policy<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr<Err = ParsePolicyError>,
{
    value.parse().map_err(|source| ConfigError::Policy { var, source })
}
