//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the tunnel.
//! All types derive Serde traits for deserialization from config files.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Root configuration for the tunnel.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct TunnelConfig {
    /// Listener configuration (bind address, connection limit).
    pub listener: ListenerConfig,

    /// Relay direction, upstream and disguise strategy.
    pub tunnel: TunnelSection,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "127.0.0.1:1080").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:1080".to_string(),
            max_connections: 1024,
        }
    }
}

/// Which side of the disguise this process terminates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TunnelMode {
    /// Plain inbound, disguised upstream.
    #[default]
    Client,
    /// Disguised inbound, plain upstream.
    Server,
}

impl TunnelMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TunnelMode::Client => "client",
            TunnelMode::Server => "server",
        }
    }
}

impl fmt::Display for TunnelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TunnelMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client" => Ok(TunnelMode::Client),
            "server" => Ok(TunnelMode::Server),
            other => Err(format!("unknown tunnel mode: {}", other)),
        }
    }
}

/// Tunnel settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TunnelSection {
    /// Relay direction.
    pub mode: TunnelMode,

    /// Where accepted connections are relayed to ("host:port").
    pub upstream: String,

    /// Disguise strategy name; empty disables the disguise.
    pub obfs: String,

    /// Host header override for `simple_http`.
    pub obfs_host: Option<String>,
}

impl Default for TunnelSection {
    fn default() -> Self {
        Self {
            mode: TunnelMode::Client,
            upstream: String::new(),
            obfs: "simple_http".to_string(),
            obfs_host: None,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upstream connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// How long shutdown waits for in-flight connections, in seconds.
    pub drain_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            drain_secs: 10,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
