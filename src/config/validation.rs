//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Resolve the disguise strategy name through the registry
//! - Validate value ranges (timeouts > 0, limits > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: TunnelConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::TunnelConfig;
use crate::obfs::{ObfsError, ObfsKind};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address {0:?} is not a socket address")]
    BindAddress(String),

    #[error("listener.max_connections must be greater than zero")]
    MaxConnections,

    #[error("tunnel.upstream {0:?} must be host:port")]
    Upstream(String),

    #[error("tunnel.obfs: {0}")]
    Obfs(String),

    #[error("timeouts.{0} must be greater than zero")]
    Timeout(&'static str),

    #[error("observability.metrics_address {0:?} is not a socket address")]
    MetricsAddress(String),
}

/// Check a parsed configuration, collecting every problem found.
pub fn validate_config(config: &TunnelConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::MaxConnections);
    }

    if !is_host_port(&config.tunnel.upstream) {
        errors.push(ValidationError::Upstream(config.tunnel.upstream.clone()));
    }
    if let Err(ObfsError::Unsupported(name)) = ObfsKind::from_name(&config.tunnel.obfs) {
        errors.push(ValidationError::Obfs(format!("unsupported obfs: {}", name)));
    }

    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::Timeout("connect_secs"));
    }
    if config.timeouts.drain_secs == 0 {
        errors.push(ValidationError::Timeout("drain_secs"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_host_port(addr: &str) -> bool {
    match addr.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok_and(|p| p != 0),
        None => false,
    }
}
