//! Per-connection relay settings derived from configuration.

use std::sync::Arc;
use std::time::Duration;

use crate::config::{TunnelConfig, TunnelMode};
use crate::obfs::{ObfsKind, ObfsResult, Obfuscator, SimpleHttpObfuscator};

/// Everything a relayed connection needs, snapshotted at accept time.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub mode: TunnelMode,
    pub upstream: String,
    /// `None` relays bytes untouched.
    pub obfuscator: Option<Arc<dyn Obfuscator>>,
    pub connect_timeout: Duration,
    pub drain_timeout: Duration,
    pub bind_address: String,
    pub max_connections: usize,
}

impl RelaySettings {
    /// Resolve the configured strategy for this side of the tunnel.
    pub fn from_config(config: &TunnelConfig) -> ObfsResult<Self> {
        let obfuscator = ObfsKind::from_name(&config.tunnel.obfs)?.map(|kind| {
            build_obfuscator(kind, config.tunnel.mode, config.tunnel.obfs_host.as_deref())
        });

        Ok(Self {
            mode: config.tunnel.mode,
            upstream: config.tunnel.upstream.clone(),
            obfuscator,
            connect_timeout: Duration::from_secs(config.timeouts.connect_secs),
            drain_timeout: Duration::from_secs(config.timeouts.drain_secs),
            bind_address: config.listener.bind_address.clone(),
            max_connections: config.listener.max_connections,
        })
    }

    /// Listener fields that differ in `next` and only take effect on restart.
    pub fn restart_required(&self, next: &RelaySettings) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.bind_address != next.bind_address {
            fields.push("listener.bind_address");
        }
        if self.max_connections != next.max_connections {
            fields.push("listener.max_connections");
        }
        fields
    }

    pub fn obfs_name(&self) -> &'static str {
        self.obfuscator.as_ref().map_or("none", |o| o.name())
    }
}

fn build_obfuscator(kind: ObfsKind, mode: TunnelMode, host: Option<&str>) -> Arc<dyn Obfuscator> {
    match (mode, kind, host) {
        (TunnelMode::Client, ObfsKind::SimpleHttp, Some(host)) => {
            Arc::new(SimpleHttpObfuscator::new().with_host(host))
        }
        (TunnelMode::Client, _, _) => kind.client(),
        (TunnelMode::Server, _, _) => kind.server(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obfs::ObfsError;

    fn config(mode: TunnelMode, obfs: &str) -> TunnelConfig {
        let mut config = TunnelConfig::default();
        config.tunnel.mode = mode;
        config.tunnel.obfs = obfs.into();
        config.tunnel.upstream = "127.0.0.1:9".into();
        config
    }

    #[test]
    fn test_passthrough() {
        let settings = RelaySettings::from_config(&config(TunnelMode::Client, "")).unwrap();
        assert!(settings.obfuscator.is_none());
        assert_eq!(settings.obfs_name(), "none");
    }

    #[test]
    fn test_simple_http_both_sides() {
        for mode in [TunnelMode::Client, TunnelMode::Server] {
            let settings = RelaySettings::from_config(&config(mode, "simple_http")).unwrap();
            assert_eq!(settings.obfs_name(), "simple_http");
            assert_eq!(settings.mode, mode);
        }
    }

    #[test]
    fn test_unknown_strategy() {
        let err = RelaySettings::from_config(&config(TunnelMode::Client, "tls")).unwrap_err();
        assert!(matches!(err, ObfsError::Unsupported(_)));
    }

    #[test]
    fn test_restart_required() {
        let current = RelaySettings::from_config(&config(TunnelMode::Client, "")).unwrap();
        assert!(current.restart_required(&current).is_empty());

        let mut cfg = config(TunnelMode::Client, "");
        cfg.listener.max_connections = 16;
        let next = RelaySettings::from_config(&cfg).unwrap();
        assert_eq!(current.restart_required(&next), ["listener.max_connections"]);

        cfg.listener.bind_address = "127.0.0.1:2080".into();
        let next = RelaySettings::from_config(&cfg).unwrap();
        assert_eq!(
            current.restart_required(&next),
            ["listener.bind_address", "listener.max_connections"]
        );
    }

    #[test]
    fn test_timeouts() {
        let mut cfg = config(TunnelMode::Client, "");
        cfg.timeouts.connect_secs = 3;
        cfg.timeouts.drain_secs = 7;
        let settings = RelaySettings::from_config(&cfg).unwrap();
        assert_eq!(settings.connect_timeout, Duration::from_secs(3));
        assert_eq!(settings.drain_timeout, Duration::from_secs(7));
    }
}
