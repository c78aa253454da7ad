//! Accept loop and per-connection relay.
//!
//! # Responsibilities
//! - Accept inbound connections under the listener's connection limit
//! - Dial the upstream with a connect deadline
//! - Put the disguise on the dialed side (client) or the accepted side (server)
//! - Pump bytes both ways until either side closes
//! - Swap settings on config reload; drain on shutdown

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tracing::Instrument;

use crate::config::{TunnelConfig, TunnelMode};
use crate::net::{ConnectionGuard, ConnectionTracker, Listener};
use crate::obfs::{BoxedStream, ObfsError, ObfsResult};
use crate::observability::metrics::{self, ErrorStage};
use crate::relay::settings::RelaySettings;

/// Errors that end a single relayed connection.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("connect to {upstream} failed: {source}")]
    Connect {
        upstream: String,
        #[source]
        source: io::Error,
    },

    #[error("connect to {upstream} timed out after {timeout:?}")]
    ConnectTimeout { upstream: String, timeout: Duration },

    #[error("wrap failed: {0}")]
    Wrap(#[from] ObfsError),

    #[error("relay failed: {0}")]
    Relay(#[source] io::Error),
}

impl RelayError {
    pub fn stage(&self) -> ErrorStage {
        match self {
            RelayError::Connect { .. } | RelayError::ConnectTimeout { .. } => ErrorStage::Connect,
            RelayError::Wrap(_) => ErrorStage::Wrap,
            RelayError::Relay(_) => ErrorStage::Relay,
        }
    }
}

/// A running tunnel endpoint.
pub struct Tunnel {
    settings: ArcSwap<RelaySettings>,
    tracker: ConnectionTracker,
}

impl Tunnel {
    /// Build a tunnel from a validated configuration.
    pub fn new(config: &TunnelConfig) -> ObfsResult<Self> {
        Ok(Self {
            settings: ArcSwap::from_pointee(RelaySettings::from_config(config)?),
            tracker: ConnectionTracker::new(),
        })
    }

    /// Settings that the next accepted connection will use.
    pub fn settings(&self) -> Arc<RelaySettings> {
        self.settings.load_full()
    }

    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }

    /// Swap in a reloaded configuration. In-flight connections keep theirs.
    pub fn apply_config(&self, config: &TunnelConfig) -> ObfsResult<()> {
        let next = RelaySettings::from_config(config)?;
        let current = self.settings.load();

        for field in current.restart_required(&next) {
            tracing::warn!(
                field,
                "Listener settings change needs a restart; keeping current listener"
            );
        }

        tracing::info!(
            mode = %next.mode,
            upstream = %next.upstream,
            obfs = next.obfs_name(),
            "Configuration reloaded"
        );
        self.settings.store(Arc::new(next));
        metrics::record_config_reload();
        Ok(())
    }

    /// Accept and relay until shutdown, then drain in-flight connections.
    pub async fn run(
        self,
        listener: Listener,
        mut config_updates: mpsc::UnboundedReceiver<TunnelConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> io::Result<()> {
        let settings = self.settings();
        tracing::info!(
            address = %listener.local_addr()?,
            mode = %settings.mode,
            upstream = %settings.upstream,
            obfs = settings.obfs_name(),
            "Tunnel starting"
        );

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer, permit)) => {
                        let settings = self.settings();
                        let guard = self.tracker.track();
                        let span = tracing::info_span!("conn", id = %guard.id(), peer = %peer);
                        tokio::spawn(
                            async move {
                                let _permit = permit;
                                handle_connection(stream, peer, settings, guard).await;
                            }
                            .instrument(span),
                        );
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Accept failed");
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                },
                Some(config) = config_updates.recv() => {
                    if let Err(e) = self.apply_config(&config) {
                        tracing::error!(error = %e, "Rejected reloaded configuration");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown requested, no longer accepting connections");
                    break;
                }
            }
        }

        drop(listener);
        self.drain().await;
        Ok(())
    }

    async fn drain(&self) {
        let timeout = self.settings().drain_timeout;
        let active = self.tracker.active_count();
        if active == 0 {
            return;
        }

        tracing::info!(active, ?timeout, "Draining connections");
        if tokio::time::timeout(timeout, self.tracker.wait_for_drain())
            .await
            .is_err()
        {
            tracing::warn!(
                remaining = self.tracker.active_count(),
                "Drain deadline passed; abandoning connections"
            );
        }
    }
}

async fn handle_connection(
    inbound: TcpStream,
    peer: SocketAddr,
    settings: Arc<RelaySettings>,
    guard: ConnectionGuard,
) {
    metrics::record_connection_opened(settings.mode.as_str());
    tracing::debug!(%peer, upstream = %settings.upstream, "Relaying connection");

    match relay(inbound, &settings).await {
        Ok((upstream_bytes, downstream_bytes)) => {
            metrics::record_bytes(upstream_bytes, downstream_bytes);
            tracing::debug!(upstream_bytes, downstream_bytes, "Connection finished");
        }
        Err(e) => {
            metrics::record_connection_error(e.stage());
            tracing::warn!(error = %e, stage = e.stage().as_str(), "Connection failed");
        }
    }

    metrics::record_connection_closed();
    drop(guard);
}

/// Relay one accepted connection. Returns bytes sent upstream and downstream.
pub async fn relay(inbound: TcpStream, settings: &RelaySettings) -> Result<(u64, u64), RelayError> {
    let upstream = connect_upstream(&settings.upstream, settings.connect_timeout).await?;
    if let Err(e) = inbound.set_nodelay(true) {
        tracing::debug!(error = %e, "Failed to set TCP_NODELAY on inbound");
    }
    if let Err(e) = upstream.set_nodelay(true) {
        tracing::debug!(error = %e, "Failed to set TCP_NODELAY on upstream");
    }

    let mut inbound: BoxedStream = Box::new(inbound);
    let mut upstream: BoxedStream = Box::new(upstream);

    if let Some(obfs) = &settings.obfuscator {
        match settings.mode {
            TunnelMode::Client => upstream = obfs.wrap(upstream)?,
            TunnelMode::Server => inbound = obfs.wrap(inbound)?,
        }
    }

    tokio::io::copy_bidirectional(&mut inbound, &mut upstream)
        .await
        .map_err(RelayError::Relay)
}

async fn connect_upstream(upstream: &str, timeout: Duration) -> Result<TcpStream, RelayError> {
    match tokio::time::timeout(timeout, TcpStream::connect(upstream)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(source)) => Err(RelayError::Connect {
            upstream: upstream.to_string(),
            source,
        }),
        Err(_) => Err(RelayError::ConnectTimeout {
            upstream: upstream.to_string(),
            timeout,
        }),
    }
}
