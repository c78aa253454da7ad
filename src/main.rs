//! obfs-tunnel
//!
//! Relays TCP connections through an HTTP-shaped disguise.
//!
//! ```text
//!  app ──plain──▶ [obfs-tunnel client] ══GET /%xx.. HTTP/1.1══▶ [obfs-tunnel server] ──plain──▶ service
//!      ◀─plain──                      ◀══HTTP/1.1 200 OK═════                      ◀─plain──
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio::sync::mpsc;

use obfs_tunnel::config::validation::validate_config;
use obfs_tunnel::config::watcher::ConfigWatcher;
use obfs_tunnel::config::{load_config, ConfigError, TunnelConfig, TunnelMode};
use obfs_tunnel::lifecycle::{shutdown_signal, Shutdown};
use obfs_tunnel::net::Listener;
use obfs_tunnel::observability::{logging, metrics};
use obfs_tunnel::Tunnel;

#[derive(Parser)]
#[command(name = "obfs-tunnel")]
#[command(about = "TCP tunnel disguised as HTTP traffic", long_about = None)]
struct Cli {
    /// TOML configuration file. Watched for changes when given.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override tunnel.mode
    #[arg(long)]
    mode: Option<TunnelMode>,

    /// Override listener.bind_address
    #[arg(short, long)]
    listen: Option<String>,

    /// Override tunnel.upstream
    #[arg(short, long)]
    upstream: Option<String>,

    /// Override tunnel.obfs ("" disables the disguise)
    #[arg(long)]
    obfs: Option<String>,
}

impl Cli {
    fn load(&self) -> Result<TunnelConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => TunnelConfig::default(),
        };

        if let Some(mode) = self.mode {
            config.tunnel.mode = mode;
        }
        if let Some(listen) = &self.listen {
            config.listener.bind_address = listen.clone();
        }
        if let Some(upstream) = &self.upstream {
            config.tunnel.upstream = upstream.clone();
        }
        if let Some(obfs) = &self.obfs {
            config.tunnel.obfs = obfs.clone();
        }

        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match cli.load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("obfs-tunnel: {}", e);
            return ExitCode::FAILURE;
        }
    };

    logging::init_logging(&config.observability);

    match run(cli, config).await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Tunnel failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, config: TunnelConfig) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        mode = %config.tunnel.mode,
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        "obfs-tunnel starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let tunnel = Tunnel::new(&config)?;
    let listener = Listener::bind(&config.listener).await?;

    // The watcher must outlive the tunnel; without a config file nothing reloads.
    let (_watcher, config_updates) = match &cli.config {
        Some(path) => {
            let (watcher, rx) = ConfigWatcher::new(path);
            (Some(watcher.run()?), rx)
        }
        None => {
            let (_tx, rx) = mpsc::unbounded_channel();
            (None, rx)
        }
    };

    let shutdown = Shutdown::new();
    let tunnel_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown.trigger();
    });

    tunnel.run(listener, config_updates, tunnel_shutdown).await?;
    Ok(())
}
