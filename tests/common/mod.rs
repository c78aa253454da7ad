//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use obfs_tunnel::config::{TunnelConfig, TunnelMode};
use obfs_tunnel::net::Listener;
use obfs_tunnel::{Shutdown, Tunnel};

/// Start a backend that echoes every byte back until the peer closes.
#[allow(dead_code)]
pub async fn start_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                loop {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if socket.write_all(&buf[..n]).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }
    });

    addr
}

/// Start a backend that reports the first bytes it receives and answers
/// with `reply`.
#[allow(dead_code)]
pub async fn start_capture_backend(
    reply: &'static [u8],
) -> (SocketAddr, mpsc::UnboundedReceiver<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut buf = vec![0u8; 16 * 1024];
                if let Ok(n) = socket.read(&mut buf).await {
                    let _ = tx.send(buf[..n].to_vec());
                    let _ = socket.write_all(reply).await;
                }
                // Hold the socket open until the peer goes away.
                let _ = socket.read(&mut buf).await;
            });
        }
    });

    (addr, rx)
}

/// A tunnel endpoint running in the background.
#[allow(dead_code)]
pub struct RunningTunnel {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub config_tx: mpsc::UnboundedSender<TunnelConfig>,
    pub handle: tokio::task::JoinHandle<std::io::Result<()>>,
}

pub fn tunnel_config(mode: TunnelMode, upstream: SocketAddr, obfs: &str) -> TunnelConfig {
    let mut config = TunnelConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.tunnel.mode = mode;
    config.tunnel.upstream = upstream.to_string();
    config.tunnel.obfs = obfs.into();
    config.timeouts.drain_secs = 1;
    config
}

/// Bind and run a tunnel with the given configuration.
pub async fn start_tunnel(config: TunnelConfig) -> RunningTunnel {
    let tunnel = Tunnel::new(&config).unwrap();
    let listener = Listener::bind(&config.listener).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let shutdown_rx = shutdown.subscribe();
    let (config_tx, config_rx) = mpsc::unbounded_channel();

    let handle = tokio::spawn(tunnel.run(listener, config_rx, shutdown_rx));

    RunningTunnel {
        addr,
        shutdown,
        config_tx,
        handle,
    }
}

/// Give a background task time to pick up a message.
#[allow(dead_code)]
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}
