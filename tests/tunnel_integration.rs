//! End-to-end tests: app → client tunnel → server tunnel → backend.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use obfs_tunnel::config::TunnelMode;

mod common;

#[tokio::test]
async fn test_echo_through_disguised_tunnel() {
    let backend = common::start_echo_backend().await;
    let server =
        common::start_tunnel(common::tunnel_config(TunnelMode::Server, backend, "simple_http")).await;
    let client =
        common::start_tunnel(common::tunnel_config(TunnelMode::Client, server.addr, "simple_http"))
            .await;

    let mut app = TcpStream::connect(client.addr).await.unwrap();
    let big = vec![7u8; 10_000];

    for message in [&b"PINGPINGPINGPINGPING"[..], &b"short"[..], &big[..]] {
        app.write_all(message).await.unwrap();
        let mut echoed = vec![0u8; message.len()];
        tokio::time::timeout(Duration::from_secs(5), app.read_exact(&mut echoed))
            .await
            .expect("echo timed out")
            .unwrap();
        assert_eq!(echoed, message);
    }

    client.shutdown.trigger();
    server.shutdown.trigger();
}

#[tokio::test]
async fn test_wire_looks_like_http() {
    let (capture, mut received) =
        common::start_capture_backend(b"HTTP/1.1 200 OK\r\nServer: x\r\n\r\nhi").await;
    let client =
        common::start_tunnel(common::tunnel_config(TunnelMode::Client, capture, "simple_http")).await;

    let mut app = TcpStream::connect(client.addr).await.unwrap();
    app.write_all(b"PINGPINGPINGPINGPING").await.unwrap();

    let wire = tokio::time::timeout(Duration::from_secs(5), received.recv())
        .await
        .unwrap()
        .unwrap();
    let text = String::from_utf8_lossy(&wire);
    assert!(text.starts_with("GET /%"), "unexpected wire bytes: {}", text);
    assert!(text.contains(" HTTP/1.1\r\nHost: www.baidu.com:80\r\nUser-Agent: Mozilla/"));
    assert!(text.contains("\r\nConnection: keep-alive\r\n\r\n"));

    // The response header is stripped before the app sees anything.
    let mut reply = [0u8; 2];
    tokio::time::timeout(Duration::from_secs(5), app.read_exact(&mut reply))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&reply, b"hi");
}

#[tokio::test]
async fn test_passthrough_when_obfs_empty() {
    let (capture, mut received) = common::start_capture_backend(b"pong").await;
    let client = common::start_tunnel(common::tunnel_config(TunnelMode::Client, capture, "")).await;

    let mut app = TcpStream::connect(client.addr).await.unwrap();
    app.write_all(b"ping").await.unwrap();

    let wire = tokio::time::timeout(Duration::from_secs(5), received.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(wire, b"ping");

    let mut reply = [0u8; 4];
    app.read_exact(&mut reply).await.unwrap();
    assert_eq!(&reply, b"pong");
}

#[tokio::test]
async fn test_server_drops_undisguised_client() {
    let backend = common::start_echo_backend().await;
    let server =
        common::start_tunnel(common::tunnel_config(TunnelMode::Server, backend, "simple_http")).await;

    // Plain bytes, then EOF, never a header block.
    let mut raw = TcpStream::connect(server.addr).await.unwrap();
    raw.write_all(b"not http at all").await.unwrap();
    raw.shutdown().await.unwrap();

    let mut buf = Vec::new();
    let read = tokio::time::timeout(Duration::from_secs(5), raw.read_to_end(&mut buf)).await;
    assert!(read.is_ok(), "server should close the connection");
    assert!(buf.is_empty(), "nothing may be echoed without framing");
}

#[tokio::test]
async fn test_reload_switches_to_passthrough() {
    let (capture, mut received) = common::start_capture_backend(b"ok").await;
    let client =
        common::start_tunnel(common::tunnel_config(TunnelMode::Client, capture, "simple_http")).await;

    client
        .config_tx
        .send(common::tunnel_config(TunnelMode::Client, capture, ""))
        .unwrap();
    common::settle().await;

    let mut app = TcpStream::connect(client.addr).await.unwrap();
    app.write_all(b"plain").await.unwrap();

    let wire = tokio::time::timeout(Duration::from_secs(5), received.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(wire, b"plain");
}

#[tokio::test]
async fn test_shutdown_stops_accept_loop() {
    let backend = common::start_echo_backend().await;
    let client = common::start_tunnel(common::tunnel_config(TunnelMode::Client, backend, "")).await;

    client.shutdown.trigger();
    let result = tokio::time::timeout(Duration::from_secs(5), client.handle)
        .await
        .expect("tunnel did not stop")
        .unwrap();
    assert!(result.is_ok());
}
