//! End-to-end relay behavior through a running proxy.


use std::time::Duration;

use harness::{reserve_port, roundtrip, wait_for, EchoUpstream, ProxyHandle};
use portway::config::{AppConfig, ProxyConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

fn single_app(name: &str, port: u16, upstream: &EchoUpstream) -> ProxyConfig {
    ProxyConfig {
        apps: vec![AppConfig::new(name)
            .with_frontend(port)
            .with_backend(&upstream.address())],
    }
}

/// Deterministic pseudo-random payload.
fn payload(len: usize) -> Vec<u8> {
    let mut state = 0x243f_6a88_85a3_08d3u64;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state as u8
        })
        .collect()
}

#[tokio::test]
async fn ping_pong_roundtrip() {
    let upstream = EchoUpstream::spawn().await;
    let port = reserve_port().await;
    let proxy = ProxyHandle::spawn(single_app("web", port, &upstream)).await;
    assert!(proxy.wait_backends_active(Duration::from_secs(2)).await);

    let echoed = roundtrip(port, b"ping").await.unwrap();
    assert_eq!(echoed, b"ping");
    assert_eq!(upstream.accepted(), 1);

    proxy.shutdown().await;
}

#[tokio::test]
async fn client_close_closes_upstream_promptly() {
    let upstream = EchoUpstream::spawn().await;
    let port = reserve_port().await;
    let proxy = ProxyHandle::spawn(single_app("web", port, &upstream)).await;
    assert!(proxy.wait_backends_active(Duration::from_secs(2)).await);

    let echoed = roundtrip(port, b"ping").await.unwrap();
    assert_eq!(echoed, b"ping");

    // roundtrip() dropped the client; the proxy must tear the upstream side
    // down right behind it.
    assert!(
        wait_for(|| upstream.finished() == 1, Duration::from_millis(500)).await,
        "upstream connection was not closed after client close"
    );

    proxy.shutdown().await;
}

#[tokio::test]
async fn byte_exact_large_transfer() {
    let upstream = EchoUpstream::spawn().await;
    let port = reserve_port().await;
    let proxy = ProxyHandle::spawn(single_app("web", port, &upstream)).await;
    assert!(proxy.wait_backends_active(Duration::from_secs(2)).await);

    let sent = payload(1024 * 1024);
    let stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let (mut read_half, mut write_half) = stream.into_split();

    // Write and read concurrently so neither side stalls on full buffers.
    let to_send = sent.clone();
    let writer = tokio::spawn(async move {
        write_half.write_all(&to_send).await.unwrap();
        write_half.flush().await.unwrap();
    });

    let mut received = vec![0u8; sent.len()];
    read_half.read_exact(&mut received).await.unwrap();
    writer.await.unwrap();

    assert_eq!(received, sent, "relayed bytes must match exactly, in order");

    proxy.shutdown().await;
}

#[tokio::test]
async fn teardown_clears_both_manager_maps() {
    let upstream = EchoUpstream::spawn().await;
    let port = reserve_port().await;
    let proxy = ProxyHandle::spawn(single_app("web", port, &upstream)).await;
    assert!(proxy.wait_backends_active(Duration::from_secs(2)).await);

    let echoed = roundtrip(port, b"hello").await.unwrap();
    assert_eq!(echoed, b"hello");

    let app = &proxy.supervisor.applications()[0];
    let frontend = app.frontends()[0].clone();
    let backend = app.backends()[0].clone();

    assert!(
        wait_for(
            || frontend.connection_count() == 0 && backend.connection_count() == 0,
            Duration::from_secs(1),
        )
        .await,
        "handles still tracked after pair teardown"
    );

    proxy.shutdown().await;
}

#[tokio::test]
async fn upstream_close_also_tears_down_pair() {
    let upstream = EchoUpstream::spawn().await;
    let port = reserve_port().await;
    let proxy = ProxyHandle::spawn(single_app("web", port, &upstream)).await;
    assert!(proxy.wait_backends_active(Duration::from_secs(2)).await);

    let mut client = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    client.write_all(b"hi").await.unwrap();
    let mut buf = [0u8; 2];
    client.read_exact(&mut buf).await.unwrap();

    // Kill the whole upstream; the proxy must propagate the close to the
    // client.
    drop(upstream);

    let n = tokio::time::timeout(Duration::from_secs(2), client.read(&mut buf))
        .await
        .expect("client read did not unblock after upstream close")
        .unwrap();
    assert_eq!(n, 0, "client should observe EOF");

    proxy.shutdown().await;
}

#[tokio::test]
async fn client_without_healthy_upstream_is_closed() {
    // The only backend is a dead address: never probed active, so accepts
    // fail with no backend and the client sees an immediate close.
    let port = reserve_port().await;
    let dead_port = reserve_port().await;
    let config = ProxyConfig {
        apps: vec![AppConfig::new("web")
            .with_frontend(port)
            .with_backend(&format!("127.0.0.1:{dead_port}"))],
    };
    let proxy = ProxyHandle::spawn(config).await;

    let mut client = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let mut buf = [0u8; 1];
    let n = tokio::time::timeout(Duration::from_secs(2), client.read(&mut buf))
        .await
        .expect("client read did not unblock")
        .unwrap_or(0);
    assert_eq!(n, 0, "client should be closed when no upstream is available");

    proxy.shutdown().await;
}
