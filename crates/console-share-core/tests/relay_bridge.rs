#![cfg(unix)]
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Integration tests use unwrap for brevity

//! Integration tests for the TCP relay bridge.
//!
//! Each test runs a real TCP listener in front of a Unix echo server (or a
//! child process) and drives it with plain TCP clients.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UnixListener};

use console_share_core::relay::{CommandConnector, Connector, RelayBridge, UnixConnector};
use console_share_core::{Error, SocketAddress};

const IO_TIMEOUT: Duration = Duration::from_secs(5);

/// Serve a Unix socket at `path` that echoes every byte back.
fn spawn_unix_echo(path: &Path) -> SocketAddress {
    let listener = UnixListener::bind(path).unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let (mut rd, mut wr) = stream.split();
                let _ = tokio::io::copy(&mut rd, &mut wr).await;
            });
        }
    });
    SocketAddress::new(path)
}

/// Bind a bridge on an ephemeral loopback port and serve it in the background.
async fn start_bridge<C: Connector>(connector: C) -> SocketAddr {
    let bridge = RelayBridge::bind("127.0.0.1:0".parse().unwrap(), connector)
        .await
        .unwrap()
        .with_linger(Duration::from_millis(100));
    let addr = bridge.local_addr().unwrap();
    tokio::spawn(bridge.serve());
    addr
}

async fn echo_round(stream: &mut TcpStream, msg: &[u8]) -> Vec<u8> {
    stream.write_all(msg).await.unwrap();
    let mut buf = vec![0u8; msg.len()];
    tokio::time::timeout(IO_TIMEOUT, stream.read_exact(&mut buf))
        .await
        .unwrap()
        .unwrap();
    buf
}

// =========================================================================
// Session isolation
// =========================================================================

#[tokio::test]
async fn five_concurrent_sessions_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let target = spawn_unix_echo(&dir.path().join("echo.sock"));
    let addr = start_bridge(UnixConnector::new(target)).await;

    let mut clients = Vec::new();
    for id in 0..5 {
        clients.push(tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            for round in 0..20 {
                let msg = format!("client-{id}-round-{round};");
                let echoed = echo_round(&mut stream, msg.as_bytes()).await;
                assert_eq!(echoed, msg.as_bytes(), "client {id} got foreign bytes");
            }
        }));
    }
    for client in clients {
        client.await.unwrap();
    }
}

#[tokio::test]
async fn closing_one_session_leaves_others_running() {
    let dir = tempfile::tempdir().unwrap();
    let target = spawn_unix_echo(&dir.path().join("echo.sock"));
    let addr = start_bridge(UnixConnector::new(target)).await;

    let mut first = TcpStream::connect(addr).await.unwrap();
    let mut second = TcpStream::connect(addr).await.unwrap();
    assert_eq!(echo_round(&mut first, b"one").await, b"one");
    assert_eq!(echo_round(&mut second, b"two").await, b"two");

    drop(first);
    tokio::time::sleep(Duration::from_millis(200)).await;

    for round in 0..5 {
        let msg = format!("still-alive-{round}");
        assert_eq!(echo_round(&mut second, msg.as_bytes()).await, msg.as_bytes());
    }

    // The listener also keeps accepting after a session ended.
    let mut third = TcpStream::connect(addr).await.unwrap();
    assert_eq!(echo_round(&mut third, b"three").await, b"three");
}

#[tokio::test]
async fn large_transfer_is_byte_accurate() {
    let dir = tempfile::tempdir().unwrap();
    let target = spawn_unix_echo(&dir.path().join("echo.sock"));
    let addr = start_bridge(UnixConnector::new(target)).await;

    let payload: Vec<u8> = (0..256 * 1024).map(|i| (i % 251) as u8).collect();
    let stream = TcpStream::connect(addr).await.unwrap();
    let (mut rd, mut wr) = stream.into_split();

    let expected = payload.clone();
    let writer = tokio::spawn(async move {
        wr.write_all(&payload).await.unwrap();
        wr
    });
    let mut received = vec![0u8; expected.len()];
    tokio::time::timeout(IO_TIMEOUT, rd.read_exact(&mut received))
        .await
        .unwrap()
        .unwrap();
    let _wr = writer.await.unwrap();
    assert_eq!(received, expected);
}

// =========================================================================
// Upstream failures
// =========================================================================

#[tokio::test]
async fn unreachable_target_closes_client_and_keeps_listening() {
    let dir = tempfile::tempdir().unwrap();
    let socket_path = dir.path().join("late.sock");
    let addr = start_bridge(UnixConnector::new(SocketAddress::new(&socket_path))).await;

    for _ in 0..2 {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut buf = [0u8; 8];
        let read = tokio::time::timeout(IO_TIMEOUT, stream.read(&mut buf))
            .await
            .expect("client should be closed promptly");
        assert!(matches!(read, Ok(0) | Err(_)), "expected EOF, got {read:?}");
    }

    // Once the socket shows up, new clients are relayed.
    let _target = spawn_unix_echo(&socket_path);
    let mut stream = TcpStream::connect(addr).await.unwrap();
    assert_eq!(echo_round(&mut stream, b"late").await, b"late");
}

#[tokio::test]
async fn bind_failure_is_reported() {
    let occupied = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = occupied.local_addr().unwrap();

    let result = RelayBridge::bind(addr, CommandConnector::new("cat")).await;
    match result {
        Err(Error::Bind { addr: failed, .. }) => assert_eq!(failed, addr),
        Err(other) => panic!("expected bind error, got {other}"),
        Ok(_) => panic!("binding an occupied port should fail"),
    }
}

#[tokio::test]
async fn bind_in_range_skips_taken_ports() {
    let occupied = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let taken = occupied.local_addr().unwrap().port();
    if taken > u16::MAX - 64 {
        return;
    }

    let bridge = RelayBridge::bind_in_range(
        "127.0.0.1".parse().unwrap(),
        taken,
        64,
        CommandConnector::new("cat"),
    )
    .await
    .unwrap();
    let port = bridge.local_addr().unwrap().port();
    assert_ne!(port, taken);
    assert!(port > taken && port < taken + 64);
}

// =========================================================================
// Process-backed sessions
// =========================================================================

#[tokio::test]
async fn command_connector_relays_to_child_process() {
    let addr = start_bridge(CommandConnector::new("cat")).await;

    let mut first = TcpStream::connect(addr).await.unwrap();
    let mut second = TcpStream::connect(addr).await.unwrap();
    assert_eq!(echo_round(&mut first, b"hello shell\n").await, b"hello shell\n");
    assert_eq!(echo_round(&mut second, b"other\n").await, b"other\n");
}
