//! Client against a real host over loopback WebSockets

mod common;

use common::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use client::{ClientError, Connection, ConnectionState};
use shared::TimeoutPolicy;

type EchoClient = Connection<String, String>;

#[tokio::test]
async fn test_send_and_receive_in_order() {
    let (server, addr) = start_host().await;
    let echo = spawn_echo(server.clone());

    let mut connection: EchoClient = Connection::new(fast_config());
    connection.connect("127.0.0.1", addr.port(), true).await.unwrap();
    assert_eq!(connection.state(), ConnectionState::Open);

    for body in ["one", "two", "three"] {
        assert!(connection.send(&body.to_string()).unwrap().is_some());
    }

    let timeout = Duration::from_secs(2);
    assert_eq!(connection.receive(timeout).await.unwrap(), "one");
    assert_eq!(connection.receive(timeout).await.unwrap(), "two");
    assert_eq!(connection.receive(timeout).await.unwrap(), "three");

    echo.abort();
}

#[tokio::test]
async fn test_pipelined_requests_pair_by_correlation() {
    let (server, addr) = start_host().await;
    let echo = spawn_echo(server.clone());

    let mut connection: EchoClient = Connection::new(fast_config());
    connection.connect("127.0.0.1", addr.port(), false).await.unwrap();

    let timeout = Duration::from_secs(2);
    let alpha = "alpha".to_string();
    let beta = "beta".to_string();
    let (a, b) = tokio::join!(
        connection.request(&alpha, timeout),
        connection.request(&beta, timeout)
    );

    assert_eq!(a.unwrap(), "alpha");
    assert_eq!(b.unwrap(), "beta");
    assert_eq!(connection.pending_responses().await, 0);

    echo.abort();
}

#[tokio::test]
async fn test_handshake_fails_against_closed_port() {
    let port = closed_port().await;
    let config = fast_config().with_max_attempts(10);
    let mut connection: EchoClient = Connection::new(config);

    let result = connection.connect("127.0.0.1", port, false).await;

    assert!(matches!(result, Err(ClientError::HandshakeTimeout { .. })));
    assert!(result.unwrap_err().is_retryable());
    assert!(!connection.has_connection());
}

#[tokio::test]
async fn test_handshake_fails_on_wrong_path() {
    let (_server, addr) = start_host().await;
    let mut connection: EchoClient = Connection::new(fast_config().with_path("/elsewhere"));

    let result = connection.connect("127.0.0.1", addr.port(), false).await;

    assert!(matches!(result, Err(ClientError::HandshakeTimeout { .. })));
}

#[tokio::test]
async fn test_receive_timeout_drops_connection() {
    let (server, addr) = start_host().await;
    let mut connection: EchoClient = Connection::new(fast_config());
    connection.connect("127.0.0.1", addr.port(), false).await.unwrap();

    let timeouts = Arc::new(AtomicUsize::new(0));
    let counted = timeouts.clone();
    connection
        .set_timeout_callback(move || {
            counted.fetch_add(1, Ordering::SeqCst);
        })
        .await;

    connection.send(&"unanswered".to_string()).unwrap();
    let result = connection.receive(Duration::from_millis(100)).await;

    assert!(matches!(result, Err(ClientError::ReceiveTimeout { .. })));
    assert_eq!(timeouts.load(Ordering::SeqCst), 1);
    assert_eq!(connection.state(), ConnectionState::Closed);

    // The host sees the socket go away
    let mut gone = false;
    for _ in 0..200 {
        if server.client_count().await.unwrap() == 0 {
            gone = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(gone);
}

#[tokio::test]
async fn test_fail_call_policy_survives_slow_host() {
    let (server, addr) = start_host().await;
    let config = fast_config().with_timeout_policy(TimeoutPolicy::FailCall);
    let mut connection: EchoClient = Connection::new(config);
    connection.connect("127.0.0.1", addr.port(), false).await.unwrap();

    connection.send(&"slow".to_string()).unwrap();
    let result = connection.receive(Duration::from_millis(100)).await;
    assert!(matches!(result, Err(ClientError::ReceiveTimeout { .. })));
    assert!(connection.has_connection());

    // The host finally answers; the response is still delivered
    let echo = spawn_echo(server.clone());
    assert_eq!(
        connection.receive(Duration::from_secs(2)).await.unwrap(),
        "slow"
    );
    echo.abort();
}

#[tokio::test]
async fn test_host_shutdown_fires_closed_callback() {
    let (server, addr) = start_host().await;
    let mut connection: EchoClient = Connection::new(fast_config());
    connection.connect("127.0.0.1", addr.port(), false).await.unwrap();

    let closes = Arc::new(AtomicUsize::new(0));
    let counted = closes.clone();
    connection
        .set_closed_callback(move || {
            counted.fetch_add(1, Ordering::SeqCst);
        })
        .await;

    server.shutdown().await.unwrap();

    let mut fired = false;
    for _ in 0..200 {
        if closes.load(Ordering::SeqCst) == 1 {
            fired = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(fired);
    assert!(!connection.has_connection());
}
