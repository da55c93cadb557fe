//! Common test utilities for client end-to-end tests

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use host::{EchoHandler, HostError, Server};
use shared::{ConnectConfig, ServerConfig};

pub type EchoServer = Arc<Server<String, String>>;

/// Connection settings that fail fast
pub fn fast_config() -> ConnectConfig {
    ConnectConfig::default()
        .with_poll_interval(Duration::from_millis(20))
        .with_max_attempts(50)
        .with_auto_reconnect(false)
}

/// Host on an ephemeral loopback port, not answering anything yet
pub async fn start_host() -> (EchoServer, SocketAddr) {
    let server = Arc::new(Server::new().unwrap());
    let addr = server
        .listen(ServerConfig::default().with_port(0))
        .await
        .unwrap();
    (server, addr)
}

/// Answer every request with its own payload until the task is aborted
pub fn spawn_echo(server: EchoServer) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match server.handle_next(&EchoHandler, Duration::from_millis(100)).await {
                Ok(_) | Err(HostError::RequestTimeout { .. }) | Err(HostError::ClientNotFound { .. }) => {}
                Err(_) => return,
            }
        }
    })
}

/// A loopback port nothing listens on
pub async fn closed_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}
