//! Test fixtures for host service tests

use std::net::SocketAddr;
use tokio::sync::mpsc;

use shared::ClientId;

use crate::types::ConnectionEndpoint;

pub fn test_remote() -> SocketAddr {
    "127.0.0.1:40000".parse().unwrap()
}

/// Endpoint plus the receiving end of its outbound channel
pub fn create_test_endpoint() -> (ConnectionEndpoint, mpsc::UnboundedReceiver<Vec<u8>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ConnectionEndpoint::new(ClientId::new(), test_remote(), tx), rx)
}
