//! Host-side data types

use chrono::{DateTime, Utc};
use std::net::SocketAddr;
use tokio::sync::mpsc;

use shared::{ClientId, CorrelationId};

/// A queued message tagged with the client it came from or goes to
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope<T> {
    pub client: ClientId,
    pub correlation: CorrelationId,
    pub message: T,
}

impl<T> Envelope<T> {
    pub fn new(client: ClientId, correlation: CorrelationId, message: T) -> Self {
        Self {
            client,
            correlation,
            message,
        }
    }
}

/// Registry entry for one connected socket
#[derive(Debug, Clone)]
pub struct ConnectionEndpoint {
    pub id: ClientId,
    pub remote: SocketAddr,
    pub sender: mpsc::UnboundedSender<Vec<u8>>,
    pub connected_at: DateTime<Utc>,
}

impl ConnectionEndpoint {
    pub fn new(id: ClientId, remote: SocketAddr, sender: mpsc::UnboundedSender<Vec<u8>>) -> Self {
        Self {
            id,
            remote,
            sender,
            connected_at: Utc::now(),
        }
    }

    pub fn info(&self) -> ClientInfo {
        ClientInfo {
            id: self.id,
            remote: self.remote,
            connected_at: self.connected_at,
        }
    }
}

/// Public view of a connected client
#[derive(Debug, Clone, PartialEq)]
pub struct ClientInfo {
    pub id: ClientId,
    pub remote: SocketAddr,
    pub connected_at: DateTime<Utc>,
}
