//! Service trait definitions for dependency injection
//!
//! The client registry and the request handler are the host's seams; both
//! are mockable for tests.

use async_trait::async_trait;
use tokio::sync::mpsc;

use shared::ClientId;

use crate::error::HostResult;
use crate::types::{ClientInfo, ConnectionEndpoint};

/// Set of sockets currently connected to the host
#[mockall::automock]
#[async_trait]
pub trait ClientRegistry: Send + Sync {
    /// Record a newly opened socket
    async fn register(&self, endpoint: ConnectionEndpoint) -> HostResult<()>;

    /// Forget a socket; false when it was not registered
    async fn unregister(&self, client_id: ClientId) -> HostResult<bool>;

    /// Outbound channel for a connected client
    async fn sender_for(&self, client_id: ClientId) -> HostResult<Option<mpsc::UnboundedSender<Vec<u8>>>>;

    /// Connected clients in connection order
    async fn clients(&self) -> HostResult<Vec<ClientInfo>>;

    async fn client_count(&self) -> HostResult<usize>;

    /// Drop every outbound channel, closing all sockets; returns how many were open
    async fn close_all(&self) -> HostResult<usize>;
}

/// Application logic turning one request into one response
#[mockall::automock]
#[async_trait]
pub trait RequestHandler<Req: Send + Sync + 'static, Resp: Send + Sync + 'static>: Send + Sync {
    async fn handle(&self, client: ClientId, request: Req) -> HostResult<Resp>;
}
