//! Multi-client host
//!
//! The server accepts any number of WebSocket clients and exposes their
//! traffic as queues: inbound requests are decoded by per-socket tasks and
//! queued with the client they came from; responses are queued by the
//! application and written back to the client recorded in their envelope.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use shared::{
    encode_frame, link_debug, link_error, link_info, link_warn, ClientId, Component, CorrelationId,
    Frame, ServerConfig, DEFAULT_MAX_FRAME_BYTES,
};

use crate::error::{HostError, HostResult};
use crate::services::socket_handler::serve_socket;
use crate::services::RealClientRegistry;
use crate::state::HostState;
use crate::traits::{ClientRegistry, RequestHandler};
use crate::types::{ClientInfo, Envelope};

enum Listener {
    Idle,
    Listening {
        local_addr: SocketAddr,
        shutdown: watch::Sender<bool>,
        accept_task: JoinHandle<()>,
    },
    /// Bind failed; the instance never listens again
    Failed,
    Stopped,
}

/// WebSocket host with queued, poll-driven access to client traffic
pub struct Server<Req, Resp> {
    state: Arc<HostState<Req, Resp>>,
    registry: Arc<dyn ClientRegistry>,
    listener: Mutex<Listener>,
    frame_limit: AtomicUsize,
}

impl<Req, Resp> Server<Req, Resp> {
    /// Create a server with its own registry task. Needs a tokio runtime.
    pub fn new() -> HostResult<Self> {
        let registry = RealClientRegistry::spawn()?;
        Ok(Self::with_registry(Arc::new(registry)))
    }

    pub fn with_registry(registry: Arc<dyn ClientRegistry>) -> Self {
        Self {
            state: Arc::new(HostState::new()),
            registry,
            listener: Mutex::new(Listener::Idle),
            frame_limit: AtomicUsize::new(DEFAULT_MAX_FRAME_BYTES),
        }
    }

    /// Address the listener is bound to, once listening
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        match &*self.listener.lock().await {
            Listener::Listening { local_addr, .. } => Some(*local_addr),
            _ => None,
        }
    }

    pub async fn is_listening(&self) -> bool {
        matches!(&*self.listener.lock().await, Listener::Listening { .. })
    }

    pub async fn clients(&self) -> HostResult<Vec<ClientInfo>> {
        self.registry.clients().await
    }

    pub async fn client_count(&self) -> HostResult<usize> {
        self.registry.client_count().await
    }

    pub async fn queue_request(&self, envelope: Envelope<Req>) {
        self.state.queue_request(envelope).await;
    }

    pub async fn queue_response(&self, client: ClientId, correlation: CorrelationId, response: Resp) {
        self.state
            .responses
            .push(Envelope::new(client, correlation, response))
            .await;
    }

    pub async fn has_request(&self) -> bool {
        !self.state.requests.is_empty().await
    }

    pub async fn has_request_from(&self, client: ClientId) -> bool {
        self.state.requests.has_from(client).await
    }

    pub async fn has_response(&self) -> bool {
        !self.state.responses.is_empty().await
    }

    pub async fn pending_requests(&self) -> usize {
        self.state.requests.len().await
    }

    pub async fn pending_responses(&self) -> usize {
        self.state.responses.len().await
    }

    /// Oldest request from any client
    pub async fn pop_request(&self) -> Option<Envelope<Req>> {
        self.state.requests.pop().await
    }

    /// Oldest request from `client`; other clients keep their order
    pub async fn pop_request_from(&self, client: ClientId) -> Option<Envelope<Req>> {
        self.state.requests.pop_from(client).await
    }

    /// Wait up to `timeout` for the next request
    pub async fn next_request(&self, timeout: Duration) -> HostResult<Envelope<Req>> {
        tokio::time::timeout(timeout, self.state.next_request())
            .await
            .map_err(|_| HostError::RequestTimeout { timeout })
    }

    /// Stop accepting and close every client socket. Queues are left as they are.
    pub async fn shutdown(&self) -> HostResult<()> {
        let mut listener = self.listener.lock().await;
        match std::mem::replace(&mut *listener, Listener::Stopped) {
            Listener::Listening {
                local_addr,
                shutdown,
                accept_task,
            } => {
                let _ = shutdown.send(true);
                let _ = accept_task.await;
                let closed = self.registry.close_all().await?;
                link_info!(
                    Component::Host,
                    "🛑 Server on {} stopped ({} clients closed)",
                    local_addr,
                    closed
                );
                Ok(())
            }
            other => {
                *listener = other;
                Ok(())
            }
        }
    }

    async fn write_to<T: Serialize>(
        &self,
        client: ClientId,
        correlation: CorrelationId,
        message: &T,
    ) -> HostResult<()> {
        let bytes = encode_frame(
            &Frame::new(correlation, message),
            self.frame_limit.load(Ordering::Relaxed),
        )?;
        let sender = self
            .registry
            .sender_for(client)
            .await?
            .ok_or(HostError::ClientNotFound { client_id: client })?;
        sender
            .send(bytes)
            .map_err(|_| HostError::ClientNotFound { client_id: client })
    }
}

impl<Req: Clone, Resp: Clone> Server<Req, Resp> {
    pub async fn peek_request(&self) -> Option<Envelope<Req>> {
        self.state.requests.peek().await
    }

    pub async fn peek_response(&self) -> Option<Envelope<Resp>> {
        self.state.responses.peek().await
    }
}

impl<Req, Resp> Server<Req, Resp>
where
    Req: DeserializeOwned + Send + 'static,
    Resp: Send + 'static,
{
    /// Bind and start accepting clients.
    ///
    /// Fails if the server is already listening. A failed bind is terminal:
    /// the instance refuses every later `listen`.
    pub async fn listen(&self, config: ServerConfig) -> HostResult<SocketAddr> {
        let mut listener = self.listener.lock().await;
        match &*listener {
            Listener::Listening { local_addr, .. } => {
                link_error!(Component::Host, "Server already listening on {}", local_addr);
                return Err(HostError::AlreadyListening { addr: *local_addr });
            }
            Listener::Failed | Listener::Stopped => return Err(HostError::ListenerUnavailable),
            Listener::Idle => {}
        }

        let address = SocketAddr::new(config.bind_address, config.port);
        let bound = match TcpListener::bind(address).await {
            Ok(tcp) => tcp.local_addr().map(|local_addr| (tcp, local_addr)),
            Err(e) => Err(e),
        };
        let (tcp, local_addr) = match bound {
            Ok(bound) => bound,
            Err(e) => {
                *listener = Listener::Failed;
                link_error!(Component::Host, "❌ Failed to start server on {}: {}", address, e);
                return Err(HostError::listen_failed(address.to_string(), e.to_string()));
            }
        };

        self.frame_limit.store(config.max_frame_bytes, Ordering::Relaxed);
        let path = config.path.clone();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let accept_task = tokio::spawn(accept_loop(
            tcp,
            self.state.clone(),
            self.registry.clone(),
            Arc::new(config),
            shutdown_rx,
        ));

        *listener = Listener::Listening {
            local_addr,
            shutdown: shutdown_tx,
            accept_task,
        };
        link_info!(Component::Host, "🚀 Server listening on ws://{}{}", local_addr, path);
        Ok(local_addr)
    }
}

impl<Req, Resp: Serialize> Server<Req, Resp> {
    /// Pop the oldest response (for `target` when given) and write it to the
    /// client recorded in its envelope.
    ///
    /// Returns the client written to, or `None` when nothing was queued. A
    /// response for a client that has gone away is dropped with an error.
    pub async fn send_response(&self, target: Option<ClientId>) -> HostResult<Option<ClientId>> {
        let envelope = match target {
            Some(client) => self.state.responses.pop_from(client).await,
            None => self.state.responses.pop().await,
        };
        let Some(envelope) = envelope else {
            return Ok(None);
        };

        self.write_to(envelope.client, envelope.correlation, &envelope.message)
            .await?;
        link_debug!(
            Component::Host,
            "📤 Response {} sent to client {}",
            envelope.correlation,
            envelope.client
        );
        Ok(Some(envelope.client))
    }
}

impl<Req: Serialize, Resp> Server<Req, Resp> {
    /// Pop the oldest request and relay it to client `to`, keeping its
    /// correlation id. Returns the client the request came from.
    pub async fn forward_request(&self, to: ClientId) -> HostResult<Option<ClientId>> {
        let Some(envelope) = self.state.requests.pop().await else {
            return Ok(None);
        };

        self.write_to(to, envelope.correlation, &envelope.message).await?;
        link_debug!(
            Component::Host,
            "📤 Request {} from client {} relayed to client {}",
            envelope.correlation,
            envelope.client,
            to
        );
        Ok(Some(envelope.client))
    }
}

impl<Req, Resp> Server<Req, Resp>
where
    Req: Send + Sync + 'static,
    Resp: Serialize + Send + Sync + 'static,
{
    /// Wait for one request, answer it with `handler` and send the response
    pub async fn handle_next<H>(&self, handler: &H, timeout: Duration) -> HostResult<ClientId>
    where
        H: RequestHandler<Req, Resp> + ?Sized,
    {
        let Envelope {
            client,
            correlation,
            message,
        } = self.next_request(timeout).await?;

        let response = handler.handle(client, message).await?;
        self.queue_response(client, correlation, response).await;
        self.send_response(Some(client)).await?;
        Ok(client)
    }
}

async fn accept_loop<Req, Resp>(
    tcp: TcpListener,
    state: Arc<HostState<Req, Resp>>,
    registry: Arc<dyn ClientRegistry>,
    config: Arc<ServerConfig>,
    mut shutdown: watch::Receiver<bool>,
) where
    Req: DeserializeOwned + Send + 'static,
    Resp: Send + 'static,
{
    loop {
        tokio::select! {
            accepted = tcp.accept() => match accepted {
                Ok((stream, remote)) => {
                    link_debug!(Component::Host, "🔗 TCP connection from {}", remote);
                    tokio::spawn(serve_socket(
                        stream,
                        remote,
                        state.clone(),
                        registry.clone(),
                        config.clone(),
                        shutdown.clone(),
                    ));
                }
                Err(e) => link_warn!(Component::Host, "Accept failed: {}", e),
            },
            _ = shutdown.changed() => break,
        }
    }

    link_debug!(Component::Host, "Accept loop stopped");
}
