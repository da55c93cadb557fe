//! Per-socket connection task
//!
//! Completes the WebSocket handshake (rejecting any path but the configured
//! one), registers the client, then decodes inbound frames onto the request
//! queues while a companion task writes queued outbound bytes.

use futures_util::{SinkExt, Stream, StreamExt};
use serde::de::DeserializeOwned;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::accept_hdr_async;

use shared::{
    decode_frame, link_debug, link_error, link_info, link_trace, link_warn, ClientId, Component,
    ServerConfig,
};

use crate::state::HostState;
use crate::traits::ClientRegistry;
use crate::types::{ConnectionEndpoint, Envelope};

/// Bound on flushing the close frame once the socket is done
const OUTGOING_DRAIN: Duration = Duration::from_secs(1);

/// Why the inbound loop ended
#[derive(Debug)]
enum Ending {
    PeerClosed,
    Idle,
    Shutdown,
    Failed(String),
}

/// Serve one accepted TCP stream until it closes
pub async fn serve_socket<Req, Resp>(
    stream: TcpStream,
    remote: SocketAddr,
    state: Arc<HostState<Req, Resp>>,
    registry: Arc<dyn ClientRegistry>,
    config: Arc<ServerConfig>,
    mut shutdown: watch::Receiver<bool>,
) where
    Req: DeserializeOwned + Send + 'static,
    Resp: Send + 'static,
{
    let expected_path = config.path.as_str();
    let check_path = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        if request.uri().path() == expected_path {
            Ok(response)
        } else {
            let mut rejection = ErrorResponse::new(Some(format!("no endpoint at {}", request.uri().path())));
            *rejection.status_mut() = StatusCode::NOT_FOUND;
            Err(rejection)
        }
    };

    let socket = match accept_hdr_async(stream, check_path).await {
        Ok(socket) => socket,
        Err(e) => {
            link_warn!(Component::Host, "Handshake from {} rejected: {}", remote, e);
            return;
        }
    };

    let client_id = ClientId::new();
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();

    if let Err(e) = registry
        .register(ConnectionEndpoint::new(client_id, remote, tx))
        .await
    {
        link_error!(Component::Host, "Failed to register client {}: {}", client_id, e);
        return;
    }

    let (mut sender, mut receiver) = socket.split();

    // Outgoing messages; ends when the registry drops the client's sender
    let outgoing_task = tokio::spawn(async move {
        while let Some(bytes) = rx.recv().await {
            if let Err(e) = sender.send(Message::Binary(bytes)).await {
                link_warn!(Component::Host, "Failed to send to client {}: {}", client_id, e);
                return;
            }
        }
        let _ = sender.send(Message::Close(None)).await;
        let _ = sender.close().await;
        link_debug!(Component::Host, "Outgoing task ended for client {}", client_id);
    });

    let ending = loop {
        let next = tokio::select! {
            next = next_message(&mut receiver, config.idle_timeout) => next,
            _ = shutdown.changed() => break Ending::Shutdown,
        };

        let message = match next {
            Ok(Some(Ok(message))) => message,
            Ok(Some(Err(e))) => break Ending::Failed(e.to_string()),
            Ok(None) => break Ending::PeerClosed,
            Err(_) => break Ending::Idle,
        };

        match message {
            Message::Binary(data) => enqueue(&state, client_id, &data, config.max_frame_bytes).await,
            Message::Text(text) => enqueue(&state, client_id, text.as_bytes(), config.max_frame_bytes).await,
            Message::Close(_) => break Ending::PeerClosed,
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
        }
    };

    match &ending {
        Ending::Idle => link_info!(
            Component::Host,
            "⏱️ Client {} idle for {:?}; closing",
            client_id,
            config.idle_timeout
        ),
        Ending::Failed(reason) => link_warn!(Component::Host, "Socket error for client {}: {}", client_id, reason),
        other => link_debug!(Component::Host, "Client {} socket ended: {:?}", client_id, other),
    }

    if let Err(e) = registry.unregister(client_id).await {
        link_error!(Component::Host, "Failed to unregister client {}: {}", client_id, e);
    }

    if config.purge_on_disconnect {
        let (requests, responses) = state.purge_client(client_id).await;
        if requests + responses > 0 {
            link_info!(
                Component::Host,
                "🗑️ Purged {} requests and {} responses for client {}",
                requests,
                responses,
                client_id
            );
        }
    }

    let mut outgoing_task = outgoing_task;
    if tokio::time::timeout(OUTGOING_DRAIN, &mut outgoing_task).await.is_err() {
        outgoing_task.abort();
    }
}

async fn next_message<S>(
    receiver: &mut S,
    idle_timeout: Option<Duration>,
) -> Result<Option<S::Item>, tokio::time::error::Elapsed>
where
    S: Stream + Unpin,
{
    match idle_timeout {
        Some(idle) => tokio::time::timeout(idle, receiver.next()).await,
        None => Ok(receiver.next().await),
    }
}

async fn enqueue<Req, Resp>(state: &HostState<Req, Resp>, client_id: ClientId, data: &[u8], limit: usize)
where
    Req: DeserializeOwned,
{
    match decode_frame::<Req>(data, limit) {
        Ok(frame) => {
            let (correlation, message) = frame.into_parts();
            state
                .queue_request(Envelope::new(client_id, correlation, message))
                .await;
            link_trace!(
                Component::Host,
                "📨 Request {} queued from client {} ({} bytes)",
                correlation,
                client_id,
                data.len()
            );
        }
        Err(e) => {
            link_warn!(
                Component::Host,
                "Dropping invalid request from client {} ({} bytes): {}",
                client_id,
                data.len(),
                e
            );
        }
    }
}
