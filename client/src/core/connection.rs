//! Client side of the engine link
//!
//! A `Connection` turns the transport's asynchronous message stream into
//! request/response calls. Inbound messages are decoded by a pump task and
//! either handed to the `request` call waiting on their correlation id or
//! queued on a FIFO that `receive` drains.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use url::Url;

use shared::{
    decode_frame, encode_frame, link_debug, link_info, link_trace, link_warn, Component,
    ConnectConfig, CorrelationCounter, CorrelationId, Frame, TimeoutPolicy,
};

use crate::error::{ClientError, ClientResult};
use crate::services::WebSocketTransport;
use crate::state::{Callback, ConnectionState, Delivery, LinkState};
use crate::traits::{ReadyState, Transport, TransportEvent};

/// Per-message logging that follows the connection's verbose flag
macro_rules! chatter {
    ($link:expr, $($arg:tt)*) => {
        if $link.is_verbose() {
            link_info!(Component::Client, $($arg)*);
        } else {
            link_trace!(Component::Client, $($arg)*);
        }
    };
}

/// Build `ws://{address}:{port}{path}`, bracketing IPv6 literals
pub fn endpoint_url(address: &str, port: u16, path: &str) -> ClientResult<Url> {
    let host = match address.parse::<IpAddr>() {
        Ok(IpAddr::V6(v6)) => format!("[{v6}]"),
        _ => address.to_string(),
    };
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };

    let url = Url::parse(&format!("ws://{host}:{port}{path}"))
        .map_err(|e| ClientError::invalid_endpoint(format!("{address}:{port}{path}: {e}")))?;

    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err(ClientError::invalid_endpoint(format!("missing host in {url}"))),
    }
}

/// Request/response client over a message transport
pub struct Connection<Req, Resp, T: Transport = WebSocketTransport> {
    transport: T,
    config: ConnectConfig,
    link: Arc<LinkState<Resp>>,
    counter: CorrelationCounter,
    pump: Option<JoinHandle<()>>,
    started: bool,
    _request: PhantomData<fn(Req)>,
}

impl<Req, Resp> Connection<Req, Resp, WebSocketTransport> {
    /// Create a WebSocket-backed connection
    pub fn new(config: ConnectConfig) -> Self {
        let transport = WebSocketTransport::new(&config);
        Self::with_transport(transport, config)
    }
}

impl<Req, Resp, T: Transport> Connection<Req, Resp, T> {
    /// Create a connection over an arbitrary transport
    pub fn with_transport(transport: T, config: ConnectConfig) -> Self {
        Self {
            transport,
            config,
            link: Arc::new(LinkState::new()),
            counter: CorrelationCounter::new(),
            pump: None,
            started: false,
            _request: PhantomData,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn config(&self) -> &ConnectConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        if self.started {
            self.transport.ready_state().into()
        } else {
            ConnectionState::Idle
        }
    }

    /// True iff the transport is open
    pub fn has_connection(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Non-blocking check for a queued response
    pub async fn poll_response(&self) -> bool {
        self.link.queued().await > 0
    }

    /// Number of queued, unread responses
    pub async fn pending_responses(&self) -> usize {
        self.link.queued().await
    }

    /// Number of correlated requests still waiting for their response
    pub async fn outstanding_requests(&self) -> usize {
        self.link.outstanding().await
    }

    /// Called once per receive timeout
    pub async fn set_timeout_callback<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let callback: Callback = Arc::new(callback);
        self.link.set_timeout_callback(Some(callback)).await;
    }

    /// Called when the socket closes
    pub async fn set_closed_callback<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let callback: Callback = Arc::new(callback);
        self.link.set_closed_callback(Some(callback)).await;
    }

    pub async fn clear_callbacks(&self) {
        self.link.set_timeout_callback(None).await;
        self.link.set_closed_callback(None).await;
    }

    /// Stop the transport unless it is already closing or closed
    pub fn disconnect(&self) {
        match self.state() {
            ConnectionState::Idle | ConnectionState::Closing | ConnectionState::Closed => {}
            state => {
                link_debug!(Component::Client, "Disconnecting ({})", state);
                self.transport.stop();
            }
        }
    }

    /// Apply the configured timeout policy
    async fn handle_timeout(&self, timeout: Duration) {
        match self.config.timeout_policy {
            TimeoutPolicy::Disconnect => {
                link_warn!(
                    Component::Client,
                    "⏱️ No response within {:?}; dropping the connection",
                    timeout
                );
                self.transport.stop();
                let dropped = self.link.clear_responses().await;
                if dropped > 0 {
                    link_debug!(Component::Client, "Discarded {} unread responses", dropped);
                }
            }
            TimeoutPolicy::FailCall => {
                link_warn!(Component::Client, "⏱️ No response within {:?}", timeout);
            }
        }
        self.link.fire_timeout().await;
    }
}

impl<Req, Resp, T> Connection<Req, Resp, T>
where
    Req: Serialize,
    Resp: DeserializeOwned + Send + 'static,
    T: Transport,
{
    /// Open the connection and wait for the handshake.
    ///
    /// Readiness is checked every `poll_interval`, at most `max_attempts`
    /// times. Any earlier session is closed first.
    pub async fn connect(&mut self, address: &str, port: u16, verbose: bool) -> ClientResult<()> {
        let url = endpoint_url(address, port, &self.config.path)?;

        self.disconnect();
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        self.link.set_verbose(verbose);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        self.transport.start(url.as_str(), events_tx)?;
        self.started = true;
        self.pump = Some(tokio::spawn(run_pump(
            self.link.clone(),
            events_rx,
            self.config.max_frame_bytes,
        )));

        link_info!(Component::Client, "🔌 Connecting to {}", url);

        for _ in 0..self.config.max_attempts {
            if self.transport.ready_state() != ReadyState::Connecting {
                break;
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }

        let state = self.transport.ready_state();
        if state == ReadyState::Open {
            link_info!(Component::Client, "✅ Connected to {}", url);
            return Ok(());
        }

        self.disconnect();
        link_warn!(Component::Client, "❌ Could not connect to {} ({:?})", url, state);
        Err(ClientError::HandshakeTimeout {
            url: url.to_string(),
            attempts: self.config.max_attempts,
            state: state.into(),
        })
    }

    /// Fire-and-forget send; `Ok(None)` when the connection is not open
    pub fn send(&self, request: &Req) -> ClientResult<Option<CorrelationId>> {
        if !self.has_connection() {
            link_warn!(
                Component::Client,
                "Send skipped: connection is {}",
                self.state()
            );
            return Ok(None);
        }

        let id = self.counter.next_id();
        let bytes = encode_frame(&Frame::new(id, request), self.config.max_frame_bytes)?;
        let size = bytes.len();
        self.transport.send(bytes)?;

        chatter!(self.link, "📤 Sent request {} ({} bytes)", id, size);
        Ok(Some(id))
    }

    /// Wait up to `timeout` for the oldest queued response
    pub async fn receive(&self, timeout: Duration) -> ClientResult<Resp> {
        match tokio::time::timeout(timeout, self.link.next_response()).await {
            Ok(response) => Ok(response),
            Err(_) => {
                self.handle_timeout(timeout).await;
                Err(ClientError::ReceiveTimeout { timeout })
            }
        }
    }

    /// Send and wait for the response carrying the same correlation id.
    ///
    /// Calls may be pipelined; each resolves with its own response no matter
    /// the order the host answers in.
    pub async fn request(&self, request: &Req, timeout: Duration) -> ClientResult<Resp> {
        if !self.has_connection() {
            return Err(ClientError::NotConnected {
                state: self.state(),
            });
        }

        let id = self.counter.next_id();
        let bytes = encode_frame(&Frame::new(id, request), self.config.max_frame_bytes)?;

        let waiter = self.link.register(id).await;
        if let Err(e) = self.transport.send(bytes) {
            self.link.forget(id).await;
            return Err(e);
        }
        chatter!(self.link, "📤 Sent correlated request {}", id);

        match tokio::time::timeout(timeout, waiter).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(ClientError::ConnectionClosed),
            Err(_) => {
                self.link.expire(id).await;
                self.handle_timeout(timeout).await;
                Err(ClientError::ReceiveTimeout { timeout })
            }
        }
    }
}

impl<Req, Resp, T: Transport> Drop for Connection<Req, Resp, T> {
    fn drop(&mut self) {
        self.disconnect();
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

/// Drain transport events until the transport drops its sender
async fn run_pump<Resp>(
    link: Arc<LinkState<Resp>>,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
    max_frame_bytes: usize,
) where
    Resp: DeserializeOwned + Send + 'static,
{
    while let Some(event) = events.recv().await {
        match event {
            TransportEvent::Opened => {
                link_debug!(Component::Client, "Transport open");
            }
            TransportEvent::Message(bytes) => deliver(&link, &bytes, max_frame_bytes).await,
            TransportEvent::Closed { reason } => {
                let abandoned = link.abandon_pending().await;
                link_info!(
                    Component::Client,
                    "🔌 Connection closed (reason: {}, abandoned requests: {})",
                    reason.as_deref().unwrap_or("none"),
                    abandoned
                );
                link.fire_closed().await;
            }
        }
    }
}

async fn deliver<Resp>(link: &LinkState<Resp>, bytes: &[u8], max_frame_bytes: usize)
where
    Resp: DeserializeOwned,
{
    let frame: Frame<Resp> = match decode_frame(bytes, max_frame_bytes) {
        Ok(frame) => frame,
        Err(e) => {
            link_warn!(
                Component::Client,
                "Dropping undecodable message ({} bytes): {}",
                bytes.len(),
                e
            );
            return;
        }
    };

    let (correlation, body) = frame.into_parts();
    let body = if correlation.is_correlated() {
        match link.resolve(correlation, body).await {
            Delivery::Resolved => {
                chatter!(link, "📥 Response {} handed to its request", correlation);
                return;
            }
            Delivery::Expired => {
                link_debug!(Component::Client, "Late response {} dropped", correlation);
                return;
            }
            Delivery::Unclaimed(body) => body,
        }
    } else {
        body
    };

    link.push_response(body).await;
    chatter!(link, "📥 Response {} queued ({} bytes)", correlation, bytes.len());
}
