//! WebSocket transport backed by tokio-tungstenite
//!
//! Each `start` spawns one session task that owns the socket. The task
//! performs the handshake, pumps outbound and inbound messages, and when
//! automatic reconnection is enabled, re-dials after the socket drops until
//! `stop` is called. Per-message compression is never negotiated.

use futures_util::{SinkExt, StreamExt};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use shared::{link_debug, link_trace, Component, ConnectConfig};

use crate::error::{ClientError, ClientResult};
use crate::traits::{ReadyState, Transport, TransportEvent};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Readiness shared between the transport handle and its session task
#[derive(Clone)]
struct SharedReady(Arc<Mutex<ReadyState>>);

impl SharedReady {
    fn new(state: ReadyState) -> Self {
        Self(Arc::new(Mutex::new(state)))
    }

    fn get(&self) -> ReadyState {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set(&self, state: ReadyState) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }
}

/// Handle to a running session task
struct Session {
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    shutdown: watch::Sender<bool>,
    ready: SharedReady,
}

/// Real transport implementation over tokio-tungstenite
pub struct WebSocketTransport {
    auto_reconnect: bool,
    reconnect_backoff: Duration,
    session: Mutex<Option<Session>>,
}

impl WebSocketTransport {
    /// Create a transport using the reconnection settings of `config`
    pub fn new(config: &ConnectConfig) -> Self {
        Self {
            auto_reconnect: config.auto_reconnect,
            reconnect_backoff: config.reconnect_backoff,
            session: Mutex::new(None),
        }
    }

    fn lock_session(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new(&ConnectConfig::default())
    }
}

impl Transport for WebSocketTransport {
    fn start(&self, url: &str, events: mpsc::UnboundedSender<TransportEvent>) -> ClientResult<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ClientError::transport(format!("No async runtime available: {e}")))?;

        self.stop();

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let ready = SharedReady::new(ReadyState::Connecting);

        runtime.spawn(run_session(
            url.to_string(),
            self.auto_reconnect,
            self.reconnect_backoff,
            ready.clone(),
            events,
            outbound_rx,
            shutdown_rx,
        ));

        *self.lock_session() = Some(Session {
            outbound: outbound_tx,
            shutdown: shutdown_tx,
            ready,
        });
        Ok(())
    }

    fn send(&self, payload: Vec<u8>) -> ClientResult<()> {
        let session = self.lock_session();
        match session.as_ref() {
            Some(session) if session.ready.get() == ReadyState::Open => session
                .outbound
                .send(payload)
                .map_err(|_| ClientError::transport("session task has stopped")),
            Some(session) => Err(ClientError::NotConnected {
                state: session.ready.get().into(),
            }),
            None => Err(ClientError::NotConnected {
                state: ReadyState::Closed.into(),
            }),
        }
    }

    fn ready_state(&self) -> ReadyState {
        self.lock_session()
            .as_ref()
            .map(|session| session.ready.get())
            .unwrap_or(ReadyState::Closed)
    }

    fn stop(&self) {
        let session = self.lock_session().take();
        if let Some(session) = session {
            // The task finishes the close handshake on its own
            let _ = session.shutdown.send(true);
        }
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Dial, pump and (optionally) re-dial until shut down
async fn run_session(
    url: String,
    auto_reconnect: bool,
    reconnect_backoff: Duration,
    ready: SharedReady,
    events: mpsc::UnboundedSender<TransportEvent>,
    mut outbound: mpsc::UnboundedReceiver<Vec<u8>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        ready.set(ReadyState::Connecting);

        let attempt = tokio::select! {
            result = connect_async(url.as_str()) => result,
            _ = shutdown.changed() => break,
        };

        match attempt {
            Ok((socket, _response)) => {
                ready.set(ReadyState::Open);
                link_debug!(Component::Client, "🔗 Socket open to {}", url);
                let _ = events.send(TransportEvent::Opened);

                let reason = pump_socket(socket, &events, &mut outbound, &mut shutdown, &ready).await;
                link_debug!(Component::Client, "🔌 Socket to {} closed ({:?})", url, reason);
                let _ = events.send(TransportEvent::Closed { reason });
            }
            Err(e) => {
                link_trace!(Component::Client, "Handshake with {} failed: {}", url, e);
            }
        }

        if !auto_reconnect || *shutdown.borrow() {
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(reconnect_backoff) => {}
            _ = shutdown.changed() => break,
        }
    }

    ready.set(ReadyState::Closed);
}

/// Move messages until the socket closes; returns the close reason, if any
async fn pump_socket(
    socket: Socket,
    events: &mpsc::UnboundedSender<TransportEvent>,
    outbound: &mut mpsc::UnboundedReceiver<Vec<u8>>,
    shutdown: &mut watch::Receiver<bool>,
    ready: &SharedReady,
) -> Option<String> {
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            queued = outbound.recv() => match queued {
                Some(payload) => {
                    if let Err(e) = sink.send(Message::Binary(payload)).await {
                        return Some(e.to_string());
                    }
                }
                None => {
                    ready.set(ReadyState::Closing);
                    let _ = sink.send(Message::Close(None)).await;
                    return None;
                }
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Binary(data))) => {
                    let _ = events.send(TransportEvent::Message(data));
                }
                Some(Ok(Message::Text(text))) => {
                    let _ = events.send(TransportEvent::Message(text.into_bytes()));
                }
                Some(Ok(Message::Close(frame))) => {
                    ready.set(ReadyState::Closing);
                    return frame.map(|frame| frame.reason.into_owned());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Some(e.to_string()),
                None => return None,
            },
            _ = shutdown.changed() => {
                ready.set(ReadyState::Closing);
                let _ = sink.send(Message::Close(None)).await;
                let _ = sink.close().await;
                return None;
            }
        }
    }
}
