//! Trait definitions with mockall annotations for testing
//!
//! The transport is the only seam between a `Connection` and the network.
//! Production code uses the WebSocket implementation in `services`; tests swap
//! in fakes or mockall mocks.

use tokio::sync::mpsc;

use crate::error::ClientResult;

/// Readiness of the underlying socket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Event delivered from the transport task to the connection
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Handshake completed (also after an automatic reconnect)
    Opened,
    /// One complete inbound message
    Message(Vec<u8>),
    /// Socket went away, with the peer's reason when it gave one
    Closed { reason: Option<String> },
}

/// Asynchronous, message-framed socket abstraction
///
/// Implementations run their own task and report everything that happens on
/// the socket through the event sender handed to `start`.
#[mockall::automock]
pub trait Transport: Send + Sync + 'static {
    /// Begin the handshake with `url`, replacing any earlier session
    fn start(&self, url: &str, events: mpsc::UnboundedSender<TransportEvent>) -> ClientResult<()>;

    /// Queue one binary message for the socket
    fn send(&self, payload: Vec<u8>) -> ClientResult<()>;

    /// Current socket readiness
    fn ready_state(&self) -> ReadyState;

    /// Close the socket and stop reconnecting
    fn stop(&self);
}
