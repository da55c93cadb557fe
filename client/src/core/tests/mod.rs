//! Test fixtures for the connection core


use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use shared::{decode_frame, encode_frame, CorrelationId, Frame, DEFAULT_MAX_FRAME_BYTES};

use crate::error::{ClientError, ClientResult};
use crate::traits::{ReadyState, Transport, TransportEvent};

#[derive(Default)]
struct LoopbackInner {
    ready: Option<ReadyState>,
    events: Option<mpsc::UnboundedSender<TransportEvent>>,
    urls: Vec<String>,
    sent: Vec<Vec<u8>>,
    stops: usize,
}

/// In-memory transport the test drives by hand
#[derive(Clone)]
pub struct LoopbackTransport {
    inner: Arc<Mutex<LoopbackInner>>,
    open_on_start: bool,
}

impl LoopbackTransport {
    /// Completes the handshake as soon as it is started
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(LoopbackInner::default())),
            open_on_start: true,
        }
    }

    /// Stays in the connecting state forever
    pub fn never_opens() -> Self {
        Self {
            open_on_start: false,
            ..Self::new()
        }
    }

    pub fn deliver_raw(&self, bytes: Vec<u8>) {
        let inner = self.inner.lock().unwrap();
        if let Some(events) = inner.events.as_ref() {
            events.send(TransportEvent::Message(bytes)).unwrap();
        }
    }

    pub fn deliver<T: Serialize>(&self, correlation: CorrelationId, body: T) {
        let bytes = encode_frame(&Frame::new(correlation, body), DEFAULT_MAX_FRAME_BYTES).unwrap();
        self.deliver_raw(bytes);
    }

    /// Simulate the peer closing the socket
    pub fn close(&self, reason: Option<&str>) {
        let mut inner = self.inner.lock().unwrap();
        inner.ready = Some(ReadyState::Closed);
        if let Some(events) = inner.events.take() {
            let _ = events.send(TransportEvent::Closed {
                reason: reason.map(str::to_string),
            });
        }
    }

    pub fn sent_frames<T: DeserializeOwned>(&self) -> Vec<Frame<T>> {
        self.inner
            .lock()
            .unwrap()
            .sent
            .iter()
            .map(|bytes| decode_frame(bytes, DEFAULT_MAX_FRAME_BYTES).unwrap())
            .collect()
    }

    /// Wait until at least `count` frames went out
    pub async fn wait_for_sent<T: DeserializeOwned>(&self, count: usize) -> Vec<Frame<T>> {
        for _ in 0..200 {
            if self.inner.lock().unwrap().sent.len() >= count {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.sent_frames()
    }

    pub fn urls(&self) -> Vec<String> {
        self.inner.lock().unwrap().urls.clone()
    }

    pub fn stop_count(&self) -> usize {
        self.inner.lock().unwrap().stops
    }
}

impl Transport for LoopbackTransport {
    fn start(&self, url: &str, events: mpsc::UnboundedSender<TransportEvent>) -> ClientResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.urls.push(url.to_string());
        if self.open_on_start {
            inner.ready = Some(ReadyState::Open);
            let _ = events.send(TransportEvent::Opened);
        } else {
            inner.ready = Some(ReadyState::Connecting);
        }
        inner.events = Some(events);
        Ok(())
    }

    fn send(&self, payload: Vec<u8>) -> ClientResult<()> {
        let mut inner = self.inner.lock().unwrap();
        match inner.ready {
            Some(ReadyState::Open) => {
                inner.sent.push(payload);
                Ok(())
            }
            state => Err(ClientError::NotConnected {
                state: state.unwrap_or(ReadyState::Closed).into(),
            }),
        }
    }

    fn ready_state(&self) -> ReadyState {
        self.inner.lock().unwrap().ready.unwrap_or(ReadyState::Closed)
    }

    fn stop(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.stops += 1;
        inner.ready = Some(ReadyState::Closed);
        if let Some(events) = inner.events.take() {
            let _ = events.send(TransportEvent::Closed { reason: None });
        }
    }
}
