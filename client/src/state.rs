//! Connection state shared between the caller and the event pump

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex, Notify};

use shared::CorrelationId;

use crate::traits::ReadyState;

/// Lifecycle of a client connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
}

impl From<ReadyState> for ConnectionState {
    fn from(state: ReadyState) -> Self {
        match state {
            ReadyState::Connecting => ConnectionState::Connecting,
            ReadyState::Open => ConnectionState::Open,
            ReadyState::Closing => ConnectionState::Closing,
            ReadyState::Closed => ConnectionState::Closed,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Idle => write!(f, "idle"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Open => write!(f, "open"),
            ConnectionState::Closing => write!(f, "closing"),
            ConnectionState::Closed => write!(f, "closed"),
        }
    }
}

/// Callback fired on receive timeout or socket close
pub type Callback = Arc<dyn Fn() + Send + Sync>;

/// Timed-out request ids remembered so their late responses are recognised
pub const EXPIRED_ID_CAPACITY: usize = 1024;

/// Correlated requests awaiting a response, plus the most recent expired ids
struct PendingRequests<Resp> {
    live: HashMap<CorrelationId, oneshot::Sender<Resp>>,
    expired: VecDeque<CorrelationId>,
}

impl<Resp> PendingRequests<Resp> {
    fn new() -> Self {
        Self {
            live: HashMap::new(),
            expired: VecDeque::new(),
        }
    }

    fn expire(&mut self, id: CorrelationId) {
        if self.live.remove(&id).is_none() {
            return;
        }
        if self.expired.len() == EXPIRED_ID_CAPACITY {
            self.expired.pop_front();
        }
        self.expired.push_back(id);
    }

    fn take_expired(&mut self, id: CorrelationId) -> bool {
        match self.expired.iter().position(|expired| *expired == id) {
            Some(index) => {
                self.expired.remove(index);
                true
            }
            None => false,
        }
    }
}

/// Where an inbound correlated response ended up
#[derive(Debug, PartialEq)]
pub enum Delivery<Resp> {
    /// Handed to the request waiting on its id
    Resolved,
    /// Its request already timed out; dropped
    Expired,
    /// Nobody asked for this id
    Unclaimed(Resp),
}

/// State reachable from both the calling task and the event pump
pub struct LinkState<Resp> {
    /// Responses nobody asked for by id, oldest first
    inbox: Mutex<VecDeque<Resp>>,

    /// One permit per arrival
    arrivals: Notify,

    pending: Mutex<PendingRequests<Resp>>,

    on_timeout: Mutex<Option<Callback>>,
    on_closed: Mutex<Option<Callback>>,

    verbose: AtomicBool,
}

impl<Resp> LinkState<Resp> {
    pub fn new() -> Self {
        Self {
            inbox: Mutex::new(VecDeque::new()),
            arrivals: Notify::new(),
            pending: Mutex::new(PendingRequests::new()),
            on_timeout: Mutex::new(None),
            on_closed: Mutex::new(None),
            verbose: AtomicBool::new(false),
        }
    }

    pub fn set_verbose(&self, verbose: bool) {
        self.verbose.store(verbose, Ordering::Relaxed);
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose.load(Ordering::Relaxed)
    }

    /// Queue a response and wake exactly one waiter
    pub async fn push_response(&self, response: Resp) {
        self.inbox.lock().await.push_back(response);
        self.arrivals.notify_one();
    }

    /// Wait until a response is queued and take the oldest.
    ///
    /// Cancel-safe: a response is only removed in the same poll that returns it.
    pub async fn next_response(&self) -> Resp {
        loop {
            if let Some(response) = self.inbox.lock().await.pop_front() {
                return response;
            }
            self.arrivals.notified().await;
        }
    }

    pub async fn queued(&self) -> usize {
        self.inbox.lock().await.len()
    }

    /// Discard every unread response, returning how many were dropped
    pub async fn clear_responses(&self) -> usize {
        let mut inbox = self.inbox.lock().await;
        let dropped = inbox.len();
        inbox.clear();
        dropped
    }

    pub async fn register(&self, id: CorrelationId) -> oneshot::Receiver<Resp> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.live.insert(id, tx);
        rx
    }

    /// Drop a request that never reached the wire
    pub async fn forget(&self, id: CorrelationId) {
        self.pending.lock().await.live.remove(&id);
    }

    /// Keep the id reserved so a late response is not mistaken for an unclaimed one
    pub async fn expire(&self, id: CorrelationId) {
        self.pending.lock().await.expire(id);
    }

    /// Hand a response to the request waiting on `id`
    pub async fn resolve(&self, id: CorrelationId, response: Resp) -> Delivery<Resp> {
        let mut pending = self.pending.lock().await;
        match pending.live.remove(&id) {
            Some(tx) => match tx.send(response) {
                Ok(()) => Delivery::Resolved,
                Err(_) => Delivery::Expired,
            },
            None if pending.take_expired(id) => Delivery::Expired,
            None => Delivery::Unclaimed(response),
        }
    }

    /// Fail every outstanding correlated request
    pub async fn abandon_pending(&self) -> usize {
        let mut pending = self.pending.lock().await;
        let count = pending.live.len();
        pending.live.clear();
        pending.expired.clear();
        count
    }

    pub async fn outstanding(&self) -> usize {
        self.pending.lock().await.live.len()
    }

    pub async fn set_timeout_callback(&self, callback: Option<Callback>) {
        *self.on_timeout.lock().await = callback;
    }

    pub async fn set_closed_callback(&self, callback: Option<Callback>) {
        *self.on_closed.lock().await = callback;
    }

    pub async fn fire_timeout(&self) {
        let callback = self.on_timeout.lock().await.clone();
        if let Some(callback) = callback {
            callback();
        }
    }

    pub async fn fire_closed(&self) {
        let callback = self.on_closed.lock().await.clone();
        if let Some(callback) = callback {
            callback();
        }
    }
}

impl<Resp> Default for LinkState<Resp> {
    fn default() -> Self {
        Self::new()
    }
}
