//! Host state management
//!
//! Requests and responses live in separate `ClientQueues`, each behind its own
//! lock. Every queue keeps one FIFO per client plus a global arrival list, so
//! a pop for one client leaves the overall order of the others untouched.

use std::collections::{HashMap, VecDeque};
use tokio::sync::{Mutex, Notify};

use shared::ClientId;

use crate::types::Envelope;

struct QueueSet<T> {
    per_client: HashMap<ClientId, VecDeque<(u64, Envelope<T>)>>,
    /// Arrival order; entries whose item was already taken are skipped lazily
    arrivals: VecDeque<(u64, ClientId)>,
    next_seq: u64,
    len: usize,
}

impl<T> QueueSet<T> {
    fn new() -> Self {
        Self {
            per_client: HashMap::new(),
            arrivals: VecDeque::new(),
            next_seq: 0,
            len: 0,
        }
    }

    fn push(&mut self, envelope: Envelope<T>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.arrivals.push_back((seq, envelope.client));
        self.per_client
            .entry(envelope.client)
            .or_default()
            .push_back((seq, envelope));
        self.len += 1;
    }

    /// Drop stale arrival entries until the front one is live
    fn settle(&mut self) -> Option<ClientId> {
        while let Some(&(seq, client)) = self.arrivals.front() {
            let live = self
                .per_client
                .get(&client)
                .and_then(|queue| queue.front())
                .map(|(front_seq, _)| *front_seq == seq)
                .unwrap_or(false);
            if live {
                return Some(client);
            }
            self.arrivals.pop_front();
        }
        None
    }

    fn front(&mut self) -> Option<&Envelope<T>> {
        let client = self.settle()?;
        self.per_client
            .get(&client)
            .and_then(|queue| queue.front())
            .map(|(_, envelope)| envelope)
    }

    fn pop(&mut self) -> Option<Envelope<T>> {
        let client = self.settle()?;
        self.arrivals.pop_front();
        self.pop_from(client)
    }

    fn pop_from(&mut self, client: ClientId) -> Option<Envelope<T>> {
        let queue = self.per_client.get_mut(&client)?;
        let (_, envelope) = queue.pop_front()?;
        if queue.is_empty() {
            self.per_client.remove(&client);
        }
        self.len -= 1;
        self.compact();
        Some(envelope)
    }

    /// Drop arrival entries whose item is gone once they outnumber the live ones
    fn compact(&mut self) {
        if self.arrivals.len() <= 2 * self.len {
            return;
        }
        let per_client = &self.per_client;
        self.arrivals.retain(|(seq, client)| {
            per_client
                .get(client)
                .and_then(|queue| queue.front())
                .map(|(front_seq, _)| front_seq <= seq)
                .unwrap_or(false)
        });
    }

    fn purge(&mut self, client: ClientId) -> usize {
        let removed = self
            .per_client
            .remove(&client)
            .map(|queue| queue.len())
            .unwrap_or(0);
        self.len -= removed;
        self.compact();
        removed
    }
}

/// Per-client FIFO queues with a global arrival order
pub struct ClientQueues<T> {
    inner: Mutex<QueueSet<T>>,
}

impl<T> ClientQueues<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueSet::new()),
        }
    }

    pub async fn push(&self, envelope: Envelope<T>) {
        self.inner.lock().await.push(envelope);
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn has_from(&self, client: ClientId) -> bool {
        self.inner.lock().await.per_client.contains_key(&client)
    }

    /// Oldest item overall
    pub async fn pop(&self) -> Option<Envelope<T>> {
        self.inner.lock().await.pop()
    }

    /// Oldest item from one client
    pub async fn pop_from(&self, client: ClientId) -> Option<Envelope<T>> {
        self.inner.lock().await.pop_from(client)
    }

    /// Remove everything queued for `client`, returning how many items went
    pub async fn purge(&self, client: ClientId) -> usize {
        self.inner.lock().await.purge(client)
    }
}

impl<T: Clone> ClientQueues<T> {
    pub async fn peek(&self) -> Option<Envelope<T>> {
        self.inner.lock().await.front().cloned()
    }
}

impl<T> Default for ClientQueues<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Queues shared between the server handle and its socket tasks
pub struct HostState<Req, Resp> {
    pub requests: ClientQueues<Req>,
    pub responses: ClientQueues<Resp>,
    request_arrivals: Notify,
}

impl<Req, Resp> HostState<Req, Resp> {
    pub fn new() -> Self {
        Self {
            requests: ClientQueues::new(),
            responses: ClientQueues::new(),
            request_arrivals: Notify::new(),
        }
    }

    /// Queue a request and wake one waiter
    pub async fn queue_request(&self, envelope: Envelope<Req>) {
        self.requests.push(envelope).await;
        self.request_arrivals.notify_one();
    }

    /// Wait for the oldest request. Cancel-safe.
    pub async fn next_request(&self) -> Envelope<Req> {
        loop {
            if let Some(envelope) = self.requests.pop().await {
                return envelope;
            }
            self.request_arrivals.notified().await;
        }
    }

    /// Drop every queued item belonging to `client`
    pub async fn purge_client(&self, client: ClientId) -> (usize, usize) {
        let requests = self.requests.purge(client).await;
        let responses = self.responses.purge(client).await;
        (requests, responses)
    }
}

impl<Req, Resp> Default for HostState<Req, Resp> {
    fn default() -> Self {
        Self::new()
    }
}
