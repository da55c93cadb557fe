//! Core shared types and identifiers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Component of the engine link that emitted a log event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Component {
    /// Client-side connection driving an engine
    Client,
    /// Host-side server accepting engine clients
    Host,
    /// External process supervision
    Supervisor,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Client => write!(f, "client"),
            Component::Host => write!(f, "host"),
            Component::Supervisor => write!(f, "supervisor"),
        }
    }
}

/// Unique identifier for a socket accepted by the host
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(Uuid);

impl ClientId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier tying a response to the request that caused it.
///
/// Assigned by the sender from a monotonically increasing counter and echoed
/// back unchanged by the peer. `UNCORRELATED` marks frames with no pairing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CorrelationId(u64);

impl CorrelationId {
    pub const UNCORRELATED: CorrelationId = CorrelationId(0);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    pub fn is_correlated(&self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Source of fresh correlation ids, starting at 1
#[derive(Debug)]
pub struct CorrelationCounter {
    next: AtomicU64,
}

impl CorrelationCounter {
    pub fn new() -> Self {
        Self { next: AtomicU64::new(1) }
    }

    pub fn next_id(&self) -> CorrelationId {
        CorrelationId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for CorrelationCounter {
    fn default() -> Self {
        Self::new()
    }
}
