//! Host library for serving engine clients over WebSocket
//!
//! Provides a multi-client [`Server`] that queues inbound requests per client
//! and routes queued responses back to the socket they belong to.

pub mod error;
pub mod server;
pub mod services;
pub mod state;
pub mod traits;
pub mod types;

// Re-export main types
pub use error::{HostError, HostResult};
pub use server::Server;
pub use state::{ClientQueues, HostState};
pub use types::*;

// Re-export trait definitions
pub use traits::{ClientRegistry, RequestHandler};

// Re-export service implementations
pub use services::{EchoHandler, RealClientRegistry};
