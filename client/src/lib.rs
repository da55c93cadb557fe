//! Client library for talking to an engine over a WebSocket link
//!
//! A [`Connection`] gives request/response semantics on top of the
//! message-oriented transport: `send` + `receive` drain a FIFO in arrival
//! order, while `request` pairs each call with its own response by
//! correlation id.

pub mod core;
pub mod error;
pub mod services;
pub mod state;
pub mod traits;

// Re-export commonly used types
pub use core::{endpoint_url, Connection};
pub use error::{ClientError, ClientResult};
pub use services::WebSocketTransport;
pub use state::ConnectionState;
pub use traits::{ReadyState, Transport, TransportEvent};
