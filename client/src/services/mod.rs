//! Service implementations
//!
//! Production implementations of the client traits.

pub mod ws_transport;

pub use ws_transport::WebSocketTransport;
