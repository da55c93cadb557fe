//! Service implementations
//!
//! Real implementations of the host traits, plus the per-socket task.

pub mod client_registry;
pub mod echo_handler;
pub mod socket_handler;

#[cfg(test)]
mod tests;

// Re-export service implementations
pub use client_registry::RealClientRegistry;
pub use echo_handler::EchoHandler;
