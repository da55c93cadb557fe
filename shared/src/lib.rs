//! Shared types for the engine link
//!
//! Contains the pieces every side of the link agrees on: identifiers, the wire
//! frame and its codec, configuration, and logging setup.

pub mod errors;
pub mod logging;
pub mod messages;
pub mod types;

pub use errors::*;
pub use types::*;

pub use messages::{
    // Wire envelope
    decode_frame, encode_frame, Frame,

    // Configuration
    ConnectConfig, ServerConfig, TerminateConfig, TimeoutPolicy,
    DEFAULT_ENDPOINT_PATH, DEFAULT_MAX_FRAME_BYTES,
};
