//! Wire messages and configuration for the engine link
//!
//! - `frame`: the envelope every payload travels in, plus its codec
//! - `config`: connection, server and termination settings

pub mod config;
pub mod frame;

pub use config::{
    ConnectConfig, ServerConfig, TerminateConfig, TimeoutPolicy, DEFAULT_ENDPOINT_PATH,
    DEFAULT_MAX_FRAME_BYTES,
};
pub use frame::{decode_frame, encode_frame, Frame};
