//! Wire frame carrying one opaque payload
//!
//! Every message on the socket is a bincode-encoded `Frame`. The payload type
//! is chosen by the caller; the link only inspects the correlation id.

use bincode::Options;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::errors::{SharedError, SharedResult};
use crate::types::CorrelationId;

/// Envelope for a request or response payload
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Frame<T> {
    pub correlation: CorrelationId,
    pub body: T,
}

impl<T> Frame<T> {
    pub fn new(correlation: CorrelationId, body: T) -> Self {
        Self { correlation, body }
    }

    /// Frame with no request/response pairing
    pub fn uncorrelated(body: T) -> Self {
        Self {
            correlation: CorrelationId::UNCORRELATED,
            body,
        }
    }

    pub fn into_parts(self) -> (CorrelationId, T) {
        (self.correlation, self.body)
    }
}

fn wire_options(limit: usize) -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .allow_trailing_bytes()
        .with_limit(limit as u64)
}

/// Serialize a frame, refusing anything above `limit` bytes
pub fn encode_frame<T: Serialize>(frame: &Frame<T>, limit: usize) -> SharedResult<Vec<u8>> {
    wire_options(limit)
        .serialize(frame)
        .map_err(|e| match *e {
            bincode::ErrorKind::SizeLimit => SharedError::FrameTooLarge {
                size: wire_options(usize::MAX).serialized_size(frame).unwrap_or(0) as usize,
                limit,
            },
            other => SharedError::SerializationError {
                message: other.to_string(),
            },
        })
}

/// Deserialize a frame received from the socket
pub fn decode_frame<T: DeserializeOwned>(data: &[u8], limit: usize) -> SharedResult<Frame<T>> {
    if data.len() > limit {
        return Err(SharedError::FrameTooLarge {
            size: data.len(),
            limit,
        });
    }

    wire_options(limit)
        .deserialize(data)
        .map_err(|e| SharedError::DeserializationError {
            message: e.to_string(),
        })
}
