//! # Gossip Envelope
//!
//! Tagged framing for messages carried on the gossip topics.

use crate::domain::errors::CodecError;
use crate::domain::request::SignedQueryRequest;
use crate::domain::response::SignedQueryResponse;
use bincode::Options;
use serde::{Deserialize, Serialize};

/// Upper bound on an encoded envelope.
pub const MAX_ENVELOPE_SIZE: u64 = 1024 * 1024;

/// A message on the request or response topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GossipMessage {
    SignedQueryRequest(SignedQueryRequest),
    SignedQueryResponse(SignedQueryResponse),
}

fn codec() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_limit(MAX_ENVELOPE_SIZE)
        .reject_trailing_bytes()
}

impl GossipMessage {
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        codec()
            .serialize(self)
            .map_err(|e| CodecError::Envelope(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        codec()
            .deserialize(bytes)
            .map_err(|e| CodecError::Envelope(e.to_string()))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::SignedQueryRequest(_) => "request",
            Self::SignedQueryResponse(_) => "response",
        }
    }
}

impl From<SignedQueryRequest> for GossipMessage {
    fn from(request: SignedQueryRequest) -> Self {
        Self::SignedQueryRequest(request)
    }
}

impl From<SignedQueryResponse> for GossipMessage {
    fn from(response: SignedQueryResponse) -> Self {
        Self::SignedQueryResponse(response)
    }
}
