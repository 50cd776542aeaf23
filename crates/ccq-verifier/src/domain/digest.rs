//! # Domain-Separated Digests
//!
//! `digest = keccak256(prefix || keccak256(payload))`
//!
//! The 35-byte prefix is `"<environment>_query_<kind>_"` right-padded with
//! ASCII `'0'` to 34 bytes and terminated by `'|'`, e.g.
//! `mainnet_query_request_000000000000|`. Mixing in the environment keeps a
//! signature from one network off every other network; mixing in the kind
//! keeps a request signature from passing as a response signature.

use super::ecdsa::keccak256;
use shared_types::{Environment, Hash};
use std::fmt;

/// Length of the padded prefix before the terminator.
const PADDED_LEN: usize = 34;

/// Total prefix length including the `'|'` terminator.
pub const PREFIX_LEN: usize = PADDED_LEN + 1;

/// What a signature attests to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Request,
    Response,
}

impl MessageKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Response => "response",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Network and message kind a digest is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DigestDomain {
    pub environment: Environment,
    pub kind: MessageKind,
}

impl DigestDomain {
    pub const fn new(environment: Environment, kind: MessageKind) -> Self {
        Self { environment, kind }
    }

    pub const fn request(environment: Environment) -> Self {
        Self::new(environment, MessageKind::Request)
    }

    pub const fn response(environment: Environment) -> Self {
        Self::new(environment, MessageKind::Response)
    }

    /// The 35-byte signing prefix for this domain.
    pub fn prefix(&self) -> [u8; PREFIX_LEN] {
        let mut prefix = [b'0'; PREFIX_LEN];
        let tag = format!("{}_query_{}_", self.environment, self.kind);
        // Longest tag ("testnet_query_response_") is 23 bytes.
        let len = tag.len().min(PADDED_LEN);
        prefix[..len].copy_from_slice(&tag.as_bytes()[..len]);
        prefix[PADDED_LEN] = b'|';
        prefix
    }

    /// Digest of `payload` under this domain.
    pub fn digest(&self, payload: &[u8]) -> Hash {
        let mut preimage = Vec::with_capacity(PREFIX_LEN + 32);
        preimage.extend_from_slice(&self.prefix());
        preimage.extend_from_slice(&keccak256(payload));
        keccak256(&preimage)
    }
}

/// Digest a guardian signs over serialized request bytes.
pub fn query_request_digest(environment: Environment, request_bytes: &[u8]) -> Hash {
    DigestDomain::request(environment).digest(request_bytes)
}

/// Digest a guardian signs over a serialized response publication.
pub fn query_response_digest(environment: Environment, response_bytes: &[u8]) -> Hash {
    DigestDomain::response(environment).digest(response_bytes)
}
