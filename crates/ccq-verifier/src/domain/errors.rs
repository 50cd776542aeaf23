//! # Query Errors
//!
//! Error types for every layer of the query verifier, from wire decoding up
//! to the outcome of a whole query.

use shared_types::{to_hex, Address};
use thiserror::Error;

/// Errors from the canonical wire codec and request validation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    /// Input ended before a field could be read
    #[error("Unexpected end of input: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEnd { needed: usize, remaining: usize },

    /// Input continued past the end of the message
    #[error("{0} unexpected trailing bytes")]
    ExcessBytes(usize),

    /// Message version is not understood
    #[error("Unsupported message version: {0}")]
    UnsupportedVersion(u8),

    /// Per-chain query type tag is not understood
    #[error("Unsupported query type: {0}")]
    UnsupportedQueryType(u8),

    /// A field holds a value outside its allowed range
    #[error("Invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    /// Gossip envelope could not be encoded or decoded
    #[error("Envelope codec error: {0}")]
    Envelope(String),

    /// ABI call or result encoding failed
    #[error(transparent)]
    Abi(#[from] AbiError),
}

impl CodecError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

/// Errors from recoverable ECDSA signing and recovery.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignatureError {
    /// Signature is not 65 bytes long
    #[error("Invalid signature length: {0} bytes, expected 65")]
    InvalidLength(usize),

    /// R or S is zero or not below the curve order
    #[error("Invalid signature format")]
    InvalidFormat,

    /// Signature has high S value (EIP-2 malleability protection)
    #[error("Malleable signature (high S value)")]
    MalleableSignature,

    /// Invalid recovery ID (v must be 0, 1, 27, or 28)
    #[error("Invalid recovery ID: {0}")]
    InvalidRecoveryId(u8),

    /// Failed to recover public key from signature
    #[error("Failed to recover public key")]
    RecoveryFailed,

    /// The private key could not produce a signature
    #[error("Signing failed")]
    SigningFailed,

    /// Private key bytes are not a valid secp256k1 scalar
    #[error("Invalid private key")]
    InvalidPrivateKey,
}

/// Errors constructing or rotating a guardian set.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GuardianSetError {
    /// A guardian set needs at least one key
    #[error("Guardian set is empty")]
    Empty,

    /// The same key appears twice
    #[error("Duplicate guardian key {} at index {index}", to_hex(.key))]
    DuplicateKey { key: Address, index: usize },

    /// Rotation must move to a strictly newer set
    #[error("Stale guardian set index {proposed}, current is {current}")]
    StaleIndex { current: u32, proposed: u32 },
}

/// Errors from the gossip transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The transport has shut down
    #[error("Transport closed")]
    Closed,

    /// Publishing a message failed
    #[error("Publish to {topic} failed: {reason}")]
    PublishFailed { topic: String, reason: String },

    /// Subscribing to a topic failed
    #[error("Subscribe to {topic} failed: {reason}")]
    SubscribeFailed { topic: String, reason: String },
}

/// Errors from ABI call encoding and result decoding.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AbiError {
    /// Call encoding only supports static argument types
    #[error("Dynamic argument at position {0} is not supported")]
    DynamicArgument(usize),

    /// Result data is shorter than the declared type needs
    #[error("ABI data too short: need {needed} bytes, have {actual}")]
    TooShort { needed: usize, actual: usize },

    /// Result word holds a value invalid for its type
    #[error("Invalid ABI {ty} value: {reason}")]
    InvalidValue { ty: &'static str, reason: String },

    /// Call data has no selector registered with the decoder
    #[error("No output type registered for selector 0x{}", hex::encode(.0))]
    UnknownSelector([u8; 4]),

    /// Call data is shorter than a selector
    #[error("Call data has no 4-byte selector")]
    MissingSelector,
}

/// Why a single guardian response was not counted.
///
/// Rejections never abort aggregation; the aggregator keeps collecting.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RejectReason {
    /// Embedded request bytes or signature differ from the outstanding request
    #[error("Response does not echo the outstanding request")]
    RequestMismatch,

    /// Signer could not be recovered from the response signature
    #[error("Invalid response signature: {0}")]
    InvalidSignature(SignatureError),

    /// Recovered signer is not in the guardian set
    #[error("Signer {} is not in the guardian set", to_hex(.0))]
    UnknownSigner(Address),

    /// Response body does not line up with the request
    #[error("Response does not match request structure: {0}")]
    StructuralMismatch(String),

    /// Guardian already voted for a different response body
    #[error("Guardian {guardian_index} already voted for a different response")]
    ConflictingResponse { guardian_index: u32 },

    /// Response carries a query type this verifier cannot decode
    #[error("Unsupported query type: {0}")]
    UnsupportedQueryType(u8),

    /// Aggregation already finished or its deadline passed
    #[error("Response arrived after aggregation finished")]
    TooLate,
}

impl RejectReason {
    /// Stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RequestMismatch => "request_mismatch",
            Self::InvalidSignature(_) => "invalid_signature",
            Self::UnknownSigner(_) => "unknown_signer",
            Self::StructuralMismatch(_) => "structural_mismatch",
            Self::ConflictingResponse { .. } => "conflicting_response",
            Self::UnsupportedQueryType(_) => "unsupported_query_type",
            Self::TooLate => "too_late",
        }
    }
}

/// Errors that end a query or prevent it from being issued.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error(transparent)]
    GuardianSet(#[from] GuardianSetError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Aggregated response failed validation against its request
    #[error(transparent)]
    InvalidResponse(#[from] RejectReason),

    /// Deadline passed before a quorum of guardians agreed
    #[error("Query timed out with {signers} of {quorum} required signatures")]
    TimedOut { signers: usize, quorum: usize },

    /// The service is shutting down
    #[error("Query cancelled")]
    Cancelled,

    /// An identical signed request is already outstanding
    #[error("Identical request already pending")]
    AlreadyPending,
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;
