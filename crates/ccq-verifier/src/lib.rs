//! # Cross-Chain Query Verifier
//!
//! Issues signed cross-chain queries to a guardian network and accepts a
//! response only once a quorum of guardians has signed the same body.
//!
//! ## Architecture
//!
//! This crate follows hexagonal architecture:
//! - **Domain Layer** (`domain/`): Wire codecs, digests, signatures, quorum
//!   aggregation. No I/O.
//! - **Ports Layer** (`ports/`): Trait definitions for inbound/outbound interfaces
//! - **Adapters Layer** (`adapters/`): Gossip envelope, in-memory transport,
//!   guardian set provider
//! - **Service Layer** (`service.rs`): Wires domain logic to ports
//!
//! ## Security Notes
//!
//! - **Domain separation**: request and response digests carry an
//!   environment- and kind-specific prefix, so a signature never verifies
//!   across networks or message kinds.
//! - **Malleability prevention**: high-S signatures are rejected.
//! - **Snapshot guardian sets**: each query is judged against the set active
//!   when it was issued.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
pub mod service;

// Re-export public API
pub use adapters::{GossipMessage, InMemoryTransport, StaticGuardianSetProvider};
pub use config::{ConfigError, QueryConfig};
pub use domain::abi::{
    decode_output, encode_call, function_selector, AbiResultDecoder, AbiType, AbiValue,
};
pub use domain::aggregator::{
    AggregatorState, AggregatorStats, QuorumResult, ResponseAggregator, SubmitOutcome,
};
pub use domain::digest::{query_request_digest, query_response_digest, DigestDomain, MessageKind};
pub use domain::ecdsa::{recover_address, QuerySigner, RecoverableSignature};
pub use domain::errors::{
    AbiError, CodecError, GuardianSetError, QueryError, QueryResult, RejectReason, SignatureError,
    TransportError,
};
pub use domain::guardian_set::{calculate_quorum, GuardianRegistry, GuardianSet};
pub use domain::request::{
    ChainQuery, EthCallByTimestampQueryRequest, EthCallData, EthCallQueryRequest,
    EthCallWithFinalityQueryRequest, Finality, PerChainQueryRequest, QueryRequest, QueryType,
    RequestKey, SignedQueryRequest,
};
pub use domain::response::{
    BlockInfo, ChainQueryResponse, EthCallByTimestampQueryResponse, EthCallQueryResponse,
    PerChainQueryResponse, QueryResponsePublication, SignedQueryResponse,
};
pub use domain::validator::{
    decode_results, validate_response, CallResultDecoder, PerChainResult, RawResults,
};
pub use ports::inbound::QueryApi;
pub use ports::outbound::{GuardianSetProvider, MessageStream, QueryTransport};
pub use service::{PendingQuery, QueryService};
