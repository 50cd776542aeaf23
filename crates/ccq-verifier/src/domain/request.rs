//! # Query Requests
//!
//! A request bundles one or more per-chain queries under a nonce. Each
//! per-chain query is a variant of [`ChainQuery`]; every variant owns its
//! encoding, decoding and validation, so adding a chain kind means adding a
//! variant.
//!
//! Wire layout (big-endian):
//!
//! ```text
//! u8  version (= 1)
//! u32 nonce
//! u8  num_per_chain_queries
//! repeat: u16 chain_id, u8 query_type, u32 query_len, query_bytes
//! ```

use super::digest::query_request_digest;
use super::ecdsa::{keccak256, recover_address, QuerySigner, RecoverableSignature};
use super::errors::{CodecError, QueryError, SignatureError};
use super::wire::{WireReader, WireWriter};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use shared_types::{to_hex, Address, ChainId, Environment, Hash};
use std::fmt;
use std::str::FromStr;

/// Current request encoding version.
pub const QUERY_REQUEST_VERSION: u8 = 1;

/// Upper bound on per-chain queries in one request.
pub const MAX_PER_CHAIN_QUERIES: usize = u8::MAX as usize;

/// Upper bound on calls in one per-chain query.
pub const MAX_CALLS_PER_QUERY: usize = u8::MAX as usize;

// =============================================================================
// QUERY TYPES
// =============================================================================

/// Wire tag of a per-chain query kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum QueryType {
    EthCall = 1,
    EthCallByTimestamp = 2,
    EthCallWithFinality = 3,
}

impl QueryType {
    pub const fn tag(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for QueryType {
    type Error = CodecError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            1 => Ok(Self::EthCall),
            2 => Ok(Self::EthCallByTimestamp),
            3 => Ok(Self::EthCallWithFinality),
            other => Err(CodecError::UnsupportedQueryType(other)),
        }
    }
}

/// Block finality level for [`EthCallWithFinalityQueryRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Finality {
    Finalized,
    Safe,
}

impl Finality {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Finalized => "finalized",
            Self::Safe => "safe",
        }
    }
}

impl FromStr for Finality {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "finalized" => Ok(Self::Finalized),
            "safe" => Ok(Self::Safe),
            other => Err(CodecError::invalid(
                "finality",
                format!("{other:?}, expected \"finalized\" or \"safe\""),
            )),
        }
    }
}

impl fmt::Display for Finality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One contract call: target address and ABI-encoded call data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EthCallData {
    pub to: Address,
    pub data: Vec<u8>,
}

impl EthCallData {
    pub fn new(to: Address, data: Vec<u8>) -> Self {
        Self { to, data }
    }

    /// First four bytes of the call data, if present.
    pub fn selector(&self) -> Option<[u8; 4]> {
        self.data.get(..4).and_then(|s| s.try_into().ok())
    }
}

/// `eth_call` batch at a specific block number or hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EthCallQueryRequest {
    /// `0x`-prefixed block number or hash
    pub block_id: String,
    pub calls: Vec<EthCallData>,
}

/// `eth_call` batch at the block covering a timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EthCallByTimestampQueryRequest {
    /// Target time in microseconds
    pub target_timestamp: u64,
    /// Optional; set together with `following_block_id_hint`
    pub target_block_id_hint: String,
    pub following_block_id_hint: String,
    pub calls: Vec<EthCallData>,
}

/// `eth_call` batch at a block that has reached a finality level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EthCallWithFinalityQueryRequest {
    pub block_id: String,
    pub finality: Finality,
    pub calls: Vec<EthCallData>,
}

/// Per-chain query kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainQuery {
    EthCall(EthCallQueryRequest),
    EthCallByTimestamp(EthCallByTimestampQueryRequest),
    EthCallWithFinality(EthCallWithFinalityQueryRequest),
}

impl ChainQuery {
    pub fn query_type(&self) -> QueryType {
        match self {
            Self::EthCall(_) => QueryType::EthCall,
            Self::EthCallByTimestamp(_) => QueryType::EthCallByTimestamp,
            Self::EthCallWithFinality(_) => QueryType::EthCallWithFinality,
        }
    }

    pub fn calls(&self) -> &[EthCallData] {
        match self {
            Self::EthCall(q) => &q.calls,
            Self::EthCallByTimestamp(q) => &q.calls,
            Self::EthCallWithFinality(q) => &q.calls,
        }
    }

    pub fn validate(&self) -> Result<(), CodecError> {
        match self {
            Self::EthCall(q) => validate_block_id("block_id", &q.block_id)?,
            Self::EthCallByTimestamp(q) => {
                if q.target_timestamp == 0 {
                    return Err(CodecError::invalid("target_timestamp", "must be non-zero"));
                }
                match (
                    q.target_block_id_hint.is_empty(),
                    q.following_block_id_hint.is_empty(),
                ) {
                    (true, true) => {}
                    (false, false) => {
                        validate_block_id("target_block_id_hint", &q.target_block_id_hint)?;
                        validate_block_id("following_block_id_hint", &q.following_block_id_hint)?;
                    }
                    _ => {
                        return Err(CodecError::invalid(
                            "block_id_hint",
                            "target and following hints must be set together",
                        ))
                    }
                }
            }
            Self::EthCallWithFinality(q) => validate_block_id("block_id", &q.block_id)?,
        }
        validate_calls(self.calls())
    }

    /// Encode the query body (without the per-chain header).
    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut w = WireWriter::new();
        match self {
            Self::EthCall(q) => {
                w.put_bytes("block_id", q.block_id.as_bytes())?;
            }
            Self::EthCallByTimestamp(q) => {
                w.put_u64(q.target_timestamp);
                w.put_bytes("target_block_id_hint", q.target_block_id_hint.as_bytes())?;
                w.put_bytes("following_block_id_hint", q.following_block_id_hint.as_bytes())?;
            }
            Self::EthCallWithFinality(q) => {
                w.put_bytes("block_id", q.block_id.as_bytes())?;
                w.put_bytes("finality", q.finality.as_str().as_bytes())?;
            }
        }
        encode_calls(&mut w, self.calls())?;
        Ok(w.into_bytes())
    }

    /// Decode a query body for a known type tag.
    fn decode(query_type: QueryType, bytes: &[u8]) -> Result<Self, CodecError> {
        let mut r = WireReader::new(bytes);
        let query = match query_type {
            QueryType::EthCall => {
                let block_id = r.get_string("block_id")?;
                let calls = decode_calls(&mut r)?;
                Self::EthCall(EthCallQueryRequest { block_id, calls })
            }
            QueryType::EthCallByTimestamp => {
                let target_timestamp = r.get_u64()?;
                let target_block_id_hint = r.get_string("target_block_id_hint")?;
                let following_block_id_hint = r.get_string("following_block_id_hint")?;
                let calls = decode_calls(&mut r)?;
                Self::EthCallByTimestamp(EthCallByTimestampQueryRequest {
                    target_timestamp,
                    target_block_id_hint,
                    following_block_id_hint,
                    calls,
                })
            }
            QueryType::EthCallWithFinality => {
                let block_id = r.get_string("block_id")?;
                let finality: Finality = r.get_string("finality")?.parse()?;
                let calls = decode_calls(&mut r)?;
                Self::EthCallWithFinality(EthCallWithFinalityQueryRequest {
                    block_id,
                    finality,
                    calls,
                })
            }
        };
        r.finish()?;
        Ok(query)
    }
}

fn validate_block_id(field: &'static str, block_id: &str) -> Result<(), CodecError> {
    let digits = block_id
        .strip_prefix("0x")
        .ok_or_else(|| CodecError::invalid(field, format!("{block_id:?} must start with 0x")))?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(CodecError::invalid(field, format!("{block_id:?} is not hex")));
    }
    Ok(())
}

fn validate_calls(calls: &[EthCallData]) -> Result<(), CodecError> {
    if calls.is_empty() {
        return Err(CodecError::invalid("calls", "at least one call is required"));
    }
    if calls.len() > MAX_CALLS_PER_QUERY {
        return Err(CodecError::invalid(
            "calls",
            format!("{} calls exceeds {MAX_CALLS_PER_QUERY}", calls.len()),
        ));
    }
    if let Some(i) = calls.iter().position(|c| c.data.is_empty()) {
        return Err(CodecError::invalid("call_data", format!("call {i} has no data")));
    }
    Ok(())
}

fn encode_calls(w: &mut WireWriter, calls: &[EthCallData]) -> Result<(), CodecError> {
    w.put_count("calls", calls.len())?;
    for call in calls {
        w.put_fixed(&call.to);
        w.put_bytes("call_data", &call.data)?;
    }
    Ok(())
}

fn decode_calls(r: &mut WireReader<'_>) -> Result<Vec<EthCallData>, CodecError> {
    let count = r.get_u8()? as usize;
    let mut calls = Vec::with_capacity(count);
    for _ in 0..count {
        let to = r.get_array::<20>()?;
        let data = r.get_bytes()?.to_vec();
        calls.push(EthCallData { to, data });
    }
    Ok(calls)
}

// =============================================================================
// REQUEST
// =============================================================================

/// A query against one chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerChainQueryRequest {
    pub chain_id: ChainId,
    pub query: ChainQuery,
}

impl PerChainQueryRequest {
    pub fn new(chain_id: ChainId, query: ChainQuery) -> Self {
        Self { chain_id, query }
    }

    pub fn validate(&self) -> Result<(), CodecError> {
        if self.chain_id == 0 {
            return Err(CodecError::invalid("chain_id", "must be non-zero"));
        }
        self.query.validate()
    }
}

/// An immutable, validated cross-chain query request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    nonce: u32,
    per_chain_queries: Vec<PerChainQueryRequest>,
}

impl QueryRequest {
    /// Build and validate a request.
    pub fn new(
        nonce: u32,
        per_chain_queries: Vec<PerChainQueryRequest>,
    ) -> Result<Self, CodecError> {
        let request = Self {
            nonce,
            per_chain_queries,
        };
        request.validate()?;
        Ok(request)
    }

    pub fn nonce(&self) -> u32 {
        self.nonce
    }

    pub fn per_chain_queries(&self) -> &[PerChainQueryRequest] {
        &self.per_chain_queries
    }

    pub fn validate(&self) -> Result<(), CodecError> {
        if self.per_chain_queries.is_empty() {
            return Err(CodecError::invalid(
                "per_chain_queries",
                "at least one query is required",
            ));
        }
        if self.per_chain_queries.len() > MAX_PER_CHAIN_QUERIES {
            return Err(CodecError::invalid(
                "per_chain_queries",
                format!(
                    "{} queries exceeds {MAX_PER_CHAIN_QUERIES}",
                    self.per_chain_queries.len()
                ),
            ));
        }
        self.per_chain_queries
            .iter()
            .try_for_each(PerChainQueryRequest::validate)
    }

    /// Canonical bytes that are hashed and signed.
    pub fn serialize(&self) -> Result<Vec<u8>, CodecError> {
        let mut w = WireWriter::with_capacity(64);
        w.put_u8(QUERY_REQUEST_VERSION);
        w.put_u32(self.nonce);
        w.put_count("per_chain_queries", self.per_chain_queries.len())?;
        for pcq in &self.per_chain_queries {
            w.put_u16(pcq.chain_id);
            w.put_u8(pcq.query.query_type().tag());
            w.put_bytes("query", &pcq.query.encode()?)?;
        }
        Ok(w.into_bytes())
    }

    /// Strict decode followed by validation.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut r = WireReader::new(bytes);

        let version = r.get_u8()?;
        if version != QUERY_REQUEST_VERSION {
            return Err(CodecError::UnsupportedVersion(version));
        }

        let nonce = r.get_u32()?;
        let count = r.get_u8()? as usize;
        let mut per_chain_queries = Vec::with_capacity(count);
        for _ in 0..count {
            let chain_id = r.get_u16()?;
            let query_type = QueryType::try_from(r.get_u8()?)?;
            let query = ChainQuery::decode(query_type, r.get_bytes()?)?;
            per_chain_queries.push(PerChainQueryRequest { chain_id, query });
        }
        r.finish()?;

        Self::new(nonce, per_chain_queries)
    }
}

// =============================================================================
// SIGNED REQUEST
// =============================================================================

/// Identity of an outstanding request: `keccak256(request_bytes || signature)`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestKey(pub Hash);

impl RequestKey {
    pub fn new(request_bytes: &[u8], signature: &RecoverableSignature) -> Self {
        let mut preimage = Vec::with_capacity(request_bytes.len() + signature.as_bytes().len());
        preimage.extend_from_slice(request_bytes);
        preimage.extend_from_slice(signature.as_bytes());
        Self(keccak256(&preimage))
    }
}

impl fmt::Debug for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RequestKey({})", to_hex(&self.0))
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0[..8]))
    }
}

/// Serialized request plus the requester's signature over its digest.
///
/// Echoed verbatim inside every valid response.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedQueryRequest {
    #[serde_as(as = "Bytes")]
    pub query_request: Vec<u8>,
    pub signature: RecoverableSignature,
}

impl SignedQueryRequest {
    pub fn new(query_request: Vec<u8>, signature: RecoverableSignature) -> Self {
        Self {
            query_request,
            signature,
        }
    }

    /// Serialize `request` and sign its request digest.
    pub fn sign(
        request: &QueryRequest,
        environment: Environment,
        signer: &QuerySigner,
    ) -> Result<Self, QueryError> {
        let query_request = request.serialize()?;
        let digest = query_request_digest(environment, &query_request);
        let signature = signer.sign(&digest)?;
        Ok(Self::new(query_request, signature))
    }

    pub fn digest(&self, environment: Environment) -> Hash {
        query_request_digest(environment, &self.query_request)
    }

    /// Address that signed this request.
    pub fn requester(&self, environment: Environment) -> Result<Address, SignatureError> {
        recover_address(&self.digest(environment), &self.signature)
    }

    pub fn decode_request(&self) -> Result<QueryRequest, CodecError> {
        QueryRequest::deserialize(&self.query_request)
    }

    pub fn key(&self) -> RequestKey {
        RequestKey::new(&self.query_request, &self.signature)
    }
}
