//! # Query Responses
//!
//! A guardian answers a request by publishing a [`QueryResponsePublication`]
//! that echoes the signed request and carries one response per chain, in
//! request order. The publication's canonical bytes are signed under the
//! response digest.
//!
//! Wire layout (big-endian):
//!
//! ```text
//! u8   version (= 1)
//! u16  request_chain_id (= 0, off-chain request)
//! [65] request signature
//! u32  request_len, request_bytes
//! u8   num_per_chain_responses
//! repeat: u16 chain_id, u8 query_type, u32 response_len, response_bytes
//! ```

use super::digest::query_response_digest;
use super::ecdsa::{recover_address, QuerySigner, RecoverableSignature, SIGNATURE_LENGTH};
use super::errors::{CodecError, QueryError, SignatureError};
use super::request::{QueryType, RequestKey, SignedQueryRequest};
use super::wire::{WireReader, WireWriter};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use shared_types::{Address, ChainId, Environment, Hash};

/// Current response encoding version.
pub const QUERY_RESPONSE_VERSION: u8 = 1;

/// Request chain id for requests submitted off-chain over gossip.
pub const OFF_CHAIN_REQUEST_CHAIN_ID: ChainId = 0;

/// Block a result set was read at. `time` is in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockInfo {
    pub number: u64,
    pub hash: Hash,
    pub time: u64,
}

impl BlockInfo {
    fn encode(&self, w: &mut WireWriter) {
        w.put_u64(self.number);
        w.put_fixed(&self.hash);
        w.put_u64(self.time);
    }

    fn decode(r: &mut WireReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            number: r.get_u64()?,
            hash: r.get_array()?,
            time: r.get_u64()?,
        })
    }
}

/// Results of an `eth_call` batch at one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EthCallQueryResponse {
    pub block_number: u64,
    pub block_hash: Hash,
    /// Microseconds
    pub block_time: u64,
    /// One entry per call, in call order
    pub results: Vec<Vec<u8>>,
}

impl EthCallQueryResponse {
    pub fn block(&self) -> BlockInfo {
        BlockInfo {
            number: self.block_number,
            hash: self.block_hash,
            time: self.block_time,
        }
    }
}

/// Results of an `eth_call` batch at the block covering a timestamp, plus
/// the following block that bounds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EthCallByTimestampQueryResponse {
    pub target_block: BlockInfo,
    pub following_block: BlockInfo,
    pub results: Vec<Vec<u8>>,
}

/// Per-chain response kinds. Each tag matches a request variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainQueryResponse {
    EthCall(EthCallQueryResponse),
    EthCallByTimestamp(EthCallByTimestampQueryResponse),
    EthCallWithFinality(EthCallQueryResponse),
}

impl ChainQueryResponse {
    pub fn query_type(&self) -> QueryType {
        match self {
            Self::EthCall(_) => QueryType::EthCall,
            Self::EthCallByTimestamp(_) => QueryType::EthCallByTimestamp,
            Self::EthCallWithFinality(_) => QueryType::EthCallWithFinality,
        }
    }

    pub fn results(&self) -> &[Vec<u8>] {
        match self {
            Self::EthCall(r) | Self::EthCallWithFinality(r) => &r.results,
            Self::EthCallByTimestamp(r) => &r.results,
        }
    }

    /// Block the results were read at.
    pub fn block(&self) -> BlockInfo {
        match self {
            Self::EthCall(r) | Self::EthCallWithFinality(r) => r.block(),
            Self::EthCallByTimestamp(r) => r.target_block,
        }
    }

    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut w = WireWriter::new();
        match self {
            Self::EthCall(r) | Self::EthCallWithFinality(r) => r.block().encode(&mut w),
            Self::EthCallByTimestamp(r) => {
                r.target_block.encode(&mut w);
                r.following_block.encode(&mut w);
            }
        }
        let results = self.results();
        w.put_count("results", results.len())?;
        for result in results {
            w.put_bytes("result", result)?;
        }
        Ok(w.into_bytes())
    }

    fn decode(query_type: QueryType, bytes: &[u8]) -> Result<Self, CodecError> {
        let mut r = WireReader::new(bytes);
        let response = match query_type {
            QueryType::EthCall | QueryType::EthCallWithFinality => {
                let block = BlockInfo::decode(&mut r)?;
                let response = EthCallQueryResponse {
                    block_number: block.number,
                    block_hash: block.hash,
                    block_time: block.time,
                    results: decode_results(&mut r)?,
                };
                if query_type == QueryType::EthCall {
                    Self::EthCall(response)
                } else {
                    Self::EthCallWithFinality(response)
                }
            }
            QueryType::EthCallByTimestamp => {
                Self::EthCallByTimestamp(EthCallByTimestampQueryResponse {
                    target_block: BlockInfo::decode(&mut r)?,
                    following_block: BlockInfo::decode(&mut r)?,
                    results: decode_results(&mut r)?,
                })
            }
        };
        r.finish()?;
        Ok(response)
    }
}

fn decode_results(r: &mut WireReader<'_>) -> Result<Vec<Vec<u8>>, CodecError> {
    let count = r.get_u8()? as usize;
    let mut results = Vec::with_capacity(count);
    for _ in 0..count {
        results.push(r.get_bytes()?.to_vec());
    }
    Ok(results)
}

/// A response for one chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerChainQueryResponse {
    pub chain_id: ChainId,
    pub response: ChainQueryResponse,
}

impl PerChainQueryResponse {
    pub fn new(chain_id: ChainId, response: ChainQueryResponse) -> Self {
        Self { chain_id, response }
    }
}

/// Request echo read from the front of a serialized publication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader<'a> {
    pub signature: RecoverableSignature,
    pub request_bytes: &'a [u8],
}

impl ResponseHeader<'_> {
    pub fn request_key(&self) -> RequestKey {
        RequestKey::new(self.request_bytes, &self.signature)
    }
}

/// The body a guardian signs: the echoed request plus per-chain results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryResponsePublication {
    pub request: SignedQueryRequest,
    pub per_chain_responses: Vec<PerChainQueryResponse>,
}

impl QueryResponsePublication {
    pub fn new(request: SignedQueryRequest, per_chain_responses: Vec<PerChainQueryResponse>) -> Self {
        Self {
            request,
            per_chain_responses,
        }
    }

    pub fn serialize(&self) -> Result<Vec<u8>, CodecError> {
        let mut w = WireWriter::with_capacity(128 + self.request.query_request.len());
        w.put_u8(QUERY_RESPONSE_VERSION);
        w.put_u16(OFF_CHAIN_REQUEST_CHAIN_ID);
        w.put_fixed(self.request.signature.as_bytes());
        w.put_bytes("query_request", &self.request.query_request)?;
        w.put_count("per_chain_responses", self.per_chain_responses.len())?;
        for pcr in &self.per_chain_responses {
            w.put_u16(pcr.chain_id);
            w.put_u8(pcr.response.query_type().tag());
            w.put_bytes("response", &pcr.response.encode()?)?;
        }
        Ok(w.into_bytes())
    }

    /// Read only the request echo, leaving the per-chain section unparsed.
    pub fn peek_request(bytes: &[u8]) -> Result<ResponseHeader<'_>, CodecError> {
        let mut r = WireReader::new(bytes);
        Self::read_header(&mut r)
    }

    fn read_header<'a>(r: &mut WireReader<'a>) -> Result<ResponseHeader<'a>, CodecError> {
        let version = r.get_u8()?;
        if version != QUERY_RESPONSE_VERSION {
            return Err(CodecError::UnsupportedVersion(version));
        }

        let request_chain_id = r.get_u16()?;
        if request_chain_id != OFF_CHAIN_REQUEST_CHAIN_ID {
            return Err(CodecError::invalid(
                "request_chain_id",
                format!("{request_chain_id}, only off-chain requests are supported"),
            ));
        }

        let signature = RecoverableSignature::from_bytes(r.get_array::<SIGNATURE_LENGTH>()?);
        let request_bytes = r.get_bytes()?;
        Ok(ResponseHeader {
            signature,
            request_bytes,
        })
    }

    /// Strict decode of a full publication.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut r = WireReader::new(bytes);
        let header = Self::read_header(&mut r)?;

        let count = r.get_u8()? as usize;
        let mut per_chain_responses = Vec::with_capacity(count);
        for _ in 0..count {
            let chain_id = r.get_u16()?;
            let query_type = QueryType::try_from(r.get_u8()?)?;
            let response = ChainQueryResponse::decode(query_type, r.get_bytes()?)?;
            per_chain_responses.push(PerChainQueryResponse { chain_id, response });
        }
        r.finish()?;

        Ok(Self {
            request: SignedQueryRequest::new(header.request_bytes.to_vec(), header.signature),
            per_chain_responses,
        })
    }
}

/// Serialized publication plus one guardian's signature over its digest.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedQueryResponse {
    #[serde_as(as = "Bytes")]
    pub query_response: Vec<u8>,
    pub signature: RecoverableSignature,
}

impl SignedQueryResponse {
    pub fn new(query_response: Vec<u8>, signature: RecoverableSignature) -> Self {
        Self {
            query_response,
            signature,
        }
    }

    /// Serialize `publication` and sign its response digest.
    pub fn sign(
        publication: &QueryResponsePublication,
        environment: Environment,
        signer: &QuerySigner,
    ) -> Result<Self, QueryError> {
        let query_response = publication.serialize()?;
        let digest = query_response_digest(environment, &query_response);
        let signature = signer.sign(&digest)?;
        Ok(Self::new(query_response, signature))
    }

    pub fn digest(&self, environment: Environment) -> Hash {
        query_response_digest(environment, &self.query_response)
    }

    /// Address of the guardian that signed this response.
    pub fn signer(&self, environment: Environment) -> Result<Address, SignatureError> {
        recover_address(&self.digest(environment), &self.signature)
    }

    pub fn header(&self) -> Result<ResponseHeader<'_>, CodecError> {
        QueryResponsePublication::peek_request(&self.query_response)
    }

    pub fn decode_publication(&self) -> Result<QueryResponsePublication, CodecError> {
        QueryResponsePublication::deserialize(&self.query_response)
    }
}
