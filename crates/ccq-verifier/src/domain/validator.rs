//! # Response Validation
//!
//! Structural checks that tie a response publication to the request it
//! answers, and typed decoding of the per-call results.
//!
//! A response is rejected as a whole when any per-chain element fails.

use super::errors::{CodecError, QueryError, RejectReason};
use super::request::{EthCallData, QueryRequest, QueryType};
use super::response::{BlockInfo, ChainQueryResponse, QueryResponsePublication};
use shared_types::ChainId;

/// Decode publication bytes, classifying failures as rejection reasons.
pub fn decode_publication(bytes: &[u8]) -> Result<QueryResponsePublication, RejectReason> {
    QueryResponsePublication::deserialize(bytes).map_err(|err| match err {
        CodecError::UnsupportedQueryType(tag) => RejectReason::UnsupportedQueryType(tag),
        other => RejectReason::StructuralMismatch(other.to_string()),
    })
}

/// Check that `publication` answers `request` element by element.
///
/// - same number of per-chain entries
/// - each pair agrees on chain id and query type
/// - each response has exactly one result per call
pub fn validate_response(
    request: &QueryRequest,
    publication: &QueryResponsePublication,
) -> Result<(), RejectReason> {
    let queries = request.per_chain_queries();
    let responses = &publication.per_chain_responses;

    if queries.len() != responses.len() {
        return Err(RejectReason::StructuralMismatch(format!(
            "expected {} per-chain responses, got {}",
            queries.len(),
            responses.len()
        )));
    }

    for (i, (query, response)) in queries.iter().zip(responses).enumerate() {
        if query.chain_id != response.chain_id {
            return Err(RejectReason::StructuralMismatch(format!(
                "entry {i}: chain id {} does not match request chain id {}",
                response.chain_id, query.chain_id
            )));
        }

        let expected = query.query.query_type();
        let actual = response.response.query_type();
        if expected != actual {
            return Err(RejectReason::StructuralMismatch(format!(
                "entry {i}: response type {actual:?} does not match request type {expected:?}"
            )));
        }

        let calls = query.query.calls().len();
        let results = response.response.results().len();
        if calls != results {
            return Err(RejectReason::StructuralMismatch(format!(
                "entry {i}: {results} results for {calls} calls"
            )));
        }
    }

    Ok(())
}

// =============================================================================
// TYPED RESULTS
// =============================================================================

/// Turns one raw call result into a caller-facing value.
pub trait CallResultDecoder {
    type Output;

    fn decode(&self, call: &EthCallData, result: &[u8]) -> Result<Self::Output, CodecError>;
}

/// Passes result bytes through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawResults;

impl CallResultDecoder for RawResults {
    type Output = Vec<u8>;

    fn decode(&self, _call: &EthCallData, result: &[u8]) -> Result<Self::Output, CodecError> {
        Ok(result.to_vec())
    }
}

/// Decoded results for one chain.
#[derive(Debug, Clone, PartialEq)]
pub struct PerChainResult<T> {
    pub chain_id: ChainId,
    pub query_type: QueryType,
    /// Block the calls executed at
    pub block: BlockInfo,
    /// Set for timestamp queries only
    pub following_block: Option<BlockInfo>,
    /// One value per call, in call order
    pub values: Vec<T>,
}

/// Validate and decode every per-chain result set.
pub fn decode_results<D: CallResultDecoder>(
    request: &QueryRequest,
    publication: &QueryResponsePublication,
    decoder: &D,
) -> Result<Vec<PerChainResult<D::Output>>, QueryError> {
    validate_response(request, publication)?;

    request
        .per_chain_queries()
        .iter()
        .zip(&publication.per_chain_responses)
        .map(|(query, response)| -> Result<PerChainResult<D::Output>, QueryError> {
            let values = query
                .query
                .calls()
                .iter()
                .zip(response.response.results())
                .map(|(call, result)| decoder.decode(call, result))
                .collect::<Result<Vec<_>, _>>()?;

            let following_block = match &response.response {
                ChainQueryResponse::EthCallByTimestamp(r) => Some(r.following_block),
                _ => None,
            };

            Ok(PerChainResult {
                chain_id: response.chain_id,
                query_type: response.response.query_type(),
                block: response.response.block(),
                following_block,
                values,
            })
        })
        .collect()
}
