//! # Response Aggregator
//!
//! Collects guardian responses for one outstanding request until a quorum of
//! guardians has signed the same response body, or the deadline passes.
//!
//! ```text
//!              submit() reaches quorum
//! Collecting ───────────────────────────→ QuorumReached
//!     │
//!     │ deadline elapsed
//!     └──────────────────────────────────→ TimedOut
//! ```
//!
//! Each candidate goes through these checks in order, and the first failure
//! rejects it without affecting collected votes:
//!
//! 1. terminal state or elapsed deadline → `TooLate`
//! 2. embedded request differs → `RequestMismatch`
//! 3. signer not recoverable → `InvalidSignature`
//! 4. signer not a guardian → `UnknownSigner`
//! 5. body undecodable or misaligned → `StructuralMismatch` / `UnsupportedQueryType`
//! 6. guardian already voted for another body → `ConflictingResponse`
//!
//! Votes are tallied per distinct body, so guardians that disagree never
//! combine into a quorum.

use super::ecdsa::{keccak256, RecoverableSignature};
use super::errors::{CodecError, RejectReason};
use super::guardian_set::GuardianRegistry;
use super::request::{QueryRequest, SignedQueryRequest};
use super::response::{QueryResponsePublication, SignedQueryResponse};
use super::validator::{decode_publication, validate_response};
use shared_types::{Environment, Hash};
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use tokio::time::Instant;

/// Lifecycle of one aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregatorState {
    Collecting,
    QuorumReached,
    TimedOut,
}

/// A response body signed by a quorum of guardians.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuorumResult {
    pub publication: QueryResponsePublication,
    /// Canonical bytes the signatures cover
    pub response_bytes: Vec<u8>,
    pub guardian_set_index: u32,
    /// Ascending guardian indices
    pub signer_indices: Vec<u32>,
    /// Aligned with `signer_indices`
    pub signatures: Vec<RecoverableSignature>,
}

/// Result of feeding one candidate response to the aggregator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Vote recorded, or already recorded when `duplicate` is set
    Accepted { guardian_index: u32, duplicate: bool },
    Rejected(RejectReason),
    QuorumReached(QuorumResult),
}

/// Counters for one aggregation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregatorStats {
    pub accepted: u64,
    pub duplicates: u64,
    rejected: HashMap<&'static str, u64>,
}

impl AggregatorStats {
    /// Rejections with the given [`RejectReason::kind`].
    pub fn rejected(&self, kind: &str) -> u64 {
        self.rejected.get(kind).copied().unwrap_or(0)
    }

    pub fn total_rejected(&self) -> u64 {
        self.rejected.values().sum()
    }

    fn record(&mut self, outcome: &SubmitOutcome) {
        match outcome {
            SubmitOutcome::Accepted {
                duplicate: true, ..
            } => self.duplicates += 1,
            SubmitOutcome::Accepted { .. } | SubmitOutcome::QuorumReached(_) => self.accepted += 1,
            SubmitOutcome::Rejected(reason) => *self.rejected.entry(reason.kind()).or_default() += 1,
        }
    }
}

fn check_structure(
    query: &QueryRequest,
    bytes: &[u8],
) -> Result<QueryResponsePublication, RejectReason> {
    let publication = decode_publication(bytes)?;
    validate_response(query, &publication)?;
    Ok(publication)
}

/// Votes for one distinct response body.
#[derive(Debug)]
struct ResponseBucket {
    publication: QueryResponsePublication,
    bytes: Vec<u8>,
    signatures: BTreeMap<u32, RecoverableSignature>,
}

/// Per-request collector of signed guardian responses.
#[derive(Debug)]
pub struct ResponseAggregator {
    environment: Environment,
    request: SignedQueryRequest,
    query: QueryRequest,
    registry: GuardianRegistry,
    deadline: Instant,
    state: AggregatorState,
    /// guardian index -> body hash it voted for
    votes: HashMap<u32, Hash>,
    buckets: HashMap<Hash, ResponseBucket>,
    result: Option<QuorumResult>,
    stats: AggregatorStats,
}

impl ResponseAggregator {
    /// Start collecting for `request`, judged against the `registry` snapshot.
    pub fn new(
        environment: Environment,
        request: SignedQueryRequest,
        registry: GuardianRegistry,
        deadline: Instant,
    ) -> Result<Self, CodecError> {
        let query = request.decode_request()?;
        Ok(Self {
            environment,
            request,
            query,
            registry,
            deadline,
            state: AggregatorState::Collecting,
            votes: HashMap::new(),
            buckets: HashMap::new(),
            result: None,
            stats: AggregatorStats::default(),
        })
    }

    pub fn submit(&mut self, response: &SignedQueryResponse) -> SubmitOutcome {
        self.submit_at(response, Instant::now())
    }

    /// Submit with an explicit clock reading.
    pub fn submit_at(&mut self, response: &SignedQueryResponse, now: Instant) -> SubmitOutcome {
        let outcome = self.evaluate(response, now);
        self.stats.record(&outcome);
        outcome
    }

    fn evaluate(&mut self, response: &SignedQueryResponse, now: Instant) -> SubmitOutcome {
        self.expire_at(now);
        if self.state != AggregatorState::Collecting {
            return SubmitOutcome::Rejected(RejectReason::TooLate);
        }

        let echoes_request = response.header().is_ok_and(|header| {
            header.request_bytes == self.request.query_request.as_slice()
                && header.signature == self.request.signature
        });
        if !echoes_request {
            return SubmitOutcome::Rejected(RejectReason::RequestMismatch);
        }

        let signer = match response.signer(self.environment) {
            Ok(signer) => signer,
            Err(e) => return SubmitOutcome::Rejected(RejectReason::InvalidSignature(e)),
        };

        let Some(guardian_index) = self.registry.index_of(&signer) else {
            return SubmitOutcome::Rejected(RejectReason::UnknownSigner(signer));
        };

        // Bodies already in a bucket passed the structural checks before.
        let body = keccak256(&response.query_response);
        let bucket = match self.buckets.entry(body) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let publication = match check_structure(&self.query, &response.query_response) {
                    Ok(publication) => publication,
                    Err(reason) => return SubmitOutcome::Rejected(reason),
                };
                if self.votes.contains_key(&guardian_index) {
                    return SubmitOutcome::Rejected(RejectReason::ConflictingResponse {
                        guardian_index,
                    });
                }
                entry.insert(ResponseBucket {
                    publication,
                    bytes: response.query_response.clone(),
                    signatures: BTreeMap::new(),
                })
            }
        };

        if let Some(previous) = self.votes.get(&guardian_index) {
            return if *previous == body {
                SubmitOutcome::Accepted {
                    guardian_index,
                    duplicate: true,
                }
            } else {
                SubmitOutcome::Rejected(RejectReason::ConflictingResponse { guardian_index })
            };
        }

        bucket.signatures.insert(guardian_index, response.signature);
        self.votes.insert(guardian_index, body);

        if bucket.signatures.len() < self.registry.quorum_threshold() {
            return SubmitOutcome::Accepted {
                guardian_index,
                duplicate: false,
            };
        }

        let result = QuorumResult {
            publication: bucket.publication.clone(),
            response_bytes: bucket.bytes.clone(),
            guardian_set_index: self.registry.guardian_set_index(),
            signer_indices: bucket.signatures.keys().copied().collect(),
            signatures: bucket.signatures.values().copied().collect(),
        };
        self.state = AggregatorState::QuorumReached;
        self.result = Some(result.clone());
        SubmitOutcome::QuorumReached(result)
    }

    /// Move to `TimedOut` if still collecting at or past the deadline.
    ///
    /// Returns true when this call made the transition.
    pub fn expire_at(&mut self, now: Instant) -> bool {
        if self.state == AggregatorState::Collecting && now >= self.deadline {
            self.state = AggregatorState::TimedOut;
            return true;
        }
        false
    }

    pub fn state(&self) -> AggregatorState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state != AggregatorState::Collecting
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn quorum(&self) -> usize {
        self.registry.quorum_threshold()
    }

    /// Guardians whose vote was counted, across all bodies.
    pub fn signer_count(&self) -> usize {
        self.votes.len()
    }

    /// Largest number of guardians agreeing on one body.
    pub fn leading_votes(&self) -> usize {
        self.buckets
            .values()
            .map(|b| b.signatures.len())
            .max()
            .unwrap_or(0)
    }

    pub fn result(&self) -> Option<&QuorumResult> {
        self.result.as_ref()
    }

    pub fn stats(&self) -> &AggregatorStats {
        &self.stats
    }

    pub fn request(&self) -> &SignedQueryRequest {
        &self.request
    }

    pub fn query(&self) -> &QueryRequest {
        &self.query
    }
}
