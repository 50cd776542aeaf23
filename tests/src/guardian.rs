//! # Simulated Guardians
//!
//! Guardian nodes that listen on the request topic, execute nothing, and
//! answer every admitted request with canned `eth_call` results signed by
//! their own key.

use ccq_verifier::{
    function_selector, BlockInfo, ChainQuery, ChainQueryResponse, EthCallByTimestampQueryResponse,
    EthCallData, EthCallQueryResponse, GossipMessage, GuardianSet, GuardianSetError,
    PerChainQueryRequest, PerChainQueryResponse, QueryConfig, QueryResponsePublication,
    QuerySigner, SignedQueryRequest, SignedQueryResponse,
};
use k256::ecdsa::SigningKey;
use primitive_types::U256;
use shared_bus::{GossipPublisher, InMemoryGossipBus};
use shared_types::{Address, Environment};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

/// Token name every guardian reports for `name()`.
pub const TOKEN_NAME: &str = "Wrapped Matic";

/// `totalSupply()` reported by honest guardians.
pub const TOTAL_SUPPLY: u64 = 1_000_000;

/// Block every answer claims to have read.
pub const ANSWER_BLOCK: BlockInfo = BlockInfo {
    number: 42_832_432,
    hash: [0x28; 32],
    time: 1_697_216_322_000_000,
};

/// How a simulated guardian treats requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Answer with the agreed results
    Honest,
    /// Never answer
    Silent,
    /// Answer with a different `totalSupply()`
    Divergent,
}

/// One guardian node.
pub struct SimulatedGuardian {
    signer: QuerySigner,
    behavior: Behavior,
    environment: Environment,
    allowed_requesters: Option<Vec<Address>>,
}

impl SimulatedGuardian {
    /// Honest guardian with a fresh random key.
    pub fn new(environment: Environment) -> Self {
        Self {
            signer: QuerySigner::from_signing_key(SigningKey::random(&mut rand::thread_rng())),
            behavior: Behavior::Honest,
            environment,
            allowed_requesters: None,
        }
    }

    pub fn with_behavior(mut self, behavior: Behavior) -> Self {
        self.behavior = behavior;
        self
    }

    /// Only answer requests signed by one of `requesters`.
    pub fn with_allowed_requesters(mut self, requesters: Vec<Address>) -> Self {
        self.allowed_requesters = Some(requesters);
        self
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Build and sign this guardian's response to `request`, if it answers.
    pub fn answer(&self, request: &SignedQueryRequest) -> Option<SignedQueryResponse> {
        if self.behavior == Behavior::Silent {
            return None;
        }

        if let Some(allowed) = &self.allowed_requesters {
            match request.requester(self.environment) {
                Ok(requester) if allowed.contains(&requester) => {}
                _ => {
                    debug!(request = %request.key(), "Requester not permitted");
                    return None;
                }
            }
        }

        let query = request.decode_request().ok()?;
        let responses = query
            .per_chain_queries()
            .iter()
            .map(|q| self.respond(q))
            .collect();
        let publication = QueryResponsePublication::new(request.clone(), responses);
        SignedQueryResponse::sign(&publication, self.environment, &self.signer).ok()
    }

    fn respond(&self, query: &PerChainQueryRequest) -> PerChainQueryResponse {
        let results: Vec<Vec<u8>> = query.query.calls().iter().map(|c| self.call(c)).collect();
        let block = ANSWER_BLOCK;

        let response = match &query.query {
            ChainQuery::EthCall(_) => ChainQueryResponse::EthCall(eth_call_response(block, results)),
            ChainQuery::EthCallWithFinality(_) => {
                ChainQueryResponse::EthCallWithFinality(eth_call_response(block, results))
            }
            ChainQuery::EthCallByTimestamp(_) => {
                ChainQueryResponse::EthCallByTimestamp(EthCallByTimestampQueryResponse {
                    target_block: block,
                    following_block: BlockInfo {
                        number: block.number + 1,
                        hash: [0x29; 32],
                        time: block.time + 2_000_000,
                    },
                    results,
                })
            }
        };
        PerChainQueryResponse::new(query.chain_id, response)
    }

    fn call(&self, call: &EthCallData) -> Vec<u8> {
        let selector = call.selector();
        if selector == Some(function_selector("name()")) {
            abi_string(TOKEN_NAME)
        } else if selector == Some(function_selector("totalSupply()")) {
            let supply = match self.behavior {
                Behavior::Divergent => TOTAL_SUPPLY - 1,
                _ => TOTAL_SUPPLY,
            };
            abi_uint(U256::from(supply))
        } else {
            vec![0u8; 32]
        }
    }

    /// Answer requests from `bus` until the task is aborted.
    ///
    /// The subscription is taken before the task starts, so requests
    /// published after this returns are never missed.
    pub fn spawn(self, bus: &Arc<InMemoryGossipBus>, config: &QueryConfig) -> JoinHandle<()> {
        let mut requests = bus.subscribe(&config.request_topic).into_stream();
        let bus = Arc::clone(bus);
        let response_topic = config.response_topic.clone();

        tokio::spawn(async move {
            while let Some(bytes) = requests.next().await {
                let Ok(GossipMessage::SignedQueryRequest(request)) = GossipMessage::decode(&bytes)
                else {
                    continue;
                };
                let Some(response) = self.answer(&request) else {
                    continue;
                };
                match GossipMessage::from(response).encode() {
                    Ok(envelope) => {
                        bus.publish(&response_topic, envelope).await;
                    }
                    Err(e) => warn!(error = %e, "Failed to encode response"),
                }
            }
        })
    }
}

fn eth_call_response(block: BlockInfo, results: Vec<Vec<u8>>) -> EthCallQueryResponse {
    EthCallQueryResponse {
        block_number: block.number,
        block_hash: block.hash,
        block_time: block.time,
        results,
    }
}

fn abi_uint(value: U256) -> Vec<u8> {
    let mut word = vec![0u8; 32];
    value.to_big_endian(&mut word);
    word
}

fn abi_string(s: &str) -> Vec<u8> {
    let padded = s.len().div_ceil(32) * 32;
    let mut data = abi_uint(U256::from(32));
    data.extend(abi_uint(U256::from(s.len())));
    data.extend_from_slice(s.as_bytes());
    data.resize(64 + padded, 0);
    data
}

/// A running set of simulated guardians sharing one bus.
pub struct GuardianNetwork {
    bus: Arc<InMemoryGossipBus>,
    addresses: Vec<Address>,
    handles: Vec<JoinHandle<()>>,
}

impl GuardianNetwork {
    /// Spawn every guardian on `bus`. Guardian `i` gets guardian index `i`.
    pub fn start(
        bus: Arc<InMemoryGossipBus>,
        guardians: Vec<SimulatedGuardian>,
        config: &QueryConfig,
    ) -> Self {
        let addresses = guardians.iter().map(SimulatedGuardian::address).collect();
        let handles = guardians
            .into_iter()
            .map(|g| g.spawn(&bus, config))
            .collect();
        Self {
            bus,
            addresses,
            handles,
        }
    }

    /// One fresh guardian per entry in `behaviors`.
    pub fn with_behaviors(
        bus: Arc<InMemoryGossipBus>,
        behaviors: &[Behavior],
        config: &QueryConfig,
    ) -> Self {
        let guardians = behaviors
            .iter()
            .map(|b| SimulatedGuardian::new(config.environment).with_behavior(*b))
            .collect();
        Self::start(bus, guardians, config)
    }

    pub fn bus(&self) -> &Arc<InMemoryGossipBus> {
        &self.bus
    }

    pub fn addresses(&self) -> &[Address] {
        &self.addresses
    }

    pub fn guardian_set(&self, index: u32) -> Result<GuardianSet, GuardianSetError> {
        GuardianSet::new(index, self.addresses.clone())
    }
}

impl Drop for GuardianNetwork {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abi_string_layout() {
        let data = abi_string(TOKEN_NAME);
        assert_eq!(data.len(), 96);
        assert_eq!(data[31], 0x20);
        assert_eq!(data[63], TOKEN_NAME.len() as u8);
        assert_eq!(&data[64..64 + TOKEN_NAME.len()], TOKEN_NAME.as_bytes());
    }

    #[test]
    fn test_silent_guardian_never_answers() {
        let request = SignedQueryRequest::new(
            vec![1],
            ccq_verifier::RecoverableSignature::from_bytes([0; 65]),
        );
        let guardian = SimulatedGuardian::new(Environment::DevNet).with_behavior(Behavior::Silent);
        assert!(guardian.answer(&request).is_none());
    }
}
