//! # Integration Test Flows
//!
//! A requester-side `QueryService` and simulated guardians exchanging
//! envelopes over the in-memory gossip bus.
//!
//! ## Flows Tested:
//!
//! 1. **Happy path**: request published, guardians answer, quorum accepted
//! 2. **Partial answers**: silent or divergent guardians never form a quorum
//! 3. **Isolation**: wrong-network signatures and foreign requests are ignored
//! 4. **Lifecycle**: rotation, cancellation, concurrent queries via `run`

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use crate::guardian::{
        Behavior, GuardianNetwork, SimulatedGuardian, TOKEN_NAME, TOTAL_SUPPLY,
    };
    use ccq_verifier::{
        decode_results, function_selector, AbiResultDecoder, AbiType, AbiValue, ChainQuery,
        EthCallByTimestampQueryRequest, EthCallData, EthCallQueryRequest,
        EthCallWithFinalityQueryRequest, Finality, InMemoryTransport, PerChainQueryRequest,
        QueryApi, QueryConfig, QueryError, QueryRequest, QueryService, QuerySigner, QueryType,
        StaticGuardianSetProvider,
    };
    use k256::ecdsa::SigningKey;
    use primitive_types::U256;
    use shared_bus::InMemoryGossipBus;
    use shared_types::{parse_address, Address, Environment};
    use tokio::sync::watch;

    type Service = QueryService<InMemoryTransport, StaticGuardianSetProvider>;

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    fn weth() -> Address {
        parse_address("0x0d500b1d8e8ef31e21c99d1db9a6444d3adf1270").unwrap()
    }

    fn calls() -> Vec<EthCallData> {
        vec![
            EthCallData::new(weth(), function_selector("name()").to_vec()),
            EthCallData::new(weth(), function_selector("totalSupply()").to_vec()),
        ]
    }

    fn eth_call_request(nonce: u32) -> QueryRequest {
        QueryRequest::new(
            nonce,
            vec![PerChainQueryRequest::new(
                5,
                ChainQuery::EthCall(EthCallQueryRequest {
                    block_id: "0x28d9630".to_string(),
                    calls: calls(),
                }),
            )],
        )
        .unwrap()
    }

    fn random_signer() -> QuerySigner {
        QuerySigner::from_signing_key(SigningKey::random(&mut rand::thread_rng()))
    }

    fn config() -> QueryConfig {
        QueryConfig::default()
            .with_environment(Environment::DevNet)
            .with_request_timeout(Duration::from_secs(10))
    }

    /// Requester service wired to a running guardian network.
    struct Deployment {
        network: GuardianNetwork,
        provider: Arc<StaticGuardianSetProvider>,
        service: Arc<Service>,
    }

    impl Deployment {
        fn new(network: GuardianNetwork, requester: QuerySigner) -> Self {
            let provider = Arc::new(StaticGuardianSetProvider::new(
                network.guardian_set(0).unwrap(),
            ));
            let transport = Arc::new(InMemoryTransport::new(Arc::clone(network.bus())));
            let service = Arc::new(QueryService::new(
                config(),
                requester,
                transport,
                Arc::clone(&provider),
            ));
            Self {
                network,
                provider,
                service,
            }
        }

        fn with_behaviors(behaviors: &[Behavior]) -> Self {
            let bus = Arc::new(InMemoryGossipBus::new());
            let network = GuardianNetwork::with_behaviors(bus, behaviors, &config());
            Self::new(network, random_signer())
        }
    }

    fn decoder() -> AbiResultDecoder {
        AbiResultDecoder::new()
            .with_output("name()", AbiType::String)
            .with_output("totalSupply()", AbiType::Uint256)
    }

    // =============================================================================
    // HAPPY PATH
    // =============================================================================

    /// Five guardians, quorum of four: the fifth answer is never needed.
    #[tokio::test]
    async fn test_five_guardians_reach_quorum() {
        let d = Deployment::with_behaviors(&[Behavior::Honest; 5]);
        let (_tx, rx) = watch::channel(false);

        let request = eth_call_request(1);
        let result = d.service.query(request.clone(), rx).await.unwrap();

        assert_eq!(result.signer_indices.len(), 4);
        assert_eq!(result.signatures.len(), 4);
        assert_eq!(result.guardian_set_index, 0);
        assert!(result.signer_indices.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(d.service.pending_count(), 0);

        let values = decode_results(&request, &result.publication, &decoder()).unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].chain_id, 5);
        assert_eq!(values[0].query_type, QueryType::EthCall);
        assert_eq!(
            values[0].values,
            vec![
                AbiValue::String(TOKEN_NAME.to_string()),
                AbiValue::Uint(U256::from(TOTAL_SUPPLY)),
            ]
        );
    }

    /// Every signature in the result recovers to the guardian at its index.
    #[tokio::test]
    async fn test_quorum_signatures_recover_to_guardians() {
        let d = Deployment::with_behaviors(&[Behavior::Honest; 4]);
        let (_tx, rx) = watch::channel(false);

        let result = d.service.query(eth_call_request(1), rx).await.unwrap();

        let digest =
            ccq_verifier::query_response_digest(Environment::DevNet, &result.response_bytes);
        for (index, signature) in result.signer_indices.iter().zip(&result.signatures) {
            let signer = ccq_verifier::recover_address(&digest, signature).unwrap();
            assert_eq!(signer, d.network.addresses()[*index as usize]);
        }
    }

    #[tokio::test]
    async fn test_multi_chain_mixed_query_types() {
        let d = Deployment::with_behaviors(&[Behavior::Honest; 3]);
        let (_tx, rx) = watch::channel(false);

        let request = QueryRequest::new(
            2,
            vec![
                PerChainQueryRequest::new(
                    2,
                    ChainQuery::EthCallWithFinality(EthCallWithFinalityQueryRequest {
                        block_id: "0x1234".to_string(),
                        finality: Finality::Finalized,
                        calls: calls(),
                    }),
                ),
                PerChainQueryRequest::new(
                    23,
                    ChainQuery::EthCallByTimestamp(EthCallByTimestampQueryRequest {
                        target_timestamp: 1_697_216_322_000_000,
                        target_block_id_hint: String::new(),
                        following_block_id_hint: String::new(),
                        calls: calls(),
                    }),
                ),
            ],
        )
        .unwrap();

        let result = d.service.query(request.clone(), rx).await.unwrap();
        let values = decode_results(&request, &result.publication, &decoder()).unwrap();

        assert_eq!(values.len(), 2);
        assert_eq!(values[0].query_type, QueryType::EthCallWithFinality);
        assert_eq!(values[0].following_block, None);
        assert_eq!(values[1].query_type, QueryType::EthCallByTimestamp);
        assert_eq!(
            values[1].following_block.map(|b| b.number),
            Some(values[1].block.number + 1)
        );
    }

    // =============================================================================
    // PARTIAL ANSWERS
    // =============================================================================

    #[tokio::test(start_paused = true)]
    async fn test_two_of_five_times_out() {
        let d = Deployment::with_behaviors(&[
            Behavior::Honest,
            Behavior::Honest,
            Behavior::Silent,
            Behavior::Silent,
            Behavior::Silent,
        ]);
        let (_tx, rx) = watch::channel(false);

        let err = d.service.query(eth_call_request(1), rx).await.unwrap_err();

        assert!(matches!(err, QueryError::TimedOut { signers: 2, quorum: 4 }));
        assert_eq!(d.service.pending_count(), 0);
    }

    /// A minority answering differently cannot block an honest quorum.
    #[tokio::test]
    async fn test_divergent_minority_is_outvoted() {
        let d = Deployment::with_behaviors(&[
            Behavior::Divergent,
            Behavior::Honest,
            Behavior::Honest,
            Behavior::Honest,
            Behavior::Honest,
        ]);
        let (_tx, rx) = watch::channel(false);

        let request = eth_call_request(1);
        let result = d.service.query(request.clone(), rx).await.unwrap();

        assert_eq!(result.signer_indices, vec![1, 2, 3, 4]);
        let values = decode_results(&request, &result.publication, &decoder()).unwrap();
        assert_eq!(values[0].values[1], AbiValue::Uint(U256::from(TOTAL_SUPPLY)));
    }

    /// Split votes never combine into a quorum.
    #[tokio::test(start_paused = true)]
    async fn test_split_network_times_out() {
        let d = Deployment::with_behaviors(&[
            Behavior::Honest,
            Behavior::Honest,
            Behavior::Honest,
            Behavior::Divergent,
            Behavior::Divergent,
        ]);
        let (_tx, rx) = watch::channel(false);

        let err = d.service.query(eth_call_request(1), rx).await.unwrap_err();
        assert!(matches!(err, QueryError::TimedOut { signers: 3, quorum: 4 }));
    }

    // =============================================================================
    // ISOLATION
    // =============================================================================

    /// Signatures over another network's digest recover to strangers.
    #[tokio::test(start_paused = true)]
    async fn test_wrong_environment_signatures_never_count() {
        let bus = Arc::new(InMemoryGossipBus::new());
        let guardians = (0..4)
            .map(|_| SimulatedGuardian::new(Environment::MainNet))
            .collect();
        let network = GuardianNetwork::start(bus, guardians, &config());
        let d = Deployment::new(network, random_signer());
        let (_tx, rx) = watch::channel(false);

        let err = d.service.query(eth_call_request(1), rx).await.unwrap_err();
        assert!(matches!(err, QueryError::TimedOut { signers: 0, .. }));
    }

    /// Guardians only answer permitted requesters.
    #[tokio::test(start_paused = true)]
    async fn test_guardians_enforce_requester_allowlist() {
        let permitted = random_signer();
        let permitted_address = permitted.address();

        let bus = Arc::new(InMemoryGossipBus::new());
        let guardians = (0..4)
            .map(|_| {
                SimulatedGuardian::new(Environment::DevNet)
                    .with_allowed_requesters(vec![permitted_address])
            })
            .collect::<Vec<_>>();
        let network = GuardianNetwork::start(Arc::clone(&bus), guardians, &config());

        // A stranger's query goes unanswered.
        let stranger = Deployment::new(network, random_signer());
        let (_tx, rx) = watch::channel(false);
        let err = stranger.service.query(eth_call_request(1), rx).await.unwrap_err();
        assert!(matches!(err, QueryError::TimedOut { signers: 0, .. }));

        // The permitted requester gets a quorum from the same guardians.
        let allowed = Deployment::new(stranger.network, permitted);
        let (_tx, rx) = watch::channel(false);
        assert!(allowed.service.query(eth_call_request(1), rx).await.is_ok());
    }

    /// Responses to another requester's query do not leak into ours.
    #[tokio::test]
    async fn test_concurrent_requesters_are_isolated() {
        let bus = Arc::new(InMemoryGossipBus::new());
        let network = GuardianNetwork::with_behaviors(bus, &[Behavior::Honest; 4], &config());
        let set = network.guardian_set(0).unwrap();
        let a = Deployment::new(network, random_signer());

        let transport = Arc::new(InMemoryTransport::new(Arc::clone(a.network.bus())));
        let b = QueryService::new(
            config(),
            random_signer(),
            transport,
            Arc::new(StaticGuardianSetProvider::new(set)),
        );

        let (_tx, rx) = watch::channel(false);
        let (ra, rb) = tokio::join!(
            a.service.query(eth_call_request(1), rx.clone()),
            b.query(eth_call_request(1), rx)
        );

        let (ra, rb) = (ra.unwrap(), rb.unwrap());
        assert_ne!(ra.publication.request, rb.publication.request);
    }

    // =============================================================================
    // LIFECYCLE
    // =============================================================================

    /// A rotation after issuance leaves the outstanding query on the old set.
    #[tokio::test]
    async fn test_rotation_after_issue_keeps_snapshot() {
        let d = Deployment::with_behaviors(&[Behavior::Honest; 4]);
        let (tx, rx) = watch::channel(false);

        let listener = {
            let service = Arc::clone(&d.service);
            let rx = rx.clone();
            tokio::spawn(async move { service.run(rx).await })
        };
        wait_for_subscribers(&d, 5).await;

        let pending = d.service.issue(eth_call_request(1)).await.unwrap();
        let replacement = ccq_verifier::GuardianSet::new(1, vec![[0xee; 20]; 1]).unwrap();
        d.provider.rotate(replacement).unwrap();

        let result = pending.wait(rx).await.unwrap();
        assert_eq!(result.guardian_set_index, 0);
        assert_eq!(result.signer_indices.len(), 3);

        tx.send(true).unwrap();
        assert!(listener.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_run_serves_concurrent_queries() {
        let d = Deployment::with_behaviors(&[Behavior::Honest; 7]);
        let (tx, rx) = watch::channel(false);

        let listener = {
            let service = Arc::clone(&d.service);
            let rx = rx.clone();
            tokio::spawn(async move { service.run(rx).await })
        };
        wait_for_subscribers(&d, 8).await;

        let mut pending = Vec::new();
        for nonce in 1..=3 {
            pending.push(d.service.issue(eth_call_request(nonce)).await.unwrap());
        }
        assert_eq!(d.service.pending_count(), 3);

        for query in pending {
            let result = query.wait(rx.clone()).await.unwrap();
            // n = 7 tolerates two faults.
            assert_eq!(result.signer_indices.len(), 5);
        }
        assert_eq!(d.service.pending_count(), 0);

        tx.send(true).unwrap();
        assert!(listener.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_shutdown_cancels_query() {
        let d = Deployment::with_behaviors(&[Behavior::Silent; 4]);
        let (tx, rx) = watch::channel(false);

        let query = {
            let service = Arc::clone(&d.service);
            tokio::spawn(async move { service.query(eth_call_request(1), rx).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        tx.send(true).unwrap();

        assert!(matches!(query.await.unwrap(), Err(QueryError::Cancelled)));
        assert_eq!(d.service.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_metrics_exported_after_query() {
        ccq_telemetry::register_metrics().unwrap();
        let d = Deployment::with_behaviors(&[Behavior::Honest; 4]);
        let (_tx, rx) = watch::channel(false);

        d.service.query(eth_call_request(1), rx).await.unwrap();

        let text = ccq_telemetry::gather_metrics().unwrap();
        assert!(text.contains("ccq_queries_issued_total"));
        assert!(text.contains("ccq_queries_completed_total{outcome=\"quorum\"}"));
        assert!(text.contains("ccq_quorum_latency_seconds_count"));
    }

    /// Yield until the bus has `expected` live subscriptions.
    async fn wait_for_subscribers(d: &Deployment, expected: usize) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while d.network.bus().subscriber_count() < expected {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("listener did not subscribe");
    }
}
