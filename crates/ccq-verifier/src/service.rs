//! # Query Service
//!
//! Application service that implements the `QueryApi` trait.
//!
//! ## Architecture
//!
//! This is the hexagonal "application service" that:
//! - Implements the inbound port (`QueryApi`)
//! - Uses the outbound ports (`QueryTransport`, `GuardianSetProvider`)
//! - Delegates signing, validation and vote counting to the domain layer
//!
//! ## Flow
//!
//! ```text
//! issue() ──sign──→ publish(request_topic)
//!    │
//!    └─→ pending[key] = aggregator
//!
//! response_topic ──decode──→ submit_response() ──→ pending[key].submit()
//!                                                        │ quorum
//!                                                        ▼
//!                                          PendingQuery::wait() returns
//! ```

use crate::adapters::envelope::GossipMessage;
use crate::config::QueryConfig;
use crate::domain::aggregator::{
    AggregatorState, AggregatorStats, QuorumResult, ResponseAggregator, SubmitOutcome,
};
use crate::domain::ecdsa::QuerySigner;
use crate::domain::errors::{QueryError, RejectReason, TransportError};
use crate::domain::guardian_set::GuardianRegistry;
use crate::domain::request::{QueryRequest, RequestKey, SignedQueryRequest};
use crate::domain::response::SignedQueryResponse;
use crate::ports::inbound::QueryApi;
use crate::ports::outbound::{GuardianSetProvider, QueryTransport};
use async_trait::async_trait;
use ccq_telemetry::{
    QUERIES_COMPLETED, QUERIES_ISSUED, QUORUM_LATENCY, RESPONSES_ACCEPTED, RESPONSES_REJECTED,
};
use parking_lot::{Mutex, RwLock};
use shared_types::to_hex;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Notify};
use tokio::time::Instant;
use tokio_stream::StreamExt;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

struct PendingEntry {
    query_id: Uuid,
    aggregator: Arc<Mutex<ResponseAggregator>>,
    notify: Arc<Notify>,
}

type PendingMap = Arc<RwLock<HashMap<RequestKey, PendingEntry>>>;

/// Cross-chain query service.
///
/// Owns the requester key and the table of outstanding queries. Responses
/// reach it either through [`QueryService::run`], through
/// [`QueryApi::query`], or by calling [`QueryApi::submit_response`] directly.
pub struct QueryService<T: QueryTransport, G: GuardianSetProvider> {
    config: QueryConfig,
    signer: Arc<QuerySigner>,
    transport: Arc<T>,
    guardians: Arc<G>,
    pending: PendingMap,
}

impl<T: QueryTransport, G: GuardianSetProvider> QueryService<T, G> {
    /// Create a new query service.
    ///
    /// # Arguments
    /// * `config` - Environment, timeout and topic names
    /// * `signer` - Requester key used to sign every issued query
    /// * `transport` - Gossip transport for requests and responses
    /// * `guardians` - Source of the guardian set snapshot taken per query
    pub fn new(
        config: QueryConfig,
        signer: QuerySigner,
        transport: Arc<T>,
        guardians: Arc<G>,
    ) -> Self {
        info!(
            environment = %config.environment,
            requester = %to_hex(&signer.address()),
            "Query service created"
        );
        Self {
            config,
            signer: Arc::new(signer),
            transport,
            guardians,
            pending: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Decode one gossip envelope and route it if it is a response.
    ///
    /// Undecodable envelopes and requests are dropped.
    pub fn handle_message(&self, bytes: &[u8]) -> Option<SubmitOutcome> {
        match GossipMessage::decode(bytes) {
            Ok(GossipMessage::SignedQueryResponse(response)) => self.submit_response(&response),
            Ok(other) => {
                trace!(kind = other.kind(), "Ignoring envelope");
                None
            }
            Err(e) => {
                debug!(error = %e, bytes = bytes.len(), "Dropping undecodable envelope");
                None
            }
        }
    }

    /// Feed responses from the response topic to outstanding queries until
    /// `shutdown` flips to true.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), QueryError> {
        let mut responses = self.transport.subscribe(&self.config.response_topic).await?;
        info!(topic = %self.config.response_topic, "Response listener started");

        if *shutdown.borrow() {
            return Ok(());
        }

        loop {
            tokio::select! {
                message = responses.next() => match message {
                    Some(bytes) => {
                        self.handle_message(&bytes);
                    }
                    None => {
                        warn!("Response stream closed");
                        return Err(TransportError::Closed.into());
                    }
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!(pending = self.pending_count(), "Shutdown signal received");
                        return Ok(());
                    }
                }
            }
        }
    }

    fn record_outcome(query_id: Uuid, outcome: &SubmitOutcome) {
        match outcome {
            SubmitOutcome::Accepted {
                guardian_index,
                duplicate,
            } => {
                if !duplicate {
                    RESPONSES_ACCEPTED.inc();
                }
                debug!(%query_id, guardian_index, duplicate, "Response accepted");
            }
            SubmitOutcome::Rejected(reason) => {
                RESPONSES_REJECTED.with_label_values(&[reason.kind()]).inc();
                match reason {
                    RejectReason::TooLate => debug!(%query_id, "Response arrived too late"),
                    _ => warn!(%query_id, reason = %reason, "Response rejected"),
                }
            }
            SubmitOutcome::QuorumReached(result) => {
                RESPONSES_ACCEPTED.inc();
                info!(
                    %query_id,
                    signers = result.signer_indices.len(),
                    guardian_set = result.guardian_set_index,
                    "Quorum reached"
                );
            }
        }
    }
}

#[async_trait]
impl<T: QueryTransport, G: GuardianSetProvider> QueryApi for QueryService<T, G> {
    async fn issue(&self, request: QueryRequest) -> Result<PendingQuery, QueryError> {
        request.validate()?;
        let environment = self.config.environment;
        let signed = SignedQueryRequest::sign(&request, environment, &self.signer)?;
        let key = signed.key();

        let registry = GuardianRegistry::new(self.guardians.current());
        let guardian_set = registry.guardian_set_index();
        let issued_at = Instant::now();
        let deadline = issued_at + self.config.request_timeout;
        let aggregator = ResponseAggregator::new(environment, signed.clone(), registry, deadline)?;
        let quorum = aggregator.quorum();

        let query_id = Uuid::new_v4();
        let aggregator = Arc::new(Mutex::new(aggregator));
        let notify = Arc::new(Notify::new());

        {
            let mut pending = self.pending.write();
            match pending.entry(key) {
                Entry::Occupied(_) => return Err(QueryError::AlreadyPending),
                Entry::Vacant(slot) => {
                    slot.insert(PendingEntry {
                        query_id,
                        aggregator: Arc::clone(&aggregator),
                        notify: Arc::clone(&notify),
                    });
                }
            }
        }

        // Dropping the handle on a failed publish clears the pending entry.
        let pending = PendingQuery {
            query_id,
            key,
            request: signed.clone(),
            aggregator,
            notify,
            deadline,
            issued_at,
            pending: Arc::clone(&self.pending),
        };

        let envelope = GossipMessage::from(signed).encode()?;
        self.transport
            .publish(&self.config.request_topic, envelope)
            .await?;

        QUERIES_ISSUED.inc();
        info!(
            %query_id,
            request = %key,
            nonce = request.nonce(),
            chains = request.per_chain_queries().len(),
            guardian_set,
            quorum,
            "Query issued"
        );
        Ok(pending)
    }

    async fn query(
        &self,
        request: QueryRequest,
        shutdown: watch::Receiver<bool>,
    ) -> Result<QuorumResult, QueryError> {
        // Subscribe first so no response can slip past.
        let mut responses = self.transport.subscribe(&self.config.response_topic).await?;
        let pending = self.issue(request).await?;

        let wait = pending.wait(shutdown);
        tokio::pin!(wait);

        loop {
            tokio::select! {
                result = &mut wait => return result,
                message = responses.next() => match message {
                    Some(bytes) => {
                        self.handle_message(&bytes);
                    }
                    None => return Err(TransportError::Closed.into()),
                },
            }
        }
    }

    fn submit_response(&self, response: &SignedQueryResponse) -> Option<SubmitOutcome> {
        let key = match response.header() {
            Ok(header) => header.request_key(),
            Err(e) => {
                debug!(error = %e, "Response header unreadable");
                return None;
            }
        };

        let (query_id, aggregator, notify) = {
            let pending = self.pending.read();
            let Some(entry) = pending.get(&key) else {
                trace!(request = %key, "Response for unknown request");
                return None;
            };
            (
                entry.query_id,
                Arc::clone(&entry.aggregator),
                Arc::clone(&entry.notify),
            )
        };

        let outcome = aggregator.lock().submit(response);
        Self::record_outcome(query_id, &outcome);
        if matches!(outcome, SubmitOutcome::QuorumReached(_)) {
            notify.notify_one();
        }
        Some(outcome)
    }

    fn pending_count(&self) -> usize {
        self.pending.read().len()
    }
}

// =============================================================================
// PENDING QUERY
// =============================================================================

/// Handle to one outstanding query.
///
/// Dropping it abandons the query: later responses for it are ignored.
pub struct PendingQuery {
    query_id: Uuid,
    key: RequestKey,
    request: SignedQueryRequest,
    aggregator: Arc<Mutex<ResponseAggregator>>,
    notify: Arc<Notify>,
    deadline: Instant,
    issued_at: Instant,
    pending: PendingMap,
}

impl PendingQuery {
    /// Correlation id used in log lines for this query.
    pub fn query_id(&self) -> Uuid {
        self.query_id
    }

    pub fn key(&self) -> RequestKey {
        self.key
    }

    /// The signed request as published.
    pub fn request(&self) -> &SignedQueryRequest {
        &self.request
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn state(&self) -> AggregatorState {
        self.aggregator.lock().state()
    }

    pub fn stats(&self) -> AggregatorStats {
        self.aggregator.lock().stats().clone()
    }

    /// Wait for a quorum, the deadline, or `shutdown`, whichever comes first.
    pub async fn wait(self, mut shutdown: watch::Receiver<bool>) -> Result<QuorumResult, QueryError> {
        loop {
            if let Some(result) = self.outcome(Instant::now()) {
                return result;
            }
            if *shutdown.borrow() {
                return self.cancelled();
            }

            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep_until(self.deadline) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return self.cancelled();
                    }
                }
            }
        }
    }

    /// Terminal result if the aggregator has one at `now`.
    fn outcome(&self, now: Instant) -> Option<Result<QuorumResult, QueryError>> {
        let mut aggregator = self.aggregator.lock();
        aggregator.expire_at(now);

        match aggregator.state() {
            AggregatorState::Collecting => None,
            AggregatorState::QuorumReached => {
                let result = aggregator.result().cloned()?;
                let elapsed = now.saturating_duration_since(self.issued_at);
                QUERIES_COMPLETED.with_label_values(&["quorum"]).inc();
                QUORUM_LATENCY.observe(elapsed.as_secs_f64());
                info!(
                    query_id = %self.query_id,
                    latency_ms = elapsed.as_millis() as u64,
                    "Query completed"
                );
                Some(Ok(result))
            }
            AggregatorState::TimedOut => {
                let signers = aggregator.leading_votes();
                let quorum = aggregator.quorum();
                QUERIES_COMPLETED.with_label_values(&["timeout"]).inc();
                warn!(query_id = %self.query_id, signers, quorum, "Query timed out");
                Some(Err(QueryError::TimedOut { signers, quorum }))
            }
        }
    }

    fn cancelled(&self) -> Result<QuorumResult, QueryError> {
        QUERIES_COMPLETED.with_label_values(&["cancelled"]).inc();
        info!(query_id = %self.query_id, "Query cancelled");
        Err(QueryError::Cancelled)
    }
}

impl Drop for PendingQuery {
    fn drop(&mut self) {
        self.pending.write().remove(&self.key);
    }
}

impl std::fmt::Debug for PendingQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingQuery")
            .field("query_id", &self.query_id)
            .field("key", &self.key)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}
