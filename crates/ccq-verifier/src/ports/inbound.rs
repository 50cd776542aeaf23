//! # Inbound Ports (Driving Ports / API)
//!
//! The public API of the query verifier.

use crate::domain::aggregator::{QuorumResult, SubmitOutcome};
use crate::domain::errors::QueryError;
use crate::domain::request::QueryRequest;
use crate::domain::response::SignedQueryResponse;
use crate::service::PendingQuery;
use async_trait::async_trait;
use tokio::sync::watch;

/// Primary cross-chain query API.
///
/// Implementations must be thread-safe (`Send + Sync`).
#[async_trait]
pub trait QueryApi: Send + Sync {
    /// Sign and publish `request`, returning a handle to await its quorum.
    ///
    /// The guardian set is captured here; rotations after this call do not
    /// affect the returned query.
    async fn issue(&self, request: QueryRequest) -> Result<PendingQuery, QueryError>;

    /// Issue `request` and drive inbound responses until it completes.
    async fn query(
        &self,
        request: QueryRequest,
        shutdown: watch::Receiver<bool>,
    ) -> Result<QuorumResult, QueryError>;

    /// Route one guardian response to its outstanding request.
    ///
    /// Returns `None` when no outstanding request matches.
    fn submit_response(&self, response: &SignedQueryResponse) -> Option<SubmitOutcome>;

    /// Number of requests still awaiting an outcome.
    fn pending_count(&self) -> usize;
}
