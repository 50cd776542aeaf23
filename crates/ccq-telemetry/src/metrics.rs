//! Prometheus metrics for the query verifier.
//!
//! All metrics follow the naming convention: `ccq_<metric>_<unit>`

use lazy_static::lazy_static;
use prometheus::{Counter, CounterVec, Encoder, Histogram, HistogramOpts, Opts, Registry, TextEncoder};
use std::sync::Arc;

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    /// Total queries signed and published
    pub static ref QUERIES_ISSUED: Counter = Counter::new(
        "ccq_queries_issued_total",
        "Total number of cross-chain queries issued"
    ).expect("metric creation failed");

    /// Queries that reached a terminal outcome
    pub static ref QUERIES_COMPLETED: CounterVec = CounterVec::new(
        Opts::new("ccq_queries_completed_total", "Queries by terminal outcome"),
        &["outcome"]  // outcome: quorum/timeout/cancelled
    ).expect("metric creation failed");

    /// Guardian responses accepted toward a quorum
    pub static ref RESPONSES_ACCEPTED: Counter = Counter::new(
        "ccq_responses_accepted_total",
        "Total guardian responses accepted"
    ).expect("metric creation failed");

    /// Guardian responses rejected, by reason
    pub static ref RESPONSES_REJECTED: CounterVec = CounterVec::new(
        Opts::new("ccq_responses_rejected_total", "Guardian responses rejected by reason"),
        &["reason"]
    ).expect("metric creation failed");

    /// Time from issuing a query to reaching quorum
    pub static ref QUORUM_LATENCY: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "ccq_quorum_latency_seconds",
            "Time from query issuance to quorum"
        ).buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0])
    ).expect("metric creation failed");
}

/// Handle for the registered metrics
pub struct MetricsHandle {
    _registry: Arc<Registry>,
}

/// Register all metrics with the global registry.
///
/// Calling this more than once is harmless.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(QUERIES_ISSUED.clone()),
        Box::new(QUERIES_COMPLETED.clone()),
        Box::new(RESPONSES_ACCEPTED.clone()),
        Box::new(RESPONSES_REJECTED.clone()),
        Box::new(QUORUM_LATENCY.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(MetricsHandle {
        _registry: Arc::new(REGISTRY.clone()),
    })
}

/// Encode all metrics as Prometheus text format.
pub fn gather_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}
