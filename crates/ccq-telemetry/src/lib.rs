//! # CCQ Telemetry
//!
//! Observability for the cross-chain query verifier.
//!
//! ## Components
//!
//! - **Logging**: `tracing-subscriber` with an env filter and optional JSON output
//! - **Metrics**: Prometheus counters for issued queries, accepted and rejected
//!   responses, and quorum latency
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ccq_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() {
//!     let config = TelemetryConfig::from_env().expect("Invalid telemetry config");
//!     let _guard = init_telemetry(&config).expect("Failed to init telemetry");
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `CCQ_SERVICE_NAME` | `ccq-verifier` | Service name in log lines |
//! | `CCQ_LOG_LEVEL` / `RUST_LOG` | `info` | Log level filter |
//! | `CCQ_JSON_LOGS` | `false` | Emit JSON formatted logs |
//! | `CCQ_ENVIRONMENT` | `devnet` | Network attached to logs, rejected if unknown |

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::{init_logging, LoggingGuard};
pub use metrics::{
    gather_metrics, register_metrics, MetricsHandle, QUERIES_COMPLETED, QUERIES_ISSUED,
    QUORUM_LATENCY, RESPONSES_ACCEPTED, RESPONSES_REJECTED,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Initialize logging and register metrics.
///
/// Returns a guard that should be held for the lifetime of the application.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let metrics = register_metrics()?;
    let logging = init_logging(config)?;

    tracing::info!(
        service = %config.service_name,
        network = %config.network,
        "Telemetry initialized"
    );

    Ok(TelemetryGuard {
        _logging: logging,
        _metrics: metrics,
    })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    _logging: LoggingGuard,
    _metrics: MetricsHandle,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!("Shutting down telemetry...");
    }
}
