//! Structured logging setup.
//!
//! Logs carry consistent fields so they can be filtered per query:
//! - `query_id`: correlation id assigned when a query is issued
//! - `guardian_index`: index of the responding guardian in its set
//! - `reason`: rejection reason for a discarded response

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{TelemetryConfig, TelemetryError};

/// Marker returned once the global subscriber is installed.
pub struct LoggingGuard {
    _initialized: bool,
}

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over `config.log_level`. Fails if a global
/// subscriber was already installed.
pub fn init_logging(config: &TelemetryConfig) -> Result<LoggingGuard, TelemetryError> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| TelemetryError::Config(e.to_string()))?;

    let result = if config.json_logs {
        // JSON output for containers/production
        let json_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(json_layer)
            .try_init()
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
    };

    result.map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;

    tracing::debug!(
        service = %config.full_service_name(),
        json_logs = config.json_logs,
        "Structured logging configured"
    );

    Ok(LoggingGuard { _initialized: true })
}
