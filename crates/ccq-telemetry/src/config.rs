//! Telemetry configuration from environment variables.

use crate::TelemetryError;
use shared_types::Environment;
use std::env;

/// Configuration for logging and metrics.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name for log lines
    pub service_name: String,

    /// Log level filter (trace, debug, info, warn, error)
    pub log_level: String,

    /// Whether to enable JSON formatted logs
    pub json_logs: bool,

    /// Network the service runs against
    pub network: Environment,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "ccq-verifier".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            network: Environment::DevNet,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `CCQ_SERVICE_NAME`: Service name (default: ccq-verifier)
    /// - `CCQ_LOG_LEVEL` or `RUST_LOG`: Log level (default: info)
    /// - `CCQ_JSON_LOGS`: Enable JSON logs (default: false in dev, true in containers)
    /// - `CCQ_ENVIRONMENT`: mainnet, testnet or devnet (default: devnet)
    pub fn from_env() -> Result<Self, TelemetryError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, TelemetryError> {
        let is_container =
            lookup("KUBERNETES_SERVICE_HOST").is_some() || lookup("DOCKER_CONTAINER").is_some();

        let network = match lookup("CCQ_ENVIRONMENT") {
            Some(name) => name
                .parse()
                .map_err(|e| TelemetryError::Config(format!("CCQ_ENVIRONMENT: {e}")))?,
            None => Environment::DevNet,
        };

        Ok(Self {
            service_name: lookup("CCQ_SERVICE_NAME").unwrap_or_else(|| "ccq-verifier".to_string()),

            log_level: lookup("CCQ_LOG_LEVEL")
                .or_else(|| lookup("RUST_LOG"))
                .unwrap_or_else(|| "info".to_string()),

            json_logs: lookup("CCQ_JSON_LOGS")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(is_container),

            network,
        })
    }

    /// Service name qualified with the network, e.g. `ccq-verifier-mainnet`.
    pub fn full_service_name(&self) -> String {
        format!("{}-{}", self.service_name, self.network.as_str())
    }
}
