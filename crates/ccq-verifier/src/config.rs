//! Query service configuration.

use shared_types::{Environment, ParseEnvironmentError};
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Default wait for a quorum.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub const DEFAULT_REQUEST_TOPIC: &str = "ccq_req";
pub const DEFAULT_RESPONSE_TOPIC: &str = "ccq_resp";

/// Configuration errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("CCQ_ENVIRONMENT: {0}")]
    Environment(#[from] ParseEnvironmentError),

    #[error("{var} must not be empty")]
    EmptyTopic { var: &'static str },
}

/// Settings for [`crate::QueryService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryConfig {
    /// Network whose digest prefixes are used
    pub environment: Environment,

    /// How long an issued query waits for a quorum
    pub request_timeout: Duration,

    /// Topic signed requests are published on
    pub request_topic: String,

    /// Topic guardian responses arrive on
    pub response_topic: String,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            environment: Environment::DevNet,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            request_topic: DEFAULT_REQUEST_TOPIC.to_string(),
            response_topic: DEFAULT_RESPONSE_TOPIC.to_string(),
        }
    }
}

impl QueryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `CCQ_ENVIRONMENT`: mainnet, testnet or devnet (default: devnet)
    /// - `CCQ_REQUEST_TIMEOUT_SECS`: quorum wait in seconds (default: 30)
    /// - `CCQ_REQUEST_TOPIC`: request topic (default: ccq_req)
    /// - `CCQ_RESPONSE_TOPIC`: response topic (default: ccq_resp)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let environment = match lookup("CCQ_ENVIRONMENT") {
            Some(name) => name.parse()?,
            None => defaults.environment,
        };

        let request_timeout = lookup("CCQ_REQUEST_TIMEOUT_SECS")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.request_timeout);

        let topic = |var: &'static str, default: String| match lookup(var) {
            Some(t) if t.trim().is_empty() => Err(ConfigError::EmptyTopic { var }),
            Some(t) => Ok(t),
            None => Ok(default),
        };

        Ok(Self {
            environment,
            request_timeout,
            request_topic: topic("CCQ_REQUEST_TOPIC", defaults.request_topic)?,
            response_topic: topic("CCQ_RESPONSE_TOPIC", defaults.response_topic)?,
        })
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_vars(vars: &[(&str, &str)]) -> Result<QueryConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        QueryConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = QueryConfig::default();
        assert_eq!(config.environment, Environment::DevNet);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.request_topic, "ccq_req");
        assert_eq!(config.response_topic, "ccq_resp");
    }

    #[test]
    fn test_overrides() {
        let config = from_vars(&[
            ("CCQ_ENVIRONMENT", "mainnet"),
            ("CCQ_REQUEST_TIMEOUT_SECS", "5"),
            ("CCQ_RESPONSE_TOPIC", "responses"),
        ])
        .unwrap();
        assert_eq!(config.environment, Environment::MainNet);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.request_topic, "ccq_req");
        assert_eq!(config.response_topic, "responses");
    }

    #[test]
    fn test_bad_timeout_falls_back() {
        let config = from_vars(&[("CCQ_REQUEST_TIMEOUT_SECS", "soon")]).unwrap();
        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
    }

    #[test]
    fn test_unknown_environment_is_error() {
        assert!(matches!(
            from_vars(&[("CCQ_ENVIRONMENT", "staging")]),
            Err(ConfigError::Environment(_))
        ));
    }

    #[test]
    fn test_empty_topic_is_error() {
        assert_eq!(
            from_vars(&[("CCQ_REQUEST_TOPIC", " ")]),
            Err(ConfigError::EmptyTopic {
                var: "CCQ_REQUEST_TOPIC"
            })
        );
    }
}
