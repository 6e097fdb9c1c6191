use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Retry budget used when none is configured.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// How a saga type reacts to a failed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CompensationStrategy {
    /// Record the failure and stop; an operator decides what happens next.
    Manual,
    /// Re-run the failed step until `max_retries` attempts were made, then compensate.
    RetryThenCompensate,
    /// Compensate completed steps in reverse order right away.
    #[default]
    Immediate,
}

/// Per-saga-type configuration.
///
/// Deserializes from TOML; every key is optional:
///
/// ```toml
/// saga_type = "order-fulfilment"
/// compensation_strategy = "retry-then-compensate"
/// max_retries = 5
/// default_step_timeout_ms = 30000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SagaOptions {
    saga_type: String,
    compensation_strategy: CompensationStrategy,
    max_retries: u32,
    default_step_timeout_ms: Option<u64>,
}

impl Default for SagaOptions {
    fn default() -> Self {
        Self {
            saga_type: String::new(),
            compensation_strategy: CompensationStrategy::default(),
            max_retries: DEFAULT_MAX_RETRIES,
            default_step_timeout_ms: None,
        }
    }
}

impl SagaOptions {
    #[must_use]
    pub fn new(saga_type: impl Into<String>) -> Self {
        Self {
            saga_type: saga_type.into(),
            ..Self::default()
        }
    }

    /// # Errors
    ///
    /// Returns `ConfigError::Parse` for malformed TOML or unknown keys, and
    /// `ConfigError::ZeroRetries` when retrying is configured with no attempts.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let options: Self = toml::from_str(content)?;
        options.validate()?;
        Ok(options)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.compensation_strategy == CompensationStrategy::RetryThenCompensate
            && self.max_retries == 0
        {
            return Err(ConfigError::ZeroRetries);
        }
        Ok(())
    }

    #[must_use]
    pub fn with_compensation_strategy(mut self, strategy: CompensationStrategy) -> Self {
        self.compensation_strategy = strategy;
        self
    }

    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn with_default_step_timeout(mut self, timeout: Duration) -> Self {
        self.default_step_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    #[must_use]
    pub fn saga_type(&self) -> &str {
        &self.saga_type
    }

    #[must_use]
    pub fn compensation_strategy(&self) -> CompensationStrategy {
        self.compensation_strategy
    }

    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    #[must_use]
    pub fn default_step_timeout(&self) -> Option<Duration> {
        self.default_step_timeout_ms.map(Duration::from_millis)
    }
}
