//! Engine configuration
//!
//! Every knob has a default matching the engine's documented behavior, so an
//! empty TOML document yields the stock configuration.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Adaptive batch sizing
    pub batch: BatchConfig,
    /// Retry and backoff
    pub retry: RetryConfig,
    /// Progress notifications
    pub progress: ProgressConfig,
}

impl EngineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a TOML document
    ///
    /// # Errors
    /// `ConfigError::Parse` on malformed TOML, `ConfigError::Invalid` on
    /// inconsistent values.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// With batch configuration
    #[inline]
    #[must_use]
    pub fn with_batch(mut self, batch: BatchConfig) -> Self {
        self.batch = batch;
        self
    }

    /// With retry configuration
    #[inline]
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// With progress configuration
    #[inline]
    #[must_use]
    pub fn with_progress(mut self, progress: ProgressConfig) -> Self {
        self.progress = progress;
        self
    }

    /// Check cross-field invariants
    ///
    /// # Errors
    /// `ConfigError::Invalid` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.batch.validate()?;
        self.retry.validate()
    }
}

/// Adaptive batch sizing parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Size of the first batch
    pub initial_size: usize,
    /// Floor, used right after any failure
    pub min_size: usize,
    /// Ceiling
    pub max_size: usize,
    /// Clean batches needed before growing
    pub growth_threshold: u32,
    /// Items added per growth step
    pub growth_step: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            initial_size: 100,
            min_size: 25,
            max_size: 100,
            growth_threshold: 5,
            growth_step: 25,
        }
    }
}

impl BatchConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.min_size == 0 {
            return Err(ConfigError::invalid("batch.min_size", "must be at least 1"));
        }
        if self.min_size > self.max_size {
            return Err(ConfigError::invalid(
                "batch.min_size",
                format!("{} exceeds max_size {}", self.min_size, self.max_size),
            ));
        }
        if !(self.min_size..=self.max_size).contains(&self.initial_size) {
            return Err(ConfigError::invalid(
                "batch.initial_size",
                format!(
                    "{} outside [{}, {}]",
                    self.initial_size, self.min_size, self.max_size
                ),
            ));
        }
        if self.growth_threshold == 0 {
            return Err(ConfigError::invalid(
                "batch.growth_threshold",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Retry policy parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Additional attempts after the first one
    pub max_retries: u32,
    /// Delay before each retry; the last entry is reused past the end
    pub backoff_ms: Vec<u64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_ms: vec![1000, 2000, 4000],
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `retry` (0-based)
    #[must_use]
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let idx = (retry as usize).min(self.backoff_ms.len().saturating_sub(1));
        Duration::from_millis(self.backoff_ms.get(idx).copied().unwrap_or(0))
    }

    /// No retries at all
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            backoff_ms: vec![0],
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.backoff_ms.is_empty() {
            return Err(ConfigError::invalid(
                "retry.backoff_ms",
                "schedule must contain at least one delay",
            ));
        }
        Ok(())
    }
}

/// Progress notification parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    /// Minimum spacing between non-terminal progress updates
    pub throttle_ms: u64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self { throttle_ms: 150 }
    }
}

impl ProgressConfig {
    /// Throttle interval
    #[inline]
    #[must_use]
    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }
}
