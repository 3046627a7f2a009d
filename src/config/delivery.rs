//! Delivery scheduler configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ExecutorConfig;

/// Environment variable prefix read by [`DeliveryConfig::from_env`].
pub const ENV_PREFIX: &str = "TELEMETRY_DELIVERY_";

/// Configuration for a [`DeliveryScheduler`](crate::core::DeliveryScheduler).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Delay after the first failing cycle, in milliseconds.
    pub initial_delay_ms: u64,
    /// Optional ceiling on the inter-cycle delay. `None` keeps doubling.
    pub max_retry_interval_ms: Option<u64>,
    /// Worker configuration for the delivery context.
    pub delivery: ExecutorConfig,
    /// How long `shutdown_and_drain` waits for in-flight sends.
    pub shutdown_timeout_ms: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 60_000,
            max_retry_interval_ms: None,
            delivery: ExecutorConfig::default(),
            shutdown_timeout_ms: 5_000,
        }
    }
}

impl DeliveryConfig {
    /// Initial backoff delay.
    #[must_use]
    pub const fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    /// Optional backoff ceiling.
    #[must_use]
    pub fn max_retry_interval(&self) -> Option<Duration> {
        self.max_retry_interval_ms.map(Duration::from_millis)
    }

    /// Shutdown drain timeout.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Set the initial backoff delay.
    #[must_use]
    pub const fn with_initial_delay_ms(mut self, initial_delay_ms: u64) -> Self {
        self.initial_delay_ms = initial_delay_ms;
        self
    }

    /// Cap the backoff delay.
    #[must_use]
    pub const fn with_max_retry_interval_ms(mut self, max_ms: u64) -> Self {
        self.max_retry_interval_ms = Some(max_ms);
        self
    }

    /// Replace the delivery worker configuration.
    #[must_use]
    pub fn with_delivery(mut self, delivery: ExecutorConfig) -> Self {
        self.delivery = delivery;
        self
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.initial_delay_ms == 0 {
            return Err("initial_delay_ms must be greater than 0".into());
        }
        if let Some(max) = self.max_retry_interval_ms {
            if max < self.initial_delay_ms {
                return Err("max_retry_interval_ms must not be below initial_delay_ms".into());
            }
        }
        if self.shutdown_timeout_ms == 0 {
            return Err("shutdown_timeout_ms must be greater than 0".into());
        }
        self.delivery
            .validate()
            .map_err(|e| format!("delivery executor invalid: {e}"))
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation message.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load overrides from `TELEMETRY_DELIVERY_*` environment variables,
    /// reading a `.env` file first if one exists.
    ///
    /// # Errors
    ///
    /// Returns a message naming the variable that failed to parse, or a
    /// validation message.
    pub fn from_env() -> Result<Self, String> {
        // A missing .env file is fine.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from defaults plus overrides supplied by `lookup`, keyed by the
    /// full variable name.
    ///
    /// # Errors
    ///
    /// Same as [`from_env`](Self::from_env).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| -> Result<Option<u64>, String> {
            let key = format!("{ENV_PREFIX}{name}");
            lookup(&key)
                .map(|raw| {
                    raw.trim()
                        .parse::<u64>()
                        .map_err(|e| format!("{key}: {e}"))
                })
                .transpose()
        };

        let mut cfg = Self::default();
        if let Some(v) = read("INITIAL_DELAY_MS")? {
            cfg.initial_delay_ms = v;
        }
        if let Some(v) = read("MAX_RETRY_INTERVAL_MS")? {
            cfg.max_retry_interval_ms = Some(v);
        }
        if let Some(v) = read("SHUTDOWN_TIMEOUT_MS")? {
            cfg.shutdown_timeout_ms = v;
        }
        if let Some(v) = read("WORKERS")? {
            cfg.delivery.worker_count = usize::try_from(v).map_err(|e| e.to_string())?;
        }
        if let Some(v) = read("MAX_QUEUE_DEPTH")? {
            cfg.delivery.max_queue_depth = usize::try_from(v).map_err(|e| e.to_string())?;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}
