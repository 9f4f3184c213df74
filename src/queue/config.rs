//! Engine configuration.
//!
//! Values come from defaults, a JSON document, or `WALKIN_QUEUE_*`
//! environment variables. Every loader ends in [`QueueConfig::validate`].

use super::types::DEFAULT_AVG_CONSULTATION_MINUTES;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Default time allowed to acquire a session's admission lock.
pub const DEFAULT_ADMISSION_TIMEOUT_MS: u64 = 2_000;

/// Default time allowed to acquire a session's progression lock.
pub const DEFAULT_PROGRESSION_TIMEOUT_MS: u64 = 2_000;

/// Default upper bound on a public status lookup.
pub const DEFAULT_LOOKUP_TIMEOUT_MS: u64 = 3_000;

/// Token-bucket parameters for one public route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests a fresh client may issue back to back.
    pub burst: u32,
    /// Tokens added to the bucket per minute.
    pub refill_per_minute: u32,
}

impl RateLimitConfig {
    /// Creates a rate limit configuration.
    pub const fn new(burst: u32, refill_per_minute: u32) -> Self {
        Self {
            burst,
            refill_per_minute,
        }
    }

    /// Public booking defaults: 5 requests, refilled at 5 per minute.
    pub const fn booking_default() -> Self {
        Self::new(5, 5)
    }

    /// Status lookup defaults: 20 requests, refilled at 30 per minute.
    ///
    /// A page polling every 30 seconds uses 2 per minute.
    pub const fn lookup_default() -> Self {
        Self::new(20, 30)
    }
}

/// Configuration errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid timeout configuration: {0}")]
    InvalidTimeout(String),

    #[error("Invalid rate limit configuration: {0}")]
    InvalidRateLimit(String),

    #[error("Invalid consultation length configuration: {0}")]
    InvalidConsultationMinutes(String),

    #[error("Malformed configuration document: {0}")]
    Malformed(String),
}

/// Queue engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Milliseconds an admission waits for the session lock before failing `Busy`.
    pub admission_timeout_ms: u64,
    /// Milliseconds an operator action waits for the session lock before failing `Busy`.
    pub progression_timeout_ms: u64,
    /// Milliseconds a public lookup may take before failing `NetworkError`.
    pub lookup_timeout_ms: u64,
    /// Consultation length applied to sessions created without one.
    pub default_avg_consultation_minutes: u32,
    /// Budget for public bookings per client.
    pub booking_rate_limit: RateLimitConfig,
    /// Budget for status lookups per client.
    pub lookup_rate_limit: RateLimitConfig,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            admission_timeout_ms: DEFAULT_ADMISSION_TIMEOUT_MS,
            progression_timeout_ms: DEFAULT_PROGRESSION_TIMEOUT_MS,
            lookup_timeout_ms: DEFAULT_LOOKUP_TIMEOUT_MS,
            default_avg_consultation_minutes: DEFAULT_AVG_CONSULTATION_MINUTES,
            booking_rate_limit: RateLimitConfig::booking_default(),
            lookup_rate_limit: RateLimitConfig::lookup_default(),
        }
    }
}

impl QueueConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    ///
    /// Recognised keys: `WALKIN_QUEUE_ADMISSION_TIMEOUT_MS`,
    /// `WALKIN_QUEUE_PROGRESSION_TIMEOUT_MS`, `WALKIN_QUEUE_LOOKUP_TIMEOUT_MS`,
    /// `WALKIN_QUEUE_AVG_CONSULTATION_MINUTES`, `WALKIN_QUEUE_BOOKING_BURST`,
    /// `WALKIN_QUEUE_BOOKING_REFILL_PER_MINUTE`, `WALKIN_QUEUE_LOOKUP_BURST`,
    /// `WALKIN_QUEUE_LOOKUP_REFILL_PER_MINUTE`. Missing keys keep their defaults.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = Self {
            admission_timeout_ms: parse_var(
                vars,
                "WALKIN_QUEUE_ADMISSION_TIMEOUT_MS",
                defaults.admission_timeout_ms,
                ConfigError::InvalidTimeout,
            )?,
            progression_timeout_ms: parse_var(
                vars,
                "WALKIN_QUEUE_PROGRESSION_TIMEOUT_MS",
                defaults.progression_timeout_ms,
                ConfigError::InvalidTimeout,
            )?,
            lookup_timeout_ms: parse_var(
                vars,
                "WALKIN_QUEUE_LOOKUP_TIMEOUT_MS",
                defaults.lookup_timeout_ms,
                ConfigError::InvalidTimeout,
            )?,
            default_avg_consultation_minutes: parse_var(
                vars,
                "WALKIN_QUEUE_AVG_CONSULTATION_MINUTES",
                defaults.default_avg_consultation_minutes,
                ConfigError::InvalidConsultationMinutes,
            )?,
            booking_rate_limit: RateLimitConfig::new(
                parse_var(
                    vars,
                    "WALKIN_QUEUE_BOOKING_BURST",
                    defaults.booking_rate_limit.burst,
                    ConfigError::InvalidRateLimit,
                )?,
                parse_var(
                    vars,
                    "WALKIN_QUEUE_BOOKING_REFILL_PER_MINUTE",
                    defaults.booking_rate_limit.refill_per_minute,
                    ConfigError::InvalidRateLimit,
                )?,
            ),
            lookup_rate_limit: RateLimitConfig::new(
                parse_var(
                    vars,
                    "WALKIN_QUEUE_LOOKUP_BURST",
                    defaults.lookup_rate_limit.burst,
                    ConfigError::InvalidRateLimit,
                )?,
                parse_var(
                    vars,
                    "WALKIN_QUEUE_LOOKUP_REFILL_PER_MINUTE",
                    defaults.lookup_rate_limit.refill_per_minute,
                    ConfigError::InvalidRateLimit,
                )?,
            ),
        };

        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON document. Absent fields keep their defaults.
    pub fn from_json(data: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(data).map_err(|e| ConfigError::Malformed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject zero timeouts, zero rate limits and zero-minute consultations.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("admission_timeout_ms", self.admission_timeout_ms),
            ("progression_timeout_ms", self.progression_timeout_ms),
            ("lookup_timeout_ms", self.lookup_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidTimeout(format!(
                    "{name} must be greater than 0"
                )));
            }
        }

        if self.default_avg_consultation_minutes == 0 {
            return Err(ConfigError::InvalidConsultationMinutes(
                "default_avg_consultation_minutes must be greater than 0".to_string(),
            ));
        }

        for (name, limit) in [
            ("booking_rate_limit", self.booking_rate_limit),
            ("lookup_rate_limit", self.lookup_rate_limit),
        ] {
            if limit.burst == 0 || limit.refill_per_minute == 0 {
                return Err(ConfigError::InvalidRateLimit(format!(
                    "{name} burst and refill_per_minute must be greater than 0, got {}/{}",
                    limit.burst, limit.refill_per_minute
                )));
            }
        }

        Ok(())
    }

    /// Sets the admission lock timeout.
    pub fn with_admission_timeout(mut self, timeout: Duration) -> Self {
        self.admission_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Sets the progression lock timeout.
    pub fn with_progression_timeout(mut self, timeout: Duration) -> Self {
        self.progression_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Sets the public lookup timeout.
    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Sets the default consultation length for new sessions.
    pub fn with_default_avg_consultation_minutes(mut self, minutes: u32) -> Self {
        self.default_avg_consultation_minutes = minutes;
        self
    }

    /// Sets the public booking budget.
    pub fn with_booking_rate_limit(mut self, limit: RateLimitConfig) -> Self {
        self.booking_rate_limit = limit;
        self
    }

    /// Sets the status lookup budget.
    pub fn with_lookup_rate_limit(mut self, limit: RateLimitConfig) -> Self {
        self.lookup_rate_limit = limit;
        self
    }

    /// Admission lock timeout as a [`Duration`].
    #[must_use]
    pub fn admission_timeout(&self) -> Duration {
        Duration::from_millis(self.admission_timeout_ms)
    }

    /// Progression lock timeout as a [`Duration`].
    #[must_use]
    pub fn progression_timeout(&self) -> Duration {
        Duration::from_millis(self.progression_timeout_ms)
    }

    /// Lookup timeout as a [`Duration`].
    #[must_use]
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }
}

fn parse_var<T>(
    vars: &HashMap<String, String>,
    key: &str,
    default: T,
    to_error: fn(String) -> ConfigError,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match vars.get(key) {
        Some(value_str) => value_str.trim().parse().map_err(|e| {
            to_error(format!(
                "{key} must be a valid positive integer, got '{value_str}': {e}"
            ))
        }),
        None => Ok(default),
    }
}
