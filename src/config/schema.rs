//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the shield.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::events::DispatchPolicy;

/// Longest spacing a rate may ask for: one grant per day.
pub const MAX_GRANT_INTERVAL: Duration = Duration::from_secs(86_400);

/// Root configuration supplied by the composition root.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ShieldConfig {
    /// Provider definitions, one entry per named service.
    pub services: Vec<ServiceConfig>,

    /// Background recovery monitor settings.
    pub monitor: MonitorConfig,

    /// Event bus dispatch settings.
    pub events: EventBusConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl ShieldConfig {
    /// Look up a service definition by name.
    pub fn service(&self, name: &str) -> Option<&ServiceConfig> {
        self.services.iter().find(|s| s.name == name)
    }
}

/// Policy for one named third-party provider.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// Unique service identifier used as the key everywhere.
    pub name: String,

    /// Quota windows enforced before every call.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Breaker policy.
    #[serde(default)]
    pub circuit: CircuitConfig,

    /// Retry policy for transient failures of the registered provider.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Recovery policy; services without one are not monitored.
    #[serde(default)]
    pub recovery: Option<RecoveryConfig>,

    /// Service to delegate to when this one is blocked or failing.
    #[serde(default)]
    pub fallback: Option<String>,

    /// URL probed by the HTTP health check.
    #[serde(default)]
    pub health_url: Option<String>,
}

impl ServiceConfig {
    /// A service with default policies.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rate_limit: RateLimitConfig::default(),
            circuit: CircuitConfig::default(),
            retry: RetryConfig::default(),
            recovery: None,
            fallback: None,
            health_url: None,
        }
    }
}

/// Quota policy for one service.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests per second; grants are spaced `1 / requests_per_second` apart.
    pub requests_per_second: f64,

    /// Maximum grants in any 60 second window.
    pub requests_per_minute: u32,

    /// Maximum grants in any 3600 second window.
    pub requests_per_hour: u32,

    /// Penalty applied when a provider reports a rate limit without a hint.
    pub retry_after_secs: u64,
}

impl RateLimitConfig {
    pub fn new(requests_per_second: f64, requests_per_minute: u32, requests_per_hour: u32) -> Self {
        Self {
            requests_per_second,
            requests_per_minute,
            requests_per_hour,
            ..Self::default()
        }
    }

    /// Minimum spacing between two grants, capped at [`MAX_GRANT_INTERVAL`].
    pub fn min_interval(&self) -> Duration {
        Duration::try_from_secs_f64(1.0 / self.requests_per_second)
            .map_or(MAX_GRANT_INTERVAL, |spacing| spacing.min(MAX_GRANT_INTERVAL))
    }

    pub fn retry_after(&self) -> Duration {
        Duration::from_secs(self.retry_after_secs)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 10.0,
            requests_per_minute: 300,
            requests_per_hour: 5000,
            retry_after_secs: 60,
        }
    }
}

/// Breaker policy for one service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitConfig {
    /// Failures within the error window that open the breaker.
    pub failure_threshold: u32,

    /// Time the breaker stays open before a trial is allowed, in seconds.
    pub open_timeout_secs: u64,

    /// Gap after which the failure counter starts over, in seconds.
    pub error_window_secs: u64,
}

impl CircuitConfig {
    pub fn new(failure_threshold: u32, open_timeout_secs: u64, error_window_secs: u64) -> Self {
        Self {
            failure_threshold,
            open_timeout_secs,
            error_window_secs,
        }
    }

    pub fn open_timeout(&self) -> Duration {
        Duration::from_secs(self.open_timeout_secs)
    }

    pub fn error_window(&self) -> Duration {
        Duration::from_secs(self.error_window_secs)
    }
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_timeout_secs: 300,
            error_window_secs: 3600,
        }
    }
}

/// Retry policy for transient provider failures.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Extra calls after the first one fails (0 disables retries).
    pub max_retries: u32,

    /// Delay before the first retry in milliseconds.
    pub initial_delay_ms: u64,

    /// Multiplier applied to the delay after every retry.
    pub backoff_factor: f64,

    /// Upper bound for the retry delay in milliseconds.
    pub max_delay_ms: u64,
}

impl RetryConfig {
    /// A policy that never retries.
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay_ms: 1000,
            backoff_factor: 2.0,
            max_delay_ms: 30_000,
        }
    }
}

/// Recovery policy for one service.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Failed recoveries allowed before the service is reported exhausted.
    pub max_attempts: u32,

    /// Multiplier applied to the delay after every failed attempt.
    pub backoff_factor: f64,

    /// Delay before the first attempt in milliseconds.
    pub initial_delay_ms: u64,

    /// Upper bound for the backoff delay in milliseconds.
    pub max_delay_ms: u64,

    /// Minimum gap between two recovery attempts in seconds.
    pub health_check_interval_secs: u64,

    /// Random extra delay as a fraction of the computed delay (0.0 disables).
    pub jitter_ratio: f64,
}

impl RecoveryConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_factor: 2.0,
            initial_delay_ms: 1000,
            max_delay_ms: 60_000,
            health_check_interval_secs: 30,
            jitter_ratio: 0.0,
        }
    }
}

/// Background monitor configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Run the recovery monitor loop.
    pub enabled: bool,

    /// Cadence of the monitor loop in seconds.
    pub interval_secs: u64,
}

impl MonitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
        }
    }
}

/// Event bus configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EventBusConfig {
    /// How handlers for one event are run.
    pub dispatch: DispatchPolicy,

    /// Per-handler deadline in milliseconds.
    pub handler_timeout_ms: u64,
}

impl EventBusConfig {
    pub fn handler_timeout(&self) -> Duration {
        Duration::from_millis(self.handler_timeout_ms)
    }
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            dispatch: DispatchPolicy::default(),
            handler_timeout_ms: 10_000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
