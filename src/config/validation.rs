//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (fallbacks reference existing services)
//! - Validate value ranges (rates > 0, thresholds >= 1)
//! - Detect fallback cycles
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Per-policy `validate` methods are reused by every `configure_service`
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use crate::config::schema::{
    CircuitConfig, EventBusConfig, MonitorConfig, ObservabilityConfig, RateLimitConfig,
    RecoveryConfig, RetryConfig, ShieldConfig, MAX_GRANT_INTERVAL,
};
use crate::orchestrator::fallback::FallbackGraph;

/// A single semantic problem, addressed by its field path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }

    fn prefixed(mut self, prefix: &str) -> Self {
        self.field = format!("{}.{}", prefix, self.field);
        self
    }
}

impl RateLimitConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.requests_per_second.is_finite() || self.requests_per_second <= 0.0 {
            return Err(ValidationError::new(
                "requests_per_second",
                "must be a positive number",
            ));
        }
        match Duration::try_from_secs_f64(1.0 / self.requests_per_second) {
            Ok(spacing) if spacing <= MAX_GRANT_INTERVAL => {}
            _ => {
                return Err(ValidationError::new(
                    "requests_per_second",
                    format!(
                        "must allow at least one request every {} seconds",
                        MAX_GRANT_INTERVAL.as_secs()
                    ),
                ))
            }
        }
        if self.requests_per_minute == 0 {
            return Err(ValidationError::new("requests_per_minute", "must be at least 1"));
        }
        if self.requests_per_hour == 0 {
            return Err(ValidationError::new("requests_per_hour", "must be at least 1"));
        }
        Ok(())
    }
}

impl CircuitConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.failure_threshold == 0 {
            return Err(ValidationError::new("failure_threshold", "must be at least 1"));
        }
        if self.open_timeout_secs == 0 {
            return Err(ValidationError::new("open_timeout_secs", "must be positive"));
        }
        if self.error_window_secs == 0 {
            return Err(ValidationError::new("error_window_secs", "must be positive"));
        }
        Ok(())
    }
}

impl RetryConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(ValidationError::new("backoff_factor", "must be >= 1.0"));
        }
        if self.max_delay_ms < self.initial_delay_ms {
            return Err(ValidationError::new(
                "max_delay_ms",
                "must not be smaller than initial_delay_ms",
            ));
        }
        Ok(())
    }
}

impl RecoveryConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(ValidationError::new("backoff_factor", "must be >= 1.0"));
        }
        if self.max_delay_ms < self.initial_delay_ms {
            return Err(ValidationError::new(
                "max_delay_ms",
                "must not be smaller than initial_delay_ms",
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter_ratio) {
            return Err(ValidationError::new("jitter_ratio", "must be within 0.0..=1.0"));
        }
        Ok(())
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.enabled && self.interval_secs == 0 {
            return Err(ValidationError::new("interval_secs", "must be positive"));
        }
        Ok(())
    }
}

impl EventBusConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.handler_timeout_ms == 0 {
            return Err(ValidationError::new("handler_timeout_ms", "must be positive"));
        }
        Ok(())
    }
}

impl ObservabilityConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
        if !LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            return Err(ValidationError::new(
                "log_level",
                format!("unknown level '{}'", self.log_level),
            ));
        }
        if self.metrics_enabled && self.metrics_address.parse::<SocketAddr>().is_err() {
            return Err(ValidationError::new(
                "metrics_address",
                format!("'{}' is not a socket address", self.metrics_address),
            ));
        }
        Ok(())
    }
}

/// Validate a whole configuration, collecting every problem found.
pub fn validate_config(config: &ShieldConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Err(e) = config.monitor.validate() {
        errors.push(e.prefixed("monitor"));
    }
    if let Err(e) = config.events.validate() {
        errors.push(e.prefixed("events"));
    }
    if let Err(e) = config.observability.validate() {
        errors.push(e.prefixed("observability"));
    }

    let mut seen = HashSet::new();
    for service in &config.services {
        let prefix = format!("services[{}]", service.name);

        if service.name.trim().is_empty() {
            errors.push(ValidationError::new("services.name", "must not be empty"));
        } else if !seen.insert(service.name.as_str()) {
            errors.push(ValidationError::new(&prefix, "duplicate service name"));
        }

        if let Err(e) = service.rate_limit.validate() {
            errors.push(e.prefixed(&format!("{}.rate_limit", prefix)));
        }
        if let Err(e) = service.circuit.validate() {
            errors.push(e.prefixed(&format!("{}.circuit", prefix)));
        }
        if let Err(e) = service.retry.validate() {
            errors.push(e.prefixed(&format!("{}.retry", prefix)));
        }
        if let Some(recovery) = &service.recovery {
            if let Err(e) = recovery.validate() {
                errors.push(e.prefixed(&format!("{}.recovery", prefix)));
            }
        }

        if let Some(target) = &service.fallback {
            if target == &service.name {
                errors.push(ValidationError::new(
                    format!("{}.fallback", prefix),
                    "a service cannot fall back to itself",
                ));
            } else if config.service(target).is_none() {
                errors.push(ValidationError::new(
                    format!("{}.fallback", prefix),
                    format!("unknown service '{}'", target),
                ));
            }
        }

        if let Some(raw) = &service.health_url {
            match url::Url::parse(raw) {
                Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
                Ok(parsed) => errors.push(ValidationError::new(
                    format!("{}.health_url", prefix),
                    format!("unsupported scheme '{}'", parsed.scheme()),
                )),
                Err(e) => errors.push(ValidationError::new(
                    format!("{}.health_url", prefix),
                    e.to_string(),
                )),
            }
        }
    }

    let mut graph = FallbackGraph::default();
    for service in &config.services {
        if let Some(target) = &service.fallback {
            if target == &service.name {
                continue;
            }
            if let Err(path) = graph.link(&service.name, target) {
                errors.push(ValidationError::new(
                    format!("services[{}].fallback", service.name),
                    format!("cycle {}", path.join(" -> ")),
                ));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::ServiceConfig;

    fn service(name: &str, fallback: Option<&str>) -> ServiceConfig {
        ServiceConfig {
            fallback: fallback.map(str::to_string),
            ..ServiceConfig::new(name)
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&ShieldConfig::default()).is_ok());
    }

    #[test]
    fn test_zero_rate_rejected() {
        let rl = RateLimitConfig::new(0.0, 10, 10);
        let err = rl.validate().unwrap_err();
        assert_eq!(err.field, "requests_per_second");
    }

    #[test]
    fn test_vanishing_rate_rejected() {
        for rps in [1e-30, f64::MIN_POSITIVE, 1.0 / 100_000.0] {
            let err = RateLimitConfig::new(rps, 10, 10).validate().unwrap_err();
            assert_eq!(err.field, "requests_per_second");
            assert!(err.message.contains("86400"), "{}", err.message);
        }
        assert!(RateLimitConfig::new(1.0 / 3600.0, 10, 10).validate().is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = ShieldConfig::default();
        let mut bad = service("a", Some("missing"));
        bad.circuit.failure_threshold = 0;
        bad.health_url = Some("ftp://example.com".into());
        config.services.push(bad);
        config.services.push(service("a", None));

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4, "{:?}", errors);
        assert!(errors.iter().any(|e| e.message.contains("duplicate")));
        assert!(errors.iter().any(|e| e.field.ends_with("circuit.failure_threshold")));
        assert!(errors.iter().any(|e| e.message.contains("unknown service")));
        assert!(errors.iter().any(|e| e.message.contains("scheme")));
    }

    #[test]
    fn test_fallback_cycle_detected() {
        let mut config = ShieldConfig::default();
        config.services.push(service("a", Some("b")));
        config.services.push(service("b", Some("c")));
        config.services.push(service("c", Some("a")));

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("cycle"));
    }

    #[test]
    fn test_recovery_ranges() {
        let mut rc = RecoveryConfig::default();
        rc.backoff_factor = 0.5;
        assert!(rc.validate().is_err());

        let mut rc = RecoveryConfig::default();
        rc.max_delay_ms = 10;
        assert!(rc.validate().is_err());

        let mut retry = RetryConfig::default();
        retry.max_delay_ms = 10;
        assert_eq!(retry.validate().unwrap_err().field, "max_delay_ms");
        assert!(RetryConfig::disabled().validate().is_ok());
    }
}
