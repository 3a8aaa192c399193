//! Error types shared across the shield.
//!
//! Only [`ConfigurationError`] ever escapes a public entry point. Provider
//! failures ([`ProviderError`]) are absorbed: recorded, counted against the
//! breaker and routed to a fallback.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::validation::ValidationError;

/// Programming errors: unknown services or invalid policies.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// The service was never passed to `configure_service`.
    #[error("unknown service '{0}'")]
    UnknownService(String),

    /// A policy failed semantic validation.
    #[error("invalid configuration for '{service}': {source}")]
    Invalid {
        service: String,
        #[source]
        source: ValidationError,
    },

    /// Adding the delegation would make the fallback graph cyclic.
    #[error("fallback '{from}' -> '{to}' closes the cycle {}", .path.join(" -> "))]
    FallbackCycle {
        from: String,
        to: String,
        path: Vec<String>,
    },

    /// A whole configuration failed validation.
    #[error(
        "configuration rejected: {}",
        .0.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
    )]
    Rejected(Vec<ValidationError>),

    /// `request` was called for a service without a registered provider.
    #[error("service '{0}' has no provider registered")]
    MissingProvider(String),
}

/// Classification of a failed provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Authentication,
    RateLimit,
    NotFound,
    Server,
    Network,
    Timeout,
    Serialization,
    Validation,
    Unknown,
}

impl ErrorKind {
    /// Map an HTTP status to a kind. Successful statuses map to `None`.
    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            200..=399 => None,
            401 | 403 => Some(Self::Authentication),
            404 => Some(Self::NotFound),
            408 => Some(Self::Timeout),
            429 => Some(Self::RateLimit),
            400 | 422 => Some(Self::Validation),
            500..=599 => Some(Self::Server),
            _ => Some(Self::Unknown),
        }
    }

    /// Whether the same call may succeed if repeated later.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            Self::RateLimit | Self::Server | Self::Network | Self::Timeout
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Authentication => "authentication",
            Self::RateLimit => "rate_limit",
            Self::NotFound => "not_found",
            Self::Server => "server_error",
            Self::Network => "network_error",
            Self::Timeout => "timeout",
            Self::Serialization => "serialization",
            Self::Validation => "validation",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed call to a third-party provider.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}: {message}")]
pub struct ProviderError {
    pub kind: ErrorKind,
    pub message: String,
    /// HTTP status, when the failure came from a response.
    pub status: Option<u16>,
    /// Provider-supplied hint for rate limit errors.
    pub retry_after: Option<Duration>,
}

impl ProviderError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            retry_after: None,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn rate_limited(retry_after: Option<Duration>) -> Self {
        Self {
            retry_after,
            status: Some(429),
            ..Self::new(ErrorKind::RateLimit, "rate limit exceeded")
        }
    }

    /// Build an error from a non-success HTTP status and response body.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let kind = ErrorKind::from_status(status).unwrap_or(ErrorKind::Unknown);
        Self {
            status: Some(status),
            ..Self::new(kind, body)
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::timeout(err.to_string());
        }
        if let Some(status) = err.status() {
            return Self::from_status(status.as_u16(), err.to_string());
        }
        if err.is_connect() || err.is_request() {
            return Self::network(err.to_string());
        }
        if err.is_decode() {
            return Self::new(ErrorKind::Serialization, err.to_string());
        }
        Self::new(ErrorKind::Unknown, err.to_string())
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(ErrorKind::Serialization, err.to_string())
    }
}
