//! Event values, handler trait and well-known event kinds.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::SystemTime;

use futures_util::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::error::ProviderError;

/// Event kinds published by the shield itself.
pub mod kinds {
    pub const CIRCUIT_BREAKER: &str = "circuit_breaker";
    pub const SERVICE_ERROR: &str = "service_error";
    pub const FALLBACK_SUCCESS: &str = "fallback_success";
    pub const FALLBACK_FAILURE: &str = "fallback_failure";
    pub const SERVICE_RESET: &str = "service_reset";
    pub const ERROR_STATS: &str = "error_stats";
    pub const ERROR_ANALYSIS: &str = "error_analysis";
    pub const HEALTH_CHECK: &str = "health_check";
    pub const RECOVERY_ATTEMPT: &str = "recovery_attempt";
    pub const RECOVERY_SUCCESS: &str = "recovery_success";
    pub const RECOVERY_FAILURE: &str = "recovery_failure";
    pub const RECOVERY_EXHAUSTED: &str = "recovery_exhausted";

    pub const ALL: &[&str] = &[
        CIRCUIT_BREAKER,
        SERVICE_ERROR,
        FALLBACK_SUCCESS,
        FALLBACK_FAILURE,
        SERVICE_RESET,
        ERROR_STATS,
        ERROR_ANALYSIS,
        HEALTH_CHECK,
        RECOVERY_ATTEMPT,
        RECOVERY_SUCCESS,
        RECOVERY_FAILURE,
        RECOVERY_EXHAUSTED,
    ];
}

/// An immutable notification delivered to every subscriber of its kind.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub id: Uuid,
    pub kind: String,
    pub data: Value,
    pub timestamp: SystemTime,
    pub source: String,
}

impl Event {
    pub fn new(source: impl Into<String>, kind: impl Into<String>, data: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: kind.into(),
            data,
            timestamp: SystemTime::now(),
            source: source.into(),
        }
    }
}

/// Identifier returned by `EventBus::on`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Failure reported by a handler. Logged by the bus, never propagated.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl HandlerError {
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Asynchronous event consumer.
pub trait EventHandler: Send + Sync + 'static {
    fn handle(&self, event: Arc<Event>) -> BoxFuture<'static, Result<(), HandlerError>>;
}

impl<F, Fut> EventHandler for F
where
    F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    fn handle(&self, event: Arc<Event>) -> BoxFuture<'static, Result<(), HandlerError>> {
        Box::pin(self(event))
    }
}

/// Wrap a closure as a shareable handler.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    Arc::new(f)
}
