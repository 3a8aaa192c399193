//! Health check abstraction.

use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::error::ProviderError;

/// Answers whether a service is usable right now.
///
/// `Ok(false)` and `Err(_)` both count as unhealthy; the error is only
/// logged.
pub trait HealthCheck: Send + Sync + 'static {
    fn check(&self) -> BoxFuture<'static, Result<bool, ProviderError>>;
}

impl<F, Fut> HealthCheck for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<bool, ProviderError>> + Send + 'static,
{
    fn check(&self) -> BoxFuture<'static, Result<bool, ProviderError>> {
        Box::pin(self())
    }
}

pub fn health_check_fn<F, Fut>(f: F) -> Arc<dyn HealthCheck>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<bool, ProviderError>> + Send + 'static,
{
    Arc::new(f)
}
