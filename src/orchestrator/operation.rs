//! The unit of work wrapped by the orchestrator.

use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value;

use crate::error::ProviderError;

/// An asynchronous call to a provider.
pub trait Operation: Send + Sync + 'static {
    fn call(&self, args: Value) -> BoxFuture<'static, Result<Value, ProviderError>>;
}

impl<F, Fut> Operation for F
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ProviderError>> + Send + 'static,
{
    fn call(&self, args: Value) -> BoxFuture<'static, Result<Value, ProviderError>> {
        Box::pin(self(args))
    }
}

/// Wrap a closure as a shareable operation.
pub fn operation_fn<F, Fut>(f: F) -> Arc<dyn Operation>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ProviderError>> + Send + 'static,
{
    Arc::new(f)
}
