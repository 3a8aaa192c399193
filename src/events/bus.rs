//! In-process publish/subscribe bus.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use futures_util::future::join_all;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinSet;

use super::event::{Event, EventHandler, SubscriptionId};
use crate::config::EventBusConfig;
use crate::observability::metrics;

const DEFAULT_SOURCE: &str = "event_bus";

/// How the handlers of one `emit` are run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DispatchPolicy {
    /// Handlers run one after another, in subscription order, inside `emit`.
    Sequential,
    /// Each handler runs as its own task tracked in the pending set.
    Concurrent {
        /// `emit` waits for the tasks it spawned before returning.
        #[serde(default)]
        await_completion: bool,
    },
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self::Concurrent {
            await_completion: true,
        }
    }
}

struct Subscription {
    id: SubscriptionId,
    handler: Arc<dyn EventHandler>,
}

fn same_handler(a: &Arc<dyn EventHandler>, b: &Arc<dyn EventHandler>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

/// Event bus shared by every component of a context.
pub struct EventBus {
    subscriptions: RwLock<HashMap<String, Vec<Subscription>>>,
    pending: Mutex<JoinSet<()>>,
    policy: DispatchPolicy,
    handler_timeout: Duration,
}

impl EventBus {
    pub fn new(policy: DispatchPolicy, handler_timeout: Duration) -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            pending: Mutex::new(JoinSet::new()),
            policy,
            handler_timeout,
        }
    }

    pub fn from_config(config: &EventBusConfig) -> Self {
        Self::new(config.dispatch, config.handler_timeout())
    }

    pub fn policy(&self) -> DispatchPolicy {
        self.policy
    }

    pub fn handler_timeout(&self) -> Duration {
        self.handler_timeout
    }

    fn pending(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribe `handler` to `kind`.
    ///
    /// Subscribing the same handler twice returns the existing id.
    pub fn on(&self, kind: impl Into<String>, handler: Arc<dyn EventHandler>) -> SubscriptionId {
        let kind = kind.into();
        let mut subscriptions = self
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let entries = subscriptions.entry(kind.clone()).or_default();

        if let Some(existing) = entries.iter().find(|s| same_handler(&s.handler, &handler)) {
            return existing.id;
        }

        let id = SubscriptionId::new();
        entries.push(Subscription { id, handler });
        tracing::debug!(event = %kind, subscription = %id, "Handler subscribed");
        id
    }

    /// Remove a subscription. Returns false when it was not registered.
    pub fn off(&self, kind: &str, id: SubscriptionId) -> bool {
        let mut subscriptions = self
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(entries) = subscriptions.get_mut(kind) else {
            return false;
        };

        let before = entries.len();
        entries.retain(|s| s.id != id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            subscriptions.remove(kind);
        }
        removed
    }

    pub fn subscriber_count(&self, kind: &str) -> usize {
        self.subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(kind)
            .map_or(0, Vec::len)
    }

    /// Handler tasks spawned and not yet reaped.
    pub fn pending_count(&self) -> usize {
        let mut pending = self.pending();
        while pending.try_join_next().is_some() {}
        pending.len()
    }

    /// Snapshot of the handlers for `kind`; emit never holds the table lock.
    fn handlers_for(&self, kind: &str) -> Vec<Arc<dyn EventHandler>> {
        self.subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(kind)
            .map(|entries| entries.iter().map(|s| s.handler.clone()).collect())
            .unwrap_or_default()
    }

    pub async fn emit(&self, kind: &str, data: Value) {
        self.emit_with_policy(self.policy, DEFAULT_SOURCE, kind, data)
            .await;
    }

    pub async fn emit_from(&self, source: &str, kind: &str, data: Value) {
        self.emit_with_policy(self.policy, source, kind, data).await;
    }

    /// Publish an event under an explicit dispatch policy.
    pub async fn emit_with_policy(
        &self,
        policy: DispatchPolicy,
        source: &str,
        kind: &str,
        data: Value,
    ) {
        let handlers = self.handlers_for(kind);
        if handlers.is_empty() {
            return;
        }

        let event = Arc::new(Event::new(source, kind, data));
        tracing::trace!(event = %kind, handlers = handlers.len(), "Dispatching event");

        match policy {
            DispatchPolicy::Sequential => {
                for handler in handlers {
                    run_handler(handler, event.clone(), self.handler_timeout).await;
                }
            }
            DispatchPolicy::Concurrent { await_completion } => {
                let mut completions = Vec::with_capacity(handlers.len());
                {
                    let mut pending = self.pending();
                    while pending.try_join_next().is_some() {}

                    for handler in handlers {
                        let (done_tx, done_rx) = oneshot::channel::<()>();
                        let event = event.clone();
                        let limit = self.handler_timeout;
                        pending.spawn(async move {
                            run_handler(handler, event, limit).await;
                            let _ = done_tx.send(());
                        });
                        completions.push(done_rx);
                    }
                }

                if await_completion {
                    // A cancelled handler drops its sender, which also resolves.
                    join_all(completions).await;
                }
            }
        }
    }

    /// Wait for every pending handler task, cancelling the ones still
    /// running after `timeout` (the handler timeout when `None`).
    pub async fn wait_for_handlers(&self, timeout: Option<Duration>) {
        let mut pending = std::mem::take(&mut *self.pending());
        if pending.is_empty() {
            return;
        }

        let limit = timeout.unwrap_or(self.handler_timeout);
        let drained = tokio::time::timeout(limit, async {
            while pending.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            tracing::warn!(
                remaining = pending.len(),
                timeout_ms = limit.as_millis() as u64,
                "Event handlers still running after timeout, cancelling"
            );
            pending.shutdown().await;
        }
    }

    /// Cancel all pending handler tasks and drop every subscription.
    pub async fn clear_handlers(&self) {
        let mut pending = std::mem::take(&mut *self.pending());
        let cancelled = pending.len();
        pending.shutdown().await;

        self.subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        tracing::debug!(cancelled, "Event handlers cleared");
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::from_config(&EventBusConfig::default())
    }
}

/// Run one handler with the deadline and panic isolation applied.
async fn run_handler(handler: Arc<dyn EventHandler>, event: Arc<Event>, limit: Duration) {
    let call = AssertUnwindSafe(async { handler.handle(event.clone()).await }).catch_unwind();

    match tokio::time::timeout(limit, call).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => {
            tracing::error!(event = %event.kind, error = %e, "Event handler failed");
            metrics::record_handler_failure(&event.kind, "error");
        }
        Ok(Err(_)) => {
            tracing::error!(event = %event.kind, "Event handler panicked");
            metrics::record_handler_failure(&event.kind, "panic");
        }
        Err(_) => {
            tracing::error!(
                event = %event.kind,
                timeout_ms = limit.as_millis() as u64,
                "Event handler timed out"
            );
            metrics::record_handler_failure(&event.kind, "timeout");
        }
    }
}
