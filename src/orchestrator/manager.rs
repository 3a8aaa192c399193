//! The error orchestrator: breaker, limiter and fallback around a call.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::BoxFuture;
use serde_json::{json, Value};

use super::fallback::{Fallback, FallbackGraph, MAX_FALLBACK_DEPTH};
use super::history::{ErrorAnalysis, ErrorHistory, ErrorRecord, ErrorStats, RECENT_ERRORS};
use super::operation::Operation;
use crate::config::{CircuitConfig, RateLimitConfig, RetryConfig};
use crate::error::{ConfigurationError, ErrorKind, ProviderError};
use crate::events::{kinds, EventBus};
use crate::observability::metrics;
use crate::resilience::backoff::retry_delay;
use crate::resilience::{
    CircuitBreaker, CircuitSnapshot, CircuitState, RateLimitStatus, RateLimiter, Transition,
};

const SOURCE: &str = "error_orchestrator";

/// Runs provider calls behind per-service protection.
pub struct ErrorOrchestrator {
    events: Arc<EventBus>,
    limiter: RateLimiter,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    providers: DashMap<String, Arc<dyn Operation>>,
    fallbacks: DashMap<String, Fallback>,
    retries: DashMap<String, RetryConfig>,
    graph: Mutex<FallbackGraph>,
    error_counts: DashMap<String, u64>,
    history: Mutex<ErrorHistory>,
}

impl ErrorOrchestrator {
    pub fn new(events: Arc<EventBus>) -> Self {
        Self {
            events,
            limiter: RateLimiter::new(),
            breakers: DashMap::new(),
            providers: DashMap::new(),
            fallbacks: DashMap::new(),
            retries: DashMap::new(),
            graph: Mutex::new(FallbackGraph::default()),
            error_counts: DashMap::new(),
            history: Mutex::new(ErrorHistory::default()),
        }
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    fn history(&self) -> MutexGuard<'_, ErrorHistory> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn graph(&self) -> MutexGuard<'_, FallbackGraph> {
        self.graph.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Install or replace the quota and breaker policies for `service`.
    pub fn configure_service(
        &self,
        service: &str,
        rate_limit: RateLimitConfig,
        circuit: CircuitConfig,
    ) -> Result<(), ConfigurationError> {
        circuit.validate().map_err(|source| ConfigurationError::Invalid {
            service: service.to_string(),
            source,
        })?;
        self.limiter.configure_service(service, rate_limit)?;

        match self.breakers.entry(service.to_string()) {
            Entry::Occupied(entry) => entry.get().reconfigure(circuit),
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(CircuitBreaker::new(service, circuit)));
            }
        }
        self.error_counts.entry(service.to_string()).or_insert(0);

        tracing::info!(service, "Service configured");
        Ok(())
    }

    /// Set how transient failures of the registered provider of `service`
    /// are retried. Services without a policy never retry.
    pub fn configure_retry(
        &self,
        service: &str,
        retry: RetryConfig,
    ) -> Result<(), ConfigurationError> {
        self.ensure_configured(service)?;
        retry.validate().map_err(|source| ConfigurationError::Invalid {
            service: service.to_string(),
            source,
        })?;
        self.retries.insert(service.to_string(), retry);
        Ok(())
    }

    fn retry_policy(&self, service: &str) -> Option<RetryConfig> {
        self.retries.get(service).map(|entry| entry.value().clone())
    }

    pub fn is_configured(&self, service: &str) -> bool {
        self.breakers.contains_key(service)
    }

    /// Configured service names, sorted.
    pub fn services(&self) -> Vec<String> {
        let mut names: Vec<String> = self.breakers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    fn breaker(&self, service: &str) -> Result<Arc<CircuitBreaker>, ConfigurationError> {
        self.breakers
            .get(service)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ConfigurationError::UnknownService(service.to_string()))
    }

    fn ensure_configured(&self, service: &str) -> Result<(), ConfigurationError> {
        if self.is_configured(service) {
            Ok(())
        } else {
            Err(ConfigurationError::UnknownService(service.to_string()))
        }
    }

    /// Set the default operation of `service`, used by `request` and by
    /// delegated fallbacks.
    pub fn register_provider(
        &self,
        service: &str,
        operation: Arc<dyn Operation>,
    ) -> Result<(), ConfigurationError> {
        self.ensure_configured(service)?;
        self.providers.insert(service.to_string(), operation);
        tracing::debug!(service, "Provider registered");
        Ok(())
    }

    /// Set the fallback of `service`, replacing any previous one.
    pub fn register_fallback(
        &self,
        service: &str,
        fallback: Fallback,
    ) -> Result<(), ConfigurationError> {
        self.ensure_configured(service)?;

        let mut graph = self.graph();
        match &fallback {
            Fallback::Delegate(target) => {
                self.ensure_configured(target)?;
                graph
                    .link(service, target)
                    .map_err(|path| ConfigurationError::FallbackCycle {
                        from: service.to_string(),
                        to: target.clone(),
                        path,
                    })?;
            }
            Fallback::Handler(_) | Fallback::Static(_) => {
                graph.unlink(service);
            }
        }

        tracing::debug!(service, fallback = fallback.label(), "Fallback registered");
        self.fallbacks.insert(service.to_string(), fallback);
        Ok(())
    }

    /// Drop the fallback of `service`. Returns whether one was registered.
    pub fn remove_fallback(&self, service: &str) -> bool {
        let mut graph = self.graph();
        graph.unlink(service);
        self.fallbacks.remove(service).is_some()
    }

    /// Run `operation` for `service` behind its breaker and rate limiter.
    ///
    /// Provider failures never escape: the call is recorded and routed to
    /// the fallback, and `Ok(None)` means no path produced a value. Only
    /// an unconfigured service is an error.
    pub async fn execute_with_fallback(
        &self,
        service: &str,
        operation: &dyn Operation,
        args: Value,
    ) -> Result<Option<Value>, ConfigurationError> {
        self.execute_at_depth(service, operation, args, None, 0).await
    }

    /// Run the registered provider of `service`.
    ///
    /// Unlike `execute_with_fallback`, transient failures are retried under
    /// the service's retry policy before the fallback is consulted.
    pub async fn request(
        &self,
        service: &str,
        args: Value,
    ) -> Result<Option<Value>, ConfigurationError> {
        let provider = self.provider(service)?;
        let retry = self.retry_policy(service);
        self.execute_at_depth(service, provider.as_ref(), args, retry, 0)
            .await
    }

    fn provider(&self, service: &str) -> Result<Arc<dyn Operation>, ConfigurationError> {
        self.ensure_configured(service)?;
        self.providers
            .get(service)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ConfigurationError::MissingProvider(service.to_string()))
    }

    fn execute_at_depth<'a>(
        &'a self,
        service: &'a str,
        operation: &'a dyn Operation,
        args: Value,
        retry: Option<RetryConfig>,
        depth: usize,
    ) -> BoxFuture<'a, Result<Option<Value>, ConfigurationError>> {
        Box::pin(async move {
            let breaker = self.breaker(service)?;
            let mut retries = 0;

            loop {
                let Some(permit) = breaker.allow_request() else {
                    tracing::warn!(service, "Circuit breaker preventing request");
                    metrics::record_operation(service, "rejected");
                    return self.run_fallback(service, args, depth).await;
                };

                self.limiter.acquire(service).await?;

                let err = match operation.call(args.clone()).await {
                    Ok(value) => {
                        metrics::record_operation(service, "success");
                        if let Some(transition) = breaker.record_success(permit) {
                            self.publish_transition(service, transition).await;
                        }
                        return Ok(Some(value));
                    }
                    Err(err) => err,
                };

                tracing::error!(service, error = %err, "Provider call failed");
                metrics::record_operation(service, "failure");
                self.record_error(service, &err).await;

                if err.kind == ErrorKind::RateLimit {
                    self.limiter.penalize(service, err.retry_after)?;
                }
                if let Some(transition) = breaker.record_failure(permit) {
                    self.publish_transition(service, transition).await;
                }

                // Retries stop as soon as the breaker leaves Closed.
                let delay = match &retry {
                    Some(policy)
                        if err.kind.is_transient()
                            && retries < policy.max_retries
                            && breaker.state() == CircuitState::Closed =>
                    {
                        retry_delay(policy, retries)
                    }
                    _ => return self.run_fallback(service, args, depth).await,
                };
                retries += 1;
                tracing::warn!(
                    service,
                    retry = retries,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying transient provider failure"
                );
                metrics::record_operation(service, "retry");
                tokio::time::sleep(delay).await;
            }
        })
    }

    async fn run_fallback(
        &self,
        service: &str,
        args: Value,
        depth: usize,
    ) -> Result<Option<Value>, ConfigurationError> {
        let Some(fallback) = self.fallbacks.get(service).map(|e| e.value().clone()) else {
            tracing::warn!(service, "No fallback handler");
            return Ok(None);
        };

        if depth >= MAX_FALLBACK_DEPTH {
            tracing::error!(service, depth, "Fallback chain too deep, giving up");
            self.fallback_failed(service, &fallback, "fallback depth exceeded".to_string())
                .await;
            return Ok(None);
        }

        let outcome = match &fallback {
            Fallback::Static(value) => Ok(value.clone()),
            Fallback::Handler(handler) => handler.call(args).await.map_err(|e| e.to_string()),
            Fallback::Delegate(target) => self.delegate(target, args, depth + 1).await,
        };

        match outcome {
            Ok(value) => {
                metrics::record_fallback(service, "success");
                self.events
                    .emit_from(
                        SOURCE,
                        kinds::FALLBACK_SUCCESS,
                        json!({ "service": service, "fallback": fallback.label() }),
                    )
                    .await;
                Ok(Some(value))
            }
            Err(error) => {
                tracing::error!(service, error = %error, "Fallback failed");
                self.fallback_failed(service, &fallback, error).await;
                Ok(None)
            }
        }
    }

    /// Run the registered provider of `target` on behalf of another service.
    ///
    /// Every way this can come up empty, including a target without a
    /// provider, is a failed fallback rather than an error.
    async fn delegate(&self, target: &str, args: Value, depth: usize) -> Result<Value, String> {
        let provider = self.provider(target).map_err(|e| e.to_string())?;
        let retry = self.retry_policy(target);
        match self
            .execute_at_depth(target, provider.as_ref(), args, retry, depth)
            .await
        {
            Ok(Some(value)) => Ok(value),
            Ok(None) => Err(format!("delegate '{}' produced no result", target)),
            Err(e) => Err(e.to_string()),
        }
    }

    async fn fallback_failed(&self, service: &str, fallback: &Fallback, error: String) {
        metrics::record_fallback(service, "failure");
        self.events
            .emit_from(
                SOURCE,
                kinds::FALLBACK_FAILURE,
                json!({ "service": service, "fallback": fallback.label(), "error": error }),
            )
            .await;
    }

    async fn record_error(&self, service: &str, err: &ProviderError) {
        *self.error_counts.entry(service.to_string()).or_insert(0) += 1;

        let record = ErrorRecord::new(service, err);
        let payload = serde_json::to_value(&record).unwrap_or_default();
        self.history().push(record);

        self.events
            .emit_from(service, kinds::SERVICE_ERROR, payload)
            .await;
    }

    async fn publish_transition(&self, service: &str, transition: Transition) {
        self.events
            .emit_from(
                SOURCE,
                kinds::CIRCUIT_BREAKER,
                json!({
                    "service": service,
                    "state": transition.to,
                    "previous": transition.from,
                    "failures": transition.failures,
                }),
            )
            .await;
    }

    pub fn breaker_snapshot(&self, service: &str) -> Result<CircuitSnapshot, ConfigurationError> {
        Ok(self.breaker(service)?.snapshot())
    }

    pub fn get_rate_limit_status(
        &self,
        service: &str,
    ) -> Result<RateLimitStatus, ConfigurationError> {
        self.limiter.status(service)
    }

    pub async fn get_error_stats(&self) -> ErrorStats {
        let errors_by_service: BTreeMap<String, u64> = self
            .error_counts
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect();
        let breaker_states = self
            .breakers
            .iter()
            .map(|e| (e.key().clone(), e.value().state()))
            .collect();

        let stats = ErrorStats {
            total_errors: errors_by_service.values().sum(),
            errors_by_service,
            breaker_states,
            recent_errors: self.history().recent(RECENT_ERRORS),
        };

        self.events
            .emit_from(
                SOURCE,
                kinds::ERROR_STATS,
                serde_json::to_value(&stats).unwrap_or_default(),
            )
            .await;
        stats
    }

    /// Error rate and breakdowns over the last hour.
    pub async fn analyze_errors(&self) -> ErrorAnalysis {
        let analysis = ErrorAnalysis::from_history(&self.history());

        self.events
            .emit_from(
                SOURCE,
                kinds::ERROR_ANALYSIS,
                serde_json::to_value(&analysis).unwrap_or_default(),
            )
            .await;
        analysis
    }

    /// Zero the error count and force the breaker closed.
    ///
    /// Returns false when `service` is not configured.
    pub async fn reset_service(&self, service: &str) -> bool {
        let Ok(breaker) = self.breaker(service) else {
            return false;
        };

        self.error_counts.insert(service.to_string(), 0);
        if let Some(transition) = breaker.reset() {
            self.publish_transition(service, transition).await;
        }

        tracing::info!(service, "Service reset");
        self.events
            .emit_from(SOURCE, kinds::SERVICE_RESET, json!({ "service": service }))
            .await;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{handler_fn, DispatchPolicy, Event};
    use crate::orchestrator::operation::operation_fn;
    use crate::resilience::CircuitState;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn orchestrator() -> ErrorOrchestrator {
        let events = Arc::new(EventBus::new(DispatchPolicy::Sequential, Duration::from_secs(1)));
        ErrorOrchestrator::new(events)
    }

    fn configure(orch: &ErrorOrchestrator, service: &str, threshold: u32) {
        orch.configure_service(
            service,
            RateLimitConfig::new(100.0, 1000, 10_000),
            CircuitConfig::new(threshold, 60, 3600),
        )
        .unwrap();
    }

    fn failing(calls: Arc<AtomicUsize>) -> Arc<dyn Operation> {
        operation_fn(move |_args| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::from_status(503, "unavailable"))
            }
        })
    }

    fn recorder(bus: &EventBus, kind: &str) -> Arc<Mutex<Vec<Value>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bus.on(
            kind,
            handler_fn(move |event: Arc<Event>| {
                let sink = sink.clone();
                async move {
                    sink.lock().unwrap().push(event.data.clone());
                    Ok(())
                }
            }),
        );
        seen
    }

    #[tokio::test]
    async fn test_unknown_service_is_error() {
        let orch = orchestrator();
        let op = operation_fn(|_| async { Ok(Value::Null) });
        let err = orch
            .execute_with_fallback("nope", op.as_ref(), Value::Null)
            .await
            .unwrap_err();
        assert_eq!(err, ConfigurationError::UnknownService("nope".into()));
    }

    #[tokio::test]
    async fn test_success_passes_through() {
        let orch = orchestrator();
        configure(&orch, "helius", 3);
        let op = operation_fn(|args| async move { Ok(json!({ "echo": args })) });

        let out = orch
            .execute_with_fallback("helius", op.as_ref(), json!(7))
            .await
            .unwrap();
        assert_eq!(out, Some(json!({ "echo": 7 })));
        assert_eq!(orch.get_rate_limit_status("helius").unwrap().minute_requests, 1);
    }

    #[tokio::test]
    async fn test_failure_without_fallback_returns_none() {
        let orch = orchestrator();
        configure(&orch, "helius", 3);
        let errors = recorder(orch.events(), kinds::SERVICE_ERROR);
        let calls = Arc::new(AtomicUsize::new(0));

        let out = orch
            .execute_with_fallback("helius", failing(calls.clone()).as_ref(), Value::Null)
            .await
            .unwrap();

        assert_eq!(out, None);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let errors = errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0]["kind"], "server");
        assert_eq!(errors[0]["status"], 503);
    }

    #[tokio::test]
    async fn test_open_breaker_skips_operation_and_calls_fallback_once() {
        let orch = orchestrator();
        configure(&orch, "helius", 1);
        let calls = Arc::new(AtomicUsize::new(0));
        let fallback_calls = Arc::new(AtomicUsize::new(0));
        let counter = fallback_calls.clone();
        orch.register_fallback(
            "helius",
            Fallback::Handler(operation_fn(move |_| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(json!("cached"))
                }
            })),
        )
        .unwrap();
        let op = failing(calls.clone());

        // First call fails and opens the breaker.
        let out = orch
            .execute_with_fallback("helius", op.as_ref(), Value::Null)
            .await
            .unwrap();
        assert_eq!(out, Some(json!("cached")));
        assert_eq!(orch.breaker_snapshot("helius").unwrap().state, CircuitState::Open);

        let out = orch
            .execute_with_fallback("helius", op.as_ref(), Value::Null)
            .await
            .unwrap();
        assert_eq!(out, Some(json!("cached")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(fallback_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_breaker_transitions_are_published() {
        let orch = orchestrator();
        configure(&orch, "helius", 2);
        let transitions = recorder(orch.events(), kinds::CIRCUIT_BREAKER);
        let op = failing(Arc::new(AtomicUsize::new(0)));

        for _ in 0..2 {
            orch.execute_with_fallback("helius", op.as_ref(), Value::Null)
                .await
                .unwrap();
        }

        let transitions = transitions.lock().unwrap();
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0]["state"], "open");
        assert_eq!(transitions[0]["failures"], 2);
    }

    #[tokio::test]
    async fn test_delegate_cycle_rejected() {
        let orch = orchestrator();
        for s in ["a", "b", "c"] {
            configure(&orch, s, 3);
        }
        orch.register_fallback("a", Fallback::Delegate("b".into())).unwrap();
        orch.register_fallback("b", Fallback::Delegate("c".into())).unwrap();

        let err = orch
            .register_fallback("c", Fallback::Delegate("a".into()))
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::FallbackCycle { .. }));

        // Replacing b's delegate with a static value breaks the chain.
        orch.register_fallback("b", Fallback::Static(Value::Null)).unwrap();
        assert!(orch.register_fallback("c", Fallback::Delegate("a".into())).is_ok());

        let err = orch
            .register_fallback("a", Fallback::Delegate("zzz".into()))
            .unwrap_err();
        assert_eq!(err, ConfigurationError::UnknownService("zzz".into()));
    }

    #[tokio::test]
    async fn test_delegate_runs_target_provider() {
        let orch = orchestrator();
        configure(&orch, "helius", 1);
        configure(&orch, "solscan", 3);
        let provider = operation_fn(|args| async move {
            Ok(json!({ "from": "solscan", "args": args }))
        });
        orch.register_provider("solscan", provider).unwrap();
        orch.register_fallback("helius", Fallback::Delegate("solscan".into()))
            .unwrap();
        let successes = recorder(orch.events(), kinds::FALLBACK_SUCCESS);

        let out = orch
            .execute_with_fallback(
                "helius",
                failing(Arc::new(AtomicUsize::new(0))).as_ref(),
                json!(1),
            )
            .await
            .unwrap();

        assert_eq!(out, Some(json!({ "from": "solscan", "args": 1 })));
        assert_eq!(successes.lock().unwrap()[0]["fallback"], "delegate");
        assert_eq!(orch.get_rate_limit_status("solscan").unwrap().minute_requests, 1);
    }

    #[tokio::test]
    async fn test_delegate_without_provider_is_failed_fallback() {
        let orch = orchestrator();
        configure(&orch, "helius", 3);
        configure(&orch, "solscan", 3);
        orch.register_fallback("helius", Fallback::Delegate("solscan".into()))
            .unwrap();
        let failures = recorder(orch.events(), kinds::FALLBACK_FAILURE);

        let out = orch
            .execute_with_fallback(
                "helius",
                failing(Arc::new(AtomicUsize::new(0))).as_ref(),
                Value::Null,
            )
            .await
            .unwrap();

        assert_eq!(out, None);
        let failures = failures.lock().unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0]["service"], "helius");
        assert!(failures[0]["error"]
            .as_str()
            .unwrap()
            .contains("no provider registered"));
    }

    fn flaky(calls: Arc<AtomicUsize>, failures: usize, status: u16) -> Arc<dyn Operation> {
        operation_fn(move |_args| {
            let calls = calls.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < failures {
                    Err(ProviderError::from_status(status, "flaky"))
                } else {
                    Ok(json!("ok"))
                }
            }
        })
    }

    fn retry_policy(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_delay_ms: 1000,
            backoff_factor: 2.0,
            max_delay_ms: 30_000,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_retries_transient_failures() {
        let orch = orchestrator();
        configure(&orch, "helius", 10);
        orch.configure_retry("helius", retry_policy(2)).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        orch.register_provider("helius", flaky(calls.clone(), 2, 503))
            .unwrap();

        let start = tokio::time::Instant::now();
        let out = orch.request("helius", Value::Null).await.unwrap();

        assert_eq!(out, Some(json!("ok")));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // One second before the first retry, two before the second.
        assert!(start.elapsed() >= Duration::from_secs(3));
        assert_eq!(orch.get_error_stats().await.errors_by_service["helius"], 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_are_bounded_then_fall_back() {
        let orch = orchestrator();
        configure(&orch, "helius", 10);
        orch.configure_retry("helius", retry_policy(2)).unwrap();
        orch.register_fallback("helius", Fallback::Static(json!("cached")))
            .unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        orch.register_provider("helius", failing(calls.clone()))
            .unwrap();

        let out = orch.request("helius", Value::Null).await.unwrap();
        assert_eq!(out, Some(json!("cached")));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_retry_for_permanent_errors_or_open_breaker() {
        let orch = orchestrator();
        configure(&orch, "helius", 10);
        configure(&orch, "solscan", 2);
        for service in ["helius", "solscan"] {
            orch.configure_retry(service, retry_policy(5)).unwrap();
        }

        let helius_calls = Arc::new(AtomicUsize::new(0));
        orch.register_provider("helius", flaky(helius_calls.clone(), 1, 401))
            .unwrap();
        assert_eq!(orch.request("helius", Value::Null).await.unwrap(), None);
        assert_eq!(helius_calls.load(Ordering::SeqCst), 1);

        let solscan_calls = Arc::new(AtomicUsize::new(0));
        orch.register_provider("solscan", failing(solscan_calls.clone()))
            .unwrap();
        assert_eq!(orch.request("solscan", Value::Null).await.unwrap(), None);
        assert_eq!(solscan_calls.load(Ordering::SeqCst), 2);
        assert_eq!(orch.breaker_snapshot("solscan").unwrap().state, CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_with_fallback_calls_operation_once() {
        let orch = orchestrator();
        configure(&orch, "helius", 10);
        orch.configure_retry("helius", retry_policy(3)).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        orch.execute_with_fallback("helius", failing(calls.clone()).as_ref(), Value::Null)
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let err = orch.configure_retry("nope", retry_policy(1)).unwrap_err();
        assert_eq!(err, ConfigurationError::UnknownService("nope".into()));
    }

    #[tokio::test]
    async fn test_request_requires_provider() {
        let orch = orchestrator();
        configure(&orch, "helius", 3);
        let err = orch.request("helius", Value::Null).await.unwrap_err();
        assert_eq!(err, ConfigurationError::MissingProvider("helius".into()));

        orch.register_provider("helius", operation_fn(|_| async { Ok(json!(42)) }))
            .unwrap();
        assert_eq!(orch.request("helius", Value::Null).await.unwrap(), Some(json!(42)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_error_penalizes_limiter() {
        let orch = orchestrator();
        configure(&orch, "helius", 10);
        let op = operation_fn(|_| async {
            Err(ProviderError::rate_limited(Some(Duration::from_secs(30))))
        });

        orch.execute_with_fallback("helius", op.as_ref(), Value::Null)
            .await
            .unwrap();

        let status = orch.get_rate_limit_status("helius").unwrap();
        assert_eq!(status.blocked_for, Some(Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn test_stats_and_reset() {
        let orch = orchestrator();
        configure(&orch, "helius", 2);
        configure(&orch, "solscan", 2);
        let resets = recorder(orch.events(), kinds::SERVICE_RESET);
        let op = failing(Arc::new(AtomicUsize::new(0)));

        for _ in 0..3 {
            orch.execute_with_fallback("helius", op.as_ref(), Value::Null)
                .await
                .unwrap();
        }

        let stats = orch.get_error_stats().await;
        assert_eq!(stats.total_errors, 2);
        assert_eq!(stats.errors_by_service["helius"], 2);
        assert_eq!(stats.errors_by_service["solscan"], 0);
        assert_eq!(stats.breaker_states["helius"], CircuitState::Open);
        assert_eq!(stats.recent_errors.len(), 2);

        let analysis = orch.analyze_errors().await;
        assert_eq!(analysis.errors_by_service["helius"], 2);

        assert!(orch.reset_service("helius").await);
        assert!(!orch.reset_service("unknown").await);
        assert_eq!(resets.lock().unwrap().len(), 1);

        let stats = orch.get_error_stats().await;
        assert_eq!(stats.total_errors, 0);
        assert_eq!(stats.breaker_states["helius"], CircuitState::Closed);
    }
}
