//! Bounded, backoff-scheduled service recovery.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

use arc_swap::ArcSwap;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::json;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::config::RecoveryConfig;
use crate::error::ConfigurationError;
use crate::events::{kinds, EventBus};
use crate::health::HealthCheck;
use crate::lifecycle::ShutdownSignal;
use crate::observability::metrics;
use crate::orchestrator::ErrorOrchestrator;
use crate::resilience::backoff::recovery_delay;

const SOURCE: &str = "recovery_manager";

/// Mutable recovery bookkeeping of one service.
#[derive(Debug, Clone, Default)]
pub struct RecoveryRuntime {
    pub attempts: u32,
    pub last_recovery: Option<SystemTime>,
    last_recovery_at: Option<Instant>,
}

struct ServiceRecovery {
    config: ArcSwap<RecoveryConfig>,
    runtime: Mutex<RecoveryRuntime>,
}

impl ServiceRecovery {
    fn runtime(&self) -> MutexGuard<'_, RecoveryRuntime> {
        self.runtime.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Reported by `get_service_status`.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub service: String,
    pub attempts: u32,
    pub last_recovery_time: Option<SystemTime>,
    pub exhausted: bool,
    pub config: RecoveryConfig,
}

/// What one monitor cycle did for a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcome {
    /// A recovery attempt happened within the health check interval.
    Skipped,
    Healthy,
    Recovered,
    RecoveryFailed,
    /// Out of attempts until `reset_attempts` is called.
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    Recovered,
    Failed,
    Exhausted,
}

pub struct RecoveryManager {
    orchestrator: Arc<ErrorOrchestrator>,
    events: Arc<EventBus>,
    services: DashMap<String, Arc<ServiceRecovery>>,
    checks: DashMap<String, Arc<dyn HealthCheck>>,
}

impl RecoveryManager {
    pub fn new(orchestrator: Arc<ErrorOrchestrator>) -> Self {
        let events = orchestrator.events().clone();
        Self {
            orchestrator,
            events,
            services: DashMap::new(),
            checks: DashMap::new(),
        }
    }

    pub fn configure_service(
        &self,
        service: &str,
        config: RecoveryConfig,
    ) -> Result<(), ConfigurationError> {
        config.validate().map_err(|source| ConfigurationError::Invalid {
            service: service.to_string(),
            source,
        })?;

        match self.services.entry(service.to_string()) {
            Entry::Occupied(entry) => entry.get().config.store(Arc::new(config)),
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(ServiceRecovery {
                    config: ArcSwap::from_pointee(config),
                    runtime: Mutex::new(RecoveryRuntime::default()),
                }));
            }
        }
        tracing::debug!(service, "Recovery configured");
        Ok(())
    }

    /// Stop monitoring `service`. Returns whether it was monitored.
    pub fn remove_service(&self, service: &str) -> bool {
        self.checks.remove(service);
        self.services.remove(service).is_some()
    }

    pub fn is_monitored(&self, service: &str) -> bool {
        self.services.contains_key(service)
    }

    pub fn register_health_check(
        &self,
        service: &str,
        check: Arc<dyn HealthCheck>,
    ) -> Result<(), ConfigurationError> {
        if !self.services.contains_key(service) {
            return Err(ConfigurationError::UnknownService(service.to_string()));
        }
        self.checks.insert(service.to_string(), check);
        Ok(())
    }

    fn service(&self, service: &str) -> Result<Arc<ServiceRecovery>, ConfigurationError> {
        self.services
            .get(service)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ConfigurationError::UnknownService(service.to_string()))
    }

    fn service_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Run the registered check. A missing check or a failing one is
    /// reported as unhealthy.
    pub async fn check_service_health(&self, service: &str) -> bool {
        let Some(check) = self.checks.get(service).map(|e| e.value().clone()) else {
            tracing::warn!(service, "No health check registered");
            return false;
        };

        let (healthy, error) = match check.check().await {
            Ok(healthy) => (healthy, None),
            Err(e) => {
                tracing::error!(service, error = %e, "Health check failed");
                (false, Some(e.to_string()))
            }
        };

        self.events
            .emit_from(
                SOURCE,
                kinds::HEALTH_CHECK,
                json!({ "service": service, "healthy": healthy, "error": error }),
            )
            .await;
        healthy
    }

    /// Try once to bring `service` back.
    ///
    /// Returns `Ok(false)` without waiting when the service has used up its
    /// attempts.
    pub async fn attempt_recovery(&self, service: &str) -> Result<bool, ConfigurationError> {
        Ok(self.recover(service).await? == Attempt::Recovered)
    }

    async fn recover(&self, service: &str) -> Result<Attempt, ConfigurationError> {
        let entry = self.service(service)?;
        let config = entry.config.load_full();

        let previous = {
            let mut runtime = entry.runtime();
            if runtime.attempts >= config.max_attempts {
                None
            } else {
                let previous = runtime.attempts;
                runtime.attempts += 1;
                runtime.last_recovery = Some(SystemTime::now());
                runtime.last_recovery_at = Some(Instant::now());
                Some(previous)
            }
        };

        let Some(previous) = previous else {
            tracing::error!(service, max_attempts = config.max_attempts, "Max recovery attempts reached");
            metrics::record_recovery_attempt(service, "exhausted");
            self.events
                .emit_from(
                    SOURCE,
                    kinds::RECOVERY_EXHAUSTED,
                    json!({ "service": service, "max_attempts": config.max_attempts }),
                )
                .await;
            return Ok(Attempt::Exhausted);
        };

        let attempt = previous + 1;
        let delay = recovery_delay(&config, previous);
        tracing::info!(
            service,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Attempting recovery"
        );
        self.events
            .emit_from(
                SOURCE,
                kinds::RECOVERY_ATTEMPT,
                json!({
                    "service": service,
                    "attempt": attempt,
                    "delay_ms": delay.as_millis() as u64,
                }),
            )
            .await;

        time::sleep(delay).await;

        if !self.orchestrator.reset_service(service).await {
            tracing::warn!(service, "Service has no breaker to reset");
        }

        if self.check_service_health(service).await {
            entry.runtime().attempts = 0;
            tracing::info!(service, attempt, "Service recovered");
            metrics::record_recovery_attempt(service, "success");
            self.events
                .emit_from(
                    SOURCE,
                    kinds::RECOVERY_SUCCESS,
                    json!({ "service": service, "attempts": attempt }),
                )
                .await;
            Ok(Attempt::Recovered)
        } else {
            tracing::warn!(service, attempt, "Recovery attempt failed");
            metrics::record_recovery_attempt(service, "failure");
            self.events
                .emit_from(
                    SOURCE,
                    kinds::RECOVERY_FAILURE,
                    json!({
                        "service": service,
                        "attempt": attempt,
                        "error": "service still unhealthy",
                    }),
                )
                .await;
            Ok(Attempt::Failed)
        }
    }

    /// One pass of the monitor over every configured service.
    pub async fn run_cycle(&self) -> BTreeMap<String, CycleOutcome> {
        let mut outcomes = BTreeMap::new();

        for service in self.service_names() {
            let Ok(entry) = self.service(&service) else {
                continue;
            };
            let interval = entry.config.load().health_check_interval();
            let recent = entry
                .runtime()
                .last_recovery_at
                .is_some_and(|at| at.elapsed() < interval);
            if recent {
                outcomes.insert(service, CycleOutcome::Skipped);
                continue;
            }

            if self.check_service_health(&service).await {
                outcomes.insert(service, CycleOutcome::Healthy);
                continue;
            }

            tracing::warn!(service = %service, "Service unhealthy, attempting recovery");
            let outcome = match self.recover(&service).await {
                Ok(Attempt::Recovered) => CycleOutcome::Recovered,
                Ok(Attempt::Failed) => CycleOutcome::RecoveryFailed,
                Ok(Attempt::Exhausted) => CycleOutcome::Exhausted,
                // Removed by a reload while the cycle was running.
                Err(_) => continue,
            };
            outcomes.insert(service, outcome);
        }
        outcomes
    }

    /// Run `run_cycle` every `interval` until shutdown is signalled.
    pub async fn monitor_services(
        &self,
        interval: Duration,
        mut shutdown: ShutdownSignal,
    ) {
        tracing::info!(
            interval_secs = interval.as_secs(),
            services = self.services.len(),
            "Recovery monitor starting"
        );

        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.recv() => break,
            }
            tokio::select! {
                _ = self.run_cycle() => {}
                _ = shutdown.recv() => break,
            }
        }
        tracing::info!("Recovery monitor received shutdown signal, exiting loop");
    }

    pub fn get_service_status(&self, service: &str) -> Result<ServiceStatus, ConfigurationError> {
        let entry = self.service(service)?;
        let config = RecoveryConfig::clone(&entry.config.load());
        let runtime = entry.runtime().clone();

        Ok(ServiceStatus {
            service: service.to_string(),
            attempts: runtime.attempts,
            last_recovery_time: runtime.last_recovery,
            exhausted: runtime.attempts >= config.max_attempts,
            config,
        })
    }

    /// Clear the attempt counter, making an exhausted service eligible again.
    pub fn reset_attempts(&self, service: &str) -> Result<(), ConfigurationError> {
        let entry = self.service(service)?;
        entry.runtime().attempts = 0;
        tracing::info!(service, "Recovery attempts reset");
        Ok(())
    }
}
