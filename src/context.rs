//! Composition root for the shield components.
//!
//! One [`ShieldContext`] is built per process and passed by reference to
//! whoever needs the orchestrator, the recovery manager or the bus.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::task::JoinHandle;
use url::Url;

use crate::config::validation::{validate_config, ValidationError};
use crate::config::{EventBusConfig, ShieldConfig};
use crate::error::ConfigurationError;
use crate::events::EventBus;
use crate::health::HttpProbe;
use crate::lifecycle::{Shutdown, ShutdownSignal};
use crate::orchestrator::{ErrorOrchestrator, Fallback};
use crate::recovery::RecoveryManager;

/// Deadline for the HTTP probes built from `health_url`.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct ShieldContext {
    events: Arc<EventBus>,
    orchestrator: Arc<ErrorOrchestrator>,
    recovery: Arc<RecoveryManager>,
    config: ArcSwap<ShieldConfig>,
    shutdown: Shutdown,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

impl ShieldContext {
    /// An empty context; services are added with `apply_config` or through
    /// the components directly.
    pub fn new(events: &EventBusConfig) -> Self {
        let events = Arc::new(EventBus::from_config(events));
        let orchestrator = Arc::new(ErrorOrchestrator::new(events.clone()));
        let recovery = Arc::new(RecoveryManager::new(orchestrator.clone()));

        Self {
            events,
            orchestrator,
            recovery,
            config: ArcSwap::from_pointee(ShieldConfig::default()),
            shutdown: Shutdown::new(),
            monitor: Mutex::new(None),
        }
    }

    pub fn from_config(config: &ShieldConfig) -> Result<Self, ConfigurationError> {
        let context = Self::new(&config.events);
        context.apply_config(config)?;
        Ok(context)
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn orchestrator(&self) -> &Arc<ErrorOrchestrator> {
        &self.orchestrator
    }

    pub fn recovery(&self) -> &Arc<RecoveryManager> {
        &self.recovery
    }

    /// The configuration most recently applied.
    pub fn config(&self) -> Arc<ShieldConfig> {
        self.config.load_full()
    }

    pub fn subscribe_shutdown(&self) -> ShutdownSignal {
        self.shutdown.subscribe()
    }

    /// Install every service policy of `config`.
    ///
    /// Existing services keep their runtime state; only their policies are
    /// replaced. Event bus and monitor settings take effect on restart.
    pub fn apply_config(&self, config: &ShieldConfig) -> Result<(), ConfigurationError> {
        validate_config(config).map_err(ConfigurationError::Rejected)?;
        let previous = self.config.load_full();

        for service in &config.services {
            self.orchestrator.configure_service(
                &service.name,
                service.rate_limit.clone(),
                service.circuit.clone(),
            )?;
            self.orchestrator
                .configure_retry(&service.name, service.retry.clone())?;

            match &service.recovery {
                Some(recovery) => {
                    self.recovery
                        .configure_service(&service.name, recovery.clone())?;
                    if let Some(raw) = &service.health_url {
                        self.register_probe(&service.name, raw)?;
                    }
                }
                None => {
                    self.recovery.remove_service(&service.name);
                }
            }
        }

        // Drop stale delegations first so a rewired chain cannot collide
        // with its own old edges.
        for old in &previous.services {
            let current = config.service(&old.name).and_then(|s| s.fallback.as_ref());
            if old.fallback.is_some() && old.fallback.as_ref() != current {
                self.orchestrator.remove_fallback(&old.name);
            }
        }
        for service in &config.services {
            if let Some(target) = &service.fallback {
                self.orchestrator
                    .register_fallback(&service.name, Fallback::Delegate(target.clone()))?;
            }
        }

        for old in &previous.services {
            if config.service(&old.name).is_none() {
                self.recovery.remove_service(&old.name);
                tracing::warn!(
                    service = %old.name,
                    "Service removed from configuration; its limiter and breaker stay in place"
                );
            }
        }

        self.config.store(Arc::new(config.clone()));
        tracing::info!(services = config.services.len(), "Configuration applied");
        Ok(())
    }

    fn register_probe(&self, service: &str, raw: &str) -> Result<(), ConfigurationError> {
        let invalid = |message: String| ConfigurationError::Invalid {
            service: service.to_string(),
            source: ValidationError::new("health_url", message),
        };

        let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
        let probe = HttpProbe::new(url, PROBE_TIMEOUT).map_err(|e| invalid(e.to_string()))?;
        self.recovery
            .register_health_check(service, Arc::new(probe))
    }

    /// Start the recovery monitor if enabled and not already running.
    pub fn spawn_monitor(&self) {
        let monitor = self.config.load().monitor.clone();
        if !monitor.enabled {
            tracing::info!("Recovery monitor disabled");
            return;
        }

        if self.shutdown.is_triggered() {
            tracing::warn!("Shield is shutting down, not starting the recovery monitor");
            return;
        }

        let mut slot = self.monitor.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        let recovery = self.recovery.clone();
        let shutdown = self.shutdown.subscribe();
        *slot = Some(tokio::spawn(async move {
            recovery.monitor_services(monitor.interval(), shutdown).await;
        }));
    }

    /// Stop background loops, then cancel and drop every event handler.
    pub async fn shutdown(&self) {
        self.shutdown.trigger();

        let handle = self
            .monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Recovery monitor task failed");
            }
        }

        self.events.clear_handlers().await;
        tracing::info!("Shield shut down");
    }
}
