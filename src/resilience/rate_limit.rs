//! Per-service multi-window rate limiting.
//!
//! Each service gets its own quota state: a minimum spacing between grants
//! plus sliding per-minute and per-hour caps. `acquire` never rejects, it
//! suspends until a slot is free under every window.
//!
//! Acquirers of one service queue on a FIFO `tokio::sync::Mutex` gate, so
//! grants happen in arrival order. The counters themselves sit behind a
//! short-lived std mutex, which keeps `status` readable while an acquirer is
//! sleeping. Services never share either lock.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use arc_swap::ArcSwap;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;

use crate::config::RateLimitConfig;
use crate::error::ConfigurationError;
use crate::observability::metrics;

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(3600);

/// Grant history for one service.
#[derive(Debug, Default)]
pub(crate) struct WindowState {
    /// Grant instants within the last hour, oldest first.
    grants: VecDeque<Instant>,
    last_grant: Option<Instant>,
    /// Provider-imposed pause (HTTP 429 and friends).
    blocked_until: Option<Instant>,
}

impl WindowState {
    fn prune(&mut self, now: Instant) {
        while let Some(&oldest) = self.grants.front() {
            if oldest + HOUR <= now {
                self.grants.pop_front();
            } else {
                break;
            }
        }
    }

    /// Grants still counted against a window of length `window`.
    fn in_window(&self, window: Duration, now: Instant) -> usize {
        let expired = self.grants.partition_point(|t| *t + window <= now);
        self.grants.len() - expired
    }

    /// How long until the cap for `window` frees a slot, if it is full.
    fn window_block(&self, window: Duration, limit: u32, now: Instant) -> Duration {
        let limit = limit as usize;
        if self.in_window(window, now) < limit {
            return Duration::ZERO;
        }
        // The grant that has to age out before one more fits.
        let blocking = self.grants[self.grants.len() - limit];
        (blocking + window).saturating_duration_since(now)
    }

    fn wait_time(&self, config: &RateLimitConfig, now: Instant) -> Duration {
        let spacing = self
            .last_grant
            .map(|last| (last + config.min_interval()).saturating_duration_since(now))
            .unwrap_or_default();
        let penalty = self
            .blocked_until
            .map(|until| until.saturating_duration_since(now))
            .unwrap_or_default();

        spacing
            .max(self.window_block(MINUTE, config.requests_per_minute, now))
            .max(self.window_block(HOUR, config.requests_per_hour, now))
            .max(penalty)
    }

    fn record(&mut self, now: Instant) {
        self.grants.push_back(now);
        self.last_grant = Some(now);
    }
}

/// Quota state and policy for one service.
#[derive(Debug)]
struct ServiceLimiter {
    config: ArcSwap<RateLimitConfig>,
    gate: tokio::sync::Mutex<()>,
    window: Mutex<WindowState>,
}

impl ServiceLimiter {
    fn new(config: RateLimitConfig) -> Self {
        Self {
            config: ArcSwap::from_pointee(config),
            gate: tokio::sync::Mutex::new(()),
            window: Mutex::new(WindowState::default()),
        }
    }

    fn window(&self) -> std::sync::MutexGuard<'_, WindowState> {
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Snapshot returned by [`RateLimiter::status`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimitStatus {
    pub minute_requests: usize,
    pub hour_requests: usize,
    pub time_since_last: Option<Duration>,
    pub minute_limit: u32,
    pub hour_limit: u32,
    /// Remaining provider-imposed pause, if any.
    pub blocked_for: Option<Duration>,
}

/// Rate limiter for all configured services.
#[derive(Debug, Default)]
pub struct RateLimiter {
    services: DashMap<String, Arc<ServiceLimiter>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or replace the quota policy for `service`.
    ///
    /// Replacing a policy keeps the grant history, so a reload cannot be
    /// used to burst past the previous windows.
    pub fn configure_service(
        &self,
        service: &str,
        config: RateLimitConfig,
    ) -> Result<(), ConfigurationError> {
        config.validate().map_err(|source| ConfigurationError::Invalid {
            service: service.to_string(),
            source,
        })?;

        match self.services.entry(service.to_string()) {
            Entry::Occupied(entry) => entry.get().config.store(Arc::new(config)),
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(ServiceLimiter::new(config)));
            }
        }
        tracing::debug!(service, "Rate limit configured");
        Ok(())
    }

    pub fn is_configured(&self, service: &str) -> bool {
        self.services.contains_key(service)
    }

    fn limiter(&self, service: &str) -> Result<Arc<ServiceLimiter>, ConfigurationError> {
        self.services
            .get(service)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ConfigurationError::UnknownService(service.to_string()))
    }

    /// Wait for a request slot and record the grant.
    ///
    /// Returns how long the caller was held back. Dropping the returned
    /// future while it sleeps releases the service gate.
    pub async fn acquire(&self, service: &str) -> Result<Duration, ConfigurationError> {
        let limiter = self.limiter(service)?;
        let started = Instant::now();
        let _turn = limiter.gate.lock().await;

        loop {
            let config = limiter.config.load_full();
            let wait = {
                let mut window = limiter.window();
                let now = Instant::now();
                window.prune(now);
                let wait = window.wait_time(&config, now);
                if wait.is_zero() {
                    window.record(now);
                }
                wait
            };

            if wait.is_zero() {
                break;
            }

            tracing::debug!(
                service,
                wait_ms = wait.as_millis() as u64,
                "Rate limit reached, waiting"
            );
            tokio::time::sleep(wait).await;
        }

        let waited = started.elapsed();
        metrics::record_rate_limit_wait(service, waited);
        Ok(waited)
    }

    /// Hold back every grant for `service` for `retry_after`, or the
    /// configured default when the provider gave no hint.
    pub fn penalize(
        &self,
        service: &str,
        retry_after: Option<Duration>,
    ) -> Result<(), ConfigurationError> {
        let limiter = self.limiter(service)?;
        let pause = retry_after.unwrap_or_else(|| limiter.config.load().retry_after());
        let until = Instant::now() + pause;

        let mut window = limiter.window();
        window.blocked_until = Some(window.blocked_until.map_or(until, |b| b.max(until)));
        tracing::warn!(service, pause_secs = pause.as_secs_f64(), "Provider rate limited, pausing");
        Ok(())
    }

    pub fn status(&self, service: &str) -> Result<RateLimitStatus, ConfigurationError> {
        let limiter = self.limiter(service)?;
        let config = limiter.config.load();
        let now = Instant::now();
        let window = limiter.window();

        Ok(RateLimitStatus {
            minute_requests: window.in_window(MINUTE, now),
            hour_requests: window.in_window(HOUR, now),
            time_since_last: window.last_grant.map(|t| now.saturating_duration_since(t)),
            minute_limit: config.requests_per_minute,
            hour_limit: config.requests_per_hour,
            blocked_for: window
                .blocked_until
                .map(|until| until.saturating_duration_since(now))
                .filter(|d| !d.is_zero()),
        })
    }
}
