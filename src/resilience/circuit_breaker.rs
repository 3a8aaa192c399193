//! Circuit breaker for provider protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: provider assumed down, requests fail fast
//! - Half-Open: one trial request decides the next state
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure_count >= threshold within the error window
//! Open → Half-Open: first allow_request after open_timeout (issues the trial permit)
//! Half-Open → Closed: trial succeeds
//! Half-Open → Open: trial fails
//! ```
//!
//! # Design Decisions
//! - One breaker per service (not global)
//! - Never suspends; all state sits under one short std mutex
//! - Single trial in Half-Open; other callers are denied until it resolves
//! - Only the trial permit decides Half-Open; late results from calls
//!   admitted earlier are bookkeeping only
//! - A trial unresolved for a whole open_timeout is treated as lost and re-issued
//! - Transitions are returned to the caller, which publishes them

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::config::CircuitConfig;
use crate::observability::metrics;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// A state change, handed back so the caller can publish it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub from: CircuitState,
    pub to: CircuitState,
    pub failures: u32,
}

/// Admission handed out by [`CircuitBreaker::allow_request`].
///
/// The caller hands it back with the outcome of the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct Permit {
    trial: Option<u64>,
}

impl Permit {
    /// Whether this permit is the half-open trial.
    pub fn is_trial(&self) -> bool {
        self.trial.is_some()
    }
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub failures: u32,
    pub successes: u64,
    pub since_last_failure: Option<Duration>,
    pub since_state_change: Duration,
    pub trial_in_flight: bool,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failures: u32,
    successes: u64,
    last_failure: Option<Instant>,
    last_state_change: Instant,
    /// When the outstanding half-open trial permit was handed out.
    trial_issued: Option<Instant>,
    /// Generation of the latest trial permit.
    trial_generation: u64,
}

impl Inner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failures: 0,
            successes: 0,
            last_failure: None,
            last_state_change: Instant::now(),
            trial_issued: None,
            trial_generation: 0,
        }
    }

    fn issue_trial(&mut self, now: Instant) -> Permit {
        self.trial_issued = Some(now);
        self.trial_generation += 1;
        Permit {
            trial: Some(self.trial_generation),
        }
    }

    /// Whether `permit` is the trial currently in flight.
    fn holds_trial(&self, permit: Permit) -> bool {
        self.trial_issued.is_some() && permit.trial == Some(self.trial_generation)
    }
}

/// Breaker for a single service.
#[derive(Debug)]
pub struct CircuitBreaker {
    service: String,
    config: ArcSwap<CircuitConfig>,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(service: impl Into<String>, config: CircuitConfig) -> Self {
        Self {
            service: service.into(),
            config: ArcSwap::from_pointee(config),
            inner: Mutex::new(Inner::new()),
        }
    }

    /// Swap in a new policy; the current state is kept.
    pub fn reconfigure(&self, config: CircuitConfig) {
        self.config.store(std::sync::Arc::new(config));
    }

    pub fn config(&self) -> CircuitConfig {
        CircuitConfig::clone(&self.config.load())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, inner: &mut Inner, to: CircuitState, now: Instant) -> Transition {
        let from = inner.state;
        inner.state = to;
        inner.last_state_change = now;
        metrics::record_breaker_state(&self.service, to);
        Transition {
            from,
            to,
            failures: inner.failures,
        }
    }

    /// Decide whether a call may go out now. `None` means denied.
    pub fn allow_request(&self) -> Option<Permit> {
        let open_timeout = self.config.load().open_timeout();
        let now = Instant::now();
        let mut inner = self.lock();

        match inner.state {
            CircuitState::Closed => Some(Permit { trial: None }),
            CircuitState::Open => {
                if now.saturating_duration_since(inner.last_state_change) < open_timeout {
                    return None;
                }
                self.transition(&mut inner, CircuitState::HalfOpen, now);
                tracing::info!(service = %self.service, "Circuit breaker half-open, trial permitted");
                Some(inner.issue_trial(now))
            }
            CircuitState::HalfOpen => match inner.trial_issued {
                Some(issued) if now.saturating_duration_since(issued) < open_timeout => None,
                _ => {
                    tracing::warn!(
                        service = %self.service,
                        "Half-open trial never reported back, issuing a new one"
                    );
                    Some(inner.issue_trial(now))
                }
            },
        }
    }

    /// Record a successful call made under `permit`.
    pub fn record_success(&self, permit: Permit) -> Option<Transition> {
        let now = Instant::now();
        let mut inner = self.lock();
        inner.successes += 1;

        if inner.state != CircuitState::HalfOpen {
            return None;
        }
        if !inner.holds_trial(permit) {
            tracing::debug!(service = %self.service, "Ignoring late success while trial is pending");
            return None;
        }

        inner.failures = 0;
        inner.trial_issued = None;
        let transition = self.transition(&mut inner, CircuitState::Closed, now);
        tracing::info!(service = %self.service, "Circuit breaker closed after successful trial");
        Some(transition)
    }

    /// Record a failed call made under `permit`.
    pub fn record_failure(&self, permit: Permit) -> Option<Transition> {
        let config = self.config.load();
        let now = Instant::now();
        let mut inner = self.lock();

        if inner.state == CircuitState::HalfOpen {
            if !inner.holds_trial(permit) {
                tracing::debug!(service = %self.service, "Ignoring late failure while trial is pending");
                return None;
            }
            inner.failures = inner.failures.saturating_add(1);
            inner.last_failure = Some(now);
            inner.trial_issued = None;
            let transition = self.transition(&mut inner, CircuitState::Open, now);
            tracing::warn!(service = %self.service, "Half-open trial failed, circuit breaker reopened");
            return Some(transition);
        }

        if let Some(last) = inner.last_failure {
            if now.saturating_duration_since(last) > config.error_window() {
                inner.failures = 0;
            }
        }
        inner.failures = inner.failures.saturating_add(1);
        inner.last_failure = Some(now);

        if inner.failures >= config.failure_threshold && inner.state == CircuitState::Closed {
            let transition = self.transition(&mut inner, CircuitState::Open, now);
            tracing::warn!(
                service = %self.service,
                failures = inner.failures,
                "Circuit breaker opened"
            );
            return Some(transition);
        }
        None
    }

    /// Force the breaker closed and forget past failures.
    pub fn reset(&self) -> Option<Transition> {
        let now = Instant::now();
        let mut inner = self.lock();
        inner.failures = 0;
        inner.last_failure = None;
        inner.trial_issued = None;

        if inner.state == CircuitState::Closed {
            return None;
        }
        Some(self.transition(&mut inner, CircuitState::Closed, now))
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let now = Instant::now();
        let inner = self.lock();
        CircuitSnapshot {
            state: inner.state,
            failures: inner.failures,
            successes: inner.successes,
            since_last_failure: inner.last_failure.map(|t| now.saturating_duration_since(t)),
            since_state_change: now.saturating_duration_since(inner.last_state_change),
            trial_in_flight: inner.trial_issued.is_some(),
        }
    }
}
