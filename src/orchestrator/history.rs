//! Bounded error history and the reports built from it.

use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, SystemTime};

use serde::Serialize;
use tokio::time::Instant;

use crate::error::{ErrorKind, ProviderError};
use crate::resilience::CircuitState;

/// Records kept before the oldest are discarded.
pub const HISTORY_CAPACITY: usize = 1000;

/// Errors returned in `ErrorStats::recent_errors`.
pub const RECENT_ERRORS: usize = 10;

/// Window covered by `analyze_errors`.
pub const ANALYSIS_WINDOW: Duration = Duration::from_secs(3600);

/// One failed provider call.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub service: String,
    pub kind: ErrorKind,
    pub message: String,
    pub status: Option<u16>,
    pub retry_after: Option<Duration>,
    pub timestamp: SystemTime,
    #[serde(skip)]
    pub(crate) recorded_at: Instant,
}

impl ErrorRecord {
    pub fn new(service: &str, err: &ProviderError) -> Self {
        Self {
            service: service.to_string(),
            kind: err.kind,
            message: err.message.clone(),
            status: err.status,
            retry_after: err.retry_after,
            timestamp: SystemTime::now(),
            recorded_at: Instant::now(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ErrorHistory {
    records: VecDeque<ErrorRecord>,
}

impl ErrorHistory {
    pub fn push(&mut self, record: ErrorRecord) {
        if self.records.len() == HISTORY_CAPACITY {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The newest `n` records, oldest first.
    pub fn recent(&self, n: usize) -> Vec<ErrorRecord> {
        let skip = self.records.len().saturating_sub(n);
        self.records.iter().skip(skip).cloned().collect()
    }

    /// Records no older than `window`.
    pub fn within(&self, window: Duration) -> impl Iterator<Item = &ErrorRecord> {
        let now = Instant::now();
        self.records
            .iter()
            .filter(move |r| now.saturating_duration_since(r.recorded_at) <= window)
    }
}

/// Snapshot returned by `get_error_stats`.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorStats {
    pub total_errors: u64,
    pub errors_by_service: BTreeMap<String, u64>,
    pub breaker_states: BTreeMap<String, CircuitState>,
    pub recent_errors: Vec<ErrorRecord>,
}

/// Error pattern summary over the last hour.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorAnalysis {
    pub window_secs: u64,
    /// Errors per second over the window.
    pub error_rate: f64,
    pub errors_by_kind: BTreeMap<String, u64>,
    pub errors_by_service: BTreeMap<String, u64>,
}

impl ErrorAnalysis {
    pub fn from_history(history: &ErrorHistory) -> Self {
        let mut errors_by_kind = BTreeMap::new();
        let mut errors_by_service = BTreeMap::new();
        let mut total = 0u64;

        for record in history.within(ANALYSIS_WINDOW) {
            total += 1;
            *errors_by_kind
                .entry(record.kind.as_str().to_string())
                .or_insert(0) += 1;
            *errors_by_service.entry(record.service.clone()).or_insert(0) += 1;
        }

        Self {
            window_secs: ANALYSIS_WINDOW.as_secs(),
            error_rate: total as f64 / ANALYSIS_WINDOW.as_secs_f64(),
            errors_by_kind,
            errors_by_service,
        }
    }
}
