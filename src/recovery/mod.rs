//! Service recovery subsystem.
//!
//! # Data Flow
//! ```text
//! monitor_services (every monitor interval):
//!     → run_cycle: for each monitored service
//!         → skip if an attempt happened within health_check_interval
//!         → health check
//!         → unhealthy: attempt_recovery
//!             → exhausted? report, no wait
//!             → backoff sleep → orchestrator.reset_service → health check
//! ```
//!
//! # Design Decisions
//! - Attempts only grow on failure and return to zero on any success
//! - An exhausted service stays exhausted until `reset_attempts`
//! - No lock is held across a suspension point; the loop can be cancelled anywhere

pub mod manager;

pub use manager::{CycleOutcome, RecoveryManager, RecoveryRuntime, ServiceStatus};
