//! Error orchestration subsystem.
//!
//! # Data Flow
//! ```text
//! execute_with_fallback(service, operation, args):
//!     → breaker.allow_request()        denied → fallback
//!     → limiter.acquire()              (may suspend)
//!     → operation.call(args)
//!         Ok  → breaker.record_success(permit) → Some(value)
//!         Err → history + service_error event
//!             → limiter.penalize (rate limit errors only)
//!             → breaker.record_failure(permit) → fallback
//!
//! request(service, args):
//!     same path with the registered provider; transient errors are
//!     retried with backoff while the breaker stays closed
//!
//! fallback(service):
//!     Static   → value
//!     Handler  → collaborator operation
//!     Delegate → request(target), hop + 1
//!     none / failed / target without provider → None
//! ```
//!
//! # Design Decisions
//! - Transient provider failures are absorbed; only configuration errors escape
//! - Delegation graph is kept acyclic at registration, and walks are hop-bounded
//! - Delegation always enters the target through its public path, never its state

pub mod fallback;
pub mod history;
pub mod manager;
pub mod operation;

pub use fallback::{Fallback, FallbackGraph, MAX_FALLBACK_DEPTH};
pub use history::{ErrorAnalysis, ErrorHistory, ErrorRecord, ErrorStats};
pub use manager::ErrorOrchestrator;
pub use operation::{operation_fn, Operation};
