//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to a provider:
//!     → rate_limit.rs (wait until all quota windows admit the call)
//!     → circuit_breaker.rs (fail fast while the provider is considered down)
//!     → On failure: breaker counts it, rate limiter may be penalized
//!
//! Recovery:
//!     → backoff.rs (exponential delay between recovery attempts)
//! ```
//!
//! # Design Decisions
//! - Per-service state; contention on one provider never blocks another
//! - Breaker never suspends, the limiter only suspends the waiting caller
//! - Policies are hot-swappable without losing accumulated history

pub mod backoff;
pub mod circuit_breaker;
pub mod rate_limit;

pub use circuit_breaker::{CircuitBreaker, CircuitSnapshot, CircuitState, Permit, Transition};
pub use rate_limit::{RateLimitStatus, RateLimiter};
