//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! RecoveryManager (per monitor cycle, per service):
//!     → HealthCheck::check()
//!         closures supplied by the application
//!         HttpProbe for services declaring a health_url
//!     → Ok(true) healthy, Ok(false) / Err unhealthy
//! ```

pub mod check;
pub mod probe;

pub use check::{health_check_fn, HealthCheck};
pub use probe::HttpProbe;
