//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events (structured, `service = ...` fields)
//!     → metrics.rs (counters, gauges, histograms)
//!     → the event bus (for in-process consumers)
//!
//! Consumers:
//!     → logging.rs subscriber (stdout)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - The library only emits; the binary decides where output goes
//! - Metric updates are cheap and safe without a recorder installed

pub mod logging;
pub mod metrics;
