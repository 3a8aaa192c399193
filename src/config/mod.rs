//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ShieldConfig (validated, immutable)
//!     → ShieldContext::apply_config → configure_service per component
//!
//! On file change:
//!     watcher.rs detects change (repeats of the same content are dropped)
//!     → loader.rs parses, validation.rs validates
//!     → ConfigUpdate::Loaded → each service policy swapped atomically (ArcSwap)
//!     → ConfigUpdate::Rejected → caller logs it, current policies stay
//! ```
//!
//! # Design Decisions
//! - Policies are immutable snapshots; reconfiguration replaces, never mutates
//! - All fields have defaults to allow minimal configs
//! - Components receive validated snapshots; only loader and watcher touch files

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use schema::{
    CircuitConfig, EventBusConfig, MonitorConfig, ObservabilityConfig, RateLimitConfig,
    RecoveryConfig, RetryConfig, ServiceConfig, ShieldConfig,
};
