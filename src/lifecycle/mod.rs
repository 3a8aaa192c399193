//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (binary):
//!     Load config → Validate → ShieldContext::from_config → Spawn monitor
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Shutdown::trigger → monitor exits → clear_handlers
//!     (loops started after the trigger exit on their first poll)
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → graceful shutdown
//!     SIGHUP → config reload
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then core, then background loops
//! - Ordered shutdown: stop loops, then cancel event handlers

pub mod shutdown;
pub mod signals;

pub use shutdown::{Shutdown, ShutdownSignal};
pub use signals::{Signal, SignalListener};
