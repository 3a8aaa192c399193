//! Resilience layer for unreliable, rate-limited third-party providers.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────┐
//!                 │                    ShieldContext                     │
//!                 │                                                      │
//!   request /     │  ┌──────────────┐   ┌──────────────┐   ┌──────────┐  │
//!   execute ──────┼─▶│ orchestrator │──▶│  resilience  │──▶│ provider │──┼──▶ third party
//!                 │  │  + fallback  │   │ breaker/rate │   │operation │  │
//!                 │  └──────┬───────┘   └──────────────┘   └──────────┘  │
//!                 │         │ reset_service                              │
//!                 │  ┌──────┴───────┐   ┌──────────────┐                 │
//!                 │  │   recovery   │──▶│    health    │                 │
//!                 │  │   monitor    │   │    checks    │                 │
//!                 │  └──────────────┘   └──────────────┘                 │
//!                 │                                                      │
//!                 │  ┌────────────────────────────────────────────────┐  │
//!                 │  │  events · config · observability · lifecycle   │  │
//!                 │  └────────────────────────────────────────────────┘  │
//!                 └──────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod health;
pub mod lifecycle;
pub mod observability;
pub mod orchestrator;
pub mod recovery;
pub mod resilience;

pub use config::schema::ShieldConfig;
pub use context::ShieldContext;
pub use error::{ConfigurationError, ErrorKind, ProviderError};
pub use events::{DispatchPolicy, EventBus};
pub use lifecycle::Shutdown;
pub use orchestrator::{ErrorOrchestrator, Fallback, Operation};
pub use recovery::RecoveryManager;
