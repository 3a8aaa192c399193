//! Event bus subsystem.
//!
//! # Data Flow
//! ```text
//! Producer (orchestrator, recovery, application):
//!     → EventBus::emit(kind, data)
//!     → Subscription table copied for `kind`
//!     → Sequential: each handler awaited in order
//!       Concurrent: each handler spawned into the pending set
//!     → Handler errors, panics and timeouts are logged and counted
//!
//! Shutdown:
//!     → clear_handlers (abort pending, await cancellation, drop subscriptions)
//! ```
//!
//! # Design Decisions
//! - Dispatch policy fixed at construction, overridable per emit
//! - Payloads are JSON values so any collaborator can consume them
//! - A failing handler never affects its siblings or the emitter

pub mod bus;
pub mod event;

pub use bus::{DispatchPolicy, EventBus};
pub use event::{handler_fn, kinds, Event, EventHandler, HandlerError, SubscriptionId};
