//! Dual-path dispatch
//!
//! The dispatcher sends on the critical path and queues the same events for
//! the observer, which drains them on its own cadence.

mod dispatcher;
mod queue;
mod retrigger;

pub use dispatcher::{DispatchOutcome, EventDispatcher, HeldKeySet};
pub use queue::{DispatchQueue, EventHistory, DEFAULT_PENDING_CAPACITY, HISTORY_CAPACITY};
