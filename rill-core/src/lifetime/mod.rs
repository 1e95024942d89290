//! Lifetimes and Scheduling
//!
//! Resource ownership for the reactive core. A [`LifetimeToken`] collects
//! teardown actions (unsubscribe, stop a timer, cancel a child token) and
//! runs them together when cancelled.
//!
//! Deferred work is scheduled on a cooperative, per-thread [`timer`] queue.
//! The queue only moves when its clock is advanced, which keeps tests
//! deterministic; [`driver::drive`] advances it against tokio time in a
//! running application.

pub mod driver;
pub mod timer;
mod token;

pub use timer::TimerHandle;
pub use token::{Cleanup, CleanupId, LifetimeToken, TokenState};
