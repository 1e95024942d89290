//! Reactive Primitives
//!
//! This module contains the value-level building blocks:
//! - `EventChannel`: ordered multi-subscriber notification
//! - `ReactiveCell`: a single value that notifies on every update
//! - `DuplexCell`: a two-way value with echo suppression
//! - `Stream`: an input/output cell pair around a stage chain
//!
//! All of them push synchronously: when `update` returns, every subscriber
//! has already run.

mod cell;
mod channel;
mod duplex;
mod propagation;
mod stream;
mod subscriber;

pub use cell::{ReactiveCell, WeakCell};
pub use channel::EventChannel;
pub use duplex::{DuplexBinding, DuplexCell};
pub use propagation::PropagationState;
pub use stream::Stream;
pub use subscriber::{SubscriberId, Subscription};

pub(crate) use propagation::PropagationFence;
