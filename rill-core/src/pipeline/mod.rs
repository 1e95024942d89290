//! Pipeline Stages
//!
//! Stages describe how one cell's updates become another cell's updates.
//! They are applied with [`ReactiveCell::transform`](crate::ReactiveCell::transform)
//! (or [`DuplexCell::transform_duplex`](crate::DuplexCell::transform_duplex))
//! and composed left to right with `then` or the [`chain!`](crate::chain)
//! macro:
//!
//! ```text
//! source ──► map ──► unique ──► debounce ──► result
//! ```
//!
//! # Modules
//!
//! - `operators`: synchronous value operators (map, filter, unique, reduce, ...)
//! - `timing`: debounce, delay, throttle and buffer on the timer queue
//! - `gate`: the critical section
//! - `fork`: conditional branching
//! - `duplex`: stage pairs for bidirectional cells

pub mod duplex;
pub mod fork;
pub mod gate;
pub mod operators;
mod stage;
pub mod timing;

pub use duplex::{duplex_filter, duplex_map, duplex_tap, duplex_unique, DuplexStage};
pub use fork::{fork, fork_inline};
pub use gate::critical_section;
pub use operators::{diff, filter, lock, map, pick, reduce, tap, unique, Delta};
pub use stage::Stage;
pub use timing::{buffer, debounce, delay, throttle};
