//! Rill Core
//!
//! This crate provides the reactive dataflow core for the Rill UI framework.
//! It implements:
//!
//! - Reactive primitives (cells, bidirectional cells, streams)
//! - Reactive collections emitting structural change records
//! - Lifetime tokens and a cooperative timer queue
//! - Composable pipeline stages (map, filter, debounce, critical section, ...)
//!
//! Everything runs on one logical thread. Updates propagate synchronously:
//! when `update` returns, every subscriber has already seen the value.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `lifetime`: Lifetime tokens, timers and the tokio timer driver
//! - `reactive`: Event channels, cells, duplex cells and streams
//! - `collections`: Sequences (with sorted/filtered/mapped views), maps and sets
//! - `pipeline`: Stage definitions and the bundled operators
//! - `graph`: Node identity, the closed set of source kinds, the owner table,
//!   render values
//! - `sync`: Wire records for replicating sequences
//!
//! # Example
//!
//! ```rust
//! use rill_core::pipeline::{map, unique};
//! use rill_core::{chain, LifetimeToken, ReactiveCell};
//!
//! let scope = LifetimeToken::new();
//! let count = ReactiveCell::new(0);
//!
//! // Derive a cell that only fires when the parity changes
//! let parity = count
//!     .transform(chain!(map(|v: &i32| v % 2), unique()), Some(&scope))
//!     .unwrap();
//!
//! count.update(2).unwrap(); // parity stays 0, nothing fires
//! count.update(3).unwrap(); // parity fires 1
//! assert_eq!(parity.value(), Some(1));
//!
//! // Tear the whole chain down
//! scope.cancel();
//! ```

#[macro_use]
mod macros;

pub mod collections;
pub mod config;
pub mod error;
pub mod graph;
pub mod lifetime;
pub mod pipeline;
pub mod reactive;
pub mod sync;

pub use collections::{MapChange, ReactiveMap, ReactiveSequence, ReactiveSet, SequenceChange, SetChange};
pub use config::RuntimeConfig;
pub use error::{ReactiveError, Result};
pub use lifetime::LifetimeToken;
pub use pipeline::{DuplexStage, Stage};
pub use reactive::{DuplexCell, EventChannel, ReactiveCell, Stream, Subscription};
