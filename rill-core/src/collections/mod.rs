//! Reactive Collections
//!
//! Collections notify with structural change records instead of whole
//! values:
//! - `ReactiveSequence`: ordered, emits [`SequenceChange`]
//! - `ReactiveMap`: keyed, emits [`MapChange`]
//! - `ReactiveSet`: membership, emits [`SetChange`]
//!
//! Each mutating call emits at most one record, so downstream consumers see
//! a total order of atomic edits.

mod change;
mod map;
mod sequence;
mod set;
mod views;

pub use change::{merge_plan, MergeStep, Operation, OperationDetail, SequenceChange};
pub use map::{MapChange, ReactiveMap};
pub use sequence::ReactiveSequence;
pub use set::{ReactiveSet, SetChange};
