//! Structural change records.
//!
//! A [`ReactiveSequence`](super::ReactiveSequence) never announces "the
//! whole list changed". Every mutating call emits exactly one
//! [`SequenceChange`] describing the edit, so consumers patch their own
//! copy instead of rebuilding it.

use std::rc::Rc;

use serde::{Deserialize, Serialize};

/// Coarse classification of an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    Add,
    Remove,
    Replace,
    Swap,
    Merge,
}

/// Exact kind of an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationDetail {
    /// Items added at the end.
    Append,
    /// Items added at the front.
    Prepend,
    /// Items added at `index`.
    Insert,
    /// Items removed from the front.
    RemoveLeft,
    /// Items removed from the end; `index` is the new length.
    RemoveRight,
    /// `count` items removed starting at `index`.
    Remove,
    /// Every item removed.
    Clear,
    /// The item at `index` replaced; `target` holds the old item.
    Replace,
    /// The items at `index` and `index2` exchanged.
    Swap,
    /// The whole sequence reconciled to `items`.
    Merge,
}

impl OperationDetail {
    pub fn operation(self) -> Operation {
        match self {
            Self::Append | Self::Prepend | Self::Insert => Operation::Add,
            Self::RemoveLeft | Self::RemoveRight | Self::Remove | Self::Clear => Operation::Remove,
            Self::Replace => Operation::Replace,
            Self::Swap => Operation::Swap,
            Self::Merge => Operation::Merge,
        }
    }
}

/// One edit to a sequence, with the state before and after it.
///
/// The state snapshots are shared with the sequence and with neighbouring
/// records, so cloning a record does not copy them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceChange<T> {
    pub operation: Operation,
    pub operation_detailed: OperationDetail,
    pub index: usize,
    pub index2: Option<usize>,
    pub count: usize,
    /// Added, removed or replacing items, or for `Swap` the two items in
    /// their pre-swap order.
    pub items: Vec<T>,
    pub target: Option<T>,
    pub previous_state: Rc<Vec<T>>,
    pub new_state: Rc<Vec<T>>,
}

impl<T: Clone> SequenceChange<T> {
    /// The record a late subscriber receives in place of the history: all
    /// current items appended to an empty sequence.
    pub fn replay(state: &[T]) -> Self {
        Self {
            operation: Operation::Add,
            operation_detailed: OperationDetail::Append,
            index: 0,
            index2: None,
            count: state.len(),
            items: state.to_vec(),
            target: None,
            previous_state: Rc::default(),
            new_state: Rc::new(state.to_vec()),
        }
    }
}

/// A change record before the surrounding states are attached.
pub(crate) struct Edit<T> {
    detail: OperationDetail,
    index: usize,
    index2: Option<usize>,
    items: Vec<T>,
    target: Option<T>,
}

impl<T> Edit<T> {
    pub(crate) fn new(detail: OperationDetail, index: usize, items: Vec<T>) -> Self {
        Self {
            detail,
            index,
            index2: None,
            items,
            target: None,
        }
    }

    pub(crate) fn with_target(mut self, target: T) -> Self {
        self.target = Some(target);
        self
    }

    pub(crate) fn with_index2(mut self, index2: usize) -> Self {
        self.index2 = Some(index2);
        self
    }

    pub(crate) fn finish(
        self,
        previous_state: Rc<Vec<T>>,
        new_state: Rc<Vec<T>>,
    ) -> SequenceChange<T> {
        SequenceChange {
            operation: self.detail.operation(),
            operation_detailed: self.detail,
            index: self.index,
            index2: self.index2,
            count: self.items.len(),
            items: self.items,
            target: self.target,
            previous_state,
            new_state,
        }
    }
}

/// One step of reconciling a sequence to a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeStep<T> {
    Replace { index: usize, item: T },
    Append { items: Vec<T> },
    Trim { count: usize },
}

/// Index-by-index diff of `current` against `target`.
///
/// Positions present in both are replaced where they differ, then the
/// remainder is appended or trimmed. Every index produced is inside the
/// shorter of the two slices.
pub fn merge_plan<T: Clone + PartialEq>(current: &[T], target: &[T]) -> Vec<MergeStep<T>> {
    let mut steps: Vec<MergeStep<T>> = current
        .iter()
        .zip(target)
        .enumerate()
        .filter(|(_, (have, want))| have != want)
        .map(|(index, (_, want))| MergeStep::Replace {
            index,
            item: want.clone(),
        })
        .collect();

    if target.len() > current.len() {
        steps.push(MergeStep::Append {
            items: target[current.len()..].to_vec(),
        });
    } else if current.len() > target.len() {
        steps.push(MergeStep::Trim {
            count: current.len() - target.len(),
        });
    }
    steps
}
