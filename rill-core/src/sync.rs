//! Remote Sync Records
//!
//! The wire form of a sequence change. A [`SyncRecord`] keeps only what a
//! remote replica needs to patch its copy (`operationDetailed`, `index`,
//! `count`, `items`, `target`, `index2`); the full before/after states stay
//! local. A new replica is primed with one synthetic merge record carrying
//! the whole current state.
//!
//! Records encode as JSON (`serde_json`) or MessagePack (`rmp-serde`).
//! Transport is out of scope: [`replicate`] hands records to a callback.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::collections::{OperationDetail, ReactiveSequence, SequenceChange};
use crate::error::{ReactiveError, Result, SyncError};
use crate::lifetime::LifetimeToken;
use crate::reactive::Subscription;

/// A sequence change stripped down for transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRecord<T> {
    pub operation_detailed: OperationDetail,
    pub index: usize,
    pub count: usize,
    pub items: Vec<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index2: Option<usize>,
}

impl<T: Clone> From<&SequenceChange<T>> for SyncRecord<T> {
    fn from(change: &SequenceChange<T>) -> Self {
        Self {
            operation_detailed: change.operation_detailed,
            index: change.index,
            count: change.count,
            items: change.items.clone(),
            target: change.target.clone(),
            index2: change.index2,
        }
    }
}

impl<T: Clone> SyncRecord<T> {
    /// The record that brings an empty replica up to `state`.
    pub fn snapshot(state: &[T]) -> Self {
        Self {
            operation_detailed: OperationDetail::Merge,
            index: 0,
            count: state.len(),
            items: state.to_vec(),
            target: None,
            index2: None,
        }
    }

    /// Patch `sink` with this record.
    pub fn apply<S: ChangeSink<T> + ?Sized>(&self, sink: &mut S) -> Result<()> {
        match self.operation_detailed {
            OperationDetail::Append | OperationDetail::Prepend | OperationDetail::Insert => {
                sink.insert(self.index, self.items.clone())
            }
            OperationDetail::RemoveLeft
            | OperationDetail::RemoveRight
            | OperationDetail::Remove
            | OperationDetail::Clear => sink.remove(self.index, self.count),
            OperationDetail::Replace => {
                let item = self.items.first().cloned().ok_or_else(|| {
                    ReactiveError::IllegalTopology("replace record without an item".into())
                })?;
                sink.replace(self.index, item)
            }
            OperationDetail::Swap => {
                let other = self.index2.ok_or_else(|| {
                    ReactiveError::IllegalTopology("swap record without index2".into())
                })?;
                sink.swap(self.index, other)
            }
            OperationDetail::Merge => sink.merge(self.items.clone()),
        }
    }
}

impl<T: Serialize> SyncRecord<T> {
    pub fn to_json(&self) -> Result<String, SyncError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_msgpack(&self) -> Result<Vec<u8>, SyncError> {
        Ok(rmp_serde::to_vec_named(self)?)
    }
}

impl<T: DeserializeOwned> SyncRecord<T> {
    pub fn from_json(json: &str) -> Result<Self, SyncError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, SyncError> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

/// Anything that can replay structural edits.
///
/// A consumer that cannot express a reconciliation keeps the default
/// `merge`, which fails with [`ReactiveError::UnsupportedOperation`].
pub trait ChangeSink<T> {
    fn insert(&mut self, index: usize, items: Vec<T>) -> Result<()>;

    fn remove(&mut self, index: usize, count: usize) -> Result<()>;

    fn replace(&mut self, index: usize, item: T) -> Result<()>;

    fn swap(&mut self, i: usize, j: usize) -> Result<()>;

    fn merge(&mut self, items: Vec<T>) -> Result<()> {
        let _ = items;
        Err(ReactiveError::UnsupportedOperation { operation: "merge" })
    }
}

impl<T> ChangeSink<T> for Vec<T> {
    fn insert(&mut self, index: usize, items: Vec<T>) -> Result<()> {
        if index > self.len() {
            return Err(ReactiveError::IndexOutOfBounds {
                index,
                len: self.len(),
            });
        }
        self.splice(index..index, items);
        Ok(())
    }

    fn remove(&mut self, index: usize, count: usize) -> Result<()> {
        let len = self.len();
        let end = match index.checked_add(count) {
            Some(end) if end <= len => end,
            Some(end) => return Err(ReactiveError::IndexOutOfBounds { index: end, len }),
            None => return Err(ReactiveError::IndexOutOfBounds { index, len }),
        };
        self.drain(index..end);
        Ok(())
    }

    fn replace(&mut self, index: usize, item: T) -> Result<()> {
        let len = self.len();
        let slot = self
            .get_mut(index)
            .ok_or(ReactiveError::IndexOutOfBounds { index, len })?;
        *slot = item;
        Ok(())
    }

    fn swap(&mut self, i: usize, j: usize) -> Result<()> {
        let len = self.len();
        if let Some(index) = [i, j].into_iter().find(|&index| index >= len) {
            return Err(ReactiveError::IndexOutOfBounds { index, len });
        }
        <[T]>::swap(self, i, j);
        Ok(())
    }

    fn merge(&mut self, items: Vec<T>) -> Result<()> {
        *self = items;
        Ok(())
    }
}

impl<T: Clone + PartialEq + 'static> ChangeSink<T> for ReactiveSequence<T> {
    fn insert(&mut self, index: usize, items: Vec<T>) -> Result<()> {
        self.insert_all_at(index, items)
    }

    fn remove(&mut self, index: usize, count: usize) -> Result<()> {
        let end = index.checked_add(count).ok_or(ReactiveError::IndexOutOfBounds {
            index,
            len: self.len(),
        })?;
        self.remove_range(index, end).map(|_| ())
    }

    fn replace(&mut self, index: usize, item: T) -> Result<()> {
        self.set(index, item).map(|_| ())
    }

    fn swap(&mut self, i: usize, j: usize) -> Result<()> {
        ReactiveSequence::swap(self, i, j)
    }

    fn merge(&mut self, items: Vec<T>) -> Result<()> {
        ReactiveSequence::merge(self, items)
    }
}

/// Send the current state of `sequence`, then every change, to `send`.
pub fn replicate<T, F>(
    sequence: &ReactiveSequence<T>,
    send: F,
    token: Option<&LifetimeToken>,
) -> Result<Subscription>
where
    T: Clone + 'static,
    F: Fn(SyncRecord<T>) + 'static,
{
    if let Some(token) = token {
        token.ensure_live()?;
    }
    send(sequence.with(SyncRecord::snapshot));
    sequence.listen(move |change| send(SyncRecord::from(change)), token)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
