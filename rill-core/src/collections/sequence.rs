//! Reactive Sequence
//!
//! An ordered, index-addressable collection. Every mutating call takes the
//! node's propagation fence, applies the edit, and emits exactly one
//! [`SequenceChange`] whose `new_state` matches the sequence afterwards.
//! Calls that turn out not to change anything (popping an empty sequence,
//! merging an identical target) emit nothing.

use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;

use super::change::{merge_plan, Edit, MergeStep, OperationDetail, SequenceChange};
use crate::error::{ReactiveError, Result};
use crate::graph::{ChangeSource, NodeId, NodeKind};
use crate::lifetime::LifetimeToken;
use crate::reactive::{EventChannel, PropagationFence, ReactiveCell, Subscription};

struct SequenceInner<T: 'static> {
    id: NodeId,
    /// Copy-on-write; change records hold earlier versions.
    items: RefCell<Rc<Vec<T>>>,
    channel: EventChannel<SequenceChange<T>>,
    fence: PropagationFence,
}

/// An ordered reactive collection.
pub struct ReactiveSequence<T: 'static> {
    inner: Rc<SequenceInner<T>>,
}

impl<T: Clone + 'static> ReactiveSequence<T> {
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    pub fn from_vec(items: Vec<T>) -> Self {
        Self {
            inner: Rc::new(SequenceInner {
                id: NodeId::new(),
                items: RefCell::new(Rc::new(items)),
                channel: EventChannel::new(),
                fence: PropagationFence::new(),
            }),
        }
    }

    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    pub fn len(&self) -> usize {
        self.inner.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<T> {
        self.inner.items.borrow().get(index).cloned()
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.inner.items.borrow().to_vec()
    }

    /// Read the items without cloning them.
    pub fn with<R>(&self, read: impl FnOnce(&[T]) -> R) -> R {
        read(&self.inner.items.borrow())
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.channel.subscriber_count()
    }

    /// Apply one edit under the fence and broadcast its record.
    ///
    /// `mutate` must validate before touching the items; returning
    /// `Ok(None)` means nothing changed and nothing is emitted.
    fn edit<F>(&self, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut Vec<T>) -> Result<Option<Edit<T>>>,
    {
        let _guard = self.inner.fence.enter(self.inner.id)?;

        let change = {
            let mut items = self.inner.items.borrow_mut();
            let previous_state = Rc::clone(&items);
            match mutate(Rc::make_mut(&mut items))? {
                Some(edit) => edit.finish(previous_state, Rc::clone(&items)),
                None => return Ok(()),
            }
        };

        tracing::trace!(
            node = %self.inner.id,
            operation = ?change.operation_detailed,
            index = change.index,
            count = change.count,
            "sequence change"
        );
        self.inner.channel.fire(&change);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Adding
    // ------------------------------------------------------------------------

    pub fn push(&self, item: T) -> Result<()> {
        self.push_all(vec![item])
    }

    /// Append several items as one edit.
    pub fn push_all(&self, items: impl IntoIterator<Item = T>) -> Result<()> {
        let items: Vec<T> = items.into_iter().collect();
        self.edit(|state| {
            if items.is_empty() {
                return Ok(None);
            }
            let index = state.len();
            state.extend(items.iter().cloned());
            Ok(Some(Edit::new(OperationDetail::Append, index, items)))
        })
    }

    pub fn unshift(&self, item: T) -> Result<()> {
        self.unshift_all(vec![item])
    }

    /// Prepend several items, keeping their order.
    pub fn unshift_all(&self, items: impl IntoIterator<Item = T>) -> Result<()> {
        let items: Vec<T> = items.into_iter().collect();
        self.edit(|state| {
            if items.is_empty() {
                return Ok(None);
            }
            state.splice(0..0, items.iter().cloned());
            Ok(Some(Edit::new(OperationDetail::Prepend, 0, items)))
        })
    }

    pub fn insert_at(&self, index: usize, item: T) -> Result<()> {
        self.insert_all_at(index, vec![item])
    }

    /// Insert several items before `index`. `index == len` appends.
    pub fn insert_all_at(&self, index: usize, items: impl IntoIterator<Item = T>) -> Result<()> {
        let items: Vec<T> = items.into_iter().collect();
        self.edit(|state| {
            if index > state.len() {
                return Err(ReactiveError::IndexOutOfBounds {
                    index,
                    len: state.len(),
                });
            }
            if items.is_empty() {
                return Ok(None);
            }
            state.splice(index..index, items.iter().cloned());
            Ok(Some(Edit::new(OperationDetail::Insert, index, items)))
        })
    }

    // ------------------------------------------------------------------------
    // Removing
    // ------------------------------------------------------------------------

    /// Remove the last item.
    pub fn pop(&self) -> Result<Option<T>> {
        Ok(self.remove_right(self.len().min(1))?.pop())
    }

    /// Remove the first item.
    pub fn shift(&self) -> Result<Option<T>> {
        Ok(self.remove_left(self.len().min(1))?.pop())
    }

    /// Remove `count` items from the front.
    pub fn remove_left(&self, count: usize) -> Result<Vec<T>> {
        let mut removed = Vec::new();
        self.edit(|state| {
            if count > state.len() {
                return Err(ReactiveError::IndexOutOfBounds {
                    index: count,
                    len: state.len(),
                });
            }
            if count == 0 {
                return Ok(None);
            }
            removed = state.drain(..count).collect();
            Ok(Some(Edit::new(
                OperationDetail::RemoveLeft,
                0,
                removed.clone(),
            )))
        })?;
        Ok(removed)
    }

    /// Remove `count` items from the end.
    pub fn remove_right(&self, count: usize) -> Result<Vec<T>> {
        let mut removed = Vec::new();
        self.edit(|state| {
            if count > state.len() {
                return Err(ReactiveError::IndexOutOfBounds {
                    index: count,
                    len: state.len(),
                });
            }
            if count == 0 {
                return Ok(None);
            }
            let index = state.len() - count;
            removed = state.split_off(index);
            Ok(Some(Edit::new(
                OperationDetail::RemoveRight,
                index,
                removed.clone(),
            )))
        })?;
        Ok(removed)
    }

    /// Remove the item at `index`.
    pub fn remove_at(&self, index: usize) -> Result<T> {
        let out_of_bounds = || ReactiveError::IndexOutOfBounds {
            index,
            len: self.len(),
        };
        let end = index.checked_add(1).ok_or_else(out_of_bounds)?;
        let mut removed = self.remove_range(index, end)?;
        removed.pop().ok_or_else(out_of_bounds)
    }

    /// Remove the items in `start..end`.
    pub fn remove_range(&self, start: usize, end: usize) -> Result<Vec<T>> {
        let mut removed = Vec::new();
        self.edit(|state| {
            if start > end || end > state.len() {
                return Err(ReactiveError::IndexOutOfBounds {
                    index: end.max(start),
                    len: state.len(),
                });
            }
            if start == end {
                return Ok(None);
            }
            removed = state.drain(start..end).collect();
            Ok(Some(Edit::new(
                OperationDetail::Remove,
                start,
                removed.clone(),
            )))
        })?;
        Ok(removed)
    }

    // ------------------------------------------------------------------------
    // Editing
    // ------------------------------------------------------------------------

    /// Replace the item at `index`, returning the old one.
    pub fn set(&self, index: usize, item: T) -> Result<T> {
        let mut previous = None;
        self.edit(|state| {
            let len = state.len();
            let slot = state
                .get_mut(index)
                .ok_or(ReactiveError::IndexOutOfBounds { index, len })?;
            let old = std::mem::replace(slot, item.clone());
            previous = Some(old.clone());
            Ok(Some(
                Edit::new(OperationDetail::Replace, index, vec![item]).with_target(old),
            ))
        })?;
        previous.ok_or(ReactiveError::IndexOutOfBounds {
            index,
            len: self.len(),
        })
    }

    /// Exchange the items at `i` and `j`. Swapping an index with itself is
    /// not an edit.
    pub fn swap(&self, i: usize, j: usize) -> Result<()> {
        self.edit(|state| {
            let len = state.len();
            if let Some(index) = [i, j].into_iter().find(|&index| index >= len) {
                return Err(ReactiveError::IndexOutOfBounds { index, len });
            }
            if i == j {
                return Ok(None);
            }
            let items = vec![state[i].clone(), state[j].clone()];
            state.swap(i, j);
            Ok(Some(
                Edit::new(OperationDetail::Swap, i, items).with_index2(j),
            ))
        })
    }

    /// Empty the sequence.
    pub fn clear(&self) -> Result<()> {
        self.edit(|state| {
            if state.is_empty() {
                return Ok(None);
            }
            let removed = std::mem::take(state);
            Ok(Some(Edit::new(OperationDetail::Clear, 0, removed)))
        })
    }

    pub fn listen<F>(&self, callback: F, token: Option<&LifetimeToken>) -> Result<Subscription>
    where
        F: Fn(&SequenceChange<T>) + 'static,
    {
        self.inner.channel.subscribe(callback, token)
    }

    pub fn listen_once<F>(&self, callback: F, token: Option<&LifetimeToken>) -> Result<Subscription>
    where
        F: Fn(&SequenceChange<T>) + 'static,
    {
        self.inner.channel.subscribe_once(callback, token)
    }

    /// Deliver the current contents as one synthetic append, then subscribe.
    pub fn listen_and_repeat<F>(
        &self,
        callback: F,
        token: Option<&LifetimeToken>,
    ) -> Result<Subscription>
    where
        F: Fn(&SequenceChange<T>) + 'static,
    {
        if let Some(token) = token {
            token.ensure_live()?;
        }
        callback(&self.with(SequenceChange::replay));
        self.listen(callback, token)
    }

    /// The length as a cell.
    pub fn len_cell(&self, token: Option<&LifetimeToken>) -> Result<ReactiveCell<usize>> {
        let cell = ReactiveCell::new(self.len());
        let target = cell.clone();
        self.listen(move |change| target.forward(change.new_state.len()), token)?;
        Ok(cell)
    }
}

impl<T: Clone + PartialEq + 'static> ReactiveSequence<T> {
    pub fn contains(&self, item: &T) -> bool {
        self.inner.items.borrow().contains(item)
    }

    pub fn index_of(&self, item: &T) -> Option<usize> {
        self.inner.items.borrow().iter().position(|x| x == item)
    }

    /// Remove the first occurrence of `item`. A missing item is not an
    /// error; it returns `false` and emits nothing.
    pub fn remove(&self, item: &T) -> Result<bool> {
        match self.index_of(item) {
            Some(index) => self.remove_at(index).map(|_| true),
            None => Ok(false),
        }
    }

    /// Exchange two items by value.
    pub fn swap_items(&self, a: &T, b: &T) -> Result<()> {
        let (Some(i), Some(j)) = (self.index_of(a), self.index_of(b)) else {
            return Err(ReactiveError::IllegalTopology(
                "swap_items: item is not in the sequence".into(),
            ));
        };
        self.swap(i, j)
    }

    /// Reconcile the sequence to `target` as a single edit.
    ///
    /// See [`merge_plan`] for how the difference is computed.
    pub fn merge(&self, target: Vec<T>) -> Result<()> {
        self.edit(|state| {
            let plan = merge_plan(state, &target);
            if plan.is_empty() {
                return Ok(None);
            }
            for step in plan {
                match step {
                    MergeStep::Replace { index, item } => state[index] = item,
                    MergeStep::Append { items } => state.extend(items),
                    MergeStep::Trim { count } => state.truncate(state.len() - count),
                }
            }
            Ok(Some(Edit::new(OperationDetail::Merge, 0, target)))
        })
    }
}

impl<T: Clone + 'static> Default for ReactiveSequence<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + 'static> FromIterator<T> for ReactiveSequence<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from_vec(iter.into_iter().collect())
    }
}

impl<T: 'static> Clone for ReactiveSequence<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + 'static> ChangeSource for ReactiveSequence<T> {
    fn node_id(&self) -> NodeId {
        self.id()
    }

    fn node_kind(&self) -> NodeKind {
        NodeKind::Sequence
    }

    fn on_change(
        &self,
        callback: Rc<dyn Fn()>,
        token: Option<&LifetimeToken>,
    ) -> Result<Subscription> {
        self.listen(move |_| callback(), token)
    }
}

impl<T: Debug + 'static> Debug for ReactiveSequence<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactiveSequence")
            .field("id", &self.inner.id)
            .field("items", &*self.inner.items.borrow())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
