//! Reactive Cell Implementation
//!
//! A `ReactiveCell` is the fundamental reactive primitive. It holds a single
//! value and notifies its subscribers every time that value is replaced.
//!
//! # How Cells Work
//!
//! 1. `update` stores the new value and fires the backing
//!    [`EventChannel`] synchronously, in subscription order.
//!
//! 2. Every accepted update fires, even if the value did not change.
//!    Operators that want change detection (`unique`) add it themselves.
//!
//! 3. While a cell is notifying its subscribers it is `Propagating`. Updating
//!    it again from inside one of those subscribers fails with
//!    [`ReactiveError::ReentrantUpdate`](crate::error::ReactiveError).
//!
//! # Memory Layout
//!
//! Each cell consists of:
//! - A unique ID (8 bytes)
//! - The value, absent until the first update for cells created `unset`
//! - The backing event channel
//! - A propagation fence (one byte of state)

use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::{Rc, Weak};

use super::channel::EventChannel;
use super::propagation::{PropagationFence, PropagationState};
use super::subscriber::{SubscriberId, Subscription};
use crate::error::{fail_fast, Result};
use crate::graph::{ChangeSource, NodeId, NodeKind};
use crate::lifetime::LifetimeToken;
use crate::pipeline::Stage;

struct CellInner<T: 'static> {
    id: NodeId,
    value: RefCell<Option<T>>,
    channel: EventChannel<T>,
    fence: PropagationFence,
}

/// A reactive value of type `T`.
///
/// Cloning a cell shares it: both handles see the same value and the same
/// subscribers.
///
/// # Example
///
/// ```rust,ignore
/// let count = ReactiveCell::new(0);
/// count.listen(|v| println!("count is {v}"), None)?;
///
/// count.update(5)?; // prints "count is 5"
/// ```
pub struct ReactiveCell<T: 'static> {
    inner: Rc<CellInner<T>>,
}

/// Non-owning handle to a [`ReactiveCell`].
pub struct WeakCell<T: 'static> {
    inner: Weak<CellInner<T>>,
}

impl<T: 'static> WeakCell<T> {
    pub fn upgrade(&self) -> Option<ReactiveCell<T>> {
        self.inner.upgrade().map(|inner| ReactiveCell { inner })
    }
}

impl<T: 'static> Clone for WeakCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<T: 'static> ReactiveCell<T> {
    /// Create a new cell holding `value`.
    pub fn new(value: T) -> Self {
        Self::with_slot(Some(value))
    }

    /// Create a cell with no value yet.
    pub fn unset() -> Self {
        Self::with_slot(None)
    }

    fn with_slot(value: Option<T>) -> Self {
        Self {
            inner: Rc::new(CellInner {
                id: NodeId::new(),
                value: RefCell::new(value),
                channel: EventChannel::new(),
                fence: PropagationFence::new(),
            }),
        }
    }

    /// Get the cell's unique ID.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    pub fn propagation_state(&self) -> PropagationState {
        self.inner.fence.state()
    }

    /// True once the cell holds a value.
    pub fn is_set(&self) -> bool {
        self.inner.value.borrow().is_some()
    }

    /// Read the current value without cloning it.
    pub fn with_value<R>(&self, read: impl FnOnce(Option<&T>) -> R) -> R {
        read(self.inner.value.borrow().as_ref())
    }

    /// Subscribe to every future update.
    pub fn listen<F>(&self, callback: F, token: Option<&LifetimeToken>) -> Result<Subscription>
    where
        F: Fn(&T) + 'static,
    {
        self.inner.channel.subscribe(callback, token)
    }

    /// Subscribe to the next update only.
    pub fn listen_once<F>(&self, callback: F, token: Option<&LifetimeToken>) -> Result<Subscription>
    where
        F: Fn(&T) + 'static,
    {
        self.inner.channel.subscribe_once(callback, token)
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.channel.subscriber_count()
    }

    pub fn downgrade(&self) -> WeakCell<T> {
        WeakCell {
            inner: Rc::downgrade(&self.inner),
        }
    }
}

impl<T: Clone + 'static> ReactiveCell<T> {
    /// Get a clone of the current value.
    pub fn value(&self) -> Option<T> {
        self.inner.value.borrow().clone()
    }

    /// Replace the value and notify every subscriber.
    pub fn update(&self, value: T) -> Result<()> {
        self.commit(value, None)
    }

    /// Replace the value and notify every subscriber except `excluded`.
    ///
    /// Used to push a value into a cell without echoing it back to the
    /// subscriber it came from.
    pub fn update_excluding(&self, value: T, excluded: SubscriberId) -> Result<()> {
        self.commit(value, Some(excluded))
    }

    fn commit(&self, value: T, excluded: Option<SubscriberId>) -> Result<()> {
        let _guard = self.inner.fence.enter(self.inner.id)?;

        let snapshot = value.clone();
        *self.inner.value.borrow_mut() = Some(value);

        match excluded {
            Some(excluded) => self.inner.channel.fire_excluding(&snapshot, excluded),
            None => self.inner.channel.fire(&snapshot),
        }
        Ok(())
    }

    /// Update from inside a listener, where there is no caller to hand an
    /// error back to.
    pub(crate) fn forward(&self, value: T) {
        if let Err(err) = self.update(value) {
            fail_fast(err);
        }
    }

    pub(crate) fn forward_excluding(&self, value: T, excluded: Option<SubscriberId>) {
        if let Err(err) = self.commit(value, excluded) {
            fail_fast(err);
        }
    }

    /// Call `callback` with the current value (if any), then subscribe.
    pub fn listen_and_repeat<F>(
        &self,
        callback: F,
        token: Option<&LifetimeToken>,
    ) -> Result<Subscription>
    where
        F: Fn(&T) + 'static,
    {
        if let Some(token) = token {
            token.ensure_live()?;
        }
        if let Some(current) = self.value() {
            callback(&current);
        }
        self.listen(callback, token)
    }

    /// Thread this cell through a stage chain and return the final cell.
    ///
    /// All intermediate subscriptions are registered on `token`; cancelling
    /// it tears the whole chain down.
    pub fn transform<U: 'static>(
        &self,
        stage: Stage<T, U>,
        token: Option<&LifetimeToken>,
    ) -> Result<ReactiveCell<U>> {
        let scope = token.cloned().unwrap_or_default();
        scope.ensure_live()?;
        tracing::trace!(source = %self.id(), stage = %stage.name(), "building transform");
        stage.apply(self, &scope)
    }

    /// Forward every update of this cell into `target`.
    pub fn pipe(&self, target: &ReactiveCell<T>, token: Option<&LifetimeToken>) -> Result<Subscription> {
        let target = target.clone();
        self.listen(move |value| target.forward(value.clone()), token)
    }

    /// Derive a cell from this cell and `others`.
    ///
    /// The result is recomputed whenever any input fires, and seeded right
    /// away when every input already holds a value. While some input is
    /// still unset the combinator is not called.
    pub fn aggregate<U, F>(
        &self,
        others: &[ReactiveCell<T>],
        combinator: F,
        token: Option<&LifetimeToken>,
    ) -> Result<ReactiveCell<U>>
    where
        U: Clone + 'static,
        F: Fn(&[T]) -> U + 'static,
    {
        let inputs: Rc<Vec<WeakCell<T>>> = Rc::new(
            std::iter::once(self)
                .chain(others.iter())
                .map(ReactiveCell::downgrade)
                .collect(),
        );
        let combinator = Rc::new(combinator);

        let output = match snapshot(&inputs) {
            Some(values) => ReactiveCell::new(combinator(&values)),
            None => ReactiveCell::unset(),
        };

        for input in std::iter::once(self).chain(others.iter()) {
            let inputs = inputs.clone();
            let combinator = combinator.clone();
            let target = output.clone();
            input.listen(
                move |_| {
                    if let Some(values) = snapshot(&inputs) {
                        target.forward(combinator(&values));
                    }
                },
                token,
            )?;
        }

        Ok(output)
    }

    /// Derive a cell from this cell and a cell of a different type.
    pub fn combine<U, R, F>(
        &self,
        other: &ReactiveCell<U>,
        combinator: F,
        token: Option<&LifetimeToken>,
    ) -> Result<ReactiveCell<R>>
    where
        U: Clone + 'static,
        R: Clone + 'static,
        F: Fn(&T, &U) -> R + 'static,
    {
        let left = self.downgrade();
        let right = other.downgrade();
        let combinator = Rc::new(combinator);

        let compute = {
            let combinator = combinator.clone();
            move |left: &WeakCell<T>, right: &WeakCell<U>| -> Option<R> {
                let left = left.upgrade()?.value()?;
                let right = right.upgrade()?.value()?;
                Some(combinator(&left, &right))
            }
        };
        let compute = Rc::new(compute);

        let output = match compute(&left, &right) {
            Some(seed) => ReactiveCell::new(seed),
            None => ReactiveCell::unset(),
        };

        {
            let (compute, target) = (compute.clone(), output.clone());
            let (l, r) = (left.clone(), right.clone());
            self.listen(
                move |_| {
                    if let Some(value) = compute(&l, &r) {
                        target.forward(value);
                    }
                },
                token,
            )?;
        }
        {
            let target = output.clone();
            other.listen(
                move |_| {
                    if let Some(value) = compute(&left, &right) {
                        target.forward(value);
                    }
                },
                token,
            )?;
        }

        Ok(output)
    }

    /// A cell that fires whenever any of `sources` fires, with that value.
    pub fn merge_sources(
        sources: &[ReactiveCell<T>],
        token: Option<&LifetimeToken>,
    ) -> Result<ReactiveCell<T>> {
        let output = ReactiveCell::unset();
        for source in sources {
            source.pipe(&output, token)?;
        }
        Ok(output)
    }
}

fn snapshot<T: Clone + 'static>(cells: &[WeakCell<T>]) -> Option<Vec<T>> {
    cells
        .iter()
        .map(|cell| cell.upgrade().and_then(|cell| cell.value()))
        .collect()
}

impl<T: 'static> Clone for ReactiveCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Default + 'static> Default for ReactiveCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: 'static> ChangeSource for ReactiveCell<T> {
    fn node_id(&self) -> NodeId {
        self.id()
    }

    fn node_kind(&self) -> NodeKind {
        NodeKind::Cell
    }

    fn on_change(
        &self,
        callback: Rc<dyn Fn()>,
        token: Option<&LifetimeToken>,
    ) -> Result<Subscription> {
        self.listen(move |_| callback(), token)
    }
}

impl<T: Debug + 'static> Debug for ReactiveCell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactiveCell")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.value.borrow())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReactiveError;
    use std::cell::Cell;

    fn record<T: Clone + 'static>(cell: &ReactiveCell<T>) -> Rc<RefCell<Vec<T>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        cell.listen(move |v| sink.borrow_mut().push(v.clone()), None)
            .unwrap();
        log
    }

    #[test]
    fn cell_get_and_update() {
        let cell = ReactiveCell::new(0);
        assert_eq!(cell.value(), Some(0));

        cell.update(42).unwrap();
        assert_eq!(cell.value(), Some(42));
    }

    #[test]
    fn unset_cell_has_no_value_until_updated() {
        let cell: ReactiveCell<String> = ReactiveCell::unset();
        assert!(!cell.is_set());
        assert_eq!(cell.value(), None);

        cell.update("ready".into()).unwrap();
        assert!(cell.with_value(|v| v.map(String::len)) == Some(5));
    }

    #[test]
    fn every_update_fires_even_when_equal() {
        let cell = ReactiveCell::new(1);
        let log = record(&cell);

        cell.update(1).unwrap();
        cell.update(1).unwrap();
        assert_eq!(*log.borrow(), vec![1, 1]);
    }

    #[test]
    fn update_from_own_listener_is_rejected() {
        let cell = ReactiveCell::new(0);
        let outcome: Rc<RefCell<Option<Result<()>>>> = Rc::new(RefCell::new(None));

        let (inner, slot) = (cell.clone(), outcome.clone());
        cell.listen(
            move |v| {
                *slot.borrow_mut() = Some(inner.update(v + 1));
            },
            None,
        )
        .unwrap();

        cell.update(1).unwrap();

        assert_eq!(
            outcome.borrow_mut().take(),
            Some(Err(ReactiveError::ReentrantUpdate { node: cell.id() }))
        );
        assert_eq!(cell.value(), Some(1));
        assert_eq!(cell.propagation_state(), PropagationState::Idle);
    }

    #[test]
    fn update_excluding_skips_origin() {
        let cell = ReactiveCell::new(0);
        let seen = Rc::new(Cell::new(0));
        let counter = seen.clone();
        let origin = cell.listen(move |_| counter.set(counter.get() + 1), None).unwrap();
        let log = record(&cell);

        cell.update_excluding(3, origin.id()).unwrap();
        assert_eq!(seen.get(), 0);
        assert_eq!(*log.borrow(), vec![3]);
    }

    #[test]
    fn listen_and_repeat_replays_current_value() {
        let cell = ReactiveCell::new(7);
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        cell.listen_and_repeat(move |v| sink.borrow_mut().push(*v), None)
            .unwrap();

        cell.update(8).unwrap();
        assert_eq!(*log.borrow(), vec![7, 8]);
    }

    #[test]
    fn listen_once_fires_once() {
        let cell = ReactiveCell::new(0);
        let hits = Rc::new(Cell::new(0));
        let counter = hits.clone();
        cell.listen_once(move |_| counter.set(counter.get() + 1), None)
            .unwrap();

        cell.update(1).unwrap();
        cell.update(2).unwrap();
        assert_eq!(hits.get(), 1);
        assert_eq!(cell.subscriber_count(), 0);
    }

    #[test]
    fn token_cancellation_stops_listening() {
        let cell = ReactiveCell::new(0);
        let token = LifetimeToken::new();
        let hits = Rc::new(Cell::new(0));
        let counter = hits.clone();
        cell.listen(move |_| counter.set(counter.get() + 1), Some(&token))
            .unwrap();

        cell.update(1).unwrap();
        token.cancel();
        cell.update(2).unwrap();

        assert_eq!(hits.get(), 1);
        assert!(cell.listen(|_| {}, Some(&token)).is_err());
    }

    #[test]
    fn pipe_forwards_one_way() {
        let source = ReactiveCell::new(0);
        let target = ReactiveCell::unset();
        source.pipe(&target, None).unwrap();

        source.update(5).unwrap();
        assert_eq!(target.value(), Some(5));

        target.update(9).unwrap();
        assert_eq!(source.value(), Some(5));
    }

    #[test]
    fn aggregate_seeds_and_recomputes_on_any_input() {
        let a = ReactiveCell::new(1);
        let b = ReactiveCell::new(2);
        let c = ReactiveCell::new(3);
        let sum = a.aggregate(&[b.clone(), c.clone()], |v| v.iter().sum::<i32>(), None)
            .unwrap();

        assert_eq!(sum.value(), Some(6));
        b.update(20).unwrap();
        assert_eq!(sum.value(), Some(24));
        c.update(0).unwrap();
        assert_eq!(sum.value(), Some(21));
    }

    #[test]
    fn aggregate_waits_for_unset_inputs() {
        let a = ReactiveCell::new(1);
        let b: ReactiveCell<i32> = ReactiveCell::unset();
        let product = a.aggregate(&[b.clone()], |v| v[0] * v[1], None).unwrap();

        assert!(!product.is_set());
        a.update(4).unwrap();
        assert!(!product.is_set());
        b.update(5).unwrap();
        assert_eq!(product.value(), Some(20));
    }

    #[test]
    fn combine_mixes_types() {
        let name = ReactiveCell::new("item".to_string());
        let count = ReactiveCell::new(2usize);
        let label = name
            .combine(&count, |n, c| format!("{c} x {n}"), None)
            .unwrap();

        assert_eq!(label.value().as_deref(), Some("2 x item"));
        count.update(3).unwrap();
        assert_eq!(label.value().as_deref(), Some("3 x item"));
    }

    #[test]
    fn merge_sources_follows_latest() {
        let a = ReactiveCell::new(0);
        let b = ReactiveCell::new(0);
        let merged = ReactiveCell::merge_sources(&[a.clone(), b.clone()], None).unwrap();
        let log = record(&merged);

        a.update(1).unwrap();
        b.update(2).unwrap();
        a.update(3).unwrap();
        assert_eq!(*log.borrow(), vec![1, 2, 3]);
    }

    #[test]
    fn cell_clone_shares_state() {
        let cell1 = ReactiveCell::new(0);
        let cell2 = cell1.clone();

        cell1.update(42).unwrap();
        assert_eq!(cell2.value(), Some(42));
        assert_eq!(cell1.id(), cell2.id());
    }
}
