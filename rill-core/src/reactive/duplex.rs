//! Bidirectional Cells
//!
//! A `DuplexCell` carries values in two directions over one shared value:
//! downstream (producer to consumer) and upstream (consumer to producer).
//! This is the shape of a two-way binding, e.g. a model field bound to an
//! input widget.
//!
//! # Echo suppression
//!
//! Every write names the subscriber it came from, and that subscriber is
//! skipped when the value is broadcast. A binding that writes upstream does
//! not hear its own write come back downstream, so two bound parties never
//! oscillate.
//!
//! Upstream writes are re-broadcast downstream (minus the origin) so that
//! several consumers bound to the same cell stay in sync. A cell built with
//! [`DuplexCell::isolated`] keeps the two directions separate.

use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::{Rc, Weak};

use super::cell::ReactiveCell;
use super::channel::EventChannel;
use super::propagation::{PropagationFence, PropagationState};
use super::subscriber::{SubscriberId, Subscription};
use crate::error::{fail_fast, Result};
use crate::graph::{ChangeSource, NodeId, NodeKind};
use crate::lifetime::LifetimeToken;
use crate::pipeline::DuplexStage;

struct DuplexInner<T: 'static> {
    id: NodeId,
    value: RefCell<Option<T>>,
    downstream: EventChannel<T>,
    upstream: EventChannel<T>,
    fence: PropagationFence,
    propagate_writes_downstream: bool,
}

/// A two-channel reactive value.
pub struct DuplexCell<T: 'static> {
    inner: Rc<DuplexInner<T>>,
}

pub(crate) struct WeakDuplex<T: 'static> {
    inner: Weak<DuplexInner<T>>,
}

impl<T: 'static> WeakDuplex<T> {
    pub(crate) fn upgrade(&self) -> Option<DuplexCell<T>> {
        self.inner.upgrade().map(|inner| DuplexCell { inner })
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Direction {
    Downstream,
    Upstream,
}

impl<T: 'static> DuplexCell<T> {
    pub fn new(value: T) -> Self {
        Self::build(Some(value), true)
    }

    pub fn unset() -> Self {
        Self::build(None, true)
    }

    /// A cell whose upstream writes are not re-broadcast downstream.
    pub fn isolated(value: T) -> Self {
        Self::build(Some(value), false)
    }

    fn build(value: Option<T>, propagate_writes_downstream: bool) -> Self {
        Self {
            inner: Rc::new(DuplexInner {
                id: NodeId::new(),
                value: RefCell::new(value),
                downstream: EventChannel::new(),
                upstream: EventChannel::new(),
                fence: PropagationFence::new(),
                propagate_writes_downstream,
            }),
        }
    }

    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    pub fn propagation_state(&self) -> PropagationState {
        self.inner.fence.state()
    }

    pub fn is_set(&self) -> bool {
        self.inner.value.borrow().is_some()
    }

    /// Alias for [`listen_downstream`](Self::listen_downstream).
    pub fn listen<F>(&self, callback: F, token: Option<&LifetimeToken>) -> Result<Subscription>
    where
        F: Fn(&T) + 'static,
    {
        self.listen_downstream(callback, token)
    }

    pub fn listen_downstream<F>(
        &self,
        callback: F,
        token: Option<&LifetimeToken>,
    ) -> Result<Subscription>
    where
        F: Fn(&T) + 'static,
    {
        self.inner.downstream.subscribe(callback, token)
    }

    pub fn listen_upstream<F>(
        &self,
        callback: F,
        token: Option<&LifetimeToken>,
    ) -> Result<Subscription>
    where
        F: Fn(&T) + 'static,
    {
        self.inner.upstream.subscribe(callback, token)
    }

    pub fn downstream_subscriber_count(&self) -> usize {
        self.inner.downstream.subscriber_count()
    }

    pub fn upstream_subscriber_count(&self) -> usize {
        self.inner.upstream.subscriber_count()
    }

    pub(crate) fn downgrade(&self) -> WeakDuplex<T> {
        WeakDuplex {
            inner: Rc::downgrade(&self.inner),
        }
    }
}

impl<T: Clone + 'static> DuplexCell<T> {
    pub fn value(&self) -> Option<T> {
        self.inner.value.borrow().clone()
    }

    /// Push a value from the producer side.
    pub fn update_downstream(&self, value: T) -> Result<()> {
        self.commit(value, Direction::Downstream, None)
    }

    pub fn update_downstream_excluding(&self, value: T, excluded: SubscriberId) -> Result<()> {
        self.commit(value, Direction::Downstream, Some(excluded))
    }

    /// Push a value from the consumer side.
    pub fn update_upstream(&self, value: T) -> Result<()> {
        self.commit(value, Direction::Upstream, None)
    }

    /// Push a value from the consumer side without echoing it to `excluded`.
    pub fn update_upstream_excluding(&self, value: T, excluded: SubscriberId) -> Result<()> {
        self.commit(value, Direction::Upstream, Some(excluded))
    }

    fn commit(&self, value: T, direction: Direction, excluded: Option<SubscriberId>) -> Result<()> {
        let _guard = self.inner.fence.enter(self.inner.id)?;

        let snapshot = value.clone();
        *self.inner.value.borrow_mut() = Some(value);

        let broadcast = |channel: &EventChannel<T>| match excluded {
            Some(excluded) => channel.fire_excluding(&snapshot, excluded),
            None => channel.fire(&snapshot),
        };

        match direction {
            Direction::Downstream => broadcast(&self.inner.downstream),
            Direction::Upstream => {
                broadcast(&self.inner.upstream);
                if self.inner.propagate_writes_downstream {
                    broadcast(&self.inner.downstream);
                }
            }
        }
        Ok(())
    }

    pub(crate) fn forward_downstream(&self, value: T) {
        if let Err(err) = self.update_downstream(value) {
            fail_fast(err);
        }
    }

    pub(crate) fn forward_upstream_excluding(&self, value: T, excluded: SubscriberId) {
        if let Err(err) = self.update_upstream_excluding(value, excluded) {
            fail_fast(err);
        }
    }

    /// Call `callback` with the current value, then listen downstream.
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
        self.listen_downstream(callback, token)
    }

    /// A one-way cell following the downstream flow.
    pub fn to_cell(&self, token: Option<&LifetimeToken>) -> Result<ReactiveCell<T>> {
        let cell = match self.value() {
            Some(value) => ReactiveCell::new(value),
            None => ReactiveCell::unset(),
        };
        let target = cell.clone();
        self.listen_downstream(move |value| target.forward(value.clone()), token)?;
        Ok(cell)
    }

    /// Attach a two-way consumer.
    ///
    /// `callback` is called with the current value and every downstream
    /// value. Writes through the returned binding go upstream and are not
    /// echoed back to `callback`.
    pub fn bind<F>(&self, callback: F, token: Option<&LifetimeToken>) -> Result<DuplexBinding<T>>
    where
        F: Fn(&T) + 'static,
    {
        let subscription = self.listen_and_repeat(callback, token)?;
        Ok(DuplexBinding {
            cell: self.clone(),
            subscription,
        })
    }

    /// Thread this cell through a duplex stage chain.
    pub fn transform_duplex<U: 'static>(
        &self,
        stage: DuplexStage<T, U>,
        token: Option<&LifetimeToken>,
    ) -> Result<DuplexCell<U>> {
        let scope = token.cloned().unwrap_or_default();
        scope.ensure_live()?;
        tracing::trace!(source = %self.id(), stage = %stage.name(), "building duplex transform");
        stage.apply(self, &scope)
    }
}

/// A consumer attached with [`DuplexCell::bind`].
pub struct DuplexBinding<T: 'static> {
    cell: DuplexCell<T>,
    subscription: Subscription,
}

impl<T: Clone + 'static> DuplexBinding<T> {
    /// Write a value upstream on behalf of this binding.
    pub fn write(&self, value: T) -> Result<()> {
        self.cell
            .update_upstream_excluding(value, self.subscription.id())
    }

    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }

    /// Detach the binding's listener.
    pub fn cancel(&self) {
        self.subscription.cancel();
    }
}

impl<T: 'static> Clone for DuplexCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> ChangeSource for DuplexCell<T> {
    fn node_id(&self) -> NodeId {
        self.id()
    }

    fn node_kind(&self) -> NodeKind {
        NodeKind::Duplex
    }

    fn on_change(
        &self,
        callback: Rc<dyn Fn()>,
        token: Option<&LifetimeToken>,
    ) -> Result<Subscription> {
        self.listen_downstream(move |_| callback(), token)
    }
}

impl<T: Debug + 'static> Debug for DuplexCell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuplexCell")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.value.borrow())
            .field("downstream", &self.downstream_subscriber_count())
            .field("upstream", &self.upstream_subscriber_count())
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

    fn log_of(cell: &DuplexCell<i32>, upstream: bool) -> Rc<RefCell<Vec<i32>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        let record = move |v: &i32| sink.borrow_mut().push(*v);
        if upstream {
            cell.listen_upstream(record, None).unwrap();
        } else {
            cell.listen_downstream(record, None).unwrap();
        }
        log
    }

    #[test]
    fn downstream_writes_stay_downstream() {
        let cell = DuplexCell::new(0);
        let down = log_of(&cell, false);
        let up = log_of(&cell, true);

        cell.update_downstream(1).unwrap();
        assert_eq!(*down.borrow(), vec![1]);
        assert!(up.borrow().is_empty());
        assert_eq!(cell.value(), Some(1));
    }

    #[test]
    fn upstream_writes_reach_both_sides() {
        let cell = DuplexCell::new(0);
        let down = log_of(&cell, false);
        let up = log_of(&cell, true);

        cell.update_upstream(2).unwrap();
        assert_eq!(*up.borrow(), vec![2]);
        assert_eq!(*down.borrow(), vec![2]);
    }

    #[test]
    fn isolated_cell_keeps_directions_apart() {
        let cell = DuplexCell::isolated(0);
        let down = log_of(&cell, false);

        cell.update_upstream(2).unwrap();
        assert!(down.borrow().is_empty());
        assert_eq!(cell.value(), Some(2));
    }

    #[test]
    fn binding_does_not_hear_its_own_writes() {
        let cell = DuplexCell::new(0);
        let first = Rc::new(RefCell::new(Vec::new()));
        let second = Rc::new(RefCell::new(Vec::new()));

        let sink = first.clone();
        let a = cell.bind(move |v| sink.borrow_mut().push(*v), None).unwrap();
        let sink = second.clone();
        let _b = cell.bind(move |v| sink.borrow_mut().push(*v), None).unwrap();

        a.write(5).unwrap();
        assert_eq!(*first.borrow(), vec![0]);
        assert_eq!(*second.borrow(), vec![0, 5]);
    }

    #[test]
    fn upstream_write_from_upstream_listener_is_rejected() {
        let cell = DuplexCell::new(0);
        let failure = Rc::new(RefCell::new(None));

        let (inner, slot) = (cell.clone(), failure.clone());
        cell.listen_upstream(
            move |v| {
                *slot.borrow_mut() = inner.update_downstream(v + 1).err();
            },
            None,
        )
        .unwrap();

        cell.update_upstream(1).unwrap();
        assert_eq!(
            failure.borrow_mut().take(),
            Some(ReactiveError::ReentrantUpdate { node: cell.id() })
        );
    }

    #[test]
    fn to_cell_follows_downstream() {
        let duplex = DuplexCell::new(1);
        let token = LifetimeToken::new();
        let cell = duplex.to_cell(Some(&token)).unwrap();
        assert_eq!(cell.value(), Some(1));

        duplex.update_downstream(2).unwrap();
        assert_eq!(cell.value(), Some(2));

        token.cancel();
        duplex.update_downstream(3).unwrap();
        assert_eq!(cell.value(), Some(2));
    }
}
