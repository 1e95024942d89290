//! Event Channel
//!
//! The multi-subscriber notification primitive every cell is built on.
//!
//! # Reentrancy
//!
//! Firing walks the subscriber list up to the length it had when the fire
//! started, cloning each callback out before invoking it, so callbacks may
//! subscribe and unsubscribe freely:
//!
//! - subscribers added during a fire are not called by that fire;
//! - subscribers removed during a fire are skipped for the rest of it and
//!   physically dropped once the outermost fire completes.
//!
//! Fires may nest (a callback firing the same channel again); removal is
//! deferred until the outermost one returns.
//!
//! An owner that keeps channels in a lookup table can register an
//! [`EventChannel::on_drained`] hook to drop the entry once the last
//! subscriber is gone.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use super::subscriber::{Detach, SubscriberId, Subscription};
use crate::error::Result;
use crate::lifetime::LifetimeToken;

type Callback<T> = Rc<dyn Fn(&T)>;
type DrainedHook = Rc<dyn Fn()>;

struct Record<T> {
    id: SubscriberId,
    callback: Callback<T>,
    once: bool,
    removed: Cell<bool>,
}

struct ChannelInner<T> {
    records: RefCell<Vec<Record<T>>>,
    /// Depth of nested fires in progress.
    firing: Cell<usize>,
    compaction_due: Cell<bool>,
    drained: RefCell<Option<DrainedHook>>,
}

impl<T> ChannelInner<T> {
    fn compact(&self) {
        if self.firing.get() == 0 && self.compaction_due.replace(false) {
            self.records.borrow_mut().retain(|record| !record.removed.get());
            self.notify_if_drained();
        }
    }

    /// Runs the drained hook with no borrow held, so the hook may drop the
    /// owner's handle to this channel.
    fn notify_if_drained(&self) {
        if !self.records.borrow().is_empty() {
            return;
        }
        let hook = self.drained.borrow().clone();
        if let Some(hook) = hook {
            hook();
        }
    }
}

impl<T> Detach for ChannelInner<T> {
    fn detach(&self, id: SubscriberId) {
        if self.firing.get() > 0 {
            if let Some(record) = self.records.borrow().iter().find(|r| r.id == id) {
                record.removed.set(true);
                self.compaction_due.set(true);
            }
            return;
        }
        self.records.borrow_mut().retain(|record| record.id != id);
        self.notify_if_drained();
    }
}

/// Decrements the fire depth and compacts on the way out, even if a
/// callback panics.
struct FireGuard<'a, T> {
    inner: &'a ChannelInner<T>,
}

impl<T> Drop for FireGuard<'_, T> {
    fn drop(&mut self) {
        self.inner.firing.set(self.inner.firing.get() - 1);
        self.inner.compact();
    }
}

/// Ordered multi-subscriber pub/sub channel.
///
/// Subscribers are called synchronously, in subscription order.
pub struct EventChannel<T: 'static> {
    inner: Rc<ChannelInner<T>>,
}

impl<T: 'static> EventChannel<T> {
    /// Create a new channel with no subscribers.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(ChannelInner {
                records: RefCell::new(Vec::new()),
                firing: Cell::new(0),
                compaction_due: Cell::new(false),
                drained: RefCell::new(None),
            }),
        }
    }

    /// Register `callback`. If `token` is given the subscription is removed
    /// when the token is cancelled.
    pub fn subscribe<F>(&self, callback: F, token: Option<&LifetimeToken>) -> Result<Subscription>
    where
        F: Fn(&T) + 'static,
    {
        self.register(Rc::new(callback), false, token)
    }

    /// Register a callback that is removed after its first invocation.
    pub fn subscribe_once<F>(
        &self,
        callback: F,
        token: Option<&LifetimeToken>,
    ) -> Result<Subscription>
    where
        F: Fn(&T) + 'static,
    {
        self.register(Rc::new(callback), true, token)
    }

    fn register(
        &self,
        callback: Callback<T>,
        once: bool,
        token: Option<&LifetimeToken>,
    ) -> Result<Subscription> {
        if let Some(token) = token {
            token.ensure_live()?;
        }

        let id = SubscriberId::new();
        self.inner.records.borrow_mut().push(Record {
            id,
            callback,
            once,
            removed: Cell::new(false),
        });

        let erased: Rc<dyn Detach> = self.inner.clone();
        let channel: Weak<dyn Detach> = Rc::downgrade(&erased);
        let scope = match token {
            Some(token) => {
                let target = channel.clone();
                let cleanup = token.add_cleanup(move || {
                    if let Some(channel) = target.upgrade() {
                        channel.detach(id);
                    }
                })?;
                Some((token.clone(), cleanup))
            }
            None => None,
        };

        Ok(Subscription::new(id, channel, scope))
    }

    /// Deliver `value` to every subscriber.
    pub fn fire(&self, value: &T) {
        self.dispatch(value, None);
    }

    /// Deliver `value` to every subscriber except `excluded`.
    pub fn fire_excluding(&self, value: &T, excluded: SubscriberId) {
        self.dispatch(value, Some(excluded));
    }

    fn dispatch(&self, value: &T, excluded: Option<SubscriberId>) {
        let len = self.inner.records.borrow().len();
        self.inner.firing.set(self.inner.firing.get() + 1);
        let _guard = FireGuard { inner: &self.inner };

        for index in 0..len {
            let callback = {
                let records = self.inner.records.borrow();
                let record = &records[index];
                if record.removed.get() || Some(record.id) == excluded {
                    continue;
                }
                if record.once {
                    record.removed.set(true);
                    self.inner.compaction_due.set(true);
                }
                record.callback.clone()
            };
            callback(value);
        }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .records
            .borrow()
            .iter()
            .filter(|record| !record.removed.get())
            .count()
    }

    pub fn has_subscribers(&self) -> bool {
        self.subscriber_count() > 0
    }

    /// Call `hook` each time the last subscriber is removed.
    ///
    /// Removals during a fire are reported when the outermost fire
    /// returns.
    pub(crate) fn on_drained(&self, hook: impl Fn() + 'static) {
        *self.inner.drained.borrow_mut() = Some(Rc::new(hook));
    }
}

impl<T: 'static> Default for EventChannel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> Clone for EventChannel<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (Rc<RefCell<Vec<String>>>, impl Fn(&str) -> Box<dyn Fn(&i32)>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let shared = log.clone();
        let make = move |label: &str| -> Box<dyn Fn(&i32)> {
            let log = shared.clone();
            let label = label.to_string();
            Box::new(move |v: &i32| log.borrow_mut().push(format!("{label}{v}")))
        };
        (log, make)
    }

    #[test]
    fn fires_in_subscription_order() {
        let channel = EventChannel::new();
        let (log, make) = recorder();
        for label in ["a", "b", "c"] {
            channel.subscribe(make(label), None).unwrap();
        }

        channel.fire(&1);
        assert_eq!(*log.borrow(), vec!["a1", "b1", "c1"]);
    }

    #[test]
    fn fire_excluding_skips_one_subscriber() {
        let channel = EventChannel::new();
        let (log, make) = recorder();
        channel.subscribe(make("a"), None).unwrap();
        let b = channel.subscribe(make("b"), None).unwrap();

        channel.fire_excluding(&7, b.id());
        assert_eq!(*log.borrow(), vec!["a7"]);
    }

    #[test]
    fn subscribe_during_fire_is_not_called_in_that_fire() {
        let channel: EventChannel<i32> = EventChannel::new();
        let calls = Rc::new(Cell::new(0));

        let inner_channel = channel.clone();
        let counter = calls.clone();
        channel
            .subscribe(
                move |_| {
                    let counter = counter.clone();
                    inner_channel
                        .subscribe(move |_| counter.set(counter.get() + 1), None)
                        .unwrap();
                },
                None,
            )
            .unwrap();

        channel.fire(&0);
        assert_eq!(calls.get(), 0);
        channel.fire(&0);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn unsubscribe_during_fire_is_deferred_and_skips() {
        let channel: EventChannel<i32> = EventChannel::new();
        let (log, make) = recorder();

        let victim: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
        let target = victim.clone();
        channel
            .subscribe(
                move |_| {
                    if let Some(sub) = target.borrow().as_ref() {
                        sub.cancel();
                    }
                },
                None,
            )
            .unwrap();
        channel.subscribe(make("a"), None).unwrap();
        *victim.borrow_mut() = Some(channel.subscribe(make("b"), None).unwrap());
        channel.subscribe(make("c"), None).unwrap();

        channel.fire(&1);
        assert_eq!(*log.borrow(), vec!["a1", "c1"]);
        assert_eq!(channel.subscriber_count(), 3);
    }

    #[test]
    fn self_removal_during_fire_does_not_skip_neighbours() {
        let channel: EventChannel<i32> = EventChannel::new();
        let (log, make) = recorder();

        let me: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
        let handle = me.clone();
        *me.borrow_mut() = Some(
            channel
                .subscribe(
                    move |_| {
                        if let Some(sub) = handle.borrow().as_ref() {
                            sub.cancel();
                        }
                    },
                    None,
                )
                .unwrap(),
        );
        channel.subscribe(make("after"), None).unwrap();

        channel.fire(&1);
        channel.fire(&2);
        assert_eq!(*log.borrow(), vec!["after1", "after2"]);
    }

    #[test]
    fn once_subscribers_fire_once() {
        let channel = EventChannel::new();
        let (log, make) = recorder();
        channel.subscribe_once(make("once"), None).unwrap();

        channel.fire(&1);
        channel.fire(&2);
        assert_eq!(*log.borrow(), vec!["once1"]);
        assert!(!channel.has_subscribers());
    }

    #[test]
    fn token_cancellation_unsubscribes() {
        let channel = EventChannel::new();
        let (log, make) = recorder();
        let token = LifetimeToken::new();
        channel.subscribe(make("a"), Some(&token)).unwrap();

        channel.fire(&1);
        token.cancel();
        channel.fire(&2);
        assert_eq!(*log.borrow(), vec!["a1"]);
    }

    #[test]
    fn subscribe_on_cancelled_token_fails() {
        let channel: EventChannel<i32> = EventChannel::new();
        let token = LifetimeToken::new();
        token.cancel();

        assert!(channel.subscribe(|_| {}, Some(&token)).is_err());
        assert_eq!(channel.subscriber_count(), 0);
    }

    #[test]
    fn subscription_cancel_releases_token_cleanup() {
        let channel: EventChannel<i32> = EventChannel::new();
        let token = LifetimeToken::new();
        let sub = channel.subscribe(|_| {}, Some(&token)).unwrap();
        assert_eq!(token.cleanup_count(), 1);

        sub.cancel();
        sub.cancel();
        assert_eq!(token.cleanup_count(), 0);
        assert_eq!(channel.subscriber_count(), 0);
    }

    #[test]
    fn drained_hook_runs_when_last_subscriber_leaves() {
        let channel: EventChannel<i32> = EventChannel::new();
        let drained = Rc::new(Cell::new(0));
        let counter = drained.clone();
        channel.on_drained(move || counter.set(counter.get() + 1));

        let token = LifetimeToken::new();
        let a = channel.subscribe(|_| {}, None).unwrap();
        channel.subscribe(|_| {}, Some(&token)).unwrap();

        a.cancel();
        assert_eq!(drained.get(), 0);
        token.cancel();
        assert_eq!(drained.get(), 1);

        channel.subscribe_once(|_| {}, None).unwrap();
        channel.fire(&1);
        assert_eq!(drained.get(), 2);
    }
}
