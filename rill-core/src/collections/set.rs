//! Reactive Set
//!
//! An insertion-ordered membership collection reporting additions and
//! removals as [`SetChange`]s.

use std::cell::{Cell, RefCell};
use std::fmt::Debug;
use std::hash::Hash;
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::error::{fail_fast, Result};
use crate::graph::{ChangeSource, NodeId, NodeKind};
use crate::lifetime::LifetimeToken;
use crate::reactive::{EventChannel, PropagationFence, ReactiveCell, SubscriberId, Subscription};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "member", rename_all = "camelCase")]
pub enum SetChange<T> {
    Added(T),
    Removed(T),
}

impl<T> SetChange<T> {
    pub fn member(&self) -> &T {
        match self {
            Self::Added(member) | Self::Removed(member) => member,
        }
    }

    pub fn is_added(&self) -> bool {
        matches!(self, Self::Added(_))
    }
}

struct SetInner<T: 'static> {
    id: NodeId,
    members: RefCell<IndexSet<T>>,
    channel: EventChannel<SetChange<T>>,
    per_member: RefCell<IndexMap<T, EventChannel<SetChange<T>>>>,
    fence: PropagationFence,
}

/// A reactive set of members.
pub struct ReactiveSet<T: 'static> {
    inner: Rc<SetInner<T>>,
}

impl<T> ReactiveSet<T>
where
    T: Clone + Eq + Hash + 'static,
{
    pub fn new() -> Self {
        Self::from_index_set(IndexSet::new())
    }

    pub fn from_index_set(members: IndexSet<T>) -> Self {
        Self {
            inner: Rc::new(SetInner {
                id: NodeId::new(),
                members: RefCell::new(members),
                channel: EventChannel::new(),
                per_member: RefCell::new(IndexMap::new()),
                fence: PropagationFence::new(),
            }),
        }
    }

    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    pub fn len(&self) -> usize {
        self.inner.members.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has(&self, member: &T) -> bool {
        self.inner.members.borrow().contains(member)
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.inner.members.borrow().iter().cloned().collect()
    }

    /// Add `member`. Returns `false` if it was already present.
    pub fn add(&self, member: T) -> Result<bool> {
        self.commit(member, true, None)
    }

    /// Remove `member`. Returns `false` if it was not present.
    pub fn delete(&self, member: &T) -> Result<bool> {
        self.commit(member.clone(), false, None)
    }

    /// Flip membership, returning whether `member` is now present.
    pub fn toggle(&self, member: T) -> Result<bool> {
        let present = !self.has(&member);
        self.commit(member, present, None)?;
        Ok(present)
    }

    /// Reconcile to exactly `members`.
    pub fn merge(&self, members: impl IntoIterator<Item = T>) -> Result<()> {
        let target: IndexSet<T> = members.into_iter().collect();
        for member in self.to_vec() {
            if !target.contains(&member) {
                self.delete(&member)?;
            }
        }
        for member in target {
            self.add(member)?;
        }
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        for member in self.to_vec() {
            self.delete(&member)?;
        }
        Ok(())
    }

    fn commit(&self, member: T, present: bool, excluded: Option<SubscriberId>) -> Result<bool> {
        let _guard = self.inner.fence.enter(self.inner.id)?;

        let changed = {
            let mut members = self.inner.members.borrow_mut();
            if present {
                members.insert(member.clone())
            } else {
                members.shift_remove(&member)
            }
        };
        if !changed {
            return Ok(false);
        }

        let change = if present {
            SetChange::Added(member)
        } else {
            SetChange::Removed(member)
        };
        let keyed = self.inner.per_member.borrow().get(change.member()).cloned();
        let deliver = |channel: &EventChannel<SetChange<T>>| match excluded {
            Some(excluded) => channel.fire_excluding(&change, excluded),
            None => channel.fire(&change),
        };
        if let Some(channel) = keyed {
            deliver(&channel);
        }
        deliver(&self.inner.channel);
        Ok(true)
    }

    pub fn listen<F>(&self, callback: F, token: Option<&LifetimeToken>) -> Result<Subscription>
    where
        F: Fn(&SetChange<T>) + 'static,
    {
        self.inner.channel.subscribe(callback, token)
    }

    /// Deliver one `Added` per current member, then subscribe.
    pub fn listen_and_repeat<F>(
        &self,
        callback: F,
        token: Option<&LifetimeToken>,
    ) -> Result<Subscription>
    where
        F: Fn(&SetChange<T>) + 'static,
    {
        if let Some(token) = token {
            token.ensure_live()?;
        }
        for member in self.to_vec() {
            callback(&SetChange::Added(member));
        }
        self.listen(callback, token)
    }

    pub fn listen_on_member<F>(
        &self,
        member: T,
        callback: F,
        token: Option<&LifetimeToken>,
    ) -> Result<Subscription>
    where
        F: Fn(&SetChange<T>) + 'static,
    {
        let channel = self.member_channel(&member);
        let subscription = channel.subscribe(callback, token);
        if subscription.is_err() {
            self.prune_member(&member);
        }
        subscription
    }

    fn member_channel(&self, member: &T) -> EventChannel<SetChange<T>> {
        let mut per_member = self.inner.per_member.borrow_mut();
        if let Some(channel) = per_member.get(member) {
            return channel.clone();
        }
        let channel = EventChannel::new();
        let (set, drained_member) = (Rc::downgrade(&self.inner), member.clone());
        channel.on_drained(move || {
            if let Some(inner) = set.upgrade() {
                ReactiveSet { inner }.prune_member(&drained_member);
            }
        });
        per_member.insert(member.clone(), channel.clone());
        channel
    }

    fn prune_member(&self, member: &T) {
        let removed = {
            let mut per_member = self.inner.per_member.borrow_mut();
            match per_member.get(member) {
                Some(channel) if !channel.has_subscribers() => per_member.swap_remove(member),
                _ => None,
            }
        };
        drop(removed);
    }

    #[cfg(test)]
    pub(crate) fn member_channel_count(&self) -> usize {
        self.inner.per_member.borrow().len()
    }

    /// A cell that is `true` while `member` is in the set. Writing the cell
    /// adds or removes the member.
    pub fn pick(&self, member: T, token: Option<&LifetimeToken>) -> Result<ReactiveCell<bool>> {
        let cell = ReactiveCell::new(self.has(&member));
        let write_back: Rc<Cell<Option<SubscriberId>>> = Rc::new(Cell::new(None));

        let from_set = {
            let (target, write_back) = (cell.clone(), write_back.clone());
            self.listen_on_member(
                member.clone(),
                move |change| target.forward_excluding(change.is_added(), write_back.get()),
                token,
            )?
        };

        let set = Rc::downgrade(&self.inner);
        let origin = from_set.id();
        let back = cell.listen(
            move |present| {
                let Some(inner) = set.upgrade() else { return };
                let set = ReactiveSet { inner };
                if let Err(err) = set.commit(member.clone(), *present, Some(origin)) {
                    fail_fast(err);
                }
            },
            token,
        )?;
        write_back.set(Some(back.id()));

        Ok(cell)
    }
}

impl<T> Default for ReactiveSet<T>
where
    T: Clone + Eq + Hash + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FromIterator<T> for ReactiveSet<T>
where
    T: Clone + Eq + Hash + 'static,
{
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from_index_set(iter.into_iter().collect())
    }
}

impl<T: 'static> Clone for ReactiveSet<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> ChangeSource for ReactiveSet<T>
where
    T: Clone + Eq + Hash + 'static,
{
    fn node_id(&self) -> NodeId {
        self.id()
    }

    fn node_kind(&self) -> NodeKind {
        NodeKind::Set
    }

    fn on_change(
        &self,
        callback: Rc<dyn Fn()>,
        token: Option<&LifetimeToken>,
    ) -> Result<Subscription> {
        self.listen(move |_| callback(), token)
    }
}

impl<T: Debug + 'static> Debug for ReactiveSet<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactiveSet")
            .field("id", &self.inner.id)
            .field("members", &*self.inner.members.borrow())
            .finish()
    }
}
