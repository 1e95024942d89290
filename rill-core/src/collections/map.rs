//! Reactive Map
//!
//! An insertion-ordered key/value store that reports every change as a
//! [`MapChange`]. Changes are delivered to the listeners registered on the
//! changed key first, then to the map-wide listeners.

use std::cell::{Cell, RefCell};
use std::fmt::Debug;
use std::hash::Hash;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{fail_fast, Result};
use crate::graph::{ChangeSource, NodeId, NodeKind};
use crate::lifetime::LifetimeToken;
use crate::reactive::{EventChannel, PropagationFence, ReactiveCell, SubscriberId, Subscription};

/// One change to a [`ReactiveMap`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum MapChange<K, V> {
    Inserted { key: K, value: V },
    Updated { key: K, previous: V, value: V },
    Removed { key: K, previous: V },
}

impl<K, V> MapChange<K, V> {
    pub fn key(&self) -> &K {
        match self {
            Self::Inserted { key, .. } | Self::Updated { key, .. } | Self::Removed { key, .. } => key,
        }
    }

    /// The value after the change; `None` once the key is gone.
    pub fn value(&self) -> Option<&V> {
        match self {
            Self::Inserted { value, .. } | Self::Updated { value, .. } => Some(value),
            Self::Removed { .. } => None,
        }
    }

    pub fn into_previous(self) -> Option<V> {
        match self {
            Self::Inserted { .. } => None,
            Self::Updated { previous, .. } | Self::Removed { previous, .. } => Some(previous),
        }
    }
}

struct MapInner<K: 'static, V: 'static> {
    id: NodeId,
    entries: RefCell<IndexMap<K, V>>,
    channel: EventChannel<MapChange<K, V>>,
    keyed: RefCell<IndexMap<K, EventChannel<MapChange<K, V>>>>,
    fence: PropagationFence,
}

/// A reactive key/value store.
pub struct ReactiveMap<K: 'static, V: 'static> {
    inner: Rc<MapInner<K, V>>,
}

impl<K, V> ReactiveMap<K, V>
where
    K: Clone + Eq + Hash + 'static,
    V: Clone + PartialEq + 'static,
{
    pub fn new() -> Self {
        Self::from_index_map(IndexMap::new())
    }

    pub fn from_index_map(entries: IndexMap<K, V>) -> Self {
        Self {
            inner: Rc::new(MapInner {
                id: NodeId::new(),
                entries: RefCell::new(entries),
                channel: EventChannel::new(),
                keyed: RefCell::new(IndexMap::new()),
                fence: PropagationFence::new(),
            }),
        }
    }

    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    pub fn len(&self) -> usize {
        self.inner.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.entries.borrow().get(key).cloned()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.entries.borrow().contains_key(key)
    }

    pub fn keys(&self) -> Vec<K> {
        self.inner.entries.borrow().keys().cloned().collect()
    }

    pub fn to_index_map(&self) -> IndexMap<K, V> {
        self.inner.entries.borrow().clone()
    }

    /// Insert or replace `key`. Writing the value it already holds is not a
    /// change.
    pub fn set(&self, key: K, value: V) -> Result<()> {
        self.commit(key, Some(value), None).map(|_| ())
    }

    /// Remove `key`, returning its value.
    pub fn delete(&self, key: &K) -> Result<Option<V>> {
        let change = self.commit(key.clone(), None, None)?;
        Ok(change.and_then(MapChange::into_previous))
    }

    /// Shallow merge: set every entry of `partial`, one change per key that
    /// actually changed.
    pub fn assign(&self, partial: impl IntoIterator<Item = (K, V)>) -> Result<()> {
        for (key, value) in partial {
            self.set(key, value)?;
        }
        Ok(())
    }

    /// Reconcile to exactly `shape`: keys missing from it are deleted, the
    /// rest are assigned.
    pub fn merge(&self, shape: IndexMap<K, V>) -> Result<()> {
        for key in self.keys() {
            if !shape.contains_key(&key) {
                self.delete(&key)?;
            }
        }
        self.assign(shape)
    }

    pub fn clear(&self) -> Result<()> {
        for key in self.keys() {
            self.delete(&key)?;
        }
        Ok(())
    }

    fn commit(
        &self,
        key: K,
        value: Option<V>,
        excluded: Option<SubscriberId>,
    ) -> Result<Option<MapChange<K, V>>> {
        let _guard = self.inner.fence.enter(self.inner.id)?;

        let change = {
            let mut entries = self.inner.entries.borrow_mut();
            match value {
                Some(value) => match entries.insert(key.clone(), value.clone()) {
                    None => MapChange::Inserted { key, value },
                    Some(previous) if previous == value => return Ok(None),
                    Some(previous) => MapChange::Updated {
                        key,
                        previous,
                        value,
                    },
                },
                None => match entries.shift_remove(&key) {
                    Some(previous) => MapChange::Removed { key, previous },
                    None => return Ok(None),
                },
            }
        };

        let keyed = self.inner.keyed.borrow().get(change.key()).cloned();
        let deliver = |channel: &EventChannel<MapChange<K, V>>| match excluded {
            Some(excluded) => channel.fire_excluding(&change, excluded),
            None => channel.fire(&change),
        };
        if let Some(channel) = keyed {
            deliver(&channel);
        }
        deliver(&self.inner.channel);

        Ok(Some(change))
    }

    pub fn listen<F>(&self, callback: F, token: Option<&LifetimeToken>) -> Result<Subscription>
    where
        F: Fn(&MapChange<K, V>) + 'static,
    {
        self.inner.channel.subscribe(callback, token)
    }

    /// Deliver one `Inserted` per current entry, then subscribe.
    pub fn listen_and_repeat<F>(
        &self,
        callback: F,
        token: Option<&LifetimeToken>,
    ) -> Result<Subscription>
    where
        F: Fn(&MapChange<K, V>) + 'static,
    {
        if let Some(token) = token {
            token.ensure_live()?;
        }
        for (key, value) in self.to_index_map() {
            callback(&MapChange::Inserted { key, value });
        }
        self.listen(callback, token)
    }

    /// Listen to changes of a single key.
    pub fn listen_on_key<F>(
        &self,
        key: K,
        callback: F,
        token: Option<&LifetimeToken>,
    ) -> Result<Subscription>
    where
        F: Fn(&MapChange<K, V>) + 'static,
    {
        let channel = self.keyed_channel(&key);
        let subscription = channel.subscribe(callback, token);
        if subscription.is_err() {
            self.prune_key(&key);
        }
        subscription
    }

    fn keyed_channel(&self, key: &K) -> EventChannel<MapChange<K, V>> {
        let mut keyed = self.inner.keyed.borrow_mut();
        if let Some(channel) = keyed.get(key) {
            return channel.clone();
        }
        let channel = EventChannel::new();
        let (map, drained_key) = (Rc::downgrade(&self.inner), key.clone());
        channel.on_drained(move || {
            if let Some(inner) = map.upgrade() {
                ReactiveMap { inner }.prune_key(&drained_key);
            }
        });
        keyed.insert(key.clone(), channel.clone());
        channel
    }

    /// Forget the per-key channel of `key` if nobody listens on it.
    fn prune_key(&self, key: &K) {
        let removed = {
            let mut keyed = self.inner.keyed.borrow_mut();
            match keyed.get(key) {
                Some(channel) if !channel.has_subscribers() => keyed.swap_remove(key),
                _ => None,
            }
        };
        // Released outside the borrow; the channel may own closures holding maps.
        drop(removed);
    }

    #[cfg(test)]
    pub(crate) fn keyed_channel_count(&self) -> usize {
        self.inner.keyed.borrow().len()
    }

    /// A cell following `key`, kept in sync in both directions.
    ///
    /// Writing `Some(v)` to the cell sets the key; writing `None` deletes it.
    pub fn pick(&self, key: K, token: Option<&LifetimeToken>) -> Result<ReactiveCell<Option<V>>> {
        let cell = ReactiveCell::new(self.get(&key));
        let write_back: Rc<Cell<Option<SubscriberId>>> = Rc::new(Cell::new(None));

        let from_map = {
            let (target, write_back) = (cell.clone(), write_back.clone());
            self.listen_on_key(
                key.clone(),
                move |change| target.forward_excluding(change.value().cloned(), write_back.get()),
                token,
            )?
        };

        let map = Rc::downgrade(&self.inner);
        let origin = from_map.id();
        let back = cell.listen(
            move |value| {
                let Some(inner) = map.upgrade() else { return };
                let map = ReactiveMap { inner };
                if let Err(err) = map.commit(key.clone(), value.clone(), Some(origin)) {
                    fail_fast(err);
                }
            },
            token,
        )?;
        write_back.set(Some(back.id()));

        Ok(cell)
    }
}

impl<K, V> Default for ReactiveMap<K, V>
where
    K: Clone + Eq + Hash + 'static,
    V: Clone + PartialEq + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> FromIterator<(K, V)> for ReactiveMap<K, V>
where
    K: Clone + Eq + Hash + 'static,
    V: Clone + PartialEq + 'static,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::from_index_map(iter.into_iter().collect())
    }
}

impl<K: 'static, V: 'static> Clone for ReactiveMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<K, V> ChangeSource for ReactiveMap<K, V>
where
    K: Clone + Eq + Hash + 'static,
    V: Clone + PartialEq + 'static,
{
    fn node_id(&self) -> NodeId {
        self.id()
    }

    fn node_kind(&self) -> NodeKind {
        NodeKind::Map
    }

    fn on_change(
        &self,
        callback: Rc<dyn Fn()>,
        token: Option<&LifetimeToken>,
    ) -> Result<Subscription> {
        self.listen(move |_| callback(), token)
    }
}

impl<K: Debug + 'static, V: Debug + 'static> Debug for ReactiveMap<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactiveMap")
            .field("id", &self.inner.id)
            .field("entries", &*self.inner.entries.borrow())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
