//! Graph Nodes
//!
//! Identity and classification of the nodes that make up a subscriber graph.
//! Every cell, duplex cell and collection is a node with a stable [`NodeId`]
//! and a [`NodeKind`] discriminant. Code that must treat "any reactive
//! source" uniformly goes through [`ChangeSource`] or the closed
//! [`AnySource`] enum rather than probing a value's shape at runtime.

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::collections::{ReactiveSequence, ReactiveSet};
use crate::error::Result;
use crate::lifetime::LifetimeToken;
use crate::reactive::{DuplexCell, ReactiveCell, Subscription};

/// Unique identifier for a node in the subscriber graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// The kind of node in the subscriber graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// A single value replaced wholesale on update.
    Cell,

    /// A value with separate downstream and upstream flows.
    Duplex,

    /// An ordered collection emitting structural change records.
    Sequence,

    /// A keyed collection emitting per-key change records.
    Map,

    /// A membership collection emitting add/remove records.
    Set,
}

/// Anything that can report "something changed" to a type-erased listener.
///
/// Used where a consumer does not care about the payload, e.g. the rescan
/// triggers of sorted and filtered sequence views.
pub trait ChangeSource {
    fn node_id(&self) -> NodeId;

    fn node_kind(&self) -> NodeKind;

    /// Invoke `callback` after every change, until the subscription or the
    /// token is cancelled.
    fn on_change(
        &self,
        callback: Rc<dyn Fn()>,
        token: Option<&LifetimeToken>,
    ) -> Result<Subscription>;
}

/// The closed set of single-type reactive sources.
///
/// Maps are keyed by two type parameters and stay outside this enum; they
/// still implement [`ChangeSource`].
pub enum AnySource<T: 'static> {
    Cell(ReactiveCell<T>),
    Duplex(DuplexCell<T>),
    Sequence(ReactiveSequence<T>),
    Set(ReactiveSet<T>),
}

impl<T> AnySource<T>
where
    T: Clone + PartialEq + Eq + std::hash::Hash + 'static,
{
    /// The discriminant of the wrapped node.
    pub fn kind(&self) -> NodeKind {
        match self {
            AnySource::Cell(_) => NodeKind::Cell,
            AnySource::Duplex(_) => NodeKind::Duplex,
            AnySource::Sequence(_) => NodeKind::Sequence,
            AnySource::Set(_) => NodeKind::Set,
        }
    }

    fn as_source(&self) -> &dyn ChangeSource {
        match self {
            AnySource::Cell(cell) => cell,
            AnySource::Duplex(cell) => cell,
            AnySource::Sequence(sequence) => sequence,
            AnySource::Set(set) => set,
        }
    }
}

impl<T> ChangeSource for AnySource<T>
where
    T: Clone + PartialEq + Eq + std::hash::Hash + 'static,
{
    fn node_id(&self) -> NodeId {
        self.as_source().node_id()
    }

    fn node_kind(&self) -> NodeKind {
        self.kind()
    }

    fn on_change(
        &self,
        callback: Rc<dyn Fn()>,
        token: Option<&LifetimeToken>,
    ) -> Result<Subscription> {
        self.as_source().on_change(callback, token)
    }
}

impl<T: 'static> From<ReactiveCell<T>> for AnySource<T> {
    fn from(cell: ReactiveCell<T>) -> Self {
        AnySource::Cell(cell)
    }
}

impl<T: 'static> From<DuplexCell<T>> for AnySource<T> {
    fn from(cell: DuplexCell<T>) -> Self {
        AnySource::Duplex(cell)
    }
}

impl<T: 'static> From<ReactiveSequence<T>> for AnySource<T> {
    fn from(sequence: ReactiveSequence<T>) -> Self {
        AnySource::Sequence(sequence)
    }
}

impl<T: 'static> From<ReactiveSet<T>> for AnySource<T> {
    fn from(set: ReactiveSet<T>) -> Self {
        AnySource::Set(set)
    }
}
