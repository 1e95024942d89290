//! Subscriber types for the reactive system.
//!
//! A subscriber is a callback registered on an event channel. Each one gets
//! a [`SubscriberId`]; the [`Subscription`] handle returned on registration
//! is how it is removed again.

use std::rc::Weak;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::lifetime::{CleanupId, LifetimeToken};

/// Unique identifier for a subscriber.
///
/// Ids are unique across all channels, which lets a filtered fire exclude
/// one subscriber by id without knowing which channel it lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// Implemented by channels so a type-erased handle can unsubscribe.
pub(crate) trait Detach {
    fn detach(&self, id: SubscriberId);
}

/// Handle to a registered subscriber.
///
/// Dropping the handle does **not** unsubscribe; subscriptions live until
/// [`cancel`](Subscription::cancel) is called or their lifetime token is
/// cancelled.
#[derive(Clone)]
pub struct Subscription {
    id: SubscriberId,
    channel: Weak<dyn Detach>,
    scope: Option<(LifetimeToken, CleanupId)>,
}

impl Subscription {
    pub(crate) fn new(
        id: SubscriberId,
        channel: Weak<dyn Detach>,
        scope: Option<(LifetimeToken, CleanupId)>,
    ) -> Self {
        Self { id, channel, scope }
    }

    /// Get the subscriber's unique ID.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Unsubscribe. Safe to call repeatedly and from inside a firing
    /// callback.
    pub fn cancel(&self) {
        if let Some(channel) = self.channel.upgrade() {
            channel.detach(self.id);
        }
        if let Some((token, cleanup)) = &self.scope {
            token.remove_cleanup(*cleanup);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("channel_alive", &(self.channel.strong_count() > 0))
            .finish()
    }
}
