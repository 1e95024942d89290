//! Lifetime Token
//!
//! A `LifetimeToken` owns an ordered list of cleanup actions and runs them
//! exactly once when it is cancelled. Every subscription, derived cell and
//! timer in the crate registers its teardown here; cancelling the token is
//! the only sanctioned way to release them.
//!
//! # Rules
//!
//! - Cancellation is one-way and idempotent. A second `cancel` is a no-op,
//!   including one issued from inside a running cleanup.
//! - Registering anything on a cancelled token fails with
//!   [`ReactiveError::ScopeCancelled`].
//! - Cancelling a token cancels every token chained to it.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use smallvec::SmallVec;

use super::timer::{self, TimerHandle};
use crate::config::RuntimeConfig;
use crate::error::{ReactiveError, Result};

/// A deferred teardown action.
pub type Cleanup = Box<dyn FnOnce()>;

/// Identifies a registered cleanup so it can be detached again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CleanupId(u64);

/// Lifecycle of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    /// Accepting cleanups.
    Live,

    /// Running its cleanups.
    Cancelling,

    /// All cleanups have run.
    Cancelled,
}

fn next_token_id() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

struct TokenInner {
    id: u64,
    state: Cell<TokenState>,
    cleanups: RefCell<SmallVec<[(CleanupId, Cleanup); 4]>>,
    next_cleanup: Cell<u64>,
    leak_reported: Cell<bool>,
}

/// Composable handle owning a set of subscriptions and timers.
///
/// Cloning shares the same token.
///
/// # Example
///
/// ```rust,ignore
/// let token = LifetimeToken::new();
/// cell.listen(|v| println!("{v}"), Some(&token))?;
/// token.set_interval(|| poll(), Duration::from_millis(100))?;
///
/// // Unsubscribes the listener and stops the interval.
/// token.cancel();
/// ```
#[derive(Clone)]
pub struct LifetimeToken {
    inner: Rc<TokenInner>,
}

impl LifetimeToken {
    /// Create a new live token.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(TokenInner {
                id: next_token_id(),
                state: Cell::new(TokenState::Live),
                cleanups: RefCell::new(SmallVec::new()),
                next_cleanup: Cell::new(0),
                leak_reported: Cell::new(false),
            }),
        }
    }

    /// Create a token that is cancelled as soon as any of `tokens` is.
    pub fn from_multiple(tokens: &[&LifetimeToken]) -> Result<Self> {
        let combined = Self::new();
        for token in tokens {
            token.chain(&combined)?;
        }
        Ok(combined)
    }

    /// Get the token's unique ID.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn state(&self) -> TokenState {
        self.inner.state.get()
    }

    /// True once cancellation has started.
    pub fn is_cancelled(&self) -> bool {
        self.state() != TokenState::Live
    }

    /// Fail with `ScopeCancelled` unless the token is live.
    pub fn ensure_live(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(ReactiveError::ScopeCancelled { token: self.id() });
        }
        Ok(())
    }

    /// Number of cleanups waiting to run.
    pub fn cleanup_count(&self) -> usize {
        self.inner.cleanups.borrow().len()
    }

    /// Register an action to run on cancellation.
    pub fn add_cleanup<F>(&self, cleanup: F) -> Result<CleanupId>
    where
        F: FnOnce() + 'static,
    {
        self.ensure_live()?;

        let id = CleanupId(self.inner.next_cleanup.get());
        self.inner.next_cleanup.set(id.0 + 1);

        let count = {
            let mut cleanups = self.inner.cleanups.borrow_mut();
            cleanups.push((id, Box::new(cleanup)));
            cleanups.len()
        };

        let threshold = RuntimeConfig::current().cleanup_warn_threshold;
        if count > threshold && !self.inner.leak_reported.get() {
            self.inner.leak_reported.set(true);
            tracing::warn!(
                token = self.id(),
                cleanups = count,
                threshold,
                "lifetime token is accumulating cleanups; possible subscription leak"
            );
        }

        Ok(id)
    }

    /// Detach a cleanup without running it. Returns `false` if it is unknown
    /// or already ran.
    pub fn remove_cleanup(&self, id: CleanupId) -> bool {
        let Ok(mut cleanups) = self.inner.cleanups.try_borrow_mut() else {
            return false;
        };
        let before = cleanups.len();
        cleanups.retain(|(existing, _)| *existing != id);
        let removed = cleanups.len() != before;
        if cleanups.len() <= RuntimeConfig::current().cleanup_warn_threshold {
            self.inner.leak_reported.set(false);
        }
        removed
    }

    /// Run every cleanup, in registration order, exactly once.
    pub fn cancel(&self) {
        if self.is_cancelled() {
            return;
        }
        self.inner.state.set(TokenState::Cancelling);

        let cleanups = std::mem::take(&mut *self.inner.cleanups.borrow_mut());
        tracing::debug!(token = self.id(), cleanups = cleanups.len(), "cancelling lifetime token");
        for (_, cleanup) in cleanups {
            cleanup();
        }

        self.inner.state.set(TokenState::Cancelled);
    }

    /// Cancel `child` whenever this token is cancelled.
    ///
    /// If the child is cancelled first, the link is removed from this token.
    pub fn chain(&self, child: &LifetimeToken) -> Result<()> {
        if child.is_cancelled() {
            return Ok(());
        }

        let target = child.clone();
        let link = self.add_cleanup(move || target.cancel())?;

        let parent = self.downgrade();
        child.add_cleanup(move || {
            if let Some(parent) = parent.upgrade() {
                parent.remove_cleanup(link);
            }
        })?;
        Ok(())
    }

    /// Create a new token chained to this one.
    pub fn child(&self) -> Result<LifetimeToken> {
        let child = LifetimeToken::new();
        self.chain(&child)?;
        Ok(child)
    }

    /// Run `task` once after `delay`, unless the token is cancelled first.
    pub fn set_timeout<F>(&self, task: F, delay: Duration) -> Result<TimerHandle>
    where
        F: FnOnce() + 'static,
    {
        self.ensure_live()?;

        let registered: Rc<Cell<Option<CleanupId>>> = Rc::new(Cell::new(None));
        let slot = registered.clone();
        let owner = self.downgrade();
        let handle = timer::schedule(delay, move || {
            if let (Some(owner), Some(id)) = (owner.upgrade(), slot.get()) {
                owner.remove_cleanup(id);
            }
            task();
        });

        let id = self.add_cleanup(move || {
            timer::cancel(handle);
        })?;
        registered.set(Some(id));
        Ok(handle)
    }

    /// Run `task` every `period` until the token is cancelled.
    pub fn set_interval<F>(&self, task: F, period: Duration) -> Result<TimerHandle>
    where
        F: FnMut() + 'static,
    {
        self.ensure_live()?;
        let handle = timer::schedule_repeating(period, task);
        self.add_cleanup(move || {
            timer::cancel(handle);
        })?;
        Ok(handle)
    }

    /// Call `frame` once per frame with the current clock time, until the
    /// token is cancelled.
    pub fn animation_loop<F>(&self, mut frame: F) -> Result<TimerHandle>
    where
        F: FnMut(Duration) + 'static,
    {
        let period = RuntimeConfig::current().frame_interval();
        self.set_interval(move || frame(timer::now()), period)
    }

    fn downgrade(&self) -> WeakToken {
        WeakToken(Rc::downgrade(&self.inner))
    }
}

impl Default for LifetimeToken {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for LifetimeToken {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for LifetimeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifetimeToken")
            .field("id", &self.id())
            .field("state", &self.state())
            .field("cleanups", &self.cleanup_count())
            .finish()
    }
}

struct WeakToken(Weak<TokenInner>);

impl WeakToken {
    fn upgrade(&self) -> Option<LifetimeToken> {
        self.0.upgrade().map(|inner| LifetimeToken { inner })
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
