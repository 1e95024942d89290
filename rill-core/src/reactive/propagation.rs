//! Propagation Fence
//!
//! Each node owns a fence recording whether it is currently pushing an
//! update to its subscribers. Entering the fence while it is already held
//! means a subscriber fed a value straight back into the node that is
//! notifying it, which is an unstable feedback cycle. That is reported as
//! [`ReactiveError::ReentrantUpdate`] instead of recursing.
//!
//! The fence is the only lock in the system. It guards correctness, not
//! throughput.

use std::cell::Cell;

use crate::error::{ReactiveError, Result};
use crate::graph::NodeId;

/// Whether a node is in the middle of notifying its subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropagationState {
    Idle,
    Propagating,
}

/// Per-node reentrancy fence.
#[derive(Debug)]
pub(crate) struct PropagationFence {
    state: Cell<PropagationState>,
}

impl PropagationFence {
    pub(crate) fn new() -> Self {
        Self {
            state: Cell::new(PropagationState::Idle),
        }
    }

    pub(crate) fn state(&self) -> PropagationState {
        self.state.get()
    }

    /// Move to `Propagating` for the lifetime of the returned guard.
    pub(crate) fn enter(&self, node: NodeId) -> Result<PropagationGuard<'_>> {
        match self.state.get() {
            PropagationState::Idle => {
                self.state.set(PropagationState::Propagating);
                Ok(PropagationGuard { fence: self })
            }
            PropagationState::Propagating => {
                tracing::error!(%node, "reentrant update rejected");
                Err(ReactiveError::ReentrantUpdate { node })
            }
        }
    }
}

/// Guard that returns the fence to `Idle` when dropped.
///
/// This keeps the fence consistent even if a subscriber panics.
pub(crate) struct PropagationGuard<'a> {
    fence: &'a PropagationFence,
}

impl Drop for PropagationGuard<'_> {
    fn drop(&mut self) {
        self.fence.state.set(PropagationState::Idle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fence_rejects_nested_entry() {
        let fence = PropagationFence::new();
        let node = NodeId::new();

        {
            let _guard = fence.enter(node).unwrap();
            assert_eq!(fence.state(), PropagationState::Propagating);
            assert_eq!(
                fence.enter(node).err(),
                Some(ReactiveError::ReentrantUpdate { node })
            );
        }

        assert_eq!(fence.state(), PropagationState::Idle);
        assert!(fence.enter(node).is_ok());
    }

    #[test]
    fn fence_resets_after_panic() {
        let fence = PropagationFence::new();
        let node = NodeId::new();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = fence.enter(node).unwrap();
            panic!("subscriber blew up");
        }));

        assert!(result.is_err());
        assert_eq!(fence.state(), PropagationState::Idle);
    }
}
