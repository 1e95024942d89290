//! Timer Queue
//!
//! Deferred work in the core (debounce, delay, buffer windows, intervals,
//! frame loops) is scheduled on a per-thread queue driven by a virtual
//! clock. Nothing runs until the clock is advanced, either by hand
//! ([`advance`], [`advance_to`]) or by the tokio-backed
//! [`driver`](super::driver).
//!
//! # Ordering
//!
//! Timers fire in deadline order; timers sharing a deadline fire in the
//! order they were armed. A repeating timer is re-armed after its callback
//! returns, unless the callback cancelled it.
//!
//! # Task groups
//!
//! One-shot timers armed while a [`TaskGroup`] is current are counted
//! against it, and so are the timers those callbacks arm in turn. When the
//! count drops back to zero because a timer fired, the group's idle hook
//! runs. Cancelled timers leave the group quietly. Repeating timers are
//! never counted.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use std::time::Duration;

/// Handle to a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

enum TimerTask {
    Once {
        task: Box<dyn FnOnce()>,
        group: Option<Rc<TaskGroup>>,
    },
    Repeat {
        period: Duration,
        task: Box<dyn FnMut()>,
    },
}

/// Key ordering the queue: deadline first, then arming sequence.
type SlotKey = (Duration, u64);

#[derive(Default)]
struct TimerQueue {
    now: Duration,
    next_seq: u64,
    next_handle: u64,
    entries: BTreeMap<SlotKey, (TimerHandle, TimerTask)>,
    index: HashMap<TimerHandle, SlotKey>,
    running: Option<TimerHandle>,
    running_cancelled: bool,
}

impl TimerQueue {
    fn arm(&mut self, handle: TimerHandle, deadline: Duration, task: TimerTask) {
        let key = (deadline, self.next_seq);
        self.next_seq += 1;
        self.entries.insert(key, (handle, task));
        self.index.insert(handle, key);
    }

    fn next_handle(&mut self) -> TimerHandle {
        let handle = TimerHandle(self.next_handle);
        self.next_handle += 1;
        handle
    }

    fn pop_due(&mut self, target: Duration) -> Option<(TimerHandle, TimerTask)> {
        let (&key, _) = self.entries.iter().next()?;
        if key.0 > target {
            return None;
        }
        let (handle, task) = self.entries.remove(&key)?;
        self.index.remove(&handle);
        self.now = key.0;
        self.running = Some(handle);
        self.running_cancelled = false;
        Some((handle, task))
    }
}

thread_local! {
    static QUEUE: RefCell<TimerQueue> = RefCell::new(TimerQueue::default());
    static CURRENT_GROUP: RefCell<Option<Rc<TaskGroup>>> = const { RefCell::new(None) };
}

// =============================================================================
// TASK GROUPS
// =============================================================================

/// Outstanding deferred work started on behalf of one unit of work.
///
/// Groups nest: a group created while another is current counts its timers
/// against that parent as well.
pub(crate) struct TaskGroup {
    tag: u64,
    parent: Option<Rc<TaskGroup>>,
    outstanding: Cell<usize>,
    on_idle: Box<dyn Fn()>,
}

impl TaskGroup {
    /// A group nested in the current one.
    ///
    /// Groups sharing `tag` never nest in each other: the new group is
    /// attached above the outermost current group with the same tag, so a
    /// chain of successive runs of one owner stays flat.
    pub(crate) fn new(tag: u64, on_idle: impl Fn() + 'static) -> Rc<Self> {
        let current = current_group();
        let mut parent = current.clone();
        let mut cursor = current;
        while let Some(group) = cursor {
            if group.tag == tag {
                parent = group.parent.clone();
            }
            cursor = group.parent.clone();
        }
        Rc::new(Self {
            tag,
            parent,
            outstanding: Cell::new(0),
            on_idle: Box::new(on_idle),
        })
    }

    /// No timers of this group are pending.
    pub(crate) fn is_idle(&self) -> bool {
        self.outstanding.get() == 0
    }

    fn enlist(group: &Rc<Self>) {
        let mut next = Some(group.clone());
        while let Some(group) = next {
            group.outstanding.set(group.outstanding.get() + 1);
            next = group.parent.clone();
        }
    }

    /// Count one timer as done. With `notify`, every group reaching zero
    /// runs its idle hook with its parent as the current group.
    fn settle(group: Rc<Self>, notify: bool) {
        let mut next = Some(group);
        while let Some(group) = next {
            let left = group.outstanding.get().saturating_sub(1);
            group.outstanding.set(left);
            if notify && left == 0 {
                within(group.parent.clone(), || (group.on_idle)());
            }
            next = group.parent.clone();
        }
    }
}

fn current_group() -> Option<Rc<TaskGroup>> {
    CURRENT_GROUP.with(|current| current.borrow().clone())
}

/// Restores the previous current group, even if the closure panics.
struct GroupGuard {
    previous: Option<Rc<TaskGroup>>,
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT_GROUP.with(|current| *current.borrow_mut() = previous);
    }
}

/// Run `f` with `group` as the current task group.
pub(crate) fn within<R>(group: Option<Rc<TaskGroup>>, f: impl FnOnce() -> R) -> R {
    let previous = CURRENT_GROUP.with(|current| current.replace(group));
    let _guard = GroupGuard { previous };
    f()
}

/// Current virtual time.
pub fn now() -> Duration {
    QUEUE.with(|queue| queue.borrow().now)
}

/// Run `task` once, `delay` from now.
pub fn schedule<F>(delay: Duration, task: F) -> TimerHandle
where
    F: FnOnce() + 'static,
{
    let group = current_group();
    if let Some(group) = &group {
        TaskGroup::enlist(group);
    }
    QUEUE.with(|queue| {
        let mut queue = queue.borrow_mut();
        let handle = queue.next_handle();
        let deadline = queue.now + delay;
        let task = TimerTask::Once {
            task: Box::new(task),
            group,
        };
        queue.arm(handle, deadline, task);
        handle
    })
}

/// Run `task` every `period`, starting one period from now.
///
/// Periods shorter than a millisecond are raised to one millisecond.
pub fn schedule_repeating<F>(period: Duration, task: F) -> TimerHandle
where
    F: FnMut() + 'static,
{
    let period = period.max(Duration::from_millis(1));
    QUEUE.with(|queue| {
        let mut queue = queue.borrow_mut();
        let handle = queue.next_handle();
        let deadline = queue.now + period;
        queue.arm(
            handle,
            deadline,
            TimerTask::Repeat {
                period,
                task: Box::new(task),
            },
        );
        handle
    })
}

/// Cancel a timer. Returns `false` if it already fired or was cancelled.
pub fn cancel(handle: TimerHandle) -> bool {
    let (cancelled, removed) = QUEUE.with(|queue| {
        let mut queue = queue.borrow_mut();
        if let Some(key) = queue.index.remove(&handle) {
            return (true, queue.entries.remove(&key));
        }
        if queue.running == Some(handle) && !queue.running_cancelled {
            queue.running_cancelled = true;
            return (true, None);
        }
        (false, None)
    });
    if let Some((_, TimerTask::Once { group: Some(group), .. })) = removed {
        TaskGroup::settle(group, false);
    }
    cancelled
}

/// Deadline of the earliest pending timer.
pub fn next_deadline() -> Option<Duration> {
    QUEUE.with(|queue| queue.borrow().entries.keys().next().map(|key| key.0))
}

/// Number of pending timers.
pub fn pending() -> usize {
    QUEUE.with(|queue| queue.borrow().entries.len())
}

/// Advance the clock by `by`, firing every timer that falls due.
///
/// Returns the number of callbacks run.
pub fn advance(by: Duration) -> usize {
    advance_to(now() + by)
}

/// Advance the clock to `target`, firing every timer that falls due.
///
/// A target in the past leaves the clock where it is.
pub fn advance_to(target: Duration) -> usize {
    let mut fired = 0;
    loop {
        let due = QUEUE.with(|queue| queue.borrow_mut().pop_due(target));
        let Some((handle, task)) = due else { break };

        tracing::trace!(timer = handle.0, at = ?now(), "timer fired");
        fired += 1;

        let finished = match task {
            TimerTask::Once { task, group } => {
                within(group.clone(), task);
                group
            }
            TimerTask::Repeat { period, mut task } => {
                task();
                QUEUE.with(|queue| {
                    let mut queue = queue.borrow_mut();
                    if !queue.running_cancelled {
                        let deadline = queue.now + period;
                        queue.arm(handle, deadline, TimerTask::Repeat { period, task });
                    }
                });
                None
            }
        };

        QUEUE.with(|queue| queue.borrow_mut().running = None);
        if let Some(group) = finished {
            TaskGroup::settle(group, true);
        }
    }

    QUEUE.with(|queue| {
        let mut queue = queue.borrow_mut();
        if queue.now < target {
            queue.now = target;
        }
    });
    fired
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn timers_fire_in_deadline_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        for (label, delay) in [("c", 30), ("a", 10), ("b", 20), ("a2", 10)] {
            let log = log.clone();
            schedule(ms(delay), move || log.borrow_mut().push(label));
        }

        assert_eq!(advance(ms(15)), 2);
        assert_eq!(*log.borrow(), vec!["a", "a2"]);

        advance(ms(100));
        assert_eq!(*log.borrow(), vec!["a", "a2", "b", "c"]);
        assert_eq!(pending(), 0);
    }

    #[test]
    fn cancelled_timers_never_fire() {
        let fired = Rc::new(RefCell::new(false));
        let flag = fired.clone();
        let handle = schedule(ms(5), move || *flag.borrow_mut() = true);

        assert!(cancel(handle));
        assert!(!cancel(handle));
        advance(ms(10));
        assert!(!*fired.borrow());
    }

    #[test]
    fn repeating_timer_rearms_until_cancelled_from_inside() {
        let count = Rc::new(RefCell::new(0));
        let handle_slot = Rc::new(RefCell::new(None));

        let counter = count.clone();
        let slot = handle_slot.clone();
        let handle = schedule_repeating(ms(10), move || {
            *counter.borrow_mut() += 1;
            if *counter.borrow() == 3 {
                if let Some(handle) = *slot.borrow() {
                    cancel(handle);
                }
            }
        });
        *handle_slot.borrow_mut() = Some(handle);

        advance(ms(100));
        assert_eq!(*count.borrow(), 3);
        assert_eq!(pending(), 0);
    }

    #[test]
    fn timers_scheduled_while_firing_respect_target() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let outer = log.clone();
        schedule(ms(10), move || {
            outer.borrow_mut().push("outer");
            let inner = outer.clone();
            schedule(ms(10), move || inner.borrow_mut().push("inner"));
        });

        advance(ms(15));
        assert_eq!(*log.borrow(), vec!["outer"]);
        assert_eq!(next_deadline(), Some(now() + ms(5)));

        advance(ms(5));
        assert_eq!(*log.borrow(), vec!["outer", "inner"]);
    }

    fn counting_group(tag: u64) -> (Rc<TaskGroup>, Rc<Cell<usize>>) {
        let idle = Rc::new(Cell::new(0));
        let counter = idle.clone();
        let group = TaskGroup::new(tag, move || counter.set(counter.get() + 1));
        (group, idle)
    }

    #[test]
    fn group_goes_idle_after_chained_timers() {
        let (group, idle) = counting_group(1);
        within(Some(group.clone()), || {
            schedule(ms(10), || {
                schedule(ms(10), || {});
            });
        });
        assert!(!group.is_idle());

        advance(ms(10));
        assert_eq!(idle.get(), 0);
        assert!(!group.is_idle());

        advance(ms(10));
        assert_eq!(idle.get(), 1);
        assert!(group.is_idle());
        assert!(current_group().is_none());
    }

    #[test]
    fn cancelled_timers_leave_the_group_quietly() {
        let (group, idle) = counting_group(1);
        let handle = within(Some(group.clone()), || schedule(ms(10), || {}));

        assert!(cancel(handle));
        assert!(group.is_idle());
        advance(ms(20));
        assert_eq!(idle.get(), 0);
    }

    #[test]
    fn nested_groups_keep_the_parent_busy() {
        let (outer, outer_idle) = counting_group(1);
        let (inner, inner_idle) = within(Some(outer.clone()), || counting_group(2));
        within(Some(inner.clone()), || {
            schedule(ms(5), || {});
        });
        assert!(!outer.is_idle());

        advance(ms(5));
        assert_eq!((inner_idle.get(), outer_idle.get()), (1, 1));

        // A group with the parent's tag attaches beside it, not below it.
        let sibling = within(Some(inner), || TaskGroup::new(1, || {}));
        assert!(sibling.parent.is_none());
    }
}
