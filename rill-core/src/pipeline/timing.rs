//! Time-based operators.
//!
//! These stages queue work on the thread's [`timer`] queue, so their output
//! is observed only once the clock moves. Each stage registers a single
//! cleanup on the chain token that cancels whatever it still has pending.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use super::stage::{seeded, Stage};
use crate::error::Result;
use crate::lifetime::{timer, LifetimeToken, TimerHandle};
use crate::reactive::ReactiveCell;

/// Timers owned by one stage instance.
#[derive(Clone, Default)]
struct PendingTimers(Rc<RefCell<Vec<TimerHandle>>>);

impl PendingTimers {
    fn bound_to(token: &LifetimeToken) -> Result<Self> {
        let timers = Self::default();
        let owned = timers.clone();
        token.add_cleanup(move || owned.cancel_all())?;
        Ok(timers)
    }

    fn schedule<F>(&self, delay: Duration, task: F)
    where
        F: FnOnce() + 'static,
    {
        let own: Rc<Cell<Option<TimerHandle>>> = Rc::new(Cell::new(None));
        let (timers, slot) = (self.clone(), own.clone());
        let handle = timer::schedule(delay, move || {
            if let Some(handle) = slot.get() {
                timers.forget(handle);
            }
            task();
        });
        own.set(Some(handle));
        self.0.borrow_mut().push(handle);
    }

    fn forget(&self, handle: TimerHandle) {
        self.0.borrow_mut().retain(|pending| *pending != handle);
    }

    fn cancel_all(&self) {
        for handle in self.0.borrow_mut().drain(..) {
            timer::cancel(handle);
        }
    }

    fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }
}

/// Forward a value once `quiet` has passed without another one arriving.
pub fn debounce<T>(quiet: Duration) -> Stage<T, T>
where
    T: Clone + 'static,
{
    Stage::new("debounce", move |source: &ReactiveCell<T>, token| {
        let output = seeded(source.value());
        let timers = PendingTimers::bound_to(token)?;
        let target = output.clone();
        source.listen(
            move |v| {
                timers.cancel_all();
                let (target, v) = (target.clone(), v.clone());
                timers.schedule(quiet, move || target.forward(v));
            },
            Some(token),
        )?;
        Ok(output)
    })
}

/// Forward every value `by` later.
pub fn delay<T>(by: Duration) -> Stage<T, T>
where
    T: Clone + 'static,
{
    Stage::new("delay", move |source: &ReactiveCell<T>, token| {
        let output = seeded(source.value());
        let timers = PendingTimers::bound_to(token)?;
        let target = output.clone();
        source.listen(
            move |v| {
                let (target, v) = (target.clone(), v.clone());
                timers.schedule(by, move || target.forward(v));
            },
            Some(token),
        )?;
        Ok(output)
    })
}

/// Forward a value, then drop everything else for `window`.
pub fn throttle<T>(window: Duration) -> Stage<T, T>
where
    T: Clone + 'static,
{
    Stage::new("throttle", move |source: &ReactiveCell<T>, token| {
        let output = seeded(source.value());
        let timers = PendingTimers::bound_to(token)?;
        let target = output.clone();
        source.listen(
            move |v| {
                if !timers.is_empty() {
                    return;
                }
                timers.schedule(window, || {});
                target.forward(v.clone());
            },
            Some(token),
        )?;
        Ok(output)
    })
}

/// Collect values for `window` after the first one arrives, then emit them
/// as one batch.
pub fn buffer<T>(window: Duration) -> Stage<T, Vec<T>>
where
    T: Clone + 'static,
{
    Stage::new("buffer", move |source: &ReactiveCell<T>, token| {
        let output = ReactiveCell::unset();
        let timers = PendingTimers::bound_to(token)?;
        let batch: Rc<RefCell<Vec<T>>> = Rc::new(RefCell::new(Vec::new()));
        let target = output.clone();
        source.listen(
            move |v| {
                batch.borrow_mut().push(v.clone());
                if !timers.is_empty() {
                    return;
                }
                let (target, batch) = (target.clone(), batch.clone());
                timers.schedule(window, move || {
                    let items = std::mem::take(&mut *batch.borrow_mut());
                    tracing::trace!(items = items.len(), "flushing buffer");
                    target.forward(items);
                });
            },
            Some(token),
        )?;
        Ok(output)
    })
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn fired<T: Clone + 'static>(cell: &ReactiveCell<T>) -> Rc<RefCell<Vec<T>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        cell.listen(move |v| sink.borrow_mut().push(v.clone()), None)
            .unwrap();
        log
    }

    #[test]
    fn debounce_waits_for_quiet() {
        let source = ReactiveCell::new(0);
        let out = source.transform(debounce(ms(100)), None).unwrap();
        let log = fired(&out);

        source.update(1).unwrap();
        timer::advance(ms(60));
        source.update(2).unwrap();
        timer::advance(ms(60));
        assert!(log.borrow().is_empty());

        timer::advance(ms(40));
        assert_eq!(*log.borrow(), vec![2]);
        assert_eq!(timer::pending(), 0);
    }

    #[test]
    fn delay_preserves_every_value() {
        let source = ReactiveCell::new(0);
        let out = source.transform(delay(ms(20)), None).unwrap();
        let log = fired(&out);

        source.update(1).unwrap();
        timer::advance(ms(10));
        source.update(2).unwrap();
        timer::advance(ms(10));
        assert_eq!(*log.borrow(), vec![1]);

        timer::advance(ms(10));
        assert_eq!(*log.borrow(), vec![1, 2]);
    }

    #[test]
    fn cancelling_the_chain_cancels_pending_timers() {
        let token = LifetimeToken::new();
        let source = ReactiveCell::new(0);
        let out = source.transform(delay(ms(20)), Some(&token)).unwrap();
        let log = fired(&out);

        source.update(1).unwrap();
        assert_eq!(timer::pending(), 1);
        token.cancel();
        assert_eq!(timer::pending(), 0);

        timer::advance(ms(50));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn throttle_forwards_the_leading_value() {
        let source = ReactiveCell::new(0);
        let out = source.transform(throttle(ms(50)), None).unwrap();
        let log = fired(&out);

        source.update(1).unwrap();
        source.update(2).unwrap();
        timer::advance(ms(50));
        source.update(3).unwrap();

        assert_eq!(*log.borrow(), vec![1, 3]);
    }

    #[test]
    fn buffer_emits_batches() {
        let source = ReactiveCell::new(0);
        let out = source.transform(buffer(ms(30)), None).unwrap();
        assert!(!out.is_set());
        let log = fired(&out);

        source.update(1).unwrap();
        source.update(2).unwrap();
        timer::advance(ms(30));
        source.update(3).unwrap();
        timer::advance(ms(30));

        assert_eq!(*log.borrow(), vec![vec![1, 2], vec![3]]);
    }
}
