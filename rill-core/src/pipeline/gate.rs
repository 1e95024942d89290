//! Critical section (transaction gate).
//!
//! Wraps an inner stage chain so that at most one value is travelling
//! through it at a time. A value that arrives while the chain is busy is
//! parked as the single pending value, replacing any value parked before
//! it.
//!
//! Each admitted value starts a run. The run ends when the chain emits, or
//! when the chain has settled without emitting: the synchronous pass has
//! returned and every timer it armed (directly or through other timers) has
//! fired or been cancelled. The parked value is admitted when the run ends.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use super::stage::{seeded, Stage};
use crate::lifetime::timer::{self, TaskGroup};
use crate::reactive::ReactiveCell;

struct Gate<T: 'static> {
    this: Weak<Gate<T>>,
    entry: ReactiveCell<T>,
    busy: Cell<bool>,
    admitting: Cell<bool>,
    /// Sequence number of the latest admitted value.
    run: Cell<u64>,
    pending: RefCell<Option<T>>,
}

impl<T: Clone + 'static> Gate<T> {
    fn offer(&self, value: T) {
        if self.busy.get() {
            tracing::trace!(entry = %self.entry.id(), "critical section busy, parking value");
        }
        *self.pending.borrow_mut() = Some(value);
        self.drain();
    }

    fn drain(&self) {
        if self.admitting.replace(true) {
            return;
        }
        while !self.busy.get() {
            let Some(value) = self.pending.borrow_mut().take() else {
                break;
            };
            let run = self.run.get() + 1;
            self.run.set(run);
            self.busy.set(true);
            tracing::trace!(entry = %self.entry.id(), run, "critical section admitting value");

            let gate = self.this.clone();
            let group = TaskGroup::new(self.entry.id().raw(), move || {
                if let Some(gate) = gate.upgrade() {
                    gate.finish(run);
                }
            });
            timer::within(Some(group.clone()), || self.entry.forward(value));
            if group.is_idle() {
                self.end_run(run);
            }
        }
        self.admitting.set(false);
    }

    /// Close `run` if it is still in flight. Returns whether it was.
    fn end_run(&self, run: u64) -> bool {
        let in_flight = self.busy.get() && self.run.get() == run;
        if in_flight {
            tracing::trace!(entry = %self.entry.id(), run, "critical section run finished");
            self.busy.set(false);
        }
        in_flight
    }

    fn finish(&self, run: u64) {
        if self.end_run(run) {
            self.drain();
        }
    }
}

/// Run `inner` with at most one value in flight, last value wins.
pub fn critical_section<T, U>(inner: Stage<T, U>) -> Stage<T, U>
where
    T: Clone + 'static,
    U: Clone + 'static,
{
    let name = format!("critical_section({})", inner.name());
    Stage::new(name, move |source: &ReactiveCell<T>, token| {
        let entry = seeded(source.value());
        let exit = inner.apply(&entry, token)?;
        let output = seeded(exit.value());

        let gate = Rc::new_cyclic(|this| Gate {
            this: this.clone(),
            entry,
            busy: Cell::new(false),
            admitting: Cell::new(false),
            run: Cell::new(0),
            pending: RefCell::new(None),
        });

        {
            let (gate, target) = (gate.clone(), output.clone());
            exit.listen(
                move |v| {
                    target.forward(v.clone());
                    gate.finish(gate.run.get());
                },
                Some(token),
            )?;
        }
        source.listen(move |v| gate.offer(v.clone()), Some(token))?;

        Ok(output)
    })
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
