//! Synchronous operators.
//!
//! Each function returns a [`Stage`]. Pure operators seed their output from
//! the source's current value without firing, so a derived cell is readable
//! right after `transform` returns. `tap` seeds too, but its side effect only
//! runs on live updates.

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use super::stage::{seeded, Stage};
use crate::reactive::ReactiveCell;

/// Apply `f` to every value.
pub fn map<I, O, F>(f: F) -> Stage<I, O>
where
    I: Clone + 'static,
    O: Clone + 'static,
    F: Fn(&I) -> O + 'static,
{
    Stage::new("map", move |source: &ReactiveCell<I>, token| {
        let output = seeded(source.value().map(|v| f(&v)));
        let target = output.clone();
        source.listen(move |v| target.forward(f(v)), Some(token))?;
        Ok(output)
    })
}

/// Project one field out of every value.
pub fn pick<I, O, F>(projection: F) -> Stage<I, O>
where
    I: Clone + 'static,
    O: Clone + 'static,
    F: for<'a> Fn(&'a I) -> &'a O + 'static,
{
    Stage::new("pick", move |source: &ReactiveCell<I>, token| {
        let output = seeded(source.with_value(|v| v.map(|v| projection(v).clone())));
        let target = output.clone();
        source.listen(move |v| target.forward(projection(v).clone()), Some(token))?;
        Ok(output)
    })
}

/// Forward only the values `predicate` accepts.
pub fn filter<T, F>(predicate: F) -> Stage<T, T>
where
    T: Clone + 'static,
    F: Fn(&T) -> bool + 'static,
{
    Stage::new("filter", move |source: &ReactiveCell<T>, token| {
        let output = seeded(source.value().filter(|v| predicate(v)));
        let target = output.clone();
        source.listen(
            move |v| {
                if predicate(v) {
                    target.forward(v.clone());
                }
            },
            Some(token),
        )?;
        Ok(output)
    })
}

/// Drop values equal to the one most recently forwarded.
pub fn unique<T>() -> Stage<T, T>
where
    T: Clone + PartialEq + 'static,
{
    Stage::new("unique", |source: &ReactiveCell<T>, token| {
        let output = seeded(source.value());
        let target = output.clone();
        source.listen(
            move |v| {
                if target.with_value(|current| current != Some(v)) {
                    target.forward(v.clone());
                }
            },
            Some(token),
        )?;
        Ok(output)
    })
}

/// Fold every value into an accumulator starting at `initial`.
pub fn reduce<T, A, F>(initial: A, combine: F) -> Stage<T, A>
where
    T: Clone + 'static,
    A: Clone + 'static,
    F: Fn(&A, &T) -> A + 'static,
{
    Stage::new("reduce", move |source: &ReactiveCell<T>, token| {
        let output = ReactiveCell::new(initial.clone());
        let accumulator = RefCell::new(initial);
        let target = output.clone();
        source.listen(
            move |v| {
                let next = combine(&accumulator.borrow(), v);
                *accumulator.borrow_mut() = next.clone();
                target.forward(next);
            },
            Some(token),
        )?;
        Ok(output)
    })
}

/// Forward nothing while `lock` holds `true`.
///
/// Values arriving while locked are dropped, not replayed on unlock.
pub fn lock<T>(lock: &ReactiveCell<bool>) -> Stage<T, T>
where
    T: Clone + 'static,
{
    let lock = lock.clone();
    Stage::new("lock", move |source: &ReactiveCell<T>, token| {
        let output = seeded(source.value());
        let target = output.clone();
        source.listen(
            move |v| {
                if lock.value() != Some(true) {
                    target.forward(v.clone());
                }
            },
            Some(token),
        )?;
        Ok(output)
    })
}

/// Run `f` on every value and forward it unchanged.
pub fn tap<T, F>(f: F) -> Stage<T, T>
where
    T: Clone + 'static,
    F: Fn(&T) + 'static,
{
    Stage::new("tap", move |source: &ReactiveCell<T>, token| {
        let output = seeded(source.value());
        let target = output.clone();
        source.listen(
            move |v| {
                f(v);
                target.forward(v.clone());
            },
            Some(token),
        )?;
        Ok(output)
    })
}

/// A value together with the one before it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delta<T> {
    pub previous: Option<T>,
    pub current: T,
}

/// Pair every value with its predecessor.
pub fn diff<T>() -> Stage<T, Delta<T>>
where
    T: Clone + 'static,
{
    Stage::new("diff", |source: &ReactiveCell<T>, token| {
        let last = Rc::new(RefCell::new(source.value()));
        let output = seeded(source.value().map(|current| Delta {
            previous: None,
            current,
        }));
        let target = output.clone();
        source.listen(
            move |v| {
                let previous = last.replace(Some(v.clone()));
                target.forward(Delta {
                    previous,
                    current: v.clone(),
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
