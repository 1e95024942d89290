//! Derived sequence views.
//!
//! Sorted, filtered and mapped views are ordinary sequences kept up to date
//! by patching them with each parent change record. They never rescan the
//! parent on a normal edit; a rescan happens only for `merge` records and
//! when one of the view's triggers fires (for predicates or comparators
//! that read other reactive state).

use std::cmp::Ordering;
use std::rc::Rc;

use super::change::{OperationDetail, SequenceChange};
use super::sequence::ReactiveSequence;
use crate::error::{fail_fast, Result};
use crate::graph::ChangeSource;
use crate::lifetime::LifetimeToken;

fn settle<R>(result: Result<R>) {
    if let Err(err) = result {
        fail_fast(err);
    }
}

impl<T: Clone + PartialEq + 'static> ReactiveSequence<T> {
    /// A live view of this sequence ordered by `comparator`.
    ///
    /// Equal items keep their insertion order. Swaps in the parent are
    /// ignored; the comparator owns the order.
    pub fn sort<C>(&self, comparator: C, token: Option<&LifetimeToken>) -> Result<ReactiveSequence<T>>
    where
        C: Fn(&T, &T) -> Ordering + 'static,
    {
        self.sort_with_triggers(comparator, &[], token)
    }

    /// Like [`sort`](Self::sort), re-sorting from scratch whenever any of
    /// `triggers` changes.
    pub fn sort_with_triggers<C>(
        &self,
        comparator: C,
        triggers: &[&dyn ChangeSource],
        token: Option<&LifetimeToken>,
    ) -> Result<ReactiveSequence<T>>
    where
        C: Fn(&T, &T) -> Ordering + 'static,
    {
        let comparator: Rc<dyn Fn(&T, &T) -> Ordering> = Rc::new(comparator);
        let view = ReactiveSequence::from_vec(sorted(self.to_vec(), &*comparator));

        {
            let (view, comparator) = (view.clone(), comparator.clone());
            self.listen(
                move |change| patch_sorted(&view, &*comparator, change),
                token,
            )?;
        }

        for trigger in triggers {
            let (parent, view, comparator) = (self.clone(), view.clone(), comparator.clone());
            trigger.on_change(
                Rc::new(move || settle(view.merge(sorted(parent.to_vec(), &*comparator)))),
                token,
            )?;
        }

        Ok(view)
    }

    /// A live view holding only the items `predicate` accepts, in parent
    /// order.
    pub fn filter<P>(&self, predicate: P, token: Option<&LifetimeToken>) -> Result<ReactiveSequence<T>>
    where
        P: Fn(&T) -> bool + 'static,
    {
        self.filter_with_triggers(predicate, &[], token)
    }

    /// Like [`filter`](Self::filter), re-filtering from scratch whenever any
    /// of `triggers` changes.
    pub fn filter_with_triggers<P>(
        &self,
        predicate: P,
        triggers: &[&dyn ChangeSource],
        token: Option<&LifetimeToken>,
    ) -> Result<ReactiveSequence<T>>
    where
        P: Fn(&T) -> bool + 'static,
    {
        let predicate: Rc<dyn Fn(&T) -> bool> = Rc::new(predicate);
        let view = ReactiveSequence::from_vec(self.with(|items| passing(items, &*predicate)));

        {
            let (view, predicate) = (view.clone(), predicate.clone());
            self.listen(
                move |change| patch_filtered(&view, &*predicate, change),
                token,
            )?;
        }

        for trigger in triggers {
            let (parent, view, predicate) = (self.clone(), view.clone(), predicate.clone());
            trigger.on_change(
                Rc::new(move || settle(view.merge(parent.with(|items| passing(items, &*predicate))))),
                token,
            )?;
        }

        Ok(view)
    }
}

impl<T: Clone + 'static> ReactiveSequence<T> {
    /// A live view with `f` applied to every item, mirroring the parent's
    /// edits one for one.
    pub fn map_items<U, F>(&self, f: F, token: Option<&LifetimeToken>) -> Result<ReactiveSequence<U>>
    where
        U: Clone + PartialEq + 'static,
        F: Fn(&T) -> U + 'static,
    {
        let view = ReactiveSequence::from_vec(self.with(|items| items.iter().map(&f).collect()));
        let target = view.clone();
        self.listen(move |change| mirror_mapped(&target, &f, change), token)?;
        Ok(view)
    }
}

// ----------------------------------------------------------------------------
// Sorted
// ----------------------------------------------------------------------------

fn sorted<T>(mut items: Vec<T>, comparator: &dyn Fn(&T, &T) -> Ordering) -> Vec<T> {
    items.sort_by(|a, b| comparator(a, b));
    items
}

fn insert_sorted<T: Clone + PartialEq>(
    view: &ReactiveSequence<T>,
    comparator: &dyn Fn(&T, &T) -> Ordering,
    item: &T,
) {
    let index = view.with(|items| {
        items.partition_point(|existing| comparator(existing, item) != Ordering::Greater)
    });
    settle(view.insert_at(index, item.clone()));
}

fn patch_sorted<T: Clone + PartialEq>(
    view: &ReactiveSequence<T>,
    comparator: &dyn Fn(&T, &T) -> Ordering,
    change: &SequenceChange<T>,
) {
    match change.operation_detailed {
        OperationDetail::Append | OperationDetail::Prepend | OperationDetail::Insert => {
            for item in &change.items {
                insert_sorted(view, comparator, item);
            }
        }
        OperationDetail::RemoveLeft | OperationDetail::RemoveRight | OperationDetail::Remove => {
            for item in &change.items {
                settle(view.remove(item));
            }
        }
        OperationDetail::Clear => settle(view.clear()),
        OperationDetail::Replace => {
            if let Some(old) = &change.target {
                settle(view.remove(old));
            }
            for item in &change.items {
                insert_sorted(view, comparator, item);
            }
        }
        OperationDetail::Swap => {}
        OperationDetail::Merge => settle(view.merge(sorted(change.new_state.to_vec(), comparator))),
    }
}

// ----------------------------------------------------------------------------
// Filtered
// ----------------------------------------------------------------------------

fn passing<T: Clone>(items: &[T], predicate: &dyn Fn(&T) -> bool) -> Vec<T> {
    items.iter().filter(|item| predicate(item)).cloned().collect()
}

/// Position in the view of parent position `index`.
fn view_index<T>(state: &[T], index: usize, predicate: &dyn Fn(&T) -> bool) -> usize {
    state[..index.min(state.len())]
        .iter()
        .filter(|item| predicate(item))
        .count()
}

fn patch_filtered<T: Clone + PartialEq>(
    view: &ReactiveSequence<T>,
    predicate: &dyn Fn(&T) -> bool,
    change: &SequenceChange<T>,
) {
    let before = |index: usize| view_index(&change.previous_state, index, predicate);
    let after = |index: usize| view_index(&change.new_state, index, predicate);

    match change.operation_detailed {
        OperationDetail::Append | OperationDetail::Prepend | OperationDetail::Insert => {
            let accepted = passing(&change.items, predicate);
            if !accepted.is_empty() {
                settle(view.insert_all_at(after(change.index), accepted));
            }
        }
        OperationDetail::RemoveLeft | OperationDetail::RemoveRight | OperationDetail::Remove => {
            let start = before(change.index);
            let count = change.items.iter().filter(|item| predicate(item)).count();
            settle(view.remove_range(start, start + count));
        }
        OperationDetail::Clear => settle(view.clear()),
        OperationDetail::Replace => {
            let index = before(change.index);
            let was = change.target.as_ref().is_some_and(|old| predicate(old));
            let Some(item) = change.items.first() else {
                return;
            };
            match (was, predicate(item)) {
                (true, true) => settle(view.set(index, item.clone())),
                (true, false) => settle(view.remove_at(index)),
                (false, true) => settle(view.insert_at(index, item.clone())),
                (false, false) => {}
            }
        }
        OperationDetail::Swap => {
            let (i, Some(j)) = (change.index, change.index2) else {
                return;
            };
            let (Some(a), Some(b)) = (change.previous_state.get(i), change.previous_state.get(j))
            else {
                return;
            };
            match (predicate(a), predicate(b)) {
                (true, true) => settle(view.swap(before(i), before(j))),
                (true, false) => move_within(view, before(i), after(j)),
                (false, true) => move_within(view, before(j), after(i)),
                (false, false) => {}
            }
        }
        OperationDetail::Merge => {
            settle(view.merge(passing(&change.new_state, predicate)));
        }
    }
}

fn move_within<T: Clone + PartialEq>(view: &ReactiveSequence<T>, from: usize, to: usize) {
    if from == to {
        return;
    }
    match view.remove_at(from) {
        Ok(item) => settle(view.insert_at(to, item)),
        Err(err) => fail_fast(err),
    }
}

// ----------------------------------------------------------------------------
// Mapped
// ----------------------------------------------------------------------------

fn mirror_mapped<T, U, F>(view: &ReactiveSequence<U>, f: &F, change: &SequenceChange<T>)
where
    U: Clone + PartialEq + 'static,
    F: Fn(&T) -> U,
{
    let mapped = || change.items.iter().map(f).collect::<Vec<U>>();
    match change.operation_detailed {
        OperationDetail::Append => settle(view.push_all(mapped())),
        OperationDetail::Prepend => settle(view.unshift_all(mapped())),
        OperationDetail::Insert => settle(view.insert_all_at(change.index, mapped())),
        OperationDetail::RemoveLeft => settle(view.remove_left(change.count)),
        OperationDetail::RemoveRight => settle(view.remove_right(change.count)),
        OperationDetail::Remove => {
            settle(view.remove_range(change.index, change.index + change.count))
        }
        OperationDetail::Clear => settle(view.clear()),
        OperationDetail::Replace => {
            if let Some(item) = mapped().pop() {
                settle(view.set(change.index, item));
            }
        }
        OperationDetail::Swap => {
            if let Some(j) = change.index2 {
                settle(view.swap(change.index, j));
            }
        }
        OperationDetail::Merge => settle(view.merge(change.new_state.iter().map(f).collect())),
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::ReactiveCell;
    use std::cell::RefCell;

    #[test]
    fn sorted_view_inserts_in_place() {
        let parent = ReactiveSequence::from_vec(vec![5, 1, 3]);
        let view = parent.sort(|a: &i32, b: &i32| a.cmp(b), None).unwrap();
        assert_eq!(view.to_vec(), vec![1, 3, 5]);

        let edits = Rc::new(RefCell::new(Vec::new()));
        let sink = edits.clone();
        view.listen(move |c| sink.borrow_mut().push(c.operation_detailed), None)
            .unwrap();

        parent.push(4).unwrap();
        assert_eq!(view.to_vec(), vec![1, 3, 4, 5]);
        assert_eq!(*edits.borrow(), vec![OperationDetail::Insert]);
    }

    #[test]
    fn sorted_view_ignores_swaps_and_resorts_replacements() {
        let parent = ReactiveSequence::from_vec(vec![2, 8, 4]);
        let view = parent.sort(|a: &i32, b: &i32| a.cmp(b), None).unwrap();

        parent.swap(0, 2).unwrap();
        assert_eq!(view.to_vec(), vec![2, 4, 8]);

        parent.set(1, 0).unwrap();
        assert_eq!(view.to_vec(), vec![0, 2, 4]);

        parent.remove(&4).unwrap();
        parent.merge(vec![9, 7]).unwrap();
        assert_eq!(view.to_vec(), vec![7, 9]);
    }

    #[test]
    fn sorted_view_rescans_on_trigger() {
        let descending = ReactiveCell::new(false);
        let parent = ReactiveSequence::from_vec(vec![1, 3, 2]);
        let flag = descending.clone();
        let view = parent
            .sort_with_triggers(
                move |a: &i32, b: &i32| {
                    if flag.value() == Some(true) {
                        b.cmp(a)
                    } else {
                        a.cmp(b)
                    }
                },
                &[&descending],
                None,
            )
            .unwrap();
        assert_eq!(view.to_vec(), vec![1, 2, 3]);

        descending.update(true).unwrap();
        assert_eq!(view.to_vec(), vec![3, 2, 1]);
    }

    #[test]
    fn filtered_view_patches_positions() {
        let parent = ReactiveSequence::from_vec(vec![1, 2, 3, 4]);
        let even = parent.filter(|v: &i32| v % 2 == 0, None).unwrap();
        assert_eq!(even.to_vec(), vec![2, 4]);

        parent.insert_at(1, 10).unwrap();
        assert_eq!(even.to_vec(), vec![10, 2, 4]);

        parent.remove_range(0, 3).unwrap();
        assert_eq!(even.to_vec(), vec![4]);

        parent.set(0, 6).unwrap();
        assert_eq!(even.to_vec(), vec![6, 4]);

        parent.set(0, 5).unwrap();
        assert_eq!(even.to_vec(), vec![4]);
    }

    #[test]
    fn filtered_view_translates_swaps() {
        let parent = ReactiveSequence::from_vec(vec![2, 1, 4, 3]);
        let even = parent.filter(|v: &i32| v % 2 == 0, None).unwrap();

        parent.swap(0, 2).unwrap();
        assert_eq!(even.to_vec(), vec![4, 2]);

        parent.swap(0, 3).unwrap();
        assert_eq!(parent.to_vec(), vec![3, 1, 2, 4]);
        assert_eq!(even.to_vec(), vec![2, 4]);

        parent.swap(0, 1).unwrap();
        assert_eq!(even.to_vec(), vec![2, 4]);
    }

    #[test]
    fn filtered_view_follows_trigger() {
        let threshold = ReactiveCell::new(2);
        let parent = ReactiveSequence::from_vec(vec![1, 2, 3, 4]);
        let limit = threshold.clone();
        let above = parent
            .filter_with_triggers(
                move |v: &i32| Some(*v) > limit.value(),
                &[&threshold],
                None,
            )
            .unwrap();
        assert_eq!(above.to_vec(), vec![3, 4]);

        threshold.update(0).unwrap();
        assert_eq!(above.to_vec(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn mapped_view_mirrors_every_edit() {
        let parent = ReactiveSequence::from_vec(vec![1, 2]);
        let labels = parent.map_items(|v: &i32| format!("#{v}"), None).unwrap();

        parent.unshift(0).unwrap();
        parent.swap(0, 2).unwrap();
        parent.pop().unwrap();
        parent.set(0, 7).unwrap();

        assert_eq!(labels.to_vec(), vec!["#7", "#1"]);
    }

    #[test]
    fn cancelled_token_freezes_the_view() {
        let token = LifetimeToken::new();
        let parent = ReactiveSequence::from_vec(vec![3, 1]);
        let view = parent.sort(|a: &i32, b: &i32| a.cmp(b), Some(&token)).unwrap();

        token.cancel();
        parent.push(0).unwrap();
        assert_eq!(view.to_vec(), vec![1, 3]);
    }
}
