//! Conditional branching.

use super::stage::{seeded, Stage};
use crate::reactive::ReactiveCell;

/// Route each value through `matched` or `unmatched` depending on
/// `predicate`. Both branches feed the same output cell.
pub fn fork<T, U, P>(predicate: P, matched: Stage<T, U>, unmatched: Stage<T, U>) -> Stage<T, U>
where
    T: Clone + 'static,
    U: Clone + 'static,
    P: Fn(&T) -> bool + 'static,
{
    let name = format!("fork({} | {})", matched.name(), unmatched.name());
    Stage::new(name, move |source: &ReactiveCell<T>, token| {
        let current = source.value();
        let hits = current.as_ref().map(|v| predicate(v));

        let matched_entry = seeded(current.clone().filter(|_| hits == Some(true)));
        let unmatched_entry = seeded(current.filter(|_| hits == Some(false)));
        let matched_exit = matched.apply(&matched_entry, token)?;
        let unmatched_exit = unmatched.apply(&unmatched_entry, token)?;

        let output = match hits {
            Some(true) => seeded(matched_exit.value()),
            Some(false) => seeded(unmatched_exit.value()),
            None => ReactiveCell::unset(),
        };
        matched_exit.pipe(&output, Some(token))?;
        unmatched_exit.pipe(&output, Some(token))?;

        source.listen(
            move |v| {
                if predicate(v) {
                    matched_entry.forward(v.clone());
                } else {
                    unmatched_entry.forward(v.clone());
                }
            },
            Some(token),
        )?;
        Ok(output)
    })
}

/// Run `matched` only for values accepted by `predicate`; every other value
/// passes through unchanged.
pub fn fork_inline<T, P>(predicate: P, matched: Stage<T, T>) -> Stage<T, T>
where
    T: Clone + 'static,
    P: Fn(&T) -> bool + 'static,
{
    fork(predicate, matched, Stage::identity())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::operators::map;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn fork_inline_transforms_matching_values_only() {
        let source = ReactiveCell::new(1);
        let out = source
            .transform(fork_inline(|v: &i32| *v < 0, map(|v: &i32| -v)), None)
            .unwrap();
        assert_eq!(out.value(), Some(1));

        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        out.listen(move |v| sink.borrow_mut().push(*v), None).unwrap();

        for v in [-3, 4, -5] {
            source.update(v).unwrap();
        }
        assert_eq!(*log.borrow(), vec![3, 4, 5]);
    }

    #[test]
    fn fork_routes_into_two_branches() {
        let source = ReactiveCell::new(2);
        let out = source
            .transform(
                fork(
                    |v: &i32| v % 2 == 0,
                    map(|v: &i32| format!("even {v}")),
                    map(|v: &i32| format!("odd {v}")),
                ),
                None,
            )
            .unwrap();
        assert_eq!(out.value().as_deref(), Some("even 2"));

        source.update(7).unwrap();
        assert_eq!(out.value().as_deref(), Some("odd 7"));
    }
}
