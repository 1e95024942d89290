//! Duplex stages.
//!
//! A duplex stage links a source [`DuplexCell`] to a derived one with a
//! forward function (source to result, downstream) and a backward function
//! (result to source, upstream). Writes travelling back up are excluded
//! from the downstream link that carries values the other way, so a value
//! never bounces between the two cells.

use std::borrow::Cow;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::error::Result;
use crate::lifetime::LifetimeToken;
use crate::reactive::DuplexCell;

type Build<I, O> = Box<dyn FnOnce(&DuplexCell<I>, &LifetimeToken) -> Result<DuplexCell<O>>>;

/// A named, two-directional transformation between duplex cells.
pub struct DuplexStage<I: 'static, O: 'static> {
    name: Cow<'static, str>,
    build: Build<I, O>,
}

impl<I: 'static, O: 'static> DuplexStage<I, O> {
    pub fn new<F>(name: impl Into<Cow<'static, str>>, build: F) -> Self
    where
        F: FnOnce(&DuplexCell<I>, &LifetimeToken) -> Result<DuplexCell<O>> + 'static,
    {
        Self {
            name: name.into(),
            build: Box::new(build),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn apply(self, source: &DuplexCell<I>, token: &LifetimeToken) -> Result<DuplexCell<O>> {
        token.ensure_live()?;
        (self.build)(source, token)
    }

    pub fn then<P: 'static>(self, next: DuplexStage<O, P>) -> DuplexStage<I, P> {
        let name = format!("{} > {}", self.name, next.name);
        DuplexStage::new(name, move |source, token| {
            let middle = self.apply(source, token)?;
            next.apply(&middle, token)
        })
    }
}

impl<T: 'static> DuplexStage<T, T> {
    pub fn identity() -> Self {
        DuplexStage::new("identity", |source, _| Ok(source.clone()))
    }
}

impl<I: 'static, O: 'static> fmt::Debug for DuplexStage<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DuplexStage").field("name", &self.name).finish()
    }
}

/// Wire `source` to a new duplex cell.
///
/// `forward` maps downstream values (returning `None` drops them) and
/// `backward` maps upstream values from the result back to the source.
fn link<I, O, F, B>(
    source: &DuplexCell<I>,
    seed: Option<O>,
    forward: F,
    backward: B,
    token: &LifetimeToken,
) -> Result<DuplexCell<O>>
where
    I: Clone + 'static,
    O: Clone + 'static,
    F: Fn(&I) -> Option<O> + 'static,
    B: Fn(&O) -> Option<I> + 'static,
{
    let result = match seed {
        Some(value) => DuplexCell::new(value),
        None => DuplexCell::unset(),
    };

    let target = result.clone();
    let down = source.listen_downstream(
        move |v| {
            if let Some(out) = forward(v) {
                target.forward_downstream(out);
            }
        },
        Some(token),
    )?;

    let origin = source.downgrade();
    let link_id = down.id();
    result.listen_upstream(
        move |v| {
            if let (Some(source), Some(back)) = (origin.upgrade(), backward(v)) {
                source.forward_upstream_excluding(back, link_id);
            }
        },
        Some(token),
    )?;

    Ok(result)
}

/// Map downstream values with `forward` and upstream values with `backward`.
pub fn duplex_map<I, O, F, B>(forward: F, backward: B) -> DuplexStage<I, O>
where
    I: Clone + 'static,
    O: Clone + 'static,
    F: Fn(&I) -> O + 'static,
    B: Fn(&O) -> I + 'static,
{
    DuplexStage::new("duplex_map", move |source: &DuplexCell<I>, token| {
        let seed = source.value().map(|v| forward(&v));
        link(
            source,
            seed,
            move |v| Some(forward(v)),
            move |v| Some(backward(v)),
            token,
        )
    })
}

/// Filter each direction with its own predicate.
pub fn duplex_filter<T, F, B>(downstream: F, upstream: B) -> DuplexStage<T, T>
where
    T: Clone + 'static,
    F: Fn(&T) -> bool + 'static,
    B: Fn(&T) -> bool + 'static,
{
    DuplexStage::new("duplex_filter", move |source: &DuplexCell<T>, token| {
        let seed = source.value().filter(|v| downstream(v));
        link(
            source,
            seed,
            move |v| downstream(v).then(|| v.clone()),
            move |v| upstream(v).then(|| v.clone()),
            token,
        )
    })
}

/// Drop repeated values, tracking the last value of each direction
/// separately.
pub fn duplex_unique<T>() -> DuplexStage<T, T>
where
    T: Clone + PartialEq + 'static,
{
    DuplexStage::new("duplex_unique", |source: &DuplexCell<T>, token| {
        let seed = source.value();
        let last_down = Rc::new(RefCell::new(seed.clone()));
        let last_up: Rc<RefCell<Option<T>>> = Rc::new(RefCell::new(None));
        link(
            source,
            seed,
            move |v| changed(&last_down, v),
            move |v| changed(&last_up, v),
            token,
        )
    })
}

fn changed<T: Clone + PartialEq>(last: &RefCell<Option<T>>, value: &T) -> Option<T> {
    let mut last = last.borrow_mut();
    if last.as_ref() == Some(value) {
        return None;
    }
    *last = Some(value.clone());
    Some(value.clone())
}

/// Observe each direction without changing it.
pub fn duplex_tap<T, F, B>(downstream: F, upstream: B) -> DuplexStage<T, T>
where
    T: Clone + 'static,
    F: Fn(&T) + 'static,
    B: Fn(&T) + 'static,
{
    DuplexStage::new("duplex_tap", move |source: &DuplexCell<T>, token| {
        let seed = source.value();
        link(
            source,
            seed,
            move |v| {
                downstream(v);
                Some(v.clone())
            },
            move |v| {
                upstream(v);
                Some(v.clone())
            },
            token,
        )
    })
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn listen_log(cell: &DuplexCell<i32>, upstream: bool) -> Rc<RefCell<Vec<i32>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        let record = move |v: &i32| sink.borrow_mut().push(*v);
        if upstream {
            cell.listen_upstream(record, None).unwrap();
        } else {
            cell.listen_downstream(record, None).unwrap();
        }
        log
    }

    #[test]
    fn unique_chain_is_echo_safe_in_both_directions() {
        let source = DuplexCell::new(0);
        let result = source
            .transform_duplex(duplex_unique(), None)
            .unwrap();

        let source_up = listen_log(&source, true);
        let source_down = listen_log(&source, false);
        let result_down = listen_log(&result, false);

        let feed = [200, 4, 0, 100, 200];
        for v in feed {
            source.update_downstream(v).unwrap();
        }
        assert_eq!(*result_down.borrow(), feed.to_vec());

        result_down.borrow_mut().clear();
        source_down.borrow_mut().clear();
        for v in feed {
            result.update_upstream(v).unwrap();
        }
        assert_eq!(*source_up.borrow(), feed.to_vec());
        // The link that carried the value up is excluded; other downstream
        // listeners on the source still hear it.
        assert_eq!(*source_down.borrow(), feed.to_vec());
        assert_eq!(*result_down.borrow(), feed.to_vec());
    }

    #[test]
    fn duplex_map_translates_both_ways() {
        let celsius = DuplexCell::new(100.0_f64);
        let fahrenheit = celsius
            .transform_duplex(
                duplex_map(|c: &f64| c * 9.0 / 5.0 + 32.0, |f: &f64| (f - 32.0) * 5.0 / 9.0),
                None,
            )
            .unwrap();
        assert_eq!(fahrenheit.value(), Some(212.0));

        fahrenheit.update_upstream(32.0).unwrap();
        assert_eq!(celsius.value(), Some(0.0));
        assert_eq!(fahrenheit.value(), Some(32.0));

        celsius.update_downstream(-40.0).unwrap();
        assert_eq!(fahrenheit.value(), Some(-40.0));
    }

    #[test]
    fn duplex_filter_applies_per_direction() {
        let source = DuplexCell::new(1);
        let result = source
            .transform_duplex(duplex_filter(|v: &i32| *v > 0, |v: &i32| *v < 100), None)
            .unwrap();
        let up = listen_log(&source, true);

        source.update_downstream(-1).unwrap();
        assert_eq!(result.value(), Some(1));

        result.update_upstream(500).unwrap();
        result.update_upstream(50).unwrap();
        assert_eq!(*up.borrow(), vec![50]);
    }

    #[test]
    fn stages_compose_and_tap_observes() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let (down_seen, up_seen) = (seen.clone(), seen.clone());
        let source = DuplexCell::new(1);
        let result = source
            .transform_duplex(
                duplex_map(|v: &i32| v * 10, |v: &i32| v / 10).then(duplex_tap(
                    move |v: &i32| down_seen.borrow_mut().push(("down", *v)),
                    move |v: &i32| up_seen.borrow_mut().push(("up", *v)),
                )),
                None,
            )
            .unwrap();
        assert_eq!(result.value(), Some(10));

        source.update_downstream(2).unwrap();
        result.update_upstream(70).unwrap();

        assert_eq!(*seen.borrow(), vec![("down", 20), ("up", 70)]);
        assert_eq!(source.value(), Some(7));
    }

    #[test]
    fn cancelling_the_token_unlinks_both_directions() {
        let token = LifetimeToken::new();
        let source = DuplexCell::new(0);
        let result = source
            .transform_duplex(duplex_map(|v: &i32| *v, |v: &i32| *v), Some(&token))
            .unwrap();

        token.cancel();
        source.update_downstream(1).unwrap();
        result.update_upstream(2).unwrap();
        assert_eq!(result.value(), Some(2));
        assert_eq!(source.value(), Some(1));
    }
}
