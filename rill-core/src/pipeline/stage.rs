//! Pipeline stages.
//!
//! A `Stage<I, O>` is a deferred constructor: given a source cell and the
//! chain's lifetime token it builds the derived cell. Nothing is subscribed
//! until the stage is applied, so stages can be built, composed and handed
//! around freely.

use std::borrow::Cow;
use std::fmt;

use crate::error::Result;
use crate::lifetime::LifetimeToken;
use crate::reactive::ReactiveCell;

type Build<I, O> = Box<dyn FnOnce(&ReactiveCell<I>, &LifetimeToken) -> Result<ReactiveCell<O>>>;

/// A named transformation from one cell's updates to another's.
pub struct Stage<I: 'static, O: 'static> {
    name: Cow<'static, str>,
    build: Build<I, O>,
}

impl<I: 'static, O: 'static> Stage<I, O> {
    pub fn new<F>(name: impl Into<Cow<'static, str>>, build: F) -> Self
    where
        F: FnOnce(&ReactiveCell<I>, &LifetimeToken) -> Result<ReactiveCell<O>> + 'static,
    {
        Self {
            name: name.into(),
            build: Box::new(build),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Build the derived cell. Every subscription the stage makes is
    /// registered on `token`.
    pub fn apply(self, source: &ReactiveCell<I>, token: &LifetimeToken) -> Result<ReactiveCell<O>> {
        token.ensure_live()?;
        (self.build)(source, token)
    }

    /// Feed this stage's output into `next`.
    pub fn then<P: 'static>(self, next: Stage<O, P>) -> Stage<I, P> {
        let name = format!("{} > {}", self.name, next.name);
        Stage::new(name, move |source, token| {
            let middle = self.apply(source, token)?;
            next.apply(&middle, token)
        })
    }
}

impl<T: 'static> Stage<T, T> {
    /// The stage that returns its source unchanged.
    pub fn identity() -> Self {
        Stage::new("identity", |source, _| Ok(source.clone()))
    }
}

impl<I: 'static, O: 'static> fmt::Debug for Stage<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage").field("name", &self.name).finish()
    }
}

/// A cell holding `value` if there is one.
pub(crate) fn seeded<T: 'static>(value: Option<T>) -> ReactiveCell<T> {
    match value {
        Some(value) => ReactiveCell::new(value),
        None => ReactiveCell::unset(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::operators::{filter, map};

    #[test]
    fn then_composes_left_to_right() {
        let stage = map(|v: &i32| v + 1).then(map(|v: &i32| v * 10));
        assert_eq!(stage.name(), "map > map");

        let source = ReactiveCell::new(1);
        let out = source.transform(stage, None).unwrap();
        assert_eq!(out.value(), Some(20));

        source.update(2).unwrap();
        assert_eq!(out.value(), Some(30));
    }

    #[test]
    fn identity_is_the_source() {
        let source = ReactiveCell::new(5);
        let out = source.transform(Stage::identity(), None).unwrap();
        assert_eq!(out.id(), source.id());
    }

    #[test]
    fn chain_token_tears_down_every_stage() {
        let token = LifetimeToken::new();
        let source = ReactiveCell::new(0);
        let out = source
            .transform(
                map(|v: &i32| v * 2).then(filter(|v: &i32| *v > 0)),
                Some(&token),
            )
            .unwrap();

        source.update(3).unwrap();
        assert_eq!(out.value(), Some(6));

        token.cancel();
        source.update(4).unwrap();
        assert_eq!(out.value(), Some(6));
        assert_eq!(source.subscriber_count(), 0);
    }

    #[test]
    fn applying_on_cancelled_token_fails() {
        let token = LifetimeToken::new();
        token.cancel();
        let source = ReactiveCell::new(0);
        assert!(source.transform(map(|v: &i32| *v), Some(&token)).is_err());
    }
}
