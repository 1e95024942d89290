//! Channel adapter.
//!
//! A `Stream` is an input cell paired with the output cell a stage chain
//! derives from it. Callers push requests into the input and observe
//! results on the output, which may arrive later if the chain contains
//! timing stages.

use super::cell::ReactiveCell;
use super::subscriber::Subscription;
use crate::error::Result;
use crate::lifetime::LifetimeToken;
use crate::pipeline::{operators, Stage};

pub struct Stream<I: 'static, O: 'static> {
    input: ReactiveCell<I>,
    output: ReactiveCell<O>,
}

impl<I: Clone + 'static, O: Clone + 'static> Stream<I, O> {
    /// Pair two existing cells. The caller is responsible for wiring them.
    pub fn from_cells(input: ReactiveCell<I>, output: ReactiveCell<O>) -> Self {
        Self { input, output }
    }

    /// A stream whose output is `f` applied to each input.
    pub fn from_function<F>(f: F, token: Option<&LifetimeToken>) -> Result<Self>
    where
        F: Fn(&I) -> O + 'static,
    {
        Self::from_stage(operators::map(f), token)
    }

    /// A stream whose output is the input threaded through `stage`.
    pub fn from_stage(stage: Stage<I, O>, token: Option<&LifetimeToken>) -> Result<Self> {
        let input = ReactiveCell::unset();
        let output = input.transform(stage, token)?;
        Ok(Self { input, output })
    }

    /// Feed a value into the stream.
    pub fn update(&self, value: I) -> Result<()> {
        self.input.update(value)
    }

    pub fn listen<F>(&self, callback: F, token: Option<&LifetimeToken>) -> Result<Subscription>
    where
        F: Fn(&O) + 'static,
    {
        self.output.listen(callback, token)
    }

    pub fn listen_and_repeat<F>(
        &self,
        callback: F,
        token: Option<&LifetimeToken>,
    ) -> Result<Subscription>
    where
        F: Fn(&O) + 'static,
    {
        self.output.listen_and_repeat(callback, token)
    }

    /// The latest output.
    pub fn value(&self) -> Option<O> {
        self.output.value()
    }

    pub fn input(&self) -> &ReactiveCell<I> {
        &self.input
    }

    pub fn output(&self) -> &ReactiveCell<O> {
        &self.output
    }

    /// Extend the stream's output with another stage chain.
    pub fn transform<U: Clone + 'static>(
        &self,
        stage: Stage<O, U>,
        token: Option<&LifetimeToken>,
    ) -> Result<Stream<I, U>> {
        let output = self.output.transform(stage, token)?;
        Ok(Stream {
            input: self.input.clone(),
            output,
        })
    }
}

impl<I: 'static, O: 'static> Clone for Stream<I, O> {
    fn clone(&self) -> Self {
        Self {
            input: self.input.clone(),
            output: self.output.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifetime::timer;
    use crate::pipeline::timing;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    #[test]
    fn function_stream_maps_requests() {
        let stream = Stream::from_function(|n: &i32| n * 10, None).unwrap();
        assert_eq!(stream.value(), None);

        stream.update(4).unwrap();
        assert_eq!(stream.value(), Some(40));
    }

    #[test]
    fn delayed_stream_answers_later() {
        let stream: Stream<&'static str, &'static str> =
            Stream::from_stage(timing::delay(Duration::from_millis(50)), None).unwrap();
        let replies = Rc::new(RefCell::new(Vec::new()));
        let sink = replies.clone();
        stream.listen(move |r| sink.borrow_mut().push(*r), None).unwrap();

        stream.update("ping").unwrap();
        assert!(replies.borrow().is_empty());

        timer::advance(Duration::from_millis(50));
        assert_eq!(*replies.borrow(), vec!["ping"]);
    }

    #[test]
    fn transform_keeps_the_same_input() {
        let stream = Stream::from_function(|n: &i32| n + 1, None).unwrap();
        let doubled = stream
            .transform(operators::map(|n: &i32| n * 2), None)
            .unwrap();

        stream.update(1).unwrap();
        assert_eq!(stream.value(), Some(2));
        assert_eq!(doubled.value(), Some(4));
        assert_eq!(doubled.input().id(), stream.input().id());
    }
}
