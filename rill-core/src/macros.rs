// ============================================================================
// rill-core - Stage Composition Macros
// ============================================================================

/// Compose pipeline stages left to right.
///
/// `chain!(a, b, c)` is `a.then(b).then(c)`.
///
/// # Usage
///
/// ```rust
/// use rill_core::{chain, ReactiveCell};
/// use rill_core::pipeline::operators::{filter, map, unique};
///
/// let source = ReactiveCell::new(1);
/// let out = source
///     .transform(chain!(map(|v: &i32| v * 2), filter(|v: &i32| *v > 0), unique()), None)
///     .unwrap();
///
/// source.update(3).unwrap();
/// assert_eq!(out.value(), Some(6));
/// ```
#[macro_export]
macro_rules! chain {
    // Case 1: A single stage
    ($first:expr $(,)?) => {
        $first
    };
    // Case 2: Several stages
    ($first:expr, $($rest:expr),+ $(,)?) => {
        $first$(.then($rest))+
    };
}
