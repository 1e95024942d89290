// ============================================================================
// rill-core - Render Values
// The closed set of shapes a renderer can turn into text or class names
// ============================================================================

use serde::{Deserialize, Serialize};

use crate::pipeline::{map, Stage};

// =============================================================================
// RENDER VALUE
// =============================================================================

/// A value on its way to a renderer.
///
/// Conversion into this type happens once, where a model value crosses into
/// presentation. Text and class-list rendering then match on the variant
/// instead of inspecting the value again at every use.
///
/// # Example
///
/// ```
/// use rill_core::graph::RenderValue;
///
/// let classes = RenderValue::from(vec![
///     RenderValue::from("button primary"),
///     RenderValue::from(false),
///     RenderValue::from(vec!["wide"]),
/// ]);
/// assert_eq!(classes.class_list(), vec!["button", "primary", "wide"]);
/// assert_eq!(RenderValue::from(3.0).to_text(), "3");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RenderValue {
    #[default]
    Empty,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<RenderValue>),
}

impl RenderValue {
    /// Text content. Lists concatenate their items; `Empty` renders nothing.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        self.write_text(&mut out);
        out
    }

    fn write_text(&self, out: &mut String) {
        match self {
            Self::Empty => {}
            Self::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Self::Number(n) => out.push_str(&n.to_string()),
            Self::Text(s) => out.push_str(s),
            Self::List(items) => items.iter().for_each(|item| item.write_text(out)),
        }
    }

    /// Class names, in first-seen order without duplicates.
    ///
    /// Text splits on whitespace, lists flatten, booleans and `Empty`
    /// contribute nothing.
    pub fn class_list(&self) -> Vec<String> {
        let mut classes = Vec::new();
        self.collect_classes(&mut classes);
        classes
    }

    fn collect_classes(&self, classes: &mut Vec<String>) {
        match self {
            Self::Empty | Self::Bool(_) => {}
            Self::Number(_) => push_class(classes, &self.to_text()),
            Self::Text(s) => s.split_whitespace().for_each(|name| push_class(classes, name)),
            Self::List(items) => items.iter().for_each(|item| item.collect_classes(classes)),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) => s.is_empty(),
            Self::List(items) => items.iter().all(RenderValue::is_empty),
            Self::Bool(_) | Self::Number(_) => false,
        }
    }
}

fn push_class(classes: &mut Vec<String>, name: &str) {
    if !classes.iter().any(|c| c == name) {
        classes.push(name.to_string());
    }
}

impl From<&str> for RenderValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for RenderValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<bool> for RenderValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for RenderValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for RenderValue {
    fn from(n: i32) -> Self {
        Self::Number(n.into())
    }
}

impl From<u32> for RenderValue {
    fn from(n: u32) -> Self {
        Self::Number(n.into())
    }
}

impl<T: Into<RenderValue>> From<Option<T>> for RenderValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Empty, Into::into)
    }
}

impl<T: Into<RenderValue>> From<Vec<T>> for RenderValue {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

// =============================================================================
// STAGE
// =============================================================================

/// Convert every value of a cell into a [`RenderValue`].
pub fn render<T>() -> Stage<T, RenderValue>
where
    T: Clone + Into<RenderValue> + 'static,
{
    map(|v: &T| v.clone().into())
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ReactiveCell;

    #[test]
    fn numbers_render_without_trailing_zero() {
        assert_eq!(RenderValue::from(42).to_text(), "42");
        assert_eq!(RenderValue::from(2.5).to_text(), "2.5");
        assert_eq!(RenderValue::from(1e20).to_text(), "100000000000000000000");
    }

    #[test]
    fn nested_lists_concatenate_as_text() {
        let value = RenderValue::from(vec![
            RenderValue::from("a"),
            RenderValue::from(vec![1, 2]),
            RenderValue::Empty,
            RenderValue::from(true),
        ]);
        assert_eq!(value.to_text(), "a12true");
    }

    #[test]
    fn class_list_flattens_and_dedupes() {
        let value = RenderValue::from(vec![
            RenderValue::from("row  selected"),
            RenderValue::from(vec![Some("selected"), None, Some("odd")]),
            RenderValue::from(true),
        ]);
        assert_eq!(value.class_list(), vec!["row", "selected", "odd"]);
    }

    #[test]
    fn emptiness_looks_through_lists() {
        assert!(RenderValue::from(vec![RenderValue::Empty, RenderValue::from("")]).is_empty());
        assert!(!RenderValue::from(false).is_empty());
    }

    #[test]
    fn render_stage_tracks_the_source() {
        let count = ReactiveCell::new(1);
        let label = count.transform(render(), None).unwrap();
        assert_eq!(label.value(), Some(RenderValue::Number(1.0)));

        count.update(7).unwrap();
        assert_eq!(label.value().map(|v| v.to_text()), Some("7".to_string()));
    }

    #[test]
    fn untagged_serialization_matches_plain_json() {
        let value = RenderValue::from(vec![RenderValue::from("x"), RenderValue::from(1)]);
        assert_eq!(serde_json::to_string(&value).unwrap(), r#"["x",1.0]"#);
    }
}
