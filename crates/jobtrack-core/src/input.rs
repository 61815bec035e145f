//! Adapters between UI input payloads and the plain-string search API.
//!
//! The search core only ever sees a `String`. Whatever the presentation
//! layer hands over (a change event, a bare value, a loosely typed JSON
//! payload) is reduced to one here; values that cannot be used are coerced
//! to the empty term instead of failing.

use serde::Deserialize;
use serde_json::Value;

use crate::search::FocusSnapshot;

/// A text-input change as reported by the presentation layer.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize)]
pub struct InputEvent {
    pub value: String,
    #[serde(default)]
    pub selection_start: Option<usize>,
    #[serde(default)]
    pub selection_end: Option<usize>,
    #[serde(default)]
    pub has_focus: bool,
}

impl InputEvent {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..Self::default()
        }
    }

    /// An event from a focused input with the caret at the end of `value`.
    pub fn typed(value: impl Into<String>) -> Self {
        let value = value.into();
        let caret = value.chars().count();
        Self {
            value,
            selection_start: Some(caret),
            selection_end: Some(caret),
            has_focus: true,
        }
    }

    pub fn focus_snapshot(&self) -> FocusSnapshot {
        FocusSnapshot {
            selection_start: self.selection_start,
            selection_end: self.selection_end,
            had_focus: self.has_focus,
        }
    }

    /// Build an event from an arbitrary payload. Structured events keep
    /// their selection; anything else becomes an unfocused event carrying
    /// the coerced value.
    pub fn from_payload(payload: &Value) -> Self {
        if let Some(target) = payload.get("target").filter(|target| target.is_object()) {
            return Self {
                value: coerce_search_value(target.get("value").unwrap_or(&Value::Null)),
                selection_start: read_offset(target, "selectionStart"),
                selection_end: read_offset(target, "selectionEnd"),
                has_focus: true,
            };
        }
        Self::new(coerce_search_value(payload))
    }
}

/// Reduce a loosely typed payload to a search term.
///
/// Strings pass through. Objects yield their `target.value`, `value` or
/// `query` member, in that order. Numbers and booleans use their display
/// form. Everything else is an empty term.
pub fn coerce_search_value(payload: &Value) -> String {
    match payload {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Null => String::new(),
        Value::Object(fields) => {
            let nested = fields
                .get("target")
                .and_then(|target| target.get("value"))
                .or_else(|| fields.get("value"))
                .or_else(|| fields.get("query"));
            match nested {
                Some(inner) if !inner.is_object() && !inner.is_array() => {
                    coerce_search_value(inner)
                }
                _ => {
                    tracing::warn!(payload = %payload, "search input is not a usable string; using empty term");
                    String::new()
                }
            }
        }
        Value::Array(_) => {
            tracing::warn!(payload = %payload, "search input is not a usable string; using empty term");
            String::new()
        }
    }
}

fn read_offset(target: &Value, field: &str) -> Option<usize> {
    target
        .get(field)
        .and_then(Value::as_u64)
        .and_then(|offset| usize::try_from(offset).ok())
}
