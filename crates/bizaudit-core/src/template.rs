//! Placeholder substitution for prompts and email personalisation.
//!
//! `{{path}}` is replaced by the value at the dotted `path` inside the field
//! document. Placeholders whose path is absent (or null) are left verbatim.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_\-]+(?:\.[A-Za-z0-9_\-]+)*)\s*\}\}")
        .expect("placeholder pattern is valid")
});

/// Resolve a dotted path (`previousResult.result`, `items.0.name`).
pub fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, key| match current {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Replace every `{{path}}` in `template` with its value from `fields`.
///
/// Strings are inserted as-is, other values as compact JSON.
pub fn substitute(template: &str, fields: &Value) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| match lookup_path(fields, &caps[1]) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => caps[0].to_string(),
            Some(other) => other.to_string(),
        })
        .into_owned()
}
