//! `{{placeholder}}` substitution for template previews
//!
//! Template text is shown verbatim until a fill pass runs. Filling replaces
//! each `{{ key }}` (whitespace inside the braces is ignored) with its value,
//! exactly as given. Keys with no value or a blank one render as `{{key}}` so
//! the gap stays visible.

use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

use regex::{Captures, Regex};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").expect("placeholder pattern is valid")
});

/// Substitute placeholder values into `text`.
pub fn fill_placeholders(text: &str, values: &BTreeMap<String, String>) -> String {
    PLACEHOLDER
        .replace_all(text, |caps: &Captures<'_>| {
            let key = &caps[1];
            match values.get(key).filter(|v| !v.trim().is_empty()) {
                Some(value) => value.clone(),
                None => format!("{{{{{key}}}}}"),
            }
        })
        .into_owned()
}

/// Distinct placeholder keys in order of first appearance.
pub fn placeholders(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    PLACEHOLDER
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .filter(|key| seen.insert(key.clone()))
        .collect()
}
