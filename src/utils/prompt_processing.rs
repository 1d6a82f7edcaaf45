use std::collections::HashMap;
use regex::{Captures, Regex};
use lazy_static::lazy_static;

lazy_static! {
    /// `{{name}}`, tolerating spaces and tabs inside the braces. Names cannot span lines or contain braces.
    pub(crate) static ref PLACEHOLDER_MATCH_RE: Regex = Regex::new(r"\{\{[ \t]*([^{}\r\n]+?)[ \t]*\}\}").unwrap();
}

#[inline]
fn placeholder_name<'a>(captures: &Captures<'a>) -> &'a str {
    captures.get(1).map_or("", |m| m.as_str())
}

/// Replaces every placeholder with its mapped value. Placeholders that are absent from the mapping, or mapped to
/// `None`, render as the empty string.
pub(crate) fn replace_all_placeholders(original: &str, mapping: &HashMap<String, Option<String>>) -> String {
    PLACEHOLDER_MATCH_RE
        .replace_all(original, |captures: &Captures| {
            mapping
                .get(placeholder_name(captures))
                .and_then(|v| v.clone())
                .unwrap_or_default()
        })
        .into_owned()
}

/// Placeholder names in order of first appearance, without duplicates.
pub fn get_placeholders(string: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for captures in PLACEHOLDER_MATCH_RE.captures_iter(string) {
        let name = placeholder_name(&captures);
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}
