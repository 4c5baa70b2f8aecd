//! Prompt and input templating against session state.
//!
//! Recognises `{{name}}` and `{{name.field}}` placeholders, where `name` is
//! a session key (or a user-input alias) and `field` selects a field of the
//! stored value. Misses leave the placeholder literal, which also makes
//! resolution idempotent on fully-resolved text. The engine only reads the
//! session; it never mutates it.

use crate::session::{user_input_key, value_text};
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::OnceLock;

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z0-9_\-]+)(?:\.([A-Za-z0-9_\-]+))?\s*\}\}")
            .expect("placeholder regex compiles")
    })
}

/// Resolve every placeholder in `text` against a session snapshot.
///
/// A bare `{{name}}` looks up `name` directly, then falls back to the
/// `__user_input__name` alias when the direct key is absent. `{{name.field}}`
/// additionally projects a field out of the stored value: `text` renders the
/// value as display text, any other field indexes into an object value.
pub fn resolve(text: &str, snapshot: &HashMap<String, Value>) -> String {
    placeholder_re()
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            let field = caps.get(2).map(|m| m.as_str());
            match lookup(name, snapshot).and_then(|v| project(v, field)) {
                Some(rendered) => rendered,
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Find the value for a placeholder name, preferring the real key over the
/// user-input alias.
fn lookup<'a>(name: &str, snapshot: &'a HashMap<String, Value>) -> Option<&'a Value> {
    snapshot
        .get(name)
        .or_else(|| snapshot.get(&user_input_key(name)))
}

fn project(value: &Value, field: Option<&str>) -> Option<String> {
    match field {
        None | Some("text") => Some(value_text(value)),
        Some(field) => value.get(field).map(value_text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot(entries: &[(&str, Value)]) -> HashMap<String, Value> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_bare_placeholder() {
        let snap = snapshot(&[("summary", json!("short text"))]);
        assert_eq!(
            resolve("Result: {{summary}}", &snap),
            "Result: short text"
        );
    }

    #[test]
    fn test_user_input_alias() {
        let snap = snapshot(&[("__user_input__topic", json!("rust"))]);
        assert_eq!(resolve("Write about {{topic}}", &snap), "Write about rust");
    }

    #[test]
    fn test_real_key_wins_over_alias() {
        let snap = snapshot(&[
            ("topic", json!("resolved")),
            ("__user_input__topic", json!("raw")),
        ]);
        assert_eq!(resolve("{{topic}}", &snap), "resolved");
    }

    #[test]
    fn test_field_access() {
        let snap = snapshot(&[("fetch", json!({"text": "body", "data": {"url": "x"}}))]);
        assert_eq!(resolve("{{fetch.text}}", &snap), "body");
        assert_eq!(resolve("{{fetch.data}}", &snap), r#"{"url":"x"}"#);
    }

    #[test]
    fn test_miss_left_literal() {
        let snap = snapshot(&[]);
        assert_eq!(resolve("keep {{missing}} here", &snap), "keep {{missing}} here");
        let snap = snapshot(&[("v", json!("x"))]);
        assert_eq!(resolve("{{v.nope}}", &snap), "{{v.nope}}");
    }

    #[test]
    fn test_idempotent_when_fully_resolved() {
        let snap = snapshot(&[("a", json!("A"))]);
        let once = resolve("{{a}} and {{gone}}", &snap);
        assert_eq!(resolve(&once, &snap), once);
    }

    #[test]
    fn test_whitespace_tolerated() {
        let snap = snapshot(&[("a", json!("A"))]);
        assert_eq!(resolve("{{ a }}", &snap), "A");
    }
}
