//! Environment variable substitution for string values.
//!
//! Supported forms:
//! - `${NAME}`: value of `NAME`
//! - `${NAME:-fallback}`: value of `NAME`, or `fallback` when unset
//! - `$${NAME}`: a literal `${NAME}`

use std::sync::LazyLock;

use regex::{Captures, Regex};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"\$\$\{([^}]*)\}|\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
    .expect("placeholder pattern is valid")
});

/// Substitute environment references in `input`.
///
/// Returns the substituted string and the names of referenced variables that
/// were unset and had no fallback. Those references are left verbatim.
pub fn substitute_env<F>(input: &str, lookup: F) -> (String, Vec<String>)
where
  F: Fn(&str) -> Option<String>,
{
  if !input.contains('$') {
    return (input.to_string(), Vec::new());
  }

  let mut missing = Vec::new();
  let output = PLACEHOLDER.replace_all(input, |caps: &Captures<'_>| {
    if let Some(escaped) = caps.get(1) {
      return format!("${{{}}}", escaped.as_str());
    }

    let name = &caps[2];
    match (lookup(name), caps.get(3)) {
      (Some(value), _) => value,
      (None, Some(fallback)) => fallback.as_str().to_string(),
      (None, None) => {
        missing.push(name.to_string());
        caps[0].to_string()
      }
    }
  });

  (output.into_owned(), missing)
}

/// Substitute in every string nested inside `value`. Object keys are left alone.
pub(crate) fn substitute_value<F>(value: &mut serde_json::Value, lookup: &F, missing: &mut Vec<String>)
where
  F: Fn(&str) -> Option<String>,
{
  match value {
    serde_json::Value::String(s) => {
      let (replaced, unresolved) = substitute_env(s, lookup);
      *s = replaced;
      missing.extend(unresolved);
    }
    serde_json::Value::Array(items) => {
      for item in items {
        substitute_value(item, lookup, missing);
      }
    }
    serde_json::Value::Object(map) => {
      for (_, item) in map.iter_mut() {
        substitute_value(item, lookup, missing);
      }
    }
    _ => {}
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn lookup(name: &str) -> Option<String> {
    match name {
      "HOST" => Some("localhost".to_string()),
      "PORT" => Some("8080".to_string()),
      _ => None,
    }
  }

  #[test]
  fn test_substitutes_known_variables() {
    let (out, missing) = substitute_env("http://${HOST}:${PORT}/api", lookup);
    assert_eq!(out, "http://localhost:8080/api");
    assert!(missing.is_empty());
  }

  #[test]
  fn test_fallback_used_when_unset() {
    let (out, missing) = substitute_env("${TOKEN:-anonymous}", lookup);
    assert_eq!(out, "anonymous");
    assert!(missing.is_empty());
  }

  #[test]
  fn test_fallback_ignored_when_set() {
    let (out, _) = substitute_env("${HOST:-example.com}", lookup);
    assert_eq!(out, "localhost");
  }

  #[test]
  fn test_unset_without_fallback_left_verbatim() {
    let (out, missing) = substitute_env("key=${API_KEY}", lookup);
    assert_eq!(out, "key=${API_KEY}");
    assert_eq!(missing, vec!["API_KEY".to_string()]);
  }

  #[test]
  fn test_escaped_placeholder_is_literal() {
    let (out, missing) = substitute_env("echo $${HOST}", lookup);
    assert_eq!(out, "echo ${HOST}");
    assert!(missing.is_empty());
  }

  #[test]
  fn test_plain_dollar_untouched() {
    let (out, _) = substitute_env("costs $5", lookup);
    assert_eq!(out, "costs $5");
  }

  #[test]
  fn test_substitute_nested_value() {
    let mut value = json!({
      "url": "http://${HOST}",
      "headers": ["x-port: ${PORT}", 42],
      "nested": { "${HOST}": "${MISSING}" }
    });
    let mut missing = Vec::new();
    substitute_value(&mut value, &lookup, &mut missing);

    assert_eq!(value["url"], "http://localhost");
    assert_eq!(value["headers"][0], "x-port: 8080");
    assert_eq!(value["headers"][1], 42);
    // keys are not substituted
    assert_eq!(value["nested"]["${HOST}"], "${MISSING}");
    assert_eq!(missing, vec!["MISSING".to_string()]);
  }
}
