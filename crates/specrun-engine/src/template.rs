//! Parameter resolution using minijinja templates.
//!
//! String parameters may reference results of earlier actions in the same
//! task. The template scope is [`ExecutionContext::template_scope`]:
//! ```json
//! {
//!   "taskId": "TASK-1",
//!   "workspaceRoot": "/srv/app",
//!   "actions": { "login": { "success": true, "durationMs": 12, "data": {...}, "error": null } }
//! }
//! ```
//!
//! A string that is exactly one expression (`"{{ actions.login.data.id }}"`)
//! resolves to the expression's value with its JSON type intact. Any other
//! string containing template syntax is rendered to a string. Action ids
//! that are not identifiers need subscript syntax: `actions["STEP.1"]`.
//!
//! [`ExecutionContext::template_scope`]: specrun_plugin::ExecutionContext::template_scope

use minijinja::{Environment, UndefinedBehavior, Value};
use specrun_spec::Params;

/// Resolve every templated string in a parameter bag.
///
/// Errors name the parameter that failed so they can be reported on the
/// action result.
pub fn resolve_params(params: &Params, scope: &serde_json::Value) -> Result<Params, String> {
  let mut env = Environment::new();
  env.set_undefined_behavior(UndefinedBehavior::Strict);
  let context = Value::from_serialize(scope);

  let mut resolved = Params::new();
  for (key, value) in params {
    let value = resolve_json_value(&env, value, &context)
      .map_err(|e| format!("failed to resolve parameter '{}': {}", key, e))?;
    resolved.insert(key.clone(), value);
  }
  Ok(resolved)
}

/// Recursively resolve templates in a JSON value.
fn resolve_json_value(
  env: &Environment,
  value: &serde_json::Value,
  context: &Value,
) -> Result<serde_json::Value, String> {
  match value {
    serde_json::Value::String(s) => {
      if let Some(expr) = pure_expression(s) {
        return evaluate(env, expr, context);
      }
      if s.contains("{{") || s.contains("{%") {
        let rendered = env
          .render_str(s, context.clone())
          .map_err(|e| e.to_string())?;
        return Ok(serde_json::Value::String(rendered));
      }
      Ok(value.clone())
    }
    serde_json::Value::Array(arr) => arr
      .iter()
      .map(|v| resolve_json_value(env, v, context))
      .collect::<Result<Vec<_>, _>>()
      .map(serde_json::Value::Array),
    serde_json::Value::Object(obj) => {
      let mut resolved = serde_json::Map::new();
      for (k, v) in obj {
        resolved.insert(k.clone(), resolve_json_value(env, v, context)?);
      }
      Ok(serde_json::Value::Object(resolved))
    }
    // Numbers, bools, nulls pass through unchanged
    _ => Ok(value.clone()),
  }
}

/// The inner expression if the string is exactly one `{{ expr }}`.
fn pure_expression(s: &str) -> Option<&str> {
  let inner = s.trim().strip_prefix("{{")?.strip_suffix("}}")?;
  if inner.contains("{{") || inner.contains("}}") || inner.contains("{%") {
    return None;
  }
  Some(inner.trim())
}

fn evaluate(env: &Environment, expr: &str, context: &Value) -> Result<serde_json::Value, String> {
  let compiled = env.compile_expression(expr).map_err(|e| e.to_string())?;
  let value = compiled.eval(context.clone()).map_err(|e| e.to_string())?;
  if value.is_undefined() {
    return Err(format!("'{}' is undefined", expr));
  }
  serde_json::to_value(&value).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn scope() -> serde_json::Value {
    json!({
      "taskId": "TASK-1",
      "workspaceRoot": "/srv/app",
      "actions": {
        "login": { "success": true, "durationMs": 12, "data": { "token": "abc", "userId": 42 }, "error": null },
        "STEP.1": { "success": true, "durationMs": 3, "data": { "name": "john doe" }, "error": null }
      }
    })
  }

  fn params(value: serde_json::Value) -> Params {
    value.as_object().cloned().unwrap()
  }

  #[test]
  fn test_pure_expression_keeps_type() {
    let resolved = resolve_params(
      &params(json!({ "id": "{{ actions.login.data.userId }}" })),
      &scope(),
    )
    .unwrap();
    assert_eq!(resolved["id"], 42);
  }

  #[test]
  fn test_mixed_string_is_rendered() {
    let resolved = resolve_params(
      &params(json!({ "header": "Bearer {{ actions.login.data.token }}" })),
      &scope(),
    )
    .unwrap();
    assert_eq!(resolved["header"], "Bearer abc");
  }

  #[test]
  fn test_subscript_for_dotted_ids_and_filters() {
    let resolved = resolve_params(
      &params(json!({ "greeting": "Hello {{ actions['STEP.1'].data.name | title }}!" })),
      &scope(),
    )
    .unwrap();
    assert_eq!(resolved["greeting"], "Hello John Doe!");
  }

  #[test]
  fn test_nested_values_and_literals() {
    let resolved = resolve_params(
      &params(json!({
        "count": 3,
        "body": { "cwd": "{{ workspaceRoot }}", "tags": ["{{ taskId }}", "static"] }
      })),
      &scope(),
    )
    .unwrap();
    assert_eq!(resolved["count"], 3);
    assert_eq!(resolved["body"]["cwd"], "/srv/app");
    assert_eq!(resolved["body"]["tags"], json!(["TASK-1", "static"]));
  }

  #[test]
  fn test_undefined_reference_is_an_error() {
    let err = resolve_params(
      &params(json!({ "id": "{{ actions.missing.data.id }}" })),
      &scope(),
    )
    .unwrap_err();
    assert!(err.contains("'id'"), "{}", err);

    let err = resolve_params(
      &params(json!({ "url": "http://x/{{ actions.login.data.nope }}" })),
      &scope(),
    )
    .unwrap_err();
    assert!(err.contains("'url'"), "{}", err);
  }

  #[test]
  fn test_pure_expression_detection() {
    assert_eq!(pure_expression("{{ a.b }}"), Some("a.b"));
    assert_eq!(pure_expression("  {{x}} "), Some("x"));
    assert_eq!(pure_expression("{{ a }}-{{ b }}"), None);
    assert_eq!(pure_expression("pre {{ a }}"), None);
  }
}
