//! Typed access to condition and action parameter bags.

use serde::de::DeserializeOwned;
use specrun_plugin::PluginError;
use specrun_spec::Params;

/// Deserialize a whole parameter bag into a typed input.
pub fn parse<T: DeserializeOwned>(params: &Params) -> Result<T, PluginError> {
  serde_json::from_value(serde_json::Value::Object(params.clone()))
    .map_err(|e| PluginError::invalid_params(e.to_string()))
}

pub fn required_str<'p>(params: &'p Params, key: &str) -> Result<&'p str, PluginError> {
  params
    .get(key)
    .and_then(|v| v.as_str())
    .ok_or_else(|| PluginError::invalid_params(format!("'{}' must be a string", key)))
}

pub fn optional_str<'p>(params: &'p Params, key: &str) -> Result<Option<&'p str>, PluginError> {
  match params.get(key) {
    None | Some(serde_json::Value::Null) => Ok(None),
    Some(serde_json::Value::String(s)) => Ok(Some(s)),
    Some(_) => Err(PluginError::invalid_params(format!(
      "'{}' must be a string",
      key
    ))),
  }
}

pub fn required<'p>(params: &'p Params, key: &str) -> Result<&'p serde_json::Value, PluginError> {
  params
    .get(key)
    .ok_or_else(|| PluginError::invalid_params(format!("missing '{}'", key)))
}

/// Resolve a JSON pointer (`/body/id`) into `data`. An empty pointer is
/// the whole value.
pub fn pointer<'d>(
  data: &'d serde_json::Value,
  path: &str,
) -> Result<Option<&'d serde_json::Value>, PluginError> {
  if !path.is_empty() && !path.starts_with('/') {
    return Err(PluginError::invalid_params(format!(
      "'path' must be a JSON pointer starting with '/', got '{}'",
      path
    )));
  }
  Ok(data.pointer(path))
}
