use serde::{Deserialize, Serialize};

/// Schema-less parameter bag passed through to plugins.
///
/// The engine never interprets parameters; each executor or validator
/// narrows the shape it expects.
pub type Params = serde_json::Map<String, serde_json::Value>;

/// One executable action (prerequisite, step or cleanup item).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionSpec {
  /// Identifier, unique within the owning task.
  pub id: String,

  /// Key resolved against the registered executors, e.g. "shell".
  #[serde(rename = "type")]
  pub action_type: String,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,

  #[serde(default)]
  pub params: Params,

  /// Keep running the phase when this action fails.
  #[serde(default)]
  pub continue_on_failure: bool,

  /// The executor returns once the work has started; the work itself
  /// keeps running after the action completes.
  #[serde(default)]
  pub is_background: bool,

  /// Per-action timeout. Falls back to the global default when unset.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub timeout_ms: Option<u64>,
}

impl ActionSpec {
  /// Create an action with an empty parameter bag.
  pub fn new(id: impl Into<String>, action_type: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      action_type: action_type.into(),
      description: None,
      params: Params::new(),
      continue_on_failure: false,
      is_background: false,
      timeout_ms: None,
    }
  }

  /// Set a parameter, builder style.
  pub fn param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
    self.params.insert(key.into(), value.into());
    self
  }

  pub fn continue_on_failure(mut self) -> Self {
    self.continue_on_failure = true;
    self
  }

  pub fn background(mut self) -> Self {
    self.is_background = true;
    self
  }

  pub fn timeout_ms(mut self, ms: u64) -> Self {
    self.timeout_ms = Some(ms);
    self
  }
}
