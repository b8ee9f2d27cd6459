use serde::{Deserialize, Serialize};

use crate::action::{ActionSpec, Params};

/// A single test task: three ordered phases plus optional pass/fail criteria.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSpec {
  pub title: String,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,

  /// Report the task as skipped without running any phase.
  #[serde(default)]
  pub skip: bool,

  #[serde(default)]
  pub prerequisites: Vec<ActionSpec>,

  #[serde(default)]
  pub steps: Vec<ActionSpec>,

  #[serde(default)]
  pub cleanup: Vec<ActionSpec>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub validation: Option<ValidationCriteria>,
}

impl TaskSpec {
  /// Create an empty task with the given title.
  pub fn new(title: impl Into<String>) -> Self {
    Self {
      title: title.into(),
      description: None,
      skip: false,
      prerequisites: Vec::new(),
      steps: Vec::new(),
      cleanup: Vec::new(),
      validation: None,
    }
  }

  /// All actions in declaration order across the three phases.
  pub fn all_actions(&self) -> impl Iterator<Item = &ActionSpec> {
    self
      .prerequisites
      .iter()
      .chain(self.steps.iter())
      .chain(self.cleanup.iter())
  }
}

/// Declared success and failure conditions for a task.
///
/// Every success condition must hold. Any failure condition that holds
/// fails the task, regardless of the success conditions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationCriteria {
  #[serde(default)]
  pub success: Vec<Condition>,

  #[serde(default)]
  pub failure: Vec<Condition>,
}

impl ValidationCriteria {
  pub fn is_empty(&self) -> bool {
    self.success.is_empty() && self.failure.is_empty()
  }
}

/// A condition checked by the validator registered for `condition_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
  #[serde(rename = "type")]
  pub condition_type: String,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,

  #[serde(default)]
  pub params: Params,
}

impl Condition {
  pub fn new(condition_type: impl Into<String>) -> Self {
    Self {
      condition_type: condition_type.into(),
      description: None,
      params: Params::new(),
    }
  }

  /// Set a parameter, builder style.
  pub fn param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
    self.params.insert(key.into(), value.into());
    self
  }
}
