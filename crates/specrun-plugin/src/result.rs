//! Execution result model.
//!
//! Everything here is created once and never mutated after the owning
//! stage finishes. These are the shapes persisted as evidence.

use std::fmt;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Phase of a task an action belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
  Prerequisite,
  Step,
  Cleanup,
}

impl fmt::Display for Phase {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Prerequisite => f.write_str("prerequisite"),
      Self::Step => f.write_str("step"),
      Self::Cleanup => f.write_str("cleanup"),
    }
  }
}

/// Why an action failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionErrorKind {
  /// The executor ran and reported a failure.
  Executor,
  /// The action exceeded its timeout.
  Timeout,
  /// No executor is registered for the action type.
  UnknownActionType,
  /// Parameters could not be resolved or were rejected by the executor.
  InvalidParams,
  /// The executor panicked.
  Panicked,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionError {
  pub kind: ActionErrorKind,
  pub message: String,
}

impl ActionError {
  pub fn new(kind: ActionErrorKind, message: impl Into<String>) -> Self {
    Self {
      kind,
      message: message.into(),
    }
  }
}

impl fmt::Display for ActionError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.message)
  }
}

/// Outcome of one executed action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
  pub action_id: String,
  pub action_type: String,
  pub phase: Phase,
  pub success: bool,
  pub started_at: DateTime<Utc>,
  pub duration_ms: u64,
  /// Structured output from the executor.
  #[serde(default)]
  pub data: serde_json::Value,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<ActionError>,
}

/// Outcome of a single evaluated condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionOutcome {
  pub condition_type: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  /// Whether the condition held.
  pub holds: bool,
  /// Set when the outcome was decided by policy rather than a validator.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub warning: Option<String>,
  /// Set when the validator itself failed.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

/// Verdict of the validation stage for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
  pub passed: bool,
  pub success_conditions: Vec<ConditionOutcome>,
  pub failure_conditions: Vec<ConditionOutcome>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub warnings: Vec<String>,
}

impl ValidationResult {
  /// Verdict for a task without criteria.
  pub fn vacuous() -> Self {
    Self {
      passed: true,
      success_conditions: Vec::new(),
      failure_conditions: Vec::new(),
      warnings: Vec::new(),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
  Low,
  Medium,
  High,
  Critical,
}

/// Well-known failure categories. The taxonomy is open: analyzers may use
/// any other string.
pub mod categories {
  pub const NETWORK_ERROR: &str = "NETWORK_ERROR";
  pub const AUTH_ERROR: &str = "AUTH_ERROR";
  pub const CONFIG_ERROR: &str = "CONFIG_ERROR";
  pub const DATA_ERROR: &str = "DATA_ERROR";
  pub const LOGIC_ERROR: &str = "LOGIC_ERROR";
  pub const TIMEOUT_ERROR: &str = "TIMEOUT_ERROR";
  pub const UNKNOWN_ERROR: &str = "UNKNOWN_ERROR";
}

/// Diagnosis contributed by a failure analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureAnalysisResult {
  /// Name of the analyzer that produced this result.
  pub analyzer: String,
  pub category: String,
  pub severity: Severity,
  /// In [0, 1].
  pub confidence: f64,
  pub description: String,
  pub recommendation: String,
  #[serde(default)]
  pub potential_causes: Vec<String>,
}

/// Measurement backing a technical debt item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebtEvidence {
  pub metric: String,
  pub threshold: f64,
  pub actual: f64,
  #[serde(default)]
  pub step_ids: Vec<String>,
}

/// Quality issue flagged on a passing task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TechnicalDebtItem {
  pub detector: String,
  pub category: String,
  pub severity: Severity,
  pub description: String,
  pub recommendation: String,
  pub evidence: DebtEvidence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
  Passed,
  Failed,
  Skipped,
}

impl fmt::Display for TaskStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Passed => f.pad("PASSED"),
      Self::Failed => f.pad("FAILED"),
      Self::Skipped => f.pad("SKIPPED"),
    }
  }
}

/// Everything recorded about one task.
///
/// `failure_analysis` is only populated when the task failed and
/// `technical_debt` only when it passed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
  pub task_id: String,
  pub title: String,
  pub status: TaskStatus,
  pub started_at: DateTime<Utc>,
  pub finished_at: DateTime<Utc>,
  pub duration_ms: u64,
  /// Results of every executed action, in execution order.
  pub actions: Vec<ActionResult>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub validation: Option<ValidationResult>,
  #[serde(default)]
  pub failure_analysis: Vec<FailureAnalysisResult>,
  #[serde(default)]
  pub technical_debt: Vec<TechnicalDebtItem>,
  /// Why the task failed or was skipped, when not explained by validation.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

impl TaskResult {
  /// Actions executed in the given phase.
  pub fn actions_in(&self, phase: Phase) -> impl Iterator<Item = &ActionResult> {
    self.actions.iter().filter(move |a| a.phase == phase)
  }

  pub fn action(&self, action_id: &str) -> Option<&ActionResult> {
    self.actions.iter().find(|a| a.action_id == action_id)
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
  pub total: usize,
  pub passed: usize,
  pub failed: usize,
  pub skipped: usize,
}

impl RunSummary {
  /// Count statuses.
  pub fn from_statuses(statuses: impl IntoIterator<Item = TaskStatus>) -> Self {
    let mut summary = Self::default();
    for status in statuses {
      summary.total += 1;
      match status {
        TaskStatus::Passed => summary.passed += 1,
        TaskStatus::Failed => summary.failed += 1,
        TaskStatus::Skipped => summary.skipped += 1,
      }
    }
    summary
  }
}

/// Terminal artifact of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
  pub run_id: String,
  pub schema_version: String,
  pub started_at: DateTime<Utc>,
  pub finished_at: DateTime<Utc>,
  pub duration_ms: u64,
  /// Task results keyed by task id, in declaration order.
  pub tasks: IndexMap<String, TaskResult>,
  pub summary: RunSummary,
}

impl RunResult {
  /// True when no task failed. Interpreting the run is up to the caller.
  pub fn is_success(&self) -> bool {
    self.summary.failed == 0
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_summary_counts() {
    let summary = RunSummary::from_statuses([
      TaskStatus::Passed,
      TaskStatus::Failed,
      TaskStatus::Passed,
      TaskStatus::Skipped,
    ]);
    assert_eq!(
      summary,
      RunSummary {
        total: 4,
        passed: 2,
        failed: 1,
        skipped: 1
      }
    );
  }

  #[test]
  fn test_status_serializes_uppercase() {
    assert_eq!(
      serde_json::to_value(TaskStatus::Skipped).unwrap(),
      serde_json::json!("SKIPPED")
    );
    assert_eq!(
      serde_json::from_value::<TaskStatus>(serde_json::json!("PASSED")).unwrap(),
      TaskStatus::Passed
    );
  }

  #[test]
  fn test_action_result_wire_names() {
    let result = ActionResult {
      action_id: "STEP.1".to_string(),
      action_type: "shell".to_string(),
      phase: Phase::Step,
      success: false,
      started_at: Utc::now(),
      duration_ms: 12,
      data: serde_json::Value::Null,
      error: Some(ActionError::new(ActionErrorKind::Timeout, "timed out")),
    };
    let value = serde_json::to_value(&result).unwrap();
    assert_eq!(value["actionId"], "STEP.1");
    assert_eq!(value["durationMs"], 12);
    assert_eq!(value["phase"], "step");
    assert_eq!(value["error"]["kind"], "timeout");
  }
}
