//! Failure analyzers.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use specrun_plugin::{
  ActionErrorKind, ActionResult, FailureAnalysisResult, FailureAnalyzer, PluginError, Severity,
  TaskResult, categories,
};

struct Rule {
  category: &'static str,
  severity: Severity,
  pattern: Regex,
  description: &'static str,
  recommendation: &'static str,
}

impl Rule {
  fn new(
    category: &'static str,
    severity: Severity,
    pattern: &str,
    description: &'static str,
    recommendation: &'static str,
  ) -> Self {
    Self {
      category,
      severity,
      pattern: Regex::new(pattern).expect("rule pattern is valid"),
      description,
      recommendation,
    }
  }
}

static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
  vec![
    Rule::new(
      categories::TIMEOUT_ERROR,
      Severity::Medium,
      r"(?i)timed? ?out|deadline exceeded",
      "an operation did not finish in time",
      "raise the action timeout or investigate why the operation is slow",
    ),
    Rule::new(
      categories::NETWORK_ERROR,
      Severity::High,
      r"(?i)connection (refused|reset|closed)|could not resolve|name or service not known|network is unreachable|no route to host|econnrefused",
      "a network endpoint could not be reached",
      "check that the service is running and reachable from the test host",
    ),
    Rule::new(
      categories::AUTH_ERROR,
      Severity::High,
      r"(?i)\b(401|403)\b|unauthori[sz]ed|forbidden|permission denied|authentication failed|invalid (token|credentials)",
      "the request was not authenticated or not authorized",
      "verify credentials, tokens and permissions used by the task",
    ),
    Rule::new(
      categories::CONFIG_ERROR,
      Severity::Medium,
      r"(?i)no such file or directory|command not found|not configured|missing (config|configuration|environment variable)|invalid configuration",
      "the environment or configuration is incomplete",
      "check paths, installed tools and environment variables",
    ),
    Rule::new(
      categories::DATA_ERROR,
      Severity::Medium,
      r"(?i)parse error|invalid json|unexpected token|failed to (parse|deserialize)|constraint violation|duplicate key",
      "data had an unexpected shape or violated a constraint",
      "compare the payloads with their expected schema",
    ),
  ]
});

/// Text an action left behind for diagnosis: its error and any stderr.
fn diagnostics(action: &ActionResult) -> String {
  let mut text = action
    .error
    .as_ref()
    .map(|e| e.message.clone())
    .unwrap_or_default();
  if let Some(stderr) = action.data.get("stderr").and_then(|v| v.as_str()) {
    text.push('\n');
    text.push_str(stderr);
  }
  text
}

/// Matches failed actions' errors and stderr against known signatures.
///
/// Contributes one result per matched category. Timeouts reported by the
/// engine match regardless of their message.
pub struct ErrorPatternAnalyzer;

#[async_trait]
impl FailureAnalyzer for ErrorPatternAnalyzer {
  fn name(&self) -> &str {
    "errorPatterns"
  }

  fn priority(&self) -> i32 {
    100
  }

  async fn analyze(&self, task: &TaskResult) -> Result<Vec<FailureAnalysisResult>, PluginError> {
    let failed: Vec<&ActionResult> = task.actions.iter().filter(|a| !a.success).collect();

    let mut results = Vec::new();
    for rule in RULES.iter() {
      let causes: Vec<String> = failed
        .iter()
        .filter(|a| {
          let timed_out = a
            .error
            .as_ref()
            .is_some_and(|e| e.kind == ActionErrorKind::Timeout);
          (timed_out && rule.category == categories::TIMEOUT_ERROR)
            || rule.pattern.is_match(&diagnostics(a))
        })
        .map(|a| match &a.error {
          Some(e) => format!("{} '{}': {}", a.phase, a.action_id, e.message),
          None => format!("{} '{}' failed", a.phase, a.action_id),
        })
        .collect();

      if causes.is_empty() {
        continue;
      }
      results.push(FailureAnalysisResult {
        analyzer: self.name().to_string(),
        category: rule.category.to_string(),
        severity: rule.severity,
        confidence: if causes.len() == failed.len() { 0.9 } else { 0.7 },
        description: format!(
          "{} ({} of {} failed actions)",
          rule.description,
          causes.len(),
          failed.len()
        ),
        recommendation: rule.recommendation.to_string(),
        potential_causes: causes,
      });
    }
    Ok(results)
  }
}

/// Flags tasks where every action succeeded but validation failed.
pub struct ValidationMismatchAnalyzer;

#[async_trait]
impl FailureAnalyzer for ValidationMismatchAnalyzer {
  fn name(&self) -> &str {
    "validationMismatch"
  }

  fn priority(&self) -> i32 {
    50
  }

  async fn analyze(&self, task: &TaskResult) -> Result<Vec<FailureAnalysisResult>, PluginError> {
    let Some(validation) = task.validation.as_ref().filter(|v| !v.passed) else {
      return Ok(Vec::new());
    };
    if task.actions.iter().any(|a| !a.success) {
      return Ok(Vec::new());
    }

    let triggered = validation.failure_conditions.iter().filter(|c| c.holds);
    let unmet = validation.success_conditions.iter().filter(|c| !c.holds);
    let potential_causes = triggered
      .map(|c| ("failure condition triggered", c))
      .chain(unmet.map(|c| ("success condition not met", c)))
      .map(|(what, c)| {
        let name = c.description.as_deref().unwrap_or(&c.condition_type);
        match &c.error {
          Some(error) => format!("{}: {} ({})", what, name, error),
          None => format!("{}: {}", what, name),
        }
      })
      .collect();

    Ok(vec![FailureAnalysisResult {
      analyzer: self.name().to_string(),
      category: categories::LOGIC_ERROR.to_string(),
      severity: Severity::High,
      confidence: 0.8,
      description: "every action succeeded but the outcome did not satisfy validation".to_string(),
      recommendation: "compare the recorded outputs with the expected behavior".to_string(),
      potential_causes,
    }])
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Utc;
  use serde_json::json;
  use specrun_plugin::{ActionError, ConditionOutcome, Phase, TaskStatus, ValidationResult};

  fn action(id: &str, error: Option<ActionError>, data: serde_json::Value) -> ActionResult {
    ActionResult {
      action_id: id.to_string(),
      action_type: "shell".to_string(),
      phase: Phase::Step,
      success: error.is_none(),
      started_at: Utc::now(),
      duration_ms: 5,
      data,
      error,
    }
  }

  fn task(actions: Vec<ActionResult>, validation: Option<ValidationResult>) -> TaskResult {
    TaskResult {
      task_id: "T".to_string(),
      title: "t".to_string(),
      status: TaskStatus::Failed,
      started_at: Utc::now(),
      finished_at: Utc::now(),
      duration_ms: 10,
      actions,
      validation,
      failure_analysis: vec![],
      technical_debt: vec![],
      error: None,
    }
  }

  #[tokio::test]
  async fn test_error_patterns_classify_failures() {
    let task = task(
      vec![
        action(
          "call",
          Some(ActionError::new(ActionErrorKind::Executor, "'curl' exited with exit code 7")),
          json!({ "stderr": "curl: (7) Failed to connect: Connection refused" }),
        ),
        action(
          "slow",
          Some(ActionError::new(ActionErrorKind::Timeout, "action exceeded 50ms")),
          json!(null),
        ),
        action("fine", None, json!(null)),
      ],
      None,
    );

    let results = ErrorPatternAnalyzer.analyze(&task).await.unwrap();
    let categories: Vec<&str> = results.iter().map(|r| r.category.as_str()).collect();
    assert_eq!(categories, vec!["TIMEOUT_ERROR", "NETWORK_ERROR"]);
    assert_eq!(results[1].potential_causes.len(), 1);
    assert!(results[1].potential_causes[0].starts_with("step 'call'"));
    assert_eq!(results[1].confidence, 0.7);
  }

  #[tokio::test]
  async fn test_error_patterns_decline_unrecognized() {
    let task = task(
      vec![action(
        "x",
        Some(ActionError::new(ActionErrorKind::Executor, "something odd")),
        json!(null),
      )],
      None,
    );
    assert!(ErrorPatternAnalyzer.analyze(&task).await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_validation_mismatch() {
    let validation = ValidationResult {
      passed: false,
      success_conditions: vec![],
      failure_conditions: vec![ConditionOutcome {
        condition_type: "outputMatches".to_string(),
        description: Some("error logged".to_string()),
        holds: true,
        warning: None,
        error: None,
      }],
      warnings: vec![],
    };

    let mismatch = task(vec![action("a", None, json!(null))], Some(validation.clone()));
    let results = ValidationMismatchAnalyzer.analyze(&mismatch).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].category, categories::LOGIC_ERROR);
    assert_eq!(
      results[0].potential_causes,
      vec!["failure condition triggered: error logged"]
    );

    let failed_action = task(
      vec![action(
        "a",
        Some(ActionError::new(ActionErrorKind::Executor, "boom")),
        json!(null),
      )],
      Some(validation),
    );
    assert!(ValidationMismatchAnalyzer.analyze(&failed_action).await.unwrap().is_empty());
    assert!(ValidationMismatchAnalyzer.analyze(&task(vec![], None)).await.unwrap().is_empty());
  }
}
