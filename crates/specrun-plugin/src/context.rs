//! Per-run working set shared with plugins.

use indexmap::IndexMap;
use serde_json::json;
use specrun_spec::GlobalConfiguration;

use crate::result::ActionResult;

/// Live record of everything executed so far in a run.
///
/// Only the orchestrator appends to it; plugins receive `&ExecutionContext`.
/// Per-task result lists are append-only.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
  config: GlobalConfiguration,
  results: IndexMap<String, Vec<ActionResult>>,
}

impl ExecutionContext {
  /// Create a context for a run with resolved global configuration.
  pub fn new(config: GlobalConfiguration) -> Self {
    Self {
      config,
      results: IndexMap::new(),
    }
  }

  pub fn config(&self) -> &GlobalConfiguration {
    &self.config
  }

  /// Append a result to a task's list.
  pub fn record(&mut self, task_id: &str, result: ActionResult) {
    self
      .results
      .entry(task_id.to_string())
      .or_default()
      .push(result);
  }

  /// Results recorded for a task, in execution order.
  pub fn results(&self, task_id: &str) -> &[ActionResult] {
    self
      .results
      .get(task_id)
      .map(Vec::as_slice)
      .unwrap_or_default()
  }

  /// Latest result recorded for an action of a task.
  pub fn result(&self, task_id: &str, action_id: &str) -> Option<&ActionResult> {
    self
      .results(task_id)
      .iter()
      .rev()
      .find(|r| r.action_id == action_id)
  }

  /// Task ids with at least one recorded result, in first-recorded order.
  pub fn task_ids(&self) -> impl Iterator<Item = &str> {
    self.results.keys().map(String::as_str)
  }

  /// Template scope for resolving action parameters of `task_id`.
  ///
  /// ```json
  /// {
  ///   "taskId": "TASK-1",
  ///   "workspaceRoot": "/srv/app",
  ///   "actions": { "STEP.1": { "success": true, "durationMs": 12, "data": {}, "error": null } }
  /// }
  /// ```
  pub fn template_scope(&self, task_id: &str) -> serde_json::Value {
    let actions: serde_json::Map<String, serde_json::Value> = self
      .results(task_id)
      .iter()
      .map(|r| {
        (
          r.action_id.clone(),
          json!({
            "success": r.success,
            "durationMs": r.duration_ms,
            "data": r.data,
            "error": r.error.as_ref().map(|e| e.message.clone()),
          }),
        )
      })
      .collect();

    json!({
      "taskId": task_id,
      "workspaceRoot": self.config.workspace_root,
      "actions": actions,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::result::{ActionError, ActionErrorKind, Phase};
  use chrono::Utc;

  fn result(id: &str, success: bool) -> ActionResult {
    ActionResult {
      action_id: id.to_string(),
      action_type: "echo".to_string(),
      phase: Phase::Step,
      success,
      started_at: Utc::now(),
      duration_ms: 5,
      data: json!({ "id": 42 }),
      error: (!success).then(|| ActionError::new(ActionErrorKind::Executor, "boom")),
    }
  }

  #[test]
  fn test_record_is_append_only_and_ordered() {
    let mut ctx = ExecutionContext::default();
    ctx.record("T1", result("a", true));
    ctx.record("T1", result("b", false));
    ctx.record("T2", result("c", true));

    let ids: Vec<&str> = ctx.results("T1").iter().map(|r| r.action_id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);
    assert_eq!(ctx.results("T2").len(), 1);
    assert!(ctx.results("unknown").is_empty());
    assert_eq!(ctx.task_ids().collect::<Vec<_>>(), vec!["T1", "T2"]);
  }

  #[test]
  fn test_lookup_by_action_id() {
    let mut ctx = ExecutionContext::default();
    ctx.record("T1", result("a", true));
    assert!(ctx.result("T1", "a").is_some());
    assert!(ctx.result("T1", "b").is_none());
    assert!(ctx.result("T2", "a").is_none());
  }

  #[test]
  fn test_template_scope_shape() {
    let mut ctx = ExecutionContext::new(GlobalConfiguration {
      workspace_root: Some("/srv".into()),
      ..Default::default()
    });
    ctx.record("T1", result("STEP.1", true));
    ctx.record("T1", result("STEP.2", false));

    let scope = ctx.template_scope("T1");
    assert_eq!(scope["taskId"], "T1");
    assert_eq!(scope["workspaceRoot"], "/srv");
    assert_eq!(scope["actions"]["STEP.1"]["data"]["id"], 42);
    assert_eq!(scope["actions"]["STEP.2"]["error"], "boom");
    assert_eq!(scope["actions"]["STEP.2"]["success"], false);
  }
}
