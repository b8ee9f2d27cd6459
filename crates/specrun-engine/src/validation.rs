//! Validation engine.
//!
//! Failure conditions are checked first, in declaration order; the first one
//! that holds decides the verdict and nothing further is evaluated. Otherwise
//! every success condition is evaluated and all of them must hold.

use specrun_plugin::{ConditionOutcome, ExecutionContext, PluginRegistry, ValidationResult};
use specrun_spec::{Condition, ValidationCriteria};
use tracing::{debug, warn};

/// Whether a condition was declared as a success or a failure condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
  Success,
  Failure,
}

/// Evaluates a task's declared criteria against the execution context.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidationEngine {
  strict: bool,
}

impl ValidationEngine {
  /// `strict` makes an unregistered condition type fail the task instead of
  /// passing with a warning.
  pub fn new(strict: bool) -> Self {
    Self { strict }
  }

  pub fn is_strict(&self) -> bool {
    self.strict
  }

  /// Evaluate criteria for one task.
  pub async fn evaluate(
    &self,
    criteria: Option<&ValidationCriteria>,
    task_id: &str,
    ctx: &ExecutionContext,
    registry: &PluginRegistry,
  ) -> ValidationResult {
    let Some(criteria) = criteria else {
      return ValidationResult::vacuous();
    };

    let mut result = ValidationResult::vacuous();

    for condition in &criteria.failure {
      let (outcome, fails) = self
        .check(Role::Failure, condition, task_id, ctx, registry)
        .await;
      result.warnings.extend(outcome.warning.clone());
      result.failure_conditions.push(outcome);
      if fails {
        debug!(task_id = %task_id, condition_type = %condition.condition_type, "failure condition triggered");
        result.passed = false;
        return result;
      }
    }

    for condition in &criteria.success {
      let (outcome, fails) = self
        .check(Role::Success, condition, task_id, ctx, registry)
        .await;
      result.warnings.extend(outcome.warning.clone());
      result.success_conditions.push(outcome);
      if fails {
        result.passed = false;
      }
    }

    result
  }

  /// Evaluate one condition. The flag is true when it fails the verdict.
  async fn check(
    &self,
    role: Role,
    condition: &Condition,
    task_id: &str,
    ctx: &ExecutionContext,
    registry: &PluginRegistry,
  ) -> (ConditionOutcome, bool) {
    let mut outcome = ConditionOutcome {
      condition_type: condition.condition_type.clone(),
      description: condition.description.clone(),
      holds: false,
      warning: None,
      error: None,
    };

    let Some(validator) = registry.validator(&condition.condition_type) else {
      let message = format!(
        "no validator registered for condition type '{}'",
        condition.condition_type
      );
      warn!(task_id = %task_id, strict = self.strict, "{}", message);
      outcome.warning = Some(message);
      // lenient: success conditions hold, failure conditions do not trigger
      outcome.holds = match role {
        Role::Success => !self.strict,
        Role::Failure => self.strict,
      };
      return (outcome, self.strict);
    };

    match validator.validate(condition, task_id, ctx).await {
      Ok(holds) => {
        outcome.holds = holds;
        let fails = match role {
          Role::Success => !holds,
          Role::Failure => holds,
        };
        (outcome, fails)
      }
      Err(e) => {
        warn!(task_id = %task_id, condition_type = %condition.condition_type, error = %e, "validator failed");
        outcome.error = Some(e.to_string());
        (outcome, true)
      }
    }
  }
}
