//! Technical debt detectors.

use async_trait::async_trait;
use specrun_plugin::{
  DebtDetector, DebtEvidence, Phase, PluginError, Severity, TaskResult, TechnicalDebtItem,
};

pub const DEFAULT_LATENCY_THRESHOLD_MS: u64 = 1_000;

/// Flags steps slower than a threshold.
///
/// One item per slow step. Severity is `HIGH` from twice the threshold on.
pub struct LatencyDetector {
  threshold_ms: u64,
}

impl LatencyDetector {
  pub fn new(threshold_ms: u64) -> Self {
    Self { threshold_ms }
  }
}

impl Default for LatencyDetector {
  fn default() -> Self {
    Self::new(DEFAULT_LATENCY_THRESHOLD_MS)
  }
}

#[async_trait]
impl DebtDetector for LatencyDetector {
  fn name(&self) -> &str {
    "latency"
  }

  fn priority(&self) -> i32 {
    100
  }

  async fn detect(&self, task: &TaskResult) -> Result<Vec<TechnicalDebtItem>, PluginError> {
    Ok(
      task
        .actions_in(Phase::Step)
        .filter(|a| a.duration_ms > self.threshold_ms)
        .map(|a| TechnicalDebtItem {
          detector: self.name().to_string(),
          category: "PERFORMANCE".to_string(),
          severity: if a.duration_ms >= self.threshold_ms.saturating_mul(2) {
            Severity::High
          } else {
            Severity::Medium
          },
          description: format!(
            "step '{}' took {}ms, above the {}ms threshold",
            a.action_id, a.duration_ms, self.threshold_ms
          ),
          recommendation: "profile the operation or raise the threshold if the latency is expected"
            .to_string(),
          evidence: DebtEvidence {
            metric: "durationMs".to_string(),
            threshold: self.threshold_ms as f64,
            actual: a.duration_ms as f64,
            step_ids: vec![a.action_id.clone()],
          },
        })
        .collect(),
    )
  }
}

/// Flags passing tasks that still had failing actions.
///
/// Those are actions marked `continueOnFailure`, or cleanup actions, whose
/// failures never reach the verdict.
pub struct ToleratedFailureDetector;

#[async_trait]
impl DebtDetector for ToleratedFailureDetector {
  fn name(&self) -> &str {
    "toleratedFailures"
  }

  fn priority(&self) -> i32 {
    50
  }

  async fn detect(&self, task: &TaskResult) -> Result<Vec<TechnicalDebtItem>, PluginError> {
    let failed: Vec<String> = task
      .actions
      .iter()
      .filter(|a| !a.success)
      .map(|a| a.action_id.clone())
      .collect();
    if failed.is_empty() {
      return Ok(Vec::new());
    }

    Ok(vec![TechnicalDebtItem {
      detector: self.name().to_string(),
      category: "RELIABILITY".to_string(),
      severity: Severity::Low,
      description: format!(
        "task passed with {} failing action(s): {}",
        failed.len(),
        failed.join(", ")
      ),
      recommendation: "fix the failing actions or remove them from the task".to_string(),
      evidence: DebtEvidence {
        metric: "failedActions".to_string(),
        threshold: 0.0,
        actual: failed.len() as f64,
        step_ids: failed,
      },
    }])
  }
}
