//! Failure analysis and technical-debt stages.
//!
//! Both stages are multi-subscriber: every registered analyzer (or detector)
//! runs, highest priority first, and every contribution is kept. A
//! subscriber that errors is reported and skipped.

use specrun_plugin::{FailureAnalysisResult, PluginRegistry, TaskResult, TechnicalDebtItem};
use tracing::{debug, warn};

use crate::events::{ExecutionEvent, ExecutionNotifier};

/// Runs the post-verdict analysis stages for a task.
pub struct AnalysisStage<'a, N: ExecutionNotifier> {
  registry: &'a PluginRegistry,
  notifier: &'a N,
}

impl<'a, N: ExecutionNotifier> AnalysisStage<'a, N> {
  pub fn new(registry: &'a PluginRegistry, notifier: &'a N) -> Self {
    Self { registry, notifier }
  }

  /// Classify a failed task.
  pub async fn analyze_failure(&self, task: &TaskResult) -> Vec<FailureAnalysisResult> {
    let mut results = Vec::new();

    for analyzer in self.registry.failure_analyzers() {
      match analyzer.analyze(task).await {
        Ok(contributions) => {
          debug!(
            task_id = %task.task_id,
            analyzer = %analyzer.name(),
            count = contributions.len(),
            "failure analyzer finished"
          );
          results.extend(contributions.into_iter().map(|mut r| {
            if r.analyzer.is_empty() {
              r.analyzer = analyzer.name().to_string();
            }
            if !(0.0..=1.0).contains(&r.confidence) {
              warn!(analyzer = %r.analyzer, confidence = r.confidence, "confidence out of range, clamping");
              r.confidence = if r.confidence.is_nan() {
                0.0
              } else {
                r.confidence.clamp(0.0, 1.0)
              };
            }
            r
          }));
        }
        Err(e) => self.report_error(&task.task_id, analyzer.name(), &e.to_string()),
      }
    }

    results
  }

  /// Look for quality issues in a passed task.
  pub async fn detect_debt(&self, task: &TaskResult) -> Vec<TechnicalDebtItem> {
    let mut items = Vec::new();

    for detector in self.registry.debt_detectors() {
      match detector.detect(task).await {
        Ok(found) => {
          debug!(
            task_id = %task.task_id,
            detector = %detector.name(),
            count = found.len(),
            "debt detector finished"
          );
          items.extend(found.into_iter().map(|mut item| {
            if item.detector.is_empty() {
              item.detector = detector.name().to_string();
            }
            item
          }));
        }
        Err(e) => self.report_error(&task.task_id, detector.name(), &e.to_string()),
      }
    }

    items
  }

  fn report_error(&self, task_id: &str, plugin: &str, error: &str) {
    warn!(task_id = %task_id, plugin = %plugin, error = %error, "analysis plugin failed");
    self.notifier.notify(ExecutionEvent::Error {
      message: format!("'{}' failed on task '{}': {}", plugin, task_id, error),
    });
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::events::ChannelNotifier;
  use async_trait::async_trait;
  use chrono::Utc;
  use specrun_plugin::{
    DebtDetector, DebtEvidence, FailureAnalyzer, Plugin, PluginError, Severity, TaskStatus,
    categories,
  };

  struct Analyzer {
    name: &'static str,
    priority: i32,
    confidence: f64,
    fail: bool,
  }

  #[async_trait]
  impl FailureAnalyzer for Analyzer {
    fn name(&self) -> &str {
      self.name
    }

    fn priority(&self) -> i32 {
      self.priority
    }

    async fn analyze(&self, _task: &TaskResult) -> Result<Vec<FailureAnalysisResult>, PluginError> {
      if self.fail {
        return Err(PluginError::failed("model unavailable"));
      }
      Ok(vec![FailureAnalysisResult {
        analyzer: String::new(),
        category: categories::NETWORK_ERROR.to_string(),
        severity: Severity::High,
        confidence: self.confidence,
        description: "connection refused".to_string(),
        recommendation: "check the service".to_string(),
        potential_causes: vec![],
      }])
    }
  }

  struct Detector {
    name: &'static str,
    priority: i32,
  }

  #[async_trait]
  impl DebtDetector for Detector {
    fn name(&self) -> &str {
      self.name
    }

    fn priority(&self) -> i32 {
      self.priority
    }

    async fn detect(&self, _task: &TaskResult) -> Result<Vec<TechnicalDebtItem>, PluginError> {
      Ok(vec![TechnicalDebtItem {
        detector: self.name.to_string(),
        category: "PERFORMANCE".to_string(),
        severity: Severity::Low,
        description: String::new(),
        recommendation: String::new(),
        evidence: DebtEvidence {
          metric: "durationMs".to_string(),
          threshold: 1.0,
          actual: 2.0,
          step_ids: vec![],
        },
      }])
    }
  }

  fn task() -> TaskResult {
    TaskResult {
      task_id: "T".to_string(),
      title: "t".to_string(),
      status: TaskStatus::Failed,
      started_at: Utc::now(),
      finished_at: Utc::now(),
      duration_ms: 0,
      actions: vec![],
      validation: None,
      failure_analysis: vec![],
      technical_debt: vec![],
      error: None,
    }
  }

  #[tokio::test]
  async fn test_all_analyzers_contribute_in_priority_order() {
    let mut registry = PluginRegistry::new();
    for (name, priority, confidence) in [("low", 1, 0.4), ("high", 10, 1.7), ("mid", 5, -0.2)] {
      registry
        .register(Plugin::failure_analyzer(Analyzer {
          name,
          priority,
          confidence,
          fail: false,
        }))
        .unwrap();
    }

    let (notifier, _rx) = ChannelNotifier::channel();
    let results = AnalysisStage::new(&registry, &notifier)
      .analyze_failure(&task())
      .await;

    let names: Vec<&str> = results.iter().map(|r| r.analyzer.as_str()).collect();
    assert_eq!(names, vec!["high", "mid", "low"]);
    assert_eq!(results[0].confidence, 1.0);
    assert_eq!(results[1].confidence, 0.0);
    assert_eq!(results[2].confidence, 0.4);
  }

  #[tokio::test]
  async fn test_failing_analyzer_is_skipped_and_reported() {
    let mut registry = PluginRegistry::new();
    registry
      .register(Plugin::failure_analyzer(Analyzer {
        name: "broken",
        priority: 10,
        confidence: 0.5,
        fail: true,
      }))
      .unwrap();
    registry
      .register(Plugin::failure_analyzer(Analyzer {
        name: "ok",
        priority: 0,
        confidence: 0.5,
        fail: false,
      }))
      .unwrap();

    let (notifier, mut rx) = ChannelNotifier::channel();
    let results = AnalysisStage::new(&registry, &notifier)
      .analyze_failure(&task())
      .await;

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].analyzer, "ok");
    match rx.try_recv().unwrap() {
      ExecutionEvent::Error { message } => assert!(message.contains("broken")),
      other => panic!("unexpected event {:?}", other),
    }
  }

  #[tokio::test]
  async fn test_every_detector_contributes() {
    let mut registry = PluginRegistry::new();
    registry
      .register(Plugin::debt_detector(Detector {
        name: "second",
        priority: 1,
      }))
      .unwrap();
    registry
      .register(Plugin::debt_detector(Detector {
        name: "first",
        priority: 2,
      }))
      .unwrap();

    let (notifier, _rx) = ChannelNotifier::channel();
    let mut passed = task();
    passed.status = TaskStatus::Passed;
    let items = AnalysisStage::new(&registry, &notifier)
      .detect_debt(&passed)
      .await;

    let names: Vec<&str> = items.iter().map(|i| i.detector.as_str()).collect();
    assert_eq!(names, vec!["first", "second"]);
  }
}
