//! Capability registry.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::capability::{
  Capability, DebtDetector, Executor, FailureAnalyzer, Plugin, PluginProvider, Reporter, Validator,
};
use crate::error::RegistryError;

/// Holds registered plugins by capability.
///
/// Executors and validators are keyed; registering a second plugin for the
/// same key is rejected and the first registration stays in place.
/// Analyzers, detectors and reporters are multi-subscriber.
#[derive(Default, Clone)]
pub struct PluginRegistry {
  executors: HashMap<String, Arc<dyn Executor>>,
  validators: HashMap<String, Arc<dyn Validator>>,
  failure_analyzers: Vec<Arc<dyn FailureAnalyzer>>,
  debt_detectors: Vec<Arc<dyn DebtDetector>>,
  reporters: Vec<Arc<dyn Reporter>>,
}

/// Outcome of loading plugins from providers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
  /// `(capability, name)` of every registered plugin.
  pub loaded: Vec<(Capability, String)>,
  /// `(source, message)` for every provider or plugin that failed.
  pub failed: Vec<(String, String)>,
  /// Providers that yielded plugins without failing outright.
  pub providers_ok: usize,
}

impl PluginRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a plugin under its capability.
  pub fn register(&mut self, plugin: Plugin) -> Result<(), RegistryError> {
    let capability = plugin.capability();
    if plugin.name().trim().is_empty() {
      return Err(RegistryError::EmptyKey { capability });
    }

    match plugin {
      Plugin::Executor(executor) => {
        let key = executor.action_type().to_string();
        if self.executors.contains_key(&key) {
          return Err(RegistryError::DuplicateExecutor { action_type: key });
        }
        debug!(action_type = %key, "registered executor");
        self.executors.insert(key, executor);
      }
      Plugin::Validator(validator) => {
        let key = validator.condition_type().to_string();
        if self.validators.contains_key(&key) {
          return Err(RegistryError::DuplicateValidator {
            condition_type: key,
          });
        }
        debug!(condition_type = %key, "registered validator");
        self.validators.insert(key, validator);
      }
      Plugin::FailureAnalyzer(analyzer) => {
        debug!(name = %analyzer.name(), priority = analyzer.priority(), "registered failure analyzer");
        self.failure_analyzers.push(analyzer);
      }
      Plugin::DebtDetector(detector) => {
        debug!(name = %detector.name(), priority = detector.priority(), "registered debt detector");
        self.debt_detectors.push(detector);
      }
      Plugin::Reporter(reporter) => {
        debug!(name = %reporter.name(), "registered reporter");
        self.reporters.push(reporter);
      }
    }

    Ok(())
  }

  /// Load plugins from every provider.
  ///
  /// A provider that fails, or a plugin that cannot be registered, is
  /// reported in the returned [`LoadReport`] and left out. Loading never
  /// stops early.
  pub fn load(&mut self, providers: &[Box<dyn PluginProvider>]) -> LoadReport {
    let mut report = LoadReport::default();

    for provider in providers {
      let plugins = match provider.provide() {
        Ok(plugins) => plugins,
        Err(e) => {
          warn!(provider = %provider.name(), error = %e, "plugin provider failed to load");
          report
            .failed
            .push((provider.name().to_string(), e.to_string()));
          continue;
        }
      };
      report.providers_ok += 1;

      for plugin in plugins {
        let capability = plugin.capability();
        let name = plugin.name().to_string();
        match self.register(plugin) {
          Ok(()) => report.loaded.push((capability, name)),
          Err(e) => {
            warn!(provider = %provider.name(), plugin = %name, error = %e, "plugin rejected");
            report
              .failed
              .push((format!("{}/{}", provider.name(), name), e.to_string()));
          }
        }
      }
    }

    report
  }

  /// Executor registered for an action type.
  pub fn executor(&self, action_type: &str) -> Option<Arc<dyn Executor>> {
    self.executors.get(action_type).cloned()
  }

  /// Validator registered for a condition type.
  pub fn validator(&self, condition_type: &str) -> Option<Arc<dyn Validator>> {
    self.validators.get(condition_type).cloned()
  }

  /// All failure analyzers, highest priority first. Ties keep registration order.
  pub fn failure_analyzers(&self) -> Vec<Arc<dyn FailureAnalyzer>> {
    let mut analyzers = self.failure_analyzers.clone();
    analyzers.sort_by_key(|a| std::cmp::Reverse(a.priority()));
    analyzers
  }

  /// All debt detectors, highest priority first. Ties keep registration order.
  pub fn debt_detectors(&self) -> Vec<Arc<dyn DebtDetector>> {
    let mut detectors = self.debt_detectors.clone();
    detectors.sort_by_key(|d| std::cmp::Reverse(d.priority()));
    detectors
  }

  /// All reporters in registration order.
  pub fn reporters(&self) -> &[Arc<dyn Reporter>] {
    &self.reporters
  }

  /// All executors, in no particular order.
  pub fn executors(&self) -> impl Iterator<Item = &Arc<dyn Executor>> {
    self.executors.values()
  }

  /// Number of registered plugins with the given capability.
  pub fn count(&self, capability: Capability) -> usize {
    match capability {
      Capability::Executor => self.executors.len(),
      Capability::Validator => self.validators.len(),
      Capability::FailureAnalyzer => self.failure_analyzers.len(),
      Capability::DebtDetector => self.debt_detectors.len(),
      Capability::Reporter => self.reporters.len(),
    }
  }
}

impl std::fmt::Debug for PluginRegistry {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("PluginRegistry")
      .field("executors", &self.executors.keys().collect::<Vec<_>>())
      .field("validators", &self.validators.keys().collect::<Vec<_>>())
      .field("failure_analyzers", &self.failure_analyzers.len())
      .field("debt_detectors", &self.debt_detectors.len())
      .field("reporters", &self.reporters.len())
      .finish()
  }
}
