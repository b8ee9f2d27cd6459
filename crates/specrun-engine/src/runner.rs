//! Run controller.
//!
//! The [`TestRunner`] is the engine's façade: it owns the plugin registry,
//! loads one specification, runs its tasks one at a time and hands back a
//! complete [`RunResult`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use indexmap::IndexMap;
use specrun_evidence::{EvidenceStore, FsEvidenceStore};
use specrun_plugin::{
  ExecutionContext, LoadReport, PluginProvider, PluginRegistry, RunResult, RunSummary, TaskResult,
};
use specrun_spec::{GlobalConfiguration, SpecFormat, SpecLoader, Specification};
use tokio::time::Instant;
use tracing::{info, instrument, warn};

use crate::dispatcher::DEFAULT_ACTION_TIMEOUT_MS;
use crate::error::EngineError;
use crate::events::{ExecutionEvent, ExecutionNotifier, NoopNotifier};
use crate::orchestrator::{RunDeadline, TaskOrchestrator};
use crate::validation::ValidationEngine;

/// Where a specification comes from.
#[derive(Debug, Clone)]
pub enum SpecSource {
  /// A file; the format is inferred from the extension unless given.
  Path {
    path: PathBuf,
    format: Option<SpecFormat>,
  },
  /// An in-memory document.
  Raw { content: String, format: SpecFormat },
}

impl SpecSource {
  pub fn path(path: impl Into<PathBuf>) -> Self {
    Self::Path {
      path: path.into(),
      format: None,
    }
  }

  pub fn raw(content: impl Into<String>, format: SpecFormat) -> Self {
    Self::Raw {
      content: content.into(),
      format,
    }
  }
}

/// Overrides applied on top of a specification's global configuration.
///
/// Precedence: these values, then the specification, then built-in defaults.
#[derive(Debug, Clone, Default)]
pub struct RunnerConfig {
  pub evidence_directory: Option<PathBuf>,
  /// Per-action timeout in milliseconds.
  pub default_timeout_ms: Option<u64>,
  /// Whole-run budget in milliseconds.
  pub run_timeout_ms: Option<u64>,
  pub strict_validation: Option<bool>,
}

impl RunnerConfig {
  /// Merge with a specification's configuration. Every optional field that
  /// has a default is filled in on the result.
  pub fn resolve(&self, spec: &GlobalConfiguration) -> GlobalConfiguration {
    let workspace_root = spec.workspace_root.clone();
    let base = workspace_root
      .clone()
      .or_else(|| std::env::current_dir().ok())
      .unwrap_or_else(|| PathBuf::from("."));

    let evidence_directory = match self
      .evidence_directory
      .clone()
      .or_else(|| spec.evidence_directory.clone())
    {
      Some(dir) if dir.is_relative() && workspace_root.is_some() => base.join(dir),
      Some(dir) => dir,
      None => base.join(".specrun").join("evidence"),
    };

    GlobalConfiguration {
      workspace_root,
      evidence_directory: Some(evidence_directory),
      timeout: Some(
        self
          .default_timeout_ms
          .or(spec.timeout)
          .unwrap_or(DEFAULT_ACTION_TIMEOUT_MS),
      ),
      run_timeout: self.run_timeout_ms.or(spec.run_timeout),
      strict_validation: self.strict_validation.unwrap_or(spec.strict_validation),
    }
  }
}

/// A specification loaded by `initialize` and ready to run.
struct Loaded {
  spec: Specification,
  config: GlobalConfiguration,
}

/// Runs specifications against a set of plugins.
///
/// Generic over `N: ExecutionNotifier` to allow different notification strategies.
/// Use `TestRunner::new()` for a runner whose events are discarded, or
/// `TestRunner::with_notifier()` to observe them.
///
/// # Usage
///
/// ```ignore
/// let (notifier, mut events) = ChannelNotifier::channel();
/// let mut runner = TestRunner::with_notifier(RunnerConfig::default(), notifier);
/// runner.load_plugins(&[Box::new(BuiltinPlugins::default())])?;
/// runner.initialize(SpecSource::path("specs/api.yaml")).await?;
/// let run = runner.execute().await?;
/// runner.cleanup().await;
/// ```
pub struct TestRunner<N: ExecutionNotifier = NoopNotifier> {
  config: RunnerConfig,
  loader: SpecLoader,
  registry: PluginRegistry,
  notifier: N,
  custom_store: Option<Arc<dyn EvidenceStore>>,
  store: Option<Arc<dyn EvidenceStore>>,
  loaded: Option<Loaded>,
  last_run: Option<RunResult>,
}

impl TestRunner<NoopNotifier> {
  /// Create a runner with no-op notifications.
  pub fn new(config: RunnerConfig) -> Self {
    Self::with_notifier(config, NoopNotifier)
  }
}

impl<N: ExecutionNotifier> TestRunner<N> {
  /// Create a runner with a custom notifier.
  pub fn with_notifier(config: RunnerConfig, notifier: N) -> Self {
    Self {
      config,
      loader: SpecLoader::default(),
      registry: PluginRegistry::new(),
      notifier,
      custom_store: None,
      store: None,
      loaded: None,
      last_run: None,
    }
  }

  /// Use a different loader, e.g. one with an injected environment.
  pub fn with_loader(mut self, loader: SpecLoader) -> Self {
    self.loader = loader;
    self
  }

  /// Write evidence to `store` instead of the configured directory.
  pub fn with_evidence_store(mut self, store: Arc<dyn EvidenceStore>) -> Self {
    self.custom_store = Some(store);
    self
  }

  pub fn registry(&self) -> &PluginRegistry {
    &self.registry
  }

  /// Register plugins explicitly.
  pub fn registry_mut(&mut self) -> &mut PluginRegistry {
    &mut self.registry
  }

  pub fn notifier(&self) -> &N {
    &self.notifier
  }

  /// The loaded specification, if any.
  pub fn specification(&self) -> Option<&Specification> {
    self.loaded.as_ref().map(|l| &l.spec)
  }

  /// Effective configuration of the loaded specification.
  pub fn effective_config(&self) -> Option<&GlobalConfiguration> {
    self.loaded.as_ref().map(|l| &l.config)
  }

  /// Result of the most recent `execute`.
  pub fn last_run(&self) -> Option<&RunResult> {
    self.last_run.as_ref()
  }

  /// Register plugins from providers.
  ///
  /// Failures are reported as error events and in the returned report; only
  /// a complete failure of every supplied provider is fatal.
  pub fn load_plugins(
    &mut self,
    providers: &[Box<dyn PluginProvider>],
  ) -> Result<LoadReport, EngineError> {
    let report = self.registry.load(providers);

    for (source, message) in &report.failed {
      self.notifier.notify(ExecutionEvent::Error {
        message: format!("plugin '{}' failed to load: {}", source, message),
      });
    }

    if !providers.is_empty() && report.providers_ok == 0 {
      return Err(EngineError::PluginRegistry {
        message: format!("all {} plugin providers failed to load", providers.len()),
      });
    }

    info!(
      loaded = report.loaded.len(),
      failed = report.failed.len(),
      "plugins loaded"
    );
    Ok(report)
  }

  /// Load and validate a specification, replacing any previous one.
  pub async fn initialize(&mut self, source: SpecSource) -> Result<(), EngineError> {
    let spec = match source {
      SpecSource::Path { path, format } => self.loader.load_path(&path, format).await?,
      SpecSource::Raw { content, format } => self.loader.load_str(&content, format)?,
    };

    let config = self.config.resolve(&spec.global_configuration);
    let store: Arc<dyn EvidenceStore> = match &self.custom_store {
      Some(store) => store.clone(),
      None => {
        let dir = config
          .evidence_directory
          .clone()
          .unwrap_or_else(|| PathBuf::from(".specrun/evidence"));
        Arc::new(FsEvidenceStore::new(dir))
      }
    };

    info!(
      schema_version = %spec.schema_version,
      tasks = spec.tasks.len(),
      evidence_directory = ?config.evidence_directory,
      strict_validation = config.strict_validation,
      "specification initialized"
    );

    self.store = Some(store);
    self.loaded = Some(Loaded { spec, config });
    self.last_run = None;
    Ok(())
  }

  /// Run every task of the loaded specification, in declaration order.
  ///
  /// Only fatal errors are returned as `Err`. Failed tasks, failed actions
  /// and evidence problems are all part of the returned [`RunResult`] or
  /// the event stream.
  pub async fn execute(&mut self) -> Result<RunResult, EngineError> {
    let run = self.run_loaded().await?;
    self.last_run = Some(run.clone());
    Ok(run)
  }

  #[instrument(name = "run", skip(self))]
  async fn run_loaded(&self) -> Result<RunResult, EngineError> {
    let loaded = self.loaded.as_ref().ok_or(EngineError::NotInitialized)?;
    let config = &loaded.config;

    let run_id = uuid::Uuid::new_v4().to_string();
    let started_at = Utc::now();
    let start = Instant::now();
    let deadline = config
      .run_timeout
      .map(|ms| RunDeadline::new(Duration::from_millis(ms)));

    info!(run_id = %run_id, tasks = loaded.spec.tasks.len(), "run started");

    let orchestrator = TaskOrchestrator::new(
      &self.registry,
      Duration::from_millis(config.timeout.unwrap_or(DEFAULT_ACTION_TIMEOUT_MS)),
      ValidationEngine::new(config.strict_validation),
      self.store.as_deref(),
      &self.notifier,
    );

    let mut ctx = ExecutionContext::new(config.clone());
    let mut tasks = IndexMap::with_capacity(loaded.spec.tasks.len());
    for (task_id, task) in &loaded.spec.tasks {
      let result = orchestrator
        .run_task(task_id, task, &mut ctx, deadline.as_ref())
        .await;
      tasks.insert(task_id.clone(), result);
    }

    let summary = RunSummary::from_statuses(tasks.values().map(|t| t.status));
    let run = RunResult {
      run_id,
      schema_version: loaded.spec.schema_version.clone(),
      started_at,
      finished_at: Utc::now(),
      duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
      tasks,
      summary,
    };

    for reporter in self.registry.reporters() {
      if let Err(e) = reporter.report(&run).await {
        self.advise(format!("reporter '{}' failed: {}", reporter.name(), e));
      }
    }

    if let Some(store) = &self.store
      && let Err(e) = store.write_run(&run).await
    {
      self.advise(format!("failed to write run evidence: {}", e));
    }

    info!(
      run_id = %run.run_id,
      total = run.summary.total,
      passed = run.summary.passed,
      failed = run.summary.failed,
      skipped = run.summary.skipped,
      duration_ms = run.duration_ms,
      "run finished"
    );
    Ok(run)
  }

  /// Result of one task: from the last run if it is still in memory,
  /// otherwise read back from evidence.
  pub async fn get_evidence(&self, task_id: &str) -> Result<TaskResult, EngineError> {
    if let Some(task) = self.last_run.as_ref().and_then(|r| r.tasks.get(task_id)) {
      return Ok(task.clone());
    }

    let store = self.store.as_ref().ok_or(EngineError::NotInitialized)?;
    Ok(store.read_task(task_id).await?)
  }

  /// Shut every executor down and drop the loaded specification.
  ///
  /// Background processes started by executors are stopped here. The
  /// result of the last run stays available through `get_evidence`.
  pub async fn cleanup(&mut self) {
    for executor in self.registry.executors() {
      executor.shutdown().await;
    }
    self.loaded = None;
    info!("test runner cleaned up");
  }

  fn advise(&self, message: String) {
    warn!(error = %message, "run error");
    self.notifier.notify(ExecutionEvent::Error { message });
  }
}
