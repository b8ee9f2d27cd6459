//! Specrun Builtins
//!
//! Stock plugins for every capability, bundled behind one
//! [`PluginProvider`]:
//!
//! | Capability      | Plugins                                         |
//! |-----------------|-------------------------------------------------|
//! | executor        | `shell`, `stopProcess`, `sleep`, `echo`         |
//! | validator       | `actionSucceeded`, `outputEquals`, `outputMatches`, `durationBelow` |
//! | failure analyzer| `errorPatterns`, `validationMismatch`           |
//! | debt detector   | `latency`, `toleratedFailures`                  |
//! | reporter        | `summary`                                       |

mod analyzers;
mod detectors;
mod executors;
mod params;
mod reporter;
mod validators;

pub use analyzers::{ErrorPatternAnalyzer, ValidationMismatchAnalyzer};
pub use detectors::{DEFAULT_LATENCY_THRESHOLD_MS, LatencyDetector, ToleratedFailureDetector};
pub use executors::{EchoExecutor, ProcessTable, ShellExecutor, SleepExecutor, StopProcessExecutor};
pub use reporter::SummaryReporter;
pub use validators::{
  ActionSucceededValidator, DurationBelowValidator, OutputEqualsValidator, OutputMatchesValidator,
};

use specrun_plugin::{Plugin, PluginError, PluginProvider};

/// Tunables for the builtin plugins.
#[derive(Debug, Clone, Copy)]
pub struct BuiltinConfig {
  /// Steps slower than this are flagged by the `latency` detector.
  pub latency_threshold_ms: u64,
}

impl Default for BuiltinConfig {
  fn default() -> Self {
    Self {
      latency_threshold_ms: DEFAULT_LATENCY_THRESHOLD_MS,
    }
  }
}

/// Provider for every builtin plugin.
#[derive(Debug, Clone, Default)]
pub struct BuiltinPlugins {
  config: BuiltinConfig,
}

impl BuiltinPlugins {
  pub fn new(config: BuiltinConfig) -> Self {
    Self { config }
  }
}

impl PluginProvider for BuiltinPlugins {
  fn name(&self) -> &str {
    "builtins"
  }

  fn provide(&self) -> Result<Vec<Plugin>, PluginError> {
    let processes = ProcessTable::default();

    Ok(vec![
      Plugin::executor(ShellExecutor::new(processes.clone())),
      Plugin::executor(StopProcessExecutor::new(processes)),
      Plugin::executor(SleepExecutor),
      Plugin::executor(EchoExecutor),
      Plugin::validator(ActionSucceededValidator),
      Plugin::validator(OutputEqualsValidator),
      Plugin::validator(OutputMatchesValidator),
      Plugin::validator(DurationBelowValidator),
      Plugin::failure_analyzer(ErrorPatternAnalyzer),
      Plugin::failure_analyzer(ValidationMismatchAnalyzer),
      Plugin::debt_detector(LatencyDetector::new(self.config.latency_threshold_ms)),
      Plugin::debt_detector(ToleratedFailureDetector),
      Plugin::reporter(SummaryReporter),
    ])
  }
}
