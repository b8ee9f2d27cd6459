mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc::UnboundedReceiver;

use specrun_builtins::{BuiltinConfig, BuiltinPlugins, DEFAULT_LATENCY_THRESHOLD_MS};
use specrun_engine::{ChannelNotifier, ExecutionEvent, RunnerConfig, SpecSource, TestRunner};
use specrun_plugin::{PluginProvider, RunResult};
use specrun_spec::SpecFormat;

/// Specrun - run declarative test specifications
#[derive(Parser)]
#[command(name = "specrun")]
#[command(version, about, long_about = None)]
struct Cli {
  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Run every task of a specification
  Run(RunArgs),
}

#[derive(clap::Args)]
struct RunArgs {
  /// Path to the specification file (JSON or YAML)
  spec_file: PathBuf,

  /// Format of the specification; inferred from the extension when omitted
  #[arg(long)]
  format: Option<SpecFormat>,

  /// Directory for evidence documents
  #[arg(long)]
  evidence_dir: Option<PathBuf>,

  /// Default per-action timeout in milliseconds
  #[arg(long)]
  timeout_ms: Option<u64>,

  /// Deadline for the whole run in milliseconds
  #[arg(long)]
  run_timeout_ms: Option<u64>,

  /// Fail conditions that no validator understands
  #[arg(long)]
  strict: bool,

  /// Steps slower than this are reported as technical debt
  #[arg(long, default_value_t = DEFAULT_LATENCY_THRESHOLD_MS)]
  latency_threshold_ms: u64,

  /// Print the run result as JSON instead of a summary
  #[arg(long)]
  json: bool,
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  logging::init();

  let rt = match tokio::runtime::Runtime::new() {
    Ok(rt) => rt,
    Err(e) => {
      eprintln!("error: failed to start runtime: {}", e);
      return ExitCode::from(2);
    }
  };

  let result = match cli.command {
    Commands::Run(args) => rt.block_on(run(args)),
  };

  match result {
    Ok(run) if run.is_success() => ExitCode::SUCCESS,
    Ok(_) => ExitCode::from(1),
    Err(e) => {
      eprintln!("error: {:#}", e);
      ExitCode::from(2)
    }
  }
}

async fn run(args: RunArgs) -> Result<RunResult> {
  let config = RunnerConfig {
    evidence_directory: args.evidence_dir,
    default_timeout_ms: args.timeout_ms,
    run_timeout_ms: args.run_timeout_ms,
    strict_validation: args.strict.then_some(true),
  };

  let (notifier, events) = ChannelNotifier::channel();
  let progress = tokio::spawn(print_progress(events));

  let mut runner = TestRunner::with_notifier(config, notifier);
  let providers: Vec<Box<dyn PluginProvider>> = vec![Box::new(BuiltinPlugins::new(BuiltinConfig {
    latency_threshold_ms: args.latency_threshold_ms,
  }))];
  runner
    .load_plugins(&providers)
    .context("failed to load plugins")?;

  runner
    .initialize(SpecSource::Path {
      path: args.spec_file.clone(),
      format: args.format,
    })
    .await
    .with_context(|| format!("failed to load specification: {}", args.spec_file.display()))?;

  let evidence_dir = runner
    .effective_config()
    .and_then(|c| c.evidence_directory.clone());

  let result = runner.execute().await;
  runner.cleanup().await;
  // closes the event channel
  drop(runner);
  let _ = progress.await;

  let run = result.context("run failed")?;

  if args.json {
    println!("{}", serde_json::to_string_pretty(&run)?);
  } else {
    print_summary(&run);
    if let Some(dir) = evidence_dir {
      println!("evidence: {}", dir.display());
    }
  }

  Ok(run)
}

async fn print_progress(mut events: UnboundedReceiver<ExecutionEvent>) {
  while let Some(event) = events.recv().await {
    match event {
      ExecutionEvent::TaskComplete { task_id, status } => {
        eprintln!("{:>8}  {}", status, task_id);
      }
      ExecutionEvent::Error { message } => eprintln!("warning: {}", message),
      ExecutionEvent::TaskStart { .. } | ExecutionEvent::ActionComplete { .. } => {}
    }
  }
}

fn print_summary(run: &RunResult) {
  for task in run.tasks.values() {
    println!("{:>8}  {}  ({}ms)", task.status, task.task_id, task.duration_ms);
    if let Some(error) = &task.error {
      println!("          {}", error);
    }
    for analysis in &task.failure_analysis {
      println!(
        "          [{}] {} - {}",
        analysis.category, analysis.description, analysis.recommendation
      );
    }
    for debt in &task.technical_debt {
      println!("          [{}] {}", debt.category, debt.description);
    }
  }

  println!(
    "\n{} tasks: {} passed, {} failed, {} skipped in {}ms",
    run.summary.total,
    run.summary.passed,
    run.summary.failed,
    run.summary.skipped,
    run.duration_ms
  );
}
