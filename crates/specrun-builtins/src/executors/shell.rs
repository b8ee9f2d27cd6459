//! Process executors: `shell` runs commands, `stopProcess` ends background ones.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use specrun_plugin::{ActionRequest, ExecutionContext, Executor, ExecutorOutput, PluginError};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::params;

/// Bytes of stdout/stderr kept per stream. Anything past the limit is read
/// and discarded, never buffered.
const OUTPUT_LIMIT_BYTES: usize = 64 * 1024;

/// Background processes started by `shell`, keyed `<taskId>/<actionId>`.
#[derive(Clone, Default)]
pub struct ProcessTable {
  children: Arc<Mutex<HashMap<String, Child>>>,
}

impl ProcessTable {
  fn key(task_id: &str, action_id: &str) -> String {
    format!("{}/{}", task_id, action_id)
  }

  async fn insert(&self, key: String, child: Child) {
    let previous = self.children.lock().await.insert(key.clone(), child);
    if let Some(mut previous) = previous {
      warn!(key = %key, "replacing background process that is still tracked");
      let _ = previous.kill().await;
    }
  }

  async fn remove(&self, key: &str) -> Option<Child> {
    self.children.lock().await.remove(key)
  }

  /// Number of tracked processes.
  pub async fn len(&self) -> usize {
    self.children.lock().await.len()
  }

  pub async fn is_empty(&self) -> bool {
    self.len().await == 0
  }

  /// Kill and reap every tracked process.
  pub async fn kill_all(&self) -> usize {
    let children: Vec<(String, Child)> = self.children.lock().await.drain().collect();
    let count = children.len();
    for (key, mut child) in children {
      if let Err(e) = child.kill().await {
        warn!(key = %key, error = %e, "failed to kill background process");
      }
    }
    count
  }
}

/// Input for the `shell` action.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShellInput {
  /// Run through `sh -c`.
  command: Option<String>,
  /// Run directly, with `args`.
  program: Option<String>,
  #[serde(default)]
  args: Vec<String>,
  cwd: Option<PathBuf>,
  #[serde(default)]
  env: HashMap<String, String>,
  #[serde(default)]
  expect_exit_code: i32,
}

impl ShellInput {
  fn command(&self, ctx: &ExecutionContext) -> Result<(Command, String), PluginError> {
    let (mut cmd, shown) = match (&self.command, &self.program) {
      (Some(script), None) => {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        (cmd, script.clone())
      }
      (None, Some(program)) => {
        let mut cmd = Command::new(program);
        cmd.args(&self.args);
        let shown = std::iter::once(program.as_str())
          .chain(self.args.iter().map(String::as_str))
          .collect::<Vec<_>>()
          .join(" ");
        (cmd, shown)
      }
      (Some(_), Some(_)) => {
        return Err(PluginError::invalid_params(
          "'command' and 'program' are mutually exclusive",
        ));
      }
      (None, None) => {
        return Err(PluginError::invalid_params(
          "either 'command' or 'program' is required",
        ));
      }
    };

    let workspace_root = ctx.config().workspace_root.as_ref();
    let cwd = match (&self.cwd, workspace_root) {
      (Some(cwd), Some(root)) if cwd.is_relative() => Some(root.join(cwd)),
      (Some(cwd), _) => Some(cwd.clone()),
      (None, root) => root.cloned(),
    };
    if let Some(cwd) = cwd {
      cmd.current_dir(cwd);
    }

    cmd.envs(&self.env).stdin(Stdio::null()).kill_on_drop(true);
    Ok((cmd, shown))
  }
}

/// Runs shell commands and programs.
pub struct ShellExecutor {
  processes: ProcessTable,
}

impl ShellExecutor {
  pub fn new(processes: ProcessTable) -> Self {
    Self { processes }
  }

  async fn spawn_background(
    &self,
    request: &ActionRequest,
    mut cmd: Command,
    shown: &str,
  ) -> Result<ExecutorOutput, PluginError> {
    cmd.stdout(Stdio::null()).stderr(Stdio::null());
    let child = cmd
      .spawn()
      .map_err(|e| PluginError::failed(format!("failed to spawn '{}': {}", shown, e)))?;
    let pid = child.id();

    let key = ProcessTable::key(&request.task_id, &request.action_id);
    info!(key = %key, pid = ?pid, "background process started");
    self.processes.insert(key, child).await;

    Ok(ExecutorOutput::success(json!({ "pid": pid })))
  }
}

#[async_trait]
impl Executor for ShellExecutor {
  fn action_type(&self) -> &str {
    "shell"
  }

  #[instrument(name = "shell", skip_all, fields(action_id = %request.action_id))]
  async fn execute(
    &self,
    request: &ActionRequest,
    ctx: &ExecutionContext,
  ) -> Result<ExecutorOutput, PluginError> {
    let input: ShellInput = params::parse(&request.params)?;
    let (mut cmd, shown) = input.command(ctx)?;

    if request.is_background {
      return self.spawn_background(request, cmd, &shown).await;
    }

    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    debug!(command = %shown, "spawning child process");
    let mut child = cmd
      .spawn()
      .map_err(|e| PluginError::failed(format!("failed to spawn '{}': {}", shown, e)))?;
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    // pipes are drained while the child runs; dropping the child kills it
    let collect = async {
      tokio::try_join!(
        child.wait(),
        read_limited(stdout, OUTPUT_LIMIT_BYTES),
        read_limited(stderr, OUTPUT_LIMIT_BYTES),
      )
    };
    let (status, stdout, stderr) = tokio::select! {
      collected = collect => collected
        .map_err(|e| PluginError::failed(format!("failed to wait for '{}': {}", shown, e)))?,
      _ = request.cancel.cancelled() => {
        return Err(PluginError::failed(format!("'{}' was cancelled", shown)));
      }
    };

    if stdout.truncated > 0 || stderr.truncated > 0 {
      warn!(
        stdout_truncated = stdout.truncated,
        stderr_truncated = stderr.truncated,
        "output truncated"
      );
    }

    let exit_code = status.code();
    let data = json!({
      "exitCode": exit_code,
      "stdout": stdout.text(),
      "stderr": stderr.text(),
    });

    if exit_code == Some(input.expect_exit_code) {
      return Ok(ExecutorOutput::success(data));
    }

    let status = match exit_code {
      Some(code) => format!("exit code {}", code),
      None => "a signal".to_string(),
    };
    let mut message = format!(
      "'{}' exited with {} (expected {})",
      shown, status, input.expect_exit_code
    );
    if let Some(line) = last_line(&stderr.bytes) {
      message.push_str(": ");
      message.push_str(&line);
    }
    Ok(ExecutorOutput::failure(data, message))
  }

  async fn shutdown(&self) {
    let killed = self.processes.kill_all().await;
    if killed > 0 {
      info!(count = killed, "background processes stopped");
    }
  }
}

/// Stops a background process started by `shell`.
///
/// Params: `target` (action id), optional `task` (defaults to the current task).
pub struct StopProcessExecutor {
  processes: ProcessTable,
}

impl StopProcessExecutor {
  pub fn new(processes: ProcessTable) -> Self {
    Self { processes }
  }
}

#[async_trait]
impl Executor for StopProcessExecutor {
  fn action_type(&self) -> &str {
    "stopProcess"
  }

  async fn execute(
    &self,
    request: &ActionRequest,
    _ctx: &ExecutionContext,
  ) -> Result<ExecutorOutput, PluginError> {
    let target = params::required_str(&request.params, "target")?;
    let task = params::optional_str(&request.params, "task")?.unwrap_or(&request.task_id);
    let key = ProcessTable::key(task, target);

    let Some(mut child) = self.processes.remove(&key).await else {
      return Ok(ExecutorOutput::failure(
        json!({ "target": key }),
        format!("no background process tracked for '{}'", key),
      ));
    };
    let pid = child.id();

    let exited = child
      .try_wait()
      .map_err(|e| PluginError::failed(format!("failed to poll '{}': {}", key, e)))?;
    if let Some(status) = exited {
      debug!(key = %key, "background process had already exited");
      return Ok(ExecutorOutput::success(json!({
        "target": key,
        "pid": pid,
        "exitCode": status.code(),
        "alreadyExited": true,
      })));
    }

    child
      .kill()
      .await
      .map_err(|e| PluginError::failed(format!("failed to stop '{}': {}", key, e)))?;
    info!(key = %key, pid = ?pid, "background process stopped");

    Ok(ExecutorOutput::success(json!({
      "target": key,
      "pid": pid,
      "alreadyExited": false,
    })))
  }
}

/// The kept prefix of a stream and how many bytes were dropped after it.
struct Captured {
  bytes: Vec<u8>,
  truncated: usize,
}

impl Captured {
  /// Lossy UTF-8 with a notice when output was dropped.
  fn text(&self) -> String {
    let mut text = String::from_utf8_lossy(&self.bytes).into_owned();
    if self.truncated > 0 {
      text.push_str(&format!("\n[truncated {} bytes]", self.truncated));
    }
    text
  }
}

async fn read_limited<R: AsyncRead + Unpin>(
  reader: Option<R>,
  limit: usize,
) -> std::io::Result<Captured> {
  let mut captured = Captured {
    bytes: Vec::new(),
    truncated: 0,
  };
  let Some(mut reader) = reader else {
    return Ok(captured);
  };

  let mut chunk = [0u8; 8192];
  loop {
    let n = reader.read(&mut chunk).await?;
    if n == 0 {
      break;
    }
    let keep = n.min(limit.saturating_sub(captured.bytes.len()));
    captured.bytes.extend_from_slice(&chunk[..keep]);
    captured.truncated += n - keep;
  }
  Ok(captured)
}

fn last_line(bytes: &[u8]) -> Option<String> {
  String::from_utf8_lossy(bytes)
    .lines()
    .rev()
    .map(str::trim)
    .find(|l| !l.is_empty())
    .map(str::to_string)
}
