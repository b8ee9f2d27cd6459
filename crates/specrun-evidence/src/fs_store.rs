use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use specrun_plugin::{ActionResult, RunResult, TaskResult};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::types::{ActionEvidence, timestamp_slug};
use crate::{EvidenceError, EvidenceStore};

const LATEST: &str = "latest.json";
const SUMMARY: &str = "summary.json";

/// Filesystem-based evidence store.
///
/// Evidence is stored in a directory structure:
/// ```text
/// {root}/
/// ├── latest.json                                  (most recent run, replaced each run)
/// ├── runs/
/// │   └── run-20261016T101500.123456Z-1a2b3c4d.json (one per run, never overwritten)
/// └── tasks/
///     └── TASK-1/
///         ├── summary.json
///         └── actions/                             (cleared when the task starts)
///             └── 000-STEP.1.json
/// ```
///
/// Action files carry their execution sequence so two ids that sanitize to
/// the same name never share a file.
pub struct FsEvidenceStore {
  root: PathBuf,
}

impl FsEvidenceStore {
  /// Create a store rooted at the given directory. Nothing is created until
  /// the first write.
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  /// Get the root directory of the store.
  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn latest_run_path(&self) -> PathBuf {
    self.root.join(LATEST)
  }

  pub fn runs_dir(&self) -> PathBuf {
    self.root.join("runs")
  }

  pub fn task_dir(&self, task_id: &str) -> PathBuf {
    self.root.join("tasks").join(sanitize(task_id))
  }

  pub fn actions_dir(&self, task_id: &str) -> PathBuf {
    self.task_dir(task_id).join("actions")
  }

  pub fn action_path(&self, task_id: &str, sequence: usize, action_id: &str) -> PathBuf {
    self
      .actions_dir(task_id)
      .join(format!("{:03}-{}.json", sequence, sanitize(action_id)))
  }

  fn run_path(&self, run: &RunResult) -> PathBuf {
    let short_id: String = run.run_id.chars().take(8).collect();
    self.runs_dir().join(format!(
      "run-{}-{}.json",
      timestamp_slug(run.started_at),
      sanitize(&short_id)
    ))
  }
}

#[async_trait]
impl EvidenceStore for FsEvidenceStore {
  async fn begin_task(&self, task_id: &str) -> Result<(), EvidenceError> {
    let dir = self.actions_dir(task_id);
    match fs::remove_dir_all(&dir).await {
      Ok(()) => {
        debug!(path = %dir.display(), "previous action evidence cleared");
        Ok(())
      }
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
      Err(e) => Err(io_error(&dir)(e)),
    }
  }

  async fn write_action(
    &self,
    task_id: &str,
    sequence: usize,
    result: &ActionResult,
  ) -> Result<(), EvidenceError> {
    let evidence = ActionEvidence {
      task_id: task_id.to_string(),
      sequence,
      recorded_at: Utc::now(),
      result: result.clone(),
    };
    let path = self.action_path(task_id, sequence, &result.action_id);
    write_json(&path, &evidence).await
  }

  async fn write_task(&self, task: &TaskResult) -> Result<(), EvidenceError> {
    let path = self.task_dir(&task.task_id).join(SUMMARY);
    write_json(&path, task).await
  }

  async fn write_run(&self, run: &RunResult) -> Result<(), EvidenceError> {
    // latest is written even when the timestamped copy fails
    let copy = write_json_new(&self.run_path(run), run).await;
    let latest = write_json_atomic(&self.latest_run_path(), run).await;
    copy.and(latest)
  }

  async fn read_task(&self, task_id: &str) -> Result<TaskResult, EvidenceError> {
    read_json(&self.task_dir(task_id).join(SUMMARY), task_id).await
  }

  async fn read_action(
    &self,
    task_id: &str,
    action_id: &str,
  ) -> Result<ActionEvidence, EvidenceError> {
    let what = format!("{}/{}", task_id, action_id);
    let dir = self.actions_dir(task_id);
    let suffix = format!("-{}.json", sanitize(action_id));

    let mut entries = match fs::read_dir(&dir).await {
      Ok(entries) => entries,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        return Err(EvidenceError::NotFound(what));
      }
      Err(e) => return Err(io_error(&dir)(e)),
    };

    let mut candidates = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(io_error(&dir))? {
      let name = entry.file_name().to_string_lossy().into_owned();
      if name.ends_with(&suffix) {
        candidates.push(entry.path());
      }
    }
    candidates.sort();

    for path in candidates {
      let evidence: ActionEvidence = read_json(&path, &what).await?;
      if evidence.result.action_id == action_id {
        return Ok(evidence);
      }
    }
    Err(EvidenceError::NotFound(what))
  }

  async fn read_latest_run(&self) -> Result<RunResult, EvidenceError> {
    read_json(&self.latest_run_path(), "latest run").await
  }
}

/// Replace anything outside `[A-Za-z0-9._-]` so ids are safe path components.
fn sanitize(id: &str) -> String {
  let cleaned: String = id
    .chars()
    .map(|c| {
      if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
        c
      } else {
        '_'
      }
    })
    .collect();

  match cleaned.as_str() {
    "" | "." | ".." => format!("_{}", cleaned),
    _ => cleaned,
  }
}

fn encode<T: Serialize>(path: &Path, value: &T) -> Result<Vec<u8>, EvidenceError> {
  serde_json::to_vec_pretty(value).map_err(|source| EvidenceError::Serialization {
    path: path.to_path_buf(),
    source,
  })
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> EvidenceError + '_ {
  move |source| EvidenceError::Io {
    path: path.to_path_buf(),
    source,
  }
}

async fn ensure_parent(path: &Path) -> Result<(), EvidenceError> {
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent).await.map_err(io_error(parent))?;
  }
  Ok(())
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), EvidenceError> {
  let bytes = encode(path, value)?;
  ensure_parent(path).await?;
  fs::write(path, bytes).await.map_err(io_error(path))?;
  debug!(path = %path.display(), "evidence written");
  Ok(())
}

/// Write via a temp file and rename so readers never see a partial document.
async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), EvidenceError> {
  let bytes = encode(path, value)?;
  ensure_parent(path).await?;
  let tmp = path.with_extension("json.tmp");
  fs::write(&tmp, bytes).await.map_err(io_error(&tmp))?;
  fs::rename(&tmp, path).await.map_err(io_error(path))?;
  debug!(path = %path.display(), "evidence written");
  Ok(())
}

/// Write a document that must not already exist.
async fn write_json_new<T: Serialize>(path: &Path, value: &T) -> Result<(), EvidenceError> {
  let bytes = encode(path, value)?;
  ensure_parent(path).await?;

  let mut file = match fs::OpenOptions::new()
    .write(true)
    .create_new(true)
    .open(path)
    .await
  {
    Ok(file) => file,
    Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
      return Err(EvidenceError::AlreadyExists {
        path: path.to_path_buf(),
      });
    }
    Err(e) => return Err(io_error(path)(e)),
  };

  file.write_all(&bytes).await.map_err(io_error(path))?;
  file.flush().await.map_err(io_error(path))?;
  debug!(path = %path.display(), "evidence written");
  Ok(())
}

async fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T, EvidenceError> {
  let bytes = match fs::read(path).await {
    Ok(bytes) => bytes,
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
      return Err(EvidenceError::NotFound(what.to_string()));
    }
    Err(e) => return Err(io_error(path)(e)),
  };

  serde_json::from_slice(&bytes).map_err(|source| EvidenceError::Serialization {
    path: path.to_path_buf(),
    source,
  })
}
