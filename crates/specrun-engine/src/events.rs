//! Run events and notifiers for observability.
//!
//! Events are emitted while a run executes so that consumers (a CLI
//! progress line, a CI adapter, an editor integration) can follow it
//! without the engine knowing they exist.

use serde::{Deserialize, Serialize};
use specrun_plugin::{Phase, TaskStatus};
use tokio::sync::mpsc;

/// Events emitted during a run, in the order results are produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ExecutionEvent {
  /// A task has started. Skipped tasks still get a start event.
  #[serde(rename_all = "camelCase")]
  TaskStart { task_id: String },

  /// An action has finished, successfully or not.
  #[serde(rename_all = "camelCase")]
  ActionComplete {
    task_id: String,
    action_id: String,
    phase: Phase,
    success: bool,
    duration_ms: u64,
  },

  /// A task has reached its final status.
  #[serde(rename_all = "camelCase")]
  TaskComplete { task_id: String, status: TaskStatus },

  /// An engine error that did not stop the run.
  Error { message: String },
}

/// Trait for receiving run events.
///
/// The engine calls `notify` for each event; implementations decide what
/// to do with them (stream, log, ignore).
pub trait ExecutionNotifier: Send + Sync {
  /// Called when a run event occurs.
  fn notify(&self, event: ExecutionEvent);
}

/// A no-op notifier that discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
  fn notify(&self, _event: ExecutionEvent) {}
}

/// A notifier that sends events to an unbounded channel.
///
/// Use this to consume events on another task while the run proceeds.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  // NOTE: Unbounded so a slow consumer never stalls the run. Volume is a
  // handful of events per action.
  sender: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelNotifier {
  /// Create a new channel notifier.
  pub fn new(sender: mpsc::UnboundedSender<ExecutionEvent>) -> Self {
    Self { sender }
  }

  /// Create a notifier together with the receiving end of its channel.
  pub fn channel() -> (Self, mpsc::UnboundedReceiver<ExecutionEvent>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (Self::new(sender), receiver)
  }
}

impl ExecutionNotifier for ChannelNotifier {
  fn notify(&self, event: ExecutionEvent) {
    // Receiver may have been dropped
    let _ = self.sender.send(event);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_event_wire_shape() {
    let event = ExecutionEvent::ActionComplete {
      task_id: "T1".to_string(),
      action_id: "STEP.1".to_string(),
      phase: Phase::Step,
      success: true,
      duration_ms: 12,
    };

    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(value["type"], "actionComplete");
    assert_eq!(value["actionId"], "STEP.1");
    assert_eq!(value["durationMs"], 12);

    let complete = ExecutionEvent::TaskComplete {
      task_id: "T1".to_string(),
      status: TaskStatus::Skipped,
    };
    assert_eq!(
      serde_json::to_value(&complete).unwrap(),
      json!({ "type": "taskComplete", "taskId": "T1", "status": "SKIPPED" })
    );
  }

  #[tokio::test]
  async fn test_channel_notifier_delivers_in_order() {
    let (notifier, mut rx) = ChannelNotifier::channel();
    notifier.notify(ExecutionEvent::TaskStart {
      task_id: "a".to_string(),
    });
    notifier.notify(ExecutionEvent::Error {
      message: "disk full".to_string(),
    });
    drop(notifier);

    assert!(matches!(rx.recv().await, Some(ExecutionEvent::TaskStart { .. })));
    assert!(matches!(rx.recv().await, Some(ExecutionEvent::Error { .. })));
    assert!(rx.recv().await.is_none());
  }

  #[test]
  fn test_send_after_receiver_dropped_is_ignored() {
    let (notifier, rx) = ChannelNotifier::channel();
    drop(rx);
    notifier.notify(ExecutionEvent::Error {
      message: "nobody listening".to_string(),
    });
  }
}
