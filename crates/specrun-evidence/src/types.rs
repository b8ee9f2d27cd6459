use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use specrun_plugin::ActionResult;

/// Persisted record of one executed action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionEvidence {
  pub task_id: String,
  /// Zero-based execution position within the task.
  pub sequence: usize,
  pub recorded_at: DateTime<Utc>,
  pub result: ActionResult,
}

/// Fixed-width UTC timestamp that sorts lexically in time order,
/// e.g. `20261016T101500.123456Z`.
pub fn timestamp_slug(at: DateTime<Utc>) -> String {
  at.format("%Y%m%dT%H%M%S%.6fZ").to_string()
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  #[test]
  fn test_timestamp_slug_sorts_in_time_order() {
    let earlier = Utc.with_ymd_and_hms(2026, 1, 9, 23, 59, 59).unwrap();
    let later = Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap();

    let a = timestamp_slug(earlier);
    let b = timestamp_slug(later);
    assert_eq!(a, "20260109T235959.000000Z");
    assert!(a < b);
  }
}
