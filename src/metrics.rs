//! # Metric Snapshots
//!
//! Named numeric events emitted by the engine when metrics gathering is
//! enabled. Each snapshot is keyed by a metric name and an optional subject
//! (usually a node or Row Set name) and carries a [`SnapshotType`] telling the
//! consumer how to fold it: `START`/`STOP` pairs bracket a duration, while
//! `MAX`/`MIN`/`SUM`/`COUNT` carry a value.
//!
//! Where snapshots end up is decided by the [`LogChannel`](crate::logging::LogChannel).
//! [`MetricsSummary`] folds a list of snapshots into durations and aggregates.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Preparation of a run: validation, propagation, allocation and init.
pub const RUN_PREPARE: &str = "run.prepare";
/// Execution of a run, from start to the last executor disposed.
pub const RUN_EXECUTION: &str = "run.execution";
/// Init hook of one node copy.
pub const NODE_INIT: &str = "node.init";
/// Executor loop of one node copy.
pub const NODE_EXECUTION: &str = "node.execution";
/// Rows read by a node.
pub const NODE_ROWS_READ: &str = "node.rows_read";
/// Rows written by a node.
pub const NODE_ROWS_WRITTEN: &str = "node.rows_written";
/// Rows diverted to a node's error hop.
pub const NODE_ROWS_REJECTED: &str = "node.rows_rejected";
/// Copies started for a node.
pub const NODE_COPIES: &str = "node.copies";
/// Highest occupancy observed on a Row Set.
pub const ROW_SET_HIGH_WATER: &str = "row_set.high_water";

/// How a snapshot value is to be folded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SnapshotType {
  /// Start of a timed interval.
  Start,
  /// End of a timed interval.
  Stop,
  /// Keep the largest value.
  Max,
  /// Keep the smallest value.
  Min,
  /// Add values together.
  Sum,
  /// Count occurrences, adding the value when present.
  Count,
}

/// One metric event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
  /// Metric name, e.g. [`NODE_ROWS_READ`].
  pub metric: String,
  /// Folding rule.
  pub snapshot: SnapshotType,
  /// Node or Row Set the event is about.
  pub subject: Option<String>,
  /// Value for `MAX`/`MIN`/`SUM`/`COUNT`.
  pub value: Option<i64>,
  /// When the event was taken.
  pub at: DateTime<Utc>,
}

impl MetricsSnapshot {
  /// Creates a snapshot taken now.
  pub fn new(metric: impl Into<String>, snapshot: SnapshotType, subject: Option<&str>, value: Option<i64>) -> Self {
    Self {
      metric: metric.into(),
      snapshot,
      subject: subject.map(str::to_string),
      value,
      at: Utc::now(),
    }
  }
}

/// Folded view of one (metric, subject) key.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MetricAggregate {
  /// Sum of all completed START/STOP intervals.
  pub duration: Option<Duration>,
  /// Largest value seen by `MAX` events.
  pub max: Option<i64>,
  /// Smallest value seen by `MIN` events.
  pub min: Option<i64>,
  /// Sum of `SUM` values.
  pub sum: Option<i64>,
  /// Number of `COUNT` events (or the sum of their values when present).
  pub count: Option<i64>,
}

/// Snapshots folded per (metric, subject).
#[derive(Clone, Debug, Default)]
pub struct MetricsSummary {
  entries: BTreeMap<(String, Option<String>), MetricAggregate>,
}

impl MetricsSummary {
  /// Folds `snapshots` in order.
  ///
  /// A `STOP` without a preceding `START` for the same key is ignored. Several
  /// copies of one node may interleave their intervals; each `STOP` closes the
  /// oldest open `START`.
  pub fn from_snapshots(snapshots: &[MetricsSnapshot]) -> Self {
    let mut entries: BTreeMap<(String, Option<String>), MetricAggregate> = BTreeMap::new();
    let mut open: BTreeMap<(String, Option<String>), Vec<DateTime<Utc>>> = BTreeMap::new();

    for snapshot in snapshots {
      let key = (snapshot.metric.clone(), snapshot.subject.clone());
      let entry = entries.entry(key.clone()).or_default();
      match snapshot.snapshot {
        SnapshotType::Start => open.entry(key).or_default().push(snapshot.at),
        SnapshotType::Stop => {
          let started = open.get_mut(&key).filter(|s| !s.is_empty()).map(|s| s.remove(0));
          if let Some(started) = started {
            let elapsed = snapshot.at - started;
            entry.duration = Some(entry.duration.unwrap_or_else(Duration::zero) + elapsed);
          }
        }
        SnapshotType::Max => {
          if let Some(v) = snapshot.value {
            entry.max = Some(entry.max.map_or(v, |m| m.max(v)));
          }
        }
        SnapshotType::Min => {
          if let Some(v) = snapshot.value {
            entry.min = Some(entry.min.map_or(v, |m| m.min(v)));
          }
        }
        SnapshotType::Sum => {
          entry.sum = Some(entry.sum.unwrap_or(0) + snapshot.value.unwrap_or(0));
        }
        SnapshotType::Count => {
          entry.count = Some(entry.count.unwrap_or(0) + snapshot.value.unwrap_or(1));
        }
      }
    }

    Self { entries }
  }

  /// Aggregate for a (metric, subject) key.
  pub fn get(&self, metric: &str, subject: Option<&str>) -> Option<&MetricAggregate> {
    self
      .entries
      .get(&(metric.to_string(), subject.map(str::to_string)))
  }

  /// All keys and aggregates in key order.
  pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>, &MetricAggregate)> {
    self
      .entries
      .iter()
      .map(|((metric, subject), agg)| (metric.as_str(), subject.as_deref(), agg))
  }

  /// Number of distinct keys.
  pub fn len(&self) -> usize {
    self.entries.len()
  }

  /// Returns `true` when nothing was folded.
  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn at(snapshot: MetricsSnapshot, millis: i64) -> MetricsSnapshot {
    MetricsSnapshot {
      at: DateTime::<Utc>::UNIX_EPOCH + Duration::milliseconds(millis),
      ..snapshot
    }
  }

  #[test]
  fn test_summary_folds_every_snapshot_type() {
    let snapshots = vec![
      at(MetricsSnapshot::new(NODE_EXECUTION, SnapshotType::Start, Some("a"), None), 0),
      at(MetricsSnapshot::new(NODE_EXECUTION, SnapshotType::Stop, Some("a"), None), 40),
      MetricsSnapshot::new(NODE_ROWS_READ, SnapshotType::Sum, Some("a"), Some(3)),
      MetricsSnapshot::new(NODE_ROWS_READ, SnapshotType::Sum, Some("a"), Some(4)),
      MetricsSnapshot::new(ROW_SET_HIGH_WATER, SnapshotType::Max, Some("a -> b"), Some(2)),
      MetricsSnapshot::new(ROW_SET_HIGH_WATER, SnapshotType::Max, Some("a -> b"), Some(9)),
      MetricsSnapshot::new(ROW_SET_HIGH_WATER, SnapshotType::Min, Some("a -> b"), Some(9)),
      MetricsSnapshot::new(ROW_SET_HIGH_WATER, SnapshotType::Min, Some("a -> b"), Some(2)),
      MetricsSnapshot::new(NODE_COPIES, SnapshotType::Count, Some("a"), None),
      MetricsSnapshot::new(NODE_COPIES, SnapshotType::Count, Some("a"), None),
    ];
    let summary = MetricsSummary::from_snapshots(&snapshots);

    let exec = summary.get(NODE_EXECUTION, Some("a")).unwrap();
    assert_eq!(exec.duration, Some(Duration::milliseconds(40)));
    assert_eq!(summary.get(NODE_ROWS_READ, Some("a")).unwrap().sum, Some(7));
    let hw = summary.get(ROW_SET_HIGH_WATER, Some("a -> b")).unwrap();
    assert_eq!(hw.max, Some(9));
    assert_eq!(hw.min, Some(2));
    assert_eq!(summary.get(NODE_COPIES, Some("a")).unwrap().count, Some(2));
    assert_eq!(summary.len(), 4);
  }

  #[test]
  fn test_unmatched_stop_is_ignored() {
    let snapshots = vec![MetricsSnapshot::new(RUN_EXECUTION, SnapshotType::Stop, None, None)];
    let summary = MetricsSummary::from_snapshots(&snapshots);
    assert_eq!(summary.get(RUN_EXECUTION, None).unwrap().duration, None);
  }
}
