//! # Run Result
//!
//! The terminal, immutable summary of a run. A result with a non-zero error
//! count is a valid answer, not an exceptional path.

use crate::executor::ExecutorState;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Counters owned by one executor copy.
///
/// Only the executor increments them; the orchestrator reads them after the
/// executor's task has been joined.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeCounters {
  /// Rows read from input Row Sets.
  pub lines_read: u64,
  /// Rows emitted on the success path.
  pub lines_written: u64,
  /// Rows read from an external source (file, database, ...).
  pub lines_input: u64,
  /// Rows written to an external target.
  pub lines_output: u64,
  /// Rows updated in an external target.
  pub lines_updated: u64,
  /// Rows diverted to the error hop.
  pub lines_rejected: u64,
  /// Rows skipped by the node.
  pub lines_skipped: u64,
  /// Fatal errors.
  pub errors: u64,
}

impl NodeCounters {
  /// Adds `other` to `self`.
  pub fn accumulate(&mut self, other: &NodeCounters) {
    self.lines_read += other.lines_read;
    self.lines_written += other.lines_written;
    self.lines_input += other.lines_input;
    self.lines_output += other.lines_output;
    self.lines_updated += other.lines_updated;
    self.lines_rejected += other.lines_rejected;
    self.lines_skipped += other.lines_skipped;
    self.errors += other.errors;
  }
}

impl fmt::Display for NodeCounters {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "I={}, O={}, R={}, W={}, U={}, E={}",
      self.lines_input,
      self.lines_output,
      self.lines_read,
      self.lines_written,
      self.lines_updated,
      self.errors
    )
  }
}

/// Why a run ended.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
  /// Every node finished on its own.
  #[default]
  Completed,
  /// A node raised a fatal error.
  Failed,
  /// A caller invoked `stop_all`.
  Stopped,
  /// A node failed to initialize; the run never started.
  InitFailed,
}

/// A fatal error raised by one node copy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeFailure {
  /// Node name.
  pub node: String,
  /// Copy index.
  pub copy: usize,
  /// Error message.
  pub message: String,
}

/// Final state of one executor copy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeStatus {
  /// Node name.
  pub name: String,
  /// Copy index.
  pub copy: usize,
  /// State the executor ended in.
  pub state: ExecutorState,
  /// Whether the executor left its loop through `Stopping`.
  pub stopped: bool,
  /// Frozen counters.
  pub counters: NodeCounters,
  /// Failure message, if the copy failed.
  pub failure: Option<String>,
  /// Time spent in the executor loop.
  pub elapsed: Duration,
}

/// Immutable end-of-run summary.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
  /// Total fatal errors over every executor.
  pub errors: u64,
  /// Rows read by the read subjects.
  pub lines_read: u64,
  /// Rows written by the written subjects.
  pub lines_written: u64,
  /// External rows read by the input subjects.
  pub lines_input: u64,
  /// External rows written by the output subjects.
  pub lines_output: u64,
  /// External rows updated by the updated subjects.
  pub lines_updated: u64,
  /// Rows diverted by the rejected subjects.
  pub lines_rejected: u64,
  /// Wall time from start to the last executor disposed.
  pub elapsed: Duration,
  /// Why the run ended.
  pub stop_reason: StopReason,
  /// Fatal errors, in the order they were raised.
  pub failed_nodes: Vec<NodeFailure>,
  /// Per-copy status, in definition order.
  pub nodes: Vec<NodeStatus>,
}

impl RunResult {
  /// Returns `true` for a completed run without errors.
  pub fn is_success(&self) -> bool {
    self.errors == 0 && self.stop_reason == StopReason::Completed
  }

  /// Status of one node copy.
  pub fn node(&self, name: &str, copy: usize) -> Option<&NodeStatus> {
    self.nodes.iter().find(|n| n.name == name && n.copy == copy)
  }

  /// Counters of every copy of `name`, summed.
  pub fn node_totals(&self, name: &str) -> NodeCounters {
    let mut totals = NodeCounters::default();
    for status in self.nodes.iter().filter(|n| n.name == name) {
      totals.accumulate(&status.counters);
    }
    totals
  }
}
