//! # Row Router
//!
//! Implements an executor copy's emit operation over its output Row Sets.
//!
//! - **Distribute**: each record goes to exactly one output Row Set. A single
//!   round-robin cursor walks every output Row Set of the copy, so N records
//!   over M Row Sets deliver either ⌈N/M⌉ or ⌊N/M⌋ to each.
//! - **Copy**: each record goes to every output Row Set, so every copy of
//!   every target node sees the full stream.
//!
//! Cursors belong to one producer copy. [`RowRouter::route_to`] keeps a
//! separate cursor per hop.

use crate::graph::DistributionMode;
use crate::row_set::RowSet;
use crate::schema::RowSchema;
use crate::value::Record;
use std::sync::Arc;

/// The Row Sets of one producer copy that lead to one target node.
#[derive(Debug)]
pub struct OutputHop {
  target: String,
  row_sets: Vec<Arc<RowSet>>,
  cursor: usize,
}

impl OutputHop {
  /// Creates a hop to `target` over `row_sets`, one per reachable target copy.
  pub fn new(target: impl Into<String>, row_sets: Vec<Arc<RowSet>>) -> Self {
    Self {
      target: target.into(),
      row_sets,
      cursor: 0,
    }
  }

  /// Target node name.
  pub fn target(&self) -> &str {
    &self.target
  }

  /// Row Sets of this hop.
  pub fn row_sets(&self) -> &[Arc<RowSet>] {
    &self.row_sets
  }

  fn next(&mut self) -> Option<&Arc<RowSet>> {
    if self.row_sets.is_empty() {
      return None;
    }
    let index = self.cursor % self.row_sets.len();
    self.cursor = (index + 1) % self.row_sets.len();
    self.row_sets.get(index)
  }
}

/// Fan-out of one producer copy.
#[derive(Debug)]
pub struct RowRouter {
  mode: DistributionMode,
  hops: Vec<OutputHop>,
  flat: Vec<Arc<RowSet>>,
  cursor: usize,
}

impl RowRouter {
  /// Creates a router for the given mode and hops.
  pub fn new(mode: DistributionMode, hops: Vec<OutputHop>) -> Self {
    let flat = hops
      .iter()
      .flat_map(|h| h.row_sets.iter().cloned())
      .collect();
    Self {
      mode,
      hops,
      flat,
      cursor: 0,
    }
  }

  /// Fan-out mode.
  pub fn mode(&self) -> DistributionMode {
    self.mode
  }

  /// Returns `true` when the copy has no output Row Set.
  pub fn is_empty(&self) -> bool {
    self.flat.is_empty()
  }

  /// Every output Row Set, hop by hop.
  pub fn row_sets(&self) -> &[Arc<RowSet>] {
    &self.flat
  }

  /// Target node names, in hop order.
  pub fn targets(&self) -> impl Iterator<Item = &str> {
    self.hops.iter().map(OutputHop::target)
  }

  /// Emits one record according to the fan-out mode.
  ///
  /// Returns the number of Row Sets that accepted the record. A result lower
  /// than expected means the run was stopped mid-emit.
  pub async fn route(&mut self, schema: &Arc<RowSchema>, record: Record) -> usize {
    if self.flat.is_empty() {
      return 0;
    }
    match self.mode {
      DistributionMode::Distribute => {
        let index = self.cursor % self.flat.len();
        self.cursor = (index + 1) % self.flat.len();
        usize::from(self.flat[index].put(schema, record).await)
      }
      DistributionMode::Copy => {
        let last = self.flat.len() - 1;
        let mut delivered = 0;
        let mut record = Some(record);
        for (i, row_set) in self.flat.iter().enumerate() {
          let row = if i == last {
            record.take()
          } else {
            record.clone()
          };
          let Some(row) = row else {
            break;
          };
          if !row_set.put(schema, row).await {
            break;
          }
          delivered += 1;
        }
        delivered
      }
    }
  }

  /// Emits one record only on the hop leading to `target`, distributing over
  /// that node's copies.
  ///
  /// Returns `None` if no hop leads to `target`, otherwise whether the record
  /// was accepted.
  pub async fn route_to(&mut self, target: &str, schema: &Arc<RowSchema>, record: Record) -> Option<bool> {
    let hop = self.hops.iter_mut().find(|h| h.target == target)?;
    let row_set = hop.next()?;
    Some(row_set.put(schema, record).await)
  }

  /// Signals end of stream on every output Row Set.
  pub fn mark_done(&self) {
    for row_set in &self.flat {
      row_set.mark_done();
    }
  }
}
