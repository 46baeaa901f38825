//! # Node Executor
//!
//! Wraps one node implementation for one copy and drives it through its
//! lifecycle:
//!
//! ```text
//! Created -> Initialized -> Running -> { Finishing | Stopping } -> Disposed
//!        \-> InitFailed ------------------------------------------^
//! ```
//!
//! The executor owns its counters. A per-record failure is diverted to the
//! error hop when one exists; anything else is fatal: the error is recorded,
//! the run-wide stop is raised and the executor leaves through `Stopping`.
//! Panics inside node hooks are caught here and treated as fatal errors, so
//! `dispose` runs exactly once on every path.

use crate::context::NodeContext;
use crate::error::{NodeError, RecordFailure};
use crate::metrics::{
  NODE_EXECUTION, NODE_INIT, NODE_ROWS_READ, NODE_ROWS_REJECTED, NODE_ROWS_WRITTEN, SnapshotType,
};
use crate::node::{Node, Progress};
use crate::orchestrator::RunControl;
use crate::result::NodeStatus;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Lifecycle state of a node executor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorState {
  /// Constructed, init not yet run.
  Created,
  /// Init succeeded.
  Initialized,
  /// Init failed; terminal until disposed.
  InitFailed,
  /// The executor loop is running.
  Running,
  /// The node signalled it has no more output.
  Finishing,
  /// The run was stopped or this node failed.
  Stopping,
  /// Dispose has run; counters are frozen.
  Disposed,
}

impl fmt::Display for ExecutorState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    fmt::Debug::fmt(self, f)
  }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
  if let Some(s) = panic.downcast_ref::<&str>() {
    format!("panicked: {}", s)
  } else if let Some(s) = panic.downcast_ref::<String>() {
    format!("panicked: {}", s)
  } else {
    "panicked".to_string()
  }
}

/// Runtime wrapper of one node copy.
pub struct NodeExecutor {
  node: Box<dyn Node>,
  ctx: NodeContext,
  control: Arc<RunControl>,
  state: ExecutorState,
  stopped: bool,
  failure: Option<String>,
  elapsed: Duration,
}

impl fmt::Debug for NodeExecutor {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("NodeExecutor")
      .field("name", &self.ctx.name())
      .field("copy", &self.ctx.copy())
      .field("state", &self.state)
      .finish()
  }
}

impl NodeExecutor {
  pub(crate) fn new(node: Box<dyn Node>, ctx: NodeContext, control: Arc<RunControl>) -> Self {
    Self {
      node,
      ctx,
      control,
      state: ExecutorState::Created,
      stopped: false,
      failure: None,
      elapsed: Duration::ZERO,
    }
  }

  /// Node name.
  pub fn name(&self) -> &str {
    self.ctx.name()
  }

  /// Copy index.
  pub fn copy(&self) -> usize {
    self.ctx.copy()
  }

  /// Current state.
  pub fn state(&self) -> ExecutorState {
    self.state
  }

  /// Failure message, if init or the loop failed.
  pub fn failure(&self) -> Option<&str> {
    self.failure.as_deref()
  }

  pub(crate) fn context_mut(&mut self) -> &mut NodeContext {
    &mut self.ctx
  }

  /// Runs the node's init hook.
  ///
  /// Moves to `Initialized` on success and to `InitFailed` otherwise.
  pub async fn init(&mut self) -> bool {
    let subject = self.ctx.name().to_string();
    let log = self.ctx.log().clone();
    log.snap_start(NODE_INIT, Some(&subject));

    let outcome = AssertUnwindSafe(self.node.init(&mut self.ctx))
      .catch_unwind()
      .await
      .unwrap_or_else(|panic| Err(NodeError::fatal(panic_message(panic))));

    log.snap_stop(NODE_INIT, Some(&subject));
    match outcome {
      Ok(()) => {
        self.state = ExecutorState::Initialized;
        log.detailed("initialized");
        true
      }
      Err(e) => {
        self.state = ExecutorState::InitFailed;
        self.ctx.counters_mut().errors += 1;
        log.error(format!("init failed: {}", e));
        self.failure = Some(e.to_string());
        false
      }
    }
  }

  /// Runs the dispose hook if it has not run yet and moves to `Disposed`.
  pub async fn dispose(&mut self) {
    if self.state == ExecutorState::Disposed {
      return;
    }
    let disposed = AssertUnwindSafe(self.node.dispose(&mut self.ctx))
      .catch_unwind()
      .await;
    if let Err(panic) = disposed {
      self.ctx.log().error(format!("dispose {}", panic_message(panic)));
    }
    self.state = ExecutorState::Disposed;
  }

  fn fail(&mut self, error: NodeError) {
    let message = error.to_string();
    self.ctx.counters_mut().errors += 1;
    self.ctx.log().error(format!("fatal error: {}", message));
    self
      .control
      .fail(self.ctx.name(), self.ctx.copy(), message.clone());
    self.failure = Some(message);
    self.state = ExecutorState::Stopping;
    self.stopped = true;
  }

  /// Drives the node until it finishes, fails or the run is stopped, then
  /// marks every output done, disposes the node and reports its final status.
  pub async fn run(mut self) -> NodeStatus {
    let subject = self.ctx.name().to_string();
    let log = self.ctx.log().clone();
    let started = Instant::now();

    if self.state == ExecutorState::Initialized {
      self.state = ExecutorState::Running;
      log.snap_start(NODE_EXECUTION, Some(&subject));
      log.detailed("running");
      self.drive().await;
      log.snap_stop(NODE_EXECUTION, Some(&subject));
    }

    self.ctx.finish_outputs();
    self.dispose().await;
    self.elapsed = started.elapsed();

    let counters = *self.ctx.counters();
    log.basic(format!("finished processing ({})", counters));
    log.snap(NODE_ROWS_READ, SnapshotType::Sum, Some(&subject), Some(counters.lines_read as i64));
    log.snap(NODE_ROWS_WRITTEN, SnapshotType::Sum, Some(&subject), Some(counters.lines_written as i64));
    log.snap(NODE_ROWS_REJECTED, SnapshotType::Sum, Some(&subject), Some(counters.lines_rejected as i64));

    self.status()
  }

  async fn drive(&mut self) {
    loop {
      if self.control.is_stopped() {
        self.state = ExecutorState::Stopping;
        self.stopped = true;
        self.ctx.log().detailed("stop requested");
        return;
      }

      let outcome = AssertUnwindSafe(self.node.process_one_unit(&mut self.ctx))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(NodeError::fatal(panic_message(panic))));

      match outcome {
        Ok(Progress::Continue) => {}
        Ok(Progress::Finished) => {
          if self.control.is_stopped() {
            self.state = ExecutorState::Stopping;
            self.stopped = true;
          } else {
            self.state = ExecutorState::Finishing;
          }
          return;
        }
        Err(NodeError::Record(failure)) if self.ctx.has_error_hop() => {
          let RecordFailure {
            schema,
            record,
            diagnostic,
          } = *failure;
          if let Err(e) = self.ctx.put_error(&schema, record, diagnostic).await {
            self.fail(e);
            return;
          }
        }
        Err(e) => {
          self.fail(e);
          return;
        }
      }
    }
  }

  /// Snapshot of the executor's status.
  pub fn status(&self) -> NodeStatus {
    NodeStatus {
      name: self.ctx.name().to_string(),
      copy: self.ctx.copy(),
      state: self.state,
      stopped: self.stopped,
      counters: *self.ctx.counters(),
      failure: self.failure.clone(),
      elapsed: self.elapsed,
    }
  }
}
