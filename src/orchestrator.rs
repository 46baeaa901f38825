//! # Orchestrator
//!
//! Turns a static [`GraphDefinition`] into a running set of node executors
//! and reports the run's [`RunResult`].
//!
//! A run goes through four calls:
//!
//! 1. [`prepare`](Orchestrator::prepare): validates the graph, propagates
//!    schemas, allocates one Row Set per (producer copy, consumer copy)
//!    pairing of every enabled hop, creates one executor per node copy and
//!    runs every init hook. Any failure here means no task ever starts.
//! 2. [`start`](Orchestrator::start): spawns one Tokio task per executor and
//!    returns immediately.
//! 3. [`wait_until_finished`](Orchestrator::wait_until_finished): joins every
//!    task and aggregates the result.
//! 4. [`stop_all`](Orchestrator::stop_all) (optional, from anywhere): raises
//!    the run-wide stop signal and marks every Row Set done.
//!
//! Between `prepare` and `start`, rows can be injected with
//! [`add_row_producer`](Orchestrator::add_row_producer) and observed with
//! [`add_row_listener`](Orchestrator::add_row_listener).
//!
//! # Example
//!
//! ```rust,no_run
//! use hopweave::{ExecutionConfig, GraphDefinition, NodeRegistry, Orchestrator};
//!
//! # async fn run(graph: GraphDefinition) -> hopweave::Result<()> {
//! let mut orchestrator = Orchestrator::new(graph, NodeRegistry::with_builtins());
//! let result = orchestrator.execute(ExecutionConfig::default()).await?;
//! assert!(result.is_success());
//! # Ok(())
//! # }
//! ```

use crate::config::ExecutionConfig;
use crate::context::{ContextSpec, NodeContext};
use crate::error::{EngineError, Result};
use crate::error_channel::ErrorChannel;
use crate::executor::{ExecutorState, NodeExecutor};
use crate::graph::{GraphDefinition, HopDefinition, NodeDefinition};
use crate::listener::RowListener;
use crate::logging::{LogChannel, LogHandle, TracingLogChannel};
use crate::metrics::{NODE_COPIES, ROW_SET_HIGH_WATER, RUN_EXECUTION, RUN_PREPARE, SnapshotType};
use crate::propagator::{PropagatedSchemas, SchemaPropagator};
use crate::registry::NodeRegistry;
use crate::result::{NodeCounters, NodeFailure, NodeStatus, RunResult, StopReason};
use crate::row_set::{Endpoint, RowSet};
use crate::router::{OutputHop, RowRouter};
use crate::schema::RowSchema;
use crate::signal::StopSignal;
use crate::value::Record;
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Origin node name of Row Sets fed by a [`RowProducer`].
pub const PRODUCER_ORIGIN: &str = "<producer>";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Run-wide state shared by the orchestrator and every executor: the stop
/// signal, every Row Set, the first stop reason and the fatal errors raised.
#[derive(Debug)]
pub(crate) struct RunControl {
  stop: StopSignal,
  row_sets: Mutex<Vec<Arc<RowSet>>>,
  reason: Mutex<Option<StopReason>>,
  failures: Mutex<Vec<NodeFailure>>,
}

impl RunControl {
  fn new(stop: StopSignal) -> Self {
    Self {
      stop,
      row_sets: Mutex::new(Vec::new()),
      reason: Mutex::new(None),
      failures: Mutex::new(Vec::new()),
    }
  }

  pub(crate) fn is_stopped(&self) -> bool {
    self.stop.is_stopped()
  }

  fn register(&self, row_set: Arc<RowSet>) {
    lock(&self.row_sets).push(row_set);
  }

  /// Raises the stop signal and marks every Row Set done. Only the first
  /// reason is kept.
  pub(crate) fn stop_all(&self, reason: StopReason) {
    lock(&self.reason).get_or_insert(reason);
    self.stop.raise();
    for row_set in lock(&self.row_sets).iter() {
      row_set.mark_done();
    }
  }

  /// Records a fatal node error and stops the run.
  pub(crate) fn fail(&self, node: &str, copy: usize, message: String) {
    lock(&self.failures).push(NodeFailure {
      node: node.to_string(),
      copy,
      message,
    });
    self.stop_all(StopReason::Failed);
  }

  fn reason(&self) -> Option<StopReason> {
    *lock(&self.reason)
  }

  fn failures(&self) -> Vec<NodeFailure> {
    lock(&self.failures).clone()
  }
}

/// Cloneable handle that stops a run from anywhere.
#[derive(Clone, Debug)]
pub struct StopHandle {
  control: Arc<RunControl>,
}

impl StopHandle {
  /// Stops the run. Idempotent.
  pub fn stop_all(&self) {
    self.control.stop_all(StopReason::Stopped);
  }

  /// Returns `true` once the run has been stopped for any reason.
  pub fn is_stopped(&self) -> bool {
    self.control.is_stopped()
  }
}

/// Feeds rows into one node copy from outside the run.
///
/// Dropping the producer signals end of stream.
#[derive(Debug)]
pub struct RowProducer {
  row_set: Arc<RowSet>,
  schema: Arc<RowSchema>,
}

impl RowProducer {
  /// Schema rows are tagged with.
  pub fn schema(&self) -> &Arc<RowSchema> {
    &self.schema
  }

  /// Puts a row, suspending while the Row Set is full.
  ///
  /// Returns `false` if the run was stopped first.
  pub async fn put(&self, record: Record) -> bool {
    self.row_set.put(&self.schema, record).await
  }

  /// Puts a row without waiting; returns it back if the Row Set is full.
  pub fn try_put(&self, record: Record) -> std::result::Result<(), Record> {
    self.row_set.try_put(&self.schema, record)
  }

  /// Signals end of stream.
  pub fn finish(&self) {
    self.row_set.mark_done();
  }
}

impl Drop for RowProducer {
  fn drop(&mut self) {
    self.row_set.mark_done();
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
  Idle,
  Prepared,
  Running,
  Finished,
}

/// Builds, runs and awaits one run of a graph.
pub struct Orchestrator {
  graph: GraphDefinition,
  registry: NodeRegistry,
  channel: Arc<dyn LogChannel>,
  phase: Phase,
  log: Option<LogHandle>,
  control: Option<Arc<RunControl>>,
  schemas: Option<PropagatedSchemas>,
  executors: Vec<NodeExecutor>,
  handles: Vec<(String, usize, JoinHandle<NodeStatus>)>,
  row_sets: Vec<Arc<RowSet>>,
  started_at: Option<Instant>,
  result: Option<RunResult>,
}

impl fmt::Debug for Orchestrator {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Orchestrator")
      .field("graph", &self.graph.name)
      .field("phase", &self.phase)
      .field("executors", &self.executors.len())
      .field("row_sets", &self.row_sets.len())
      .finish()
  }
}

/// Row Sets of one hop, indexed by producer and consumer copy.
struct HopRowSets<'g> {
  hop: &'g HopDefinition,
  row_sets: Vec<Arc<RowSet>>,
}

impl HopRowSets<'_> {
  fn from_copy(&self, copy: usize) -> Vec<Arc<RowSet>> {
    self
      .row_sets
      .iter()
      .filter(|rs| rs.origin().copy == copy)
      .cloned()
      .collect()
  }

  fn to_copy(&self, copy: usize) -> impl Iterator<Item = &Arc<RowSet>> {
    self
      .row_sets
      .iter()
      .filter(move |rs| rs.destination().copy == copy)
  }
}

/// Copy pairings of a hop: paired copy i to copy i when both ends run the
/// same number (more than one) of copies, the full cross product otherwise.
fn copy_pairs(from: &NodeDefinition, to: &NodeDefinition) -> Vec<(usize, usize)> {
  if from.copies == to.copies && from.copies > 1 {
    (0..from.copies).map(|i| (i, i)).collect()
  } else {
    (0..from.copies)
      .flat_map(|i| (0..to.copies).map(move |j| (i, j)))
      .collect()
  }
}

impl Orchestrator {
  /// Creates an orchestrator for `graph`, resolving node types through
  /// `registry` and logging through `tracing`.
  pub fn new(graph: GraphDefinition, registry: NodeRegistry) -> Self {
    Self {
      graph,
      registry,
      channel: Arc::new(TracingLogChannel),
      phase: Phase::Idle,
      log: None,
      control: None,
      schemas: None,
      executors: Vec::new(),
      handles: Vec::new(),
      row_sets: Vec::new(),
      started_at: None,
      result: None,
    }
  }

  /// Replaces the log channel.
  pub fn with_log_channel(mut self, channel: Arc<dyn LogChannel>) -> Self {
    self.channel = channel;
    self
  }

  /// The graph being run.
  pub fn graph(&self) -> &GraphDefinition {
    &self.graph
  }

  /// Schemas computed by [`prepare`](Self::prepare).
  pub fn schemas(&self) -> Option<&PropagatedSchemas> {
    self.schemas.as_ref()
  }

  /// Output schema of `node`, once prepared.
  pub fn output_schema(&self, node: &str) -> Option<Arc<RowSchema>> {
    self.schemas.as_ref()?.output(node).cloned()
  }

  /// Every Row Set of the run, once prepared.
  pub fn row_sets(&self) -> &[Arc<RowSet>] {
    &self.row_sets
  }

  /// The run result, once finished.
  pub fn result(&self) -> Option<&RunResult> {
    self.result.as_ref()
  }

  /// Returns `true` between `start` and the end of `wait_until_finished`.
  pub fn is_running(&self) -> bool {
    self.phase == Phase::Running
  }

  /// Returns `true` once a result exists.
  pub fn is_finished(&self) -> bool {
    self.phase == Phase::Finished
  }

  /// A handle to stop the run from another task, once prepared.
  pub fn stop_handle(&self) -> Option<StopHandle> {
    self.control.as_ref().map(|control| StopHandle {
      control: Arc::clone(control),
    })
  }

  /// Stops the run. Idempotent; a no-op before `prepare`.
  pub fn stop_all(&self) {
    if let Some(control) = &self.control {
      if let Some(log) = &self.log {
        log.basic("stop requested");
      }
      control.stop_all(StopReason::Stopped);
    }
  }

  fn expect_phase(&self, phase: Phase, operation: &str) -> Result<()> {
    if self.phase != phase {
      return Err(EngineError::InvalidState(format!(
        "cannot {} while {:?}",
        operation, self.phase
      )));
    }
    Ok(())
  }

  /// Prepares the run.
  ///
  /// # Errors
  ///
  /// - Any configuration error from validation or schema propagation; nothing
  ///   is allocated in that case.
  /// - [`EngineError::InitFailed`] naming every copy whose creation or init
  ///   failed. Every executor is disposed and a result with
  ///   [`StopReason::InitFailed`] is stored.
  /// - [`EngineError::InvalidState`] if called twice.
  pub async fn prepare(&mut self, config: ExecutionConfig) -> Result<()> {
    self.expect_phase(Phase::Idle, "prepare")?;
    let log = LogHandle::new(
      Arc::clone(&self.channel),
      self.graph.name.clone(),
      config.log_level,
      config.gather_metrics,
    );
    log.snap_start(RUN_PREPARE, None);
    log.detailed("preparing");

    let schemas = SchemaPropagator::new(&self.registry)
      .propagate(&self.graph)
      .inspect_err(|e| log.error(format!("preparation failed: {}", e)))?;

    let stop = StopSignal::new();
    let control = Arc::new(RunControl::new(stop.clone()));
    let variables = config.variables();

    let mut hops = Vec::new();
    for hop in self.graph.enabled_hops() {
      let from = self
        .graph
        .node(&hop.from)
        .ok_or_else(|| EngineError::UnknownNode(hop.from.clone()))?;
      let to = self
        .graph
        .node(&hop.to)
        .ok_or_else(|| EngineError::UnknownNode(hop.to.clone()))?;
      let row_sets: Vec<Arc<RowSet>> = copy_pairs(from, to)
        .into_iter()
        .map(|(i, j)| {
          Arc::new(RowSet::new(
            Endpoint::new(&hop.from, i),
            Endpoint::new(&hop.to, j),
            config.row_set_capacity,
            stop.clone(),
          ))
        })
        .collect();
      for row_set in &row_sets {
        control.register(Arc::clone(row_set));
      }
      log.debug(format!(
        "hop {} -> {}: {} row set(s)",
        hop.from,
        hop.to,
        row_sets.len()
      ));
      hops.push(HopRowSets { hop, row_sets });
    }

    let mut executors = Vec::new();
    let mut create_failures = Vec::new();
    for definition in &self.graph.nodes {
      let factory = self.registry.resolve(definition)?;
      let node_schemas = schemas
        .get(&definition.name)
        .ok_or_else(|| EngineError::UnknownNode(definition.name.clone()))?;
      let config_value = Arc::new(definition.config.clone());
      log.snap(
        NODE_COPIES,
        SnapshotType::Count,
        Some(definition.name.as_str()),
        Some(definition.copies as i64),
      );

      for copy in 0..definition.copies {
        let outputs = hops
          .iter()
          .filter(|h| h.hop.from == definition.name && !h.hop.error)
          .map(|h| OutputHop::new(h.hop.to.clone(), h.from_copy(copy)))
          .collect();
        let error_channel = hops
          .iter()
          .find(|h| h.hop.from == definition.name && h.hop.error)
          .map(|h| ErrorChannel::new(h.hop.to.clone(), h.from_copy(copy), definition.error_handling.clone()));
        let inputs = hops
          .iter()
          .filter(|h| h.hop.to == definition.name)
          .flat_map(|h| h.to_copy(copy).cloned())
          .collect();

        let ctx = NodeContext::new(ContextSpec {
          name: definition.name.clone(),
          copy,
          copies: definition.copies,
          config: Arc::clone(&config_value),
          factory: Arc::clone(&factory),
          variables: variables.clone(),
          log: log.child(format!("{}.{}", definition.name, copy)),
          stop: stop.clone(),
          inputs,
          router: RowRouter::new(definition.distribution, outputs),
          error_channel,
          input_schema: Arc::clone(&node_schemas.input),
          output_schema: Arc::clone(&node_schemas.output),
          safe_mode: config.safe_mode,
        });

        match factory.create(&definition.config) {
          Ok(node) => executors.push(NodeExecutor::new(node, ctx, Arc::clone(&control))),
          Err(e) => {
            ctx.log().error(format!("cannot create node: {}", e));
            create_failures.push(NodeStatus {
              name: definition.name.clone(),
              copy,
              state: ExecutorState::InitFailed,
              stopped: false,
              counters: NodeCounters {
                errors: 1,
                ..NodeCounters::default()
              },
              failure: Some(e.to_string()),
              elapsed: Duration::ZERO,
            });
          }
        }
      }
    }

    let initialized = if create_failures.is_empty() {
      join_all(executors.iter_mut().map(|e| e.init())).await
    } else {
      Vec::new()
    };

    self.row_sets = hops.into_iter().flat_map(|h| h.row_sets).collect();
    self.schemas = Some(schemas);
    self.control = Some(Arc::clone(&control));
    self.log = Some(log.clone());

    if !create_failures.is_empty() || initialized.iter().any(|ok| !ok) {
      control.stop_all(StopReason::InitFailed);
      for executor in &mut executors {
        executor.dispose().await;
      }
      let mut statuses: Vec<NodeStatus> = executors.iter().map(NodeExecutor::status).collect();
      statuses.extend(create_failures);
      let failed: Vec<String> = statuses
        .iter()
        .filter(|s| s.failure.is_some())
        .map(|s| format!("{}.{}", s.name, s.copy))
        .collect();
      let failed_nodes = statuses
        .iter()
        .filter_map(|s| {
          s.failure.as_ref().map(|message| NodeFailure {
            node: s.name.clone(),
            copy: s.copy,
            message: message.clone(),
          })
        })
        .collect();

      log.error(format!("initialization failed for {}", failed.join(", ")));
      log.snap_stop(RUN_PREPARE, None);
      let mut result = self.aggregate(statuses, Duration::ZERO);
      result.failed_nodes = failed_nodes;
      self.result = Some(result);
      self.phase = Phase::Finished;
      return Err(EngineError::InitFailed(failed));
    }

    self.executors = executors;
    self.phase = Phase::Prepared;
    log.snap_stop(RUN_PREPARE, None);
    log.detailed(format!(
      "prepared {} executor(s) and {} row set(s)",
      self.executors.len(),
      self.row_sets.len()
    ));
    Ok(())
  }

  fn executor_mut(&mut self, node: &str, copy: usize) -> Result<&mut NodeExecutor> {
    self
      .executors
      .iter_mut()
      .find(|e| e.name() == node && e.copy() == copy)
      .ok_or_else(|| EngineError::UnknownNode(format!("{}.{}", node, copy)))
  }

  /// Adds an input Row Set to `node.copy` and returns its writing end.
  ///
  /// # Errors
  ///
  /// [`EngineError::InvalidState`] unless prepared and not started;
  /// [`EngineError::UnknownNode`] for an unknown node copy.
  pub fn add_row_producer(&mut self, node: &str, copy: usize, schema: Arc<RowSchema>) -> Result<RowProducer> {
    self.expect_phase(Phase::Prepared, "add a row producer")?;
    let control = self
      .control
      .clone()
      .ok_or_else(|| EngineError::InvalidState("not prepared".to_string()))?;
    let capacity = self.row_sets.first().map(|rs| rs.capacity());
    let row_set = Arc::new(RowSet::new(
      Endpoint::new(PRODUCER_ORIGIN, 0),
      Endpoint::new(node, copy),
      capacity.unwrap_or(crate::row_set::DEFAULT_ROW_SET_CAPACITY),
      control.stop.clone(),
    ));
    self
      .executor_mut(node, copy)?
      .context_mut()
      .add_input(Arc::clone(&row_set));
    control.register(Arc::clone(&row_set));
    self.row_sets.push(Arc::clone(&row_set));
    Ok(RowProducer { row_set, schema })
  }

  /// Attaches a row listener to `node.copy`.
  ///
  /// # Errors
  ///
  /// [`EngineError::InvalidState`] unless prepared and not started;
  /// [`EngineError::UnknownNode`] for an unknown node copy.
  pub fn add_row_listener(&mut self, node: &str, copy: usize, listener: Arc<dyn RowListener>) -> Result<()> {
    self.expect_phase(Phase::Prepared, "add a row listener")?;
    self
      .executor_mut(node, copy)?
      .context_mut()
      .add_listener(listener);
    Ok(())
  }

  /// Spawns one task per executor and returns immediately.
  ///
  /// Must be called from within a Tokio runtime.
  ///
  /// # Errors
  ///
  /// [`EngineError::InvalidState`] unless prepared.
  pub fn start(&mut self) -> Result<()> {
    self.expect_phase(Phase::Prepared, "start")?;
    if let Some(log) = &self.log {
      log.minimal("starting");
      log.snap_start(RUN_EXECUTION, None);
    }
    self.started_at = Some(Instant::now());
    for executor in self.executors.drain(..) {
      let name = executor.name().to_string();
      let copy = executor.copy();
      self.handles.push((name, copy, tokio::spawn(executor.run())));
    }
    self.phase = Phase::Running;
    Ok(())
  }

  /// Waits for every executor to be disposed and returns the result.
  ///
  /// Calling it again after the run returns the same result.
  ///
  /// # Errors
  ///
  /// [`EngineError::InvalidState`] if the run was never started.
  pub async fn wait_until_finished(&mut self) -> Result<RunResult> {
    if let (Phase::Finished, Some(result)) = (self.phase, &self.result) {
      return Ok(result.clone());
    }
    self.expect_phase(Phase::Running, "wait")?;

    let mut statuses = Vec::with_capacity(self.handles.len());
    for (name, copy, handle) in self.handles.drain(..) {
      match handle.await {
        Ok(status) => statuses.push(status),
        Err(e) => {
          let message = format!("executor task failed: {}", e);
          if let Some(control) = &self.control {
            control.fail(&name, copy, message.clone());
          }
          statuses.push(NodeStatus {
            name,
            copy,
            state: ExecutorState::Stopping,
            stopped: true,
            counters: NodeCounters {
              errors: 1,
              ..NodeCounters::default()
            },
            failure: Some(message),
            elapsed: Duration::ZERO,
          });
        }
      }
    }

    let elapsed = self.started_at.map(|t| t.elapsed()).unwrap_or_default();
    if let Some(log) = &self.log {
      for row_set in &self.row_sets {
        log.snap(
          ROW_SET_HIGH_WATER,
          SnapshotType::Max,
          Some(row_set.name()),
          Some(row_set.high_water() as i64),
        );
      }
      log.snap_stop(RUN_EXECUTION, None);
    }

    let result = self.aggregate(statuses, elapsed);
    if let Some(log) = &self.log {
      let summary = format!(
        "finished ({:?}): errors={}, read={}, written={}, rejected={}",
        result.stop_reason, result.errors, result.lines_read, result.lines_written, result.lines_rejected
      );
      if result.errors > 0 {
        log.error(summary);
      } else {
        log.minimal(summary);
      }
    }
    self.result = Some(result.clone());
    self.phase = Phase::Finished;
    Ok(result)
  }

  /// Prepares, starts and awaits the run.
  pub async fn execute(&mut self, config: ExecutionConfig) -> Result<RunResult> {
    self.prepare(config).await?;
    self.start()?;
    self.wait_until_finished().await
  }

  fn aggregate(&self, statuses: Vec<NodeStatus>, elapsed: Duration) -> RunResult {
    let subjects = &self.graph.result_subjects;
    let sinks: HashSet<&str> = self.graph.sinks().into_iter().collect();
    let everyone: HashSet<&str> = self.graph.nodes.iter().map(|n| n.name.as_str()).collect();
    let select = |chosen: &Option<Vec<String>>, default: &HashSet<&str>| -> HashSet<String> {
      match chosen {
        Some(names) => names.iter().cloned().collect(),
        None => default.iter().map(|s| s.to_string()).collect(),
      }
    };

    let mut per_node: HashMap<&str, NodeCounters> = HashMap::new();
    for status in &statuses {
      per_node
        .entry(status.name.as_str())
        .or_default()
        .accumulate(&status.counters);
    }
    let sum = |names: &HashSet<String>, pick: fn(&NodeCounters) -> u64| -> u64 {
      names
        .iter()
        .filter_map(|n| per_node.get(n.as_str()))
        .map(pick)
        .sum()
    };

    let control = self.control.as_ref();
    RunResult {
      errors: statuses.iter().map(|s| s.counters.errors).sum(),
      lines_read: sum(&select(&subjects.read, &sinks), |c| c.lines_read),
      lines_written: sum(&select(&subjects.written, &sinks), |c| c.lines_written),
      lines_input: sum(&select(&subjects.input, &everyone), |c| c.lines_input),
      lines_output: sum(&select(&subjects.output, &everyone), |c| c.lines_output),
      lines_updated: sum(&select(&subjects.updated, &everyone), |c| c.lines_updated),
      lines_rejected: sum(&select(&subjects.rejected, &everyone), |c| c.lines_rejected),
      elapsed,
      stop_reason: control.and_then(|c| c.reason()).unwrap_or_default(),
      failed_nodes: control.map(|c| c.failures()).unwrap_or_default(),
      nodes: statuses,
    }
  }
}
