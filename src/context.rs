//! # Node Context
//!
//! Everything a running node copy sees of the engine: its configuration and
//! variables, a log handle, and the core-provided read and emit primitives.
//!
//! Reading ([`get_row`](NodeContext::get_row)) sweeps the live input Row Sets
//! round-robin and only suspends when all of them are empty. Emitting
//! ([`put_row`](NodeContext::put_row)) goes through the copy's
//! [`RowRouter`]; diverting ([`put_error`](NodeContext::put_error)) goes
//! through its [`ErrorChannel`].
//!
//! On the first row read the context validates the arriving schema (required
//! fields, duplicate names in safe mode) and lets the node type finalize its
//! output schema from it.

use crate::config::{LogLevel, Variables};
use crate::error::{Diagnostic, NodeError};
use crate::error_channel::ErrorChannel;
use crate::listener::RowListener;
use crate::logging::LogHandle;
use crate::node::NodeFactory;
use crate::result::NodeCounters;
use crate::row_set::{Row, RowSet};
use crate::router::RowRouter;
use crate::schema::{RowSchema, SchemaError};
use crate::signal::StopSignal;
use crate::value::Record;
use futures::future::select_all;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Construction parameters of a [`NodeContext`], filled by the orchestrator.
pub(crate) struct ContextSpec {
  pub(crate) name: String,
  pub(crate) copy: usize,
  pub(crate) copies: usize,
  pub(crate) config: Arc<serde_json::Value>,
  pub(crate) factory: Arc<dyn NodeFactory>,
  pub(crate) variables: Variables,
  pub(crate) log: LogHandle,
  pub(crate) stop: StopSignal,
  pub(crate) inputs: Vec<Arc<RowSet>>,
  pub(crate) router: RowRouter,
  pub(crate) error_channel: Option<ErrorChannel>,
  pub(crate) input_schema: Arc<RowSchema>,
  pub(crate) output_schema: Arc<RowSchema>,
  pub(crate) safe_mode: bool,
}

/// Runtime view of one node copy, handed to every [`Node`](crate::Node) hook.
pub struct NodeContext {
  name: String,
  copy: usize,
  copies: usize,
  config: Arc<serde_json::Value>,
  factory: Arc<dyn NodeFactory>,
  variables: Variables,
  log: LogHandle,
  stop: StopSignal,
  inputs: Vec<Arc<RowSet>>,
  input_cursor: usize,
  input_sources: BTreeSet<String>,
  router: RowRouter,
  error_channel: Option<ErrorChannel>,
  listeners: Vec<Arc<dyn RowListener>>,
  counters: NodeCounters,
  reference_input: Arc<RowSchema>,
  input_schema: Option<Arc<RowSchema>>,
  output_schema: Arc<RowSchema>,
  required_fields: Vec<String>,
  first_row_seen: bool,
  safe_mode: bool,
}

impl fmt::Debug for NodeContext {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("NodeContext")
      .field("name", &self.name)
      .field("copy", &self.copy)
      .field("inputs", &self.inputs.len())
      .field("outputs", &self.router.row_sets().len())
      .field("counters", &self.counters)
      .finish()
  }
}

impl NodeContext {
  pub(crate) fn new(spec: ContextSpec) -> Self {
    let required_fields = spec.factory.required_input_fields(&spec.config);
    let input_sources = spec
      .inputs
      .iter()
      .map(|rs| rs.origin().node.clone())
      .collect();
    Self {
      name: spec.name,
      copy: spec.copy,
      copies: spec.copies,
      config: spec.config,
      factory: spec.factory,
      variables: spec.variables,
      log: spec.log,
      stop: spec.stop,
      inputs: spec.inputs,
      input_cursor: 0,
      input_sources,
      router: spec.router,
      error_channel: spec.error_channel,
      listeners: Vec::new(),
      counters: NodeCounters::default(),
      reference_input: spec.input_schema,
      input_schema: None,
      output_schema: spec.output_schema,
      required_fields,
      first_row_seen: false,
      safe_mode: spec.safe_mode,
    }
  }

  /// Node name.
  pub fn name(&self) -> &str {
    &self.name
  }

  /// Copy index of this executor, starting at 0.
  pub fn copy(&self) -> usize {
    self.copy
  }

  /// Number of copies of this node in the run.
  pub fn copies(&self) -> usize {
    self.copies
  }

  /// Static node configuration.
  pub fn config(&self) -> &serde_json::Value {
    &self.config
  }

  /// Run variables.
  pub fn variables(&self) -> &Variables {
    &self.variables
  }

  /// Log handle tagged with `node.copy`.
  pub fn log(&self) -> &LogHandle {
    &self.log
  }

  /// Returns `true` once the run has been stopped.
  pub fn is_stopped(&self) -> bool {
    self.stop.is_stopped()
  }

  /// Counters so far.
  pub fn counters(&self) -> &NodeCounters {
    &self.counters
  }

  /// Returns `true` when the node has an error hop.
  pub fn has_error_hop(&self) -> bool {
    self.error_channel.is_some()
  }

  /// Returns `true` when the node has no input Row Set at all.
  pub fn is_source(&self) -> bool {
    self.input_sources.is_empty()
  }

  /// Names of the upstream nodes feeding this copy.
  pub fn input_sources(&self) -> impl Iterator<Item = &str> {
    self.input_sources.iter().map(String::as_str)
  }

  /// Names of the downstream nodes on success hops.
  pub fn output_targets(&self) -> impl Iterator<Item = &str> {
    self.router.targets()
  }

  /// Schema of the first row read, once one has been read.
  pub fn input_schema(&self) -> Option<&Arc<RowSchema>> {
    self.input_schema.as_ref()
  }

  /// Input schema computed before the run.
  pub fn reference_input_schema(&self) -> &Arc<RowSchema> {
    &self.reference_input
  }

  /// Output schema this node emits.
  ///
  /// Before the first row this is the schema computed before the run; after
  /// it, the schema declared from the arriving input.
  pub fn output_schema(&self) -> Arc<RowSchema> {
    Arc::clone(&self.output_schema)
  }

  /// Replaces the output schema.
  pub fn set_output_schema(&mut self, schema: RowSchema) {
    self.output_schema = Arc::new(schema);
  }

  /// Position of `field` in the input schema, or in the reference input
  /// schema before the first row.
  ///
  /// # Errors
  ///
  /// Returns [`NodeError::MissingField`] if the field does not exist.
  pub fn field_index(&self, field: &str) -> Result<usize, NodeError> {
    let schema = self.input_schema.as_ref().unwrap_or(&self.reference_input);
    schema
      .index_of(field)
      .ok_or_else(|| NodeError::MissingField(field.to_string()))
  }

  /// Counts one row read from an external source.
  pub fn increment_lines_input(&mut self) {
    self.counters.lines_input += 1;
  }

  /// Counts one row written to an external target.
  pub fn increment_lines_output(&mut self) {
    self.counters.lines_output += 1;
  }

  /// Counts one row updated in an external target.
  pub fn increment_lines_updated(&mut self) {
    self.counters.lines_updated += 1;
  }

  /// Counts one skipped row.
  pub fn increment_lines_skipped(&mut self) {
    self.counters.lines_skipped += 1;
  }

  /// Reads the next row from any input, round-robin.
  ///
  /// Suspends only when every live input is empty. Returns `None` once every
  /// input is drained and done, or when the run is stopped.
  ///
  /// # Errors
  ///
  /// On the first row: [`NodeError::MissingField`] if a required input field
  /// is absent, or a schema error from the node type's output declaration.
  /// In safe mode: a schema error if the row's layout differs from the first.
  pub async fn get_row(&mut self) -> Result<Option<Row>, NodeError> {
    self.read(None).await
  }

  /// Reads the next row from the inputs fed by `source` only.
  ///
  /// Returns `None` once those inputs are drained and done, or when the run
  /// is stopped.
  ///
  /// # Errors
  ///
  /// Returns [`NodeError::Fatal`] if `source` does not feed this node, plus
  /// the errors of [`get_row`](Self::get_row).
  pub async fn get_row_from(&mut self, source: &str) -> Result<Option<Row>, NodeError> {
    if !self.input_sources.contains(source) {
      return Err(NodeError::fatal(format!(
        "node '{}' is not an input of '{}'",
        source, self.name
      )));
    }
    self.read(Some(source)).await
  }

  async fn read(&mut self, source: Option<&str>) -> Result<Option<Row>, NodeError> {
    let wanted = |rs: &RowSet| source.is_none_or(|s| rs.origin().node == s);

    loop {
      if self.stop.is_stopped() {
        return Ok(None);
      }

      let count = self.inputs.len();
      for step in 0..count {
        let index = (self.input_cursor + step) % count;
        if !wanted(&self.inputs[index]) {
          continue;
        }
        if let Some(row) = self.inputs[index].try_get() {
          self.input_cursor = (index + 1) % count;
          return self.accept(row).map(Some);
        }
      }

      // Done is checked before empty: once done is seen no put can follow.
      self.inputs.retain(|rs| !(rs.is_done() && rs.is_empty()));
      if self.input_cursor >= self.inputs.len() {
        self.input_cursor = 0;
      }

      let waited = {
        let pending: Vec<_> = self
          .inputs
          .iter()
          .enumerate()
          .filter(|(_, rs)| wanted(rs))
          .collect();
        if pending.is_empty() {
          return Ok(None);
        }
        let positions: Vec<usize> = pending.iter().map(|(i, _)| *i).collect();
        let futures = pending.iter().map(|(_, rs)| Box::pin(rs.get()));
        let (row, which, _rest) = select_all(futures).await;
        row.map(|row| (positions[which], row))
      };

      if let Some((index, row)) = waited {
        self.input_cursor = (index + 1) % self.inputs.len();
        return self.accept(row).map(Some);
      }
    }
  }

  fn accept(&mut self, row: Row) -> Result<Row, NodeError> {
    let (schema, record) = row;
    if !self.first_row_seen {
      self.first_row_seen = true;
      self.on_first_row(&schema)?;
    } else if self.safe_mode {
      self.check_layout(&schema)?;
    }

    self.counters.lines_read += 1;
    for listener in &self.listeners {
      listener.row_read(&schema, &record);
    }
    if self.log.is_enabled(LogLevel::RowLevel) {
      self
        .log
        .row_level(format!("read row #{}: {:?}", self.counters.lines_read, record.values()));
    }
    Ok((schema, record))
  }

  fn on_first_row(&mut self, schema: &Arc<RowSchema>) -> Result<(), NodeError> {
    if let Some(missing) = self
      .required_fields
      .iter()
      .find(|field| schema.index_of(field).is_none())
    {
      return Err(NodeError::MissingField(missing.clone()));
    }
    if self.safe_mode {
      if let Some(name) = schema.find_duplicate() {
        return Err(SchemaError::DuplicateField(name.to_string()).into());
      }
    }
    // Several upstream nodes: keep the merged schema computed before the run.
    if self.input_sources.len() <= 1 {
      let output = self
        .factory
        .declare_output_schema(schema, &self.config)?;
      self.output_schema = Arc::new(output);
    }
    self.input_schema = Some(Arc::clone(schema));
    self.log.detailed(format!(
      "first row received with fields [{}]",
      schema.field_names().join(", ")
    ));
    Ok(())
  }

  fn check_layout(&self, schema: &Arc<RowSchema>) -> Result<(), NodeError> {
    match &self.input_schema {
      Some(first) if !Arc::ptr_eq(first, schema) => Ok(first.check_same_layout(schema)?),
      _ => Ok(()),
    }
  }

  /// Emits a record on the success path.
  ///
  /// With no output hop the record is counted as written and dropped, which
  /// makes the node a sink. Otherwise every Row Set that accepted the record
  /// counts as one written line, so a copied record counts once per delivery.
  /// A record dropped because the run was stopped is not counted.
  ///
  /// # Errors
  ///
  /// In safe mode: a schema error if the record does not match `schema`.
  pub async fn put_row(&mut self, schema: &Arc<RowSchema>, record: Record) -> Result<(), NodeError> {
    self.before_write(schema, &record)?;
    if self.router.is_empty() {
      self.counters.lines_written += 1;
      return Ok(());
    }
    let delivered = self.router.route(schema, record).await;
    self.counters.lines_written += delivered as u64;
    Ok(())
  }

  /// Emits a record only to the hop leading to `target`.
  ///
  /// # Errors
  ///
  /// Returns [`NodeError::Fatal`] if no success hop leads to `target`, plus
  /// the safe-mode errors of [`put_row`](Self::put_row).
  pub async fn put_row_to(&mut self, target: &str, schema: &Arc<RowSchema>, record: Record) -> Result<(), NodeError> {
    self.before_write(schema, &record)?;
    match self.router.route_to(target, schema, record).await {
      Some(true) => {
        self.counters.lines_written += 1;
        Ok(())
      }
      Some(false) => Ok(()),
      None => Err(NodeError::fatal(format!(
        "node '{}' has no hop to '{}'",
        self.name, target
      ))),
    }
  }

  fn before_write(&self, schema: &Arc<RowSchema>, record: &Record) -> Result<(), NodeError> {
    if self.safe_mode {
      schema.check_record(record)?;
    }
    for listener in &self.listeners {
      listener.row_written(schema, record);
    }
    if self.log.is_enabled(LogLevel::RowLevel) {
      self.log.row_level(format!(
        "write row #{}: {:?}",
        self.counters.lines_written + 1,
        record.values()
      ));
    }
    Ok(())
  }

  /// Diverts a failed record to the error hop.
  ///
  /// The record is widened with the diagnostic fields and counted as
  /// rejected. After the diversion the rejection thresholds are checked.
  ///
  /// # Errors
  ///
  /// Returns [`NodeError::Fatal`] if the node has no error hop or a threshold
  /// is exceeded, or a schema error if a diagnostic field name clashes.
  pub async fn put_error(&mut self, schema: &Arc<RowSchema>, record: Record, diagnostic: Diagnostic) -> Result<(), NodeError> {
    let Some(channel) = self.error_channel.as_mut() else {
      return Err(NodeError::fatal(diagnostic.description));
    };
    let (error_schema, row) = channel.prepare(schema, record, &diagnostic)?;
    for listener in &self.listeners {
      listener.error_row_written(&error_schema, &row);
    }
    self.log.debug(format!("row diverted to '{}': {}", channel.target(), diagnostic.description));
    if channel.send(&error_schema, row).await {
      self.counters.lines_rejected += 1;
    }
    channel.check_thresholds(self.counters.lines_rejected, self.counters.lines_read)
  }

  pub(crate) fn add_input(&mut self, row_set: Arc<RowSet>) {
    self.input_sources.insert(row_set.origin().node.clone());
    self.inputs.push(row_set);
  }

  pub(crate) fn add_listener(&mut self, listener: Arc<dyn RowListener>) {
    self.listeners.push(listener);
  }

  pub(crate) fn counters_mut(&mut self) -> &mut NodeCounters {
    &mut self.counters
  }

  pub(crate) fn finish_outputs(&self) {
    self.router.mark_done();
    if let Some(channel) = &self.error_channel {
      channel.mark_done();
    }
  }
}
