//! # Error Handling
//!
//! Error types for every failure class the engine distinguishes:
//!
//! - **Configuration errors** ([`EngineError`]): bad graph, cyclic schema
//!   dependency, duplicate field from a merge, unknown node type. Detected in
//!   `prepare()` before any task starts.
//! - **Init failures** ([`EngineError::InitFailed`]): one or more nodes refused
//!   to initialize; every node that was created is disposed.
//! - **Per-record errors** ([`NodeError::Record`]): recoverable through the
//!   node's error hop, fatal without one.
//! - **Fatal node errors** ([`NodeError::Fatal`] and friends): stop the whole
//!   run. They never cross task boundaries as values; the executor raises the
//!   run-wide stop flag and records the message on the result.

use crate::schema::{RowSchema, SchemaError};
use crate::value::Record;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T, E = EngineError> = std::result::Result<T, E>;

/// Errors surfaced by graph validation, schema propagation and run control.
#[derive(Error, Debug)]
pub enum EngineError {
  /// The graph definition or execution configuration is invalid.
  #[error("configuration error: {0}")]
  Configuration(String),
  /// Schema propagation failed at a node.
  #[error("schema error at node '{node}': {source}")]
  Schema {
    /// Node whose schema could not be computed.
    node: String,
    /// Underlying schema error.
    #[source]
    source: SchemaError,
  },
  /// The hop graph used for schema propagation contains a cycle.
  #[error("graph contains a cycle through: {}", .0.join(", "))]
  Cycle(Vec<String>),
  /// No factory is registered for a node's type identifier.
  #[error("node '{node}' has unknown type '{type_id}'")]
  UnknownNodeType {
    /// Node name.
    node: String,
    /// Unregistered type identifier.
    type_id: String,
  },
  /// A referenced node does not exist.
  #[error("unknown node '{0}'")]
  UnknownNode(String),
  /// One or more node copies failed to initialize.
  #[error("initialization failed for: {}", .0.join(", "))]
  InitFailed(Vec<String>),
  /// An operation was called in the wrong run phase.
  #[error("invalid state: {0}")]
  InvalidState(String),
  /// JSON (de)serialization failed.
  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),
}

impl EngineError {
  /// Wraps a schema error with the node it occurred at.
  pub fn schema(node: impl Into<String>, source: SchemaError) -> Self {
    EngineError::Schema {
      node: node.into(),
      source,
    }
  }
}

/// Diagnostic attached to a record diverted to an error hop.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
  /// Number of errors found in the record.
  pub count: i64,
  /// Human-readable description.
  pub description: String,
  /// Name of the offending field, if one can be named.
  pub field: Option<String>,
  /// Opaque, node-supplied error code.
  pub code: Option<String>,
}

impl Diagnostic {
  /// Creates a diagnostic for a single error.
  pub fn new(description: impl Into<String>) -> Self {
    Self {
      count: 1,
      description: description.into(),
      field: None,
      code: None,
    }
  }

  /// Sets the error count.
  pub fn with_count(mut self, count: i64) -> Self {
    self.count = count;
    self
  }

  /// Names the offending field.
  pub fn with_field(mut self, field: impl Into<String>) -> Self {
    self.field = Some(field.into());
    self
  }

  /// Sets the opaque error code.
  pub fn with_code(mut self, code: impl Into<String>) -> Self {
    self.code = Some(code.into());
    self
  }
}

/// A record that failed node-local processing, together with its schema.
#[derive(Clone, Debug)]
pub struct RecordFailure {
  /// Schema of `record`.
  pub schema: Arc<RowSchema>,
  /// The original record.
  pub record: Record,
  /// What went wrong.
  pub diagnostic: Diagnostic,
}

/// Errors returned by node implementations.
#[derive(Error, Debug)]
pub enum NodeError {
  /// A single record could not be processed.
  #[error("record rejected: {}", .0.diagnostic.description)]
  Record(Box<RecordFailure>),
  /// The node cannot continue.
  #[error("{0}")]
  Fatal(String),
  /// A declared input field is missing from the arriving schema.
  #[error("required input field '{0}' not found")]
  MissingField(String),
  /// A schema check failed.
  #[error(transparent)]
  Schema(#[from] SchemaError),
}

impl NodeError {
  /// Builds a per-record failure for `record`.
  pub fn record(schema: &Arc<RowSchema>, record: Record, description: impl Into<String>) -> Self {
    NodeError::Record(Box::new(RecordFailure {
      schema: Arc::clone(schema),
      record,
      diagnostic: Diagnostic::new(description),
    }))
  }

  /// Builds a fatal error.
  pub fn fatal(message: impl Into<String>) -> Self {
    NodeError::Fatal(message.into())
  }

  /// Names the offending field of a per-record failure; no-op otherwise.
  pub fn with_field(mut self, field: impl Into<String>) -> Self {
    if let NodeError::Record(failure) = &mut self {
      failure.diagnostic.field = Some(field.into());
    }
    self
  }

  /// Sets the error code of a per-record failure; no-op otherwise.
  pub fn with_code(mut self, code: impl Into<String>) -> Self {
    if let NodeError::Record(failure) = &mut self {
      failure.diagnostic.code = Some(code.into());
    }
    self
  }

  /// Returns `true` for per-record failures.
  pub fn is_record(&self) -> bool {
    matches!(self, NodeError::Record(_))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::schema::FieldDescriptor;
  use crate::value::Value;

  #[test]
  fn test_record_error_builders_fill_diagnostic() {
    let schema = Arc::new(RowSchema::from_fields(vec![FieldDescriptor::string("name")]).unwrap());
    let err = NodeError::record(&schema, Record::new(vec![Value::from("bob")]), "bad name")
      .with_field("name")
      .with_code("UPPER001");
    match err {
      NodeError::Record(failure) => {
        assert_eq!(failure.diagnostic.count, 1);
        assert_eq!(failure.diagnostic.description, "bad name");
        assert_eq!(failure.diagnostic.field.as_deref(), Some("name"));
        assert_eq!(failure.diagnostic.code.as_deref(), Some("UPPER001"));
      }
      other => panic!("unexpected {other:?}"),
    }
  }

  #[test]
  fn test_engine_error_messages() {
    let err = EngineError::Cycle(vec!["a".into(), "b".into()]);
    assert_eq!(err.to_string(), "graph contains a cycle through: a, b");
    let err = EngineError::schema("merge", SchemaError::DuplicateField("id".into()));
    assert_eq!(err.to_string(), "schema error at node 'merge': duplicate field 'id'");
  }
}
