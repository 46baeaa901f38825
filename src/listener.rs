//! Row listeners: callbacks on every row an executor copy reads, writes or
//! diverts.

use crate::schema::RowSchema;
use crate::value::Record;
use std::sync::{Arc, Mutex};

/// Observer attached to one executor copy.
///
/// Callbacks run on the executor's task, inline with the data path; keep them
/// short.
pub trait RowListener: Send + Sync {
  /// A row was read from an input Row Set.
  fn row_read(&self, schema: &RowSchema, record: &Record) {
    let _ = (schema, record);
  }

  /// A row was emitted on the success path.
  fn row_written(&self, schema: &RowSchema, record: &Record) {
    let _ = (schema, record);
  }

  /// A row was diverted to the error hop. `schema` is the widened error
  /// schema and `record` carries the diagnostic fields.
  fn error_row_written(&self, schema: &RowSchema, record: &Record) {
    let _ = (schema, record);
  }
}

#[derive(Debug, Default)]
struct Collected {
  schema: Option<Arc<RowSchema>>,
  rows: Vec<Record>,
  error_schema: Option<Arc<RowSchema>>,
  error_rows: Vec<Record>,
}

/// Collects every written and diverted row, for sink-less runs and tests.
#[derive(Debug, Default)]
pub struct RowCollector {
  collected: Mutex<Collected>,
}

impl RowCollector {
  /// Creates an empty collector.
  pub fn new() -> Self {
    Self::default()
  }

  /// Rows written so far, in order.
  pub fn rows(&self) -> Vec<Record> {
    self.lock().rows.clone()
  }

  /// Schema of the last written row.
  pub fn schema(&self) -> Option<Arc<RowSchema>> {
    self.lock().schema.clone()
  }

  /// Diverted rows so far, in order.
  pub fn error_rows(&self) -> Vec<Record> {
    self.lock().error_rows.clone()
  }

  /// Schema of the last diverted row.
  pub fn error_schema(&self) -> Option<Arc<RowSchema>> {
    self.lock().error_schema.clone()
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, Collected> {
    self.collected.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn remember(slot: &mut Option<Arc<RowSchema>>, schema: &RowSchema) {
    if slot.as_deref() != Some(schema) {
      *slot = Some(Arc::new(schema.clone()));
    }
  }
}

impl RowListener for RowCollector {
  fn row_written(&self, schema: &RowSchema, record: &Record) {
    let mut collected = self.lock();
    Self::remember(&mut collected.schema, schema);
    collected.rows.push(record.clone());
  }

  fn error_row_written(&self, schema: &RowSchema, record: &Record) {
    let mut collected = self.lock();
    Self::remember(&mut collected.error_schema, schema);
    collected.error_rows.push(record.clone());
  }
}
