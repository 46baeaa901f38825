//! # Error Channel
//!
//! The optional diversion path of a node. A record that fails node-local
//! processing is widened with diagnostic fields and copied onto the node's
//! error hop instead of aborting the run. The success path is untouched.

use crate::error::{Diagnostic, NodeError};
use crate::graph::ErrorHandling;
use crate::row_set::RowSet;
use crate::schema::{FieldDescriptor, RowSchema, SchemaError};
use crate::value::{Record, Value, ValueType};
use std::sync::Arc;

/// Diagnostic fields appended to diverted records, named per `options`.
///
/// A field whose configured name is empty is omitted.
pub fn diagnostic_fields(options: &ErrorHandling) -> Vec<FieldDescriptor> {
  [
    (&options.count_field, ValueType::Integer),
    (&options.description_field, ValueType::String),
    (&options.field_field, ValueType::String),
    (&options.code_field, ValueType::String),
  ]
  .into_iter()
  .filter(|(name, _)| !name.is_empty())
  .map(|(name, value_type)| FieldDescriptor::new(name.clone(), value_type))
  .collect()
}

/// The error schema: `schema` followed by the diagnostic fields.
///
/// # Errors
///
/// Returns [`SchemaError::DuplicateField`] if a diagnostic field name clashes
/// with an existing field.
pub fn widen(schema: &RowSchema, options: &ErrorHandling) -> Result<RowSchema, SchemaError> {
  let mut widened = schema.clone();
  for field in diagnostic_fields(options) {
    widened.add_field(field)?;
  }
  Ok(widened)
}

/// The error record: `record` padded to `width` values, followed by the
/// diagnostic values.
pub fn error_record(record: Record, width: usize, diagnostic: &Diagnostic, options: &ErrorHandling) -> Record {
  let mut row = record;
  row.pad_to(width);
  let optional = |v: &Option<String>| v.clone().map_or(Value::Null, Value::String);
  let values = [
    (&options.count_field, Value::Integer(diagnostic.count)),
    (&options.description_field, Value::String(diagnostic.description.clone())),
    (&options.field_field, optional(&diagnostic.field)),
    (&options.code_field, optional(&diagnostic.code)),
  ];
  row.extend(
    values
      .into_iter()
      .filter(|(name, _)| !name.is_empty())
      .map(|(_, value)| value),
  );
  row
}

/// Error hop of one executor copy.
#[derive(Debug)]
pub struct ErrorChannel {
  target: String,
  row_sets: Vec<Arc<RowSet>>,
  cursor: usize,
  options: ErrorHandling,
  cache: Option<(Arc<RowSchema>, Arc<RowSchema>)>,
}

impl ErrorChannel {
  /// Creates a channel to `target` over one Row Set per reachable target copy.
  pub fn new(target: impl Into<String>, row_sets: Vec<Arc<RowSet>>, options: ErrorHandling) -> Self {
    Self {
      target: target.into(),
      row_sets,
      cursor: 0,
      options,
      cache: None,
    }
  }

  /// Target node name.
  pub fn target(&self) -> &str {
    &self.target
  }

  /// Error hop settings.
  pub fn options(&self) -> &ErrorHandling {
    &self.options
  }

  /// Row Sets of the error hop.
  pub fn row_sets(&self) -> &[Arc<RowSet>] {
    &self.row_sets
  }

  /// Builds the widened schema and record for a failed record.
  ///
  /// The widened schema is cached per input schema instance.
  pub fn prepare(
    &mut self,
    schema: &Arc<RowSchema>,
    record: Record,
    diagnostic: &Diagnostic,
  ) -> Result<(Arc<RowSchema>, Record), SchemaError> {
    let widened = match &self.cache {
      Some((original, widened)) if Arc::ptr_eq(original, schema) => Arc::clone(widened),
      _ => {
        let widened = Arc::new(widen(schema, &self.options)?);
        self.cache = Some((Arc::clone(schema), Arc::clone(&widened)));
        widened
      }
    };
    let row = error_record(record, schema.len(), diagnostic, &self.options);
    Ok((widened, row))
  }

  /// Puts a prepared error record on the next target copy's Row Set.
  ///
  /// Returns `false` if the run was stopped first.
  pub async fn send(&mut self, schema: &Arc<RowSchema>, record: Record) -> bool {
    if self.row_sets.is_empty() {
      return false;
    }
    let index = self.cursor % self.row_sets.len();
    self.cursor = (index + 1) % self.row_sets.len();
    self.row_sets[index].put(schema, record).await
  }

  /// Checks the rejection thresholds after a diversion.
  ///
  /// `rejected` already includes the record just diverted. The percentage is
  /// `ceil(100 * rejected / read)` and is not evaluated before any row has
  /// been read.
  ///
  /// # Errors
  ///
  /// Returns a fatal [`NodeError`] when a threshold is exceeded.
  pub fn check_thresholds(&self, rejected: u64, read: u64) -> Result<(), NodeError> {
    if let Some(max) = self.options.max_errors {
      if max > 0 && rejected > max {
        return Err(NodeError::fatal(format!(
          "too many rejected rows: {} exceeds the maximum of {}",
          rejected, max
        )));
      }
    }
    if let Some(max_pct) = self.options.max_percent_errors {
      let min_rows = self.options.min_rows_for_percent;
      if max_pct > 0 && rejected > 0 && read > 0 && (min_rows == 0 || read >= min_rows) {
        let pct = (100 * rejected).div_ceil(read);
        if pct > u64::from(max_pct) {
          return Err(NodeError::fatal(format!(
            "rejected {}% of rows ({} of {} read), above the maximum of {}%",
            pct, rejected, read, max_pct
          )));
        }
      }
    }
    Ok(())
  }

  /// Signals end of stream on every error Row Set.
  pub fn mark_done(&self) {
    for row_set in &self.row_sets {
      row_set.mark_done();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn channel(options: ErrorHandling) -> ErrorChannel {
    ErrorChannel::new("errors", Vec::new(), options)
  }

  #[test]
  fn test_widen_appends_named_diagnostic_fields() {
    let schema = RowSchema::from_fields(vec![FieldDescriptor::string("name")]).unwrap();
    let widened = widen(&schema, &ErrorHandling::default()).unwrap();
    assert_eq!(
      widened.field_names(),
      vec!["name", "error_count", "error_description", "error_field", "error_code"]
    );

    let options = ErrorHandling {
      field_field: String::new(),
      code_field: String::new(),
      ..ErrorHandling::default()
    };
    assert_eq!(widen(&schema, &options).unwrap().len(), 3);
  }

  #[test]
  fn test_widen_rejects_clashing_names() {
    let schema = RowSchema::from_fields(vec![FieldDescriptor::string("error_code")]).unwrap();
    assert_eq!(
      widen(&schema, &ErrorHandling::default()).unwrap_err(),
      SchemaError::DuplicateField("error_code".to_string())
    );
  }

  #[test]
  fn test_error_record_layout() {
    let diagnostic = Diagnostic::new("boom").with_code("E1");
    let row = error_record(Record::new(vec![Value::from("bob")]), 1, &diagnostic, &ErrorHandling::default());
    assert_eq!(
      row.values(),
      &[
        Value::from("bob"),
        Value::Integer(1),
        Value::from("boom"),
        Value::Null,
        Value::from("E1"),
      ]
    );
  }

  #[test]
  fn test_max_errors_threshold() {
    let channel = channel(ErrorHandling::default().with_max_errors(2));
    assert!(channel.check_thresholds(2, 10).is_ok());
    assert!(matches!(channel.check_thresholds(3, 10), Err(NodeError::Fatal(_))));
  }

  #[test]
  fn test_percent_threshold_waits_for_min_rows() {
    let channel = channel(ErrorHandling::default().with_max_percent_errors(10, 20));
    // 50% but only 4 rows read.
    assert!(channel.check_thresholds(2, 4).is_ok());
    // 10% is not above 10%.
    assert!(channel.check_thresholds(2, 20).is_ok());
    // ceil(100 * 3 / 20) = 15%.
    assert!(channel.check_thresholds(3, 20).is_err());
    // Nothing read yet.
    assert!(channel.check_thresholds(1, 0).is_ok());
  }
}
