//! # Row Generator Node
//!
//! A source node emitting static rows from its configuration.
//!
//! ```json
//! {
//!   "fields": [{ "name": "name", "type": "string" }],
//!   "rows": [["ann"], { "name": "${USER}" }],
//!   "limit": 1
//! }
//! ```
//!
//! Rows are either positional arrays or objects keyed by field name; missing
//! values are null. String values go through variable substitution before
//! conversion. The row list is emitted `limit` times (default once).

use crate::context::NodeContext;
use crate::error::NodeError;
use crate::node::{Node, NodeFactory, Progress};
use crate::nodes::common::{DeclaredFields, config_error, parse_config};
use crate::config::Variables;
use crate::schema::{RowSchema, SchemaError};
use crate::value::{Record, Value};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

/// Type identifier of the row generator.
pub const ROW_GENERATOR: &str = "row_generator";

fn one() -> u64 {
  1
}

#[derive(Debug, Deserialize)]
struct RowGeneratorConfig {
  #[serde(default)]
  rows: Vec<serde_json::Value>,
  #[serde(default = "one")]
  limit: u64,
}

/// Converts one configured row into a record of `schema`.
fn build_record(schema: &RowSchema, row: &serde_json::Value, variables: &Variables) -> Result<Record, SchemaError> {
  let substituted = |value: &serde_json::Value| match value {
    serde_json::Value::String(s) => serde_json::Value::String(variables.substitute(s)),
    other => other.clone(),
  };

  let mut record = Record::with_capacity(schema.len());
  match row {
    serde_json::Value::Array(values) => {
      if values.len() > schema.len() {
        return Err(SchemaError::SizeMismatch {
          expected: schema.len(),
          actual: values.len(),
        });
      }
      for (field, value) in schema.fields().iter().zip(values) {
        record.push(Value::from_json(&substituted(value), field.value_type)?);
      }
    }
    serde_json::Value::Object(map) => {
      if let Some(unknown) = map.keys().find(|k| schema.index_of(k).is_none()) {
        return Err(SchemaError::UnknownField(unknown.clone()));
      }
      for field in schema.fields() {
        let value = map
          .iter()
          .find(|(k, _)| k.eq_ignore_ascii_case(&field.name))
          .map(|(_, v)| substituted(v))
          .unwrap_or(serde_json::Value::Null);
        record.push(Value::from_json(&value, field.value_type)?);
      }
    }
    other => {
      return Err(SchemaError::Invalid(format!(
        "a row must be an array or an object, got {}",
        other
      )));
    }
  }
  record.pad_to(schema.len());
  Ok(record)
}

/// Emits configured rows, then finishes.
#[derive(Debug)]
pub struct RowGeneratorNode {
  config: RowGeneratorConfig,
  schema: Arc<RowSchema>,
  records: Vec<Record>,
  position: usize,
  emitted_passes: u64,
}

#[async_trait]
impl Node for RowGeneratorNode {
  async fn init(&mut self, ctx: &mut NodeContext) -> Result<(), NodeError> {
    self.schema = ctx.output_schema();
    self.records = self
      .config
      .rows
      .iter()
      .map(|row| build_record(&self.schema, row, ctx.variables()))
      .collect::<Result<_, _>>()?;
    ctx
      .log()
      .detailed(format!("{} rows x {} passes", self.records.len(), self.config.limit));
    Ok(())
  }

  async fn process_one_unit(&mut self, ctx: &mut NodeContext) -> Result<Progress, NodeError> {
    if self.records.is_empty() || self.emitted_passes >= self.config.limit {
      return Ok(Progress::Finished);
    }
    let record = self.records[self.position].clone();
    self.position += 1;
    if self.position == self.records.len() {
      self.position = 0;
      self.emitted_passes += 1;
    }
    ctx.put_row(&self.schema, record).await?;
    Ok(Progress::Continue)
  }
}

/// Factory of [`RowGeneratorNode`].
#[derive(Debug, Default)]
pub struct RowGeneratorFactory;

impl NodeFactory for RowGeneratorFactory {
  fn type_id(&self) -> &str {
    ROW_GENERATOR
  }

  fn declare_output_schema(
    &self,
    _input: &RowSchema,
    config: &serde_json::Value,
  ) -> Result<RowSchema, SchemaError> {
    DeclaredFields::schema(config)
  }

  fn create(&self, config: &serde_json::Value) -> Result<Box<dyn Node>, NodeError> {
    let config: RowGeneratorConfig =
      parse_config(config).map_err(|e| config_error(ROW_GENERATOR, e))?;
    Ok(Box::new(RowGeneratorNode {
      config,
      schema: Arc::new(RowSchema::new()),
      records: Vec::new(),
      position: 0,
      emitted_passes: 0,
    }))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::ExecutionConfig;
  use crate::schema::FieldDescriptor;
  use serde_json::json;

  fn schema() -> RowSchema {
    RowSchema::from_fields(vec![FieldDescriptor::string("name"), FieldDescriptor::integer("age")]).unwrap()
  }

  #[test]
  fn test_build_record_from_array_and_object() {
    let vars = ExecutionConfig::default().with_variable("WHO", "ann").variables();
    let positional = build_record(&schema(), &json!(["${WHO}", 31]), &vars).unwrap();
    assert_eq!(positional.values(), &[Value::from("ann"), Value::Integer(31)]);

    let keyed = build_record(&schema(), &json!({ "AGE": "7" }), &vars).unwrap();
    assert_eq!(keyed.values(), &[Value::Null, Value::Integer(7)]);
  }

  #[test]
  fn test_build_record_rejects_bad_rows() {
    let vars = Variables::default();
    assert!(matches!(
      build_record(&schema(), &json!(["a", 1, true]), &vars),
      Err(SchemaError::SizeMismatch { .. })
    ));
    assert!(matches!(
      build_record(&schema(), &json!({ "nope": 1 }), &vars),
      Err(SchemaError::UnknownField(_))
    ));
    assert!(build_record(&schema(), &json!(["a", "old"]), &vars).is_err());
  }
}
