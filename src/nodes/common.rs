//! # Common Node Utilities
//!
//! Configuration helpers shared by the built-in node types.

use crate::error::NodeError;
use crate::schema::{FieldDescriptor, RowSchema, SchemaError};
use serde::Deserialize;
use serde::de::DeserializeOwned;

/// Parses a node's JSON configuration into `T`.
///
/// A `null` configuration is treated as an empty object so that every field
/// with a serde default can be omitted.
pub fn parse_config<T: DeserializeOwned>(config: &serde_json::Value) -> Result<T, serde_json::Error> {
  if config.is_null() {
    serde_json::from_value(serde_json::Value::Object(Default::default()))
  } else {
    T::deserialize(config)
  }
}

/// A `fields` list declaring a schema in configuration.
#[derive(Debug, Default, Deserialize)]
pub struct DeclaredFields {
  /// Field descriptors, in order.
  #[serde(default)]
  pub fields: Vec<FieldDescriptor>,
}

impl DeclaredFields {
  /// Reads the `fields` list of `config` as a schema.
  pub fn schema(config: &serde_json::Value) -> Result<RowSchema, SchemaError> {
    let declared: DeclaredFields =
      parse_config(config).map_err(|e| SchemaError::Invalid(e.to_string()))?;
    RowSchema::from_fields(declared.fields)
  }
}

/// Maps a configuration parse error to a node error.
pub fn config_error(node_type: &str, error: serde_json::Error) -> NodeError {
  NodeError::fatal(format!("invalid {} configuration: {}", node_type, error))
}
