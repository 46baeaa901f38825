//! # Row Schema
//!
//! Ordered, named, typed field descriptors shared by every record of one
//! stream. A schema is published behind an [`Arc`] and is never mutated once
//! another task may be reading it: nodes that change a schema clone it first
//! and publish the clone.

use crate::value::{Record, Value, ValueType};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Error type for schema construction, merging and record validation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
  /// Two fields share a name.
  #[error("duplicate field '{0}'")]
  DuplicateField(String),
  /// A referenced field does not exist.
  #[error("unknown field '{0}'")]
  UnknownField(String),
  /// A record does not have as many values as the schema has fields.
  #[error("record has {actual} values but schema has {expected} fields")]
  SizeMismatch {
    /// Number of fields in the schema.
    expected: usize,
    /// Number of values in the record.
    actual: usize,
  },
  /// Two schemas that must share one layout do not.
  #[error("layout mismatch: {0}")]
  LayoutMismatch(String),
  /// A value does not match its field type.
  #[error("field '{field}' expects {expected} but got {actual}")]
  TypeMismatch {
    /// Field name.
    field: String,
    /// Declared type.
    expected: ValueType,
    /// Type of the offending value.
    actual: ValueType,
  },
  /// A value could not be converted to the requested type.
  #[error("cannot convert to {value_type}: {message}")]
  Conversion {
    /// Target type.
    value_type: ValueType,
    /// Conversion failure detail.
    message: String,
  },
  /// Any other invalid declaration.
  #[error("invalid schema: {0}")]
  Invalid(String),
}

/// Describes one field of a [`RowSchema`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldDescriptor {
  /// Field name, unique within its schema.
  pub name: String,
  /// Semantic type.
  #[serde(rename = "type")]
  pub value_type: ValueType,
  /// Maximum length for strings, total digits for numbers.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub length: Option<u32>,
  /// Digits after the decimal point.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub precision: Option<u32>,
  /// Name of the node that introduced the field.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub origin: Option<String>,
}

impl FieldDescriptor {
  /// Creates a descriptor with no length, precision or origin.
  pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
    Self {
      name: name.into(),
      value_type,
      length: None,
      precision: None,
      origin: None,
    }
  }

  /// Shorthand for a [`ValueType::String`] field.
  pub fn string(name: impl Into<String>) -> Self {
    Self::new(name, ValueType::String)
  }

  /// Shorthand for a [`ValueType::Integer`] field.
  pub fn integer(name: impl Into<String>) -> Self {
    Self::new(name, ValueType::Integer)
  }

  /// Sets the length attribute.
  pub fn with_length(mut self, length: u32) -> Self {
    self.length = Some(length);
    self
  }

  /// Sets the precision attribute.
  pub fn with_precision(mut self, precision: u32) -> Self {
    self.precision = Some(precision);
    self
  }

  /// Sets the origin node name.
  pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
    self.origin = Some(origin.into());
    self
  }

  /// Two descriptors are layout-compatible when name and type match.
  pub fn same_layout(&self, other: &FieldDescriptor) -> bool {
    self.value_type == other.value_type && self.name.eq_ignore_ascii_case(&other.name)
  }
}

/// How a node combines the schemas arriving on several input hops.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeRule {
  /// Concatenate positionally; duplicate names are a configuration error.
  #[default]
  Append,
  /// Concatenate positionally, renaming duplicates with `_1`, `_2`, ...
  RenameDuplicates,
  /// Every input must have the same layout; the first is used.
  Identical,
}

/// An ordered sequence of uniquely named field descriptors.
///
/// Name lookup is case-insensitive, matching how field references are written
/// in node configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowSchema {
  fields: Vec<FieldDescriptor>,
}

impl RowSchema {
  /// Creates an empty schema.
  pub fn new() -> Self {
    Self::default()
  }

  /// Creates a schema from descriptors.
  ///
  /// # Errors
  ///
  /// Returns [`SchemaError::DuplicateField`] if two descriptors share a name.
  pub fn from_fields(fields: Vec<FieldDescriptor>) -> Result<Self, SchemaError> {
    let schema = Self { fields };
    match schema.find_duplicate() {
      Some(name) => Err(SchemaError::DuplicateField(name.to_string())),
      None => Ok(schema),
    }
  }

  /// Number of fields.
  pub fn len(&self) -> usize {
    self.fields.len()
  }

  /// Returns `true` for a schema without fields.
  pub fn is_empty(&self) -> bool {
    self.fields.is_empty()
  }

  /// All descriptors in order.
  pub fn fields(&self) -> &[FieldDescriptor] {
    &self.fields
  }

  /// Descriptor at `index`.
  pub fn field(&self, index: usize) -> Option<&FieldDescriptor> {
    self.fields.get(index)
  }

  /// Field names in order.
  pub fn field_names(&self) -> Vec<&str> {
    self.fields.iter().map(|f| f.name.as_str()).collect()
  }

  /// Position of the named field, compared case-insensitively.
  pub fn index_of(&self, name: &str) -> Option<usize> {
    self
      .fields
      .iter()
      .position(|f| f.name.eq_ignore_ascii_case(name))
  }

  /// Descriptor of the named field.
  pub fn find(&self, name: &str) -> Option<&FieldDescriptor> {
    self.index_of(name).map(|i| &self.fields[i])
  }

  /// Appends a field.
  ///
  /// # Errors
  ///
  /// Returns [`SchemaError::DuplicateField`] if the name is already taken.
  pub fn add_field(&mut self, field: FieldDescriptor) -> Result<(), SchemaError> {
    if self.index_of(&field.name).is_some() {
      return Err(SchemaError::DuplicateField(field.name));
    }
    self.fields.push(field);
    Ok(())
  }

  /// Removes the named field and returns its descriptor.
  ///
  /// # Errors
  ///
  /// Returns [`SchemaError::UnknownField`] if no such field exists.
  pub fn remove_field(&mut self, name: &str) -> Result<FieldDescriptor, SchemaError> {
    let index = self
      .index_of(name)
      .ok_or_else(|| SchemaError::UnknownField(name.to_string()))?;
    Ok(self.fields.remove(index))
  }

  /// Appends every field of `other`, failing on the first duplicate name.
  pub fn append(&mut self, other: &RowSchema) -> Result<(), SchemaError> {
    for field in &other.fields {
      self.add_field(field.clone())?;
    }
    Ok(())
  }

  /// Appends every field of `other`, renaming clashing names with a numeric
  /// suffix (`name_1`, `name_2`, ...).
  pub fn append_renaming(&mut self, other: &RowSchema) {
    for field in &other.fields {
      let mut field = field.clone();
      if self.index_of(&field.name).is_some() {
        let base = field.name.clone();
        let mut suffix = 1;
        while self.index_of(&format!("{}_{}", base, suffix)).is_some() {
          suffix += 1;
        }
        field.name = format!("{}_{}", base, suffix);
      }
      self.fields.push(field);
    }
  }

  /// First field name that occurs more than once.
  pub fn find_duplicate(&self) -> Option<&str> {
    self.fields.iter().enumerate().find_map(|(i, field)| {
      self.fields[..i]
        .iter()
        .any(|earlier| earlier.name.eq_ignore_ascii_case(&field.name))
        .then_some(field.name.as_str())
    })
  }

  /// Checks that `other` has the same size, names and types in the same order.
  pub fn check_same_layout(&self, other: &RowSchema) -> Result<(), SchemaError> {
    if self.len() != other.len() {
      return Err(SchemaError::LayoutMismatch(format!(
        "expected {} fields, found {}",
        self.len(),
        other.len()
      )));
    }
    for (index, (mine, theirs)) in self.fields.iter().zip(&other.fields).enumerate() {
      if !mine.same_layout(theirs) {
        return Err(SchemaError::LayoutMismatch(format!(
          "field #{} is '{}' ({}) but '{}' ({}) was expected",
          index + 1,
          theirs.name,
          theirs.value_type,
          mine.name,
          mine.value_type
        )));
      }
    }
    Ok(())
  }

  /// Checks that `record` has one value per field and every non-null value
  /// matches its field type.
  pub fn check_record(&self, record: &Record) -> Result<(), SchemaError> {
    if record.len() != self.len() {
      return Err(SchemaError::SizeMismatch {
        expected: self.len(),
        actual: record.len(),
      });
    }
    for (field, value) in self.fields.iter().zip(record.values()) {
      if let Some(actual) = value.value_type() {
        if actual != field.value_type {
          return Err(SchemaError::TypeMismatch {
            field: field.name.clone(),
            expected: field.value_type,
            actual,
          });
        }
      }
    }
    Ok(())
  }

  /// Value of the named field in `record`.
  pub fn value<'r>(&self, record: &'r Record, name: &str) -> Option<&'r Value> {
    self.index_of(name).and_then(|i| record.get(i))
  }

  /// Merges several upstream schemas according to `rule`.
  ///
  /// Each input is paired with the name of the node it came from, which is
  /// used in error messages. An empty input list yields an empty schema.
  ///
  /// # Errors
  ///
  /// - [`MergeRule::Append`]: [`SchemaError::DuplicateField`] on a clash.
  /// - [`MergeRule::Identical`]: [`SchemaError::LayoutMismatch`] when an input
  ///   differs from the first one.
  pub fn merge(rule: MergeRule, inputs: &[(String, Arc<RowSchema>)]) -> Result<RowSchema, SchemaError> {
    let mut merged = RowSchema::new();
    let Some(((_, first), rest)) = inputs.split_first() else {
      return Ok(merged);
    };

    match rule {
      MergeRule::Append => {
        for (_, schema) in inputs {
          merged.append(schema)?;
        }
      }
      MergeRule::RenameDuplicates => {
        for (_, schema) in inputs {
          merged.append_renaming(schema);
        }
      }
      MergeRule::Identical => {
        for (origin, schema) in rest {
          first.check_same_layout(schema).map_err(|e| {
            SchemaError::LayoutMismatch(format!("input from '{}': {}", origin, e))
          })?;
        }
        merged = first.as_ref().clone();
      }
    }
    Ok(merged)
  }
}

impl FromIterator<FieldDescriptor> for RowSchema {
  /// Collects descriptors without duplicate checking; use
  /// [`RowSchema::from_fields`] for checked construction.
  fn from_iter<T: IntoIterator<Item = FieldDescriptor>>(iter: T) -> Self {
    Self {
      fields: iter.into_iter().collect(),
    }
  }
}
