//! # Values and Records
//!
//! A [`Record`] is the unit of data carried through Row Sets: an ordered list
//! of [`Value`]s whose meaning is given by the [`RowSchema`](crate::schema::RowSchema)
//! travelling alongside it. Records never carry field names themselves.

use crate::schema::SchemaError;
use bytes::Bytes;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Index;

/// Semantic type of a field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
  /// UTF-8 text.
  String,
  /// 64-bit signed integer.
  Integer,
  /// 64-bit floating point number.
  Number,
  /// Boolean flag.
  Boolean,
  /// Point in time (UTC).
  Date,
  /// Raw bytes.
  Binary,
}

impl fmt::Display for ValueType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      ValueType::String => "String",
      ValueType::Integer => "Integer",
      ValueType::Number => "Number",
      ValueType::Boolean => "Boolean",
      ValueType::Date => "Date",
      ValueType::Binary => "Binary",
    };
    f.write_str(name)
  }
}

/// A single cell of a record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum Value {
  /// Absent value; valid for every field type.
  #[default]
  Null,
  /// Text value.
  String(String),
  /// Integer value.
  Integer(i64),
  /// Floating point value.
  Number(f64),
  /// Boolean value.
  Boolean(bool),
  /// Timestamp value.
  Date(DateTime<Utc>),
  /// Binary value.
  Binary(Bytes),
}

impl Value {
  /// Returns the type of this value, or `None` for [`Value::Null`].
  pub fn value_type(&self) -> Option<ValueType> {
    match self {
      Value::Null => None,
      Value::String(_) => Some(ValueType::String),
      Value::Integer(_) => Some(ValueType::Integer),
      Value::Number(_) => Some(ValueType::Number),
      Value::Boolean(_) => Some(ValueType::Boolean),
      Value::Date(_) => Some(ValueType::Date),
      Value::Binary(_) => Some(ValueType::Binary),
    }
  }

  /// Returns `true` for [`Value::Null`].
  pub fn is_null(&self) -> bool {
    matches!(self, Value::Null)
  }

  /// Borrows the text of a string value.
  pub fn as_str(&self) -> Option<&str> {
    match self {
      Value::String(s) => Some(s),
      _ => None,
    }
  }

  /// Returns the integer of an integer value.
  pub fn as_integer(&self) -> Option<i64> {
    match self {
      Value::Integer(i) => Some(*i),
      _ => None,
    }
  }

  /// Returns the number of a numeric value; integers are widened.
  pub fn as_number(&self) -> Option<f64> {
    match self {
      Value::Number(n) => Some(*n),
      Value::Integer(i) => Some(*i as f64),
      _ => None,
    }
  }

  /// Returns the flag of a boolean value.
  pub fn as_boolean(&self) -> Option<bool> {
    match self {
      Value::Boolean(b) => Some(*b),
      _ => None,
    }
  }

  /// Converts a JSON value into a value of the given type.
  ///
  /// Strings are parsed leniently into the target type so that static
  /// configuration can be written as plain text. JSON `null` always converts
  /// to [`Value::Null`].
  ///
  /// # Errors
  ///
  /// Returns [`SchemaError::Conversion`] if the JSON value cannot represent
  /// the requested type.
  pub fn from_json(json: &serde_json::Value, value_type: ValueType) -> Result<Value, SchemaError> {
    use serde_json::Value as Json;

    let fail = |message: String| SchemaError::Conversion {
      value_type,
      message,
    };

    if json.is_null() {
      return Ok(Value::Null);
    }

    match value_type {
      ValueType::String => Ok(Value::String(match json {
        Json::String(s) => s.clone(),
        other => other.to_string(),
      })),
      ValueType::Integer => match json {
        Json::Number(n) => n
          .as_i64()
          .map(Value::Integer)
          .ok_or_else(|| fail(format!("{} is not an integer", n))),
        Json::String(s) => s
          .trim()
          .parse::<i64>()
          .map(Value::Integer)
          .map_err(|e| fail(format!("'{}': {}", s, e))),
        other => Err(fail(format!("unexpected {}", other))),
      },
      ValueType::Number => match json {
        Json::Number(n) => n
          .as_f64()
          .map(Value::Number)
          .ok_or_else(|| fail(format!("{} is not a number", n))),
        Json::String(s) => s
          .trim()
          .parse::<f64>()
          .map(Value::Number)
          .map_err(|e| fail(format!("'{}': {}", s, e))),
        other => Err(fail(format!("unexpected {}", other))),
      },
      ValueType::Boolean => match json {
        Json::Bool(b) => Ok(Value::Boolean(*b)),
        Json::String(s) => match s.trim().to_ascii_lowercase().as_str() {
          "y" | "yes" | "true" | "1" => Ok(Value::Boolean(true)),
          "n" | "no" | "false" | "0" => Ok(Value::Boolean(false)),
          _ => Err(fail(format!("'{}' is not a boolean", s))),
        },
        other => Err(fail(format!("unexpected {}", other))),
      },
      ValueType::Date => match json {
        Json::String(s) => parse_date(s).ok_or_else(|| fail(format!("'{}' is not a date", s))),
        other => Err(fail(format!("unexpected {}", other))),
      },
      ValueType::Binary => match json {
        Json::String(s) => Ok(Value::Binary(Bytes::from(s.clone().into_bytes()))),
        Json::Array(items) => items
          .iter()
          .map(|item| {
            item
              .as_u64()
              .and_then(|b| u8::try_from(b).ok())
              .ok_or_else(|| fail(format!("{} is not a byte", item)))
          })
          .collect::<Result<Vec<u8>, _>>()
          .map(|bytes| Value::Binary(Bytes::from(bytes))),
        other => Err(fail(format!("unexpected {}", other))),
      },
    }
  }
}

fn parse_date(text: &str) -> Option<Value> {
  let text = text.trim();
  if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
    return Some(Value::Date(ts.with_timezone(&Utc)));
  }
  NaiveDate::parse_from_str(text, "%Y-%m-%d")
    .ok()
    .and_then(|d| d.and_hms_opt(0, 0, 0))
    .map(|dt| Value::Date(dt.and_utc()))
}

impl fmt::Display for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Value::Null => f.write_str("<null>"),
      Value::String(s) => f.write_str(s),
      Value::Integer(i) => write!(f, "{}", i),
      Value::Number(n) => write!(f, "{}", n),
      Value::Boolean(b) => write!(f, "{}", if *b { "Y" } else { "N" }),
      Value::Date(d) => write!(f, "{}", d.to_rfc3339()),
      Value::Binary(b) => write!(f, "<{} bytes>", b.len()),
    }
  }
}

impl From<&str> for Value {
  fn from(value: &str) -> Self {
    Value::String(value.to_string())
  }
}

impl From<String> for Value {
  fn from(value: String) -> Self {
    Value::String(value)
  }
}

impl From<i64> for Value {
  fn from(value: i64) -> Self {
    Value::Integer(value)
  }
}

impl From<f64> for Value {
  fn from(value: f64) -> Self {
    Value::Number(value)
  }
}

impl From<bool> for Value {
  fn from(value: bool) -> Self {
    Value::Boolean(value)
  }
}

/// An ordered list of values, positionally aligned with a row schema.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Vec<Value>);

impl Record {
  /// Creates a record from its values.
  pub fn new(values: Vec<Value>) -> Self {
    Self(values)
  }

  /// Creates an empty record with room for `capacity` values.
  pub fn with_capacity(capacity: usize) -> Self {
    Self(Vec::with_capacity(capacity))
  }

  /// Number of values in the record.
  pub fn len(&self) -> usize {
    self.0.len()
  }

  /// Returns `true` when the record holds no values.
  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  /// Value at `index`, if present.
  pub fn get(&self, index: usize) -> Option<&Value> {
    self.0.get(index)
  }

  /// Mutable value at `index`, if present.
  pub fn get_mut(&mut self, index: usize) -> Option<&mut Value> {
    self.0.get_mut(index)
  }

  /// Overwrites the value at `index`, padding with nulls when the record is
  /// shorter than `index + 1`.
  pub fn set(&mut self, index: usize, value: Value) {
    if index >= self.0.len() {
      self.0.resize(index + 1, Value::Null);
    }
    self.0[index] = value;
  }

  /// Appends a value.
  pub fn push(&mut self, value: Value) {
    self.0.push(value);
  }

  /// Pads the record with nulls up to `len` values.
  pub fn pad_to(&mut self, len: usize) {
    if self.0.len() < len {
      self.0.resize(len, Value::Null);
    }
  }

  /// All values in order.
  pub fn values(&self) -> &[Value] {
    &self.0
  }

  /// Consumes the record, returning its values.
  pub fn into_values(self) -> Vec<Value> {
    self.0
  }
}

impl From<Vec<Value>> for Record {
  fn from(values: Vec<Value>) -> Self {
    Self(values)
  }
}

impl FromIterator<Value> for Record {
  fn from_iter<T: IntoIterator<Item = Value>>(iter: T) -> Self {
    Self(iter.into_iter().collect())
  }
}

impl Extend<Value> for Record {
  fn extend<T: IntoIterator<Item = Value>>(&mut self, iter: T) {
    self.0.extend(iter);
  }
}

impl Index<usize> for Record {
  type Output = Value;

  fn index(&self, index: usize) -> &Self::Output {
    &self.0[index]
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_from_json_converts_lenient_strings() {
    assert_eq!(
      Value::from_json(&json!("42"), ValueType::Integer).unwrap(),
      Value::Integer(42)
    );
    assert_eq!(
      Value::from_json(&json!("Y"), ValueType::Boolean).unwrap(),
      Value::Boolean(true)
    );
    assert_eq!(
      Value::from_json(&json!(7), ValueType::String).unwrap(),
      Value::String("7".to_string())
    );
    assert_eq!(Value::from_json(&json!(null), ValueType::Date).unwrap(), Value::Null);
  }

  #[test]
  fn test_from_json_parses_dates() {
    let value = Value::from_json(&json!("2024-03-01"), ValueType::Date).unwrap();
    assert_eq!(value.value_type(), Some(ValueType::Date));
    assert!(Value::from_json(&json!("yesterday"), ValueType::Date).is_err());
  }

  #[test]
  fn test_from_json_rejects_mismatched_types() {
    let err = Value::from_json(&json!(1.5), ValueType::Integer).unwrap_err();
    assert!(matches!(err, SchemaError::Conversion { value_type: ValueType::Integer, .. }));
  }

  #[test]
  fn test_record_set_pads_with_nulls() {
    let mut record = Record::new(vec![Value::from("a")]);
    record.set(2, Value::from(3i64));
    assert_eq!(record.len(), 3);
    assert!(record[1].is_null());
    assert_eq!(record[2].as_integer(), Some(3));
  }
}
