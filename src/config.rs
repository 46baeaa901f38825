//! # Execution Configuration
//!
//! Run-scoped settings, read-only once a run starts: log verbosity, named
//! parameters and variables, metrics gathering, safe mode and the default
//! Row Set capacity.

use crate::error::Result;
use crate::row_set::DEFAULT_ROW_SET_CAPACITY;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Engine log verbosity, from silent to per-row tracing.
#[derive(
  Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
  /// No logging at all.
  Nothing,
  /// Errors only.
  Error,
  /// Start/stop of the run.
  Minimal,
  /// Per-node summaries.
  #[default]
  Basic,
  /// Lifecycle transitions.
  Detailed,
  /// Internal decisions.
  Debug,
  /// Every record.
  RowLevel,
}

impl LogLevel {
  /// Returns `true` when a message at `level` passes this threshold.
  pub fn enabled(self, level: LogLevel) -> bool {
    level != LogLevel::Nothing && level <= self
  }

  /// `tracing-subscriber` filter directive matching this level.
  pub fn filter_directive(self) -> &'static str {
    match self {
      LogLevel::Nothing => "off",
      LogLevel::Error => "error",
      LogLevel::Minimal | LogLevel::Basic => "info",
      LogLevel::Detailed | LogLevel::Debug => "debug",
      LogLevel::RowLevel => "trace",
    }
  }
}

impl fmt::Display for LogLevel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      LogLevel::Nothing => "Nothing",
      LogLevel::Error => "Error",
      LogLevel::Minimal => "Minimal",
      LogLevel::Basic => "Basic",
      LogLevel::Detailed => "Detailed",
      LogLevel::Debug => "Debug",
      LogLevel::RowLevel => "RowLevel",
    };
    f.write_str(name)
  }
}

/// Run-scoped execution settings.
///
/// Every field has a default, so a partial JSON document is accepted:
///
/// ```rust
/// use hopweave::ExecutionConfig;
///
/// let config = ExecutionConfig::from_json(r#"{ "safe_mode": true }"#).unwrap();
/// assert!(config.safe_mode);
/// assert_eq!(config.row_set_capacity, 10_000);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
  /// Engine log verbosity.
  pub log_level: LogLevel,
  /// Named parameters; take precedence over variables of the same name.
  pub parameters: BTreeMap<String, String>,
  /// Named variables.
  pub variables: BTreeMap<String, String>,
  /// Emit metric snapshot events.
  pub gather_metrics: bool,
  /// Validate every row read and written against its schema.
  pub safe_mode: bool,
  /// Capacity of every Row Set allocated for the run.
  pub row_set_capacity: usize,
}

impl Default for ExecutionConfig {
  fn default() -> Self {
    Self {
      log_level: LogLevel::default(),
      parameters: BTreeMap::new(),
      variables: BTreeMap::new(),
      gather_metrics: false,
      safe_mode: false,
      row_set_capacity: DEFAULT_ROW_SET_CAPACITY,
    }
  }
}

impl ExecutionConfig {
  /// Parses a configuration from JSON.
  pub fn from_json(json: &str) -> Result<Self> {
    Ok(serde_json::from_str(json)?)
  }

  /// Sets the log level.
  pub fn with_log_level(mut self, level: LogLevel) -> Self {
    self.log_level = level;
    self
  }

  /// Adds a named parameter.
  pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.parameters.insert(name.into(), value.into());
    self
  }

  /// Adds a named variable.
  pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.variables.insert(name.into(), value.into());
    self
  }

  /// Enables or disables metric snapshots.
  pub fn with_metrics(mut self, gather: bool) -> Self {
    self.gather_metrics = gather;
    self
  }

  /// Enables or disables safe mode.
  pub fn with_safe_mode(mut self, safe: bool) -> Self {
    self.safe_mode = safe;
    self
  }

  /// Sets the Row Set capacity.
  pub fn with_row_set_capacity(mut self, capacity: usize) -> Self {
    self.row_set_capacity = capacity;
    self
  }

  /// Resolved variable space for this run.
  pub fn variables(&self) -> Variables {
    Variables::from_config(self)
  }
}

/// Read-only variable space shared by every node of a run.
#[derive(Clone, Debug, Default)]
pub struct Variables {
  values: Arc<BTreeMap<String, String>>,
}

fn reference_pattern() -> &'static Regex {
  static PATTERN: OnceLock<Regex> = OnceLock::new();
  PATTERN.get_or_init(|| {
    Regex::new(r"\$\{([A-Za-z0-9_.\-]+)\}|%%([A-Za-z0-9_.\-]+)%%").expect("valid variable pattern")
  })
}

impl Variables {
  /// Builds the variable space from a configuration; parameters override
  /// variables.
  pub fn from_config(config: &ExecutionConfig) -> Self {
    let mut values = config.variables.clone();
    values.extend(config.parameters.clone());
    Self {
      values: Arc::new(values),
    }
  }

  /// Value of a variable.
  pub fn get(&self, name: &str) -> Option<&str> {
    self.values.get(name).map(String::as_str)
  }

  /// Number of defined variables.
  pub fn len(&self) -> usize {
    self.values.len()
  }

  /// Returns `true` when no variable is defined.
  pub fn is_empty(&self) -> bool {
    self.values.is_empty()
  }

  /// Replaces `${NAME}` and `%%NAME%%` references with their values.
  ///
  /// Unknown references are left as written.
  pub fn substitute(&self, text: &str) -> String {
    if !text.contains("${") && !text.contains("%%") {
      return text.to_string();
    }
    reference_pattern()
      .replace_all(text, |caps: &Captures<'_>| {
        let name = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
        match self.get(name) {
          Some(value) => value.to_string(),
          None => caps[0].to_string(),
        }
      })
      .into_owned()
  }
}
