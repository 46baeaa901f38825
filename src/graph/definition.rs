//! # Graph Definition
//!
//! The static, read-only description of a run: nodes, hops between them and
//! the result subjects used to aggregate counters. Definitions derive serde
//! and can be loaded from JSON.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// How a node spreads its records over several output Row Sets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionMode {
  /// Each record goes to exactly one output Row Set, round-robin.
  #[default]
  Distribute,
  /// Each record goes to every downstream hop.
  Copy,
}

fn default_count_field() -> String {
  "error_count".to_string()
}

fn default_description_field() -> String {
  "error_description".to_string()
}

fn default_field_field() -> String {
  "error_field".to_string()
}

fn default_code_field() -> String {
  "error_code".to_string()
}

/// Error hop settings of a node: diagnostic field names and rejection
/// thresholds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorHandling {
  /// Name of the error count field; empty to omit it.
  #[serde(default = "default_count_field")]
  pub count_field: String,
  /// Name of the error description field; empty to omit it.
  #[serde(default = "default_description_field")]
  pub description_field: String,
  /// Name of the offending field name field; empty to omit it.
  #[serde(default = "default_field_field")]
  pub field_field: String,
  /// Name of the error code field; empty to omit it.
  #[serde(default = "default_code_field")]
  pub code_field: String,
  /// Maximum number of rejected rows before the node fails.
  #[serde(default)]
  pub max_errors: Option<u64>,
  /// Maximum percentage of rejected rows (of rows read) before the node fails.
  #[serde(default)]
  pub max_percent_errors: Option<u8>,
  /// Rows that must be read before the percentage threshold applies.
  #[serde(default)]
  pub min_rows_for_percent: u64,
}

impl Default for ErrorHandling {
  fn default() -> Self {
    Self {
      count_field: default_count_field(),
      description_field: default_description_field(),
      field_field: default_field_field(),
      code_field: default_code_field(),
      max_errors: None,
      max_percent_errors: None,
      min_rows_for_percent: 0,
    }
  }
}

impl ErrorHandling {
  /// Sets the maximum number of rejected rows.
  pub fn with_max_errors(mut self, max: u64) -> Self {
    self.max_errors = Some(max);
    self
  }

  /// Sets the maximum rejected percentage and the rows needed before it
  /// applies.
  pub fn with_max_percent_errors(mut self, percent: u8, min_rows: u64) -> Self {
    self.max_percent_errors = Some(percent);
    self.min_rows_for_percent = min_rows;
    self
  }
}

fn default_copies() -> usize {
  1
}

fn is_default<T: Default + PartialEq>(value: &T) -> bool {
  *value == T::default()
}

/// One node of a graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeDefinition {
  /// Unique name within the graph.
  pub name: String,
  /// Registered node type identifier.
  #[serde(rename = "type")]
  pub type_id: String,
  /// Number of parallel copies, at least 1.
  #[serde(default = "default_copies")]
  pub copies: usize,
  /// Static configuration, consumed only by the node implementation.
  #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
  pub config: serde_json::Value,
  /// Fan-out mode over output hops.
  #[serde(default, skip_serializing_if = "is_default")]
  pub distribution: DistributionMode,
  /// Error hop settings; only used when the node has an error hop.
  #[serde(default, skip_serializing_if = "is_default")]
  pub error_handling: ErrorHandling,
}

impl NodeDefinition {
  /// Creates a single-copy, distributing node with no configuration.
  pub fn new(name: impl Into<String>, type_id: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      type_id: type_id.into(),
      copies: 1,
      config: serde_json::Value::Null,
      distribution: DistributionMode::default(),
      error_handling: ErrorHandling::default(),
    }
  }

  /// Sets the number of copies.
  pub fn with_copies(mut self, copies: usize) -> Self {
    self.copies = copies;
    self
  }

  /// Sets the static configuration.
  pub fn with_config(mut self, config: serde_json::Value) -> Self {
    self.config = config;
    self
  }

  /// Sets the fan-out mode.
  pub fn with_distribution(mut self, mode: DistributionMode) -> Self {
    self.distribution = mode;
    self
  }

  /// Sets the error hop settings.
  pub fn with_error_handling(mut self, error_handling: ErrorHandling) -> Self {
    self.error_handling = error_handling;
    self
  }
}

fn enabled_default() -> bool {
  true
}

fn is_true(value: &bool) -> bool {
  *value
}

/// A directed edge between two nodes.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HopDefinition {
  /// Source node name.
  pub from: String,
  /// Target node name.
  pub to: String,
  /// Disabled hops are ignored entirely.
  #[serde(default = "enabled_default", skip_serializing_if = "is_true")]
  pub enabled: bool,
  /// Marks the source node's error hop.
  #[serde(default, skip_serializing_if = "is_default")]
  pub error: bool,
}

impl HopDefinition {
  /// Creates an enabled success hop.
  pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
    Self {
      from: from.into(),
      to: to.into(),
      enabled: true,
      error: false,
    }
  }

  /// Creates an enabled error hop.
  pub fn error(from: impl Into<String>, to: impl Into<String>) -> Self {
    Self {
      error: true,
      ..Self::new(from, to)
    }
  }

  /// Disables the hop.
  pub fn disabled(mut self) -> Self {
    self.enabled = false;
    self
  }
}

/// Nodes whose counters feed each aggregate of the run result.
///
/// `None` selects the default subjects: sink nodes for read/written, every
/// node for the other counters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultSubjects {
  /// Nodes whose rows read are summed into `lines_read`.
  pub read: Option<Vec<String>>,
  /// Nodes whose rows written are summed into `lines_written`.
  pub written: Option<Vec<String>>,
  /// Nodes whose input rows are summed into `lines_input`.
  pub input: Option<Vec<String>>,
  /// Nodes whose output rows are summed into `lines_output`.
  pub output: Option<Vec<String>>,
  /// Nodes whose updated rows are summed into `lines_updated`.
  pub updated: Option<Vec<String>>,
  /// Nodes whose rejected rows are summed into `lines_rejected`.
  pub rejected: Option<Vec<String>>,
}

impl ResultSubjects {
  fn names(&self) -> impl Iterator<Item = &String> {
    [
      &self.read,
      &self.written,
      &self.input,
      &self.output,
      &self.updated,
      &self.rejected,
    ]
    .into_iter()
    .flatten()
    .flatten()
  }
}

/// A complete graph: nodes, hops and result subjects.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphDefinition {
  /// Graph name, used as the run's log subject.
  pub name: String,
  /// Nodes in definition order.
  #[serde(default)]
  pub nodes: Vec<NodeDefinition>,
  /// Hops in definition order.
  #[serde(default)]
  pub hops: Vec<HopDefinition>,
  /// Result aggregation subjects.
  #[serde(default, skip_serializing_if = "is_default")]
  pub result_subjects: ResultSubjects,
}

impl GraphDefinition {
  /// Creates an empty graph.
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      ..Self::default()
    }
  }

  /// Parses a graph from JSON and validates it.
  pub fn from_json(json: &str) -> Result<Self> {
    let graph: GraphDefinition = serde_json::from_str(json)?;
    graph.validate()?;
    Ok(graph)
  }

  /// Serializes the graph to pretty-printed JSON.
  pub fn to_json(&self) -> Result<String> {
    Ok(serde_json::to_string_pretty(self)?)
  }

  /// Appends a node.
  pub fn add_node(&mut self, node: NodeDefinition) {
    self.nodes.push(node);
  }

  /// Appends a hop.
  pub fn add_hop(&mut self, hop: HopDefinition) {
    self.hops.push(hop);
  }

  /// Looks up a node by name.
  pub fn node(&self, name: &str) -> Option<&NodeDefinition> {
    self.nodes.iter().find(|n| n.name == name)
  }

  /// Enabled hops in definition order.
  pub fn enabled_hops(&self) -> impl Iterator<Item = &HopDefinition> {
    self.hops.iter().filter(|h| h.enabled)
  }

  /// Enabled hops arriving at `node`, success and error alike.
  pub fn input_hops<'a>(&'a self, node: &'a str) -> impl Iterator<Item = &'a HopDefinition> + 'a {
    self.enabled_hops().filter(move |h| h.to == node)
  }

  /// Enabled success hops leaving `node`.
  pub fn output_hops<'a>(&'a self, node: &'a str) -> impl Iterator<Item = &'a HopDefinition> + 'a {
    self.enabled_hops().filter(move |h| h.from == node && !h.error)
  }

  /// The enabled error hop leaving `node`, if any.
  pub fn error_hop(&self, node: &str) -> Option<&HopDefinition> {
    self.enabled_hops().find(|h| h.from == node && h.error)
  }

  /// Nodes without enabled outgoing success hops.
  pub fn sinks(&self) -> Vec<&str> {
    self
      .nodes
      .iter()
      .filter(|n| self.output_hops(&n.name).next().is_none())
      .map(|n| n.name.as_str())
      .collect()
  }

  /// Nodes without enabled incoming hops.
  pub fn sources(&self) -> Vec<&str> {
    self
      .nodes
      .iter()
      .filter(|n| self.input_hops(&n.name).next().is_none())
      .map(|n| n.name.as_str())
      .collect()
  }

  /// Checks structural invariants.
  ///
  /// # Errors
  ///
  /// Returns [`EngineError::Configuration`] for an empty or duplicate node
  /// name, a copy count of 0, more than one error hop on a node, a self-loop,
  /// two enabled hops between the same pair of nodes, or an unknown result
  /// subject. Returns [`EngineError::UnknownNode`] for a hop endpoint that is
  /// not a node.
  pub fn validate(&self) -> Result<()> {
    let mut names = HashSet::new();
    for node in &self.nodes {
      if node.name.is_empty() {
        return Err(EngineError::Configuration("node with empty name".to_string()));
      }
      if !names.insert(node.name.as_str()) {
        return Err(EngineError::Configuration(format!(
          "duplicate node name '{}'",
          node.name
        )));
      }
      if node.copies == 0 {
        return Err(EngineError::Configuration(format!(
          "node '{}' must run at least one copy",
          node.name
        )));
      }
    }

    let mut pairs = HashSet::new();
    let mut error_sources = HashSet::new();
    for hop in &self.hops {
      for end in [&hop.from, &hop.to] {
        if !names.contains(end.as_str()) {
          return Err(EngineError::UnknownNode(end.clone()));
        }
      }
      if !hop.enabled {
        continue;
      }
      if hop.from == hop.to {
        return Err(EngineError::Configuration(format!(
          "hop from '{}' to itself",
          hop.from
        )));
      }
      if !pairs.insert((hop.from.as_str(), hop.to.as_str())) {
        return Err(EngineError::Configuration(format!(
          "more than one hop from '{}' to '{}'",
          hop.from, hop.to
        )));
      }
      if hop.error && !error_sources.insert(hop.from.as_str()) {
        return Err(EngineError::Configuration(format!(
          "node '{}' has more than one error hop",
          hop.from
        )));
      }
    }

    if let Some(unknown) = self
      .result_subjects
      .names()
      .find(|name| !names.contains(name.as_str()))
    {
      return Err(EngineError::Configuration(format!(
        "result subject '{}' is not a node",
        unknown
      )));
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn chain() -> GraphDefinition {
    let mut graph = GraphDefinition::new("chain");
    graph.add_node(NodeDefinition::new("a", "dummy"));
    graph.add_node(NodeDefinition::new("b", "dummy"));
    graph.add_node(NodeDefinition::new("c", "dummy"));
    graph.add_hop(HopDefinition::new("a", "b"));
    graph.add_hop(HopDefinition::error("a", "c"));
    graph
  }

  #[test]
  fn test_hop_queries() {
    let graph = chain();
    assert!(graph.validate().is_ok());
    assert_eq!(graph.output_hops("a").count(), 1);
    assert_eq!(graph.error_hop("a").map(|h| h.to.as_str()), Some("c"));
    assert_eq!(graph.input_hops("c").count(), 1);
    assert_eq!(graph.sources(), vec!["a"]);
    assert_eq!(graph.sinks(), vec!["b", "c"]);
  }

  #[test]
  fn test_validate_rejects_structural_errors() {
    let mut duplicate = chain();
    duplicate.add_node(NodeDefinition::new("a", "dummy"));
    assert!(matches!(duplicate.validate(), Err(EngineError::Configuration(_))));

    let mut unknown = chain();
    unknown.add_hop(HopDefinition::new("a", "zzz"));
    assert!(matches!(unknown.validate(), Err(EngineError::UnknownNode(n)) if n == "zzz"));

    let mut two_errors = chain();
    two_errors.add_hop(HopDefinition::error("a", "b"));
    assert!(two_errors.validate().is_err());

    let mut self_loop = chain();
    self_loop.add_hop(HopDefinition::new("b", "b"));
    assert!(self_loop.validate().is_err());

    let mut no_copies = chain();
    no_copies.nodes[1].copies = 0;
    assert!(no_copies.validate().is_err());

    let mut subjects = chain();
    subjects.result_subjects.written = Some(vec!["nobody".to_string()]);
    assert!(subjects.validate().is_err());
  }

  #[test]
  fn test_json_defaults() {
    let graph = GraphDefinition::from_json(
      r#"{ "name": "g", "nodes": [{ "name": "a", "type": "dummy" }, { "name": "b", "type": "dummy" }],
           "hops": [{ "from": "a", "to": "b" }] }"#,
    )
    .unwrap();
    let a = graph.node("a").unwrap();
    assert_eq!(a.copies, 1);
    assert_eq!(a.distribution, DistributionMode::Distribute);
    assert_eq!(a.error_handling, ErrorHandling::default());
    assert!(graph.hops[0].enabled);
    assert!(!graph.hops[0].error);

    let again = GraphDefinition::from_json(&graph.to_json().unwrap()).unwrap();
    assert_eq!(again, graph);
  }
}
