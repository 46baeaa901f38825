//! # GraphBuilder
//!
//! Fluent construction of a validated [`GraphDefinition`].

use crate::error::Result;
use crate::graph::definition::{GraphDefinition, HopDefinition, NodeDefinition, ResultSubjects};

/// Builder for [`GraphDefinition`]s.
///
/// # Example
///
/// ```rust
/// use hopweave::{GraphBuilder, NodeDefinition};
///
/// let graph = GraphBuilder::new("chain")
///   .node(NodeDefinition::new("source", "row_generator"))
///   .node(NodeDefinition::new("sink", "dummy"))
///   .hop("source", "sink")
///   .build()
///   .unwrap();
/// assert_eq!(graph.sinks(), vec!["sink"]);
/// ```
#[derive(Debug, Default)]
pub struct GraphBuilder {
  graph: GraphDefinition,
}

impl GraphBuilder {
  /// Creates a builder for a graph called `name`.
  ///
  /// # Arguments
  ///
  /// * `name` - The name for the graph being built
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      graph: GraphDefinition::new(name),
    }
  }

  /// Adds a node.
  pub fn node(mut self, node: NodeDefinition) -> Self {
    self.graph.add_node(node);
    self
  }

  /// Adds an enabled success hop.
  pub fn hop(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
    self.graph.add_hop(HopDefinition::new(from, to));
    self
  }

  /// Adds the error hop of `from`.
  pub fn error_hop(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
    self.graph.add_hop(HopDefinition::error(from, to));
    self
  }

  /// Adds a disabled hop, kept in the definition but ignored at run time.
  pub fn disabled_hop(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
    self.graph.add_hop(HopDefinition::new(from, to).disabled());
    self
  }

  /// Sets the result subjects.
  pub fn result_subjects(mut self, subjects: ResultSubjects) -> Self {
    self.graph.result_subjects = subjects;
    self
  }

  /// Validates and returns the graph.
  ///
  /// # Errors
  ///
  /// Any error from [`GraphDefinition::validate`].
  pub fn build(self) -> Result<GraphDefinition> {
    self.graph.validate()?;
    Ok(self.graph)
  }
}
