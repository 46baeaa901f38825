//! # Schema Propagator
//!
//! Computes every node's input, output and error schema before a run, by
//! walking the enabled hops in topological order. For each node the upstream
//! schemas are merged per the node type's [`MergeRule`](crate::MergeRule) and
//! handed to its [`declare_output_schema`](crate::NodeFactory::declare_output_schema)
//! hook.
//!
//! The pass is pure: it never touches runtime state, so it can be used for
//! validation or previews outside of a run.

use crate::error::{EngineError, Result};
use crate::error_channel::widen;
use crate::graph::{GraphDefinition, topological_sort};
use crate::registry::NodeRegistry;
use crate::schema::{RowSchema, SchemaError};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Schemas computed for one node.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeSchemas {
  /// Merged schema of every incoming hop; empty for source nodes.
  pub input: Arc<RowSchema>,
  /// Schema the node emits on its success hops.
  pub output: Arc<RowSchema>,
  /// Schema of the node's error hop, if it has one.
  pub error: Option<Arc<RowSchema>>,
}

/// Schemas of every node of a graph.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PropagatedSchemas {
  order: Vec<String>,
  nodes: BTreeMap<String, NodeSchemas>,
}

impl PropagatedSchemas {
  /// Schemas of `node`.
  pub fn get(&self, node: &str) -> Option<&NodeSchemas> {
    self.nodes.get(node)
  }

  /// Output schema of `node`.
  pub fn output(&self, node: &str) -> Option<&Arc<RowSchema>> {
    self.nodes.get(node).map(|s| &s.output)
  }

  /// Node names in the order they were computed.
  pub fn order(&self) -> &[String] {
    &self.order
  }

  /// Nodes and their schemas, in computation order.
  pub fn iter(&self) -> impl Iterator<Item = (&str, &NodeSchemas)> {
    self
      .order
      .iter()
      .filter_map(|name| self.nodes.get(name).map(|s| (name.as_str(), s)))
  }
}

/// Static schema computation over a graph.
#[derive(Debug, Clone, Copy)]
pub struct SchemaPropagator<'a> {
  registry: &'a NodeRegistry,
}

impl<'a> SchemaPropagator<'a> {
  /// Creates a propagator resolving node types through `registry`.
  pub fn new(registry: &'a NodeRegistry) -> Self {
    Self { registry }
  }

  /// Computes the schemas of every node of `graph`.
  ///
  /// # Errors
  ///
  /// - Any validation error of the graph.
  /// - [`EngineError::Cycle`] if the enabled hops form a cycle.
  /// - [`EngineError::UnknownNodeType`] for an unregistered node type.
  /// - [`EngineError::Schema`] for a merge conflict, a failing output
  ///   declaration, a duplicate output field or a clashing diagnostic field.
  pub fn propagate(&self, graph: &GraphDefinition) -> Result<PropagatedSchemas> {
    graph.validate()?;
    let order = topological_sort(graph)?;
    let mut nodes: BTreeMap<String, NodeSchemas> = BTreeMap::new();

    for name in &order {
      let definition = graph
        .node(name)
        .ok_or_else(|| EngineError::UnknownNode(name.clone()))?;
      let factory = self.registry.resolve(definition)?;
      let at_node = |e: SchemaError| EngineError::schema(name.clone(), e);

      let mut inputs = Vec::new();
      for hop in graph.input_hops(name) {
        let upstream = nodes
          .get(&hop.from)
          .ok_or_else(|| EngineError::UnknownNode(hop.from.clone()))?;
        let schema = if hop.error {
          upstream.error.clone().ok_or_else(|| {
            EngineError::Configuration(format!("node '{}' has no error schema", hop.from))
          })?
        } else {
          Arc::clone(&upstream.output)
        };
        inputs.push((hop.from.clone(), schema));
      }

      let merged = RowSchema::merge(factory.merge_rule(&definition.config), &inputs).map_err(at_node)?;
      let output = factory
        .declare_output_schema(&merged, &definition.config)
        .map_err(at_node)?;
      if let Some(duplicate) = output.find_duplicate() {
        return Err(at_node(SchemaError::DuplicateField(duplicate.to_string())));
      }

      let error = match graph.error_hop(name) {
        Some(_) => {
          let base = if inputs.is_empty() { &output } else { &merged };
          Some(Arc::new(widen(base, &definition.error_handling).map_err(at_node)?))
        }
        None => None,
      };

      nodes.insert(
        name.clone(),
        NodeSchemas {
          input: Arc::new(merged),
          output: Arc::new(output),
          error,
        },
      );
    }

    Ok(PropagatedSchemas { order, nodes })
  }
}
