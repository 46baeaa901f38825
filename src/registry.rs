//! # Node Registry
//!
//! Maps node type identifiers to factories. Any node type can be added
//! without touching the engine: register its [`NodeFactory`] before
//! preparing a run.

use crate::error::{EngineError, NodeError, Result};
use crate::graph::NodeDefinition;
use crate::node::{FnNodeFactory, Node, NodeFactory};
use crate::nodes;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Type identifier to factory map.
#[derive(Clone, Default)]
pub struct NodeRegistry {
  factories: HashMap<String, Arc<dyn NodeFactory>>,
}

impl fmt::Debug for NodeRegistry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("NodeRegistry")
      .field("types", &self.type_ids())
      .finish()
  }
}

impl NodeRegistry {
  /// Creates an empty registry.
  pub fn new() -> Self {
    Self::default()
  }

  /// Creates a registry holding the built-in node types: `dummy`,
  /// `row_generator` and `injector`.
  pub fn with_builtins() -> Self {
    let mut registry = Self::new();
    for factory in nodes::builtins() {
      registry
        .factories
        .insert(factory.type_id().to_string(), factory);
    }
    registry
  }

  /// Registers a factory under its own type identifier.
  ///
  /// # Errors
  ///
  /// Returns [`EngineError::Configuration`] if the identifier is taken.
  pub fn register(&mut self, factory: Arc<dyn NodeFactory>) -> Result<()> {
    let type_id = factory.type_id().to_string();
    if self.factories.contains_key(&type_id) {
      return Err(EngineError::Configuration(format!(
        "node type '{}' is already registered",
        type_id
      )));
    }
    self.factories.insert(type_id, factory);
    Ok(())
  }

  /// Registers a pass-through-schema node type built by `create`.
  pub fn register_fn<F>(&mut self, type_id: impl Into<String>, create: F) -> Result<()>
  where
    F: Fn(&serde_json::Value) -> std::result::Result<Box<dyn Node>, NodeError> + Send + Sync + 'static,
  {
    self.register(FnNodeFactory::new(type_id, create).shared())
  }

  /// Factory registered under `type_id`.
  pub fn get(&self, type_id: &str) -> Option<Arc<dyn NodeFactory>> {
    self.factories.get(type_id).cloned()
  }

  /// Returns `true` if `type_id` is registered.
  pub fn contains(&self, type_id: &str) -> bool {
    self.factories.contains_key(type_id)
  }

  /// Factory for a node definition.
  ///
  /// # Errors
  ///
  /// Returns [`EngineError::UnknownNodeType`] if the node's type is not
  /// registered.
  pub fn resolve(&self, node: &NodeDefinition) -> Result<Arc<dyn NodeFactory>> {
    self
      .get(&node.type_id)
      .ok_or_else(|| EngineError::UnknownNodeType {
        node: node.name.clone(),
        type_id: node.type_id.clone(),
      })
  }

  /// Registered identifiers, sorted.
  pub fn type_ids(&self) -> Vec<&str> {
    let mut ids: Vec<&str> = self.factories.keys().map(String::as_str).collect();
    ids.sort_unstable();
    ids
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::nodes::DummyNode;

  #[test]
  fn test_builtins_are_registered() {
    let registry = NodeRegistry::with_builtins();
    assert_eq!(registry.type_ids(), vec!["dummy", "injector", "row_generator"]);
  }

  #[test]
  fn test_duplicate_registration_fails() {
    let mut registry = NodeRegistry::with_builtins();
    assert!(registry.register_fn("custom", |_| Ok(Box::new(DummyNode))).is_ok());
    assert!(registry.contains("custom"));
    assert!(matches!(
      registry.register_fn("dummy", |_| Ok(Box::new(DummyNode))),
      Err(EngineError::Configuration(_))
    ));
  }

  #[test]
  fn test_resolve_unknown_type() {
    let registry = NodeRegistry::new();
    let node = NodeDefinition::new("x", "missing");
    assert!(matches!(
      registry.resolve(&node),
      Err(EngineError::UnknownNodeType { node, type_id }) if node == "x" && type_id == "missing"
    ));
  }
}
