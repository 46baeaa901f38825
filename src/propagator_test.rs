//! # Schema Propagator Test Suite
//!
//! - **Chains**: declared schemas flow downstream unchanged through pass-through nodes
//! - **Merging**: several inputs merged per the node's rule
//! - **Error hops**: error schemas are the widened input
//! - **Failures**: cycles, unknown types, clashes
//! - **Determinism**: repeated passes produce identical serialized schemas

use crate::error::EngineError;
use crate::graph::{ErrorHandling, GraphBuilder, GraphDefinition, NodeDefinition};
use crate::propagator::SchemaPropagator;
use crate::registry::NodeRegistry;
use crate::schema::SchemaError;
use crate::test_nodes::registry;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;

fn generator(name: &str, fields: serde_json::Value) -> NodeDefinition {
  NodeDefinition::new(name, "row_generator").with_config(json!({ "fields": fields }))
}

fn names() -> serde_json::Value {
  json!([{ "name": "name", "type": "string" }])
}

fn test_registry() -> NodeRegistry {
  registry(Arc::new(AtomicUsize::new(0)))
}

#[test]
fn test_chain_passes_declared_schema_through() {
  let graph = GraphBuilder::new("chain")
    .node(generator("source", names()))
    .node(NodeDefinition::new("upper", "uppercase"))
    .node(NodeDefinition::new("sink", "dummy"))
    .hop("source", "upper")
    .hop("upper", "sink")
    .build()
    .unwrap();

  let registry = test_registry();
  let schemas = SchemaPropagator::new(&registry).propagate(&graph).unwrap();
  assert_eq!(schemas.order(), &["source", "upper", "sink"]);
  assert!(schemas.get("source").unwrap().input.is_empty());
  assert_eq!(schemas.output("sink").unwrap().field_names(), vec!["name"]);
  assert!(schemas.get("upper").unwrap().error.is_none());
}

#[test]
fn test_append_merge_of_two_sources() {
  let graph = GraphBuilder::new("merge")
    .node(generator("ids", json!([{ "name": "id", "type": "integer" }])))
    .node(generator("names", names()))
    .node(NodeDefinition::new("both", "dummy"))
    .hop("ids", "both")
    .hop("names", "both")
    .build()
    .unwrap();

  let registry = test_registry();
  let schemas = SchemaPropagator::new(&registry).propagate(&graph).unwrap();
  assert_eq!(schemas.output("both").unwrap().field_names(), vec!["id", "name"]);
}

#[test]
fn test_merge_clash_names_the_node() {
  let graph = GraphBuilder::new("clash")
    .node(generator("a", names()))
    .node(generator("b", names()))
    .node(NodeDefinition::new("both", "dummy"))
    .hop("a", "both")
    .hop("b", "both")
    .build()
    .unwrap();

  let registry = test_registry();
  match SchemaPropagator::new(&registry).propagate(&graph) {
    Err(EngineError::Schema { node, source }) => {
      assert_eq!(node, "both");
      assert_eq!(source, SchemaError::DuplicateField("name".to_string()));
    }
    other => panic!("expected a schema error, got {:?}", other),
  }

  let renaming = GraphBuilder::new("clash")
    .node(generator("a", names()))
    .node(generator("b", names()))
    .node(NodeDefinition::new("both", "dummy").with_config(json!({ "merge": "rename_duplicates" })))
    .hop("a", "both")
    .hop("b", "both")
    .build()
    .unwrap();
  let schemas = SchemaPropagator::new(&registry).propagate(&renaming).unwrap();
  assert_eq!(schemas.output("both").unwrap().field_names(), vec!["name", "name_1"]);
}

#[test]
fn test_error_schema_is_widened_input() {
  let graph = GraphBuilder::new("errors")
    .node(generator("source", names()))
    .node(NodeDefinition::new("upper", "uppercase"))
    .node(NodeDefinition::new("ok", "dummy"))
    .node(NodeDefinition::new("bad", "dummy"))
    .hop("source", "upper")
    .hop("upper", "ok")
    .error_hop("upper", "bad")
    .build()
    .unwrap();

  let registry = test_registry();
  let schemas = SchemaPropagator::new(&registry).propagate(&graph).unwrap();
  let error = schemas.get("upper").unwrap().error.clone().unwrap();
  assert_eq!(
    error.field_names(),
    vec!["name", "error_count", "error_description", "error_field", "error_code"]
  );
  assert_eq!(schemas.output("bad"), Some(&error));
  assert_eq!(schemas.output("ok").unwrap().field_names(), vec!["name"]);
}

#[test]
fn test_diagnostic_field_clash_is_rejected() {
  let graph = GraphBuilder::new("errors")
    .node(generator("source", json!([{ "name": "error_count", "type": "integer" }])))
    .node(NodeDefinition::new("upper", "dummy"))
    .node(NodeDefinition::new("bad", "dummy"))
    .hop("source", "upper")
    .error_hop("upper", "bad")
    .build()
    .unwrap();

  let registry = test_registry();
  assert!(matches!(
    SchemaPropagator::new(&registry).propagate(&graph),
    Err(EngineError::Schema { ref node, .. }) if node == "upper"
  ));

  let renamed = GraphBuilder::new("errors")
    .node(generator("source", json!([{ "name": "error_count", "type": "integer" }])))
    .node(NodeDefinition::new("upper", "dummy").with_error_handling(ErrorHandling {
      count_field: "failures".to_string(),
      code_field: String::new(),
      ..ErrorHandling::default()
    }))
    .node(NodeDefinition::new("bad", "dummy"))
    .hop("source", "upper")
    .error_hop("upper", "bad")
    .build()
    .unwrap();
  let schemas = SchemaPropagator::new(&registry).propagate(&renamed).unwrap();
  assert_eq!(
    schemas.output("bad").unwrap().field_names(),
    vec!["error_count", "failures", "error_description", "error_field"]
  );
}

#[test]
fn test_cycle_is_rejected() {
  let mut graph = GraphDefinition::new("loop");
  graph.add_node(NodeDefinition::new("a", "dummy"));
  graph.add_node(NodeDefinition::new("b", "dummy"));
  graph.add_hop(crate::graph::HopDefinition::new("a", "b"));
  graph.add_hop(crate::graph::HopDefinition::new("b", "a"));

  let registry = test_registry();
  assert!(matches!(
    SchemaPropagator::new(&registry).propagate(&graph),
    Err(EngineError::Cycle(_))
  ));
}

#[test]
fn test_unknown_type_is_rejected() {
  let graph = GraphBuilder::new("unknown")
    .node(NodeDefinition::new("x", "teleport"))
    .build()
    .unwrap();
  let registry = test_registry();
  assert!(matches!(
    SchemaPropagator::new(&registry).propagate(&graph),
    Err(EngineError::UnknownNodeType { .. })
  ));
}

#[test]
fn test_propagation_is_deterministic() {
  let graph = GraphBuilder::new("det")
    .node(generator("ids", json!([{ "name": "id", "type": "integer" }])))
    .node(generator("names", names()))
    .node(NodeDefinition::new("both", "dummy"))
    .node(NodeDefinition::new("upper", "uppercase"))
    .hop("ids", "both")
    .hop("names", "both")
    .hop("both", "upper")
    .build()
    .unwrap();

  let registry = test_registry();
  let serialize = || {
    let schemas = SchemaPropagator::new(&registry).propagate(&graph).unwrap();
    schemas
      .iter()
      .map(|(name, s)| (name.to_string(), serde_json::to_vec(&*s.output).unwrap()))
      .collect::<Vec<_>>()
  };
  let first = serialize();
  for _ in 0..5 {
    assert_eq!(serialize(), first);
  }
}
