//! End-to-end runs through the public API only.

use async_trait::async_trait;
use hopweave::{
  Diagnostic, ExecutionConfig, FieldDescriptor, GraphBuilder, GraphDefinition, Node, NodeContext, NodeDefinition,
  NodeError, NodeFactory, NodeRegistry, Orchestrator, Progress, RowCollector, RowSchema, SchemaError, StopReason,
  Value,
};
use serde_json::json;
use std::sync::Arc;

/// Uppercases `name`; rows named `bob` are sent to the error hop directly.
struct Uppercase;

#[async_trait]
impl Node for Uppercase {
  async fn process_one_unit(&mut self, ctx: &mut NodeContext) -> Result<Progress, NodeError> {
    let Some((schema, mut record)) = ctx.get_row().await? else {
      return Ok(Progress::Finished);
    };
    let index = ctx.field_index("name")?;
    if record.get(index) == Some(&Value::from("bob")) && ctx.has_error_hop() {
      let diagnostic = Diagnostic::new("bob is not welcome").with_field("name");
      ctx.put_error(&schema, record, diagnostic).await?;
      return Ok(Progress::Continue);
    }
    if let Some(Value::String(s)) = record.get_mut(index) {
      *s = s.to_uppercase();
    }
    let output = ctx.output_schema();
    ctx.put_row(&output, record).await?;
    Ok(Progress::Continue)
  }
}

/// Appends a `length` integer field holding the length of `name`.
struct NameLength;

#[async_trait]
impl Node for NameLength {
  async fn process_one_unit(&mut self, ctx: &mut NodeContext) -> Result<Progress, NodeError> {
    let Some((_, mut record)) = ctx.get_row().await? else {
      return Ok(Progress::Finished);
    };
    let length = record
      .get(ctx.field_index("name")?)
      .and_then(Value::as_str)
      .map_or(Value::Null, |s| Value::Integer(s.chars().count() as i64));
    record.push(length);
    let output = ctx.output_schema();
    ctx.put_row(&output, record).await?;
    Ok(Progress::Continue)
  }
}

struct NameLengthFactory;

impl NodeFactory for NameLengthFactory {
  fn type_id(&self) -> &str {
    "name_length"
  }

  fn declare_output_schema(&self, input: &RowSchema, _config: &serde_json::Value) -> Result<RowSchema, SchemaError> {
    let mut output = input.clone();
    output.add_field(FieldDescriptor::integer("length").with_origin("name_length"))?;
    Ok(output)
  }

  fn required_input_fields(&self, _config: &serde_json::Value) -> Vec<String> {
    vec!["name".to_string()]
  }

  fn create(&self, _config: &serde_json::Value) -> Result<Box<dyn Node>, NodeError> {
    Ok(Box::new(NameLength))
  }
}

fn registry() -> NodeRegistry {
  let mut registry = NodeRegistry::with_builtins();
  registry
    .register_fn("uppercase", |_| Ok(Box::new(Uppercase)))
    .unwrap();
  registry.register(Arc::new(NameLengthFactory)).unwrap();
  registry
}

fn source() -> NodeDefinition {
  NodeDefinition::new("Source", "row_generator").with_config(json!({
    "fields": [{ "name": "name", "type": "string" }],
    "rows": [["ann"], ["bob"]]
  }))
}

fn first_values(collector: &RowCollector) -> Vec<Value> {
  collector
    .rows()
    .into_iter()
    .filter_map(|r| r.get(0).cloned())
    .collect()
}

#[tokio::test]
async fn uppercase_chain_writes_every_row() {
  let graph = GraphBuilder::new("uppercase")
    .node(source())
    .node(NodeDefinition::new("Uppercase", "uppercase"))
    .node(NodeDefinition::new("Sink", "dummy"))
    .hop("Source", "Uppercase")
    .hop("Uppercase", "Sink")
    .build()
    .unwrap();

  let sink = Arc::new(RowCollector::new());
  let mut orchestrator = Orchestrator::new(graph, registry());
  orchestrator.prepare(ExecutionConfig::default()).await.unwrap();
  orchestrator.add_row_listener("Sink", 0, sink.clone()).unwrap();
  orchestrator.start().unwrap();
  let result = orchestrator.wait_until_finished().await.unwrap();

  assert_eq!(result.errors, 0);
  assert_eq!(result.lines_written, 2);
  assert_eq!(result.stop_reason, StopReason::Completed);
  assert_eq!(first_values(&sink), vec![Value::from("ANN"), Value::from("BOB")]);
}

#[tokio::test]
async fn failing_row_goes_to_error_hop() {
  let graph = GraphBuilder::new("uppercase")
    .node(source())
    .node(NodeDefinition::new("Uppercase", "uppercase"))
    .node(NodeDefinition::new("Sink", "dummy"))
    .node(NodeDefinition::new("Rejects", "dummy"))
    .hop("Source", "Uppercase")
    .hop("Uppercase", "Sink")
    .error_hop("Uppercase", "Rejects")
    .build()
    .unwrap();

  let sink = Arc::new(RowCollector::new());
  let rejects = Arc::new(RowCollector::new());
  let mut orchestrator = Orchestrator::new(graph, registry());
  orchestrator.prepare(ExecutionConfig::default()).await.unwrap();
  orchestrator.add_row_listener("Sink", 0, sink.clone()).unwrap();
  orchestrator.add_row_listener("Rejects", 0, rejects.clone()).unwrap();
  orchestrator.start().unwrap();
  let result = orchestrator.wait_until_finished().await.unwrap();

  assert_eq!(result.errors, 0);
  assert_eq!(result.lines_rejected, 1);
  assert_eq!(first_values(&sink), vec![Value::from("ANN")]);

  let rejected = rejects.rows();
  assert_eq!(rejected.len(), 1);
  let schema = rejects.schema().unwrap();
  assert_eq!(schema.value(&rejected[0], "name"), Some(&Value::from("bob")));
  assert_eq!(schema.value(&rejected[0], "error_count"), Some(&Value::Integer(1)));
  assert_eq!(
    schema.value(&rejected[0], "error_description"),
    Some(&Value::from("bob is not welcome"))
  );
  assert_eq!(schema.value(&rejected[0], "error_field"), Some(&Value::from("name")));
  assert_eq!(schema.value(&rejected[0], "error_code"), Some(&Value::Null));
}

#[tokio::test]
async fn graph_loaded_from_json() {
  let graph = GraphDefinition::from_json(
    r#"{
      "name": "from-json",
      "nodes": [
        {
          "name": "people",
          "type": "row_generator",
          "config": {
            "fields": [{ "name": "name", "type": "string" }],
            "rows": [["ann"], { "name": "${GUEST}" }],
            "limit": 2
          }
        },
        { "name": "measure", "type": "name_length", "copies": 2 },
        { "name": "out", "type": "dummy" }
      ],
      "hops": [
        { "from": "people", "to": "measure" },
        { "from": "measure", "to": "out" },
        { "from": "people", "to": "out", "enabled": false }
      ]
    }"#,
  )
  .unwrap();

  let out = Arc::new(RowCollector::new());
  let mut orchestrator = Orchestrator::new(graph, registry());
  orchestrator
    .prepare(ExecutionConfig::default().with_variable("GUEST", "maximilian"))
    .await
    .unwrap();

  let schema = orchestrator.output_schema("out").unwrap();
  assert_eq!(schema.field_names(), vec!["name", "length"]);
  assert_eq!(schema.fields()[1].origin.as_deref(), Some("name_length"));

  orchestrator.add_row_listener("out", 0, out.clone()).unwrap();
  orchestrator.start().unwrap();
  let result = orchestrator.wait_until_finished().await.unwrap();

  assert!(result.is_success());
  assert_eq!(result.lines_written, 4);
  let mut lengths: Vec<i64> = out
    .rows()
    .iter()
    .filter_map(|r| r.get(1).and_then(Value::as_integer))
    .collect();
  lengths.sort_unstable();
  assert_eq!(lengths, vec![3, 3, 10, 10]);
}

#[tokio::test]
async fn unknown_node_type_fails_preparation() {
  let graph = GraphBuilder::new("broken")
    .node(NodeDefinition::new("x", "no_such_type"))
    .build()
    .unwrap();
  let mut orchestrator = Orchestrator::new(graph, registry());
  assert!(orchestrator.execute(ExecutionConfig::default()).await.is_err());
  assert!(orchestrator.result().is_none());
}
