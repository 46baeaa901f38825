//! Node types used by the unit tests.

use crate::context::NodeContext;
use crate::error::NodeError;
use crate::node::{FnNodeFactory, Node, NodeFactory, Progress};
use crate::nodes::DummyNode;
use crate::registry::NodeRegistry;
use crate::schema::{FieldDescriptor, MergeRule, RowSchema, SchemaError};
use crate::value::{Record, Value};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Uppercases the `name` field; rejects the value named by `fail_on`.
pub(crate) struct UppercaseNode {
  fail_on: Option<String>,
}

#[async_trait]
impl Node for UppercaseNode {
  async fn process_one_unit(&mut self, ctx: &mut NodeContext) -> Result<Progress, NodeError> {
    let Some((schema, mut record)) = ctx.get_row().await? else {
      return Ok(Progress::Finished);
    };
    let index = ctx.field_index("name")?;
    let rejected = matches!(
      record.get(index),
      Some(Value::String(s)) if self.fail_on.as_deref() == Some(s.as_str())
    );
    if rejected {
      return Err(
        NodeError::record(&schema, record, "name is not allowed")
          .with_field("name")
          .with_code("E42"),
      );
    }
    if let Some(Value::String(s)) = record.get_mut(index) {
      *s = s.to_uppercase();
    }
    let output = ctx.output_schema();
    ctx.put_row(&output, record).await?;
    Ok(Progress::Continue)
  }
}

pub(crate) struct UppercaseFactory;

impl NodeFactory for UppercaseFactory {
  fn type_id(&self) -> &str {
    "uppercase"
  }

  fn required_input_fields(&self, _config: &serde_json::Value) -> Vec<String> {
    vec!["name".to_string()]
  }

  fn create(&self, config: &serde_json::Value) -> Result<Box<dyn Node>, NodeError> {
    let fail_on = config
      .get("fail_on")
      .and_then(|v| v.as_str())
      .map(str::to_string);
    Ok(Box::new(UppercaseNode { fail_on }))
  }
}

/// Emits an increasing `n` forever.
pub(crate) struct EndlessNode {
  next: i64,
}

#[async_trait]
impl Node for EndlessNode {
  async fn process_one_unit(&mut self, ctx: &mut NodeContext) -> Result<Progress, NodeError> {
    let schema = ctx.output_schema();
    ctx
      .put_row(&schema, Record::from(vec![Value::Integer(self.next)]))
      .await?;
    self.next += 1;
    Ok(Progress::Continue)
  }
}

pub(crate) struct EndlessFactory;

impl NodeFactory for EndlessFactory {
  fn type_id(&self) -> &str {
    "endless"
  }

  fn declare_output_schema(&self, _input: &RowSchema, _config: &serde_json::Value) -> Result<RowSchema, SchemaError> {
    RowSchema::from_fields(vec![FieldDescriptor::integer("n")])
  }

  fn create(&self, _config: &serde_json::Value) -> Result<Box<dyn Node>, NodeError> {
    Ok(Box::new(EndlessNode { next: 0 }))
  }
}

/// Wraps a node and counts dispose calls.
pub(crate) struct TrackedNode {
  inner: Box<dyn Node>,
  fail_init: bool,
  disposed: Arc<AtomicUsize>,
}

#[async_trait]
impl Node for TrackedNode {
  async fn init(&mut self, ctx: &mut NodeContext) -> Result<(), NodeError> {
    if self.fail_init {
      return Err(NodeError::fatal("cannot connect"));
    }
    self.inner.init(ctx).await
  }

  async fn process_one_unit(&mut self, ctx: &mut NodeContext) -> Result<Progress, NodeError> {
    self.inner.process_one_unit(ctx).await
  }

  async fn dispose(&mut self, ctx: &mut NodeContext) {
    self.disposed.fetch_add(1, Ordering::SeqCst);
    self.inner.dispose(ctx).await;
  }
}

struct PanickingNode;

#[async_trait]
impl Node for PanickingNode {
  async fn process_one_unit(&mut self, _ctx: &mut NodeContext) -> Result<Progress, NodeError> {
    panic!("boom");
  }
}

/// Drains each input named in `sources`, one after the other.
pub(crate) struct SequentialNode {
  sources: Vec<String>,
  current: usize,
}

#[async_trait]
impl Node for SequentialNode {
  async fn process_one_unit(&mut self, ctx: &mut NodeContext) -> Result<Progress, NodeError> {
    let Some(source) = self.sources.get(self.current).cloned() else {
      return Ok(Progress::Finished);
    };
    match ctx.get_row_from(&source).await? {
      Some((schema, record)) => ctx.put_row(&schema, record).await?,
      None => self.current += 1,
    }
    Ok(Progress::Continue)
  }
}

pub(crate) struct SequentialFactory;

impl NodeFactory for SequentialFactory {
  fn type_id(&self) -> &str {
    "sequential"
  }

  fn merge_rule(&self, _config: &serde_json::Value) -> MergeRule {
    MergeRule::Identical
  }

  fn create(&self, config: &serde_json::Value) -> Result<Box<dyn Node>, NodeError> {
    let sources = config
      .get("sources")
      .and_then(|v| v.as_array())
      .map(|names| names.iter().filter_map(|n| n.as_str().map(str::to_string)).collect())
      .unwrap_or_default();
    Ok(Box::new(SequentialNode { sources, current: 0 }))
  }
}

/// Forwards rows with one value more than their schema has fields.
struct StrayValueNode;

#[async_trait]
impl Node for StrayValueNode {
  async fn process_one_unit(&mut self, ctx: &mut NodeContext) -> Result<Progress, NodeError> {
    let Some((schema, mut record)) = ctx.get_row().await? else {
      return Ok(Progress::Finished);
    };
    record.push(Value::Integer(0));
    ctx.put_row(&schema, record).await?;
    Ok(Progress::Continue)
  }
}

/// Built-ins plus the node types above, and `tracked` / `fail_init` dummies
/// counting their disposals in `disposed`.
pub(crate) fn registry(disposed: Arc<AtomicUsize>) -> NodeRegistry {
  let mut registry = NodeRegistry::with_builtins();
  registry.register(Arc::new(UppercaseFactory)).unwrap();
  registry.register(Arc::new(EndlessFactory)).unwrap();
  registry
    .register_fn("panicking", |_| Ok(Box::new(PanickingNode)))
    .unwrap();
  registry.register(Arc::new(SequentialFactory)).unwrap();
  registry
    .register_fn("stray_value", |_| Ok(Box::new(StrayValueNode)))
    .unwrap();
  for (type_id, fail_init) in [("tracked", false), ("fail_init", true)] {
    let disposed = Arc::clone(&disposed);
    registry
      .register(
        FnNodeFactory::new(type_id, move |_| {
          Ok(Box::new(TrackedNode {
            inner: Box::new(DummyNode),
            fail_init,
            disposed: Arc::clone(&disposed),
          }))
        })
        .shared(),
      )
      .unwrap();
  }
  registry
}

/// A `name` string schema.
pub(crate) fn names_schema() -> Arc<RowSchema> {
  Arc::new(RowSchema::from_fields(vec![FieldDescriptor::string("name")]).unwrap())
}

/// One-field records holding `names`.
pub(crate) fn name_records(names: &[&str]) -> Vec<Record> {
  names
    .iter()
    .map(|n| Record::from(vec![Value::from(*n)]))
    .collect()
}
