//! # Injector Node
//!
//! Entry point for rows fed from outside the run through a
//! [`RowProducer`](crate::RowProducer). The node declares its schema from a
//! `fields` list in configuration and forwards every injected row with it.
//!
//! ```json
//! { "fields": [{ "name": "name", "type": "string" }] }
//! ```

use crate::context::NodeContext;
use crate::error::NodeError;
use crate::node::{Node, NodeFactory, Progress};
use crate::nodes::common::DeclaredFields;
use crate::schema::{RowSchema, SchemaError};
use async_trait::async_trait;

/// Type identifier of the injector.
pub const INJECTOR: &str = "injector";

/// Forwards injected rows under the declared schema.
#[derive(Debug, Default)]
pub struct InjectorNode;

#[async_trait]
impl Node for InjectorNode {
  async fn process_one_unit(&mut self, ctx: &mut NodeContext) -> Result<Progress, NodeError> {
    let Some((_, record)) = ctx.get_row().await? else {
      return Ok(Progress::Finished);
    };
    let schema = ctx.output_schema();
    ctx.put_row(&schema, record).await?;
    Ok(Progress::Continue)
  }
}

/// Factory of [`InjectorNode`].
#[derive(Debug, Default)]
pub struct InjectorFactory;

impl NodeFactory for InjectorFactory {
  fn type_id(&self) -> &str {
    INJECTOR
  }

  fn declare_output_schema(
    &self,
    _input: &RowSchema,
    config: &serde_json::Value,
  ) -> Result<RowSchema, SchemaError> {
    DeclaredFields::schema(config)
  }

  fn create(&self, config: &serde_json::Value) -> Result<Box<dyn Node>, NodeError> {
    DeclaredFields::schema(config)?;
    Ok(Box::new(InjectorNode))
  }
}
