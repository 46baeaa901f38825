//! # Dummy Node
//!
//! Passes every row through unchanged. With no output hop it acts as a sink
//! that counts and drops rows; with several inputs it reads them round-robin.
//!
//! Configuration (all optional):
//!
//! ```json
//! { "merge": "identical" }
//! ```

use crate::context::NodeContext;
use crate::error::NodeError;
use crate::node::{Node, NodeFactory, Progress};
use crate::nodes::common::{config_error, parse_config};
use crate::schema::MergeRule;
use async_trait::async_trait;
use serde::Deserialize;

/// Type identifier of the dummy node.
pub const DUMMY: &str = "dummy";

#[derive(Debug, Default, Deserialize)]
struct DummyConfig {
  #[serde(default)]
  merge: MergeRule,
}

/// Pass-through node.
#[derive(Debug, Default)]
pub struct DummyNode;

#[async_trait]
impl Node for DummyNode {
  async fn process_one_unit(&mut self, ctx: &mut NodeContext) -> Result<Progress, NodeError> {
    match ctx.get_row().await? {
      Some((schema, record)) => {
        ctx.put_row(&schema, record).await?;
        Ok(Progress::Continue)
      }
      None => Ok(Progress::Finished),
    }
  }
}

/// Factory of [`DummyNode`].
#[derive(Debug, Default)]
pub struct DummyFactory;

impl NodeFactory for DummyFactory {
  fn type_id(&self) -> &str {
    DUMMY
  }

  fn merge_rule(&self, config: &serde_json::Value) -> MergeRule {
    parse_config::<DummyConfig>(config)
      .map(|c| c.merge)
      .unwrap_or_default()
  }

  fn create(&self, config: &serde_json::Value) -> Result<Box<dyn Node>, NodeError> {
    parse_config::<DummyConfig>(config).map_err(|e| config_error(DUMMY, e))?;
    Ok(Box::new(DummyNode))
  }
}
