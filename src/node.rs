//! # Node Contract
//!
//! The engine runs user-supplied node implementations without knowing what
//! they do. A node type is made of two parts:
//!
//! - A [`NodeFactory`], registered once under a type identifier. It answers
//!   the static questions asked before a run (output schema, required input
//!   fields, merge rule) and creates one [`Node`] per copy.
//! - A [`Node`], owned by exactly one executor copy. Its hooks are called as
//!   `init` once, `process_one_unit` repeatedly, `dispose` exactly once.
//!
//! Nodes read and emit records through the [`NodeContext`] they are handed:
//! [`NodeContext::get_row`], [`NodeContext::put_row`] and
//! [`NodeContext::put_error`].
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use hopweave::{Node, NodeContext, NodeError, Progress, Value};
//!
//! struct Uppercase;
//!
//! #[async_trait]
//! impl Node for Uppercase {
//!   async fn process_one_unit(&mut self, ctx: &mut NodeContext) -> Result<Progress, NodeError> {
//!     let Some((_, mut record)) = ctx.get_row().await? else {
//!       return Ok(Progress::Finished);
//!     };
//!     let index = ctx.field_index("name")?;
//!     if let Some(Value::String(s)) = record.get_mut(index) {
//!       *s = s.to_uppercase();
//!     }
//!     let schema = ctx.output_schema();
//!     ctx.put_row(&schema, record).await?;
//!     Ok(Progress::Continue)
//!   }
//! }
//! ```

use crate::context::NodeContext;
use crate::error::NodeError;
use crate::schema::{MergeRule, RowSchema, SchemaError};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Outcome of one unit of work.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Progress {
  /// Call `process_one_unit` again.
  Continue,
  /// No more output; the executor finishes the node.
  Finished,
}

/// A running node implementation, owned by one executor copy.
#[async_trait]
pub trait Node: Send {
  /// One-time setup. An error aborts run preparation.
  async fn init(&mut self, ctx: &mut NodeContext) -> Result<(), NodeError> {
    let _ = ctx;
    Ok(())
  }

  /// Processes one unit of work, usually one input record.
  ///
  /// # Returns
  ///
  /// [`Progress::Finished`] once the node has no more output. A
  /// [`NodeError::Record`] is diverted to the error hop when one is
  /// configured; every other error is fatal for the run.
  async fn process_one_unit(&mut self, ctx: &mut NodeContext) -> Result<Progress, NodeError>;

  /// Releases resources. Called exactly once, whatever happened before.
  async fn dispose(&mut self, ctx: &mut NodeContext) {
    let _ = ctx;
  }
}

/// Creates nodes of one type and describes them statically.
pub trait NodeFactory: Send + Sync {
  /// Identifier the type is registered under.
  fn type_id(&self) -> &str;

  /// Computes the output schema from the merged input schema.
  ///
  /// Must be pure: it is called by the schema propagator outside of any run
  /// and again by every copy on its first row. The default passes the input
  /// through unchanged.
  fn declare_output_schema(
    &self,
    input: &RowSchema,
    config: &serde_json::Value,
  ) -> Result<RowSchema, SchemaError> {
    let _ = config;
    Ok(input.clone())
  }

  /// Input fields that must exist in the first arriving schema.
  fn required_input_fields(&self, config: &serde_json::Value) -> Vec<String> {
    let _ = config;
    Vec::new()
  }

  /// How schemas arriving on several hops are combined.
  fn merge_rule(&self, config: &serde_json::Value) -> MergeRule {
    let _ = config;
    MergeRule::Append
  }

  /// Creates the implementation for one copy.
  fn create(&self, config: &serde_json::Value) -> Result<Box<dyn Node>, NodeError>;
}

type CreateFn = dyn Fn(&serde_json::Value) -> Result<Box<dyn Node>, NodeError> + Send + Sync;

/// A pass-through-schema factory backed by a closure.
pub struct FnNodeFactory {
  type_id: String,
  create: Box<CreateFn>,
}

impl FnNodeFactory {
  /// Creates a factory for `type_id` that builds nodes with `create`.
  pub fn new<F>(type_id: impl Into<String>, create: F) -> Self
  where
    F: Fn(&serde_json::Value) -> Result<Box<dyn Node>, NodeError> + Send + Sync + 'static,
  {
    Self {
      type_id: type_id.into(),
      create: Box::new(create),
    }
  }

  /// Wraps the factory in an [`Arc`] for registration.
  pub fn shared(self) -> Arc<dyn NodeFactory> {
    Arc::new(self)
  }
}

impl fmt::Debug for FnNodeFactory {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("FnNodeFactory")
      .field("type_id", &self.type_id)
      .finish()
  }
}

impl NodeFactory for FnNodeFactory {
  fn type_id(&self) -> &str {
    &self.type_id
  }

  fn create(&self, config: &serde_json::Value) -> Result<Box<dyn Node>, NodeError> {
    (self.create)(config)
  }
}
