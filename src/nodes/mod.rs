//! # Built-in Node Types
//!
//! Node types every registry created with
//! [`NodeRegistry::with_builtins`](crate::NodeRegistry::with_builtins) knows:
//!
//! - **`dummy`**: pass-through, or a counting sink without output hops
//! - **`row_generator`**: source of static rows from configuration
//! - **`injector`**: entry point for rows fed by a row producer

pub mod common;
pub mod dummy_node;
pub mod injector_node;
pub mod row_generator_node;

pub use dummy_node::{DUMMY, DummyFactory, DummyNode};
pub use injector_node::{INJECTOR, InjectorFactory, InjectorNode};
pub use row_generator_node::{ROW_GENERATOR, RowGeneratorFactory, RowGeneratorNode};

use crate::node::NodeFactory;
use std::sync::Arc;

/// Factories of every built-in node type.
pub fn builtins() -> Vec<Arc<dyn NodeFactory>> {
  vec![
    Arc::new(DummyFactory),
    Arc::new(RowGeneratorFactory),
    Arc::new(InjectorFactory),
  ]
}
