//! Static graph definitions.
//!
//! A [`GraphDefinition`] is read-only for the engine: it is created by
//! configuration loading or the [`GraphBuilder`] and consumed by the schema
//! propagator and the orchestrator.

pub mod builder;
pub mod definition;
pub mod topology;

pub use builder::GraphBuilder;
pub use definition::{
  DistributionMode, ErrorHandling, GraphDefinition, HopDefinition, NodeDefinition, ResultSubjects,
};
pub use topology::topological_sort;
