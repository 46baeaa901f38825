//! # HopWeave
//!
//! A row-oriented dataflow execution engine in pure Rust.
//!
//! A graph of processing nodes is connected by directed hops. Every node copy
//! runs on its own Tokio task and exchanges records with its neighbours
//! through bounded, schema-tagged Row Sets. Records a node cannot process can
//! be diverted to an error hop, annotated with diagnostic fields, without
//! stopping the run.
//!
//! ## Key Features
//!
//! - **Static schemas**: every node's input and output schema is computed
//!   before the run and checked for duplicates
//! - **Copies**: run N parallel copies of a node, with Distribute or Copy
//!   routing over the copies downstream
//! - **Backpressure**: bounded Row Sets suspend fast producers
//! - **Error hops**: per-record diversion with rejection thresholds
//! - **Cooperative stop**: `stop_all` drains every executor promptly
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hopweave::{ExecutionConfig, GraphBuilder, NodeDefinition, NodeRegistry, Orchestrator};
//! use serde_json::json;
//!
//! # async fn run() -> hopweave::Result<()> {
//! let graph = GraphBuilder::new("hello")
//!   .node(NodeDefinition::new("source", "row_generator").with_config(json!({
//!     "fields": [{ "name": "name", "type": "string" }],
//!     "rows": [["ann"], ["bob"]]
//!   })))
//!   .node(NodeDefinition::new("sink", "dummy"))
//!   .hop("source", "sink")
//!   .build()?;
//!
//! let mut orchestrator = Orchestrator::new(graph, NodeRegistry::with_builtins());
//! let result = orchestrator.execute(ExecutionConfig::default()).await?;
//! assert_eq!(result.lines_written, 2);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

/// Run configuration, log levels and variable substitution.
pub mod config;
/// The runtime view a node copy has of the engine.
pub mod context;
/// Engine, schema and node error types.
pub mod error;
/// Diversion of failed records to the error hop.
pub mod error_channel;
/// The per-copy executor state machine.
pub mod executor;
/// Graph definitions, validation and topological ordering.
pub mod graph;
/// Row listeners for observing a node copy's traffic.
pub mod listener;
/// Log channels and per-node log handles.
pub mod logging;
/// Metric snapshots and their aggregation.
pub mod metrics;
/// The node contract.
pub mod node;
/// Built-in node types.
pub mod nodes;
/// Run preparation, execution and result aggregation.
pub mod orchestrator;
/// Static schema propagation over a graph.
pub mod propagator;
/// Registry of node types.
pub mod registry;
/// Run results and per-copy counters.
pub mod result;
/// Routing of emitted records over output Row Sets.
pub mod router;
/// Bounded queues between node copies.
pub mod row_set;
/// Row schemas and field descriptors.
pub mod schema;
/// The run-wide stop signal.
pub mod signal;
/// Field values and records.
pub mod value;

pub use config::{ExecutionConfig, LogLevel, Variables};
pub use context::NodeContext;
pub use error::{Diagnostic, EngineError, NodeError, RecordFailure, Result};
pub use executor::ExecutorState;
pub use graph::{
  DistributionMode, ErrorHandling, GraphBuilder, GraphDefinition, HopDefinition, NodeDefinition,
  ResultSubjects, topological_sort,
};
pub use listener::{RowCollector, RowListener};
pub use logging::{LogChannel, LogHandle, MemoryLogChannel, TracingLogChannel, init_tracing};
pub use metrics::{MetricsSnapshot, MetricsSummary, SnapshotType};
pub use node::{FnNodeFactory, Node, NodeFactory, Progress};
pub use orchestrator::{Orchestrator, RowProducer, StopHandle};
pub use propagator::{NodeSchemas, PropagatedSchemas, SchemaPropagator};
pub use registry::NodeRegistry;
pub use result::{NodeCounters, NodeFailure, NodeStatus, RunResult, StopReason};
pub use row_set::{Endpoint, RowSet};
pub use schema::{FieldDescriptor, MergeRule, RowSchema, SchemaError};
pub use value::{Record, Value, ValueType};

#[cfg(test)]
mod test_nodes;

#[cfg(test)]
mod propagator_test;
#[cfg(test)]
mod router_test;
