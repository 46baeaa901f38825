//! Topological ordering of a graph's enabled hops.

use crate::error::{EngineError, Result};
use crate::graph::definition::GraphDefinition;
use std::collections::{HashMap, VecDeque};

/// Orders the nodes of `graph` so that every enabled hop points forward.
///
/// Uses Kahn's algorithm. Ties are broken by definition order, so the result
/// is deterministic for a given definition.
///
/// # Errors
///
/// Returns [`EngineError::Cycle`] naming the nodes left on a cycle, or
/// [`EngineError::UnknownNode`] for a hop to an undefined node.
pub fn topological_sort(graph: &GraphDefinition) -> Result<Vec<String>> {
  let position: HashMap<&str, usize> = graph
    .nodes
    .iter()
    .enumerate()
    .map(|(i, n)| (n.name.as_str(), i))
    .collect();

  let mut in_degree = vec![0usize; graph.nodes.len()];
  let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); graph.nodes.len()];

  for hop in graph.enabled_hops() {
    let source = *position
      .get(hop.from.as_str())
      .ok_or_else(|| EngineError::UnknownNode(hop.from.clone()))?;
    let target = *position
      .get(hop.to.as_str())
      .ok_or_else(|| EngineError::UnknownNode(hop.to.clone()))?;
    adjacency[source].push(target);
    in_degree[target] += 1;
  }

  let mut queue: VecDeque<usize> = (0..graph.nodes.len()).filter(|&i| in_degree[i] == 0).collect();
  let mut order = Vec::with_capacity(graph.nodes.len());

  while let Some(index) = queue.pop_front() {
    order.push(index);
    let mut released = Vec::new();
    for &neighbor in &adjacency[index] {
      in_degree[neighbor] -= 1;
      if in_degree[neighbor] == 0 {
        released.push(neighbor);
      }
    }
    released.sort_unstable();
    queue.extend(released);
  }

  if order.len() != graph.nodes.len() {
    let remaining = (0..graph.nodes.len())
      .filter(|&i| in_degree[i] > 0)
      .map(|i| graph.nodes[i].name.clone())
      .collect();
    return Err(EngineError::Cycle(remaining));
  }

  Ok(order.into_iter().map(|i| graph.nodes[i].name.clone()).collect())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::graph::definition::{HopDefinition, NodeDefinition};

  fn graph(nodes: &[&str], hops: &[(&str, &str)]) -> GraphDefinition {
    let mut graph = GraphDefinition::new("g");
    for name in nodes {
      graph.add_node(NodeDefinition::new(*name, "dummy"));
    }
    for (from, to) in hops {
      graph.add_hop(HopDefinition::new(*from, *to));
    }
    graph
  }

  #[test]
  fn test_diamond_order_follows_definition_on_ties() {
    let g = graph(&["sink", "left", "right", "source"], &[
      ("source", "right"),
      ("source", "left"),
      ("left", "sink"),
      ("right", "sink"),
    ]);
    assert_eq!(topological_sort(&g).unwrap(), vec!["source", "left", "right", "sink"]);
  }

  #[test]
  fn test_disabled_hops_are_ignored() {
    let mut g = graph(&["a", "b"], &[("a", "b")]);
    g.add_hop(HopDefinition::new("b", "a").disabled());
    assert_eq!(topological_sort(&g).unwrap(), vec!["a", "b"]);
  }

  #[test]
  fn test_cycle_names_remaining_nodes() {
    let g = graph(&["start", "x", "y"], &[("start", "x"), ("x", "y"), ("y", "x")]);
    match topological_sort(&g) {
      Err(EngineError::Cycle(nodes)) => assert_eq!(nodes, vec!["x", "y"]),
      other => panic!("expected a cycle, got {:?}", other),
    }
  }
}
