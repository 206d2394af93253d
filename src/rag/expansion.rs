//! Bounded breadth-first expansion from seed chunks through persisted edges.

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::graph::{DiGraph, NodeIndex};
use tracing::debug;

use crate::db::GraphStore;
use crate::error::Result;
use crate::graph::DependencyType;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExpandedEdge {
    pub dependency_type: DependencyType,
    pub weight: f64,
}

/// Ephemeral weighted graph built for one retrieval call.
#[derive(Debug, Default)]
pub struct ExpandedGraph {
    pub graph: DiGraph<String, ExpandedEdge>,
    index: HashMap<String, NodeIndex>,
    seeds: Vec<NodeIndex>,
}

impl ExpandedGraph {
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn node_index(&self, node_id: &str) -> Option<NodeIndex> {
        self.index.get(node_id).copied()
    }

    /// Node ids in insertion (discovery) order.
    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.graph.node_indices().map(|i| self.graph[i].as_str())
    }

    pub fn seeds(&self) -> &[NodeIndex] {
        &self.seeds
    }

    pub fn is_seed(&self, node: NodeIndex) -> bool {
        self.seeds.contains(&node)
    }

    fn add_node(&mut self, node_id: &str) -> NodeIndex {
        let idx = self.graph.add_node(node_id.to_string());
        self.index.insert(node_id.to_string(), idx);
        idx
    }

    /// One edge per ordered pair; a heavier edge type replaces a lighter one.
    fn add_edge(&mut self, source: NodeIndex, target: NodeIndex, dependency_type: DependencyType) {
        let weight = dependency_type.traversal_weight();
        match self.graph.find_edge(source, target) {
            Some(existing) => {
                if self.graph[existing].weight < weight {
                    self.graph[existing] = ExpandedEdge { dependency_type, weight };
                }
            }
            None => {
                self.graph.add_edge(source, target, ExpandedEdge { dependency_type, weight });
            }
        }
    }
}

/// Expand `seeds` up to `max_hops` through the store's edges.
///
/// Each frontier node contributes at most `max_neighbors` edges (outgoing
/// first). Nodes enter the graph once, guarded by a single visited set, so
/// cyclic stores terminate. `max_hops == 0` yields the seeds alone.
pub fn expand<S: GraphStore + ?Sized>(
    store: &S,
    seeds: &[String],
    max_hops: usize,
    max_neighbors: usize,
) -> Result<ExpandedGraph> {
    let mut expanded = ExpandedGraph::default();
    let mut visited: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<(String, usize)> = VecDeque::new();

    for seed in seeds {
        if visited.insert(seed.clone()) {
            let idx = expanded.add_node(seed);
            expanded.seeds.push(idx);
            queue.push_back((seed.clone(), 0));
        }
    }

    while let Some((node_id, depth)) = queue.pop_front() {
        if depth >= max_hops {
            continue;
        }
        for edge in store.neighbors(&node_id, max_neighbors)? {
            let other = if edge.source_id == node_id {
                &edge.target_id
            } else {
                &edge.source_id
            };
            if visited.insert(other.clone()) {
                expanded.add_node(other);
                queue.push_back((other.clone(), depth + 1));
            }
            if let (Some(s), Some(t)) = (expanded.node_index(&edge.source_id), expanded.node_index(&edge.target_id)) {
                expanded.add_edge(s, t, edge.dependency_type);
            }
        }
    }

    debug!(
        "expanded {} seeds to {} nodes, {} edges",
        expanded.seeds.len(),
        expanded.node_count(),
        expanded.edge_count()
    );
    debug_assert_eq!(visited.len(), expanded.node_count());
    Ok(expanded)
}
