//! Graph- and node-level metrics.
//!
//! All traversals are iterative with explicit stacks so deep or cyclic graphs
//! cannot overflow the call stack.

use std::collections::HashMap;

use petgraph::algo::connected_components;
use petgraph::graph::DiGraph;

use super::types::{DependencyEdge, NodeMetrics};

/// Successor lists by node position, deduplicated, in edge order.
pub(crate) fn adjacency(
    node_count: usize,
    edges: &[DependencyEdge],
    index: &HashMap<String, usize>,
) -> Vec<Vec<usize>> {
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); node_count];
    for edge in edges {
        let (Some(&s), Some(&t)) = (index.get(&edge.source_id), index.get(&edge.target_id)) else {
            continue;
        };
        if !adjacency[s].contains(&t) {
            adjacency[s].push(t);
        }
    }
    adjacency
}

/// `edges / (n * (n - 1))`; zero below two nodes.
pub fn coupling(node_count: usize, edge_count: usize) -> f64 {
    if node_count < 2 {
        return 0.0;
    }
    edge_count as f64 / (node_count as f64 * (node_count as f64 - 1.0))
}

/// Inverse of the number of weakly connected components.
pub fn cohesion(adjacency: &[Vec<usize>]) -> f64 {
    if adjacency.is_empty() {
        return 0.0;
    }
    let mut graph: DiGraph<(), ()> = DiGraph::with_capacity(adjacency.len(), 0);
    let ids: Vec<_> = (0..adjacency.len()).map(|_| graph.add_node(())).collect();
    for (source, targets) in adjacency.iter().enumerate() {
        for &target in targets {
            graph.add_edge(ids[source], ids[target], ());
        }
    }
    1.0 / connected_components(&graph) as f64
}

#[derive(Clone, Copy, PartialEq)]
enum Visit {
    New,
    OnStack,
    Done,
}

/// Longest directed path, in edges.
///
/// Memoised DFS; a successor that is already on the active stack contributes
/// depth zero, so cycles terminate instead of recursing forever.
pub fn dependency_depth(adjacency: &[Vec<usize>]) -> usize {
    let n = adjacency.len();
    let mut state = vec![Visit::New; n];
    let mut depth = vec![0usize; n];
    let mut best = vec![0usize; n];
    let mut stack: Vec<(usize, usize)> = Vec::new();

    for start in 0..n {
        if state[start] != Visit::New {
            continue;
        }
        state[start] = Visit::OnStack;
        stack.push((start, 0));

        while let Some(top) = stack.last_mut() {
            let (v, pos) = *top;
            if pos < adjacency[v].len() {
                top.1 += 1;
                let w = adjacency[v][pos];
                match state[w] {
                    Visit::OnStack => best[v] = best[v].max(1),
                    Visit::Done => best[v] = best[v].max(1 + depth[w]),
                    Visit::New => {
                        state[w] = Visit::OnStack;
                        stack.push((w, 0));
                    }
                }
            } else {
                depth[v] = best[v];
                state[v] = Visit::Done;
                stack.pop();
                if let Some(&(parent, _)) = stack.last() {
                    best[parent] = best[parent].max(1 + depth[v]);
                }
            }
        }
    }

    depth.into_iter().max().unwrap_or(0)
}

/// Cycles found by DFS over the active path.
///
/// Each back edge to a node on the stack emits the stack slice from that node
/// to the current one. Nodes are visited once globally, so this is not a
/// minimal cycle basis and overlapping cycles may be reported.
pub fn find_cycles(adjacency: &[Vec<usize>]) -> Vec<Vec<usize>> {
    let n = adjacency.len();
    let mut state = vec![Visit::New; n];
    let mut path: Vec<usize> = Vec::new();
    let mut stack: Vec<(usize, usize)> = Vec::new();
    let mut cycles = Vec::new();

    for start in 0..n {
        if state[start] != Visit::New {
            continue;
        }
        state[start] = Visit::OnStack;
        stack.push((start, 0));
        path.push(start);

        while let Some(top) = stack.last_mut() {
            let (v, pos) = *top;
            if pos < adjacency[v].len() {
                top.1 += 1;
                let w = adjacency[v][pos];
                match state[w] {
                    Visit::OnStack => {
                        if let Some(at) = path.iter().position(|&p| p == w) {
                            cycles.push(path[at..].to_vec());
                        }
                    }
                    Visit::Done => {}
                    Visit::New => {
                        state[w] = Visit::OnStack;
                        stack.push((w, 0));
                        path.push(w);
                    }
                }
            } else {
                state[v] = Visit::Done;
                stack.pop();
                path.pop();
            }
        }
    }

    cycles
}

pub fn node_metrics(fan_in: usize, fan_out: usize, is_interface: bool) -> NodeMetrics {
    let total = fan_in + fan_out;
    let instability = if total == 0 {
        0.0
    } else {
        fan_out as f64 / total as f64
    };
    let abstractness = if is_interface { 1.0 } else { 0.0 };
    NodeMetrics {
        fan_in,
        fan_out,
        instability,
        abstractness,
        distance_from_main_sequence: (abstractness + instability - 1.0).abs(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coupling() {
        assert_eq!(coupling(0, 0), 0.0);
        assert_eq!(coupling(1, 0), 0.0);
        assert_eq!(coupling(3, 0), 0.0);
        assert!((coupling(3, 3) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_cohesion_counts_weak_components() {
        assert_eq!(cohesion(&[]), 0.0);
        assert!((cohesion(&[vec![], vec![], vec![]]) - 1.0 / 3.0).abs() < 1e-12);
        // 0 -> 1, 2 <- 1: one weak component despite direction
        assert_eq!(cohesion(&[vec![1], vec![], vec![1]]), 1.0);
    }

    #[test]
    fn test_depth_chain_and_cycle() {
        assert_eq!(dependency_depth(&[vec![1], vec![2], vec![]]), 2);
        assert_eq!(dependency_depth(&[vec![], vec![]]), 0);
        // 0 -> 1 -> 2 -> 0: the back edge counts once, no infinite loop
        assert_eq!(dependency_depth(&[vec![1], vec![2], vec![0]]), 3);
    }

    #[test]
    fn test_find_cycles() {
        let cycles = find_cycles(&[vec![1], vec![2], vec![0, 3], vec![]]);
        assert_eq!(cycles, vec![vec![0, 1, 2]]);
        assert!(find_cycles(&[vec![1], vec![2], vec![]]).is_empty());
        assert_eq!(find_cycles(&[vec![0]]), vec![vec![0]]);
    }

    #[test]
    fn test_node_metrics() {
        let isolated = node_metrics(0, 0, false);
        assert_eq!(isolated.instability, 0.0);
        assert_eq!(isolated.distance_from_main_sequence, 1.0);

        let unstable = node_metrics(1, 3, false);
        assert!((unstable.instability - 0.75).abs() < 1e-12);

        let stable_interface = node_metrics(4, 0, true);
        assert_eq!(stable_interface.abstractness, 1.0);
        assert_eq!(stable_interface.distance_from_main_sequence, 0.0);
    }
}
