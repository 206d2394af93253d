//! Scoring of the expanded graph: weighted PageRank, seed-to-seed path
//! membership and query term overlap.

use std::collections::HashMap;

use petgraph::Direction;
use petgraph::algo::all_simple_paths;
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use serde::Serialize;
use tracing::debug;

use super::expansion::ExpandedGraph;
use crate::config::GraphRagConfig;
use crate::indexer::chunk::Chunk;

const PATH_WEIGHT: f64 = 0.5;
const TEXT_WEIGHT: f64 = 0.3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedNode {
    pub node_id: String,
    pub is_seed: bool,
    /// Seed similarity from the vector search; `None` for expanded nodes.
    pub similarity: Option<f64>,
    pub pagerank: f64,
    pub path_membership: f64,
    pub text_relevance: f64,
    pub final_score: f64,
}

#[derive(Debug, Clone, Default)]
pub struct Ranking {
    /// Descending by `final_score`; ties keep discovery order.
    pub nodes: Vec<RankedNode>,
    pub paths: Vec<Vec<String>>,
}

/// Weighted PageRank by power iteration.
///
/// Rank leaving a node is split in proportion to its out-edge weights;
/// nodes without out-edges spread theirs uniformly.
pub fn pagerank(expanded: &ExpandedGraph, damping: f64, max_iterations: usize, tolerance: f64) -> Vec<f64> {
    let g = &expanded.graph;
    let n = g.node_count();
    if n == 0 {
        return Vec::new();
    }
    let uniform = 1.0 / n as f64;
    let out_weight: Vec<f64> = g
        .node_indices()
        .map(|i| g.edges_directed(i, Direction::Outgoing).map(|e| e.weight().weight).sum::<f64>())
        .collect();

    let mut rank = vec![uniform; n];
    for iteration in 0..max_iterations {
        let dangling: f64 = g
            .node_indices()
            .filter(|i| out_weight[i.index()] == 0.0)
            .map(|i| rank[i.index()])
            .sum();
        let base = (1.0 - damping) * uniform + damping * dangling * uniform;

        let mut next = vec![base; n];
        for edge in g.edge_references() {
            let (s, t) = (edge.source().index(), edge.target().index());
            next[t] += damping * rank[s] * edge.weight().weight / out_weight[s];
        }

        let delta: f64 = next.iter().zip(&rank).map(|(a, b)| (a - b).abs()).sum();
        rank = next;
        if delta < tolerance {
            debug!("pagerank converged after {} iterations", iteration + 1);
            break;
        }
    }
    rank
}

/// Count node occurrences on simple paths between the `path_seeds`
/// highest-ranked seeds, normalised by the largest count.
///
/// Path length is capped at `max_hops` edges and each ordered pair yields at
/// most `max_paths_per_pair` paths. Returns the scores and the discovered
/// paths as index lists.
pub fn path_membership(
    expanded: &ExpandedGraph,
    rank: &[f64],
    config: &GraphRagConfig,
) -> (Vec<f64>, Vec<Vec<NodeIndex>>) {
    let n = expanded.node_count();
    let mut counts = vec![0usize; n];
    let mut paths = Vec::new();
    if config.max_hops == 0 || expanded.edge_count() == 0 {
        return (vec![0.0; n], paths);
    }

    let mut seeds = expanded.seeds().to_vec();
    seeds.sort_by(|a, b| rank[b.index()].total_cmp(&rank[a.index()]));
    seeds.truncate(config.path_seeds);

    for &from in &seeds {
        for &to in &seeds {
            if from == to {
                continue;
            }
            let found = all_simple_paths::<Vec<NodeIndex>, _>(&expanded.graph, from, to, 0, Some(config.max_hops - 1))
                .take(config.max_paths_per_pair);
            for path in found {
                for node in &path {
                    counts[node.index()] += 1;
                }
                paths.push(path);
            }
        }
    }

    let max = counts.iter().copied().max().unwrap_or(0);
    let scores = if max == 0 {
        vec![0.0; n]
    } else {
        counts.iter().map(|&c| c as f64 / max as f64).collect()
    };
    (scores, paths)
}

/// Lowercased alphanumeric terms of `query`, deduplicated in order.
pub fn query_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for term in query.split(|c: char| !(c.is_alphanumeric() || c == '_')) {
        if term.is_empty() {
            continue;
        }
        let term = term.to_lowercase();
        if !terms.contains(&term) {
            terms.push(term);
        }
    }
    terms
}

/// Fraction of `terms` found in the chunk's name, qualified name or body.
pub fn text_relevance(terms: &[String], chunk: &Chunk) -> f64 {
    if terms.is_empty() {
        return 0.0;
    }
    let haystack = format!(
        "{} {} {}",
        chunk.name.as_deref().unwrap_or_default(),
        chunk.qualified_name.as_deref().unwrap_or_default(),
        chunk.content
    )
    .to_lowercase();
    let hits = terms.iter().filter(|t| haystack.contains(t.as_str())).count();
    hits as f64 / terms.len() as f64
}

/// Score every node of `expanded`.
///
/// `chunks` supplies bodies for text relevance; nodes missing from it score
/// zero there. With no edges the graph carries no structure and the order
/// falls back to seed similarity.
pub fn rank(
    expanded: &ExpandedGraph,
    chunks: &HashMap<String, Chunk>,
    similarities: &HashMap<String, f64>,
    query: &str,
    config: &GraphRagConfig,
) -> Ranking {
    let pr = pagerank(expanded, config.damping, config.max_iterations, config.tolerance);
    let (membership, index_paths) = path_membership(expanded, &pr, config);
    let terms = query_terms(query);
    let structural = expanded.edge_count() > 0;

    let mut nodes: Vec<RankedNode> = expanded
        .graph
        .node_indices()
        .map(|idx| {
            let node_id = expanded.graph[idx].clone();
            let similarity = similarities.get(&node_id).copied();
            let text = chunks.get(&node_id).map_or(0.0, |c| text_relevance(&terms, c));
            let (pagerank, path) = (pr[idx.index()], membership[idx.index()]);
            let final_score = if structural {
                pagerank + PATH_WEIGHT * path + TEXT_WEIGHT * text
            } else {
                similarity.unwrap_or(0.0)
            };
            RankedNode {
                node_id,
                is_seed: expanded.is_seed(idx),
                similarity,
                pagerank,
                path_membership: path,
                text_relevance: text,
                final_score,
            }
        })
        .collect();
    nodes.sort_by(|a, b| b.final_score.total_cmp(&a.final_score));

    let paths: Vec<Vec<String>> = index_paths
        .into_iter()
        .take(config.max_reported_paths)
        .map(|p| p.into_iter().map(|i| expanded.graph[i].clone()).collect::<Vec<_>>())
        .collect();

    Ranking { nodes, paths }
}
