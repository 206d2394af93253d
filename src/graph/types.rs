use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::metrics;
use crate::indexer::chunk::{Chunk, ChunkType};

/// Relationship kinds between chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DependencyType {
    Contains,
    Extends,
    Implements,
    Calls,
    Uses,
    Imports,
    Unknown,
}

impl DependencyType {
    pub const ALL: [DependencyType; 7] = [
        DependencyType::Contains,
        DependencyType::Extends,
        DependencyType::Implements,
        DependencyType::Calls,
        DependencyType::Uses,
        DependencyType::Imports,
        DependencyType::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyType::Contains => "CONTAINS",
            DependencyType::Extends => "EXTENDS",
            DependencyType::Implements => "IMPLEMENTS",
            DependencyType::Calls => "CALLS",
            DependencyType::Uses => "USES",
            DependencyType::Imports => "IMPORTS",
            DependencyType::Unknown => "UNKNOWN",
        }
    }

    /// Weight of one traversal along this edge type during retrieval expansion.
    pub fn traversal_weight(&self) -> f64 {
        match self {
            DependencyType::Contains => 1.0,
            DependencyType::Implements => 0.9,
            DependencyType::Extends => 0.8,
            DependencyType::Imports => 0.7,
            DependencyType::Uses => 0.6,
            DependencyType::Calls => 0.5,
            DependencyType::Unknown => 0.3,
        }
    }
}

impl fmt::Display for DependencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DependencyType {
    type Err = std::convert::Infallible;

    /// Unknown strings map to [`DependencyType::Unknown`] instead of failing.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .unwrap_or(DependencyType::Unknown))
    }
}

/// Where a dependency shows up in the source chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeLocation {
    /// 1-based line in the source file.
    pub line: usize,
    /// 1-based column.
    pub column: usize,
    pub snippet: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyEdge {
    #[serde(rename = "source", alias = "source_id")]
    pub source_id: String,
    #[serde(rename = "target", alias = "target_id")]
    pub target_id: String,
    #[serde(rename = "type")]
    pub dependency_type: DependencyType,
    /// In `[0.0, 1.0]`.
    pub strength: f64,
    pub is_direct: bool,
    pub is_required: bool,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub locations: Vec<EdgeLocation>,
}

/// Index-only view of a chunk held by a graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSummary {
    #[serde(rename = "id")]
    pub node_id: String,
    pub chunk_type: ChunkType,
    pub name: Option<String>,
    pub qualified_name: Option<String>,
    pub file_path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub language: String,
    #[serde(default)]
    pub is_interface: bool,
}

impl From<&Chunk> for NodeSummary {
    fn from(chunk: &Chunk) -> Self {
        Self {
            node_id: chunk.node_id.clone(),
            chunk_type: chunk.chunk_type,
            name: chunk.name.clone(),
            qualified_name: chunk.qualified_name.clone(),
            file_path: chunk.file_path.clone(),
            start_line: chunk.start_line,
            end_line: chunk.end_line,
            language: chunk.language.clone(),
            is_interface: chunk.is_interface(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphMetrics {
    pub node_count: usize,
    pub edge_count: usize,
    pub coupling: f64,
    pub cohesion: f64,
    pub dependency_depth: usize,
    pub cyclic_dependencies: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeMetrics {
    pub fan_in: usize,
    pub fan_out: usize,
    pub instability: f64,
    pub abstractness: f64,
    pub distance_from_main_sequence: f64,
}

/// Directed multigraph of typed dependency edges over chunk summaries.
///
/// Metrics are computed once in [`DependencyGraph::from_parts`]; the graph is
/// read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: Vec<NodeSummary>,
    index: HashMap<String, usize>,
    edges: Vec<DependencyEdge>,
    outgoing: Vec<Vec<usize>>,
    incoming: Vec<Vec<usize>>,
    metrics: GraphMetrics,
    node_metrics: Vec<NodeMetrics>,
}

impl DependencyGraph {
    /// Assemble a graph and calculate its metrics.
    ///
    /// Duplicate node ids keep their first occurrence. Edges whose endpoints
    /// are not in the node set are dropped.
    pub fn from_parts(nodes: Vec<NodeSummary>, edges: Vec<DependencyEdge>) -> Self {
        let mut index = HashMap::with_capacity(nodes.len());
        let mut unique = Vec::with_capacity(nodes.len());
        for node in nodes {
            if index.contains_key(&node.node_id) {
                warn!("duplicate node id {} ignored", node.node_id);
                continue;
            }
            index.insert(node.node_id.clone(), unique.len());
            unique.push(node);
        }

        let edge_count = edges.len();
        let edges: Vec<DependencyEdge> = edges
            .into_iter()
            .filter(|e| index.contains_key(&e.source_id) && index.contains_key(&e.target_id))
            .collect();
        if edges.len() < edge_count {
            warn!("dropped {} edges with unknown endpoints", edge_count - edges.len());
        }

        let mut outgoing = vec![Vec::new(); unique.len()];
        let mut incoming = vec![Vec::new(); unique.len()];
        for (i, edge) in edges.iter().enumerate() {
            outgoing[index[&edge.source_id]].push(i);
            incoming[index[&edge.target_id]].push(i);
        }

        let mut graph = Self {
            nodes: unique,
            index,
            edges,
            outgoing,
            incoming,
            metrics: GraphMetrics::default(),
            node_metrics: Vec::new(),
        };
        graph.calculate_metrics();
        graph
    }

    fn calculate_metrics(&mut self) {
        let adjacency = metrics::adjacency(self.nodes.len(), &self.edges, &self.index);
        self.metrics = GraphMetrics {
            node_count: self.nodes.len(),
            edge_count: self.edges.len(),
            coupling: metrics::coupling(self.nodes.len(), self.edges.len()),
            cohesion: metrics::cohesion(&adjacency),
            dependency_depth: metrics::dependency_depth(&adjacency),
            cyclic_dependencies: metrics::find_cycles(&adjacency)
                .into_iter()
                .map(|cycle| cycle.into_iter().map(|i| self.nodes[i].node_id.clone()).collect())
                .collect(),
        };
        self.node_metrics = (0..self.nodes.len())
            .map(|i| {
                metrics::node_metrics(
                    self.incoming[i].len(),
                    self.outgoing[i].len(),
                    self.nodes[i].is_interface,
                )
            })
            .collect();
    }

    pub fn nodes(&self) -> &[NodeSummary] {
        &self.nodes
    }

    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }

    pub fn metrics(&self) -> &GraphMetrics {
        &self.metrics
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.index.contains_key(node_id)
    }

    pub fn node(&self, node_id: &str) -> Option<&NodeSummary> {
        self.index.get(node_id).map(|&i| &self.nodes[i])
    }

    pub fn node_metrics(&self, node_id: &str) -> Option<&NodeMetrics> {
        self.index.get(node_id).map(|&i| &self.node_metrics[i])
    }

    pub fn outgoing(&self, node_id: &str) -> impl Iterator<Item = &DependencyEdge> {
        self.index
            .get(node_id)
            .into_iter()
            .flat_map(|&i| self.outgoing[i].iter().map(|&e| &self.edges[e]))
    }

    pub fn incoming(&self, node_id: &str) -> impl Iterator<Item = &DependencyEdge> {
        self.index
            .get(node_id)
            .into_iter()
            .flat_map(|&i| self.incoming[i].iter().map(|&e| &self.edges[e]))
    }

    pub fn edges_of_type(&self, dependency_type: DependencyType) -> impl Iterator<Item = &DependencyEdge> {
        self.edges
            .iter()
            .filter(move |e| e.dependency_type == dependency_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str) -> NodeSummary {
        NodeSummary {
            node_id: id.to_string(),
            chunk_type: ChunkType::Member,
            name: Some(id.to_string()),
            qualified_name: None,
            file_path: "a.rs".to_string(),
            start_line: 1,
            end_line: 1,
            language: "rust".to_string(),
            is_interface: false,
        }
    }

    fn edge(source: &str, target: &str, dependency_type: DependencyType) -> DependencyEdge {
        DependencyEdge {
            source_id: source.to_string(),
            target_id: target.to_string(),
            dependency_type,
            strength: 0.5,
            is_direct: true,
            is_required: false,
            description: String::new(),
            locations: Vec::new(),
        }
    }

    #[test]
    fn test_dependency_type_parse_falls_back_to_unknown() {
        assert_eq!("CALLS".parse::<DependencyType>().unwrap(), DependencyType::Calls);
        assert_eq!("implements".parse::<DependencyType>().unwrap(), DependencyType::Implements);
        assert_eq!("DEPENDS_ON".parse::<DependencyType>().unwrap(), DependencyType::Unknown);
    }

    #[test]
    fn test_traversal_weights_ordering() {
        assert!(DependencyType::Contains.traversal_weight() > DependencyType::Implements.traversal_weight());
        assert!(DependencyType::Calls.traversal_weight() > DependencyType::Unknown.traversal_weight());
    }

    #[test]
    fn test_from_parts_drops_dangling_edges_and_duplicate_nodes() {
        let graph = DependencyGraph::from_parts(
            vec![node("a"), node("b"), node("a")],
            vec![edge("a", "b", DependencyType::Calls), edge("a", "ghost", DependencyType::Uses)],
        );
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.outgoing("a").count(), 1);
        assert_eq!(graph.incoming("b").count(), 1);
        assert_eq!(graph.outgoing("ghost").count(), 0);
        assert_eq!(graph.node_metrics("a").unwrap().fan_out, 1);
    }

    #[test]
    fn test_edge_serializes_with_type_key() {
        let json = serde_json::to_value(edge("a", "b", DependencyType::Imports)).unwrap();
        assert_eq!(json["type"], "IMPORTS");
        assert_eq!(json["source"], "a");
        let back: DependencyEdge = serde_json::from_value(json).unwrap();
        assert_eq!(back.target_id, "b");
    }
}
