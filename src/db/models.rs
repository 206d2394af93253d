use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::graph::{DependencyGraph, DependencyType};
use crate::indexer::chunk::{Chunk, ChunkType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphPosition {
    /// No incoming edges.
    Root,
    /// Incoming edges only.
    Leaf,
    Intermediate,
}

/// Structural record stored next to each chunk so queries can post-filter
/// without rebuilding the graph. A missing or unreadable record decodes to
/// `Default` (no position, all counts zero).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphMetadata {
    pub dependency_count: usize,
    pub incoming_count: usize,
    pub outgoing_count: usize,
    pub graph_position: Option<GraphPosition>,
    pub instability: f64,
    pub has_contains: bool,
    pub has_extends: bool,
    pub has_implements: bool,
    pub has_calls: bool,
    pub has_uses: bool,
    pub has_imports: bool,
}

impl GraphMetadata {
    /// Derive the record for `node_id`; `None` when the graph does not hold it.
    pub fn from_graph(graph: &DependencyGraph, node_id: &str) -> Option<Self> {
        let metrics = graph.node_metrics(node_id)?;
        let mut meta = GraphMetadata {
            dependency_count: metrics.fan_in + metrics.fan_out,
            incoming_count: metrics.fan_in,
            outgoing_count: metrics.fan_out,
            graph_position: Some(match (metrics.fan_in, metrics.fan_out) {
                (0, _) => GraphPosition::Root,
                (_, 0) => GraphPosition::Leaf,
                _ => GraphPosition::Intermediate,
            }),
            instability: metrics.instability,
            ..Default::default()
        };
        for edge in graph.outgoing(node_id).chain(graph.incoming(node_id)) {
            meta.set_flag(edge.dependency_type);
        }
        Some(meta)
    }

    fn set_flag(&mut self, dependency_type: DependencyType) {
        match dependency_type {
            DependencyType::Contains => self.has_contains = true,
            DependencyType::Extends => self.has_extends = true,
            DependencyType::Implements => self.has_implements = true,
            DependencyType::Calls => self.has_calls = true,
            DependencyType::Uses => self.has_uses = true,
            DependencyType::Imports => self.has_imports = true,
            DependencyType::Unknown => {}
        }
    }

    pub fn has(&self, dependency_type: DependencyType) -> bool {
        match dependency_type {
            DependencyType::Contains => self.has_contains,
            DependencyType::Extends => self.has_extends,
            DependencyType::Implements => self.has_implements,
            DependencyType::Calls => self.has_calls,
            DependencyType::Uses => self.has_uses,
            DependencyType::Imports => self.has_imports,
            DependencyType::Unknown => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredChunk {
    pub chunk: Chunk,
    pub graph_metadata: GraphMetadata,
}

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub chunk: Chunk,
    pub graph_metadata: GraphMetadata,
    /// `1 - cosine_distance / 2`, in `[0, 1]`.
    pub similarity: f64,
}

/// Partial edge lookup; unset fields match anything.
#[derive(Debug, Clone, Default)]
pub struct EdgeFilter<'a> {
    pub source_id: Option<&'a str>,
    pub target_id: Option<&'a str>,
    pub edge_type: Option<DependencyType>,
    pub limit: Option<usize>,
}

/// Post-filter applied to similarity candidates. Every set field must match.
#[derive(Debug, Clone, Default)]
pub struct StructuralFilter {
    pub chunk_types: Vec<ChunkType>,
    pub language: Option<String>,
    pub file_prefix: Option<String>,
    pub graph_position: Option<GraphPosition>,
    /// Relationship types the chunk must take part in.
    pub relationships: Vec<DependencyType>,
    pub min_dependency_count: Option<usize>,
    pub max_instability: Option<f64>,
}

impl StructuralFilter {
    pub fn matches(&self, chunk: &Chunk, meta: &GraphMetadata) -> bool {
        if !self.chunk_types.is_empty() && !self.chunk_types.contains(&chunk.chunk_type) {
            return false;
        }
        if self.language.as_deref().is_some_and(|l| l != chunk.language) {
            return false;
        }
        if self
            .file_prefix
            .as_deref()
            .is_some_and(|p| !chunk.file_path.starts_with(p))
        {
            return false;
        }
        if self.graph_position.is_some() && self.graph_position != meta.graph_position {
            return false;
        }
        if !self.relationships.iter().all(|t| meta.has(*t)) {
            return false;
        }
        if self
            .min_dependency_count
            .is_some_and(|min| meta.dependency_count < min)
        {
            return false;
        }
        if self.max_instability.is_some_and(|max| meta.instability > max) {
            return false;
        }
        true
    }
}

/// Decode a JSON column, degrading to the type's default on a missing or
/// corrupt value.
pub(crate) fn decode_json<T: DeserializeOwned + Default>(raw: Option<&str>, column: &str, node_id: &str) -> T {
    let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
        return T::default();
    };
    match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            warn!("{node_id}: unreadable {column} column, using defaults: {e}");
            T::default()
        }
    }
}
