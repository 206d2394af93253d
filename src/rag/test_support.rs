//! In-memory [`GraphStore`] for retrieval tests.

use crate::db::{EdgeFilter, GraphMetadata, GraphStore, SearchHit, StoredChunk, StructuralFilter};
use crate::error::Result;
use crate::graph::{DependencyEdge, DependencyGraph, DependencyType};
use crate::indexer::chunk::{Chunk, ChunkType};

#[derive(Default)]
pub struct InMemoryStore {
    chunks: Vec<(Chunk, Vec<f32>, GraphMetadata)>,
    edges: Vec<DependencyEdge>,
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    f64::from(dot / (norm_a * norm_b))
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a bare member chunk with `content` and a vector.
    pub fn add(&mut self, id: &str, content: &str, vector: Vec<f32>) {
        let chunk = Chunk {
            node_id: id.to_string(),
            chunk_type: ChunkType::Member,
            content: content.to_string(),
            file_path: format!("{id}.rs"),
            start_line: 1,
            end_line: content.lines().count().max(1),
            language: "rust".to_string(),
            name: Some(id.to_string()),
            qualified_name: Some(id.to_string()),
            context: Default::default(),
            metadata: Default::default(),
            parent_id: None,
            children_ids: Vec::new(),
            reference_ids: Vec::new(),
            referenced_by_ids: Vec::new(),
        };
        self.chunks.push((chunk, vector, GraphMetadata::default()));
    }

    pub fn link(&mut self, source: &str, target: &str, dependency_type: DependencyType) {
        self.edges.push(DependencyEdge {
            source_id: source.to_string(),
            target_id: target.to_string(),
            dependency_type,
            strength: 1.0,
            is_direct: true,
            is_required: false,
            description: String::new(),
            locations: Vec::new(),
        });
    }
}

impl GraphStore for InMemoryStore {
    fn insert_batch(&mut self, chunks: &[Chunk], vectors: &[Vec<f32>], graph: &DependencyGraph) -> Result<()> {
        for (chunk, vector) in chunks.iter().zip(vectors) {
            self.chunks.retain(|(c, _, _)| c.node_id != chunk.node_id);
            let meta = GraphMetadata::from_graph(graph, &chunk.node_id).unwrap_or_default();
            self.chunks.push((chunk.clone(), vector.clone(), meta));
        }
        Ok(())
    }

    fn sync_graph(&mut self, graph: &DependencyGraph) -> Result<()> {
        self.edges = graph.edges().to_vec();
        for (chunk, _, meta) in &mut self.chunks {
            *meta = GraphMetadata::from_graph(graph, &chunk.node_id).unwrap_or_default();
        }
        Ok(())
    }

    fn get_chunk(&self, node_id: &str) -> Result<Option<StoredChunk>> {
        Ok(self
            .chunks
            .iter()
            .find(|(c, _, _)| c.node_id == node_id)
            .map(|(chunk, _, meta)| StoredChunk {
                chunk: chunk.clone(),
                graph_metadata: meta.clone(),
            }))
    }

    fn get_edges(&self, filter: &EdgeFilter<'_>) -> Result<Vec<DependencyEdge>> {
        Ok(self
            .edges
            .iter()
            .filter(|e| filter.source_id.is_none_or(|s| e.source_id == s))
            .filter(|e| filter.target_id.is_none_or(|t| e.target_id == t))
            .filter(|e| filter.edge_type.is_none_or(|t| e.dependency_type == t))
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    fn search(&self, vector: &[f32], k: usize, filter: Option<&StructuralFilter>) -> Result<Vec<SearchHit>> {
        let mut scored: Vec<SearchHit> = self
            .chunks
            .iter()
            .map(|(chunk, v, meta)| SearchHit {
                chunk: chunk.clone(),
                graph_metadata: meta.clone(),
                similarity: cosine_similarity(vector, v),
            })
            .collect();
        scored.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        scored.truncate(k * 2);
        Ok(scored
            .into_iter()
            .filter(|h| filter.is_none_or(|f| f.matches(&h.chunk, &h.graph_metadata)))
            .take(k)
            .collect())
    }

    fn delete_file(&mut self, file_path: &str) -> Result<usize> {
        let before = self.chunks.len();
        self.chunks.retain(|(c, _, _)| c.file_path != file_path);
        Ok(before - self.chunks.len())
    }
}
