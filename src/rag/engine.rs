use std::collections::HashMap;

use serde::Serialize;
use tracing::{info, warn};

use super::assembly::assemble;
use super::expansion::expand;
use super::ranking::{RankedNode, rank};
use crate::config::GraphRagConfig;
use crate::db::GraphStore;
use crate::embedder::Embedder;
use crate::error::Result;
use crate::indexer::chunk::Chunk;

/// Outcome of one retrieval call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GraphRagResult {
    pub context_text: String,
    pub included_chunk_ids: Vec<String>,
    /// Top-K chunks that did not fit the token budget.
    pub excluded_chunk_ids: Vec<String>,
    pub total_tokens: usize,
    pub graph_node_count: usize,
    pub graph_edge_count: usize,
    pub discovered_paths: Vec<Vec<String>>,
    pub nodes: Vec<RankedNode>,
}

/// Graph-augmented retrieval over a [`GraphStore`].
///
/// Each call seeds from similarity search, expands a throwaway graph
/// through the stored edges, ranks it and packs the best chunks into a
/// token budget. Nothing is written back to the store.
pub struct GraphRag<'a, S: GraphStore + ?Sized, E: Embedder + ?Sized> {
    store: &'a S,
    embedder: &'a E,
    config: GraphRagConfig,
}

impl<'a, S: GraphStore + ?Sized, E: Embedder + ?Sized> GraphRag<'a, S, E> {
    pub fn new(store: &'a S, embedder: &'a E, config: GraphRagConfig) -> Self {
        Self { store, embedder, config }
    }

    pub fn retrieve(&self, query: &str) -> Result<GraphRagResult> {
        let vector = self.embedder.embed(query)?;
        let hits = self.store.search(&vector, self.config.seed_count, None)?;
        if hits.is_empty() {
            info!("retrieve: no seeds for query");
            return Ok(GraphRagResult::default());
        }

        let seeds: Vec<String> = hits.iter().map(|h| h.chunk.node_id.clone()).collect();
        let similarities: HashMap<String, f64> =
            hits.iter().map(|h| (h.chunk.node_id.clone(), h.similarity)).collect();
        let mut chunks: HashMap<String, Chunk> =
            hits.into_iter().map(|h| (h.chunk.node_id.clone(), h.chunk)).collect();

        let expanded = expand(self.store, &seeds, self.config.max_hops, self.config.max_neighbors)?;
        for node_id in expanded.node_ids() {
            if chunks.contains_key(node_id) {
                continue;
            }
            match self.store.get_chunk(node_id)? {
                Some(stored) => {
                    chunks.insert(node_id.to_string(), stored.chunk);
                }
                None => warn!("{node_id}: edge endpoint has no stored chunk"),
            }
        }

        let ranking = rank(&expanded, &chunks, &similarities, query, &self.config);
        let selected = ranking
            .nodes
            .iter()
            .filter_map(|n| chunks.get(&n.node_id))
            .take(self.config.top_k);
        let context = assemble(selected, self.config.token_budget);

        info!(
            "retrieve: {} seeds, {} nodes, {} edges, {} paths, {} chunks in context ({} tokens)",
            seeds.len(),
            expanded.node_count(),
            expanded.edge_count(),
            ranking.paths.len(),
            context.included.len(),
            context.total_tokens
        );

        Ok(GraphRagResult {
            context_text: context.context_text,
            included_chunk_ids: context.included,
            excluded_chunk_ids: context.excluded,
            total_tokens: context.total_tokens,
            graph_node_count: expanded.node_count(),
            graph_edge_count: expanded.edge_count(),
            discovered_paths: ranking.paths,
            nodes: ranking.nodes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::EmbedderError;
    use crate::graph::DependencyType;
    use crate::rag::test_support::InMemoryStore;

    /// Maps every text onto the same direction.
    struct ConstEmbedder;

    impl Embedder for ConstEmbedder {
        fn embed(&self, _text: &str) -> std::result::Result<Vec<f32>, EmbedderError> {
            Ok(vec![1.0, 0.0])
        }

        fn dimensions(&self) -> usize {
            2
        }
    }

    fn store() -> InMemoryStore {
        let mut store = InMemoryStore::new();
        store.add("parse", "fn parse() { tokenize() }", vec![1.0, 0.0]);
        store.add("tokenize", "fn tokenize() {}", vec![0.0, 1.0]);
        store.add("render", "fn render() {}", vec![0.6, 0.8]);
        store.link("parse", "tokenize", DependencyType::Calls);
        store
    }

    #[test]
    fn test_retrieve_pulls_in_graph_neighbors() {
        let store = store();
        let config = GraphRagConfig {
            seed_count: 1,
            ..Default::default()
        };
        let rag = GraphRag::new(&store, &ConstEmbedder, config);
        let result = rag.retrieve("parse tokens").unwrap();

        assert_eq!(result.graph_node_count, 2);
        assert_eq!(result.graph_edge_count, 1);
        assert!(result.included_chunk_ids.contains(&"parse".to_string()));
        assert!(result.included_chunk_ids.contains(&"tokenize".to_string()));
        assert!(!result.included_chunk_ids.contains(&"render".to_string()));
        assert!(result.context_text.contains("fn tokenize() {}"));
        assert!(result.excluded_chunk_ids.is_empty());
        assert_eq!(result.nodes.len(), 2);
    }

    #[test]
    fn test_zero_hops_is_pure_similarity() {
        let store = store();
        let config = GraphRagConfig {
            seed_count: 2,
            max_hops: 0,
            ..Default::default()
        };
        let rag = GraphRag::new(&store, &ConstEmbedder, config);
        let result = rag.retrieve("anything").unwrap();

        assert_eq!(result.graph_edge_count, 0);
        assert_eq!(result.included_chunk_ids, vec!["parse".to_string(), "render".to_string()]);
        assert!(result.discovered_paths.is_empty());
    }

    #[test]
    fn test_empty_store_gives_empty_result() {
        let store = InMemoryStore::new();
        let rag = GraphRag::new(&store, &ConstEmbedder, GraphRagConfig::default());
        let result = rag.retrieve("query").unwrap();
        assert!(result.included_chunk_ids.is_empty());
        assert_eq!(result.total_tokens, 0);
        assert_eq!(result.graph_node_count, 0);
    }

    #[test]
    fn test_top_k_and_budget_bound_the_context() {
        let store = store();
        let config = GraphRagConfig {
            seed_count: 3,
            top_k: 1,
            ..Default::default()
        };
        let rag = GraphRag::new(&store, &ConstEmbedder, config);
        let result = rag.retrieve("parse").unwrap();
        assert_eq!(result.included_chunk_ids.len(), 1);

        let tight = GraphRagConfig {
            token_budget: 1,
            ..Default::default()
        };
        let result = GraphRag::new(&store, &ConstEmbedder, tight).retrieve("parse").unwrap();
        assert!(result.included_chunk_ids.is_empty());
        assert_eq!(result.excluded_chunk_ids.len(), 3);
        assert_eq!(result.total_tokens, 0);
    }
}
