//! # chunkgraph: code chunk graphs and graph-augmented retrieval
//!
//! Splits source files into a hierarchy of chunks, infers typed dependencies
//! between them, stores both next to their embeddings, and answers queries
//! with a token-bounded context that follows the dependency graph.
//!
//! ## Architecture
//!
//! - **[`indexer`]**: Tree-sitter chunk extraction and differential directory indexing
//! - **[`graph`]**: Dependency graph inference, metrics and node-link export
//! - **[`db`]**: SQLite + sqlite-vec graph-vector store
//! - **[`rag`]**: Seed, expand, rank and assemble (GraphRAG)
//! - **[`embedder`]**: Embedding trait plus a deterministic mock
//! - **[`config`]**: JSON configuration with defaults and validation

pub mod config;
pub mod db;
pub mod embedder;
pub mod error;
pub mod graph;
pub mod indexer;
pub mod rag;

pub use error::{Error, Result};
