//! Source-to-chunk pipeline: language tables, tree-sitter extraction,
//! heuristic cross references and the differential directory indexer.

pub mod chunk;
pub mod core;
pub mod extractor;
pub mod languages;
pub mod references;

pub use chunk::{Chunk, ChunkContext, ChunkType};
pub use self::core::{IndexSummary, Indexer, collect_files, extract_directory};
pub use extractor::ChunkExtractor;
