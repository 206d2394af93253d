//! Graph-vector store using SQLite and sqlite-vec.
//!
//! Tables are created lazily by the first write; reads against a database
//! without the schema return empty results.
use std::path::Path;
use std::sync::Once;

use rusqlite::Connection;
use sqlite_vec::sqlite3_vec_init;
use tracing::info;

use crate::error::{Error, Result};
use crate::graph::{DependencyEdge, DependencyGraph};
use crate::indexer::chunk::Chunk;

pub mod chunks;
pub mod edges;
pub mod models;
pub mod search;

pub use models::{EdgeFilter, GraphMetadata, GraphPosition, SearchHit, StoredChunk, StructuralFilter};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS indexed_files (
    path TEXT PRIMARY KEY,
    modified_at DATETIME NOT NULL,
    indexed_at DATETIME DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS chunks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    node_id TEXT NOT NULL UNIQUE,
    chunk_type TEXT NOT NULL,
    content TEXT NOT NULL,
    file_path TEXT NOT NULL,
    start_line INTEGER NOT NULL,
    end_line INTEGER NOT NULL,
    language TEXT NOT NULL,
    name TEXT,
    qualified_name TEXT,
    context TEXT,
    metadata TEXT,
    parent_id TEXT,
    children_ids TEXT,
    reference_ids TEXT,
    referenced_by_ids TEXT,
    graph_metadata TEXT
);

CREATE INDEX IF NOT EXISTS idx_chunks_file ON chunks(file_path);
CREATE INDEX IF NOT EXISTS idx_chunks_name ON chunks(name);

CREATE VIRTUAL TABLE IF NOT EXISTS vec_chunks USING vec0(
    embedding FLOAT[{dimensions}]
);

CREATE TABLE IF NOT EXISTS dependency_edges (
    source_id TEXT NOT NULL,
    target_id TEXT NOT NULL,
    edge_type TEXT NOT NULL,
    strength REAL NOT NULL,
    is_direct INTEGER NOT NULL,
    is_required INTEGER NOT NULL,
    description TEXT,
    locations TEXT,
    PRIMARY KEY (source_id, target_id, edge_type)
);

CREATE INDEX IF NOT EXISTS idx_edges_target ON dependency_edges(target_id);
CREATE INDEX IF NOT EXISTS idx_edges_type ON dependency_edges(edge_type);
"#;

static INIT_VEC: Once = Once::new();

/// Initialize the sqlite-vec extension. Safe to call multiple times.
fn init_sqlite_vec() {
    INIT_VEC.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite3_vec_init as *const (),
        )));
    });
}

/// Storage interface used by indexing and retrieval.
///
/// The SQLite [`Db`] is the production backend; anything else implementing
/// this trait can stand in for it.
pub trait GraphStore {
    /// Upsert chunks with their vectors (same order, same length) and attach
    /// graph metadata derived from `graph`. Edges of `graph` touching the
    /// batch are stored as well.
    fn insert_batch(&mut self, chunks: &[Chunk], vectors: &[Vec<f32>], graph: &DependencyGraph) -> Result<()>;

    /// Replace the whole edge table with `graph` and refresh every stored
    /// chunk's graph metadata.
    fn sync_graph(&mut self, graph: &DependencyGraph) -> Result<()>;

    fn get_chunk(&self, node_id: &str) -> Result<Option<StoredChunk>>;

    fn get_edges(&self, filter: &EdgeFilter<'_>) -> Result<Vec<DependencyEdge>>;

    /// Nearest chunks to `vector`. With a filter, `2k` candidates are fetched
    /// and filtered in memory; at most `k` hits come back.
    fn search(&self, vector: &[f32], k: usize, filter: Option<&StructuralFilter>) -> Result<Vec<SearchHit>>;

    /// Remove a file's chunks, vectors and their edges. Returns the number of
    /// chunks removed.
    fn delete_file(&mut self, file_path: &str) -> Result<usize>;

    /// Outgoing then incoming edges of `node_id`, at most `limit` in total.
    fn neighbors(&self, node_id: &str, limit: usize) -> Result<Vec<DependencyEdge>> {
        let mut edges = self.get_edges(&EdgeFilter {
            source_id: Some(node_id),
            limit: Some(limit),
            ..Default::default()
        })?;
        if edges.len() < limit {
            edges.extend(self.get_edges(&EdgeFilter {
                target_id: Some(node_id),
                limit: Some(limit - edges.len()),
                ..Default::default()
            })?);
        }
        Ok(edges)
    }
}

/// A wrapper around a SQLite connection initialized with sqlite-vec.
pub struct Db {
    pub(crate) conn: Connection,
    dimensions: usize,
    schema_ready: bool,
}

impl Db {
    /// Open a database at the given path. Tables are created on first write.
    pub fn open<P: AsRef<Path>>(path: P, dimensions: usize) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening store: {}", path.display());
        init_sqlite_vec();
        Self::init(Connection::open(path)?, dimensions)
    }

    /// Open an in-memory database (useful for testing).
    pub fn open_in_memory(dimensions: usize) -> Result<Self> {
        init_sqlite_vec();
        Self::init(Connection::open_in_memory()?, dimensions)
    }

    fn init(conn: Connection, dimensions: usize) -> Result<Self> {
        if dimensions == 0 {
            return Err(Error::InvalidInput("vector dimensions must be positive".to_string()));
        }

        let vec_version: String = conn.query_row("SELECT vec_version()", [], |row| row.get(0))?;
        info!("sqlite-vec version: {}", vec_version);
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let tables: i64 = conn.query_row(
            "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name IN ('chunks', 'vec_chunks', 'dependency_edges', 'indexed_files')",
            [],
            |row| row.get(0),
        )?;

        Ok(Self {
            conn,
            dimensions,
            schema_ready: tables == 4,
        })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn has_schema(&self) -> bool {
        self.schema_ready
    }

    /// Create missing tables. Takes `&mut self`, so schema creation can never
    /// interleave with readers of the same handle.
    pub(crate) fn ensure_schema(&mut self) -> Result<()> {
        if self.schema_ready {
            return Ok(());
        }
        let sql = SCHEMA_SQL.replace("{dimensions}", &self.dimensions.to_string());
        self.conn.execute_batch(&sql)?;
        self.schema_ready = true;
        info!("Store schema created ({} dimensions)", self.dimensions);
        Ok(())
    }

    pub(crate) fn check_dimensions(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimensions {
            return Err(Error::InvalidInput(format!(
                "vector has {} dimensions, store expects {}",
                vector.len(),
                self.dimensions
            )));
        }
        Ok(())
    }
}

impl GraphStore for Db {
    fn insert_batch(&mut self, chunks: &[Chunk], vectors: &[Vec<f32>], graph: &DependencyGraph) -> Result<()> {
        self.insert_chunks(chunks, vectors, graph)
    }

    fn sync_graph(&mut self, graph: &DependencyGraph) -> Result<()> {
        self.replace_graph(graph)
    }

    fn get_chunk(&self, node_id: &str) -> Result<Option<StoredChunk>> {
        self.chunk_by_id(node_id)
    }

    fn get_edges(&self, filter: &EdgeFilter<'_>) -> Result<Vec<DependencyEdge>> {
        self.query_edges(filter)
    }

    fn search(&self, vector: &[f32], k: usize, filter: Option<&StructuralFilter>) -> Result<Vec<SearchHit>> {
        self.search_similar(vector, k, filter)
    }

    fn delete_file(&mut self, file_path: &str) -> Result<usize> {
        self.delete_file_chunks(file_path)
    }
}

/// Serialize a float32 vector into the little-endian blob vec0 expects.
pub fn serialize_vector(vec: &[f32]) -> Vec<u8> {
    if cfg!(target_endian = "little") {
        return bytemuck::cast_slice::<f32, u8>(vec).to_vec();
    }
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}
