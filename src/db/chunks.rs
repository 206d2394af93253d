use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};
use tracing::{info, warn};

use super::models::{GraphMetadata, StoredChunk, decode_json};
use super::{Db, edges, serialize_vector};
use crate::error::{Error, Result};
use crate::graph::DependencyGraph;
use crate::indexer::chunk::{Chunk, ChunkType};

/// Column list shared by every chunk query; `map_chunk_row` reads it by position.
pub(crate) const CHUNK_COLUMNS: &str = "c.node_id, c.chunk_type, c.content, c.file_path, c.start_line, \
     c.end_line, c.language, c.name, c.qualified_name, c.context, c.metadata, c.parent_id, \
     c.children_ids, c.reference_ids, c.referenced_by_ids, c.graph_metadata";

pub(crate) fn map_chunk_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredChunk> {
    let node_id: String = row.get(0)?;
    let chunk_type_raw: String = row.get(1)?;
    let chunk_type = chunk_type_raw.parse().unwrap_or_else(|e| {
        warn!("{node_id}: {e}, reading as member");
        ChunkType::Member
    });

    let context: Option<String> = row.get(9)?;
    let metadata: Option<String> = row.get(10)?;
    let children: Option<String> = row.get(12)?;
    let references: Option<String> = row.get(13)?;
    let referenced_by: Option<String> = row.get(14)?;
    let graph_metadata: Option<String> = row.get(15)?;

    let chunk = Chunk {
        chunk_type,
        content: row.get(2)?,
        file_path: row.get(3)?,
        start_line: row.get::<_, i64>(4)? as usize,
        end_line: row.get::<_, i64>(5)? as usize,
        language: row.get(6)?,
        name: row.get(7)?,
        qualified_name: row.get(8)?,
        context: decode_json(context.as_deref(), "context", &node_id),
        metadata: decode_json(metadata.as_deref(), "metadata", &node_id),
        parent_id: row.get(11)?,
        children_ids: decode_json(children.as_deref(), "children_ids", &node_id),
        reference_ids: decode_json(references.as_deref(), "reference_ids", &node_id),
        referenced_by_ids: decode_json(referenced_by.as_deref(), "referenced_by_ids", &node_id),
        node_id: node_id.clone(),
    };

    Ok(StoredChunk {
        graph_metadata: decode_json(graph_metadata.as_deref(), "graph_metadata", &node_id),
        chunk,
    })
}

impl Db {
    pub(crate) fn insert_chunks(
        &mut self,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
        graph: &DependencyGraph,
    ) -> Result<()> {
        if chunks.len() != vectors.len() {
            return Err(Error::InvalidInput(format!(
                "{} chunks but {} vectors",
                chunks.len(),
                vectors.len()
            )));
        }
        for vector in vectors {
            self.check_dimensions(vector)?;
        }
        if chunks.is_empty() {
            return Ok(());
        }
        self.ensure_schema()?;

        let tx = self.conn.transaction()?;
        {
            let mut upsert = tx.prepare(
                r#"
                INSERT INTO chunks (
                    node_id, chunk_type, content, file_path, start_line, end_line, language,
                    name, qualified_name, context, metadata, parent_id, children_ids,
                    reference_ids, referenced_by_ids, graph_metadata
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
                ON CONFLICT(node_id) DO UPDATE SET
                    chunk_type = excluded.chunk_type,
                    content = excluded.content,
                    file_path = excluded.file_path,
                    start_line = excluded.start_line,
                    end_line = excluded.end_line,
                    language = excluded.language,
                    name = excluded.name,
                    qualified_name = excluded.qualified_name,
                    context = excluded.context,
                    metadata = excluded.metadata,
                    parent_id = excluded.parent_id,
                    children_ids = excluded.children_ids,
                    reference_ids = excluded.reference_ids,
                    referenced_by_ids = excluded.referenced_by_ids,
                    graph_metadata = excluded.graph_metadata
                RETURNING id
                "#,
            )?;
            let mut drop_vector = tx.prepare("DELETE FROM vec_chunks WHERE rowid = ?")?;
            let mut insert_vector = tx.prepare("INSERT INTO vec_chunks (rowid, embedding) VALUES (?, ?)")?;

            for (chunk, vector) in chunks.iter().zip(vectors) {
                let graph_metadata = GraphMetadata::from_graph(graph, &chunk.node_id).unwrap_or_default();
                let id: i64 = upsert.query_row(
                    params![
                        chunk.node_id,
                        chunk.chunk_type.as_str(),
                        chunk.content,
                        chunk.file_path,
                        chunk.start_line as i64,
                        chunk.end_line as i64,
                        chunk.language,
                        chunk.name,
                        chunk.qualified_name,
                        serde_json::to_string(&chunk.context)?,
                        serde_json::to_string(&chunk.metadata)?,
                        chunk.parent_id,
                        serde_json::to_string(&chunk.children_ids)?,
                        serde_json::to_string(&chunk.reference_ids)?,
                        serde_json::to_string(&chunk.referenced_by_ids)?,
                        serde_json::to_string(&graph_metadata)?,
                    ],
                    |row| row.get(0),
                )?;
                drop_vector.execute(params![id])?;
                insert_vector.execute(params![id, serialize_vector(vector)])?;
            }

            let batch: HashSet<&str> = chunks.iter().map(|c| c.node_id.as_str()).collect();
            edges::upsert_edges(
                &tx,
                graph
                    .edges()
                    .iter()
                    .filter(|e| batch.contains(e.source_id.as_str()) || batch.contains(e.target_id.as_str())),
            )?;
        }
        tx.commit()?;

        info!("Stored {} chunks", chunks.len());
        Ok(())
    }

    pub(crate) fn chunk_by_id(&self, node_id: &str) -> Result<Option<StoredChunk>> {
        if !self.schema_ready {
            return Ok(None);
        }
        let sql = format!("SELECT {CHUNK_COLUMNS} FROM chunks c WHERE c.node_id = ?");
        Ok(self
            .conn
            .query_row(&sql, params![node_id], map_chunk_row)
            .optional()?)
    }

    /// All chunks of one file, in source order.
    pub fn file_chunks(&self, file_path: &str) -> Result<Vec<StoredChunk>> {
        if !self.schema_ready {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {CHUNK_COLUMNS} FROM chunks c WHERE c.file_path = ? ORDER BY c.start_line, c.id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![file_path], map_chunk_row)?;

        let mut chunks = Vec::new();
        for row in rows {
            chunks.push(row?);
        }
        Ok(chunks)
    }

    pub(crate) fn delete_file_chunks(&mut self, file_path: &str) -> Result<usize> {
        if !self.schema_ready {
            return Ok(0);
        }
        let tx = self.conn.transaction()?;

        // vec0 rows are not covered by foreign keys
        tx.execute(
            "DELETE FROM vec_chunks WHERE rowid IN (SELECT id FROM chunks WHERE file_path = ?)",
            params![file_path],
        )?;
        tx.execute(
            r#"
            DELETE FROM dependency_edges
            WHERE source_id IN (SELECT node_id FROM chunks WHERE file_path = ?1)
               OR target_id IN (SELECT node_id FROM chunks WHERE file_path = ?1)
            "#,
            params![file_path],
        )?;
        let removed = tx.execute("DELETE FROM chunks WHERE file_path = ?", params![file_path])?;
        tx.execute("DELETE FROM indexed_files WHERE path = ?", params![file_path])?;
        tx.commit()?;

        Ok(removed)
    }

    /// Returns a map of path -> modified_at for all indexed files.
    pub fn list_files(&self) -> Result<HashMap<String, DateTime<Utc>>> {
        if !self.schema_ready {
            return Ok(HashMap::new());
        }
        let mut stmt = self.conn.prepare("SELECT path, modified_at FROM indexed_files")?;
        let rows = stmt.query_map([], |row| {
            let path: String = row.get(0)?;
            let modified_at: DateTime<Utc> = row.get(1)?;
            Ok((path, modified_at))
        })?;

        let mut files = HashMap::new();
        for row in rows {
            let (path, modified_at) = row?;
            files.insert(path, modified_at);
        }
        Ok(files)
    }

    pub fn record_file(&mut self, path: &str, modified_at: DateTime<Utc>) -> Result<()> {
        self.ensure_schema()?;
        self.conn.execute(
            r#"
            INSERT INTO indexed_files (path, modified_at, indexed_at)
            VALUES (?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(path) DO UPDATE SET
                modified_at = excluded.modified_at,
                indexed_at = CURRENT_TIMESTAMP
            "#,
            params![path, modified_at],
        )?;
        Ok(())
    }

    pub fn chunk_count(&self) -> Result<usize> {
        if !self.schema_ready {
            return Ok(0);
        }
        let count: i64 = self
            .conn
            .query_row("SELECT count(*) FROM chunks", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::GraphStore;
    use crate::db::models::GraphPosition;
    use crate::graph::build_graph;

    fn sample_chunks() -> Vec<Chunk> {
        let make = |id: &str, chunk_type, name: Option<&str>, content: &str, parent: Option<&str>| Chunk {
            node_id: id.to_string(),
            chunk_type,
            content: content.to_string(),
            file_path: "src/lib.rs".to_string(),
            start_line: 1,
            end_line: 3,
            language: "rust".to_string(),
            name: name.map(str::to_string),
            qualified_name: name.map(str::to_string),
            context: Default::default(),
            metadata: Default::default(),
            parent_id: parent.map(str::to_string),
            children_ids: Vec::new(),
            reference_ids: Vec::new(),
            referenced_by_ids: Vec::new(),
        };
        let mut file = make("f", ChunkType::File, Some("lib.rs"), "fn a() { b() }\nfn b() {}", None);
        file.children_ids = vec!["a".to_string(), "b".to_string()];
        let mut a = make("a", ChunkType::OrphanedMember, Some("a"), "fn a() { b() }", Some("f"));
        a.context.return_type = Some("()".to_string());
        a.reference_ids = vec!["b".to_string()];
        let mut b = make("b", ChunkType::OrphanedMember, Some("b"), "fn b() {}", Some("f"));
        b.referenced_by_ids = vec!["a".to_string()];
        vec![file, a, b]
    }

    fn vectors(n: usize) -> Vec<Vec<f32>> {
        (0..n)
            .map(|i| {
                let mut v = vec![0.0f32; 4];
                v[i % 4] = 1.0;
                v
            })
            .collect()
    }

    #[test]
    fn test_insert_and_get_chunk_roundtrip() {
        let mut db = Db::open_in_memory(4).unwrap();
        let chunks = sample_chunks();
        let graph = build_graph(&chunks);
        db.insert_batch(&chunks, &vectors(3), &graph).unwrap();

        assert_eq!(db.chunk_count().unwrap(), 3);
        let stored = db.get_chunk("a").unwrap().unwrap();
        assert_eq!(stored.chunk, chunks[1]);
        assert_eq!(stored.graph_metadata.incoming_count, 1);
        assert!(stored.graph_metadata.has_calls);
        assert_eq!(stored.graph_metadata.graph_position, Some(GraphPosition::Intermediate));

        let root = db.get_chunk("f").unwrap().unwrap();
        assert_eq!(root.graph_metadata.graph_position, Some(GraphPosition::Root));

        assert!(db.get_chunk("nope").unwrap().is_none());
    }

    #[test]
    fn test_reinsert_replaces_rows() {
        let mut db = Db::open_in_memory(4).unwrap();
        let mut chunks = sample_chunks();
        let graph = build_graph(&chunks);
        db.insert_batch(&chunks, &vectors(3), &graph).unwrap();

        chunks[2].content = "fn b() { 1 }".to_string();
        db.insert_batch(&chunks, &vectors(3), &graph).unwrap();
        assert_eq!(db.chunk_count().unwrap(), 3);
        assert_eq!(db.get_chunk("b").unwrap().unwrap().chunk.content, "fn b() { 1 }");

        let vec_rows: i64 = db
            .conn
            .query_row("SELECT count(*) FROM vec_chunks", [], |row| row.get(0))
            .unwrap();
        assert_eq!(vec_rows, 3);
    }

    #[test]
    fn test_insert_rejects_mismatched_vectors() {
        let mut db = Db::open_in_memory(4).unwrap();
        let chunks = sample_chunks();
        let graph = build_graph(&chunks);

        let short = db.insert_batch(&chunks, &vectors(2), &graph);
        assert!(matches!(short, Err(Error::InvalidInput(_))));

        let wrong_dims = vec![vec![0.5f32; 3]; 3];
        assert!(matches!(db.insert_batch(&chunks, &wrong_dims, &graph), Err(Error::InvalidInput(_))));
        assert!(!db.has_schema());
    }

    #[test]
    fn test_reads_before_first_write_are_empty() {
        let mut db = Db::open_in_memory(4).unwrap();
        assert!(db.get_chunk("a").unwrap().is_none());
        assert_eq!(db.chunk_count().unwrap(), 0);
        assert!(db.list_files().unwrap().is_empty());
        assert_eq!(db.delete_file("src/lib.rs").unwrap(), 0);
        assert!(!db.has_schema());
    }

    #[test]
    fn test_delete_file_removes_chunks_vectors_and_edges() {
        let mut db = Db::open_in_memory(4).unwrap();
        let chunks = sample_chunks();
        let graph = build_graph(&chunks);
        db.insert_batch(&chunks, &vectors(3), &graph).unwrap();
        db.record_file("src/lib.rs", Utc::now()).unwrap();

        assert_eq!(db.delete_file("src/lib.rs").unwrap(), 3);
        assert_eq!(db.chunk_count().unwrap(), 0);
        assert!(db.list_files().unwrap().is_empty());
        assert!(db.get_edges(&Default::default()).unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_json_columns_degrade() {
        let mut db = Db::open_in_memory(4).unwrap();
        let chunks = sample_chunks();
        let graph = build_graph(&chunks);
        db.insert_batch(&chunks, &vectors(3), &graph).unwrap();

        db.conn
            .execute(
                "UPDATE chunks SET graph_metadata = '{broken', context = NULL, chunk_type = 'gadget' WHERE node_id = 'a'",
                [],
            )
            .unwrap();

        let stored = db.get_chunk("a").unwrap().unwrap();
        assert_eq!(stored.graph_metadata, GraphMetadata::default());
        assert!(stored.chunk.context.is_empty());
        assert_eq!(stored.chunk.chunk_type, ChunkType::Member);
        assert_eq!(stored.chunk.reference_ids, vec!["b".to_string()]);
    }

    #[test]
    fn test_record_and_list_files() {
        let mut db = Db::open_in_memory(4).unwrap();
        let now = Utc::now();
        db.record_file("a.py", now).unwrap();
        db.record_file("a.py", now).unwrap();
        let files = db.list_files().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files["a.py"].timestamp(), now.timestamp());
    }
}
