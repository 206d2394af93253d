use rusqlite::types::Value;
use tracing::debug;

use super::chunks::{CHUNK_COLUMNS, map_chunk_row};
use super::models::{SearchHit, StructuralFilter};
use super::{Db, serialize_vector};
use crate::error::Result;

/// Candidates fetched per requested hit; structural filters run in memory.
const OVERFETCH: usize = 2;

impl Db {
    pub(crate) fn search_similar(
        &self,
        query_vector: &[f32],
        k: usize,
        filter: Option<&StructuralFilter>,
    ) -> Result<Vec<SearchHit>> {
        if k == 0 || !self.schema_ready {
            return Ok(Vec::new());
        }
        self.check_dimensions(query_vector)?;

        let query = format!(
            r#"
            SELECT {CHUNK_COLUMNS},
                vec_distance_cosine(v.embedding, ?) AS distance
            FROM vec_chunks v
            JOIN chunks c ON v.rowid = c.id
            ORDER BY distance ASC LIMIT ?
            "#
        );
        let params: Vec<Value> = vec![
            Value::Blob(serialize_vector(query_vector)),
            Value::Integer((k * OVERFETCH) as i64),
        ];
        let param_refs: Vec<&dyn rusqlite::ToSql> =
            params.iter().map(|p| p as &dyn rusqlite::ToSql).collect();

        let mut stmt = self.conn.prepare(&query)?;
        let rows = stmt.query_map(param_refs.as_slice(), |row| {
            let stored = map_chunk_row(row)?;
            let distance: f64 = row.get(16)?;
            Ok(SearchHit {
                chunk: stored.chunk,
                graph_metadata: stored.graph_metadata,
                similarity: 1.0 - (distance / 2.0),
            })
        })?;

        let mut candidates = 0;
        let mut results = Vec::with_capacity(k);
        for row in rows {
            let hit = row?;
            candidates += 1;
            if filter.is_none_or(|f| f.matches(&hit.chunk, &hit.graph_metadata)) {
                results.push(hit);
                if results.len() == k {
                    break;
                }
            }
        }

        debug!("search: {} candidates, {} hits", candidates, results.len());
        Ok(results)
    }
}
