use rusqlite::types::Value;
use rusqlite::{Connection, params};
use tracing::info;

use super::Db;
use super::models::{EdgeFilter, GraphMetadata, decode_json};
use crate::error::Result;
use crate::graph::{DependencyEdge, DependencyGraph, DependencyType};

fn map_edge_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DependencyEdge> {
    let source_id: String = row.get(0)?;
    let edge_type: String = row.get(2)?;
    let locations: Option<String> = row.get(7)?;
    Ok(DependencyEdge {
        dependency_type: edge_type.parse().unwrap_or(DependencyType::Unknown),
        target_id: row.get(1)?,
        strength: row.get(3)?,
        is_direct: row.get(4)?,
        is_required: row.get(5)?,
        description: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
        locations: decode_json(locations.as_deref(), "locations", &source_id),
        source_id,
    })
}

/// Insert or overwrite edges keyed by `(source_id, target_id, edge_type)`.
pub(crate) fn upsert_edges<'e>(conn: &Connection, edges: impl IntoIterator<Item = &'e DependencyEdge>) -> Result<usize> {
    let mut stmt = conn.prepare(
        r#"
        INSERT INTO dependency_edges (
            source_id, target_id, edge_type, strength, is_direct, is_required, description, locations
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(source_id, target_id, edge_type) DO UPDATE SET
            strength = excluded.strength,
            is_direct = excluded.is_direct,
            is_required = excluded.is_required,
            description = excluded.description,
            locations = excluded.locations
        "#,
    )?;

    let mut count = 0;
    for edge in edges {
        stmt.execute(params![
            edge.source_id,
            edge.target_id,
            edge.dependency_type.as_str(),
            edge.strength,
            edge.is_direct,
            edge.is_required,
            edge.description,
            serde_json::to_string(&edge.locations)?,
        ])?;
        count += 1;
    }
    Ok(count)
}

impl Db {
    pub(crate) fn query_edges(&self, filter: &EdgeFilter<'_>) -> Result<Vec<DependencyEdge>> {
        if !self.schema_ready || filter.limit == Some(0) {
            return Ok(Vec::new());
        }

        let mut query = String::from(
            "SELECT source_id, target_id, edge_type, strength, is_direct, is_required, description, locations \
             FROM dependency_edges",
        );
        let mut where_clauses = Vec::new();
        let mut params: Vec<Value> = Vec::new();

        if let Some(source) = filter.source_id {
            where_clauses.push("source_id = ?");
            params.push(Value::Text(source.to_string()));
        }
        if let Some(target) = filter.target_id {
            where_clauses.push("target_id = ?");
            params.push(Value::Text(target.to_string()));
        }
        if let Some(edge_type) = filter.edge_type {
            where_clauses.push("edge_type = ?");
            params.push(Value::Text(edge_type.as_str().to_string()));
        }

        if !where_clauses.is_empty() {
            query.push_str(" WHERE ");
            query.push_str(&where_clauses.join(" AND "));
        }
        query.push_str(" ORDER BY rowid");
        if let Some(limit) = filter.limit {
            query.push_str(" LIMIT ?");
            params.push(Value::Integer(limit as i64));
        }

        let param_refs: Vec<&dyn rusqlite::ToSql> =
            params.iter().map(|p| p as &dyn rusqlite::ToSql).collect();

        let mut stmt = self.conn.prepare(&query)?;
        let rows = stmt.query_map(param_refs.as_slice(), map_edge_row)?;

        let mut edges = Vec::new();
        for row in rows {
            edges.push(row?);
        }
        Ok(edges)
    }

    pub(crate) fn replace_graph(&mut self, graph: &DependencyGraph) -> Result<()> {
        self.ensure_schema()?;
        let tx = self.conn.transaction()?;

        tx.execute("DELETE FROM dependency_edges", [])?;
        let stored = upsert_edges(&tx, graph.edges())?;

        let node_ids: Vec<String> = {
            let mut stmt = tx.prepare("SELECT node_id FROM chunks ORDER BY id")?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            let ids = rows.collect::<rusqlite::Result<Vec<String>>>()?;
            ids
        };
        {
            let mut update = tx.prepare("UPDATE chunks SET graph_metadata = ? WHERE node_id = ?")?;
            for node_id in &node_ids {
                let meta = GraphMetadata::from_graph(graph, node_id).unwrap_or_default();
                update.execute(params![serde_json::to_string(&meta)?, node_id])?;
            }
        }
        tx.commit()?;

        info!("Synced graph: {} edges, {} chunks refreshed", stored, node_ids.len());
        Ok(())
    }
}
