//! Node-link JSON export for offline reuse of an analysis run.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::types::{DependencyEdge, DependencyGraph, GraphMetrics, NodeSummary};
use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeLinkGraph {
    pub directed: bool,
    pub multigraph: bool,
    #[serde(default)]
    pub graph: GraphMetrics,
    pub nodes: Vec<NodeSummary>,
    pub links: Vec<DependencyEdge>,
}

impl DependencyGraph {
    pub fn to_node_link(&self) -> NodeLinkGraph {
        NodeLinkGraph {
            directed: true,
            multigraph: true,
            graph: self.metrics().clone(),
            nodes: self.nodes().to_vec(),
            links: self.edges().to_vec(),
        }
    }

    /// Rebuild from a node-link document. Metrics are recalculated, not trusted.
    pub fn from_node_link(doc: NodeLinkGraph) -> Self {
        Self::from_parts(doc.nodes, doc.links)
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(&self.to_node_link())?;
        fs::write(path, json)?;
        info!("Saved graph ({} nodes) to {}", self.node_count(), path.display());
        Ok(())
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let doc: NodeLinkGraph = serde_json::from_str(&content)?;
        Ok(Self::from_node_link(doc))
    }
}
