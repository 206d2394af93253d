//! Dependency graph: typed edges between chunks plus structural metrics.
pub mod builder;
pub mod export;
pub mod metrics;
pub mod types;

pub use builder::build_graph;
pub use types::{DependencyEdge, DependencyGraph, DependencyType, EdgeLocation, GraphMetrics, NodeMetrics, NodeSummary};
