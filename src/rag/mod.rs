//! Graph-augmented retrieval.
//!
//! A query is embedded, seeded from similarity search, expanded through the
//! stored dependency edges into an ephemeral graph, ranked, and packed into a
//! token-bounded context.

pub mod assembly;
pub mod engine;
pub mod expansion;
pub mod ranking;

#[cfg(test)]
pub(crate) mod test_support;

pub use assembly::{AssembledContext, assemble, estimate_tokens};
pub use engine::{GraphRag, GraphRagResult};
pub use expansion::{ExpandedEdge, ExpandedGraph, expand};
pub use ranking::{RankedNode, Ranking, rank};
