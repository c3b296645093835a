//! Hybrid search over the knowledge graph
//!
//! Lexical: FTS5 + BM25 with highlighted snippets
//! Semantic: streaming brute force, or an accelerated index when one is built
//! Hybrid: both, fused with RRF

use serde::Serialize;

use crate::core::model::DocumentId;

pub mod accel;
pub mod engine;
pub mod fusion;
pub mod lexical;
pub mod scope;
pub mod semantic;
pub mod similarity;
pub mod snippet;
pub mod topk;

pub use accel::{Acceleration, InMemoryIndex, SimilarityIndex, Unavailable};
pub use engine::{SearchEngine, SearchEngineBuilder, SearchMode, SearchRequest};
pub use scope::{CacheStats, Clock, ManualClock, ScopeResolver, ScopeSets, SystemClock};
pub use semantic::SemanticHit;

/// Which ranking produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchSource {
    Lexical,
    Semantic,
    Hybrid,
}

/// One ranked node. Higher `score` is better within a single result list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub node_id: String,
    #[serde(skip)]
    pub node_rowid: i64,
    pub document_id: DocumentId,
    pub kind: String,
    pub score: f32,
    pub source: MatchSource,
    pub snippet: String,
}
