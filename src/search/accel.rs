//! Accelerated similarity indexes
//!
//! Whether a model has an index is decided once, when the engine is built, and
//! recorded as an [`Acceleration`] value. Searches never probe for an index by
//! trying it and catching a failure.

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use super::semantic::SemanticHit;
use super::similarity::{dot, normalized};
use super::topk::TopK;
use crate::core::model::DocumentId;
use crate::error::Result;
use crate::storage::{ReadLimit, Store};

/// A prebuilt nearest-neighbour index over one model's embeddings.
pub trait SimilarityIndex: Send + Sync {
    fn model(&self) -> &str;

    fn dim(&self) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Best `k` admitted nodes by cosine similarity, best first.
    fn search(
        &self,
        query: &[f32],
        k: usize,
        admit: &dyn Fn(DocumentId) -> bool,
    ) -> Vec<SemanticHit>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Unavailable {
    #[error("model has no embeddings")]
    NoVectors,
    #[error("{count} embeddings exceed the in-memory limit of {max}")]
    TooLarge { count: usize, max: usize },
}

#[derive(Clone)]
pub enum Acceleration {
    Ready(Arc<dyn SimilarityIndex>),
    Unavailable(Unavailable),
}

impl Acceleration {
    pub fn index(&self) -> Option<&Arc<dyn SimilarityIndex>> {
        match self {
            Self::Ready(index) => Some(index),
            Self::Unavailable(_) => None,
        }
    }
}

impl std::fmt::Debug for Acceleration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready(index) => f
                .debug_struct("Ready")
                .field("model", &index.model())
                .field("len", &index.len())
                .finish(),
            Self::Unavailable(reason) => f.debug_tuple("Unavailable").field(reason).finish(),
        }
    }
}

#[derive(Debug, Clone)]
struct IndexEntry {
    node_id: String,
    node_rowid: i64,
    document_id: DocumentId,
}

/// Exact search over a contiguous matrix of pre-normalized vectors.
#[derive(Debug)]
pub struct InMemoryIndex {
    model: String,
    dim: usize,
    matrix: Vec<f32>,
    entries: Vec<IndexEntry>,
}

impl InMemoryIndex {
    /// Load `model` through the streaming reader. Zero-norm vectors are left out.
    pub fn build(
        store: &Store,
        model: &str,
        max_vectors: usize,
        limit: ReadLimit,
    ) -> Result<Acceleration> {
        let count = store
            .embedding_models()?
            .into_iter()
            .find(|m| m.model == model)
            .map_or(0, |m| m.count);
        if count == 0 {
            return Ok(Acceleration::Unavailable(Unavailable::NoVectors));
        }
        if count > max_vectors {
            return Ok(Acceleration::Unavailable(Unavailable::TooLarge {
                count,
                max: max_vectors,
            }));
        }

        let mut stream = store.stream_embeddings(model, limit)?;
        let dim = stream.dim();
        let mut matrix = Vec::with_capacity(count * dim);
        let mut entries = Vec::with_capacity(count);
        let mut skipped = 0usize;

        while let Some(batch) = stream.next_batch()? {
            for embedding in batch {
                let Some(unit) = normalized(&embedding.vector) else {
                    skipped += 1;
                    continue;
                };
                matrix.extend_from_slice(&unit);
                entries.push(IndexEntry {
                    node_id: embedding.node_id,
                    node_rowid: embedding.node_rowid,
                    document_id: embedding.document_id,
                });
            }
        }

        if entries.is_empty() {
            return Ok(Acceleration::Unavailable(Unavailable::NoVectors));
        }
        info!(model, vectors = entries.len(), dim, skipped, "built in-memory index");
        Ok(Acceleration::Ready(Arc::new(Self {
            model: model.to_string(),
            dim,
            matrix,
            entries,
        })))
    }
}

impl SimilarityIndex for InMemoryIndex {
    fn model(&self) -> &str {
        &self.model
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn search(
        &self,
        query: &[f32],
        k: usize,
        admit: &dyn Fn(DocumentId) -> bool,
    ) -> Vec<SemanticHit> {
        if query.len() != self.dim || k == 0 {
            return Vec::new();
        }
        let Some(query) = normalized(query) else {
            return Vec::new();
        };

        let mut top = TopK::new(k);
        for (entry, row) in self.entries.iter().zip(self.matrix.chunks_exact(self.dim)) {
            if !admit(entry.document_id) {
                continue;
            }
            let score = dot(&query, row);
            if score.is_finite() {
                top.push(score, entry);
            }
        }
        debug!(model = %self.model, kept = top.len(), "in-memory index search");

        top.into_sorted_vec()
            .into_iter()
            .map(|c| SemanticHit {
                node_id: c.item.node_id.clone(),
                node_rowid: c.item.node_rowid,
                document_id: c.item.document_id,
                score: c.score,
            })
            .collect()
    }
}
