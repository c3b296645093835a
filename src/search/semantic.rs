//! Streaming brute-force vector search
//!
//! Embeddings are pulled from the store one batch at a time, filtered by
//! scope before decoding, and scored against the query. Only the current batch
//! and a size-`k` heap of ids are ever held, so memory stays O(batch + k)
//! regardless of how many vectors the model has.

use tracing::debug;

use super::scope::ScopeSets;
use super::similarity::{dot, norm, normalized};
use super::topk::TopK;
use crate::core::model::DocumentId;
use crate::error::{Error, Result};
use crate::storage::{ReadLimit, Store};

#[derive(Debug, Clone, PartialEq)]
pub struct SemanticHit {
    pub node_id: String,
    pub node_rowid: i64,
    pub document_id: DocumentId,
    pub score: f32,
}

/// Registered dimension of `model` after checking the query against it.
///
/// `Ok(None)` for a model that has never stored a vector.
pub fn check_query(store: &Store, model: &str, query: &[f32]) -> Result<Option<usize>> {
    match store.model_dim(model)? {
        Some(dim) if dim != query.len() => Err(Error::VectorFormat {
            expected: dim,
            actual: query.len(),
        }),
        other => Ok(other),
    }
}

/// Best `k` embeddings of `model` by cosine similarity, read batch by batch.
/// `scope` of `None` scores every stored vector.
pub fn stream_search(
    store: &Store,
    model: &str,
    query: &[f32],
    scope: Option<&ScopeSets>,
    k: usize,
    limit: ReadLimit,
) -> Result<Vec<SemanticHit>> {
    if check_query(store, model, query)?.is_none() {
        debug!(model, "no embeddings for model");
        return Ok(Vec::new());
    }
    if k == 0 || scope.is_some_and(ScopeSets::is_empty) {
        return Ok(Vec::new());
    }
    let Some(query) = normalized(query) else {
        debug!(model, "zero-norm query vector");
        return Ok(Vec::new());
    };

    let mut stream = store.stream_embeddings(model, limit)?;
    if let Some(sets) = scope {
        stream = stream.filter_documents(move |doc| sets.admits(doc));
    }
    let mut top = TopK::new(k);
    let mut scanned = 0usize;
    let mut skipped = 0usize;

    while let Some(batch) = stream.next_batch()? {
        for embedding in batch {
            scanned += 1;
            let n = norm(&embedding.vector);
            if !(n > 0.0 && n.is_finite()) {
                skipped += 1;
                continue;
            }
            let score = dot(&query, &embedding.vector) / n;
            if !score.is_finite() {
                skipped += 1;
                continue;
            }
            top.push(
                score,
                (embedding.node_id, embedding.node_rowid, embedding.document_id),
            );
        }
    }

    debug!(
        model,
        batches = stream.batches_read(),
        scanned,
        skipped,
        kept = top.len(),
        "streamed semantic search"
    );

    Ok(top
        .into_sorted_vec()
        .into_iter()
        .map(|c| {
            let (node_id, node_rowid, document_id) = c.item;
            SemanticHit {
                node_id,
                node_rowid,
                document_id,
                score: c.score,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::Scope;
    use crate::search::scope::ScopeResolver;
    use crate::test_support::{add_note, seed_vectors};
    use std::time::Duration;

    fn brain(store: &Store) -> ScopeSets {
        ScopeResolver::new(Duration::from_secs(60))
            .resolve(store, &Scope::project("brain"))
            .unwrap()
            .as_ref()
            .clone()
    }

    #[test]
    fn test_reference_scenario() {
        let store = Store::open_in_memory().unwrap();
        seed_vectors(&store, "m", &[vec![1.0, 0.0], vec![0.0, 1.0], vec![0.9, 0.1]]);

        let hits = stream_search(
            &store,
            "m",
            &[1.0, 0.0],
            Some(&brain(&store)),
            2,
            ReadLimit::batch(1),
        )
        .unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].node_id, "v0");
        assert!((hits[0].score - 1.0).abs() < 1e-6);
        assert_eq!(hits[1].node_id, "v2");
        assert!((hits[1].score - 0.9939).abs() < 1e-3);
    }

    #[test]
    fn test_returns_min_k_n_sorted() {
        let store = Store::open_in_memory().unwrap();
        let vectors: Vec<Vec<f32>> = (0..25).map(|i| vec![1.0, i as f32 * 0.1]).collect();
        seed_vectors(&store, "m", &vectors);
        let sets = brain(&store);

        for (k, expected) in [(5, 5), (25, 25), (100, 25)] {
            let hits =
                stream_search(&store, "m", &[1.0, 0.0], Some(&sets), k, ReadLimit::batch(4)).unwrap();
            assert_eq!(hits.len(), expected);
            assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
            assert_eq!(hits[0].node_id, "v0");
        }
    }

    #[test]
    fn test_batch_size_does_not_change_results() {
        let store = Store::open_in_memory().unwrap();
        let vectors: Vec<Vec<f32>> = (0..40)
            .map(|i| vec![(i as f32).sin(), (i as f32).cos(), 0.5])
            .collect();
        seed_vectors(&store, "m", &vectors);
        let sets = brain(&store);
        let query = [0.3, -0.2, 0.9];

        let reference = stream_search(&store, "m", &query, Some(&sets), 7, ReadLimit::Unbounded).unwrap();
        for batch in [1, 3, 16, 64] {
            let hits =
                stream_search(&store, "m", &query, Some(&sets), 7, ReadLimit::batch(batch)).unwrap();
            assert_eq!(hits, reference, "batch size {}", batch);
        }
    }

    #[test]
    fn test_equal_scores_keep_storage_order() {
        let store = Store::open_in_memory().unwrap();
        seed_vectors(
            &store,
            "m",
            &[vec![0.0, 1.0], vec![2.0, 0.0], vec![1.0, 0.0], vec![3.0, 0.0]],
        );
        let hits =
            stream_search(&store, "m", &[1.0, 0.0], Some(&brain(&store)), 2, ReadLimit::batch(2))
                .unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.node_id.as_str()).collect();
        assert_eq!(ids, vec!["v1", "v2"]);
    }

    #[test]
    fn test_zero_norm_vectors_skipped() {
        let store = Store::open_in_memory().unwrap();
        seed_vectors(&store, "m", &[vec![0.0, 0.0], vec![0.5, 0.5]]);
        let hits =
            stream_search(&store, "m", &[1.0, 0.0], Some(&brain(&store)), 5, ReadLimit::default())
                .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].node_id, "v1");

        let none =
            stream_search(&store, "m", &[0.0, 0.0], Some(&brain(&store)), 5, ReadLimit::default())
                .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_dimension_mismatch_and_unknown_model() {
        let store = Store::open_in_memory().unwrap();
        seed_vectors(&store, "m", &[vec![1.0, 0.0]]);
        let sets = brain(&store);

        let err = stream_search(&store, "m", &[1.0, 0.0, 0.0], Some(&sets), 5, ReadLimit::default())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::VectorFormat {
                expected: 2,
                actual: 3
            }
        ));
        assert!(stream_search(&store, "other", &[1.0], Some(&sets), 5, ReadLimit::default())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_scope_filters_rows() {
        let store = Store::open_in_memory().unwrap();
        seed_vectors(&store, "m", &[vec![0.5, 0.5]]);
        add_note(&store, "work", "w.md", "work note");
        store.put_embedding("w.md#0", "m", &[1.0, 0.0]).unwrap();

        let hits =
            stream_search(&store, "m", &[1.0, 0.0], Some(&brain(&store)), 5, ReadLimit::default())
                .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].node_id, "v0");
    }

    #[test]
    fn test_unscoped_scores_every_vector() {
        let store = Store::open_in_memory().unwrap();
        seed_vectors(&store, "m", &[vec![0.5, 0.5]]);
        add_note(&store, "work", "w.md", "work note");
        store.put_embedding("w.md#0", "m", &[1.0, 0.0]).unwrap();

        let hits =
            stream_search(&store, "m", &[1.0, 0.0], None, 5, ReadLimit::default()).unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.node_id.as_str()).collect();
        assert_eq!(ids, vec!["w.md#0", "v0"]);
    }
}
