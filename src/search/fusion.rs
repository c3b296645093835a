//! RRF (Reciprocal Rank Fusion) for hybrid search

use std::collections::HashMap;

use super::{MatchSource, SearchResult};
use crate::core::config::HybridConfig;

/// Reciprocal Rank Fusion parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RrfConfig {
    /// K parameter (default: 60)
    pub k: f32,
    pub lexical_weight: f32,
    pub semantic_weight: f32,
}

impl Default for RrfConfig {
    fn default() -> Self {
        Self::from(&HybridConfig::default())
    }
}

impl From<&HybridConfig> for RrfConfig {
    fn from(config: &HybridConfig) -> Self {
        Self {
            k: config.rrf_k,
            lexical_weight: config.lexical_weight,
            semantic_weight: config.semantic_weight,
        }
    }
}

struct Fused {
    result: SearchResult,
    score: f32,
    best_rank: usize,
}

/// Fuse two ranked lists: each hit contributes `weight / (k + rank)`, rank
/// starting at 1. Ties go to the better single-list rank, then the node id.
///
/// A node found by both keeps the lexical copy, which carries the highlighted
/// snippet.
pub fn rrf_fuse(
    lexical: Vec<SearchResult>,
    semantic: Vec<SearchResult>,
    config: &RrfConfig,
    limit: usize,
) -> Vec<SearchResult> {
    let mut fused: HashMap<String, Fused> = HashMap::new();

    for (list, weight) in [
        (lexical, config.lexical_weight),
        (semantic, config.semantic_weight),
    ] {
        for (idx, result) in list.into_iter().enumerate() {
            let rank = idx + 1;
            let contribution = weight / (config.k + rank as f32);
            fused
                .entry(result.node_id.clone())
                .and_modify(|f| {
                    f.score += contribution;
                    f.best_rank = f.best_rank.min(rank);
                })
                .or_insert(Fused {
                    result,
                    score: contribution,
                    best_rank: rank,
                });
        }
    }

    let mut ranked: Vec<Fused> = fused.into_values().collect();
    ranked.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.best_rank.cmp(&b.best_rank))
            .then_with(|| a.result.node_id.cmp(&b.result.node_id))
    });
    ranked.truncate(limit);

    ranked
        .into_iter()
        .map(|f| SearchResult {
            score: f.score,
            source: MatchSource::Hybrid,
            ..f.result
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: &str, source: MatchSource, snippet: &str) -> SearchResult {
        SearchResult {
            node_id: id.to_string(),
            node_rowid: 0,
            document_id: 1,
            kind: "chunk".to_string(),
            score: 0.0,
            source,
            snippet: snippet.to_string(),
        }
    }

    fn lex(ids: &[&str]) -> Vec<SearchResult> {
        ids.iter()
            .map(|id| hit(id, MatchSource::Lexical, "**lexical**"))
            .collect()
    }

    fn sem(ids: &[&str]) -> Vec<SearchResult> {
        ids.iter()
            .map(|id| hit(id, MatchSource::Semantic, "preview"))
            .collect()
    }

    #[test]
    fn test_overlap_ranks_first() {
        let fused = rrf_fuse(lex(&["a", "b"]), sem(&["c", "b"]), &RrfConfig::default(), 10);
        assert_eq!(fused[0].node_id, "b");
        assert_eq!(fused.len(), 3);
        assert!(fused.iter().all(|r| r.source == MatchSource::Hybrid));
        let expected = 1.0 / 62.0 + 1.0 / 62.0;
        assert!((fused[0].score - expected).abs() < 1e-6);
    }

    #[test]
    fn test_both_lists_keep_lexical_snippet() {
        let fused = rrf_fuse(lex(&["x"]), sem(&["x"]), &RrfConfig::default(), 10);
        assert_eq!(fused[0].snippet, "**lexical**");
    }

    #[test]
    fn test_ties_break_on_best_rank_then_id() {
        // a and c both score 1/(k+1), b and d both 1/(k+2).
        let fused = rrf_fuse(lex(&["c", "d"]), sem(&["a", "b"]), &RrfConfig::default(), 10);
        let ids: Vec<&str> = fused.iter().map(|r| r.node_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "b", "d"]);
    }

    #[test]
    fn test_weights_and_limit() {
        let config = RrfConfig {
            k: 60.0,
            lexical_weight: 0.0,
            semantic_weight: 1.0,
        };
        let fused = rrf_fuse(lex(&["a"]), sem(&["b", "c"]), &config, 2);
        let ids: Vec<&str> = fused.iter().map(|r| r.node_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn test_empty_inputs() {
        assert!(rrf_fuse(Vec::new(), Vec::new(), &RrfConfig::default(), 5).is_empty());
        assert_eq!(rrf_fuse(lex(&["a"]), Vec::new(), &RrfConfig::default(), 5).len(), 1);
    }
}
