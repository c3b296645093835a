//! Full-text search over node text (FTS5 + BM25).

use rusqlite::{params, Connection};
use tracing::debug;

use super::scope::ScopeSets;
use super::snippet::Highlighter;
use super::{MatchSource, SearchResult};
use crate::core::config::SearchConfig;
use crate::error::{Error, Result};

/// Bounds applied to raw query text before it reaches FTS5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryLimits {
    pub max_terms: usize,
    pub max_chars: usize,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            max_terms: 32,
            max_chars: 1024,
        }
    }
}

impl From<&SearchConfig> for QueryLimits {
    fn from(config: &SearchConfig) -> Self {
        Self {
            max_terms: config.max_query_terms,
            max_chars: config.max_query_chars,
        }
    }
}

/// A query made safe for `MATCH`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FtsQuery {
    /// Every term as a quoted FTS5 string, joined by implicit AND.
    pub expression: String,
    pub terms: Vec<String>,
}

/// Tokenize `raw` on non-alphanumeric characters and quote every token.
///
/// FTS5 operators (`AND`, `OR`, `NOT`, `NEAR`, `*`, `^`, `:`, parentheses,
/// quotes) never survive as syntax. `Ok(None)` when nothing searchable is left.
pub fn sanitize(raw: &str, limits: QueryLimits) -> Result<Option<FtsQuery>> {
    let chars = raw.chars().count();
    if chars > limits.max_chars {
        return Err(Error::InvalidQuery(format!(
            "query is {} characters long, the limit is {}",
            chars, limits.max_chars
        )));
    }

    let terms: Vec<String> = raw
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();
    if terms.len() > limits.max_terms {
        return Err(Error::InvalidQuery(format!(
            "query has {} terms, the limit is {}",
            terms.len(),
            limits.max_terms
        )));
    }
    if terms.is_empty() {
        return Ok(None);
    }

    let expression = terms
        .iter()
        .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" ");
    Ok(Some(FtsQuery { expression, terms }))
}

/// Best `k` nodes matching `query` that the scope admits, BM25 order.
/// Without a scope every node is a candidate.
///
/// Rows are filtered in rank order, so scope never lets a worse node displace
/// a better admissible one. Ties fall back to node insertion order.
pub fn search_lexical(
    conn: &Connection,
    query: &FtsQuery,
    scope: Option<&ScopeSets>,
    k: usize,
    snippet_len: usize,
) -> Result<Vec<SearchResult>> {
    if k == 0 || scope.is_some_and(ScopeSets::is_empty) {
        return Ok(Vec::new());
    }

    let highlighter = Highlighter::new(&query.terms);
    let mut stmt = conn
        .prepare_cached(
            r#"
            SELECT n.id, n.full_id, n.document_id, n.kind, n.text, bm25(nodes_fts) AS rank
            FROM nodes_fts
            JOIN nodes n ON n.id = nodes_fts.rowid
            WHERE nodes_fts MATCH ?1
            ORDER BY rank, n.id
            "#,
        )
        .map_err(Error::Search)?;
    let mut rows = stmt.query(params![query.expression]).map_err(Error::Search)?;

    let mut results = Vec::with_capacity(k.min(64));
    let mut scanned = 0usize;
    while let Some(row) = rows.next().map_err(Error::Search)? {
        scanned += 1;
        let document_id = row.get(2).map_err(Error::Search)?;
        if scope.is_some_and(|sets| !sets.admits(document_id)) {
            continue;
        }

        let text: String = row.get(4).map_err(Error::Search)?;
        let rank: f64 = row.get(5).map_err(Error::Search)?;
        results.push(SearchResult {
            node_id: row.get(1).map_err(Error::Search)?,
            node_rowid: row.get(0).map_err(Error::Search)?,
            document_id,
            kind: row.get(3).map_err(Error::Search)?,
            // bm25() is lower-is-better; flip so every mode ranks high-to-low.
            score: -rank as f32,
            source: MatchSource::Lexical,
            snippet: highlighter.snippet(&text, snippet_len),
        });
        if results.len() == k {
            break;
        }
    }

    debug!(
        terms = query.terms.len(),
        scanned,
        returned = results.len(),
        "lexical search"
    );
    Ok(results)
}
