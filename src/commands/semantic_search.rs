//! Semantic Search command - nearest stored embeddings to a query vector

use anyhow::Result;

use super::{open_engine, print_results};
use crate::ScopeArgs;
use elysium_search::SearchRequest;

pub fn run(
    vector: &[f32],
    model: &str,
    scope: &ScopeArgs,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let engine = open_engine()?;
    let k = limit.unwrap_or(engine.config().default_k);

    let request = SearchRequest::semantic(scope.to_scope(), vector.to_vec(), model, k);
    let results = engine.search(&request)?;
    print_results(&results, &format!("{} [{} dims]", model, vector.len()), json)
}
