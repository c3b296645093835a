//! Search command - full-text search, hybrid when a query vector is given

use anyhow::{bail, Result};

use super::{open_engine, print_results};
use crate::ScopeArgs;
use elysium_search::SearchRequest;

pub fn run(
    query: &str,
    scope: &ScopeArgs,
    limit: Option<usize>,
    vector: Option<Vec<f32>>,
    model: Option<String>,
    json: bool,
) -> Result<()> {
    let engine = open_engine()?;
    let k = limit.unwrap_or(engine.config().default_k);

    let request = match (vector, model) {
        (Some(vector), Some(model)) => {
            SearchRequest::hybrid(scope.to_scope(), query, vector, model, k)
        }
        (None, None) => SearchRequest::lexical(scope.to_scope(), query, k),
        _ => bail!("--vector and --model must be given together"),
    };

    let results = engine.search(&request)?;
    print_results(&results, query, json)
}
