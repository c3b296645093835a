pub mod init;
pub mod search;
pub mod semantic_search;
pub mod status;

use anyhow::{Context, Result};
use colored::Colorize;

use elysium_search::{Scope, SearchConfig, SearchEngine, SearchResult, StorePaths};

use crate::ScopeArgs;

impl ScopeArgs {
    /// `None` without `--project`: search the whole store.
    pub fn to_scope(&self) -> Option<Scope> {
        let project = self.project.as_ref()?;
        Some(
            Scope::project(project.clone())
                .in_collections(self.collections.iter().copied())
                .with_topics(self.topics.iter().copied())
                .without_topics(self.exclude_topics.iter().copied())
                .with_shared(self.shared),
        )
    }
}

/// Load the config and open the engine for the current directory.
pub fn open_engine() -> Result<SearchEngine> {
    let paths = StorePaths::new();
    let config = SearchConfig::load(&paths).context("Failed to load config")?;
    let db_path = config.db_path(&paths);
    SearchEngine::open(&paths, config)
        .with_context(|| format!("Failed to open store at {}", db_path.display()))
}

pub fn print_results(results: &[SearchResult], label: &str, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("{} No results found for: {}", "→".dimmed(), label.cyan());
        return Ok(());
    }

    println!(
        "{} {} results for: {}",
        "→".dimmed(),
        results.len(),
        label.cyan()
    );
    println!();

    for (i, result) in results.iter().enumerate() {
        println!(
            "{}. [{}] {} {}",
            (i + 1).to_string().bold(),
            format!("{:.3}", result.score).dimmed(),
            result.node_id.cyan(),
            format!("({}, doc {})", result.kind, result.document_id).dimmed()
        );
        if !result.snippet.is_empty() {
            println!("   {}", result.snippet);
        }
        println!();
    }

    Ok(())
}
