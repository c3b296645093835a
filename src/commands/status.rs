use anyhow::Result;
use colored::*;
use serde::Serialize;

use super::open_engine;
use elysium_search::search::Acceleration;

#[derive(Serialize)]
struct StoreStatus {
    db_path: Option<String>,
    schema_version: u32,
    sqlite_version: String,
    fts5: bool,
    documents: usize,
    nodes: usize,
    edges: usize,
    topics: usize,
    collections: usize,
    embeddings: usize,
    models: Vec<ModelStatus>,
}

#[derive(Serialize)]
struct ModelStatus {
    model: String,
    dim: usize,
    count: usize,
    accelerated: Option<String>,
}

pub fn run(json: bool) -> Result<()> {
    let engine = open_engine()?;
    let store = engine.store();
    let stats = store.stats()?;
    let capabilities = store.capabilities();

    let models = stats
        .models
        .iter()
        .map(|m| ModelStatus {
            model: m.model.clone(),
            dim: m.dim,
            count: m.count,
            accelerated: engine.acceleration(&m.model).map(|a| match a {
                Acceleration::Ready(_) => "ready".to_string(),
                Acceleration::Unavailable(reason) => format!("unavailable: {}", reason),
            }),
        })
        .collect();

    let status = StoreStatus {
        db_path: store.path().map(|p| p.display().to_string()),
        schema_version: stats.schema_version,
        sqlite_version: capabilities.sqlite_version.clone(),
        fts5: capabilities.fts5,
        documents: stats.document_count,
        nodes: stats.node_count,
        edges: stats.edge_count,
        topics: stats.topic_count,
        collections: stats.collection_count,
        embeddings: stats.embedding_count,
        models,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        print_status(&status);
    }

    Ok(())
}

fn print_status(status: &StoreStatus) {
    println!("{}", "Store Status".bold());
    println!("{}", "=".repeat(50));
    println!();
    if let Some(path) = &status.db_path {
        println!("Store:  {}", path);
    }
    println!("Schema: v{}", status.schema_version);
    println!(
        "SQLite: {} (FTS5 {})",
        status.sqlite_version,
        if status.fts5 { "✓".green() } else { "✗".red() }
    );
    println!();

    println!("{}", "Records".cyan());
    println!("{}", "-".repeat(30));
    println!("   {:<12} {:>8}", "Documents", status.documents);
    println!("   {:<12} {:>8}", "Nodes", status.nodes);
    println!("   {:<12} {:>8}", "Edges", status.edges);
    println!("   {:<12} {:>8}", "Topics", status.topics);
    println!("   {:<12} {:>8}", "Collections", status.collections);
    println!("   {:<12} {:>8}", "Embeddings", status.embeddings);
    println!();

    if !status.models.is_empty() {
        println!("{}", "Embedding models".cyan());
        println!("{}", "-".repeat(30));
        for m in &status.models {
            let accel = m.accelerated.as_deref().unwrap_or("streaming");
            println!(
                "   {:<20} dim {:>5} {:>8} vectors  {}",
                m.model,
                m.dim,
                m.count,
                accel.dimmed()
            );
        }
    }
}
