mod commands;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "elysium-search")]
#[command(about = "Hybrid search over a personal knowledge graph", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON on stderr
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Which part of the graph a query may see.
#[derive(Args, Debug, Clone)]
pub struct ScopeArgs {
    #[arg(long, short, help = "Project to search (default: the whole store)")]
    pub project: Option<String>,
    #[arg(long = "collection", requires = "project", help = "Only members of these collection ids")]
    pub collections: Vec<i64>,
    #[arg(long = "topic", requires = "project", help = "Only documents linked to these topic ids")]
    pub topics: Vec<i64>,
    #[arg(long = "exclude-topic", requires = "project", help = "Drop documents linked to these topic ids")]
    pub exclude_topics: Vec<i64>,
    #[arg(long, requires = "project", help = "Include documents of shared topics")]
    pub shared: bool,
}

#[derive(Subcommand)]
enum Commands {
    // ===== Store =====
    /// Create the store and a default config
    Init {
        #[arg(long, help = "Overwrite an existing config file")]
        force: bool,
    },
    /// Show schema version, counts and capabilities
    Status {
        #[arg(long, help = "JSON output")]
        json: bool,
    },

    // ===== Search =====
    /// Full-text search; hybrid when --vector and --model are given
    Search {
        query: String,
        #[command(flatten)]
        scope: ScopeArgs,
        #[arg(long, short = 'k', help = "Number of results")]
        limit: Option<usize>,
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true, help = "Query vector, comma separated")]
        vector: Option<Vec<f32>>,
        #[arg(long, help = "Embedding model of --vector")]
        model: Option<String>,
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// Vector similarity search over stored embeddings
    #[command(name = "semantic-search", alias = "ss")]
    SemanticSearch {
        #[arg(long, required = true, value_delimiter = ',', allow_hyphen_values = true, help = "Query vector, comma separated")]
        vector: Vec<f32>,
        #[arg(long, help = "Embedding model")]
        model: String,
        #[command(flatten)]
        scope: ScopeArgs,
        #[arg(long, short = 'k', help = "Number of results")]
        limit: Option<usize>,
        #[arg(long, help = "JSON output")]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json_logs);

    match cli.command {
        Commands::Init { force } => commands::init::run(force),
        Commands::Status { json } => commands::status::run(json),
        Commands::Search {
            query,
            scope,
            limit,
            vector,
            model,
            json,
        } => commands::search::run(&query, &scope, limit, vector, model, json),
        Commands::SemanticSearch {
            vector,
            model,
            scope,
            limit,
            json,
        } => commands::semantic_search::run(&vector, &model, &scope, limit, json),
    }
}

fn init_tracing(verbose: u8, json: bool) {
    let filter = match verbose {
        0 => "warn,elysium_search=info",
        1 => "info,elysium_search=debug",
        2 => "debug,elysium_search=trace",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
