//! SQLite store for the knowledge graph
//!
//! One file holds documents, nodes, edges, topics, collections, the FTS5 index
//! over node text and the embedding vectors. Opening the store applies pending
//! migrations and probes optional SQLite capabilities once.

use rusqlite::Connection;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::Result;

pub mod migrations;
pub mod records;
pub mod vectors;

pub use vectors::{EmbeddingModelInfo, EmbeddingStream, ReadLimit, StoredEmbedding};

/// SQLite features detected when the store was opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    pub sqlite_version: String,
    pub fts5: bool,
}

/// Knowledge graph store
pub struct Store {
    conn: Connection,
    path: Option<PathBuf>,
    schema_version: u32,
    capabilities: Capabilities,
}

impl Store {
    /// Open or create the store at `path`, applying pending migrations.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::init(conn, Some(path.to_path_buf()))
    }

    /// Open in-memory store (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, None)
    }

    fn init(mut conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        configure_pragmas(&conn)?;
        let capabilities = probe_capabilities(&conn)?;
        let schema_version = migrations::run_migrations(&mut conn)?;
        debug!(?path, schema_version, fts5 = capabilities.fts5, "store opened");

        Ok(Self {
            conn,
            path,
            schema_version,
            capabilities,
        })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let count = |table: &str| -> Result<usize> {
            let n: i64 = self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                    row.get(0)
                })?;
            Ok(n as usize)
        };

        Ok(StoreStats {
            schema_version: self.schema_version,
            document_count: count("documents")?,
            node_count: count("nodes")?,
            edge_count: count("edges")?,
            topic_count: count("topics")?,
            collection_count: count("collections")?,
            embedding_count: count("embeddings")?,
            models: self.embedding_models()?,
        })
    }
}

/// Store statistics
#[derive(Debug, Clone)]
pub struct StoreStats {
    pub schema_version: u32,
    pub document_count: usize,
    pub node_count: usize,
    pub edge_count: usize,
    pub topic_count: usize,
    pub collection_count: usize,
    pub embedding_count: usize,
    pub models: Vec<EmbeddingModelInfo>,
}

fn configure_pragmas(conn: &Connection) -> Result<()> {
    // journal_mode returns a row, so it goes through query_row.
    let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.execute_batch(
        "PRAGMA synchronous = NORMAL;
         PRAGMA foreign_keys = ON;
         PRAGMA temp_store = MEMORY;",
    )?;
    Ok(())
}

fn probe_capabilities(conn: &Connection) -> Result<Capabilities> {
    let sqlite_version: String = conn.query_row("SELECT sqlite_version()", [], |row| row.get(0))?;
    let fts5: bool = conn.query_row(
        "SELECT sqlite_compileoption_used('ENABLE_FTS5')",
        [],
        |row| row.get(0),
    )?;
    Ok(Capabilities {
        sqlite_version,
        fts5,
    })
}
