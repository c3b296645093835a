//! Forward-only schema migrations.
//!
//! The applied version lives in `PRAGMA user_version` inside the store file,
//! so the database stays a single self-describing artifact. Each migration and
//! its version bump commit in one transaction.

use chrono::Utc;
use rusqlite::{params, Connection};
use tracing::{debug, info};

use crate::error::{Error, Result};

pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub sql: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "graph_tables",
        sql: r#"
        CREATE TABLE schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL
        );

        CREATE TABLE documents (
            id INTEGER PRIMARY KEY,
            project TEXT NOT NULL,
            source TEXT NOT NULL,
            title TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );

        CREATE TABLE nodes (
            id INTEGER PRIMARY KEY,
            full_id TEXT NOT NULL UNIQUE,
            document_id INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
            kind TEXT NOT NULL,
            text TEXT NOT NULL,
            position INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE edges (
            source_id INTEGER NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
            target_id INTEGER NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
            relation TEXT NOT NULL,
            PRIMARY KEY (source_id, target_id, relation)
        );

        CREATE TABLE topics (
            id INTEGER PRIMARY KEY,
            project TEXT NOT NULL,
            name TEXT NOT NULL,
            shared INTEGER NOT NULL DEFAULT 0,
            UNIQUE (project, name)
        );

        CREATE TABLE topic_links (
            topic_id INTEGER NOT NULL REFERENCES topics(id) ON DELETE CASCADE,
            document_id INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
            PRIMARY KEY (topic_id, document_id)
        );

        CREATE TABLE collections (
            id INTEGER PRIMARY KEY,
            project TEXT NOT NULL,
            name TEXT NOT NULL,
            UNIQUE (project, name)
        );

        CREATE TABLE collection_members (
            collection_id INTEGER NOT NULL REFERENCES collections(id) ON DELETE CASCADE,
            document_id INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
            PRIMARY KEY (collection_id, document_id)
        );

        CREATE INDEX idx_documents_project ON documents(project);
        CREATE INDEX idx_nodes_document ON nodes(document_id, position);
        CREATE INDEX idx_nodes_kind ON nodes(kind);
        CREATE INDEX idx_edges_target ON edges(target_id);
        CREATE INDEX idx_topics_shared ON topics(shared);
        CREATE INDEX idx_topic_links_topic ON topic_links(topic_id);
        CREATE INDEX idx_topic_links_document ON topic_links(document_id);
        CREATE INDEX idx_collections_project ON collections(project);
        CREATE INDEX idx_collection_members_collection ON collection_members(collection_id);
        "#,
    },
    Migration {
        version: 2,
        name: "nodes_fts",
        sql: r#"
        CREATE VIRTUAL TABLE nodes_fts USING fts5(
            text,
            content = 'nodes',
            content_rowid = 'id',
            tokenize = 'unicode61 remove_diacritics 2'
        );

        CREATE TRIGGER nodes_fts_insert AFTER INSERT ON nodes BEGIN
            INSERT INTO nodes_fts(rowid, text) VALUES (new.id, new.text);
        END;

        CREATE TRIGGER nodes_fts_delete AFTER DELETE ON nodes BEGIN
            INSERT INTO nodes_fts(nodes_fts, rowid, text) VALUES ('delete', old.id, old.text);
        END;

        CREATE TRIGGER nodes_fts_update AFTER UPDATE OF text ON nodes BEGIN
            INSERT INTO nodes_fts(nodes_fts, rowid, text) VALUES ('delete', old.id, old.text);
            INSERT INTO nodes_fts(rowid, text) VALUES (new.id, new.text);
        END;

        INSERT INTO nodes_fts(nodes_fts) VALUES ('rebuild');
        "#,
    },
    Migration {
        version: 3,
        name: "embeddings",
        sql: r#"
        CREATE TABLE embedding_models (
            model TEXT PRIMARY KEY,
            dim INTEGER NOT NULL CHECK (dim > 0)
        );

        CREATE TABLE embeddings (
            id INTEGER PRIMARY KEY,
            node_id INTEGER NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
            model TEXT NOT NULL REFERENCES embedding_models(model),
            vector BLOB NOT NULL,
            updated_at INTEGER NOT NULL
        );

        CREATE UNIQUE INDEX idx_embeddings_node_model ON embeddings(node_id, model);
        CREATE INDEX idx_embeddings_model ON embeddings(model, id);
        "#,
    },
];

/// Latest schema version this build understands.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}

pub fn current_version(conn: &Connection) -> Result<u32> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    Ok(u32::try_from(version).unwrap_or(0))
}

/// Apply every pending migration. Returns the resulting schema version.
pub fn run_migrations(conn: &mut Connection) -> Result<u32> {
    apply(conn, MIGRATIONS)
}

pub(crate) fn apply(conn: &mut Connection, migrations: &[Migration]) -> Result<u32> {
    let mut version = current_version(conn)?;
    let supported = migrations.last().map(|m| m.version).unwrap_or(0);
    if version > supported {
        return Err(Error::SchemaTooNew {
            found: version,
            supported,
        });
    }

    let start = version;
    for migration in migrations.iter().filter(|m| m.version > start) {
        apply_one(conn, migration).map_err(|source| Error::SchemaMigration {
            version: migration.version,
            name: migration.name,
            source,
        })?;
        info!(
            version = migration.version,
            name = migration.name,
            "applied schema migration"
        );
        version = migration.version;
    }

    debug!(version, "schema up to date");
    Ok(version)
}

fn apply_one(conn: &mut Connection, migration: &Migration) -> rusqlite::Result<()> {
    let tx = conn.transaction()?;
    tx.execute_batch(migration.sql)?;
    tx.execute(
        "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
        params![migration.version, migration.name, Utc::now().to_rfc3339()],
    )?;
    tx.pragma_update(None, "user_version", migration.version)?;
    tx.commit()
}
