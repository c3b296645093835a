//! Typed writes used by ingestion pipelines, plus node lookups for result
//! enrichment.

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use super::Store;
use crate::core::model::{
    CollectionId, DocumentId, DocumentRecord, NewDocument, NewNode, NodeRecord, TopicId,
};
use crate::error::{Error, Result};

impl Store {
    pub fn insert_document(&self, doc: &NewDocument) -> Result<DocumentId> {
        self.conn.execute(
            "INSERT INTO documents (project, source, title, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![doc.project, doc.source, doc.title, Utc::now().timestamp()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_document(&self, id: DocumentId) -> Result<Option<DocumentRecord>> {
        let doc = self
            .conn
            .query_row(
                "SELECT id, project, source, title, created_at FROM documents WHERE id = ?1",
                params![id],
                |row| {
                    Ok(DocumentRecord {
                        id: row.get(0)?,
                        project: row.get(1)?,
                        source: row.get(2)?,
                        title: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(doc)
    }

    /// Delete a document; nodes, their edges and embeddings cascade.
    pub fn delete_document(&self, id: DocumentId) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM documents WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    /// Insert a node. Returns its row id.
    pub fn insert_node(&self, node: &NewNode) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO nodes (full_id, document_id, kind, text, position) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![node.full_id, node.document_id, node.kind, node.text, node.position],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn node_by_full_id(&self, full_id: &str) -> Result<Option<NodeRecord>> {
        let node = self
            .conn
            .query_row(
                "SELECT id, full_id, document_id, kind, text, position FROM nodes WHERE full_id = ?1",
                params![full_id],
                node_from_row,
            )
            .optional()?;
        Ok(node)
    }

    pub fn node_by_rowid(&self, rowid: i64) -> Result<Option<NodeRecord>> {
        let node = self
            .conn
            .query_row(
                "SELECT id, full_id, document_id, kind, text, position FROM nodes WHERE id = ?1",
                params![rowid],
                node_from_row,
            )
            .optional()?;
        Ok(node)
    }

    pub(crate) fn node_rowid(&self, full_id: &str) -> Result<i64> {
        self.conn
            .query_row(
                "SELECT id FROM nodes WHERE full_id = ?1",
                params![full_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("node {}", full_id)))
    }

    /// Directed relation between two nodes, identified by full id.
    pub fn insert_edge(&self, source: &str, target: &str, relation: &str) -> Result<()> {
        let source_id = self.node_rowid(source)?;
        let target_id = self.node_rowid(target)?;
        self.conn.execute(
            "INSERT OR IGNORE INTO edges (source_id, target_id, relation) VALUES (?1, ?2, ?3)",
            params![source_id, target_id, relation],
        )?;
        Ok(())
    }

    pub fn create_topic(&self, project: &str, name: &str, shared: bool) -> Result<TopicId> {
        self.conn.execute(
            r#"
            INSERT INTO topics (project, name, shared) VALUES (?1, ?2, ?3)
            ON CONFLICT(project, name) DO UPDATE SET shared = excluded.shared
            "#,
            params![project, name, shared],
        )?;
        let id = self.conn.query_row(
            "SELECT id FROM topics WHERE project = ?1 AND name = ?2",
            params![project, name],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn link_topic(&self, topic: TopicId, document: DocumentId) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO topic_links (topic_id, document_id) VALUES (?1, ?2)",
            params![topic, document],
        )?;
        Ok(())
    }

    pub fn create_collection(&self, project: &str, name: &str) -> Result<CollectionId> {
        self.conn.execute(
            "INSERT OR IGNORE INTO collections (project, name) VALUES (?1, ?2)",
            params![project, name],
        )?;
        let id = self.conn.query_row(
            "SELECT id FROM collections WHERE project = ?1 AND name = ?2",
            params![project, name],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn add_collection_member(
        &self,
        collection: CollectionId,
        document: DocumentId,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO collection_members (collection_id, document_id) VALUES (?1, ?2)",
            params![collection, document],
        )?;
        Ok(())
    }
}

fn node_from_row(row: &Row<'_>) -> rusqlite::Result<NodeRecord> {
    Ok(NodeRecord {
        rowid: row.get(0)?,
        full_id: row.get(1)?,
        document_id: row.get(2)?,
        kind: row.get(3)?,
        text: row.get(4)?,
        position: row.get(5)?,
    })
}
