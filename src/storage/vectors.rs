//! Embedding storage
//!
//! Vectors are little-endian `f32` BLOBs keyed by `(node, model)`. The first
//! vector stored for a model fixes that model's dimensionality; every later
//! write and every read is checked against it.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::VecDeque;
use std::num::NonZeroUsize;
use tracing::{debug, warn};

use super::Store;
use crate::core::model::DocumentId;
use crate::error::{Error, Result};

pub const DEFAULT_BATCH_SIZE: usize = 1024;

/// How many rows a streaming read may pull per round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadLimit {
    Batch(NonZeroUsize),
    /// Everything in one batch. Only reachable through an explicit opt-in.
    Unbounded,
}

impl ReadLimit {
    /// Interpret a caller-supplied limit. `limit <= 0` means "load everything"
    /// and is refused unless `allow_unbounded` is set.
    pub fn from_request(limit: i64, allow_unbounded: bool) -> Result<Self> {
        if limit > 0 {
            let n = usize::try_from(limit).unwrap_or(usize::MAX);
            return Ok(NonZeroUsize::new(n).map_or(Self::default(), Self::Batch));
        }
        if allow_unbounded {
            warn!(
                limit,
                "unbounded embedding read requested; the whole model will be loaded into memory"
            );
            return Ok(Self::Unbounded);
        }
        Err(Error::UnboundedRead(limit))
    }

    pub fn batch(size: usize) -> Self {
        NonZeroUsize::new(size).map_or(Self::default(), Self::Batch)
    }

    fn sql_limit(self) -> i64 {
        match self {
            Self::Batch(n) => i64::try_from(n.get()).unwrap_or(i64::MAX),
            Self::Unbounded => -1,
        }
    }
}

impl Default for ReadLimit {
    fn default() -> Self {
        match NonZeroUsize::new(DEFAULT_BATCH_SIZE) {
            Some(n) => Self::Batch(n),
            None => Self::Unbounded,
        }
    }
}

/// One embedding row, joined with its node.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEmbedding {
    pub node_rowid: i64,
    pub node_id: String,
    pub document_id: DocumentId,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddingModelInfo {
    pub model: String,
    pub dim: usize,
    pub count: usize,
}

impl Store {
    /// Registered dimensionality of `model`, if any vector was ever stored.
    pub fn model_dim(&self, model: &str) -> Result<Option<usize>> {
        model_dim(&self.conn, model)
    }

    pub fn embedding_models(&self) -> Result<Vec<EmbeddingModelInfo>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT m.model, m.dim, COUNT(e.id)
            FROM embedding_models m
            LEFT JOIN embeddings e ON e.model = m.model
            GROUP BY m.model, m.dim
            ORDER BY m.model
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(EmbeddingModelInfo {
                model: row.get(0)?,
                dim: row.get::<_, i64>(1)? as usize,
                count: row.get::<_, i64>(2)? as usize,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Vector for `(node, model)`; `None` when it was never written.
    pub fn get_embedding(&self, node_id: &str, model: &str) -> Result<Option<Vec<f32>>> {
        let Some(dim) = self.model_dim(model)? else {
            return Ok(None);
        };
        let blob: Option<Vec<u8>> = self
            .conn
            .query_row(
                r#"
                SELECT e.vector
                FROM embeddings e
                JOIN nodes n ON n.id = e.node_id
                WHERE n.full_id = ?1 AND e.model = ?2
                "#,
                params![node_id, model],
                |row| row.get(0),
            )
            .optional()?;

        blob.map(|b| decode_vector(&b, dim)).transpose()
    }

    /// Insert or replace the vector for `(node, model)`.
    pub fn put_embedding(&self, node_id: &str, model: &str, vector: &[f32]) -> Result<()> {
        let node_rowid = self.node_rowid(node_id)?;

        let tx = self.conn.unchecked_transaction()?;
        let dim = match model_dim(&tx, model)? {
            Some(dim) => dim,
            None if vector.is_empty() => {
                return Err(Error::VectorFormat {
                    expected: 1,
                    actual: 0,
                })
            }
            None => {
                tx.execute(
                    "INSERT INTO embedding_models (model, dim) VALUES (?1, ?2)",
                    params![model, vector.len() as i64],
                )?;
                debug!(model, dim = vector.len(), "registered embedding model");
                vector.len()
            }
        };
        if vector.len() != dim {
            return Err(Error::VectorFormat {
                expected: dim,
                actual: vector.len(),
            });
        }

        tx.execute(
            r#"
            INSERT INTO embeddings (node_id, model, vector, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(node_id, model) DO UPDATE SET
                vector = excluded.vector,
                updated_at = excluded.updated_at
            "#,
            params![node_rowid, model, encode_vector(vector), Utc::now().timestamp()],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Drop every vector of `model` and forget its dimensionality.
    pub fn delete_embeddings(&self, model: &str) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let deleted = tx.execute("DELETE FROM embeddings WHERE model = ?1", params![model])?;
        tx.execute(
            "DELETE FROM embedding_models WHERE model = ?1",
            params![model],
        )?;
        tx.commit()?;
        Ok(deleted)
    }

    /// Lazily read every vector of `model`, `limit` rows at a time.
    pub fn stream_embeddings(&self, model: &str, limit: ReadLimit) -> Result<EmbeddingStream<'_>> {
        let dim = self.model_dim(model)?;
        Ok(EmbeddingStream {
            conn: &self.conn,
            model: model.to_string(),
            dim: dim.unwrap_or(0),
            limit,
            cursor: 0,
            exhausted: dim.is_none(),
            admit: None,
            buffer: VecDeque::new(),
            batches: 0,
        })
    }
}

fn model_dim(conn: &Connection, model: &str) -> Result<Option<usize>> {
    let dim: Option<i64> = conn
        .query_row(
            "SELECT dim FROM embedding_models WHERE model = ?1",
            params![model],
            |row| row.get(0),
        )
        .optional()?;
    Ok(dim.map(|d| d as usize))
}

/// Single-pass reader over one model's embeddings.
///
/// Rows are fetched with keyset pagination on the embedding row id, so at most
/// one batch is held in memory. Restart by calling `stream_embeddings` again.
pub struct EmbeddingStream<'a> {
    conn: &'a Connection,
    model: String,
    dim: usize,
    limit: ReadLimit,
    cursor: i64,
    exhausted: bool,
    admit: Option<Box<dyn Fn(DocumentId) -> bool + 'a>>,
    buffer: VecDeque<StoredEmbedding>,
    batches: usize,
}

impl<'a> EmbeddingStream<'a> {
    /// Skip rows whose document is rejected, before their vectors are decoded.
    pub fn filter_documents(mut self, admit: impl Fn(DocumentId) -> bool + 'a) -> Self {
        self.admit = Some(Box::new(admit));
        self
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of batches fetched so far.
    pub fn batches_read(&self) -> usize {
        self.batches
    }

    /// Fetch the next batch. `Ok(None)` once the model is exhausted.
    ///
    /// A batch may be empty when every row in it was filtered out.
    pub fn next_batch(&mut self) -> Result<Option<Vec<StoredEmbedding>>> {
        if self.exhausted {
            return Ok(None);
        }

        let conn = self.conn;
        let mut stmt = conn.prepare_cached(
            r#"
            SELECT e.id, n.id, n.full_id, n.document_id, e.vector
            FROM embeddings e
            JOIN nodes n ON n.id = e.node_id
            WHERE e.model = ?1 AND e.id > ?2
            ORDER BY e.id
            LIMIT ?3
            "#,
        )?;
        let mut rows = stmt.query(params![self.model, self.cursor, self.limit.sql_limit()])?;

        let mut batch = Vec::new();
        let mut fetched = 0usize;
        while let Some(row) = rows.next()? {
            fetched += 1;
            self.cursor = row.get(0)?;
            let document_id: DocumentId = row.get(3)?;
            if let Some(admit) = &self.admit {
                if !admit(document_id) {
                    continue;
                }
            }
            let blob: Vec<u8> = row.get(4)?;
            batch.push(StoredEmbedding {
                node_rowid: row.get(1)?,
                node_id: row.get(2)?,
                document_id,
                vector: decode_vector(&blob, self.dim)?,
            });
        }

        match self.limit {
            ReadLimit::Batch(n) if fetched == n.get() => {}
            _ => self.exhausted = true,
        }
        if fetched == 0 {
            return Ok(None);
        }
        self.batches += 1;
        Ok(Some(batch))
    }
}

impl Iterator for EmbeddingStream<'_> {
    type Item = Result<(String, Vec<f32>)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Some(Ok((item.node_id, item.vector)));
            }
            match self.next_batch() {
                Ok(Some(batch)) => self.buffer.extend(batch),
                Ok(None) => return None,
                Err(e) => {
                    self.exhausted = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

/// Convert f32 vector to BLOB
pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(vector.len() * 4);
    for &val in vector {
        blob.extend_from_slice(&val.to_le_bytes());
    }
    blob
}

/// Convert BLOB to f32 vector, refusing anything that is not exactly `dim` floats.
pub fn decode_vector(blob: &[u8], dim: usize) -> Result<Vec<f32>> {
    if blob.len() != dim * 4 {
        return Err(Error::VectorFormat {
            expected: dim,
            actual: blob.len() / 4,
        });
    }
    Ok(blob
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}
