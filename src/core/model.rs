//! Knowledge graph records and the query-time scope.

use serde::{Deserialize, Serialize};

pub type DocumentId = i64;
pub type TopicId = i64;
pub type CollectionId = i64;

/// A document as produced by the ingestion pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDocument {
    pub project: String,
    pub source: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: DocumentId,
    pub project: String,
    pub source: String,
    pub title: String,
    pub created_at: i64,
}

/// A searchable chunk or section of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewNode {
    /// Store-wide unique identifier, e.g. `notes/gpu.md#memory`.
    pub full_id: String,
    pub document_id: DocumentId,
    pub kind: String,
    pub text: String,
    pub position: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Row id; also the FTS content rowid.
    pub rowid: i64,
    pub full_id: String,
    pub document_id: DocumentId,
    pub kind: String,
    pub text: String,
    pub position: i64,
}

/// Query-time filter: a project plus topic inclusion and exclusion.
///
/// Naming collections narrows the project to the members of those collections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub project: String,
    #[serde(default)]
    pub collections: Vec<CollectionId>,
    pub include_topics: Vec<TopicId>,
    pub exclude_topics: Vec<TopicId>,
    pub include_shared: bool,
}

impl Scope {
    pub fn project(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            ..Self::default()
        }
    }

    pub fn in_collections(mut self, collections: impl IntoIterator<Item = CollectionId>) -> Self {
        self.collections.extend(collections);
        self
    }

    pub fn with_topics(mut self, topics: impl IntoIterator<Item = TopicId>) -> Self {
        self.include_topics.extend(topics);
        self
    }

    pub fn without_topics(mut self, topics: impl IntoIterator<Item = TopicId>) -> Self {
        self.exclude_topics.extend(topics);
        self
    }

    pub fn with_shared(mut self, include_shared: bool) -> Self {
        self.include_shared = include_shared;
        self
    }

    /// Canonical form used as the cache key: id sets sorted and deduplicated.
    pub fn key(&self) -> ScopeKey {
        ScopeKey {
            project: self.project.clone(),
            collections: canonical(&self.collections),
            include_topics: canonical(&self.include_topics),
            exclude_topics: canonical(&self.exclude_topics),
            include_shared: self.include_shared,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopeKey {
    pub project: String,
    pub collections: Vec<CollectionId>,
    pub include_topics: Vec<TopicId>,
    pub exclude_topics: Vec<TopicId>,
    pub include_shared: bool,
}

fn canonical(ids: &[i64]) -> Vec<i64> {
    let mut out = ids.to_vec();
    out.sort_unstable();
    out.dedup();
    out
}
