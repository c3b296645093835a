use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the store and the search components.
///
/// Nothing here is retried internally; every failure is either structural
/// (schema, vector data) or specific to one query.
#[derive(Debug, Error)]
pub enum Error {
    /// A migration failed and was rolled back. The store is unusable until fixed.
    #[error("schema migration {version} ({name}) failed: {source}")]
    SchemaMigration {
        version: u32,
        name: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("store schema v{found} is newer than supported v{supported}")]
    SchemaTooNew { found: u32, supported: u32 },

    #[error("scope resolution failed: {0}")]
    ScopeResolution(#[source] rusqlite::Error),

    #[error("search failed: {0}")]
    Search(#[source] rusqlite::Error),

    #[error("vector format error: expected {expected} dimensions, got {actual}")]
    VectorFormat { expected: usize, actual: usize },

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("unbounded read requested (limit {0}); enable allow_unbounded_reads to load everything")]
    UnboundedRead(i64),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Storage(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn code(&self) -> &'static str {
        match self {
            Self::SchemaMigration { .. } | Self::SchemaTooNew { .. } => "SCHEMA_MIGRATION",
            Self::ScopeResolution(_) => "SCOPE_RESOLUTION",
            Self::Search(_) => "SEARCH",
            Self::VectorFormat { .. } => "VECTOR_FORMAT",
            Self::InvalidQuery(_) => "INVALID_QUERY",
            Self::UnboundedRead(_) => "UNBOUNDED_READ",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Config(_) => "CONFIG",
            Self::Storage(_) => "STORAGE",
            Self::Io(_) => "IO",
        }
    }
}
