//! elysium-search library
//!
//! Embedded hybrid search over a personal knowledge graph kept in one SQLite
//! file.
//!
//! # Modules
//!
//! - `core`: configuration, store paths, graph records and query scopes
//! - `storage`: the SQLite store, migrations, record writes and embeddings
//! - `search`: scope resolution, lexical/semantic/hybrid search

pub mod core;
pub mod error;
pub mod search;
pub mod storage;

#[cfg(test)]
pub(crate) mod test_support;

// Re-exports for convenience
pub use crate::core::config::SearchConfig;
pub use crate::core::model::{Scope, ScopeKey};
pub use crate::core::paths::StorePaths;
pub use error::{Error, Result};
pub use search::{MatchSource, SearchEngine, SearchMode, SearchRequest, SearchResult};
pub use storage::{ReadLimit, Store};
