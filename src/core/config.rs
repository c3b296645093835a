//! Engine configuration
//!
//! Read from `.elysium/config.yaml`. Every field has a default, so an empty or
//! missing file yields a working configuration. `ELYSIUM_CONFIG` points at an
//! alternative file and `ELYSIUM_DB` overrides the store path.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::paths::StorePaths;
use crate::error::{Error, Result};

pub const CONFIG_ENV: &str = "ELYSIUM_CONFIG";
pub const DB_ENV: &str = "ELYSIUM_DB";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Store location; relative paths resolve against the workspace root.
    pub db_path: Option<PathBuf>,
    pub scope_cache_ttl_secs: u64,
    /// Rows per batch for streaming reads. `<= 0` means "load everything".
    pub batch_size: i64,
    pub allow_unbounded_reads: bool,
    pub default_k: usize,
    pub snippet_len: usize,
    pub max_query_terms: usize,
    pub max_query_chars: usize,
    /// Models for which an in-memory accelerated index is built at startup.
    pub accelerated_models: Vec<String>,
    pub accelerated_max_vectors: usize,
    pub hybrid: HybridConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HybridConfig {
    pub rrf_k: f32,
    pub lexical_weight: f32,
    pub semantic_weight: f32,
    /// Each side fetches `k * oversample` candidates before fusion.
    pub oversample: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            scope_cache_ttl_secs: 60,
            batch_size: 1024,
            allow_unbounded_reads: false,
            default_k: 10,
            snippet_len: 160,
            max_query_terms: 32,
            max_query_chars: 1024,
            accelerated_models: Vec::new(),
            accelerated_max_vectors: 100_000,
            hybrid: HybridConfig::default(),
        }
    }
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            rrf_k: 60.0,
            lexical_weight: 1.0,
            semantic_weight: 1.0,
            oversample: 3,
        }
    }
}

impl SearchConfig {
    /// Load the workspace config, honouring the environment overrides.
    pub fn load(paths: &StorePaths) -> Result<Self> {
        let config_path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| paths.config.clone());

        let mut config = if config_path.exists() {
            Self::from_file(&config_path)?
        } else {
            Self::default()
        };

        if let Some(db) = std::env::var_os(DB_ENV) {
            config.db_path = Some(PathBuf::from(db));
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml(&raw)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.scope_cache_ttl_secs == 0 {
            return Err(Error::Config(
                "scope_cache_ttl_secs must be greater than 0".to_string(),
            ));
        }
        if self.max_query_terms == 0 || self.max_query_chars == 0 {
            return Err(Error::Config(
                "max_query_terms and max_query_chars must be greater than 0".to_string(),
            ));
        }
        if self.hybrid.rrf_k <= 0.0 {
            return Err(Error::Config("hybrid.rrf_k must be positive".to_string()));
        }
        Ok(())
    }

    pub fn db_path(&self, paths: &StorePaths) -> PathBuf {
        match &self.db_path {
            Some(p) => paths.resolve(p),
            None => paths.db.clone(),
        }
    }

    pub fn scope_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.scope_cache_ttl_secs)
    }
}
