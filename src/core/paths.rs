use std::path::{Path, PathBuf};

/// Directory under the workspace root that holds the store and its config.
pub const DATA_DIR: &str = ".elysium";

pub struct StorePaths {
    pub root: PathBuf,
    pub data: PathBuf,
    pub db: PathBuf,
    pub config: PathBuf,
}

impl StorePaths {
    /// Paths rooted at the current directory, falling back to `.`.
    pub fn new() -> Self {
        let root = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::from_root(root)
    }

    pub fn from_root(root: PathBuf) -> Self {
        let data = root.join(DATA_DIR);
        Self {
            db: data.join("search.db"),
            config: data.join("config.yaml"),
            data,
            root,
        }
    }

    /// Resolve a configured path against the workspace root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

impl Default for StorePaths {
    fn default() -> Self {
        Self::new()
    }
}
