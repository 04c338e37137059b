//! Cache configuration, stored as TOML.
//!
//! ```toml
//! root = "data"
//! block_size = 1000
//! quarantine_corrupt = true
//! log_level = "info"
//! max_fill_rounds = 8
//! ```
//!
//! Every key is optional.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{CacheError, Result};
use crate::storage::LoadOptions;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache root directory.
    pub root: PathBuf,
    /// Refine target: maximum candles per persisted block.
    pub block_size: usize,
    pub quarantine_corrupt: bool,
    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub log_level: String,
    pub max_fill_rounds: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data"),
            block_size: 1000,
            quarantine_corrupt: true,
            log_level: "info".to_string(),
            max_fill_rounds: 8,
        }
    }
}

impl CacheConfig {
    /// Load a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CacheError::Config(format!("read {}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    /// Parse a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| CacheError::Config(format!("parse cache TOML: {e}")))?;
        if config.block_size == 0 {
            return Err(CacheError::Config("block_size must be at least 1".into()));
        }
        Ok(config)
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            quarantine_corrupt: self.quarantine_corrupt,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        assert_eq!(CacheConfig::from_toml("").unwrap(), CacheConfig::default());
    }

    #[test]
    fn partial_toml_overrides_fields() {
        let config = CacheConfig::from_toml(
            r#"
            root = "/var/cache/candles"
            block_size = 250
            quarantine_corrupt = false
            "#,
        )
        .unwrap();
        assert_eq!(config.root, PathBuf::from("/var/cache/candles"));
        assert_eq!(config.block_size, 250);
        assert!(!config.load_options().quarantine_corrupt);
        assert_eq!(config.max_fill_rounds, 8);
    }

    #[test]
    fn rejects_zero_block_size_and_bad_types() {
        assert!(matches!(
            CacheConfig::from_toml("block_size = 0"),
            Err(CacheError::Config(_))
        ));
        assert!(CacheConfig::from_toml("block_size = \"big\"").is_err());
    }

    #[test]
    fn from_file_reads_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("candlegrid.toml");
        std::fs::write(&path, "log_level = \"debug\"\n").unwrap();
        assert_eq!(CacheConfig::from_file(&path).unwrap().log_level, "debug");
        assert!(CacheConfig::from_file(&dir.path().join("missing.toml")).is_err());
    }
}
