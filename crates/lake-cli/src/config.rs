use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "lake.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LakeConfig {
    pub database: PathBuf,
    pub workers: usize,
    pub log_level: Option<String>,
    pub scopes: Vec<ScopeConfig>,
}

impl Default for LakeConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("lake.db"),
            workers: 4,
            log_level: None,
            scopes: Vec::new(),
        }
    }
}

/// One scope to run with `lake run` when no scope is given on the command
/// line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeConfig {
    pub plugin: String,
    pub connection_id: u64,
    pub primary: u64,
    #[serde(default)]
    pub secondary: Option<u64>,
}

/// A missing file is the default configuration; a malformed one is an error.
pub fn load_config(path: &Path) -> Result<LakeConfig> {
    if !path.exists() {
        return Ok(LakeConfig::default());
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config {}", path.display()))?;
    Ok(config)
}
