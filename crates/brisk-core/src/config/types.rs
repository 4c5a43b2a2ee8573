//! Configuration types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::defaults::{default_cache_root, DEFAULT_IGNORED_DIRS, DEFAULT_SHELL};

/// Main configuration for Brisk
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Fingerprint cache configuration
    pub cache: CacheConfig,

    /// Build declaration discovery
    pub discovery: DiscoveryConfig,

    /// Shell used to run task commands
    pub shell: ShellConfig,
}

/// Fingerprint cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether cached results may be reused
    pub enabled: bool,

    /// Root directory of the per-workdir cache documents
    pub dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
        }
    }
}

impl CacheConfig {
    /// Cache root, falling back to `<temp>/brisk`
    pub fn root(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(default_cache_root)
    }
}

/// Which directories are scanned for `make.toml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Glob patterns matched against directory names to skip
    pub ignore: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            ignore: DEFAULT_IGNORED_DIRS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Shell configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Program invoked as `<program> -c <command>`
    pub program: String,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_SHELL.to_string(),
        }
    }
}
