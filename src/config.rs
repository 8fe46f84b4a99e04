//! Configuration Management
//!
//! Handles persistent configuration storage for driftscan.

use crate::cache::DEFAULT_TTL;
use crate::remote::scanner::DEFAULT_PARALLELISM;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CACHE_CAPACITY: usize = 500;

fn default_parallelism() -> usize {
    DEFAULT_PARALLELISM
}

fn default_cache_capacity() -> usize {
    DEFAULT_CACHE_CAPACITY
}

fn default_cache_ttl_secs() -> u64 {
    DEFAULT_TTL.as_secs()
}

/// User configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// GCP project to scan
    #[serde(default)]
    pub project_id: Option<String>,
    /// Region handed to the provider
    #[serde(default)]
    pub region: Option<String>,
    /// Google provider version, overriding lock file and pinned default
    #[serde(default)]
    pub provider_version: Option<String>,
    /// Enrich listings through the provider plugin
    #[serde(default)]
    pub deep: bool,
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Resource types to skip; a trailing `*` matches a prefix
    #[serde(default)]
    pub ignored_types: Vec<String>,
    /// Dependency lock file pinning provider versions
    #[serde(default)]
    pub lock_file: Option<PathBuf>,
    /// Home for the plugin cache instead of the user's home directory
    #[serde(default)]
    pub config_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project_id: None,
            region: None,
            provider_version: None,
            deep: false,
            parallelism: DEFAULT_PARALLELISM,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            cache_ttl_secs: DEFAULT_TTL.as_secs(),
            ignored_types: Vec::new(),
            lock_file: None,
            config_dir: None,
        }
    }
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("driftscan").join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring invalid config {}: {}", path.display(), e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Get effective project (CLI > config > gcloud default)
    pub fn effective_project(&self) -> String {
        self.project_id
            .clone()
            .or_else(crate::gcp::auth::get_default_project)
            .unwrap_or_default()
    }

    /// Get effective region (CLI > config > gcloud default)
    pub fn effective_region(&self) -> String {
        self.region
            .clone()
            .or_else(crate::gcp::auth::get_default_region)
            .unwrap_or_else(|| "us-central1".to_string())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"project_id": "my-project", "deep": true}"#).unwrap();

        assert_eq!(config.project_id.as_deref(), Some("my-project"));
        assert!(config.deep);
        assert_eq!(config.parallelism, DEFAULT_PARALLELISM);
        assert_eq!(config.cache_capacity, DEFAULT_CACHE_CAPACITY);
        assert_eq!(config.cache_ttl(), DEFAULT_TTL);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"project_id": "p", "ignored_types": ["google_compute_*"], "cache_ttl_secs": 5}"#,
        )
        .unwrap();

        let config = Config::load_from(&path);

        assert_eq!(
            config,
            Config {
                project_id: Some("p".to_string()),
                ignored_types: vec!["google_compute_*".to_string()],
                cache_ttl_secs: 5,
                ..Config::default()
            }
        );
        assert_eq!(config.cache_ttl(), Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_or_missing_file_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        assert_eq!(Config::load_from(&path), Config::default());

        std::fs::write(&path, "{not json").unwrap();
        assert_eq!(Config::load_from(&path), Config::default());
    }
}
