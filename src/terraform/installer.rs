//! Provider installation
//!
//! Resolves the provider version to run, then makes sure its binary is
//! present under `<home>/.driftctl/plugins/<os>_<arch>`, downloading it
//! when missing.

use super::downloader::{DownloadError, ProviderDownloader};
use super::lockfile::{Locks, ProviderAddress};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const RELEASES_URL: &str = "https://releases.hashicorp.com";

pub const GOOGLE_PROVIDER_VERSION: &str = "3.78.0";
pub const AWS_PROVIDER_VERSION: &str = "3.19.0";
pub const GITHUB_PROVIDER_VERSION: &str = "4.4.0";

#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    #[error("Provider version {version} does not exist")]
    ProviderNotFound { version: String },

    #[error("found directory instead of provider binary in {}", .path.display())]
    CorruptInstall { path: PathBuf },

    #[error("provider binary missing from {} after download", .path.display())]
    MissingBinary { path: PathBuf },

    #[error("unable to determine the user home directory")]
    NoHomeDirectory,

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Download(DownloadError),
}

/// Pinned default version of a known provider
pub fn default_version(key: &str) -> Option<&'static str> {
    match key {
        "google" => Some(GOOGLE_PROVIDER_VERSION),
        "aws" => Some(AWS_PROVIDER_VERSION),
        "github" => Some(GITHUB_PROVIDER_VERSION),
        _ => None,
    }
}

/// Operating system in release artifact naming
pub fn release_os() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    }
}

/// CPU architecture in release artifact naming
pub fn release_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        other => other,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub key: String,
    pub version: String,
    /// Overrides the home directory the plugin cache lives under
    pub config_dir: Option<PathBuf>,
}

impl ProviderConfig {
    pub fn new(key: &str, version: &str) -> Self {
        Self {
            key: key.to_string(),
            version: version.to_string(),
            config_dir: None,
        }
    }

    /// Provider at its pinned default version
    pub fn with_default_version(key: &str) -> Option<Self> {
        default_version(key).map(|v| Self::new(key, v))
    }

    pub fn binary_name(&self, version: &str) -> String {
        format!("terraform-provider-{}_v{}", self.key, version)
    }

    pub fn download_url(&self, version: &str) -> String {
        format!(
            "{base}/terraform-provider-{key}/{version}/terraform-provider-{key}_{version}_{os}_{arch}.zip",
            base = RELEASES_URL,
            key = self.key,
            version = version,
            os = release_os(),
            arch = release_arch(),
        )
    }

    pub fn address(&self) -> ProviderAddress {
        ProviderAddress::hashicorp(&self.key)
    }
}

pub struct ProviderInstaller {
    config: ProviderConfig,
    locks: Option<Arc<Locks>>,
    downloader: Arc<dyn ProviderDownloader>,
}

impl ProviderInstaller {
    pub fn new(config: ProviderConfig, downloader: Arc<dyn ProviderDownloader>) -> Self {
        Self {
            config,
            locks: None,
            downloader,
        }
    }

    pub fn with_locks(mut self, locks: Arc<Locks>) -> Self {
        self.locks = Some(locks);
        self
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn plugin_directory(&self) -> Result<PathBuf, InstallError> {
        let home = match &self.config.config_dir {
            Some(dir) => dir.clone(),
            None => dirs::home_dir().ok_or(InstallError::NoHomeDirectory)?,
        };
        Ok(home
            .join(".driftctl")
            .join("plugins")
            .join(format!("{}_{}", release_os(), release_arch())))
    }

    /// Version to install plus the archive hashes it must match
    fn resolve_version(&self, requested: Option<&str>) -> (String, Vec<String>) {
        if let Some(requested) = requested.filter(|v| !v.is_empty()) {
            return (requested.to_string(), Vec::new());
        }

        let locked = self
            .locks
            .as_ref()
            .and_then(|locks| locks.provider(&self.config.address()));
        if let Some(lock) = locked {
            if let Some(version) = &lock.version {
                tracing::debug!("Using locked {} provider version {}", self.config.key, version);
                return (version.clone(), lock.zip_hashes());
            }
        }

        (self.config.version.clone(), Vec::new())
    }

    /// Install the provider, returning the path of its binary
    pub async fn install(&self, requested: Option<&str>) -> Result<PathBuf, InstallError> {
        let (version, hashes) = self.resolve_version(requested);
        let directory = self.plugin_directory()?;
        let binary_name = self.config.binary_name(&version);

        if let Some(path) = find_binary(&directory, &binary_name)? {
            tracing::debug!("Provider already installed at {}", path.display());
            return Ok(path);
        }

        tracing::info!(
            "Installing {} provider {} into {}",
            self.config.key,
            version,
            directory.display()
        );
        self.downloader
            .download(&self.config.download_url(&version), &directory, &hashes)
            .await
            .map_err(|e| match e {
                DownloadError::NotFound(_) => InstallError::ProviderNotFound {
                    version: version.clone(),
                },
                other => InstallError::Download(other),
            })?;

        find_binary(&directory, &binary_name)?.ok_or(InstallError::MissingBinary {
            path: directory.join(&binary_name),
        })
    }
}

/// Look for `binary_name` itself or a `binary_name_x<N>` variant
fn find_binary(directory: &Path, binary_name: &str) -> Result<Option<PathBuf>, InstallError> {
    let exact = directory.join(binary_name);
    if exact.is_dir() {
        return Err(InstallError::CorruptInstall { path: exact });
    }
    if exact.is_file() {
        return Ok(Some(exact));
    }

    let entries = match std::fs::read_dir(directory) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(InstallError::Io {
                path: directory.to_path_buf(),
                source,
            })
        }
    };

    let prefix = format!("{}_x", binary_name);
    let mut candidates: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .and_then(|n| n.strip_prefix(&prefix))
                    .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
        })
        .collect();
    candidates.sort();
    Ok(candidates.pop())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_name_and_url() {
        let config = ProviderConfig::new("aws", "3.19.0");

        assert_eq!(config.binary_name("3.19.0"), "terraform-provider-aws_v3.19.0");
        assert_eq!(
            config.download_url("3.47.0"),
            format!(
                "https://releases.hashicorp.com/terraform-provider-aws/3.47.0/terraform-provider-aws_3.47.0_{}_{}.zip",
                release_os(),
                release_arch()
            )
        );
        assert_eq!(
            config.address().to_string(),
            "registry.terraform.io/hashicorp/aws"
        );
    }

    #[test]
    fn test_default_versions() {
        assert_eq!(
            ProviderConfig::with_default_version("google").unwrap().version,
            "3.78.0"
        );
        assert_eq!(default_version("aws"), Some("3.19.0"));
        assert_eq!(default_version("github"), Some("4.4.0"));
        assert_eq!(default_version("azurerm"), None);
    }

    #[test]
    fn test_find_binary_in_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(find_binary(&missing, "terraform-provider-aws_v3.19.0")
            .unwrap()
            .is_none());
    }
}
