//! Provider release downloads

use async_trait::async_trait;
use reqwest::StatusCode;
use sha2::{Digest, Sha256};
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

const BINARY_PREFIX: &str = "terraform-provider-";

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// No artifact published at the URL
    #[error("artifact not found at {0}")]
    NotFound(String),

    #[error("HTTP error downloading {url}: {message}")]
    Http { url: String, message: String },

    #[error("checksum mismatch: archive sha256 {actual} is not one of the locked hashes")]
    Checksum { actual: String },

    #[error("invalid provider archive: {0}")]
    Archive(String),

    #[error("I/O error writing {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Fetches a provider archive and unpacks its binary into a directory
#[async_trait]
pub trait ProviderDownloader: Send + Sync {
    /// `zip_hashes` are hex sha256 digests; when non-empty the archive must match one
    async fn download(
        &self,
        url: &str,
        dest_dir: &Path,
        zip_hashes: &[String],
    ) -> Result<(), DownloadError>;
}

pub struct HttpProviderDownloader {
    client: reqwest::Client,
}

impl HttpProviderDownloader {
    pub fn new() -> Result<Self, DownloadError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| DownloadError::Http {
                url: String::new(),
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ProviderDownloader for HttpProviderDownloader {
    async fn download(
        &self,
        url: &str,
        dest_dir: &Path,
        zip_hashes: &[String],
    ) -> Result<(), DownloadError> {
        tracing::info!("Downloading provider from {}", url);
        let http_error = |e: reqwest::Error| DownloadError::Http {
            url: url.to_string(),
            message: e.to_string(),
        };

        let response = self.client.get(url).send().await.map_err(http_error)?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::FORBIDDEN {
            return Err(DownloadError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(DownloadError::Http {
                url: url.to_string(),
                message: format!("status {}", status),
            });
        }
        let archive = response.bytes().await.map_err(http_error)?.to_vec();

        verify_checksum(&archive, zip_hashes)?;

        let dest_dir = dest_dir.to_path_buf();
        tokio::task::spawn_blocking(move || extract_provider(&archive, &dest_dir))
            .await
            .map_err(|e| DownloadError::Archive(e.to_string()))?
    }
}

pub fn verify_checksum(archive: &[u8], zip_hashes: &[String]) -> Result<(), DownloadError> {
    if zip_hashes.is_empty() {
        return Ok(());
    }
    let actual = hex::encode(Sha256::digest(archive));
    if zip_hashes.iter().any(|h| h.eq_ignore_ascii_case(&actual)) {
        Ok(())
    } else {
        Err(DownloadError::Checksum { actual })
    }
}

/// Unpack every `terraform-provider-*` entry of the archive into `dest_dir`.
/// Each binary is written to a temporary file, marked executable and then
/// renamed into place.
pub fn extract_provider(archive: &[u8], dest_dir: &Path) -> Result<(), DownloadError> {
    let io_error = |path: &Path| {
        let path = path.to_path_buf();
        move |source| DownloadError::Io { path, source }
    };

    std::fs::create_dir_all(dest_dir).map_err(io_error(dest_dir))?;

    let mut zip = zip::ZipArchive::new(Cursor::new(archive))
        .map_err(|e| DownloadError::Archive(e.to_string()))?;

    let mut extracted = 0;
    for i in 0..zip.len() {
        let mut entry = zip
            .by_index(i)
            .map_err(|e| DownloadError::Archive(e.to_string()))?;
        let Some(name) = Path::new(entry.name())
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
        else {
            continue;
        };
        if entry.is_dir() || !name.starts_with(BINARY_PREFIX) {
            continue;
        }

        let mut contents = Vec::new();
        entry
            .read_to_end(&mut contents)
            .map_err(|e| DownloadError::Archive(e.to_string()))?;

        let target = dest_dir.join(&name);
        let temp = dest_dir.join(format!(".{}.tmp", name));
        std::fs::write(&temp, &contents).map_err(io_error(&temp))?;
        make_executable(&temp).map_err(io_error(&temp))?;
        std::fs::rename(&temp, &target).map_err(io_error(&target))?;

        tracing::debug!("Extracted {}", target.display());
        extracted += 1;
    }

    if extracted == 0 {
        return Err(DownloadError::Archive(
            "no provider binary in archive".to_string(),
        ));
    }
    Ok(())
}

#[cfg(unix)]
fn make_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
