//! GCP Authentication
//!
//! Handles authentication using Application Default Credentials (ADC),
//! service account keys, or gcloud CLI credentials.

use crate::remote::error::BackendError;
use gcp_auth::TokenProvider;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Default scopes for GCP API access
pub const DEFAULT_SCOPES: &[&str] = &["https://www.googleapis.com/auth/cloud-platform"];

/// Token expiry buffer - refresh tokens this much before they actually expire
const TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// Default token TTL if we can't determine expiry (conservative: 30 minutes)
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(30 * 60);

#[derive(Clone)]
enum TokenSource {
    Provider(Arc<dyn TokenProvider>),
    Static(String),
}

/// GCP credentials holder with token caching
#[derive(Clone)]
pub struct GcpCredentials {
    source: TokenSource,
    token_cache: Arc<RwLock<Option<CachedToken>>>,
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    /// When this token expires (with buffer applied)
    expires_at: Instant,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

impl GcpCredentials {
    /// Create new GCP credentials using Application Default Credentials
    pub async fn new() -> Result<Self, BackendError> {
        let provider = gcp_auth::provider().await.map_err(|e| BackendError::AccessDenied {
            message: format!(
                "Failed to initialize GCP authentication ({}). Run 'gcloud auth application-default login'",
                e
            ),
        })?;

        Ok(Self {
            source: TokenSource::Provider(provider),
            token_cache: Arc::new(RwLock::new(None)),
        })
    }

    /// Credentials that always present the same bearer token
    pub fn from_static(token: impl Into<String>) -> Self {
        Self {
            source: TokenSource::Static(token.into()),
            token_cache: Arc::new(RwLock::new(None)),
        }
    }

    /// Get an access token for API calls
    pub async fn get_token(&self) -> Result<String, BackendError> {
        let provider = match &self.source {
            TokenSource::Static(token) => return Ok(token.clone()),
            TokenSource::Provider(provider) => provider,
        };

        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_valid() {
                    return Ok(cached.token.clone());
                }
                tracing::debug!("Cached token expired, fetching new token");
            }
        }

        let token = provider
            .token(DEFAULT_SCOPES)
            .await
            .map_err(|e| BackendError::AccessDenied {
                message: format!("Failed to get access token: {}", e),
            })?;
        let token_str = token.as_str().to_string();

        let expires_at = Instant::now() + DEFAULT_TOKEN_TTL - TOKEN_EXPIRY_BUFFER;
        {
            let mut cache = self.token_cache.write().await;
            *cache = Some(CachedToken {
                token: token_str.clone(),
                expires_at,
            });
        }

        tracing::debug!(
            "New token cached, expires in ~{} minutes",
            (DEFAULT_TOKEN_TTL - TOKEN_EXPIRY_BUFFER).as_secs() / 60
        );

        Ok(token_str)
    }
}

/// Get the gcloud configuration directory
pub fn get_gcloud_config_dir() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("CLOUDSDK_CONFIG") {
        return Some(PathBuf::from(path));
    }

    dirs::config_dir().map(|p| p.join("gcloud"))
}

/// Validate a GCP project ID format
/// Project IDs must be 6-30 characters, lowercase letters, digits, and hyphens
/// Must start with a letter and cannot end with a hyphen
pub fn validate_project_id(project: &str) -> bool {
    if project.len() < 6 || project.len() > 30 {
        return false;
    }

    match project.chars().next() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => return false,
    }

    if project.ends_with('-') {
        return false;
    }

    project
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Read `key` from `section` of the active gcloud configuration
fn read_active_config_value(section: &str, key: &str) -> Option<String> {
    let config_dir = get_gcloud_config_dir()?;
    let active_config = std::fs::read_to_string(config_dir.join("active_config")).ok()?;
    let config_name = active_config.trim();

    // Security: Validate config name to prevent path traversal
    if !config_name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        tracing::warn!("Invalid characters in active_config name");
        return None;
    }

    let config_path = config_dir
        .join("configurations")
        .join(format!("config_{}", config_name));
    let content = std::fs::read_to_string(config_path).ok()?;

    parse_ini_value(&content, section, key)
}

fn parse_ini_value(content: &str, section: &str, key: &str) -> Option<String> {
    let header = format!("[{}]", section);
    let mut in_section = false;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if line.starts_with('[') {
            in_section = line == header;
            continue;
        }
        if !in_section {
            continue;
        }
        if let Some((k, v)) = line.split_once('=') {
            if k.trim() == key {
                return Some(v.trim().to_string());
            }
        }
    }

    None
}

/// Read the default project from the environment or gcloud configuration
pub fn get_default_project() -> Option<String> {
    for var in ["CLOUDSDK_CORE_PROJECT", "GOOGLE_CLOUD_PROJECT", "GCLOUD_PROJECT"] {
        if let Ok(project) = std::env::var(var) {
            if validate_project_id(&project) {
                return Some(project);
            }
            tracing::warn!("Invalid project ID format in {}", var);
        }
    }

    read_active_config_value("core", "project").filter(|p| validate_project_id(p))
}

/// Read the default region from the environment or gcloud configuration
pub fn get_default_region() -> Option<String> {
    if let Ok(region) = std::env::var("CLOUDSDK_COMPUTE_REGION") {
        return Some(region);
    }

    read_active_config_value("compute", "region")
}
