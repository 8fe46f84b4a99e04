//! GCP Client
//!
//! Main client for interacting with GCP APIs, combining authentication
//! and HTTP functionality.

use super::auth::GcpCredentials;
use super::http::GcpHttpClient;
use crate::remote::error::BackendError;
use async_trait::async_trait;
use serde_json::Value;

/// Native API seam used by the backend repositories
#[async_trait]
pub trait ApiTransport: Send + Sync {
    /// Project the client is scoped to
    fn project_id(&self) -> &str;

    /// GET a JSON document from `url`
    async fn get_json(&self, url: &str) -> Result<Value, BackendError>;
}

/// Base URLs of the GCP services we list from
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub sqladmin: String,
    pub storage: String,
    pub compute: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            sqladmin: "https://sqladmin.googleapis.com".to_string(),
            storage: "https://storage.googleapis.com".to_string(),
            compute: "https://compute.googleapis.com".to_string(),
        }
    }
}

impl Endpoints {
    /// Route every service to one base URL (mock servers)
    pub fn single(base: &str) -> Self {
        let base = base.trim_end_matches('/').to_string();
        Self {
            sqladmin: base.clone(),
            storage: base.clone(),
            compute: base,
        }
    }
}

/// Main GCP client
#[derive(Clone)]
pub struct GcpClient {
    pub credentials: GcpCredentials,
    pub http: GcpHttpClient,
    pub project_id: String,
    pub region: String,
    pub endpoints: Endpoints,
}

impl GcpClient {
    /// Create a new GCP client using Application Default Credentials
    pub async fn new(project_id: &str, region: &str) -> Result<Self, BackendError> {
        let credentials = GcpCredentials::new().await?;
        let http = GcpHttpClient::new()?;

        Ok(Self::with_parts(credentials, http, project_id, region, Endpoints::default()))
    }

    pub fn with_parts(
        credentials: GcpCredentials,
        http: GcpHttpClient,
        project_id: &str,
        region: &str,
        endpoints: Endpoints,
    ) -> Self {
        Self {
            credentials,
            http,
            project_id: project_id.to_string(),
            region: region.to_string(),
            endpoints,
        }
    }

    /// Make a GET request to a GCP API
    pub async fn get(&self, url: &str) -> Result<Value, BackendError> {
        let token = self.credentials.get_token().await?;
        self.http.get(url, &token).await
    }
}

#[async_trait]
impl ApiTransport for GcpClient {
    fn project_id(&self) -> &str {
        &self.project_id
    }

    async fn get_json(&self, url: &str) -> Result<Value, BackendError> {
        self.get(url).await
    }
}

/// Append a page token to `url`
pub fn with_page_token(url: &str, page_token: Option<&str>) -> String {
    match page_token {
        None => url.to_string(),
        Some(token) => {
            let separator = if url.contains('?') { '&' } else { '?' };
            format!("{}{}pageToken={}", url, separator, urlencoding::encode(token))
        }
    }
}
