//! Terraform provider plugin bridge
//!
//! Enriches shallow listings by reading full resource state through
//! provider plugins.
//!
//! # Module Structure
//!
//! - [`lockfile`] - Dependency lock file parsing
//! - [`installer`] - Version resolution and on-disk plugin cache
//! - [`downloader`] - Release archive download and extraction
//! - [`plugin`] - Plugin process launch and go-plugin handshake
//! - [`tfplugin5`] - Provider protocol messages and gRPC client
//! - [`connection`] - Launcher and connection seams over the gRPC client
//! - [`value`] - Resource schemas and state encoding
//! - [`provider`] - Provider lifecycle and the [`ProviderClient`] implementation

pub mod connection;
pub mod downloader;
pub mod installer;
pub mod lockfile;
pub mod plugin;
pub mod provider;
pub mod tfplugin5;
pub mod value;

use crate::resource::Attributes;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

pub use connection::{GoPluginLauncher, PluginConnection, PluginLauncher};
pub use installer::{InstallError, ProviderConfig, ProviderInstaller};
pub use lockfile::{LockError, Locks, ProviderAddress};
pub use provider::TerraformProvider;
pub use value::{DecodeError, ResourceSchema};

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error(transparent)]
    Install(#[from] InstallError),

    #[error("failed to launch provider: {0}")]
    Launch(String),

    #[error("provider handshake failed: {0}")]
    Handshake(String),

    /// The plugin connection is gone; the provider is never respawned
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// The call did not finish in time; the plugin is abandoned
    #[error("provider did not answer {method} within {timeout:?}")]
    Timeout {
        method: &'static str,
        timeout: Duration,
    },

    #[error("provider RPC {method} failed ({code:?}): {message}")]
    Rpc {
        method: &'static str,
        code: tonic::Code,
        message: String,
    },

    /// Error diagnostic returned by the provider
    #[error("{summary}: {detail}")]
    Diagnostic { summary: String, detail: String },

    #[error("provider protocol error: {0}")]
    Protocol(String),

    #[error("provider has no schema for resource type {0}")]
    UnknownResourceType(String),

    #[error("failed to decode provider state: {0}")]
    Decode(#[from] DecodeError),
}

impl ProviderError {
    pub fn is_access_denied(&self) -> bool {
        match self {
            ProviderError::Rpc { code, .. } => {
                matches!(code, tonic::Code::PermissionDenied | tonic::Code::Unauthenticated)
            }
            ProviderError::Diagnostic { summary, detail } => {
                [summary, detail].iter().any(|text| {
                    text.contains("Error 403") || text.contains("Error 401")
                })
            }
            _ => false,
        }
    }

    /// The plugin itself is unusable, as opposed to a single read failing
    pub fn is_provider_failure(&self) -> bool {
        matches!(
            self,
            ProviderError::Install(_)
                | ProviderError::Launch(_)
                | ProviderError::Handshake(_)
                | ProviderError::Unavailable(_)
                | ProviderError::Timeout { .. }
        )
    }
}

/// Reads typed resource state through a provider
#[async_trait]
pub trait ProviderClient: Send + Sync {
    fn name(&self) -> &str;

    async fn resource_schema(&self, resource_type: &str) -> Result<Arc<ResourceSchema>, ProviderError>;

    /// Full state of the resource, `None` when the provider no longer finds it
    async fn read_resource(
        &self,
        resource_type: &str,
        id: &str,
        attributes: &Attributes,
    ) -> Result<Option<Attributes>, ProviderError>;

    async fn shutdown(&self) -> Result<(), ProviderError>;
}

/// Providers in use during a scan, by name
#[derive(Default, Clone)]
pub struct ProviderLibrary {
    providers: BTreeMap<String, Arc<dyn ProviderClient>>,
}

impl ProviderLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, provider: Arc<dyn ProviderClient>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn provider(&self, name: &str) -> Option<Arc<dyn ProviderClient>> {
        self.providers.get(name).cloned()
    }

    /// Stop every provider, logging failures
    pub async fn shutdown(&self) {
        for (name, provider) in &self.providers {
            if let Err(e) = provider.shutdown().await {
                tracing::warn!("Failed to stop provider {}: {}", name, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        stops: AtomicUsize,
    }

    #[async_trait]
    impl ProviderClient for CountingProvider {
        fn name(&self) -> &str {
            "google"
        }

        async fn resource_schema(&self, ty: &str) -> Result<Arc<ResourceSchema>, ProviderError> {
            Err(ProviderError::UnknownResourceType(ty.to_string()))
        }

        async fn read_resource(
            &self,
            _: &str,
            _: &str,
            _: &Attributes,
        ) -> Result<Option<Attributes>, ProviderError> {
            Ok(None)
        }

        async fn shutdown(&self) -> Result<(), ProviderError> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_library_shuts_down_every_provider() {
        let provider = Arc::new(CountingProvider {
            stops: AtomicUsize::new(0),
        });
        let mut library = ProviderLibrary::new();
        library.add(provider.clone());

        assert!(library.provider("google").is_some());
        assert!(library.provider("aws").is_none());

        library.shutdown().await;
        assert_eq!(provider.stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_access_denied_classification() {
        let denied = ProviderError::Rpc {
            method: "ReadResource",
            code: tonic::Code::PermissionDenied,
            message: "forbidden".to_string(),
        };
        assert!(denied.is_access_denied());

        let diagnostic = ProviderError::Diagnostic {
            summary: "Error when reading or editing Storage Bucket \"b1\"".to_string(),
            detail: "googleapi: Error 403: caller does not have storage.buckets.get access"
                .to_string(),
        };
        assert!(diagnostic.is_access_denied());

        let internal = ProviderError::Rpc {
            method: "ReadResource",
            code: tonic::Code::Internal,
            message: "panic".to_string(),
        };
        assert!(!internal.is_access_denied());
        assert!(!ProviderError::Unavailable("gone".to_string()).is_access_denied());
    }

    #[test]
    fn test_provider_failure_classification() {
        assert!(ProviderError::Unavailable("gone".to_string()).is_provider_failure());
        assert!(ProviderError::Timeout {
            method: "ReadResource",
            timeout: Duration::from_secs(1),
        }
        .is_provider_failure());
        assert!(!ProviderError::Diagnostic {
            summary: "Error reading bucket".to_string(),
            detail: "googleapi: Error 500".to_string(),
        }
        .is_provider_failure());
        assert!(!ProviderError::Decode(DecodeError::NotAnObject).is_provider_failure());
    }
}
