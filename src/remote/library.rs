//! Remote Library
//!
//! Explicit registry mapping a resource type to the enumerator that lists
//! it and, optionally, the details fetcher that enriches it.

use super::error::{FetchError, LibraryError, ResourceListingError};
use crate::resource::{Resource, ResourceFactory};
use crate::terraform::ProviderClient;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Lists shallow resources of one type
#[async_trait]
pub trait Enumerator: Send + Sync {
    fn supported_type(&self) -> &str;

    async fn enumerate(&self) -> Result<Vec<Resource>, ResourceListingError>;
}

/// Enriches a shallow resource into a fully attributed one
#[async_trait]
pub trait DetailsFetcher: Send + Sync {
    async fn fetch(&self, resource: &Resource) -> Result<Resource, FetchError>;
}

#[derive(Default, Clone)]
pub struct RemoteLibrary {
    enumerators: Vec<Arc<dyn Enumerator>>,
    details_fetchers: HashMap<String, Arc<dyn DetailsFetcher>>,
}

impl RemoteLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_enumerator(&mut self, enumerator: Arc<dyn Enumerator>) -> Result<(), LibraryError> {
        let ty = enumerator.supported_type();
        if self.enumerators.iter().any(|e| e.supported_type() == ty) {
            return Err(LibraryError::DuplicateEnumerator(ty.to_string()));
        }
        self.enumerators.push(enumerator);
        Ok(())
    }

    /// Register the fetcher for `ty`, replacing any previous one
    pub fn add_details_fetcher(&mut self, ty: &str, fetcher: Arc<dyn DetailsFetcher>) {
        self.details_fetchers.insert(ty.to_string(), fetcher);
    }

    pub fn enumerators(&self) -> &[Arc<dyn Enumerator>] {
        &self.enumerators
    }

    pub fn enumerator(&self, ty: &str) -> Result<Arc<dyn Enumerator>, LibraryError> {
        self.enumerators
            .iter()
            .find(|e| e.supported_type() == ty)
            .cloned()
            .ok_or_else(|| LibraryError::Unregistered(ty.to_string()))
    }

    pub fn details_fetcher(&self, ty: &str) -> Option<Arc<dyn DetailsFetcher>> {
        self.details_fetchers.get(ty).cloned()
    }
}

/// Details fetcher reading state through a provider plugin
pub struct GenericDetailsFetcher {
    resource_type: String,
    provider: Arc<dyn ProviderClient>,
    factory: Arc<dyn ResourceFactory>,
}

impl GenericDetailsFetcher {
    pub fn new(
        resource_type: &str,
        provider: Arc<dyn ProviderClient>,
        factory: Arc<dyn ResourceFactory>,
    ) -> Self {
        Self {
            resource_type: resource_type.to_string(),
            provider,
            factory,
        }
    }
}

#[async_trait]
impl DetailsFetcher for GenericDetailsFetcher {
    async fn fetch(&self, resource: &Resource) -> Result<Resource, FetchError> {
        let state = self
            .provider
            .read_resource(&self.resource_type, resource.id(), resource.attributes())
            .await?;

        match state {
            Some(state) => Ok(self
                .factory
                .create_resource(&self.resource_type, resource.id(), state)?),
            None => {
                tracing::debug!(
                    "{} {} not found by provider {}, keeping listing data",
                    self.resource_type,
                    resource.id(),
                    self.provider.name()
                );
                Ok(resource.clone())
            }
        }
    }
}
