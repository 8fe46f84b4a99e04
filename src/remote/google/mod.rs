//! Google Cloud backend
//!
//! - [`repository`] - Cached, paginated listings of native API objects
//! - [`enumerators`] - One enumerator per supported resource type

pub mod enumerators;
pub mod repository;

use super::error::LibraryError;
use super::library::{GenericDetailsFetcher, RemoteLibrary};
use crate::cache::MemoCache;
use crate::gcp::{ApiTransport, Endpoints};
use crate::resource::google::{
    GOOGLE_COMPUTE_FIREWALL, GOOGLE_COMPUTE_NETWORK, GOOGLE_SQL_DATABASE_INSTANCE,
    GOOGLE_STORAGE_BUCKET,
};
use crate::resource::ResourceFactory;
use crate::terraform::ProviderClient;
use enumerators::{
    GoogleComputeFirewallEnumerator, GoogleComputeNetworkEnumerator,
    GoogleSqlDatabaseInstanceEnumerator, GoogleStorageBucketEnumerator,
};
use repository::{
    CloudSqlRepository, ComputeRepository, GcpCloudSqlRepository, GcpComputeRepository,
    GcpStorageRepository, StorageRepository,
};
use std::sync::Arc;

/// Repositories for every Google service area, sharing one cache
#[derive(Clone)]
pub struct GoogleRepositories {
    pub sql: Arc<dyn CloudSqlRepository>,
    pub storage: Arc<dyn StorageRepository>,
    pub compute: Arc<dyn ComputeRepository>,
}

impl GoogleRepositories {
    pub fn new(client: Arc<dyn ApiTransport>, cache: MemoCache, endpoints: &Endpoints) -> Self {
        Self {
            sql: Arc::new(GcpCloudSqlRepository::new(
                client.clone(),
                cache.clone(),
                &endpoints.sqladmin,
            )),
            storage: Arc::new(GcpStorageRepository::new(
                client.clone(),
                cache.clone(),
                &endpoints.storage,
            )),
            compute: Arc::new(GcpComputeRepository::new(client, cache, &endpoints.compute)),
        }
    }
}

/// Register the Google enumerators, plus details fetchers when a provider is given
pub fn init(
    library: &mut RemoteLibrary,
    repositories: &GoogleRepositories,
    factory: Arc<dyn ResourceFactory>,
    provider: Option<Arc<dyn ProviderClient>>,
) -> Result<(), LibraryError> {
    library.add_enumerator(Arc::new(GoogleSqlDatabaseInstanceEnumerator::new(
        repositories.sql.clone(),
        factory.clone(),
    )))?;
    library.add_enumerator(Arc::new(GoogleStorageBucketEnumerator::new(
        repositories.storage.clone(),
        factory.clone(),
    )))?;
    library.add_enumerator(Arc::new(GoogleComputeNetworkEnumerator::new(
        repositories.compute.clone(),
        factory.clone(),
    )))?;
    library.add_enumerator(Arc::new(GoogleComputeFirewallEnumerator::new(
        repositories.compute.clone(),
        factory.clone(),
    )))?;

    if let Some(provider) = provider {
        for ty in [
            GOOGLE_SQL_DATABASE_INSTANCE,
            GOOGLE_STORAGE_BUCKET,
            GOOGLE_COMPUTE_NETWORK,
            GOOGLE_COMPUTE_FIREWALL,
        ] {
            library.add_details_fetcher(
                ty,
                Arc::new(GenericDetailsFetcher::new(ty, provider.clone(), factory.clone())),
            );
        }
    }

    Ok(())
}
