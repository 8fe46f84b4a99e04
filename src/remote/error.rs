//! Remote error taxonomy

use crate::resource::FactoryError;
use crate::terraform::ProviderError;

/// Classified failure of a native backend call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The caller lacks permission; degrades to an alert and an empty result
    #[error("access denied: {message}")]
    AccessDenied { message: String },

    /// Rate limited; only escapes the HTTP layer as `Unknown` once retries run out
    #[error("request throttled")]
    Throttled,

    /// The listed collection does not exist; repositories return nothing
    #[error("not found")]
    NotFound,

    #[error("{0}")]
    Unknown(String),
}

impl BackendError {
    pub fn is_access_denied(&self) -> bool {
        matches!(self, BackendError::AccessDenied { .. })
    }
}

/// Listing one resource type failed; fatal for that type only
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unable to list {resource_type}: {source}")]
pub struct ResourceListingError {
    pub resource_type: String,
    pub source: BackendError,
}

impl ResourceListingError {
    pub fn new(source: BackendError, resource_type: &str) -> Self {
        Self {
            resource_type: resource_type.to_string(),
            source,
        }
    }

    pub fn is_access_denied(&self) -> bool {
        self.source.is_access_denied()
    }
}

/// Enriching a resource through its details fetcher failed
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Factory(#[from] FactoryError),
}

impl FetchError {
    pub fn is_access_denied(&self) -> bool {
        matches!(self, FetchError::Provider(e) if e.is_access_denied())
    }

    /// No further resource of the type can be read
    pub fn stops_type(&self) -> bool {
        match self {
            FetchError::Provider(e) => {
                e.is_provider_failure() || matches!(e, ProviderError::UnknownResourceType(_))
            }
            FetchError::Factory(_) => false,
        }
    }
}

/// Lookups against the remote library
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LibraryError {
    #[error("No enumerator registered for resource type {0}")]
    Unregistered(String),

    #[error("An enumerator is already registered for resource type {0}")]
    DuplicateEnumerator(String),
}

/// Whole-scan failures
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("scan cancelled")]
    Cancelled,

    #[error("scan task failed: {0}")]
    Task(String),
}
