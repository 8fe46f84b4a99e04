//! Google backend repositories
//!
//! One repository per service area. Each listing drains every page, treats
//! a missing collection as empty, and memoizes the full result in the
//! shared [`MemoCache`] so repeated calls within a scan hit the API once.

use crate::cache::MemoCache;
use crate::gcp::client::{with_page_token, ApiTransport};
use crate::remote::error::BackendError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseInstance {
    pub name: String,
    #[serde(default)]
    pub database_version: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    pub name: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub storage_class: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Network {
    pub name: String,
    #[serde(default)]
    pub self_link: String,
    #[serde(default)]
    pub auto_create_subnetworks: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Firewall {
    pub name: String,
    #[serde(default)]
    pub self_link: String,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default)]
    pub direction: Option<String>,
}

#[async_trait]
pub trait CloudSqlRepository: Send + Sync {
    async fn list_all_database_instances(&self) -> Result<Arc<Vec<DatabaseInstance>>, BackendError>;
}

#[async_trait]
pub trait StorageRepository: Send + Sync {
    async fn list_all_buckets(&self) -> Result<Arc<Vec<Bucket>>, BackendError>;
}

#[async_trait]
pub trait ComputeRepository: Send + Sync {
    async fn list_all_networks(&self) -> Result<Arc<Vec<Network>>, BackendError>;

    async fn list_all_firewalls(&self) -> Result<Arc<Vec<Firewall>>, BackendError>;
}

/// Follow `nextPageToken` until exhausted, collecting `items_field` of every page
pub async fn list_all_pages<T: DeserializeOwned>(
    client: &dyn ApiTransport,
    url: &str,
    items_field: &str,
) -> Result<Vec<T>, BackendError> {
    let mut all_items = Vec::new();
    let mut page_token: Option<String> = None;

    loop {
        let page_url = with_page_token(url, page_token.as_deref());
        let response = match client.get_json(&page_url).await {
            Ok(response) => response,
            Err(BackendError::NotFound) if page_token.is_none() => {
                tracing::debug!("{} not found, treating as empty", url);
                return Ok(Vec::new());
            }
            Err(BackendError::NotFound) => {
                return Err(BackendError::Unknown(format!(
                    "{} disappeared while paginating after {} items",
                    url,
                    all_items.len()
                )))
            }
            Err(e) => return Err(e),
        };

        if let Some(items) = response.get(items_field) {
            let page: Vec<T> = serde_json::from_value(items.clone()).map_err(|e| {
                BackendError::Unknown(format!("Failed to decode {} page: {}", items_field, e))
            })?;
            all_items.extend(page);
        }

        page_token = response
            .get("nextPageToken")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(str::to_string);

        if page_token.is_none() {
            break;
        }
    }

    Ok(all_items)
}

pub struct GcpCloudSqlRepository {
    client: Arc<dyn ApiTransport>,
    cache: MemoCache,
    base_url: String,
}

impl GcpCloudSqlRepository {
    pub fn new(client: Arc<dyn ApiTransport>, cache: MemoCache, base_url: &str) -> Self {
        Self {
            client,
            cache,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl CloudSqlRepository for GcpCloudSqlRepository {
    async fn list_all_database_instances(&self) -> Result<Arc<Vec<DatabaseInstance>>, BackendError> {
        let url = format!(
            "{}/v1/projects/{}/instances",
            self.base_url,
            self.client.project_id()
        );
        self.cache
            .get_or_try_load("sqladminListAllDatabaseInstances", || {
                list_all_pages(self.client.as_ref(), &url, "items")
            })
            .await
    }
}

pub struct GcpStorageRepository {
    client: Arc<dyn ApiTransport>,
    cache: MemoCache,
    base_url: String,
}

impl GcpStorageRepository {
    pub fn new(client: Arc<dyn ApiTransport>, cache: MemoCache, base_url: &str) -> Self {
        Self {
            client,
            cache,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl StorageRepository for GcpStorageRepository {
    async fn list_all_buckets(&self) -> Result<Arc<Vec<Bucket>>, BackendError> {
        let url = format!(
            "{}/storage/v1/b?project={}",
            self.base_url,
            urlencoding::encode(self.client.project_id())
        );
        self.cache
            .get_or_try_load("storageListAllBuckets", || {
                list_all_pages(self.client.as_ref(), &url, "items")
            })
            .await
    }
}

pub struct GcpComputeRepository {
    client: Arc<dyn ApiTransport>,
    cache: MemoCache,
    base_url: String,
}

impl GcpComputeRepository {
    pub fn new(client: Arc<dyn ApiTransport>, cache: MemoCache, base_url: &str) -> Self {
        Self {
            client,
            cache,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn global_url(&self, resource: &str) -> String {
        format!(
            "{}/compute/v1/projects/{}/global/{}",
            self.base_url,
            self.client.project_id(),
            resource
        )
    }
}

#[async_trait]
impl ComputeRepository for GcpComputeRepository {
    async fn list_all_networks(&self) -> Result<Arc<Vec<Network>>, BackendError> {
        let url = self.global_url("networks");
        self.cache
            .get_or_try_load("computeListAllNetworks", || {
                list_all_pages(self.client.as_ref(), &url, "items")
            })
            .await
    }

    async fn list_all_firewalls(&self) -> Result<Arc<Vec<Firewall>>, BackendError> {
        let url = self.global_url("firewalls");
        self.cache
            .get_or_try_load("computeListAllFirewalls", || {
                list_all_pages(self.client.as_ref(), &url, "items")
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Transport replaying canned responses and recording requested URLs
    struct FakeTransport {
        responses: HashMap<String, Result<Value, BackendError>>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeTransport {
        fn new(responses: Vec<(&str, Result<Value, BackendError>)>) -> Arc<Self> {
            Arc::new(Self {
                responses: responses
                    .into_iter()
                    .map(|(url, r)| (url.to_string(), r))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ApiTransport for FakeTransport {
        fn project_id(&self) -> &str {
            "proj"
        }

        async fn get_json(&self, url: &str) -> Result<Value, BackendError> {
            self.calls.lock().unwrap().push(url.to_string());
            self.responses
                .get(url)
                .cloned()
                .unwrap_or_else(|| Err(BackendError::Unknown(format!("unexpected {}", url))))
        }
    }

    const SQL_URL: &str = "http://api/v1/projects/proj/instances";

    #[tokio::test]
    async fn test_list_all_database_instances_drains_pages_and_caches() {
        let transport = FakeTransport::new(vec![
            (
                SQL_URL,
                Ok(json!({"items": [{"name": "db-1"}], "nextPageToken": "p2"})),
            ),
            (
                "http://api/v1/projects/proj/instances?pageToken=p2",
                Ok(json!({"items": [{"name": "db-2", "databaseVersion": "POSTGRES_14"}]})),
            ),
        ]);
        let cache = MemoCache::new(16);
        let repo = GcpCloudSqlRepository::new(transport.clone(), cache.clone(), "http://api/");

        let first = repo.list_all_database_instances().await.unwrap();
        let second = repo.list_all_database_instances().await.unwrap();

        assert_eq!(first.len(), 2);
        assert_eq!(first[1].database_version.as_deref(), Some("POSTGRES_14"));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(transport.calls().len(), 2);
        assert!(cache
            .get::<Vec<DatabaseInstance>>("sqladminListAllDatabaseInstances")
            .is_some());
    }

    #[tokio::test]
    async fn test_not_found_is_empty() {
        let transport = FakeTransport::new(vec![(SQL_URL, Err(BackendError::NotFound))]);
        let repo = GcpCloudSqlRepository::new(transport, MemoCache::new(16), "http://api");

        assert!(repo.list_all_database_instances().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_not_found_mid_pagination_is_an_error() {
        let transport = FakeTransport::new(vec![
            (
                "http://api/storage/v1/b?project=proj",
                Ok(json!({"items": [{"name": "b1"}], "nextPageToken": "p2"})),
            ),
            (
                "http://api/storage/v1/b?project=proj&pageToken=p2",
                Err(BackendError::NotFound),
            ),
        ]);
        let cache = MemoCache::new(16);
        let repo = GcpStorageRepository::new(transport.clone(), cache.clone(), "http://api");

        let err = repo.list_all_buckets().await.unwrap_err();

        assert!(matches!(err, BackendError::Unknown(_)));
        assert!(cache.get::<Vec<Bucket>>("storageListAllBuckets").is_none());
    }

    #[tokio::test]
    async fn test_access_denied_propagates_and_is_not_cached() {
        let denied = BackendError::AccessDenied {
            message: "forbidden".to_string(),
        };
        let transport = FakeTransport::new(vec![(SQL_URL, Err(denied.clone()))]);
        let repo = GcpCloudSqlRepository::new(transport.clone(), MemoCache::new(16), "http://api");

        assert_eq!(repo.list_all_database_instances().await.unwrap_err(), denied);
        assert_eq!(repo.list_all_database_instances().await.unwrap_err(), denied);
        assert_eq!(transport.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_disabled_cache_calls_every_time() {
        let transport = FakeTransport::new(vec![(
            "http://api/compute/v1/projects/proj/global/networks",
            Ok(json!({"items": [{"name": "default"}]})),
        )]);
        let repo = GcpComputeRepository::new(transport.clone(), MemoCache::new(0), "http://api");

        repo.list_all_networks().await.unwrap();
        repo.list_all_networks().await.unwrap();

        assert_eq!(transport.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_listings_share_one_call() {
        let transport = FakeTransport::new(vec![(
            "http://api/storage/v1/b?project=proj",
            Ok(json!({"items": [{"name": "bucket-a"}, {"name": "bucket-b"}]})),
        )]);
        let repo = GcpStorageRepository::new(transport.clone(), MemoCache::new(16), "http://api");

        let (a, b) = tokio::join!(repo.list_all_buckets(), repo.list_all_buckets());

        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
        assert_eq!(transport.calls().len(), 1);
    }
}
