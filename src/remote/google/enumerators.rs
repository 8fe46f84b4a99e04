//! Enumerators for the supported Google resource types

use super::repository::{CloudSqlRepository, ComputeRepository, StorageRepository};
use crate::remote::error::ResourceListingError;
use crate::remote::library::Enumerator;
use crate::resource::google::{
    GOOGLE_COMPUTE_FIREWALL, GOOGLE_COMPUTE_NETWORK, GOOGLE_SQL_DATABASE_INSTANCE,
    GOOGLE_STORAGE_BUCKET,
};
use crate::resource::{Resource, ResourceFactory};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;

const COMPUTE_SELF_LINK_PREFIX: &str = "https://www.googleapis.com/compute/v1/";

/// Compute resources are identified by their self link relative to the API root
fn compute_id(self_link: &str, name: &str) -> String {
    if self_link.is_empty() {
        return name.to_string();
    }
    self_link
        .strip_prefix(COMPUTE_SELF_LINK_PREFIX)
        .unwrap_or(self_link)
        .to_string()
}

fn stub_data(pairs: &[(&str, Option<Value>)]) -> Map<String, Value> {
    pairs
        .iter()
        .filter_map(|(key, value)| value.clone().map(|v| (key.to_string(), v)))
        .collect()
}

pub struct GoogleSqlDatabaseInstanceEnumerator {
    repository: Arc<dyn CloudSqlRepository>,
    factory: Arc<dyn ResourceFactory>,
}

impl GoogleSqlDatabaseInstanceEnumerator {
    pub fn new(repository: Arc<dyn CloudSqlRepository>, factory: Arc<dyn ResourceFactory>) -> Self {
        Self {
            repository,
            factory,
        }
    }
}

#[async_trait]
impl Enumerator for GoogleSqlDatabaseInstanceEnumerator {
    fn supported_type(&self) -> &str {
        GOOGLE_SQL_DATABASE_INSTANCE
    }

    async fn enumerate(&self) -> Result<Vec<Resource>, ResourceListingError> {
        let instances = self
            .repository
            .list_all_database_instances()
            .await
            .map_err(|e| ResourceListingError::new(e, self.supported_type()))?;

        Ok(instances
            .iter()
            .map(|instance| {
                let data = stub_data(&[
                    ("name", Some(json!(instance.name))),
                    ("database_version", instance.database_version.clone().map(Value::from)),
                    ("region", instance.region.clone().map(Value::from)),
                ]);
                self.factory
                    .create_abstract_resource(self.supported_type(), &instance.name, data)
            })
            .collect())
    }
}

pub struct GoogleStorageBucketEnumerator {
    repository: Arc<dyn StorageRepository>,
    factory: Arc<dyn ResourceFactory>,
}

impl GoogleStorageBucketEnumerator {
    pub fn new(repository: Arc<dyn StorageRepository>, factory: Arc<dyn ResourceFactory>) -> Self {
        Self {
            repository,
            factory,
        }
    }
}

#[async_trait]
impl Enumerator for GoogleStorageBucketEnumerator {
    fn supported_type(&self) -> &str {
        GOOGLE_STORAGE_BUCKET
    }

    async fn enumerate(&self) -> Result<Vec<Resource>, ResourceListingError> {
        let buckets = self
            .repository
            .list_all_buckets()
            .await
            .map_err(|e| ResourceListingError::new(e, self.supported_type()))?;

        Ok(buckets
            .iter()
            .map(|bucket| {
                let data = stub_data(&[
                    ("name", Some(json!(bucket.name))),
                    ("location", bucket.location.clone().map(Value::from)),
                    ("storage_class", bucket.storage_class.clone().map(Value::from)),
                ]);
                self.factory
                    .create_abstract_resource(self.supported_type(), &bucket.name, data)
            })
            .collect())
    }
}

pub struct GoogleComputeNetworkEnumerator {
    repository: Arc<dyn ComputeRepository>,
    factory: Arc<dyn ResourceFactory>,
}

impl GoogleComputeNetworkEnumerator {
    pub fn new(repository: Arc<dyn ComputeRepository>, factory: Arc<dyn ResourceFactory>) -> Self {
        Self {
            repository,
            factory,
        }
    }
}

#[async_trait]
impl Enumerator for GoogleComputeNetworkEnumerator {
    fn supported_type(&self) -> &str {
        GOOGLE_COMPUTE_NETWORK
    }

    async fn enumerate(&self) -> Result<Vec<Resource>, ResourceListingError> {
        let networks = self
            .repository
            .list_all_networks()
            .await
            .map_err(|e| ResourceListingError::new(e, self.supported_type()))?;

        Ok(networks
            .iter()
            .map(|network| {
                let data = stub_data(&[
                    ("name", Some(json!(network.name))),
                    (
                        "auto_create_subnetworks",
                        network.auto_create_subnetworks.map(Value::from),
                    ),
                ]);
                self.factory.create_abstract_resource(
                    self.supported_type(),
                    &compute_id(&network.self_link, &network.name),
                    data,
                )
            })
            .collect())
    }
}

pub struct GoogleComputeFirewallEnumerator {
    repository: Arc<dyn ComputeRepository>,
    factory: Arc<dyn ResourceFactory>,
}

impl GoogleComputeFirewallEnumerator {
    pub fn new(repository: Arc<dyn ComputeRepository>, factory: Arc<dyn ResourceFactory>) -> Self {
        Self {
            repository,
            factory,
        }
    }
}

#[async_trait]
impl Enumerator for GoogleComputeFirewallEnumerator {
    fn supported_type(&self) -> &str {
        GOOGLE_COMPUTE_FIREWALL
    }

    async fn enumerate(&self) -> Result<Vec<Resource>, ResourceListingError> {
        let firewalls = self
            .repository
            .list_all_firewalls()
            .await
            .map_err(|e| ResourceListingError::new(e, self.supported_type()))?;

        Ok(firewalls
            .iter()
            .map(|firewall| {
                let data = stub_data(&[
                    ("name", Some(json!(firewall.name))),
                    ("network", firewall.network.clone().map(Value::from)),
                    ("direction", firewall.direction.clone().map(Value::from)),
                ]);
                self.factory.create_abstract_resource(
                    self.supported_type(),
                    &compute_id(&firewall.self_link, &firewall.name),
                    data,
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::error::BackendError;
    use crate::remote::google::repository::{DatabaseInstance, Firewall, Network};
    use crate::resource::metadata::MetadataRegistry;
    use crate::resource::TerraformResourceFactory;

    struct FakeSql(Result<Arc<Vec<DatabaseInstance>>, BackendError>);

    #[async_trait]
    impl CloudSqlRepository for FakeSql {
        async fn list_all_database_instances(
            &self,
        ) -> Result<Arc<Vec<DatabaseInstance>>, BackendError> {
            self.0.clone()
        }
    }

    struct FakeCompute {
        networks: Vec<Network>,
        firewalls: Vec<Firewall>,
    }

    #[async_trait]
    impl ComputeRepository for FakeCompute {
        async fn list_all_networks(&self) -> Result<Arc<Vec<Network>>, BackendError> {
            Ok(Arc::new(self.networks.clone()))
        }

        async fn list_all_firewalls(&self) -> Result<Arc<Vec<Firewall>>, BackendError> {
            Ok(Arc::new(self.firewalls.clone()))
        }
    }

    fn factory() -> Arc<dyn ResourceFactory> {
        Arc::new(TerraformResourceFactory::new(Arc::new(MetadataRegistry::new())))
    }

    fn instance(name: &str) -> DatabaseInstance {
        DatabaseInstance {
            name: name.to_string(),
            database_version: Some("POSTGRES_14".to_string()),
            region: None,
            state: None,
        }
    }

    #[tokio::test]
    async fn test_sql_instances_become_stubs() {
        let enumerator = GoogleSqlDatabaseInstanceEnumerator::new(
            Arc::new(FakeSql(Ok(Arc::new(vec![instance("db-1"), instance("db-2")])))),
            factory(),
        );

        let resources = enumerator.enumerate().await.unwrap();

        assert_eq!(resources.len(), 2);
        assert_eq!(resources[0].id(), "db-1");
        assert_eq!(resources[0].resource_type(), GOOGLE_SQL_DATABASE_INSTANCE);
        assert_eq!(
            resources[0].attributes().get_str("database_version"),
            Some("POSTGRES_14")
        );
        assert!(resources[0].attributes().get("region").is_none());
    }

    #[tokio::test]
    async fn test_listing_error_carries_type() {
        let enumerator = GoogleSqlDatabaseInstanceEnumerator::new(
            Arc::new(FakeSql(Err(BackendError::AccessDenied {
                message: "forbidden".to_string(),
            }))),
            factory(),
        );

        let err = enumerator.enumerate().await.unwrap_err();

        assert_eq!(err.resource_type, GOOGLE_SQL_DATABASE_INSTANCE);
        assert!(err.is_access_denied());
    }

    #[tokio::test]
    async fn test_compute_ids_strip_api_root() {
        let repository = Arc::new(FakeCompute {
            networks: vec![Network {
                name: "default".to_string(),
                self_link:
                    "https://www.googleapis.com/compute/v1/projects/p/global/networks/default"
                        .to_string(),
                auto_create_subnetworks: Some(true),
            }],
            firewalls: vec![Firewall {
                name: "allow-ssh".to_string(),
                self_link: String::new(),
                network: None,
                direction: Some("INGRESS".to_string()),
            }],
        });

        let networks = GoogleComputeNetworkEnumerator::new(repository.clone(), factory())
            .enumerate()
            .await
            .unwrap();
        let firewalls = GoogleComputeFirewallEnumerator::new(repository, factory())
            .enumerate()
            .await
            .unwrap();

        assert_eq!(networks[0].id(), "projects/p/global/networks/default");
        assert_eq!(firewalls[0].id(), "allow-ssh");
    }
}
