//! Google resource types

use super::metadata::{MetadataRegistry, ResourceMetadata};
use super::Attributes;

pub const GOOGLE_SQL_DATABASE_INSTANCE: &str = "google_sql_database_instance";
pub const GOOGLE_STORAGE_BUCKET: &str = "google_storage_bucket";
pub const GOOGLE_COMPUTE_NETWORK: &str = "google_compute_network";
pub const GOOGLE_COMPUTE_FIREWALL: &str = "google_compute_firewall";

/// Register metadata for every supported Google resource type
pub fn init_resources_metadata(registry: &mut MetadataRegistry) {
    registry.register(
        GOOGLE_SQL_DATABASE_INSTANCE,
        ResourceMetadata {
            normalizer: Some(normalize_sql_database_instance),
        },
    );
    registry.register(
        GOOGLE_STORAGE_BUCKET,
        ResourceMetadata {
            normalizer: Some(normalize_storage_bucket),
        },
    );
    registry.register(
        GOOGLE_COMPUTE_NETWORK,
        ResourceMetadata {
            normalizer: Some(drop_timeouts),
        },
    );
    registry.register(
        GOOGLE_COMPUTE_FIREWALL,
        ResourceMetadata {
            normalizer: Some(drop_timeouts),
        },
    );
}

fn drop_timeouts(attrs: &mut Attributes) {
    attrs.delete("timeouts");
}

fn normalize_sql_database_instance(attrs: &mut Attributes) {
    drop_timeouts(attrs);
    // Bumped by the API on every settings change
    attrs.delete("settings.0.version");
    attrs.delete("server_ca_cert");
    attrs.delete("deletion_protection");
}

fn normalize_storage_bucket(attrs: &mut Attributes) {
    drop_timeouts(attrs);
    attrs.delete("force_destroy");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sql_instance_normalizer() {
        let mut registry = MetadataRegistry::new();
        init_resources_metadata(&mut registry);

        let mut attrs = Attributes::from_value(json!({
            "name": "db",
            "deletion_protection": true,
            "timeouts": {"create": "10m"},
            "settings": [{"version": 4, "tier": "db-f1-micro"}]
        }))
        .unwrap();
        registry.normalize(GOOGLE_SQL_DATABASE_INSTANCE, &mut attrs);

        assert_eq!(
            attrs.into_value(),
            json!({"name": "db", "settings": [{"tier": "db-f1-micro"}]})
        );
    }

    #[test]
    fn test_all_types_registered() {
        let mut registry = MetadataRegistry::new();
        init_resources_metadata(&mut registry);

        assert_eq!(
            registry.types(),
            vec![
                GOOGLE_COMPUTE_FIREWALL,
                GOOGLE_COMPUTE_NETWORK,
                GOOGLE_SQL_DATABASE_INSTANCE,
                GOOGLE_STORAGE_BUCKET,
            ]
        );
    }
}
