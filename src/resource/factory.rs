//! Resource Factory
//!
//! Materializes [`Resource`] values from raw listing data (abstract
//! resources) and from provider-decoded state (typed resources).

use super::metadata::MetadataRegistry;
use super::{Attributes, Resource};
use serde_json::{Map, Value};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FactoryError {
    #[error("Unsupported resource type: {0}")]
    UnsupportedType(String),
}

pub trait ResourceFactory: Send + Sync {
    /// Build a shallow resource from listing data
    fn create_abstract_resource(&self, ty: &str, id: &str, data: Map<String, Value>) -> Resource;

    /// Build a typed resource from provider state: normalized, then sanitized
    fn create_resource(
        &self,
        ty: &str,
        id: &str,
        data: Attributes,
    ) -> Result<Resource, FactoryError>;
}

/// Factory backed by the resource metadata registry
#[derive(Debug, Clone)]
pub struct TerraformResourceFactory {
    metadata: Arc<MetadataRegistry>,
}

impl TerraformResourceFactory {
    pub fn new(metadata: Arc<MetadataRegistry>) -> Self {
        Self { metadata }
    }

    pub fn metadata(&self) -> &MetadataRegistry {
        &self.metadata
    }
}

impl ResourceFactory for TerraformResourceFactory {
    fn create_abstract_resource(&self, ty: &str, id: &str, data: Map<String, Value>) -> Resource {
        Resource::new(ty, id, Attributes::from(data))
    }

    fn create_resource(
        &self,
        ty: &str,
        id: &str,
        mut data: Attributes,
    ) -> Result<Resource, FactoryError> {
        if !self.metadata.contains(ty) {
            return Err(FactoryError::UnsupportedType(ty.to_string()));
        }

        self.metadata.normalize(ty, &mut data);
        Ok(Resource::new(ty, id, data.sanitize_defaults()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::google;
    use serde_json::json;

    fn factory() -> TerraformResourceFactory {
        let mut registry = MetadataRegistry::new();
        google::init_resources_metadata(&mut registry);
        TerraformResourceFactory::new(Arc::new(registry))
    }

    #[test]
    fn test_create_abstract_resource_keeps_data() {
        let mut data = Map::new();
        data.insert("display_name".to_string(), json!("default"));
        let res = factory().create_abstract_resource("google_compute_network", "net", data);

        assert_eq!(res.id(), "net");
        assert_eq!(res.attributes().get_str("display_name"), Some("default"));
    }

    #[test]
    fn test_create_resource_normalizes_and_sanitizes() {
        let data = Attributes::from_value(json!({
            "name": "bucket",
            "force_destroy": true,
            "labels": {},
            "versioning": [{"enabled": false}]
        }))
        .unwrap();
        let res = factory()
            .create_resource(google::GOOGLE_STORAGE_BUCKET, "bucket", data)
            .unwrap();

        assert_eq!(res.attributes().clone().into_value(), json!({"name": "bucket"}));
    }

    #[test]
    fn test_create_resource_unknown_type() {
        let err = factory()
            .create_resource("aws_s3_bucket", "b", Attributes::new())
            .unwrap_err();

        assert_eq!(err, FactoryError::UnsupportedType("aws_s3_bucket".to_string()));
    }
}
