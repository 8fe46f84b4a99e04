//! Resource model
//!
//! A [`Resource`] is one live cloud object identified by its Terraform
//! resource type and id, carrying a normalized [`Attributes`] document.
//!
//! # Architecture
//!
//! - [`attributes`] - Path-addressable attribute documents and sanitizing
//! - [`factory`] - Builds resources from listings and provider state
//! - [`metadata`] - Per-type normalization hooks
//! - [`google`] - Google resource types and their metadata

pub mod attributes;
pub mod factory;
pub mod google;
pub mod metadata;

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

pub use attributes::{AttributeError, Attributes};
pub use factory::{FactoryError, ResourceFactory, TerraformResourceFactory};
pub use metadata::{MetadataRegistry, ResourceMetadata};

/// A scanned cloud resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub attributes: Attributes,
}

impl Resource {
    pub fn new(ty: impl Into<String>, id: impl Into<String>, attributes: Attributes) -> Self {
        Self {
            id: id.into(),
            ty: ty.into(),
            attributes,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn resource_type(&self) -> &str {
        &self.ty
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }
}

impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        self.ty == other.ty && self.id == other.id
    }
}

impl Eq for Resource {}

impl PartialOrd for Resource {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Resource {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ty
            .cmp(&other.ty)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Stable sort by `(type, id)`
pub fn sort(resources: &mut [Resource]) {
    resources.sort();
}
