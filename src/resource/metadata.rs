//! Per-type resource metadata
//!
//! Each supported resource type may register a normalizer that strips
//! fields the provider reports but that never participate in drift
//! comparison (terraform-only arguments, volatile server-side counters).

use super::Attributes;
use std::collections::HashMap;

/// Normalizer applied to provider state before sanitizing
pub type Normalizer = fn(&mut Attributes);

/// Metadata registered for one resource type
#[derive(Debug, Clone, Default)]
pub struct ResourceMetadata {
    pub normalizer: Option<Normalizer>,
}

/// Explicit registry of resource metadata, built once at startup
#[derive(Debug, Clone, Default)]
pub struct MetadataRegistry {
    entries: HashMap<String, ResourceMetadata>,
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, ty: &str, metadata: ResourceMetadata) {
        self.entries.insert(ty.to_string(), metadata);
    }

    /// Register a normalizer, keeping other metadata for the type
    pub fn set_normalizer(&mut self, ty: &str, normalizer: Normalizer) {
        self.entries.entry(ty.to_string()).or_default().normalizer = Some(normalizer);
    }

    pub fn get(&self, ty: &str) -> Option<&ResourceMetadata> {
        self.entries.get(ty)
    }

    pub fn contains(&self, ty: &str) -> bool {
        self.entries.contains_key(ty)
    }

    /// All registered types, sorted
    pub fn types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Apply the type's normalizer if one is registered
    pub fn normalize(&self, ty: &str, attributes: &mut Attributes) {
        if let Some(normalizer) = self.get(ty).and_then(|m| m.normalizer) {
            normalizer(attributes);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drop_etag(attrs: &mut Attributes) {
        attrs.delete("etag");
    }

    #[test]
    fn test_normalize_applies_registered_hook() {
        let mut registry = MetadataRegistry::new();
        registry.set_normalizer("t", drop_etag);

        let mut attrs = Attributes::new();
        attrs.set("etag", "abc").unwrap();
        attrs.set("name", "x").unwrap();
        registry.normalize("t", &mut attrs);
        registry.normalize("unknown", &mut attrs);

        assert!(attrs.get("etag").is_none());
        assert_eq!(attrs.get_str("name"), Some("x"));
        assert_eq!(registry.types(), vec!["t"]);
    }
}
