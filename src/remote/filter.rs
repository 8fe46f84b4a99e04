//! Resource type filtering

use std::collections::BTreeSet;

pub trait Filter: Send + Sync {
    /// Whether the whole type is skipped before enumeration
    fn is_type_ignored(&self, resource_type: &str) -> bool;
}

/// Filter from a list of ignored type patterns; a trailing `*` matches any suffix
#[derive(Debug, Clone, Default)]
pub struct TypeFilter {
    ignored: BTreeSet<String>,
}

impl TypeFilter {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ignored: patterns.into_iter().map(Into::into).collect(),
        }
    }
}

impl Filter for TypeFilter {
    fn is_type_ignored(&self, resource_type: &str) -> bool {
        self.ignored.iter().any(|pattern| match pattern.strip_suffix('*') {
            Some(prefix) => resource_type.starts_with(prefix),
            None => pattern == resource_type,
        })
    }
}
