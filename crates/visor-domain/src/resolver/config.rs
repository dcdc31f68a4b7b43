//! Configuration for the permission resolver.

use std::time::Duration;

/// Types listed when no explicit type is requested, in output order.
pub const DEFAULT_OBJECT_TYPES: [&str; 6] =
    ["clients", "groups", "identities", "roles", "schemas", "rules"];

/// Configuration for the permission resolver.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Relation the caller must hold on listed objects.
    pub relation: String,
    /// Listable object types. Their order is the merge order.
    pub known_types: Vec<String>,
    /// Page size of each per-type query.
    pub page_size: u32,
    /// Deadline for collecting fan-out results. `None` waits indefinitely.
    pub fan_out_timeout: Option<Duration>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            relation: "can_view".to_string(),
            known_types: DEFAULT_OBJECT_TYPES.iter().map(|t| t.to_string()).collect(),
            page_size: 100,
            fan_out_timeout: None,
        }
    }
}

impl ResolverConfig {
    pub fn with_relation(mut self, relation: impl Into<String>) -> Self {
        self.relation = relation.into();
        self
    }

    pub fn with_known_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.known_types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_fan_out_timeout(mut self, timeout: Duration) -> Self {
        self.fan_out_timeout = Some(timeout);
        self
    }

    pub fn is_known_type(&self, object_type: &str) -> bool {
        self.known_types.iter().any(|t| t == object_type)
    }
}
