//! Allocator configuration.
//!
//! Supplied by the host at construction and immutable afterwards.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::{ConsumerId, Priority, ResourceId};
use crate::error::{KernelError, KernelResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AllocatorConfig {
    /// Resources the allocator partitions, in index order.
    pub resource_ids: Vec<ResourceId>,
    /// Every consumer that may submit requests.
    pub consumer_ids: Vec<ConsumerId>,
    /// Custom priorities. Consumers not listed get 0.
    #[serde(default)]
    pub custom_priorities: BTreeMap<ConsumerId, Priority>,
    #[serde(default)]
    pub seed: u64,
    /// Resource whose per-consumer requests and grants are recorded each cycle.
    #[serde(default)]
    pub tracked_resource: Option<ResourceId>,
}

impl AllocatorConfig {
    pub fn new(resource_ids: Vec<ResourceId>, consumer_ids: Vec<ConsumerId>) -> Self {
        Self {
            resource_ids,
            consumer_ids,
            custom_priorities: BTreeMap::new(),
            seed: 0,
            tracked_resource: None,
        }
    }

    pub fn with_priority(mut self, consumer: &str, priority: Priority) -> Self {
        self.custom_priorities.insert(consumer.to_string(), priority);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_tracked_resource(mut self, resource: &str) -> Self {
        self.tracked_resource = Some(resource.to_string());
        self
    }

    pub fn from_json_str(s: &str) -> KernelResult<Self> {
        serde_json::from_str(s).map_err(|e| KernelError::Config(e.to_string()))
    }

    pub fn from_path(path: &Path) -> KernelResult<Self> {
        let data = fs::read_to_string(path)
            .map_err(|e| KernelError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_with_defaults() {
        let cfg = AllocatorConfig::from_json_str(
            r#"{"resource_ids": ["ATP[c]"], "consumer_ids": ["tf_binding"]}"#,
        )
        .unwrap();
        assert_eq!(cfg.seed, 0);
        assert!(cfg.custom_priorities.is_empty());
        assert_eq!(cfg.tracked_resource, None);
    }

    #[test]
    fn rejects_unknown_fields() {
        let err = AllocatorConfig::from_json_str(
            r#"{"resource_ids": [], "consumer_ids": [], "bogus": 1}"#,
        )
        .unwrap_err();
        assert!(matches!(err, KernelError::Config(_)));
    }

    #[test]
    fn builder_sets_fields() {
        let cfg = AllocatorConfig::new(vec!["ATP".into()], vec!["a".into()])
            .with_priority("a", 10)
            .with_seed(7)
            .with_tracked_resource("ATP");
        assert_eq!(cfg.custom_priorities["a"], 10);
        assert_eq!(cfg.seed, 7);
        assert_eq!(cfg.tracked_resource.as_deref(), Some("ATP"));
    }
}
