//! Tracked-resource listener.
//!
//! For one configured resource (typically ATP) the allocator records what
//! each consumer asked for and what it was initially granted, every cycle.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{AllocationVector, ConsumerId, RequestVector, ResourceId};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrackedResourceRecord {
    pub resource: ResourceId,
    pub requested: BTreeMap<ConsumerId, i64>,
    pub allocated_initial: BTreeMap<ConsumerId, i64>,
}

impl TrackedResourceRecord {
    /// Capture `resource` for every known consumer, zero-filled.
    pub fn capture<'a, I>(
        resource: &str,
        consumers: I,
        requests: &RequestVector,
        allocation: &AllocationVector,
    ) -> Self
    where
        I: IntoIterator<Item = &'a ConsumerId>,
    {
        let mut requested = BTreeMap::new();
        let mut allocated_initial = BTreeMap::new();
        for consumer in consumers {
            requested.insert(consumer.clone(), requests.get(consumer, resource));
            allocated_initial.insert(consumer.clone(), allocation.get(consumer, resource));
        }
        Self {
            resource: resource.to_string(),
            requested,
            allocated_initial,
        }
    }

    pub fn total_requested(&self) -> i64 {
        self.requested.values().fold(0i64, |acc, &v| acc.saturating_add(v))
    }

    pub fn total_allocated(&self) -> i64 {
        self.allocated_initial.values().fold(0i64, |acc, &v| acc.saturating_add(v))
    }
}
