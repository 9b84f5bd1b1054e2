//! JSON scenarios: a pool, the consumers competing for it, and a seed.
//!
//! ```json
//! {
//!   "seed": 7,
//!   "steps": 20,
//!   "tracked_resource": "ATP[c]",
//!   "pool": [{ "id": "ATP[c]", "count": 1000 }],
//!   "consumers": [
//!     { "kind": "fixed", "name": "polymerase", "priority": 10,
//!       "demand": { "ATP[c]": 120 } },
//!     { "kind": "proportional", "name": "ribosome",
//!       "resources": ["ATP[c]"], "per_mille": 300 }
//!   ]
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use allocator_kernel::domain::{ConsumerId, CountVector, Priority, ResourceId};
use allocator_kernel::{AllocatorConfig, ResourcePool};
use serde::{Deserialize, Serialize};

use crate::consumers::{FixedDemand, ProportionalDemand};
use crate::error::{RuntimeError, RuntimeResult};
use crate::session::{BoxedConsumer, Session};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    #[serde(default)]
    pub seed: u64,
    /// Default step count when the caller does not give one.
    #[serde(default = "default_steps")]
    pub steps: u64,
    #[serde(default)]
    pub tracked_resource: Option<ResourceId>,
    /// Pool entries in table order.
    pub pool: Vec<PoolEntry>,
    pub consumers: Vec<ConsumerSpec>,
}

fn default_steps() -> u64 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoolEntry {
    pub id: ResourceId,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConsumerSpec {
    Fixed {
        name: ConsumerId,
        #[serde(default)]
        priority: Priority,
        demand: CountVector,
        #[serde(default)]
        production: CountVector,
    },
    Proportional {
        name: ConsumerId,
        #[serde(default)]
        priority: Priority,
        resources: Vec<ResourceId>,
        per_mille: i64,
    },
}

impl ConsumerSpec {
    pub fn name(&self) -> &str {
        match self {
            ConsumerSpec::Fixed { name, .. } | ConsumerSpec::Proportional { name, .. } => name,
        }
    }

    pub fn priority(&self) -> Priority {
        match self {
            ConsumerSpec::Fixed { priority, .. } | ConsumerSpec::Proportional { priority, .. } => {
                *priority
            }
        }
    }

    fn build(&self) -> BoxedConsumer {
        match self {
            ConsumerSpec::Fixed {
                name,
                demand,
                production,
                ..
            } => Box::new(FixedDemand::new(name, demand.clone()).with_production(production.clone())),
            ConsumerSpec::Proportional {
                name,
                resources,
                per_mille,
                ..
            } => Box::new(ProportionalDemand::new(name, resources.clone(), *per_mille)),
        }
    }
}

impl Scenario {
    pub fn from_json_str(s: &str) -> RuntimeResult<Self> {
        serde_json::from_str(s).map_err(|e| RuntimeError::Scenario(e.to_string()))
    }

    pub fn from_path(path: &Path) -> RuntimeResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Allocator config derived from the scenario. Every pool resource is
    /// partitioned; nonzero priorities become custom priorities.
    pub fn allocator_config(&self, seed: u64) -> AllocatorConfig {
        let mut config = AllocatorConfig::new(
            self.pool.iter().map(|e| e.id.clone()).collect(),
            self.consumers.iter().map(|c| c.name().to_string()).collect(),
        )
        .with_seed(seed);
        let custom: BTreeMap<ConsumerId, Priority> = self
            .consumers
            .iter()
            .filter(|c| c.priority() != 0)
            .map(|c| (c.name().to_string(), c.priority()))
            .collect();
        config.custom_priorities = custom;
        config.tracked_resource = self.tracked_resource.clone();
        config
    }

    /// Build a fresh session. `seed` overrides the scenario's own seed.
    pub fn build_session(&self, session_id: &str, seed: Option<u64>) -> RuntimeResult<Session> {
        let pool = ResourcePool::new(self.pool.iter().map(|e| (e.id.as_str(), e.count)))?;
        let config = self.allocator_config(seed.unwrap_or(self.seed));
        let consumers = self.consumers.iter().map(ConsumerSpec::build).collect();
        Session::new(session_id, pool, &config, consumers)
    }
}
