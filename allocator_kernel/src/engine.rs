/// Allocator Kernel v1: Allocator
///
/// Top-level orchestrator for one partitioning step per cycle. Delegates
/// the split to `partition`, validates via `invariants`, and drives the
/// cycle gate.
///
/// Strict sequence: requests only while the gate is open, partition once,
/// then every allocated consumer evolves before the gate reopens.

use std::collections::{BTreeMap, BTreeSet};

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn};

use crate::arithmetic::validate_id;
use crate::config::AllocatorConfig;
use crate::cycle::CycleGate;
use crate::domain::{AllocationVector, ConsumerId, Priority, RequestVector, ResourceId, ResourceSummary};
use crate::error::{IndexKind, KernelError, KernelResult};
use crate::listener::TrackedResourceRecord;
use crate::partition::partition_with_rng;
use crate::pool::{ResourceIndex, ResourcePool};

/// Bookkeeping for one completed partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Zero-based index of the cycle this report belongs to.
    pub cycle: u64,
    pub summary: BTreeMap<ResourceId, ResourceSummary>,
    pub tracked: Option<TrackedResourceRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocatorUpdate {
    pub allocation: AllocationVector,
    pub report: CycleReport,
}

/// Stateful allocator owning its priority table, index cache and RNG.
pub struct Allocator {
    consumer_ids: Vec<ConsumerId>,
    priorities: BTreeMap<ConsumerId, Priority>,
    index: ResourceIndex,
    tracked: Option<ResourceId>,
    seed: u64,
    rng: StdRng,
    cycles: u64,
}

impl Allocator {
    /// Build from config. Rejects malformed or duplicate ids, priority
    /// entries for unknown consumers and an unknown tracked resource.
    pub fn new(config: &AllocatorConfig) -> KernelResult<Self> {
        let mut resources = BTreeSet::new();
        for r in &config.resource_ids {
            validate_id(r)?;
            if !resources.insert(r.as_str()) {
                return Err(KernelError::index(IndexKind::DuplicateResource, r.as_str()));
            }
        }
        let mut consumers = BTreeSet::new();
        for c in &config.consumer_ids {
            validate_id(c)?;
            if !consumers.insert(c.as_str()) {
                return Err(KernelError::index(IndexKind::DuplicateConsumer, c.as_str()));
            }
        }
        for c in config.custom_priorities.keys() {
            if !consumers.contains(c.as_str()) {
                return Err(KernelError::index(IndexKind::UnknownConsumer, c.as_str()));
            }
        }
        if let Some(t) = &config.tracked_resource {
            if !resources.contains(t.as_str()) {
                return Err(KernelError::index(IndexKind::UnknownResource, t.as_str()));
            }
        }

        let priorities = config
            .consumer_ids
            .iter()
            .map(|c| {
                let p = config.custom_priorities.get(c).copied().unwrap_or(0);
                (c.clone(), p)
            })
            .collect();

        Ok(Self {
            consumer_ids: config.consumer_ids.clone(),
            priorities,
            index: ResourceIndex::new(config.resource_ids.clone()),
            tracked: config.tracked_resource.clone(),
            seed: config.seed,
            rng: StdRng::seed_from_u64(config.seed),
            cycles: 0,
        })
    }

    pub fn consumer_ids(&self) -> &[ConsumerId] {
        &self.consumer_ids
    }

    pub fn resource_ids(&self) -> &[ResourceId] {
        self.index.ids()
    }

    pub fn priority_of(&self, consumer: &str) -> Priority {
        self.priorities.get(consumer).copied().unwrap_or(0)
    }

    pub fn priorities(&self) -> &BTreeMap<ConsumerId, Priority> {
        &self.priorities
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Partitions completed so far.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Runs only once the previous cycle's evolvers have finished.
    pub fn update_condition(&self, gate: &CycleGate) -> bool {
        gate.evolvers_ran()
    }

    /// Partition `requests` against the pool's current totals.
    ///
    /// Returns `Ok(None)` without touching anything while the gate is
    /// closed. On success the gate waits for every consumer that submitted
    /// a request to evolve. On failure nothing is published and the gate
    /// reopens; the caller is expected to abort the step.
    pub fn next_update(
        &mut self,
        gate: &mut CycleGate,
        pool: &ResourcePool,
        requests: RequestVector,
    ) -> KernelResult<Option<AllocatorUpdate>> {
        if !self.update_condition(gate) {
            return Ok(None);
        }

        gate.begin_partition()?;
        match self.compute(pool, &requests) {
            Ok(update) => {
                gate.publish(update.allocation.consumers().cloned())?;
                self.cycles += 1;
                info!(
                    cycle = update.report.cycle,
                    consumers = update.allocation.len(),
                    resources = update.report.summary.len(),
                    "allocation published"
                );
                Ok(Some(update))
            }
            Err(err) => {
                gate.abort()?;
                warn!(cycle = self.cycles, error = %err, "partition aborted");
                Err(err)
            }
        }
    }

    fn compute(&mut self, pool: &ResourcePool, requests: &RequestVector) -> KernelResult<AllocatorUpdate> {
        for consumer in requests.consumers() {
            if !self.priorities.contains_key(consumer) {
                return Err(KernelError::index(IndexKind::UnknownConsumer, consumer.as_str()));
            }
        }

        let totals = self.index.totals(pool)?;
        let outcome = partition_with_rng(requests, &self.priorities, &totals, &mut self.rng)?;

        let tracked = self.tracked.as_deref().map(|resource| {
            TrackedResourceRecord::capture(
                resource,
                &self.consumer_ids,
                requests,
                &outcome.allocation,
            )
        });

        Ok(AllocatorUpdate {
            allocation: outcome.allocation,
            report: CycleReport {
                cycle: self.cycles,
                summary: outcome.summary,
                tracked,
            },
        })
    }
}
