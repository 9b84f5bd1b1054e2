//! Drift detection: determinism verification and allocation comparison.
//!
//! All values are integer counts. No float arithmetic anywhere.

use std::collections::{BTreeMap, BTreeSet};

use allocator_kernel::domain::{ConsumerId, ResourceId};
use allocator_kernel::{AllocationVector, ResourcePool};
use tracing::warn;

use crate::error::{RuntimeError, RuntimeResult};
use crate::scenario::Scenario;
use crate::session::StepOutcome;

/// Replay the same scenario twice in lockstep and require identical
/// allocations at every step and identical final pools. Returns the
/// agreed history hash.
pub fn verify_determinism(scenario: &Scenario, steps: u64) -> RuntimeResult<String> {
    let mut first = scenario.build_session("verify-1", None)?;
    let mut second = scenario.build_session("verify-2", None)?;

    for _ in 0..steps {
        let a = first.step()?;
        let b = second.step()?;
        let diverged = first_divergence(std::slice::from_ref(&a), std::slice::from_ref(&b));
        if let Some((step, report)) = diverged {
            warn!(step, differences = report.differences.len(), "replays diverged");
            return Err(RuntimeError::Determinism {
                step,
                first: a.allocation_hash,
                second: b.allocation_hash,
                differences: report.differences.len(),
            });
        }
    }

    let (hash1, hash2) = (first.history_hash(), second.history_hash());
    if hash1 != hash2 || first.pool() != second.pool() {
        return Err(RuntimeError::Determinism {
            step: steps,
            first: hash1,
            second: hash2,
            differences: compare_pools(first.pool(), second.pool()).len(),
        });
    }
    Ok(hash1)
}

/// First step at which two runs published different allocations, with the
/// cell-level drift at that step. Outcomes are paired in order.
pub fn first_divergence(a: &[StepOutcome], b: &[StepOutcome]) -> Option<(u64, DriftReport)> {
    a.iter()
        .zip(b)
        .find(|(x, y)| x.allocation_hash != y.allocation_hash)
        .map(|(x, y)| (x.step, compare_allocations(&x.allocation, &y.allocation)))
}

/// One (consumer, resource) cell that differs between two allocations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationDrift {
    pub consumer: ConsumerId,
    pub resource: ResourceId,
    pub a: i64,
    pub b: i64,
    pub delta: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriftReport {
    /// Consumers with a slice only in `b`.
    pub added_consumers: Vec<ConsumerId>,
    /// Consumers with a slice only in `a`.
    pub removed_consumers: Vec<ConsumerId>,
    pub differences: Vec<AllocationDrift>,
    /// Per-resource `total(b) - total(a)`, nonzero entries only.
    pub total_deltas: BTreeMap<ResourceId, i64>,
}

impl DriftReport {
    pub fn is_clean(&self) -> bool {
        self.added_consumers.is_empty()
            && self.removed_consumers.is_empty()
            && self.differences.is_empty()
    }
}

/// Structured allocation comparison. Missing entries count as 0.
pub fn compare_allocations(a: &AllocationVector, b: &AllocationVector) -> DriftReport {
    let ids_a: BTreeSet<&ConsumerId> = a.consumers().collect();
    let ids_b: BTreeSet<&ConsumerId> = b.consumers().collect();

    let added_consumers = ids_b.difference(&ids_a).map(|s| s.to_string()).collect();
    let removed_consumers = ids_a.difference(&ids_b).map(|s| s.to_string()).collect();

    let mut cells: BTreeSet<(&str, &str)> = BTreeSet::new();
    for (consumer, counts) in a.iter().chain(b.iter()) {
        for resource in counts.keys() {
            cells.insert((consumer.as_str(), resource.as_str()));
        }
    }

    let mut differences = Vec::new();
    let mut total_deltas: BTreeMap<ResourceId, i64> = BTreeMap::new();
    for (consumer, resource) in cells {
        let va = a.get(consumer, resource);
        let vb = b.get(consumer, resource);
        if va != vb {
            differences.push(AllocationDrift {
                consumer: consumer.to_string(),
                resource: resource.to_string(),
                a: va,
                b: vb,
                delta: vb.saturating_sub(va),
            });
            let entry = total_deltas.entry(resource.to_string()).or_insert(0);
            *entry = entry.saturating_add(vb.saturating_sub(va));
        }
    }
    total_deltas.retain(|_, d| *d != 0);

    DriftReport {
        added_consumers,
        removed_consumers,
        differences,
        total_deltas,
    }
}

/// Per-resource `count(b) - count(a)` for resources whose counts differ.
/// Resources present in only one pool count as 0 in the other.
pub fn compare_pools(a: &ResourcePool, b: &ResourcePool) -> BTreeMap<ResourceId, i64> {
    let mut out = BTreeMap::new();
    let counts_a: BTreeMap<&str, i64> = a.entries().collect();
    let counts_b: BTreeMap<&str, i64> = b.entries().collect();
    let ids: BTreeSet<&str> = counts_a.keys().chain(counts_b.keys()).copied().collect();
    for id in ids {
        let va = counts_a.get(id).copied().unwrap_or(0);
        let vb = counts_b.get(id).copied().unwrap_or(0);
        if va != vb {
            out.insert(id.to_string(), vb.saturating_sub(va));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_allocations_are_clean() {
        let mut a = AllocationVector::new();
        a.set("x", "ATP", 3);
        let report = compare_allocations(&a, &a.clone());
        assert!(report.is_clean());
        assert!(report.total_deltas.is_empty());
    }

    #[test]
    fn reports_cell_and_consumer_differences() {
        let mut a = AllocationVector::new();
        a.set("x", "ATP", 3);
        a.set("y", "ATP", 2);
        let mut b = AllocationVector::new();
        b.set("x", "ATP", 4);
        b.set("z", "GTP", 1);

        let report = compare_allocations(&a, &b);
        assert_eq!(report.added_consumers, vec!["z"]);
        assert_eq!(report.removed_consumers, vec!["y"]);
        assert_eq!(report.differences.len(), 3);
        assert_eq!(
            report.differences[0],
            AllocationDrift {
                consumer: "x".into(),
                resource: "ATP".into(),
                a: 3,
                b: 4,
                delta: 1,
            }
        );
        // x +1, y -2 on ATP; z +1 on GTP.
        assert_eq!(report.total_deltas.get("ATP"), Some(&-1));
        assert_eq!(report.total_deltas.get("GTP"), Some(&1));
    }

    #[test]
    fn pool_comparison_lists_changed_counts() {
        let a = ResourcePool::new([("ATP", 10), ("GTP", 5)]).unwrap();
        let b = ResourcePool::new([("ATP", 7), ("GTP", 5), ("UTP", 2)]).unwrap();
        let diff = compare_pools(&a, &b);
        assert_eq!(diff.len(), 2);
        assert_eq!(diff["ATP"], -3);
        assert_eq!(diff["UTP"], 2);
    }
}
