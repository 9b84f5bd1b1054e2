//! Allocator Kernel v1: core domain types.
//!
//! Pure data. Consumers, resources and the per-cycle request/allocation
//! vectors. Maps are BTreeMaps so iteration order never depends on
//! insertion order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::arithmetic::checked_add;
use crate::error::{IndexKind, KernelError, KernelResult, NegativeEntry};

pub type ResourceId = String;
pub type ConsumerId = String;
/// Higher is served first. Unlisted consumers sit at 0.
pub type Priority = i64;

/// resource -> count, for a single consumer.
pub type CountVector = BTreeMap<ResourceId, i64>;

/// consumer -> resource -> requested count. Built fresh every cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestVector {
    entries: BTreeMap<ConsumerId, CountVector>,
}

impl RequestVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the full request slice for one consumer, replacing any previous one.
    pub fn insert(&mut self, consumer: impl Into<ConsumerId>, counts: CountVector) {
        self.entries.insert(consumer.into(), counts);
    }

    /// Set a single (consumer, resource) request.
    pub fn set(&mut self, consumer: &str, resource: &str, count: i64) {
        self.entries
            .entry(consumer.to_string())
            .or_default()
            .insert(resource.to_string(), count);
    }

    pub fn get(&self, consumer: &str, resource: &str) -> i64 {
        self.entries
            .get(consumer)
            .and_then(|c| c.get(resource))
            .copied()
            .unwrap_or(0)
    }

    pub fn slice(&self, consumer: &str) -> Option<&CountVector> {
        self.entries.get(consumer)
    }

    pub fn consumers(&self) -> impl Iterator<Item = &ConsumerId> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ConsumerId, &CountVector)> {
        self.entries.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every negative (consumer, resource, value) triple, in sorted order.
    pub fn negative_entries(&self) -> Vec<NegativeEntry> {
        let mut out = Vec::new();
        for (consumer, counts) in &self.entries {
            for (resource, &value) in counts {
                if value < 0 {
                    out.push(NegativeEntry {
                        consumer: consumer.clone(),
                        resource: resource.clone(),
                        value,
                    });
                }
            }
        }
        out
    }

    /// Sum of all consumers' requests for one resource, saturating.
    pub fn total_for(&self, resource: &str) -> i64 {
        self.entries
            .values()
            .filter_map(|c| c.get(resource))
            .fold(0i64, |acc, &v| acc.saturating_add(v))
    }
}

/// consumer -> resource -> granted count. Each consumer's slice is meant
/// to be taken exactly once by its evolver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AllocationVector {
    entries: BTreeMap<ConsumerId, CountVector>,
}

impl AllocationVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, consumer: &str, resource: &str, count: i64) {
        self.entries
            .entry(consumer.to_string())
            .or_default()
            .insert(resource.to_string(), count);
    }

    /// Make sure `consumer` has a slice, even an empty one.
    pub fn ensure_consumer(&mut self, consumer: &str) {
        self.entries.entry(consumer.to_string()).or_default();
    }

    pub fn get(&self, consumer: &str, resource: &str) -> i64 {
        self.entries
            .get(consumer)
            .and_then(|c| c.get(resource))
            .copied()
            .unwrap_or(0)
    }

    pub fn slice(&self, consumer: &str) -> Option<&CountVector> {
        self.entries.get(consumer)
    }

    /// Remove and return a consumer's slice. A second call for the same
    /// consumer is an error.
    pub fn take_slice(&mut self, consumer: &str) -> KernelResult<CountVector> {
        self.entries
            .remove(consumer)
            .ok_or_else(|| KernelError::index(IndexKind::UnknownConsumer, consumer))
    }

    pub fn consumers(&self) -> impl Iterator<Item = &ConsumerId> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ConsumerId, &CountVector)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_for(&self, resource: &str) -> i64 {
        self.entries
            .values()
            .filter_map(|c| c.get(resource))
            .fold(0i64, |acc, &v| acc.saturating_add(v))
    }
}

/// Count changes a consumer's evolve step wants applied to the pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StateDelta {
    pub counts: CountVector,
}

impl StateDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, resource: &str, delta: i64) -> KernelResult<()> {
        let entry = self.counts.entry(resource.to_string()).or_insert(0);
        *entry = checked_add(*entry, delta)?;
        Ok(())
    }

    /// Fold another delta into this one. On overflow `self` may hold some
    /// of `other`'s entries; callers abort the step.
    pub fn merge(&mut self, other: &StateDelta) -> KernelResult<()> {
        for (resource, delta) in &other.counts {
            self.add(resource, *delta)?;
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.counts.values().all(|&d| d == 0)
    }
}

/// Per-resource summary of one partitioning cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceSummary {
    pub total: i64,
    pub requested: i64,
    pub allocated: i64,
    pub unallocated: i64,
    /// Number of tiers that hit scarcity for this resource.
    pub scarce_tiers: u32,
    /// Units handed out by weighted remainder sampling.
    pub randomized_units: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_vector_is_order_independent() {
        let mut a = RequestVector::new();
        a.set("z", "ATP", 1);
        a.set("a", "ATP", 2);
        let mut b = RequestVector::new();
        b.set("a", "ATP", 2);
        b.set("z", "ATP", 1);
        assert_eq!(a, b);
        let order: Vec<&String> = a.consumers().collect();
        assert_eq!(order, vec!["a", "z"]);
    }

    #[test]
    fn negative_entries_collects_all() {
        let mut r = RequestVector::new();
        r.set("a", "ATP", -1);
        r.set("b", "ATP", 3);
        r.set("b", "GTP", -2);
        let neg = r.negative_entries();
        assert_eq!(neg.len(), 2);
        assert_eq!(neg[0].consumer, "a");
        assert_eq!(neg[1].resource, "GTP");
    }

    #[test]
    fn take_slice_only_once() {
        let mut alloc = AllocationVector::new();
        alloc.set("a", "ATP", 4);
        let slice = alloc.take_slice("a").unwrap();
        assert_eq!(slice.get("ATP"), Some(&4));
        assert!(alloc.take_slice("a").is_err());
    }

    #[test]
    fn state_delta_merge() {
        let mut d = StateDelta::new();
        d.add("ATP", -3).unwrap();
        let mut e = StateDelta::new();
        e.add("ATP", 3).unwrap();
        e.add("ADP", 3).unwrap();
        d.merge(&e).unwrap();
        assert_eq!(d.counts["ATP"], 0);
        assert_eq!(d.counts["ADP"], 3);
        assert!(!d.is_empty());
    }

    #[test]
    fn state_delta_merge_overflow_is_an_error() {
        let mut d = StateDelta::new();
        d.add("ATP", i64::MAX).unwrap();
        let mut e = StateDelta::new();
        e.add("ATP", 1).unwrap();
        let err = d.merge(&e).unwrap_err();
        assert!(matches!(err, KernelError::Overflow(_)));
        assert_eq!(d.counts["ATP"], i64::MAX);
    }
}
