//! Allocator Kernel v1: resource pool and index resolution.
//!
//! `ResourcePool` is the shared count table. `ResourceIndex` resolves a
//! fixed list of ids to positions in that table once, on first use, and
//! keeps the mapping for the rest of the run.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::arithmetic::checked_add;
use crate::domain::{ResourceId, StateDelta};
use crate::error::{IndexKind, KernelError, KernelResult};

/// Ordered table of `(id, count)` pairs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourcePool {
    ids: Vec<ResourceId>,
    counts: Vec<i64>,
}

impl ResourcePool {
    /// Build a pool. Ids must be unique and counts nonnegative.
    pub fn new<I, S>(entries: I) -> KernelResult<Self>
    where
        I: IntoIterator<Item = (S, i64)>,
        S: Into<ResourceId>,
    {
        let mut ids = Vec::new();
        let mut counts = Vec::new();
        let mut seen = BTreeSet::new();
        for (id, count) in entries {
            let id = id.into();
            if !seen.insert(id.clone()) {
                return Err(KernelError::index(IndexKind::DuplicateResource, id));
            }
            if count < 0 {
                return Err(KernelError::NegativeCount {
                    resource: id,
                    value: count,
                });
            }
            ids.push(id);
            counts.push(count);
        }
        Ok(Self { ids, counts })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[ResourceId] {
        &self.ids
    }

    /// Linear scan. Callers that resolve repeatedly go through `ResourceIndex`.
    pub fn index_of(&self, id: &str) -> KernelResult<usize> {
        self.ids
            .iter()
            .position(|r| r == id)
            .ok_or_else(|| KernelError::index(IndexKind::UnknownResource, id))
    }

    pub fn count(&self, id: &str) -> KernelResult<i64> {
        Ok(self.counts[self.index_of(id)?])
    }

    /// Counts at `indices`. An index past the end of the table fails.
    pub fn counts_at(&self, indices: &[usize]) -> KernelResult<Vec<i64>> {
        indices
            .iter()
            .map(|&i| {
                self.counts
                    .get(i)
                    .copied()
                    .ok_or_else(|| KernelError::index(IndexKind::UnknownResource, format!("#{i}")))
            })
            .collect()
    }

    /// Apply a state delta. Either every entry applies or none does.
    pub fn apply_delta(&mut self, delta: &StateDelta) -> KernelResult<()> {
        let mut staged = self.counts.clone();
        for (resource, &change) in &delta.counts {
            let idx = self.index_of(resource)?;
            let next = checked_add(staged[idx], change)?;
            if next < 0 {
                return Err(KernelError::NegativeCount {
                    resource: resource.clone(),
                    value: next,
                });
            }
            staged[idx] = next;
        }
        self.counts = staged;
        Ok(())
    }

    /// `(id, count)` pairs in table order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, i64)> {
        self.ids
            .iter()
            .map(|s| s.as_str())
            .zip(self.counts.iter().copied())
    }
}

/// Lazily built id -> position cache for a fixed list of resource ids.
#[derive(Debug, Clone)]
pub struct ResourceIndex {
    ids: Vec<ResourceId>,
    positions: Option<Vec<usize>>,
}

impl ResourceIndex {
    pub fn new(ids: Vec<ResourceId>) -> Self {
        Self {
            ids,
            positions: None,
        }
    }

    pub fn ids(&self) -> &[ResourceId] {
        &self.ids
    }

    pub fn is_resolved(&self) -> bool {
        self.positions.is_some()
    }

    /// Resolve against `pool` on first call; return the cached mapping after.
    pub fn resolve(&mut self, pool: &ResourcePool) -> KernelResult<&[usize]> {
        if self.positions.is_none() {
            let lookup: BTreeMap<&str, usize> = pool
                .ids()
                .iter()
                .enumerate()
                .map(|(i, id)| (id.as_str(), i))
                .collect();
            let mut positions = Vec::with_capacity(self.ids.len());
            for id in &self.ids {
                let idx = lookup
                    .get(id.as_str())
                    .copied()
                    .ok_or_else(|| KernelError::index(IndexKind::UnknownResource, id.as_str()))?;
                positions.push(idx);
            }
            tracing::debug!(resources = positions.len(), "resource index resolved");
            self.positions = Some(positions);
        }
        Ok(self.positions.as_deref().unwrap_or(&[]))
    }

    /// Current totals for the indexed ids, keyed by id.
    ///
    /// The cached positions must still name the same ids in `pool`; a pool
    /// with a different layout fails instead of being read at stale offsets.
    pub fn totals(&mut self, pool: &ResourcePool) -> KernelResult<BTreeMap<ResourceId, i64>> {
        let positions = self.resolve(pool)?.to_vec();
        for (id, &pos) in self.ids.iter().zip(&positions) {
            if pool.ids().get(pos) != Some(id) {
                return Err(KernelError::index(IndexKind::UnknownResource, id.as_str()));
            }
        }
        let counts = pool.counts_at(&positions)?;
        Ok(self.ids.iter().cloned().zip(counts).collect())
    }
}
