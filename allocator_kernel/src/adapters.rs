//! Requester / Evolver adapters.
//!
//! A consumer implements `Consumer` once. The kernel never calls it
//! directly: a `Requester` polls it for a request while the gate is open,
//! and an `Evolver` runs its evolution step against a view in which the
//! consumer's declared resources show its granted counts instead of the
//! live pool.

use crate::cycle::{CycleGate, CycleState};
use crate::domain::{AllocationVector, CountVector, ResourceId, StateDelta};
use crate::error::{IndexKind, KernelError, KernelResult};
use crate::pool::ResourcePool;

/// Capability interface every partitioned consumer implements.
pub trait Consumer {
    fn name(&self) -> &str;

    /// Resources this consumer requests and receives allocations for.
    fn resources(&self) -> &[ResourceId];

    /// Read-only: compute this cycle's request from the live pool.
    fn calculate_request(&mut self, view: &PoolView<'_>) -> KernelResult<CountVector>;

    /// Evolve against the allocation-overlaid view.
    fn evolve_state(&mut self, view: &PoolView<'_>) -> KernelResult<StateDelta>;
}

/// What a consumer can see of the pool.
#[derive(Debug, Clone, Copy)]
pub struct PoolView<'a> {
    pool: &'a ResourcePool,
    overlay: Option<&'a CountVector>,
}

impl<'a> PoolView<'a> {
    pub fn live(pool: &'a ResourcePool) -> Self {
        Self {
            pool,
            overlay: None,
        }
    }

    pub fn with_allocation(pool: &'a ResourcePool, overlay: &'a CountVector) -> Self {
        Self {
            pool,
            overlay: Some(overlay),
        }
    }

    /// Overlay value if present, otherwise the live pool count.
    pub fn count(&self, resource: &str) -> KernelResult<i64> {
        if let Some(v) = self.overlay.and_then(|o| o.get(resource)) {
            return Ok(*v);
        }
        self.pool.count(resource)
    }

    /// True when this view carries an allocation.
    pub fn is_allocated(&self) -> bool {
        self.overlay.is_some()
    }

    pub fn allocation(&self) -> Option<&'a CountVector> {
        self.overlay
    }
}

/// Polls a consumer for its request.
pub struct Requester<'c, C: Consumer + ?Sized> {
    consumer: &'c mut C,
}

impl<'c, C: Consumer + ?Sized> Requester<'c, C> {
    pub fn new(consumer: &'c mut C) -> Self {
        Self { consumer }
    }

    /// `None` while the previous cycle's evolvers have not all run.
    pub fn next_request(
        &mut self,
        gate: &CycleGate,
        pool: &ResourcePool,
    ) -> KernelResult<Option<CountVector>> {
        if !gate.evolvers_ran() {
            return Ok(None);
        }
        let view = PoolView::live(pool);
        let request = self.consumer.calculate_request(&view)?;
        let scope = self.consumer.resources();
        if let Some(stray) = request.keys().find(|r| !scope.contains(r)) {
            return Err(KernelError::index(
                IndexKind::OutOfScope,
                format!("{}:{}", self.consumer.name(), stray),
            ));
        }
        Ok(Some(request))
    }
}

/// Runs a consumer's evolution step on its granted slice.
pub struct Evolver<'c, C: Consumer + ?Sized> {
    consumer: &'c mut C,
}

impl<'c, C: Consumer + ?Sized> Evolver<'c, C> {
    pub fn new(consumer: &'c mut C) -> Self {
        Self { consumer }
    }

    /// Take this consumer's slice out of `allocation`, evolve, and report
    /// completion to the gate. Declared resources missing from the slice
    /// are seen as zero.
    pub fn next_update(
        &mut self,
        gate: &mut CycleGate,
        pool: &ResourcePool,
        allocation: &mut AllocationVector,
    ) -> KernelResult<StateDelta> {
        gate.ensure(CycleState::AwaitingEvolve)?;
        let name = self.consumer.name().to_string();
        let slice = allocation.take_slice(&name)?;
        let overlay: CountVector = self
            .consumer
            .resources()
            .iter()
            .map(|r| (r.clone(), slice.get(r).copied().unwrap_or(0)))
            .collect();
        let view = PoolView::with_allocation(pool, &overlay);
        let delta = self.consumer.evolve_state(&view)?;
        gate.record_evolved(&name)?;
        Ok(delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Asks for half of what it sees and burns whatever it is granted.
    struct HalfEater {
        name: String,
        resources: Vec<ResourceId>,
        seen: Vec<i64>,
    }

    impl HalfEater {
        fn new(name: &str, resources: &[&str]) -> Self {
            Self {
                name: name.to_string(),
                resources: resources.iter().map(|s| s.to_string()).collect(),
                seen: Vec::new(),
            }
        }
    }

    impl Consumer for HalfEater {
        fn name(&self) -> &str {
            &self.name
        }

        fn resources(&self) -> &[ResourceId] {
            &self.resources
        }

        fn calculate_request(&mut self, view: &PoolView<'_>) -> KernelResult<CountVector> {
            let mut out = CountVector::new();
            for r in &self.resources {
                out.insert(r.clone(), view.count(r)? / 2);
            }
            Ok(out)
        }

        fn evolve_state(&mut self, view: &PoolView<'_>) -> KernelResult<StateDelta> {
            let mut delta = StateDelta::new();
            for r in &self.resources {
                let n = view.count(r)?;
                self.seen.push(n);
                delta.add(r, -n)?;
            }
            Ok(delta)
        }
    }

    struct Stray;

    impl Consumer for Stray {
        fn name(&self) -> &str {
            "stray"
        }
        fn resources(&self) -> &[ResourceId] {
            &[]
        }
        fn calculate_request(&mut self, _view: &PoolView<'_>) -> KernelResult<CountVector> {
            Ok([("ATP".to_string(), 1)].into_iter().collect())
        }
        fn evolve_state(&mut self, _view: &PoolView<'_>) -> KernelResult<StateDelta> {
            Ok(StateDelta::new())
        }
    }

    fn pool() -> ResourcePool {
        ResourcePool::new([("ATP", 40), ("GTP", 10)]).unwrap()
    }

    #[test]
    fn requester_is_gated() {
        let p = pool();
        let mut eater = HalfEater::new("eater", &["ATP"]);
        let mut gate = CycleGate::new();
        let req = Requester::new(&mut eater).next_request(&gate, &p).unwrap();
        assert_eq!(req.unwrap()["ATP"], 20);

        gate.begin_partition().unwrap();
        let closed = Requester::new(&mut eater).next_request(&gate, &p).unwrap();
        assert!(closed.is_none());
    }

    #[test]
    fn requester_rejects_out_of_scope_resource() {
        let p = pool();
        let gate = CycleGate::new();
        let err = Requester::new(&mut Stray).next_request(&gate, &p).unwrap_err();
        assert_eq!(err, KernelError::index(IndexKind::OutOfScope, "stray:ATP"));
    }

    #[test]
    fn evolver_sees_allocation_not_pool() {
        let p = pool();
        let mut eater = HalfEater::new("eater", &["ATP", "GTP"]);
        let mut gate = CycleGate::new();
        gate.begin_partition().unwrap();
        gate.publish(vec!["eater".to_string()]).unwrap();

        let mut alloc = AllocationVector::new();
        alloc.set("eater", "ATP", 7);
        let delta = Evolver::new(&mut eater)
            .next_update(&mut gate, &p, &mut alloc)
            .unwrap();

        // GTP was not in the slice, so the evolver sees zero, not 10.
        assert_eq!(eater.seen, vec![7, 0]);
        assert_eq!(delta.counts["ATP"], -7);
        assert!(gate.evolvers_ran());
        assert!(alloc.slice("eater").is_none());
    }

    #[test]
    fn evolver_before_partition_is_cycle_error() {
        let p = pool();
        let mut eater = HalfEater::new("eater", &["ATP"]);
        let mut gate = CycleGate::new();
        let mut alloc = AllocationVector::new();
        alloc.set("eater", "ATP", 1);
        let err = Evolver::new(&mut eater)
            .next_update(&mut gate, &p, &mut alloc)
            .unwrap_err();
        assert!(matches!(err, KernelError::CycleOrder { .. }));
        // Slice untouched.
        assert_eq!(alloc.get("eater", "ATP"), 1);
    }

    #[test]
    fn pool_view_falls_through_to_live_counts() {
        let p = pool();
        let overlay: CountVector = [("ATP".to_string(), 3)].into_iter().collect();
        let view = PoolView::with_allocation(&p, &overlay);
        assert_eq!(view.count("ATP").unwrap(), 3);
        assert_eq!(view.count("GTP").unwrap(), 10);
        assert!(view.is_allocated());
        assert!(!PoolView::live(&p).is_allocated());
    }
}
