//! Reference consumers.
//!
//! Stand-ins for the biological sub-models: they only exercise the
//! request/evolve protocol. Each consumes exactly what it is granted.

use allocator_kernel::adapters::{Consumer, PoolView};
use allocator_kernel::domain::{CountVector, ResourceId, StateDelta};
use allocator_kernel::{KernelError, KernelResult};

/// Requests a fixed count of each resource every cycle, consumes whatever
/// is granted, and adds a fixed production delta.
#[derive(Debug, Clone)]
pub struct FixedDemand {
    name: String,
    resources: Vec<ResourceId>,
    demand: CountVector,
    production: CountVector,
}

impl FixedDemand {
    pub fn new(name: &str, demand: CountVector) -> Self {
        Self {
            name: name.to_string(),
            resources: demand.keys().cloned().collect(),
            demand,
            production: CountVector::new(),
        }
    }

    pub fn with_production(mut self, production: CountVector) -> Self {
        self.production = production;
        self
    }
}

impl Consumer for FixedDemand {
    fn name(&self) -> &str {
        &self.name
    }

    fn resources(&self) -> &[ResourceId] {
        &self.resources
    }

    fn calculate_request(&mut self, _view: &PoolView<'_>) -> KernelResult<CountVector> {
        Ok(self.demand.clone())
    }

    fn evolve_state(&mut self, view: &PoolView<'_>) -> KernelResult<StateDelta> {
        let mut delta = consume_granted(&self.resources, view)?;
        for (resource, &amount) in &self.production {
            delta.add(resource, amount)?;
        }
        Ok(delta)
    }
}

/// Requests a per-mille fraction of what it currently sees.
#[derive(Debug, Clone)]
pub struct ProportionalDemand {
    name: String,
    resources: Vec<ResourceId>,
    per_mille: i64,
}

impl ProportionalDemand {
    pub fn new(name: &str, resources: Vec<ResourceId>, per_mille: i64) -> Self {
        Self {
            name: name.to_string(),
            resources,
            per_mille,
        }
    }
}

impl Consumer for ProportionalDemand {
    fn name(&self) -> &str {
        &self.name
    }

    fn resources(&self) -> &[ResourceId] {
        &self.resources
    }

    fn calculate_request(&mut self, view: &PoolView<'_>) -> KernelResult<CountVector> {
        let mut out = CountVector::new();
        for r in &self.resources {
            let visible = view.count(r)? as i128;
            let share = visible * self.per_mille as i128 / 1000;
            let share = i64::try_from(share).map_err(|_| {
                KernelError::Overflow(format!(
                    "{}: {} per mille of {} exceeds i64",
                    self.name, self.per_mille, visible
                ))
            })?;
            out.insert(r.clone(), share);
        }
        Ok(out)
    }

    fn evolve_state(&mut self, view: &PoolView<'_>) -> KernelResult<StateDelta> {
        consume_granted(&self.resources, view)
    }
}

fn consume_granted(resources: &[ResourceId], view: &PoolView<'_>) -> KernelResult<StateDelta> {
    let mut delta = StateDelta::new();
    for r in resources {
        let granted = view.count(r)?;
        if granted != 0 {
            delta.add(r, -granted)?;
        }
    }
    Ok(delta)
}
