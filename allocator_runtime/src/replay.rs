//! Replay orchestrator: rebuild a run from its scenario.
//!
//! A run is fully determined by the scenario, the seed and the step count,
//! so replay is just running it again on a fresh session.

use allocator_kernel::ResourcePool;

use crate::error::RuntimeResult;
use crate::scenario::Scenario;

/// Run `steps` cycles of `scenario` from scratch.
///
/// Returns the final pool and the history hash over every step's
/// allocation.
pub fn rebuild(scenario: &Scenario, steps: u64) -> RuntimeResult<(ResourcePool, String)> {
    rebuild_seeded(scenario, steps, None)
}

/// As [`rebuild`], with an optional seed override.
pub fn rebuild_seeded(
    scenario: &Scenario,
    steps: u64,
    seed: Option<u64>,
) -> RuntimeResult<(ResourcePool, String)> {
    let mut session = scenario.build_session("replay", seed)?;
    session.run(steps)?;
    let hash = session.history_hash();
    Ok((session.pool().clone(), hash))
}

/// Rebuild and return only the history hash.
pub fn rebuild_hash(scenario: &Scenario, steps: u64) -> RuntimeResult<String> {
    let (_, hash) = rebuild(scenario, steps)?;
    Ok(hash)
}
