//! Cycle gate: the request -> partition -> evolve state machine.
//!
//! `AwaitingRequests -> Partitioning -> AwaitingEvolve -> AwaitingRequests`.
//! The gate only re-opens for requests once every consumer that received a
//! slice has evolved. That is the "evolvers ran" signal.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::domain::ConsumerId;
use crate::error::{IndexKind, KernelError, KernelResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CycleState {
    AwaitingRequests,
    Partitioning,
    AwaitingEvolve,
}

#[derive(Debug, Clone)]
pub struct CycleGate {
    state: CycleState,
    pending: BTreeSet<ConsumerId>,
    completed_cycles: u64,
}

impl Default for CycleGate {
    fn default() -> Self {
        Self::new()
    }
}

impl CycleGate {
    pub fn new() -> Self {
        Self {
            state: CycleState::AwaitingRequests,
            pending: BTreeSet::new(),
            completed_cycles: 0,
        }
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    /// True while requests may be computed.
    pub fn evolvers_ran(&self) -> bool {
        self.state == CycleState::AwaitingRequests
    }

    pub fn completed_cycles(&self) -> u64 {
        self.completed_cycles
    }

    /// Consumers that still have to evolve this cycle.
    pub fn pending(&self) -> impl Iterator<Item = &ConsumerId> {
        self.pending.iter()
    }

    /// Fail with `CycleOrder` unless the gate is in `expected`.
    pub fn ensure(&self, expected: CycleState) -> KernelResult<()> {
        if self.state != expected {
            return Err(KernelError::CycleOrder {
                expected,
                actual: self.state,
            });
        }
        Ok(())
    }

    pub fn begin_partition(&mut self) -> KernelResult<()> {
        self.ensure(CycleState::AwaitingRequests)?;
        self.state = CycleState::Partitioning;
        Ok(())
    }

    /// Publish the allocation: the listed consumers must each evolve once
    /// before the next cycle opens. An empty list closes the cycle at once.
    pub fn publish<I>(&mut self, consumers: I) -> KernelResult<()>
    where
        I: IntoIterator<Item = ConsumerId>,
    {
        self.ensure(CycleState::Partitioning)?;
        self.pending = consumers.into_iter().collect();
        self.state = CycleState::AwaitingEvolve;
        if self.pending.is_empty() {
            self.close();
        }
        Ok(())
    }

    /// Partitioning failed: nothing was published, reopen for requests.
    pub fn abort(&mut self) -> KernelResult<()> {
        self.ensure(CycleState::Partitioning)?;
        self.state = CycleState::AwaitingRequests;
        Ok(())
    }

    /// Record that `consumer` applied its slice. Closes the cycle after the
    /// last pending consumer.
    pub fn record_evolved(&mut self, consumer: &str) -> KernelResult<()> {
        self.ensure(CycleState::AwaitingEvolve)?;
        if !self.pending.remove(consumer) {
            return Err(KernelError::index(IndexKind::UnknownConsumer, consumer));
        }
        if self.pending.is_empty() {
            self.close();
        }
        Ok(())
    }

    fn close(&mut self) {
        self.state = CycleState::AwaitingRequests;
        self.completed_cycles += 1;
        tracing::trace!(cycle = self.completed_cycles, "evolvers ran");
    }
}
