//! Session manager: one pool, one allocator, one set of consumers.
//!
//! Each `step()` runs a full barrier cycle:
//!   1. every consumer is polled for its request against the live pool
//!   2. the allocator partitions the pool once
//!   3. every consumer with a slice evolves against the same pre-cycle pool
//!   4. the accumulated deltas are applied to the pool in one go
//!
//! A step that fails part way leaves the pool untouched, but the gate may be
//! left mid-cycle; the session should be dropped. Concurrency: Mutex around
//! the whole session, no global mutable state.

use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};

use allocator_kernel::engine::CycleReport;
use allocator_kernel::error::IndexKind;
use allocator_kernel::hashing::canonical_hash;
use allocator_kernel::listener::TrackedResourceRecord;
use allocator_kernel::{
    AllocationVector, Allocator, AllocatorConfig, Consumer, CycleGate, CycleState, Evolver, KernelError,
    RequestVector, Requester, ResourcePool, StateDelta,
};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::{RuntimeError, RuntimeResult};

pub type BoxedConsumer = Box<dyn Consumer + Send>;

/// What one barrier cycle produced.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    /// One-based step number.
    pub step: u64,
    pub allocation_hash: String,
    /// The allocation as published, before any slice was taken.
    pub allocation: AllocationVector,
    pub report: CycleReport,
    /// Sum of every evolver's delta, as applied to the pool.
    pub applied: StateDelta,
}

pub struct Session {
    session_id: String,
    pool: ResourcePool,
    allocator: Allocator,
    gate: CycleGate,
    consumers: Vec<BoxedConsumer>,
    step_hashes: Vec<String>,
    /// Running SHA-256 over every step hash, newline-terminated.
    history: Sha256,
    tracked_history: Vec<TrackedResourceRecord>,
}

impl Session {
    /// Every consumer must be registered in `config.consumer_ids`, and
    /// names must be unique.
    pub fn new(
        session_id: &str,
        pool: ResourcePool,
        config: &AllocatorConfig,
        consumers: Vec<BoxedConsumer>,
    ) -> RuntimeResult<Self> {
        let allocator = Allocator::new(config)?;
        let mut seen = BTreeSet::new();
        for c in &consumers {
            if !seen.insert(c.name().to_string()) {
                return Err(KernelError::index(IndexKind::DuplicateConsumer, c.name()).into());
            }
            if !allocator.consumer_ids().iter().any(|id| id == c.name()) {
                return Err(KernelError::index(IndexKind::UnknownConsumer, c.name()).into());
            }
        }

        Ok(Self {
            session_id: session_id.to_string(),
            pool,
            allocator,
            gate: CycleGate::new(),
            consumers,
            step_hashes: Vec::new(),
            history: Sha256::new(),
            tracked_history: Vec::new(),
        })
    }

    /// Run one request -> partition -> evolve cycle.
    pub fn step(&mut self) -> RuntimeResult<StepOutcome> {
        let mut requests = RequestVector::new();
        for consumer in self.consumers.iter_mut() {
            let name = consumer.name().to_string();
            let request = Requester::new(consumer.as_mut())
                .next_request(&self.gate, &self.pool)?
                .ok_or_else(|| gate_error(&self.gate, CycleState::AwaitingRequests))?;
            requests.insert(name, request);
        }

        let update = self
            .allocator
            .next_update(&mut self.gate, &self.pool, requests)?
            .ok_or_else(|| gate_error(&self.gate, CycleState::AwaitingRequests))?;
        let allocation_hash = canonical_hash(&update.allocation)?;

        let published = update.allocation.clone();
        let mut allocation = update.allocation;
        let mut applied = StateDelta::new();
        for consumer in self.consumers.iter_mut() {
            if allocation.slice(consumer.name()).is_none() {
                continue;
            }
            let delta = Evolver::new(consumer.as_mut()).next_update(
                &mut self.gate,
                &self.pool,
                &mut allocation,
            )?;
            debug!(consumer = consumer.name(), changes = delta.counts.len(), "evolved");
            applied.merge(&delta)?;
        }
        if !self.gate.evolvers_ran() {
            return Err(gate_error(&self.gate, CycleState::AwaitingRequests).into());
        }
        self.pool.apply_delta(&applied)?;

        let step = self.step_hashes.len() as u64 + 1;
        self.history.update(allocation_hash.as_bytes());
        self.history.update(b"\n");
        self.step_hashes.push(allocation_hash.clone());
        if let Some(record) = &update.report.tracked {
            self.tracked_history.push(record.clone());
        }
        info!(
            session = %self.session_id,
            step,
            hash = %allocation_hash,
            "step complete"
        );

        Ok(StepOutcome {
            step,
            allocation_hash,
            allocation: published,
            report: update.report,
            applied,
        })
    }

    /// Run `steps` cycles, stopping at the first failure.
    pub fn run(&mut self, steps: u64) -> RuntimeResult<Vec<StepOutcome>> {
        let mut outcomes = Vec::with_capacity(steps as usize);
        for _ in 0..steps {
            outcomes.push(self.step()?);
        }
        Ok(outcomes)
    }

    /// Fingerprint of every allocation so far, in order.
    pub fn history_hash(&self) -> String {
        self.history
            .clone()
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }

    pub fn step_hashes(&self) -> &[String] {
        &self.step_hashes
    }

    pub fn tracked_history(&self) -> &[TrackedResourceRecord] {
        &self.tracked_history
    }

    pub fn pool(&self) -> &ResourcePool {
        &self.pool
    }

    pub fn gate(&self) -> &CycleGate {
        &self.gate
    }

    pub fn steps_completed(&self) -> u64 {
        self.step_hashes.len() as u64
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

fn gate_error(gate: &CycleGate, expected: CycleState) -> KernelError {
    KernelError::CycleOrder {
        expected,
        actual: gate.state(),
    }
}

/// Thread-safe session handle using Mutex.
pub struct SharedSession {
    inner: Mutex<Session>,
}

impl SharedSession {
    pub fn new(session: Session) -> Self {
        Self {
            inner: Mutex::new(session),
        }
    }

    /// Step under lock.
    pub fn step(&self) -> RuntimeResult<StepOutcome> {
        self.lock()?.step()
    }

    pub fn history_hash(&self) -> RuntimeResult<String> {
        Ok(self.lock()?.history_hash())
    }

    pub fn steps_completed(&self) -> RuntimeResult<u64> {
        Ok(self.lock()?.steps_completed())
    }

    pub fn into_inner(self) -> RuntimeResult<Session> {
        self.inner
            .into_inner()
            .map_err(|_| RuntimeError::Poisoned)
    }

    fn lock(&self) -> RuntimeResult<MutexGuard<'_, Session>> {
        self.inner.lock().map_err(|_| RuntimeError::Poisoned)
    }
}
