#![forbid(unsafe_code)]

//! Allocator Kernel v1.
//!
//! Divides shared, finite pools of discrete counts among consumers that
//! each request a share every cycle. Requests are collected, the pool is
//! partitioned once by priority tier, then each consumer evolves against
//! its own slice.

/// Kernel v1. Changing partition behavior requires a new version, since it
/// is part of every allocation hash.
pub const KERNEL_VERSION: u32 = 1;

pub mod arithmetic;
pub mod error;
pub mod domain;
pub mod pool;
pub mod cycle;
pub mod invariants;
pub mod partition;
pub mod listener;
pub mod hashing;
pub mod config;
pub mod adapters;
pub mod engine;

pub use adapters::{Consumer, Evolver, PoolView, Requester};
pub use config::AllocatorConfig;
pub use cycle::{CycleGate, CycleState};
pub use domain::{AllocationVector, CountVector, RequestVector, StateDelta};
pub use engine::{Allocator, AllocatorUpdate, CycleReport};
pub use error::{KernelError, KernelResult};
pub use partition::partition;
pub use pool::{ResourceIndex, ResourcePool};
