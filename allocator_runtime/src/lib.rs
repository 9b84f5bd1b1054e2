#![forbid(unsafe_code)]

//! Allocator runtime.
//!
//! Hosts the allocator kernel: wires consumers to a pool, drives the
//! request/partition/evolve cycle step by step, and replays scenarios
//! to check that runs are reproducible.
//!
//! No partitioning logic lives here. Allocation and its invariants are
//! delegated to the kernel.

pub mod error;
pub mod consumers;
pub mod session;
pub mod scenario;
pub mod replay;
pub mod drift;

pub use error::{RuntimeError, RuntimeResult};
pub use scenario::Scenario;
pub use session::{SharedSession, Session, StepOutcome};
