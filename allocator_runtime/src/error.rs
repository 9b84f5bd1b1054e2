//! Runtime error type.
//!
//! Kernel failures pass through unchanged; the runtime adds scenario
//! loading and determinism failures on top.

use allocator_kernel::KernelError;
use thiserror::Error;

pub type RuntimeResult<T> = Result<T, RuntimeError>;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Kernel(#[from] KernelError),

    #[error("Scenario error: {0}")]
    Scenario(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(
        "Determinism failure: two replays diverged at step {step} ({differences} differing cells).\n\
         Run 1: {first}\n\
         Run 2: {second}"
    )]
    Determinism {
        step: u64,
        first: String,
        second: String,
        differences: usize,
    },

    #[error("Session lock poisoned")]
    Poisoned,
}
