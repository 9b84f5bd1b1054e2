//! Kernel error taxonomy.
//!
//! Every variant is fatal for the cycle that produced it. The host is
//! expected to abort the simulation step; nothing here is retryable.

use std::fmt;

use thiserror::Error;

use crate::cycle::CycleState;

/// Result alias used throughout the kernel.
pub type KernelResult<T> = Result<T, KernelError>;

/// One negative entry found while validating a request vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegativeEntry {
    pub consumer: String,
    pub resource: String,
    pub value: i64,
}

impl fmt::Display for NegativeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in {} ({})", self.resource, self.consumer, self.value)
    }
}

/// What kind of identifier failed to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    UnknownResource,
    UnknownConsumer,
    DuplicateResource,
    DuplicateConsumer,
    OutOfScope,
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IndexKind::UnknownResource => "unknown resource",
            IndexKind::UnknownConsumer => "unknown consumer",
            IndexKind::DuplicateResource => "duplicate resource",
            IndexKind::DuplicateConsumer => "duplicate consumer",
            IndexKind::OutOfScope => "resource outside consumer scope",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
    /// A consumer requested a negative count. Carries every offender.
    #[error("NegativeRequestError: negative value(s) in counts_requested: {}", join_entries(.offenders))]
    NegativeRequest { offenders: Vec<NegativeEntry> },

    #[error("ResourceIndexError: {kind} {id:?}")]
    ResourceIndex { kind: IndexKind, id: String },

    #[error("OverAllocationError: {resource}: {detail}")]
    OverAllocation { resource: String, detail: String },

    #[error("NegativeAllocationError: {resource} in {consumer} ({value})")]
    NegativeAllocation {
        consumer: String,
        resource: String,
        value: i64,
    },

    /// Rounding distribution asked for more distinct winners than the tier
    /// has consumers with a nonzero remainder.
    #[error(
        "InsufficientCandidates: {resource} at priority {priority}: \
         {extra} extra unit(s) but only {candidates} eligible consumer(s)"
    )]
    InsufficientCandidates {
        resource: String,
        priority: i64,
        extra: i64,
        candidates: usize,
    },

    #[error("CycleOrderError: expected {expected:?}, gate is {actual:?}")]
    CycleOrder {
        expected: CycleState,
        actual: CycleState,
    },

    #[error("NegativeCountError: {resource} would become {value}")]
    NegativeCount { resource: String, value: i64 },

    #[error("Overflow: {0}")]
    Overflow(String),

    #[error("ConfigError: {0}")]
    Config(String),
}

impl KernelError {
    pub fn index(kind: IndexKind, id: impl Into<String>) -> Self {
        KernelError::ResourceIndex {
            kind,
            id: id.into(),
        }
    }
}

fn join_entries(entries: &[NegativeEntry]) -> String {
    entries
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
