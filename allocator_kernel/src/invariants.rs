//! Allocator Kernel v1: post-partition checks.
//!
//! Hard-fail validation of a computed allocation. None of these should
//! ever fire for allocations produced by `partition`; a failure means the
//! algorithm is broken and the cycle must not be applied.

use std::collections::BTreeMap;

use crate::domain::{AllocationVector, RequestVector, ResourceId};
use crate::error::{KernelError, KernelResult};

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run every allocation check. Returns the first failure.
pub fn validate_allocation(
    requests: &RequestVector,
    allocation: &AllocationVector,
    totals: &BTreeMap<ResourceId, i64>,
) -> KernelResult<()> {
    check_non_negative(allocation)?;
    check_within_request(requests, allocation)?;
    check_within_total(allocation, totals)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Individual checks
// ---------------------------------------------------------------------------

fn check_non_negative(allocation: &AllocationVector) -> KernelResult<()> {
    for (consumer, counts) in allocation.iter() {
        for (resource, &value) in counts {
            if value < 0 {
                return Err(KernelError::NegativeAllocation {
                    consumer: consumer.clone(),
                    resource: resource.clone(),
                    value,
                });
            }
        }
    }
    Ok(())
}

/// Every grant is bounded by the matching request.
fn check_within_request(
    requests: &RequestVector,
    allocation: &AllocationVector,
) -> KernelResult<()> {
    for (consumer, counts) in allocation.iter() {
        for (resource, &granted) in counts {
            let requested = requests.get(consumer, resource);
            if granted > requested {
                return Err(KernelError::OverAllocation {
                    resource: resource.clone(),
                    detail: format!(
                        "{} granted {} but requested {}",
                        consumer, granted, requested
                    ),
                });
            }
        }
    }
    Ok(())
}

/// Per resource, grants never sum past the available total.
fn check_within_total(
    allocation: &AllocationVector,
    totals: &BTreeMap<ResourceId, i64>,
) -> KernelResult<()> {
    let mut granted: BTreeMap<&str, i64> = BTreeMap::new();
    for (_, counts) in allocation.iter() {
        for (resource, &value) in counts {
            let entry = granted.entry(resource.as_str()).or_insert(0);
            *entry = entry.saturating_add(value);
        }
    }
    for (resource, sum) in granted {
        let total = totals.get(resource).copied().unwrap_or(0);
        if sum > total {
            return Err(KernelError::OverAllocation {
                resource: resource.to_string(),
                detail: format!("{} granted in total but only {} available", sum, total),
            });
        }
    }
    Ok(())
}
