//! Allocator Kernel v1: priority-tiered partitioning.
//!
//! Splits every resource's total among the consumers requesting it.
//! Tiers are served highest priority first. A tier whose aggregate fits in
//! what is left is served in full. A tier that does not fit gets the
//! floor of its proportional shares, and the units lost to flooring go one
//! each to distinct consumers drawn without replacement, weighted by their
//! fractional remainders. The tier then exhausts the resource.
//!
//! Shares and remainders are exact integers, so the draw uses integer
//! weights and the result is reproducible bit for bit from the seed.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::arithmetic::{checked_add, checked_sub, checked_sum, proportional_share};
use crate::domain::{
    AllocationVector, ConsumerId, Priority, RequestVector, ResourceId, ResourceSummary,
};
use crate::error::{IndexKind, KernelError, KernelResult};
use crate::invariants::validate_allocation;

/// Allocation plus per-resource bookkeeping for one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionOutcome {
    pub allocation: AllocationVector,
    pub summary: BTreeMap<ResourceId, ResourceSummary>,
}

/// Partition with a generator seeded from `seed`.
pub fn partition(
    requests: &RequestVector,
    priorities: &BTreeMap<ConsumerId, Priority>,
    totals: &BTreeMap<ResourceId, i64>,
    seed: u64,
) -> KernelResult<AllocationVector> {
    let mut rng = StdRng::seed_from_u64(seed);
    partition_with_rng(requests, priorities, totals, &mut rng).map(|o| o.allocation)
}

/// Partition drawing tie-breaks from a caller-owned generator.
///
/// Fails before allocating anything if a request is negative, names a
/// resource missing from `totals`, or a total is negative.
pub fn partition_with_rng(
    requests: &RequestVector,
    priorities: &BTreeMap<ConsumerId, Priority>,
    totals: &BTreeMap<ResourceId, i64>,
    rng: &mut StdRng,
) -> KernelResult<PartitionOutcome> {
    validate_inputs(requests, totals)?;

    let tiers = group_tiers(requests, priorities);
    let mut remaining: BTreeMap<&str, i64> =
        totals.iter().map(|(r, &t)| (r.as_str(), t)).collect();

    let mut allocation = AllocationVector::new();
    let mut summary: BTreeMap<ResourceId, ResourceSummary> = totals
        .iter()
        .map(|(r, &t)| {
            (
                r.clone(),
                ResourceSummary {
                    total: t,
                    ..Default::default()
                },
            )
        })
        .collect();

    // Every requested entry appears in the allocation, zero if unserved.
    for (consumer, counts) in requests.iter() {
        allocation.ensure_consumer(consumer);
        for resource in counts.keys() {
            allocation.set(consumer, resource, 0);
        }
    }

    for (priority, members) in tiers.iter().rev() {
        for resource in totals.keys() {
            let requested: Vec<i64> = members
                .iter()
                .map(|c| requests.get(c, resource))
                .collect();
            let aggregate = checked_sum(&requested)?;
            let left = remaining.get(resource.as_str()).copied().unwrap_or(0);
            let stats = summary.entry(resource.clone()).or_default();
            stats.requested = checked_add(stats.requested, aggregate)?;

            let split = split_tier(resource, *priority, &requested, aggregate, left, rng)?;
            if split.scarce {
                stats.scarce_tiers += 1;
                stats.randomized_units += split.extra;
            }
            for (consumer, &grant) in members.iter().zip(&split.grants) {
                if requests.slice(consumer).map_or(false, |s| s.contains_key(resource)) {
                    allocation.set(consumer, resource, grant);
                }
            }
            remaining.insert(resource.as_str(), checked_sub(left, split.granted)?);
        }
    }

    for (resource, stats) in summary.iter_mut() {
        stats.allocated = allocation.total_for(resource);
        stats.unallocated = stats.total - stats.allocated;
    }

    validate_allocation(requests, &allocation, totals)?;
    Ok(PartitionOutcome {
        allocation,
        summary,
    })
}

fn validate_inputs(
    requests: &RequestVector,
    totals: &BTreeMap<ResourceId, i64>,
) -> KernelResult<()> {
    let offenders = requests.negative_entries();
    if !offenders.is_empty() {
        return Err(KernelError::NegativeRequest { offenders });
    }
    for (_, counts) in requests.iter() {
        for resource in counts.keys() {
            if !totals.contains_key(resource) {
                return Err(KernelError::index(IndexKind::UnknownResource, resource.as_str()));
            }
        }
    }
    for (resource, &total) in totals {
        if total < 0 {
            return Err(KernelError::NegativeCount {
                resource: resource.clone(),
                value: total,
            });
        }
    }
    Ok(())
}

/// priority -> consumers in id order. Consumers absent from `priorities`
/// land in tier 0.
fn group_tiers<'a>(
    requests: &'a RequestVector,
    priorities: &BTreeMap<ConsumerId, Priority>,
) -> BTreeMap<Priority, Vec<&'a ConsumerId>> {
    let mut tiers: BTreeMap<Priority, Vec<&ConsumerId>> = BTreeMap::new();
    for consumer in requests.consumers() {
        let priority = priorities.get(consumer).copied().unwrap_or(0);
        tiers.entry(priority).or_default().push(consumer);
    }
    tiers
}

struct TierSplit {
    grants: Vec<i64>,
    granted: i64,
    scarce: bool,
    extra: i64,
}

/// Divide `remaining` units of `resource` among one tier.
fn split_tier(
    resource: &str,
    priority: Priority,
    requested: &[i64],
    aggregate: i64,
    remaining: i64,
    rng: &mut StdRng,
) -> KernelResult<TierSplit> {

    if aggregate == 0 || remaining == 0 {
        return Ok(TierSplit {
            grants: vec![0; requested.len()],
            granted: 0,
            scarce: false,
            extra: 0,
        });
    }

    if aggregate <= remaining {
        return Ok(TierSplit {
            grants: requested.to_vec(),
            granted: aggregate,
            scarce: false,
            extra: 0,
        });
    }

    let mut grants = Vec::with_capacity(requested.len());
    let mut remainders = Vec::with_capacity(requested.len());
    for &r in requested {
        let (floor, rem) = proportional_share(r, remaining, aggregate)?;
        grants.push(floor);
        remainders.push(rem as u64);
    }

    let extra = checked_sub(remaining, checked_sum(&grants)?)?;
    let candidates = remainders.iter().filter(|&&w| w > 0).count();
    if extra < 0 || extra as usize > candidates {
        return Err(KernelError::InsufficientCandidates {
            resource: resource.to_string(),
            priority,
            extra,
            candidates,
        });
    }

    debug!(
        resource,
        priority,
        aggregate,
        remaining,
        extra,
        "scarce tier, distributing rounding remainder"
    );

    for idx in weighted_sample_without_replacement(&remainders, extra as usize, rng) {
        grants[idx] += 1;
    }

    Ok(TierSplit {
        grants,
        granted: remaining,
        scarce: true,
        extra,
    })
}

/// Draw `count` distinct indices, each draw weighted by the weights of the
/// indices not yet drawn. Zero-weight indices are never drawn, so the
/// result is shorter than `count` only if fewer than `count` weights are
/// positive.
pub fn weighted_sample_without_replacement(
    weights: &[u64],
    count: usize,
    rng: &mut StdRng,
) -> Vec<usize> {
    let mut live: Vec<u128> = weights.iter().map(|&w| w as u128).collect();
    let mut picked = Vec::with_capacity(count);
    for _ in 0..count {
        let total: u128 = live.iter().sum();
        if total == 0 {
            break;
        }
        let mut target = rng.gen_range(0..total);
        for (idx, w) in live.iter_mut().enumerate() {
            if target < *w {
                picked.push(idx);
                *w = 0;
                break;
            }
            target -= *w;
        }
    }
    picked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn totals(entries: &[(&str, i64)]) -> BTreeMap<ResourceId, i64> {
        entries.iter().map(|(r, t)| (r.to_string(), *t)).collect()
    }

    fn priorities(entries: &[(&str, i64)]) -> BTreeMap<ConsumerId, Priority> {
        entries.iter().map(|(c, p)| (c.to_string(), *p)).collect()
    }

    #[test]
    fn scarce_single_tier_conserves_exactly() {
        let mut req = RequestVector::new();
        req.set("A", "X", 6);
        req.set("B", "X", 7);
        let alloc = partition(&req, &BTreeMap::new(), &totals(&[("X", 10)]), 0).unwrap();
        let a = alloc.get("A", "X");
        let b = alloc.get("B", "X");
        assert_eq!(a + b, 10);
        assert!((a, b) == (5, 5) || (a, b) == (4, 6));
        assert!(a <= 6 && b <= 7);
    }

    #[test]
    fn extra_unit_follows_remainder_weight() {
        let mut req = RequestVector::new();
        req.set("A", "X", 6);
        req.set("B", "X", 7);
        let t = totals(&[("X", 10)]);
        let mut a_wins = 0;
        let mut b_wins = 0;
        for seed in 0..400 {
            let alloc = partition(&req, &BTreeMap::new(), &t, seed).unwrap();
            if alloc.get("A", "X") == 5 {
                a_wins += 1;
            } else {
                b_wins += 1;
            }
        }
        // A's remainder is 8/13, B's is 5/13: about 246 of 400 for A.
        assert_eq!(a_wins + b_wins, 400);
        assert!((196..=296).contains(&a_wins), "A won {a_wins} of 400");
    }

    #[test]
    fn several_extra_units_go_to_distinct_consumers() {
        // Shares 5/7, 10/7, 20/7: floors 0/1/2, remainders 5/3/6, extra 2.
        let mut req = RequestVector::new();
        req.set("A", "X", 1);
        req.set("B", "X", 2);
        req.set("C", "X", 4);
        let t = totals(&[("X", 5)]);
        let mut missed = BTreeMap::new();
        for seed in 0..300 {
            let mut rng = StdRng::seed_from_u64(seed);
            let out = partition_with_rng(&req, &BTreeMap::new(), &t, &mut rng).unwrap();
            let a = out.allocation.get("A", "X");
            let b = out.allocation.get("B", "X");
            let c = out.allocation.get("C", "X");
            assert_eq!(a + b + c, 5, "seed {seed}");
            assert!((0..=1).contains(&a) && (1..=2).contains(&b) && (2..=3).contains(&c));
            assert_eq!(out.summary["X"].randomized_units, 2);

            // Exactly one consumer is left at its floor.
            let at_floor: Vec<&str> = [("A", a == 0), ("B", b == 1), ("C", c == 2)]
                .iter()
                .filter(|(_, f)| *f)
                .map(|(n, _)| *n)
                .collect();
            assert_eq!(at_floor.len(), 1, "seed {seed}: {a}/{b}/{c}");
            *missed.entry(at_floor[0]).or_insert(0) += 1;
        }
        // Every pair of recipients shows up.
        assert_eq!(missed.len(), 3, "{missed:?}");
    }

    #[test]
    fn overflowing_tier_aggregate_is_an_error() {
        let mut req = RequestVector::new();
        req.set("A", "X", i64::MAX);
        req.set("B", "X", 1);
        let err = partition(&req, &BTreeMap::new(), &totals(&[("X", 10)]), 0).unwrap_err();
        assert!(matches!(err, KernelError::Overflow(_)));
    }

    #[test]
    fn overflowing_requested_summary_across_tiers_is_an_error() {
        let mut req = RequestVector::new();
        req.set("A", "X", i64::MAX);
        req.set("B", "X", 1);
        let err = partition(&req, &priorities(&[("A", 1)]), &totals(&[("X", 10)]), 0).unwrap_err();
        assert!(matches!(err, KernelError::Overflow(_)));
    }

    #[test]
    fn slack_grants_requests_exactly() {
        let mut req = RequestVector::new();
        req.set("A", "Y", 2);
        req.set("B", "Y", 1);
        let mut rng = StdRng::seed_from_u64(3);
        let out = partition_with_rng(&req, &BTreeMap::new(), &totals(&[("Y", 5)]), &mut rng)
            .unwrap();
        assert_eq!(out.allocation.get("A", "Y"), 2);
        assert_eq!(out.allocation.get("B", "Y"), 1);
        let s = &out.summary["Y"];
        assert_eq!(s.unallocated, 2);
        assert_eq!(s.scarce_tiers, 0);
        assert_eq!(s.randomized_units, 0);
    }

    #[test]
    fn negative_request_aborts_whole_cycle() {
        let mut req = RequestVector::new();
        req.set("A", "X", -1);
        req.set("B", "X", 3);
        req.set("B", "Y", -2);
        let err = partition(&req, &BTreeMap::new(), &totals(&[("X", 10), ("Y", 10)]), 0)
            .unwrap_err();
        match err {
            KernelError::NegativeRequest { offenders } => {
                assert_eq!(offenders.len(), 2);
                assert_eq!(offenders[0].consumer, "A");
                assert_eq!(offenders[1].resource, "Y");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn low_tier_starves_when_high_tier_exhausts() {
        let mut req = RequestVector::new();
        req.set("hi1", "Z", 5);
        req.set("hi2", "Z", 7);
        req.set("lo", "Z", 4);
        let prio = priorities(&[("hi1", 10), ("hi2", 10), ("lo", -5)]);
        let alloc = partition(&req, &prio, &totals(&[("Z", 10)]), 11).unwrap();
        assert_eq!(alloc.get("hi1", "Z") + alloc.get("hi2", "Z"), 10);
        assert_eq!(alloc.get("lo", "Z"), 0);
        assert_eq!(alloc.slice("lo").unwrap().get("Z"), Some(&0));
    }

    #[test]
    fn lower_tier_gets_leftover() {
        let mut req = RequestVector::new();
        req.set("hi", "Z", 4);
        req.set("lo1", "Z", 5);
        req.set("lo2", "Z", 5);
        let prio = priorities(&[("hi", 1)]);
        let alloc = partition(&req, &prio, &totals(&[("Z", 10)]), 5).unwrap();
        assert_eq!(alloc.get("hi", "Z"), 4);
        // lo tier asks 10 of the 6 left: shares are exactly 3 and 3.
        assert_eq!(alloc.get("lo1", "Z"), 3);
        assert_eq!(alloc.get("lo2", "Z"), 3);
    }

    #[test]
    fn zero_aggregate_tier_is_skipped() {
        let mut req = RequestVector::new();
        req.set("hi", "Z", 0);
        req.set("lo", "Z", 3);
        let prio = priorities(&[("hi", 2)]);
        let alloc = partition(&req, &prio, &totals(&[("Z", 3)]), 0).unwrap();
        assert_eq!(alloc.get("hi", "Z"), 0);
        assert_eq!(alloc.get("lo", "Z"), 3);
    }

    #[test]
    fn zero_total_grants_nothing() {
        let mut req = RequestVector::new();
        req.set("A", "Z", 3);
        req.set("B", "Z", 1);
        let alloc = partition(&req, &BTreeMap::new(), &totals(&[("Z", 0)]), 0).unwrap();
        assert_eq!(alloc.get("A", "Z"), 0);
        assert_eq!(alloc.get("B", "Z"), 0);
    }

    #[test]
    fn unknown_resource_is_index_error() {
        let mut req = RequestVector::new();
        req.set("A", "NOPE", 1);
        let err = partition(&req, &BTreeMap::new(), &totals(&[("X", 1)]), 0).unwrap_err();
        assert_eq!(err, KernelError::index(IndexKind::UnknownResource, "NOPE"));
    }

    #[test]
    fn same_seed_same_allocation() {
        let mut req = RequestVector::new();
        for (i, amount) in [3, 9, 14, 1, 8].iter().enumerate() {
            req.set(&format!("c{i}"), "X", *amount);
            req.set(&format!("c{i}"), "Y", amount * 3);
        }
        let t = totals(&[("X", 17), ("Y", 31)]);
        let a = partition(&req, &BTreeMap::new(), &t, 42).unwrap();
        let b = partition(&req, &BTreeMap::new(), &t, 42).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.total_for("X"), 17);
        assert_eq!(a.total_for("Y"), 31);
    }

    #[test]
    fn sampler_never_draws_zero_weight() {
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..50 {
            let picked = weighted_sample_without_replacement(&[0, 5, 0, 1, 2], 3, &mut rng);
            let mut sorted = picked.clone();
            sorted.sort();
            assert_eq!(sorted, vec![1, 3, 4]);
        }
        let short = weighted_sample_without_replacement(&[0, 4], 2, &mut rng);
        assert_eq!(short, vec![1]);
    }
}
