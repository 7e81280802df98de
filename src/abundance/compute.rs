// src/abundance/compute.rs

use std::collections::BTreeMap;

use crate::sample::Sample;
use crate::types::{Rank, TaxonomicAssignment, NO_ORDER_LEVEL, UNASSIGNED};

/// `(target value, unit value)` -> reads.
pub type AbundanceCounts = BTreeMap<(String, String), u64>;

/// Value of `assignment` at `rank`, with an empty order replaced by `no_order_level`.
pub fn rank_value(assignment: &TaxonomicAssignment, rank: Rank) -> String {
    let value = assignment.get(rank);
    if rank == Rank::Order && value.is_empty() {
        NO_ORDER_LEVEL.to_string()
    } else {
        value.to_string()
    }
}

/// Sums haplotype sizes of one sample by `(target_rank, unit_rank)` values.
///
/// Haplotypes without a size (chimeras) count as 0. A haplotype with reads
/// but no taxonomy row is counted under `unassigned` so totals reconcile;
/// one with neither is left out.
pub fn compute_abundance(sample: &Sample, target_rank: Rank, unit_rank: Rank) -> AbundanceCounts {
    let mut counts = AbundanceCounts::new();

    for hap in sample.haplotypes().values() {
        let size = hap.size.unwrap_or(0);
        let key = match sample.taxonomy().get(&hap.id) {
            Some(assignment) => (
                rank_value(assignment, target_rank),
                rank_value(assignment, unit_rank),
            ),
            None if size > 0 => {
                log::debug!(
                    "sample {}: {} has {size} reads but no taxonomy",
                    sample.sample_id(),
                    hap.id
                );
                (UNASSIGNED.to_string(), UNASSIGNED.to_string())
            }
            None => continue,
        };
        *counts.entry(key).or_insert(0) += size;
    }
    counts
}

/// Scales counts to percentages of their sum. A zero sum gives an empty map.
pub fn normalize<K: Ord + Clone>(counts: &BTreeMap<K, u64>) -> BTreeMap<K, f64> {
    let total: u64 = counts.values().sum();
    if total == 0 {
        return BTreeMap::new();
    }
    counts
        .iter()
        .map(|(k, &v)| (k.clone(), v as f64 / total as f64 * 100.0))
        .collect()
}
