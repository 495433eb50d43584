//! Stable multi-key record ordering - the second pipeline stage.
//!
//! Records are compared by the first SortSpec; ties fall through to the
//! next. Remaining ties keep original relative order (Rust's `sort_by` is
//! stable), which makes the `first`/`last` aggregations deterministic.

use std::cmp::Ordering;

use crate::config::{SortDirection, SortSpec};
use crate::value::{compare_values, Record};

/// Orders the given record indices by the sort specs and returns the
/// reordered index list. An empty spec list returns the input unchanged.
pub fn sort_records(records: &[Record], mut indices: Vec<usize>, sort: &[SortSpec]) -> Vec<usize> {
    if sort.is_empty() {
        return indices;
    }

    // Keys apply in priority order; equal priorities keep list order.
    let mut keys: Vec<&SortSpec> = sort.iter().collect();
    keys.sort_by_key(|s| s.priority);

    indices.sort_by(|&a, &b| {
        for spec in &keys {
            let va = records[a].value_or_null(&spec.field);
            let vb = records[b].value_or_null(&spec.field);

            // Null stays last in either direction: the direction swap
            // happens inside compare, after the null check.
            let ordering = match (va.is_null(), vb.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => match spec.direction {
                    SortDirection::Ascending => compare_values(&va, &vb),
                    SortDirection::Descending => compare_values(&vb, &va),
                },
            };

            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });

    indices
}
