//! Tuning knobs for query compilation and evaluation.

use serde::{Deserialize, Serialize};

/// Options controlling how predicates are compiled into query trees and how
/// the resulting trees are materialized.
///
/// None of these options affect the set of matching rows; they only change
/// the amount of work performed, with the exception of
/// [`max_range_terms`](Self::max_range_terms), which turns an oversized range
/// expansion into a compile error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryOptions {
    /// Drop disjunction operands whose estimated cost is zero (absent terms).
    pub prune_empty_disjuncts: bool,

    /// Evaluate range predicates through the source's native range cursor when
    /// the source supports it, instead of expanding the term dictionary.
    pub prefer_native_range: bool,

    /// Upper bound on the number of dictionary terms a range predicate may
    /// expand to.
    pub max_range_terms: usize,

    /// When intersecting with a candidate bitmap, the evaluator switches from
    /// seeking (one `advance` per candidate) to probing (draining the query and
    /// testing candidate membership) once the candidate set is larger than
    /// `candidate_probe_ratio * query cost`.
    pub candidate_probe_ratio: u64,
}

impl Default for QueryOptions {
    fn default() -> Self {
        QueryOptions {
            prune_empty_disjuncts: true,
            prefer_native_range: true,
            max_range_terms: 16_384,
            candidate_probe_ratio: 8,
        }
    }
}
