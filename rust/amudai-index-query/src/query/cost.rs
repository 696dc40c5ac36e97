//! Cost estimation for query nodes.
//!
//! The cost of a node approximates the number of ids its iterator yields.
//! Leaves use the posting list length; composites derive theirs from their
//! children:
//!
//! - conjunction: the smallest child (an upper bound on the intersection),
//! - disjunction: the sum of the children, capped at the universe size,
//! - negation: the universe size, since its iterator walks every row.
//!
//! Estimates drive child ordering only. They are never consulted for
//! correctness.

use std::{cmp::Ordering, sync::OnceLock};

use super::Query;

/// A lazily computed cost estimate, stable after the first computation.
#[derive(Debug, Default)]
pub(crate) struct CachedCost(OnceLock<u64>);

impl CachedCost {
    pub fn new() -> CachedCost {
        CachedCost(OnceLock::new())
    }

    #[inline]
    pub fn get_or_compute(&self, compute: impl FnOnce() -> u64) -> u64 {
        *self.0.get_or_init(compute)
    }
}

pub(crate) fn conjunction_cost(children: &[Query], universe: u32) -> u64 {
    children
        .iter()
        .map(Query::cost)
        .min()
        .unwrap_or(0)
        .min(universe as u64)
}

pub(crate) fn disjunction_cost(costs: impl IntoIterator<Item = u64>, universe: u32) -> u64 {
    costs
        .into_iter()
        .fold(0u64, u64::saturating_add)
        .min(universe as u64)
}

/// Ordering of conjunction operands: positive operands first, ascending by
/// cost, then negations.
///
/// A negation iterates the whole universe, so it must never lead the join even
/// when its child is cheap.
pub(crate) fn conjunction_order(a: &Query, b: &Query) -> Ordering {
    a.is_negation()
        .cmp(&b.is_negation())
        .then_with(|| a.cost().cmp(&b.cost()))
}
