//! Conjunction (AND) evaluation via leapfrog join.
//!
//! Operands are sorted once, when the node is built, so that the cheapest
//! positive operand comes first and negations come last. The join keeps a
//! candidate id equal to the largest id seen so far and sweeps the operands,
//! asking each to `advance` to the candidate. Whenever an operand overshoots,
//! the candidate is raised and the sweep restarts. When a full sweep leaves
//! every operand on the candidate, it is a match.
//!
//! Because the cheapest operand proposes every candidate, the number of
//! `advance` calls made against an expensive operand is bounded by the length
//! of the cheapest one, not by its own length.

use amudai_common::{Result, error::Error, verify_predicate};

use crate::{
    cancellation::CancellationToken,
    iterator::{DocId, DocIdIterator, IterState, NO_MORE_DOCS},
    posting::SegmentContext,
};

use super::{
    Query, QueryIterator,
    cost::{CachedCost, conjunction_cost, conjunction_order},
};

/// Matches the rows matched by every child.
pub struct ConjunctionQuery {
    segment: SegmentContext,
    children: Vec<Query>,
    cost: CachedCost,
}

impl ConjunctionQuery {
    /// Builds a conjunction over `children`, reordering them for evaluation.
    ///
    /// Fails with `InvalidPredicate` if `children` is empty or the children were
    /// compiled against different segments.
    pub fn new(mut children: Vec<Query>) -> Result<ConjunctionQuery> {
        verify_predicate!(!children.is_empty(), "conjunction requires at least one operand");
        let segment = children[0].segment().clone();
        verify_same_segment(&segment, &children)?;

        children.sort_by(conjunction_order);
        log::debug!(
            "conjunction operand order on {}: {:?}",
            segment.name(),
            children.iter().map(Query::cost).collect::<Vec<_>>()
        );
        Ok(ConjunctionQuery {
            segment,
            children,
            cost: CachedCost::new(),
        })
    }

    pub fn into_query(self) -> Query {
        Query::Conjunction(self)
    }

    pub fn segment(&self) -> &SegmentContext {
        &self.segment
    }

    pub fn children(&self) -> &[Query] {
        &self.children
    }

    pub fn cost(&self) -> u64 {
        self.cost
            .get_or_compute(|| conjunction_cost(&self.children, self.segment.row_count()))
    }

    pub fn iterator(&self, cancel: &CancellationToken) -> Result<QueryIterator> {
        let mut children = Vec::with_capacity(self.children.len());
        for child in &self.children {
            let it = child.iterator_with(cancel)?;
            if it.is_empty_iterator() {
                // One empty operand empties the whole conjunction.
                return Ok(QueryIterator::empty());
            }
            children.push(it);
        }
        if children.len() == 1 {
            return Ok(children.pop().unwrap_or_else(QueryIterator::empty));
        }
        Ok(QueryIterator::Conjunction(Box::new(ConjunctionIterator::new(
            children,
            self.cost(),
            cancel.clone(),
        ))))
    }
}

pub(crate) fn verify_same_segment(segment: &SegmentContext, children: &[Query]) -> Result<()> {
    let mixed = children
        .iter()
        .any(|child| !std::sync::Arc::ptr_eq(child.segment().source(), segment.source()));
    if mixed {
        return Err(Error::invalid_predicate(
            "operands were compiled against different segments",
        ));
    }
    Ok(())
}

/// Leapfrog join over already ordered operands.
pub struct ConjunctionIterator {
    children: Vec<QueryIterator>,
    doc: DocId,
    cost: u64,
    state: IterState,
    cancel: CancellationToken,
}

impl ConjunctionIterator {
    pub(crate) fn new(
        children: Vec<QueryIterator>,
        cost: u64,
        cancel: CancellationToken,
    ) -> ConjunctionIterator {
        ConjunctionIterator {
            children,
            doc: NO_MORE_DOCS,
            cost,
            state: IterState::Unstarted,
            cancel,
        }
    }

    fn settle(&mut self, doc: DocId) -> DocId {
        self.doc = doc;
        self.state = if doc == NO_MORE_DOCS {
            IterState::Exhausted
        } else {
            IterState::Positioned
        };
        doc
    }
}

/// Converges `children` on the first id `>= candidate` that all of them share.
///
/// Returns [`NO_MORE_DOCS`] as soon as any child is exhausted. The token is
/// polled once per sweep.
pub(crate) fn leapfrog<I: DocIdIterator>(
    children: &mut [I],
    mut candidate: DocId,
    cancel: &CancellationToken,
) -> Result<DocId> {
    'sweep: loop {
        cancel.check()?;
        for child in children.iter_mut() {
            let doc = child.advance(candidate)?;
            if doc == NO_MORE_DOCS {
                return Ok(NO_MORE_DOCS);
            }
            if doc > candidate {
                candidate = doc;
                continue 'sweep;
            }
        }
        return Ok(candidate);
    }
}

impl DocIdIterator for ConjunctionIterator {
    #[inline]
    fn doc_id(&self) -> DocId {
        self.doc
    }

    fn next_doc(&mut self) -> Result<DocId> {
        if self.state.is_exhausted() {
            return Ok(NO_MORE_DOCS);
        }
        let Some(lead) = self.children.first_mut() else {
            return Ok(self.settle(NO_MORE_DOCS));
        };
        let candidate = lead.next_doc()?;
        if candidate == NO_MORE_DOCS {
            return Ok(self.settle(NO_MORE_DOCS));
        }
        let doc = leapfrog(&mut self.children, candidate, &self.cancel)?;
        Ok(self.settle(doc))
    }

    fn advance(&mut self, target: DocId) -> Result<DocId> {
        match self.state {
            IterState::Exhausted => return Ok(NO_MORE_DOCS),
            IterState::Positioned if self.doc >= target => return Ok(self.doc),
            _ => (),
        }
        let doc = leapfrog(&mut self.children, target, &self.cancel)?;
        Ok(self.settle(doc))
    }

    #[inline]
    fn cost(&self) -> u64 {
        self.cost
    }
}
