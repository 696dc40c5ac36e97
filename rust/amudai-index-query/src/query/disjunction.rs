//! Disjunction (OR) evaluation via k-way merge.
//!
//! The iterator keeps every live operand in a min-heap keyed by its current
//! id. The current id of the disjunction is the heap minimum; moving forward
//! pops every operand sitting on (or below) the target, advances it and pushes
//! it back unless it is exhausted. The disjunction is exhausted once the heap
//! is empty.

use std::{cmp::Reverse, collections::BinaryHeap};

use amudai_common::{Result, verify_predicate};

use crate::{
    cancellation::CancellationToken,
    iterator::{DocId, DocIdIterator, IterState, NO_MORE_DOCS},
    posting::SegmentContext,
};

use super::{
    Query, QueryIterator,
    conjunction::verify_same_segment,
    cost::{CachedCost, disjunction_cost},
};

/// Matches the rows matched by at least one child.
pub struct DisjunctionQuery {
    segment: SegmentContext,
    children: Vec<Query>,
    cost: CachedCost,
}

impl DisjunctionQuery {
    /// Builds a disjunction over `children`.
    ///
    /// Fails with `InvalidPredicate` if `children` is empty or the children were
    /// compiled against different segments.
    pub fn new(children: Vec<Query>) -> Result<DisjunctionQuery> {
        verify_predicate!(!children.is_empty(), "disjunction requires at least one operand");
        let segment = children[0].segment().clone();
        verify_same_segment(&segment, &children)?;
        Ok(DisjunctionQuery {
            segment,
            children,
            cost: CachedCost::new(),
        })
    }

    /// Like [`new`](Self::new), but drops operands whose cost is zero.
    ///
    /// Such operands are absent terms and contribute nothing to the union. If
    /// every operand is empty, the first one is kept so the node stays valid.
    pub fn new_pruned(children: Vec<Query>) -> Result<DisjunctionQuery> {
        verify_predicate!(!children.is_empty(), "disjunction requires at least one operand");
        let before = children.len();
        let mut first = None;
        let mut kept = Vec::with_capacity(children.len());
        for child in children {
            if child.cost() > 0 {
                kept.push(child);
            } else if first.is_none() {
                first = Some(child);
            }
        }
        if kept.is_empty() {
            kept.extend(first);
        }
        if kept.len() < before {
            log::debug!(
                "pruned {} empty disjunction operands, {} remain",
                before - kept.len(),
                kept.len()
            );
        }
        Self::new(kept)
    }

    pub fn into_query(self) -> Query {
        Query::Disjunction(self)
    }

    pub fn segment(&self) -> &SegmentContext {
        &self.segment
    }

    pub fn children(&self) -> &[Query] {
        &self.children
    }

    pub fn cost(&self) -> u64 {
        self.cost.get_or_compute(|| {
            disjunction_cost(
                self.children.iter().map(Query::cost),
                self.segment.row_count(),
            )
        })
    }

    pub fn iterator(&self, cancel: &CancellationToken) -> Result<QueryIterator> {
        let mut children = Vec::with_capacity(self.children.len());
        for child in &self.children {
            let it = child.iterator_with(cancel)?;
            if !it.is_empty_iterator() {
                children.push(it);
            }
        }
        Ok(match children.len() {
            0 => QueryIterator::empty(),
            1 => children.pop().unwrap_or_else(QueryIterator::empty),
            _ => QueryIterator::Disjunction(Box::new(DisjunctionIterator::new(
                children,
                self.cost(),
                cancel.clone(),
            ))),
        })
    }
}

/// K-way merge over the operand iterators.
pub struct DisjunctionIterator {
    children: Vec<QueryIterator>,
    /// Live operands keyed by their current id.
    heap: BinaryHeap<Reverse<(DocId, usize)>>,
    doc: DocId,
    cost: u64,
    state: IterState,
    cancel: CancellationToken,
}

impl DisjunctionIterator {
    pub(crate) fn new(
        children: Vec<QueryIterator>,
        cost: u64,
        cancel: CancellationToken,
    ) -> DisjunctionIterator {
        let heap = BinaryHeap::with_capacity(children.len());
        DisjunctionIterator {
            children,
            heap,
            doc: NO_MORE_DOCS,
            cost,
            state: IterState::Unstarted,
            cancel,
        }
    }

    /// Positions every operand on its first id `>= target` and fills the heap.
    fn start(&mut self, target: DocId) -> Result<DocId> {
        for (idx, child) in self.children.iter_mut().enumerate() {
            let doc = child.advance(target)?;
            if doc != NO_MORE_DOCS {
                self.heap.push(Reverse((doc, idx)));
            }
        }
        Ok(self.settle())
    }

    /// Moves every operand positioned below `target` to its first id
    /// `>= target`.
    fn sift(&mut self, target: DocId) -> Result<DocId> {
        self.cancel.check()?;
        while let Some(&Reverse((doc, idx))) = self.heap.peek() {
            if doc >= target {
                break;
            }
            self.heap.pop();
            let next = self.children[idx].advance(target)?;
            if next != NO_MORE_DOCS {
                self.heap.push(Reverse((next, idx)));
            }
        }
        Ok(self.settle())
    }

    fn settle(&mut self) -> DocId {
        match self.heap.peek() {
            Some(&Reverse((doc, _))) => {
                self.doc = doc;
                self.state = IterState::Positioned;
            }
            None => {
                self.doc = NO_MORE_DOCS;
                self.state = IterState::Exhausted;
            }
        }
        self.doc
    }
}

impl DocIdIterator for DisjunctionIterator {
    #[inline]
    fn doc_id(&self) -> DocId {
        self.doc
    }

    fn next_doc(&mut self) -> Result<DocId> {
        match self.state {
            IterState::Exhausted => Ok(NO_MORE_DOCS),
            IterState::Unstarted => {
                self.cancel.check()?;
                self.start(0)
            }
            IterState::Positioned => self.sift(self.doc + 1),
        }
    }

    fn advance(&mut self, target: DocId) -> Result<DocId> {
        match self.state {
            IterState::Exhausted => Ok(NO_MORE_DOCS),
            IterState::Unstarted => {
                self.cancel.check()?;
                self.start(target)
            }
            IterState::Positioned if self.doc >= target => Ok(self.doc),
            IterState::Positioned => self.sift(target),
        }
    }

    #[inline]
    fn cost(&self) -> u64 {
        self.cost
    }
}
