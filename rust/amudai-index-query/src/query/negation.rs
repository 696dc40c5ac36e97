//! Negation (NOT) relative to the segment universe.
//!
//! Posting lists only record presence, so the complement is taken against the
//! universe `0..row_count` of the segment. The iterator walks the universe and
//! the child in lock-step. `advance(target)` jumps straight to `target`, which
//! keeps a negation operand cheap inside a conjunction driven by a selective
//! positive operand.

use std::fmt;

use amudai_common::Result;

use crate::{
    cancellation::CancellationToken,
    iterator::{DocId, DocIdIterator, IterState, NO_MORE_DOCS},
    posting::SegmentContext,
};

use super::{Query, QueryIterator};

/// How many consecutive excluded rows the iterator skips between two
/// cancellation polls.
const CANCEL_POLL_INTERVAL: u32 = 4096;

/// Matches every row of the segment not matched by the child.
pub struct NegationQuery {
    segment: SegmentContext,
    child: Box<Query>,
}

impl NegationQuery {
    pub fn new(child: Query) -> NegationQuery {
        NegationQuery {
            segment: child.segment().clone(),
            child: Box::new(child),
        }
    }

    pub fn into_query(self) -> Query {
        Query::Negation(self)
    }

    pub fn segment(&self) -> &SegmentContext {
        &self.segment
    }

    pub fn child(&self) -> &Query {
        &self.child
    }

    /// The effective cost is the universe size: the iterator may visit every
    /// row regardless of how selective the child is.
    pub fn cost(&self) -> u64 {
        self.segment.row_count() as u64
    }

    pub fn iterator(&self, cancel: &CancellationToken) -> Result<QueryIterator> {
        let row_count = self.segment.row_count();
        if row_count == 0 {
            return Ok(QueryIterator::empty());
        }
        let child = self.child.iterator_with(cancel)?;
        Ok(QueryIterator::Negation(Box::new(NegationIterator::new(
            child,
            row_count,
            cancel.clone(),
        ))))
    }
}

impl fmt::Display for NegationQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NOT({})", self.child)
    }
}

/// Complement of the child iterator within `0..row_count`.
pub struct NegationIterator {
    child: QueryIterator,
    row_count: u32,
    doc: DocId,
    state: IterState,
    cancel: CancellationToken,
}

impl NegationIterator {
    pub(crate) fn new(
        child: QueryIterator,
        row_count: u32,
        cancel: CancellationToken,
    ) -> NegationIterator {
        NegationIterator {
            child,
            row_count,
            doc: NO_MORE_DOCS,
            state: IterState::Unstarted,
            cancel,
        }
    }

    /// Positions on the first row `>= candidate` the child does not produce.
    fn seek(&mut self, mut candidate: DocId) -> Result<DocId> {
        let mut skipped = 0u32;
        loop {
            if candidate >= self.row_count {
                self.doc = NO_MORE_DOCS;
                self.state = IterState::Exhausted;
                return Ok(NO_MORE_DOCS);
            }
            if self.child.advance(candidate)? != candidate {
                self.doc = candidate;
                self.state = IterState::Positioned;
                return Ok(candidate);
            }
            candidate += 1;
            skipped += 1;
            if skipped % CANCEL_POLL_INTERVAL == 0 {
                self.cancel.check()?;
            }
        }
    }
}

impl DocIdIterator for NegationIterator {
    #[inline]
    fn doc_id(&self) -> DocId {
        self.doc
    }

    fn next_doc(&mut self) -> Result<DocId> {
        match self.state {
            IterState::Exhausted => Ok(NO_MORE_DOCS),
            IterState::Unstarted => self.seek(0),
            IterState::Positioned => self.seek(self.doc + 1),
        }
    }

    fn advance(&mut self, target: DocId) -> Result<DocId> {
        match self.state {
            IterState::Exhausted => Ok(NO_MORE_DOCS),
            IterState::Positioned if self.doc >= target => Ok(self.doc),
            _ => self.seek(target),
        }
    }

    #[inline]
    fn cost(&self) -> u64 {
        self.row_count as u64
    }
}
