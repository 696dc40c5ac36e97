use std::fmt;

use amudai_common::{Result, verify_data};

use crate::{
    iterator::{DocId, DocIdIterator, IterState, NO_MORE_DOCS},
    posting::{FieldId, PostingCursor, SegmentContext},
};

use super::{Query, QueryIterator};

/// Matches the rows whose `field` contains `term`.
pub struct TermQuery {
    segment: SegmentContext,
    field: FieldId,
    term: String,
    /// Posting list length, `None` if the term is absent from the segment.
    doc_freq: Option<u64>,
}

impl TermQuery {
    /// Resolves `term` in `field` against the segment's posting source.
    ///
    /// An absent term is not an error; the resulting node matches nothing.
    pub fn new(segment: SegmentContext, field: FieldId, term: impl Into<String>) -> Result<Self> {
        let term = term.into();
        let doc_freq = segment.source().doc_freq(field, &term)?;
        if doc_freq.is_none() {
            log::debug!(
                "term '{term}' not found in field {field} of {}",
                segment.name()
            );
        }
        Ok(TermQuery {
            segment,
            field,
            term,
            doc_freq,
        })
    }

    pub fn into_query(self) -> Query {
        Query::Term(self)
    }

    pub fn segment(&self) -> &SegmentContext {
        &self.segment
    }

    pub fn field(&self) -> FieldId {
        self.field
    }

    pub fn term(&self) -> &str {
        &self.term
    }

    /// Returns `false` if the term does not occur in the segment.
    pub fn exists(&self) -> bool {
        self.doc_freq.is_some()
    }

    pub fn cost(&self) -> u64 {
        self.doc_freq.unwrap_or(0)
    }

    pub fn iterator(&self) -> Result<QueryIterator> {
        Ok(match self.open()? {
            Some(it) => QueryIterator::Term(it),
            None => QueryIterator::empty(),
        })
    }

    /// Opens the term's posting cursor, or `None` if the term is absent.
    pub(crate) fn open(&self) -> Result<Option<TermIterator>> {
        if self.doc_freq.is_none() {
            return Ok(None);
        }
        Ok(self
            .segment
            .source()
            .open(self.field, &self.term)?
            .map(TermIterator::new))
    }
}

impl fmt::Display for TermQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "term({}:{:?}, cost={})", self.field, self.term, self.cost())
    }
}

/// Thin adapter over a [`PostingCursor`].
///
/// Besides delegating, the adapter enforces the protocol on behalf of the
/// source: ids must be strictly ascending (a violation is reported as index
/// corruption) and exhaustion is sticky. The cursor is released as soon as it
/// is exhausted.
///
/// A failed read (an error from the cursor or a protocol violation) releases
/// the cursor as well, but leaves the iterator faulted rather than exhausted:
/// every later `next_doc` / `advance` fails with `InvalidOperation`, so a
/// caller that swallowed the first error cannot mistake the truncated list for
/// a complete one.
pub struct TermIterator {
    cursor: Option<Box<dyn PostingCursor>>,
    doc: DocId,
    cost: u64,
    state: IterState,
    faulted: bool,
}

impl TermIterator {
    pub fn new(cursor: Box<dyn PostingCursor>) -> TermIterator {
        let cost = cursor.cost();
        TermIterator {
            cursor: Some(cursor),
            doc: NO_MORE_DOCS,
            cost,
            state: IterState::Unstarted,
            faulted: false,
        }
    }

    /// Term positions within the current document.
    pub fn position_list(&mut self) -> Result<Vec<u32>> {
        let doc = self.doc;
        match self.cursor.as_mut() {
            Some(cursor) if self.state == IterState::Positioned => cursor.position_list(doc),
            _ => Err(amudai_common::error::Error::invalid_operation(
                "position_list on an unpositioned term iterator",
            )),
        }
    }

    fn accept(&mut self, doc: DocId, lower_bound: DocId) -> Result<DocId> {
        if doc == NO_MORE_DOCS {
            self.exhaust();
            return Ok(NO_MORE_DOCS);
        }
        if self.state == IterState::Positioned {
            verify_data!(posting_order, doc >= self.doc);
        }
        verify_data!(posting_order, doc >= lower_bound);
        self.doc = doc;
        self.state = IterState::Positioned;
        Ok(doc)
    }

    /// Validates the outcome of a cursor read, faulting the iterator on error.
    fn settle(&mut self, read: Result<DocId>, lower_bound: DocId) -> Result<DocId> {
        let settled = read.and_then(|doc| self.accept(doc, lower_bound));
        if settled.is_err() {
            self.exhaust();
            self.faulted = true;
        }
        settled
    }

    fn check_not_faulted(&self) -> Result<()> {
        if self.faulted {
            return Err(amudai_common::error::Error::invalid_operation(
                "term iterator used after a failed read",
            ));
        }
        Ok(())
    }

    fn exhaust(&mut self) {
        self.doc = NO_MORE_DOCS;
        self.state = IterState::Exhausted;
        self.cursor = None;
    }
}

impl DocIdIterator for TermIterator {
    #[inline]
    fn doc_id(&self) -> DocId {
        self.doc
    }

    fn next_doc(&mut self) -> Result<DocId> {
        self.check_not_faulted()?;
        let lower_bound = match self.state {
            IterState::Exhausted => return Ok(NO_MORE_DOCS),
            IterState::Unstarted => 0,
            IterState::Positioned => self.doc.saturating_add(1),
        };
        let Some(cursor) = self.cursor.as_mut() else {
            self.exhaust();
            return Ok(NO_MORE_DOCS);
        };
        let read = cursor.next_doc();
        self.settle(read, lower_bound)
    }

    fn advance(&mut self, target: DocId) -> Result<DocId> {
        self.check_not_faulted()?;
        match self.state {
            IterState::Exhausted => return Ok(NO_MORE_DOCS),
            IterState::Positioned if self.doc >= target => return Ok(self.doc),
            _ => (),
        }
        let Some(cursor) = self.cursor.as_mut() else {
            self.exhaust();
            return Ok(NO_MORE_DOCS);
        };
        let read = cursor.advance(target);
        self.settle(read, target)
    }

    #[inline]
    fn cost(&self) -> u64 {
        self.cost
    }
}
