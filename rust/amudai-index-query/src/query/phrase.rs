//! Phrase matching: a conjunction of terms with a positional adjacency check.
//!
//! Candidate documents come from a leapfrog join over the term cursors. A
//! candidate is accepted only if there is a start position `p` such that the
//! `i`-th phrase term occurs at position `p + i`. This is the only evaluator
//! that reads payload beyond plain document ids.

use std::fmt;

use amudai_common::{Result, verify_predicate};

use crate::{
    cancellation::CancellationToken,
    iterator::{DocId, DocIdIterator, IterState, NO_MORE_DOCS},
    posting::{FieldId, SegmentContext},
};

use super::{
    Query, QueryIterator, TermIterator, TermQuery, conjunction::leapfrog, cost::CachedCost,
};

/// Matches the rows whose `field` contains `terms` at consecutive positions.
pub struct PhraseQuery {
    segment: SegmentContext,
    field: FieldId,
    terms: Vec<TermQuery>,
    cost: CachedCost,
}

impl PhraseQuery {
    /// Resolves every phrase term. Fails with `InvalidPredicate` if `terms` is
    /// empty.
    pub fn new<S: Into<String>>(
        segment: SegmentContext,
        field: FieldId,
        terms: impl IntoIterator<Item = S>,
    ) -> Result<PhraseQuery> {
        let mut resolved = Vec::new();
        for term in terms {
            resolved.push(TermQuery::new(segment.clone(), field, term)?);
        }
        verify_predicate!(!resolved.is_empty(), "phrase on field {field} has no terms");
        Ok(PhraseQuery {
            segment,
            field,
            terms: resolved,
            cost: CachedCost::new(),
        })
    }

    pub fn into_query(self) -> Query {
        Query::Phrase(self)
    }

    pub fn segment(&self) -> &SegmentContext {
        &self.segment
    }

    pub fn field(&self) -> FieldId {
        self.field
    }

    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.terms.iter().map(TermQuery::term)
    }

    /// The rarest term bounds the number of phrase matches. An absent term
    /// makes the phrase empty.
    pub fn cost(&self) -> u64 {
        self.cost.get_or_compute(|| {
            self.terms
                .iter()
                .map(TermQuery::cost)
                .min()
                .unwrap_or(0)
        })
    }

    pub fn iterator(&self, cancel: &CancellationToken) -> Result<QueryIterator> {
        if self.terms.len() == 1 {
            return self.terms[0].iterator();
        }
        let mut terms = Vec::with_capacity(self.terms.len());
        for (offset, term) in self.terms.iter().enumerate() {
            match term.open()? {
                Some(iter) => terms.push(PhraseTerm {
                    offset: offset as u32,
                    iter,
                }),
                None => return Ok(QueryIterator::empty()),
            }
        }
        terms.sort_by_key(|term| term.iter.cost());
        Ok(QueryIterator::Phrase(Box::new(PhraseIterator {
            terms,
            doc: NO_MORE_DOCS,
            cost: self.cost(),
            state: IterState::Unstarted,
            cancel: cancel.clone(),
        })))
    }
}

impl fmt::Display for PhraseQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phrase = self.terms().collect::<Vec<_>>().join(" ");
        write!(f, "phrase({}:{phrase:?}, cost={})", self.field, self.cost())
    }
}

/// A phrase term cursor together with its offset within the phrase.
struct PhraseTerm {
    offset: u32,
    iter: TermIterator,
}

impl DocIdIterator for PhraseTerm {
    #[inline]
    fn doc_id(&self) -> DocId {
        self.iter.doc_id()
    }

    #[inline]
    fn next_doc(&mut self) -> Result<DocId> {
        self.iter.next_doc()
    }

    #[inline]
    fn advance(&mut self, target: DocId) -> Result<DocId> {
        self.iter.advance(target)
    }

    #[inline]
    fn cost(&self) -> u64 {
        self.iter.cost()
    }
}

/// Leapfrog join over the phrase terms followed by position verification.
pub struct PhraseIterator {
    /// Phrase terms ordered by ascending cost.
    terms: Vec<PhraseTerm>,
    doc: DocId,
    cost: u64,
    state: IterState,
    cancel: CancellationToken,
}

impl PhraseIterator {
    fn settle(&mut self, doc: DocId) -> DocId {
        self.doc = doc;
        self.state = if doc == NO_MORE_DOCS {
            IterState::Exhausted
        } else {
            IterState::Positioned
        };
        doc
    }

    /// Returns the first id `>= candidate` where all terms co-occur in
    /// phrase order.
    fn find_match(&mut self, mut candidate: DocId) -> Result<DocId> {
        loop {
            let doc = leapfrog(&mut self.terms, candidate, &self.cancel)?;
            if doc == NO_MORE_DOCS {
                return Ok(self.settle(NO_MORE_DOCS));
            }
            if self.is_adjacent()? {
                return Ok(self.settle(doc));
            }
            candidate = self.terms[0].next_doc()?;
            if candidate == NO_MORE_DOCS {
                return Ok(self.settle(NO_MORE_DOCS));
            }
        }
    }

    /// Checks the positions of the document all terms are positioned on.
    fn is_adjacent(&mut self) -> Result<bool> {
        let mut starts: Vec<u32> = Vec::new();
        for (i, term) in self.terms.iter_mut().enumerate() {
            let positions = term.iter.position_list()?;
            if i == 0 {
                starts = positions
                    .iter()
                    .filter_map(|&pos| pos.checked_sub(term.offset))
                    .collect();
            } else {
                let offset = term.offset;
                starts.retain(|&start| {
                    start
                        .checked_add(offset)
                        .is_some_and(|pos| positions.binary_search(&pos).is_ok())
                });
            }
            if starts.is_empty() {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl DocIdIterator for PhraseIterator {
    #[inline]
    fn doc_id(&self) -> DocId {
        self.doc
    }

    fn next_doc(&mut self) -> Result<DocId> {
        if self.state.is_exhausted() {
            return Ok(NO_MORE_DOCS);
        }
        let candidate = self.terms[0].next_doc()?;
        if candidate == NO_MORE_DOCS {
            return Ok(self.settle(NO_MORE_DOCS));
        }
        self.find_match(candidate)
    }

    fn advance(&mut self, target: DocId) -> Result<DocId> {
        match self.state {
            IterState::Exhausted => Ok(NO_MORE_DOCS),
            IterState::Positioned if self.doc >= target => Ok(self.doc),
            _ => self.find_match(target),
        }
    }

    #[inline]
    fn cost(&self) -> u64 {
        self.cost
    }
}
