//! The query tree.
//!
//! A [`Query`] is an immutable predicate tree compiled for one segment. Each
//! node owns its children, caches its cost estimate and can produce a
//! [`QueryIterator`] that enumerates the matching document ids in ascending
//! order.
//!
//! The variant set is closed, so both the tree and its iterators are plain
//! enums and dispatch is a `match` rather than a virtual call:
//!
//! | Variant                         | Iterator                                   |
//! |---------------------------------|--------------------------------------------|
//! | [`Term`](TermQuery)             | posting cursor adapter                     |
//! | [`Conjunction`](ConjunctionQuery) | leapfrog join over the children          |
//! | [`Disjunction`](DisjunctionQuery) | k-way merge over the children            |
//! | [`Negation`](NegationQuery)     | complement of the child within the segment |
//! | [`Range`](RangeQuery)           | native range cursor or term disjunction    |
//! | [`Phrase`](PhraseQuery)         | leapfrog plus positional adjacency check   |
//!
//! Trees are iterated exactly once by a single worker. The posting source they
//! read from is shared with every other tree of the same segment.

use std::fmt;

use amudai_common::Result;
use roaring::RoaringBitmap;

use crate::{
    cancellation::CancellationToken,
    evaluator::{Outcome, QueryEvaluator},
    iterator::{DocId, DocIdIterator, EmptyIterator},
    posting::SegmentContext,
};

pub(crate) mod conjunction;
pub(crate) mod cost;
pub(crate) mod disjunction;
pub(crate) mod negation;
pub(crate) mod phrase;
pub(crate) mod range;
pub(crate) mod term;

pub use conjunction::{ConjunctionIterator, ConjunctionQuery};
pub use disjunction::{DisjunctionIterator, DisjunctionQuery};
pub use negation::{NegationIterator, NegationQuery};
pub use phrase::{PhraseIterator, PhraseQuery};
pub use range::RangeQuery;
pub use term::{TermIterator, TermQuery};

/// Discriminant of a [`Query`] node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Term,
    Conjunction,
    Disjunction,
    Negation,
    Range,
    Phrase,
}

/// A node of a compiled query tree.
pub enum Query {
    Term(TermQuery),
    Conjunction(ConjunctionQuery),
    Disjunction(DisjunctionQuery),
    Negation(NegationQuery),
    Range(RangeQuery),
    Phrase(PhraseQuery),
}

impl Query {
    pub fn kind(&self) -> QueryKind {
        match self {
            Query::Term(_) => QueryKind::Term,
            Query::Conjunction(_) => QueryKind::Conjunction,
            Query::Disjunction(_) => QueryKind::Disjunction,
            Query::Negation(_) => QueryKind::Negation,
            Query::Range(_) => QueryKind::Range,
            Query::Phrase(_) => QueryKind::Phrase,
        }
    }

    /// The segment this tree was compiled against.
    pub fn segment(&self) -> &SegmentContext {
        match self {
            Query::Term(q) => q.segment(),
            Query::Conjunction(q) => q.segment(),
            Query::Disjunction(q) => q.segment(),
            Query::Negation(q) => q.segment(),
            Query::Range(q) => q.segment(),
            Query::Phrase(q) => q.segment(),
        }
    }

    /// Estimated number of matching rows.
    ///
    /// The estimate is computed on first use and cached. It only guides
    /// evaluation order and never affects which rows match.
    pub fn cost(&self) -> u64 {
        match self {
            Query::Term(q) => q.cost(),
            Query::Conjunction(q) => q.cost(),
            Query::Disjunction(q) => q.cost(),
            Query::Negation(q) => q.cost(),
            Query::Range(q) => q.cost(),
            Query::Phrase(q) => q.cost(),
        }
    }

    /// Estimated fraction of the segment's rows that match, in `[0, 1]`.
    ///
    /// Planners use this to decide whether index pushdown is worth it at all.
    pub fn selectivity(&self) -> f64 {
        let rows = self.segment().row_count();
        if rows == 0 {
            return 0.0;
        }
        (self.cost() as f64 / rows as f64).min(1.0)
    }

    /// Direct children of this node, in evaluation order.
    pub fn children(&self) -> &[Query] {
        match self {
            Query::Conjunction(q) => q.children(),
            Query::Disjunction(q) => q.children(),
            Query::Negation(q) => std::slice::from_ref(q.child()),
            Query::Term(_) | Query::Range(_) | Query::Phrase(_) => &[],
        }
    }

    /// Creates an iterator that never observes cancellation.
    pub fn iterator(&self) -> Result<QueryIterator> {
        self.iterator_with(&CancellationToken::none())
    }

    /// Creates an iterator that polls `cancel` at its cooperative points.
    pub fn iterator_with(&self, cancel: &CancellationToken) -> Result<QueryIterator> {
        match self {
            Query::Term(q) => q.iterator(),
            Query::Conjunction(q) => q.iterator(cancel),
            Query::Disjunction(q) => q.iterator(cancel),
            Query::Negation(q) => q.iterator(cancel),
            Query::Range(q) => q.iterator(cancel),
            Query::Phrase(q) => q.iterator(cancel),
        }
    }

    /// Evaluates the tree and adds every matching row to `result`.
    ///
    /// When `candidates` is given, only rows contained in it are reported.
    /// `result` is left untouched unless the evaluation completes. See
    /// [`QueryEvaluator`] for details.
    pub fn execute(
        &self,
        result: &mut RoaringBitmap,
        candidates: Option<&RoaringBitmap>,
        cancel: &CancellationToken,
    ) -> Result<Outcome> {
        QueryEvaluator::new(self)
            .with_cancellation(cancel.clone())
            .execute(result, candidates)
    }

    pub(crate) fn is_negation(&self) -> bool {
        matches!(self, Query::Negation(_))
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::Term(q) => write!(f, "{q}"),
            Query::Range(q) => write!(f, "{q}"),
            Query::Phrase(q) => write!(f, "{q}"),
            Query::Negation(q) => write!(f, "NOT({})", q.child()),
            Query::Conjunction(_) | Query::Disjunction(_) => {
                let name = if self.kind() == QueryKind::Conjunction {
                    "AND"
                } else {
                    "OR"
                };
                write!(f, "{name}[cost={}](", self.cost())?;
                for (i, child) in self.children().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{child}")?;
                }
                f.write_str(")")
            }
        }
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Query({self})")
    }
}

/// Iterator produced by a [`Query`] node.
pub enum QueryIterator {
    Empty(EmptyIterator),
    Term(TermIterator),
    Conjunction(Box<ConjunctionIterator>),
    Disjunction(Box<DisjunctionIterator>),
    Negation(Box<NegationIterator>),
    Phrase(Box<PhraseIterator>),
}

impl QueryIterator {
    pub fn empty() -> QueryIterator {
        QueryIterator::Empty(EmptyIterator)
    }

    pub fn is_empty_iterator(&self) -> bool {
        matches!(self, QueryIterator::Empty(_))
    }
}

impl DocIdIterator for QueryIterator {
    #[inline]
    fn doc_id(&self) -> DocId {
        match self {
            QueryIterator::Empty(it) => it.doc_id(),
            QueryIterator::Term(it) => it.doc_id(),
            QueryIterator::Conjunction(it) => it.doc_id(),
            QueryIterator::Disjunction(it) => it.doc_id(),
            QueryIterator::Negation(it) => it.doc_id(),
            QueryIterator::Phrase(it) => it.doc_id(),
        }
    }

    #[inline]
    fn next_doc(&mut self) -> Result<DocId> {
        match self {
            QueryIterator::Empty(it) => it.next_doc(),
            QueryIterator::Term(it) => it.next_doc(),
            QueryIterator::Conjunction(it) => it.next_doc(),
            QueryIterator::Disjunction(it) => it.next_doc(),
            QueryIterator::Negation(it) => it.next_doc(),
            QueryIterator::Phrase(it) => it.next_doc(),
        }
    }

    #[inline]
    fn advance(&mut self, target: DocId) -> Result<DocId> {
        match self {
            QueryIterator::Empty(it) => it.advance(target),
            QueryIterator::Term(it) => it.advance(target),
            QueryIterator::Conjunction(it) => it.advance(target),
            QueryIterator::Disjunction(it) => it.advance(target),
            QueryIterator::Negation(it) => it.advance(target),
            QueryIterator::Phrase(it) => it.advance(target),
        }
    }

    fn cost(&self) -> u64 {
        match self {
            QueryIterator::Empty(it) => it.cost(),
            QueryIterator::Term(it) => it.cost(),
            QueryIterator::Conjunction(it) => it.cost(),
            QueryIterator::Disjunction(it) => it.cost(),
            QueryIterator::Negation(it) => it.cost(),
            QueryIterator::Phrase(it) => it.cost(),
        }
    }
}
