//! The pull-based document id iteration protocol.
//!
//! Every query node, from a single term leaf to a composite boolean tree, is
//! evaluated through the [`DocIdIterator`] trait. The protocol is modelled on
//! classic posting-list cursors:
//!
//! - Identifiers are produced in strictly ascending order.
//! - [`NO_MORE_DOCS`] is the terminal sentinel. Once an iterator reports it,
//!   every further call reports it again.
//! - [`DocIdIterator::advance`] is the skip primitive that lets conjunctions
//!   jump over long stretches of non-matching ids without visiting them.
//!
//! Operations that move the cursor return `Result`, since the underlying
//! posting source may fail with an I/O or corruption error at any step. A
//! failed iterator must not be resumed.

use amudai_common::Result;

/// Row identifier within a segment.
pub type DocId = u32;

/// Terminal sentinel reported by an exhausted iterator.
///
/// This is also the value of [`DocIdIterator::doc_id`] before the first
/// advance, so a valid segment never contains a row with this id.
pub const NO_MORE_DOCS: DocId = DocId::MAX;

/// A forward-only cursor over an ascending sequence of document ids.
pub trait DocIdIterator {
    /// Returns the id at the current position.
    ///
    /// Before the first call to [`next_doc`](Self::next_doc) or
    /// [`advance`](Self::advance), and after exhaustion, this is
    /// [`NO_MORE_DOCS`].
    fn doc_id(&self) -> DocId;

    /// Moves to the next matching id, strictly greater than the current one.
    ///
    /// Returns [`NO_MORE_DOCS`] when exhausted; calling again after that is a
    /// no-op.
    fn next_doc(&mut self) -> Result<DocId>;

    /// Moves to the first matching id that is `>= target`.
    ///
    /// If the iterator is already positioned on an id `>= target`, the call
    /// does not move it and returns the current id.
    fn advance(&mut self, target: DocId) -> Result<DocId>;

    /// Static estimate of the number of ids this iterator yields.
    ///
    /// Used only for planning; it does not change during iteration.
    fn cost(&self) -> u64;
}

impl<T: DocIdIterator + ?Sized> DocIdIterator for Box<T> {
    #[inline]
    fn doc_id(&self) -> DocId {
        (**self).doc_id()
    }

    #[inline]
    fn next_doc(&mut self) -> Result<DocId> {
        (**self).next_doc()
    }

    #[inline]
    fn advance(&mut self, target: DocId) -> Result<DocId> {
        (**self).advance(target)
    }

    #[inline]
    fn cost(&self) -> u64 {
        (**self).cost()
    }
}

/// Tracks whether an iterator has been positioned at least once.
///
/// `doc_id() == NO_MORE_DOCS` is ambiguous between "not started" and
/// "exhausted"; composite iterators use this to tell the two apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum IterState {
    #[default]
    Unstarted,
    Positioned,
    Exhausted,
}

impl IterState {
    #[inline]
    pub fn is_exhausted(self) -> bool {
        self == IterState::Exhausted
    }
}

/// An iterator that matches nothing. Used for absent terms and pruned nodes.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyIterator;

impl DocIdIterator for EmptyIterator {
    fn doc_id(&self) -> DocId {
        NO_MORE_DOCS
    }

    fn next_doc(&mut self) -> Result<DocId> {
        Ok(NO_MORE_DOCS)
    }

    fn advance(&mut self, _target: DocId) -> Result<DocId> {
        Ok(NO_MORE_DOCS)
    }

    fn cost(&self) -> u64 {
        0
    }
}

/// Adapts a [`DocIdIterator`] into a standard [`Iterator`] of `Result<DocId>`.
///
/// The adapter stops after the first error.
pub struct DocIds<I> {
    inner: I,
    done: bool,
}

impl<I: DocIdIterator> DocIds<I> {
    pub fn new(inner: I) -> Self {
        Self { inner, done: false }
    }

    pub fn into_inner(self) -> I {
        self.inner
    }
}

impl<I: DocIdIterator> Iterator for DocIds<I> {
    type Item = Result<DocId>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let next = self.inner.next_doc();
        if next.is_err() {
            self.done = true;
        }
        let doc = amudai_common::try_or_ret_some_err!(next);
        if doc == NO_MORE_DOCS {
            self.done = true;
            return None;
        }
        Some(Ok(doc))
    }
}
