//! The boundary between query evaluation and the inverted index storage.
//!
//! Query evaluation never decodes posting blocks itself. It consumes them
//! through the [`PostingSource`] trait, which a segment reader implements on
//! top of its on-disk (or in-memory) inverted index. A source is opened once
//! per segment, is immutable afterwards and is shared through `Arc` by every
//! query tree built against that segment, possibly from several threads.

use std::{fmt, ops::Bound, sync::Arc};

use amudai_common::{Result, error::Error, verify_arg};

use crate::iterator::{DocId, DocIdIterator, NO_MORE_DOCS};

/// Identifier of an indexed field within a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId(pub u32);

impl FieldId {
    #[inline]
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl From<u32> for FieldId {
    fn from(id: u32) -> Self {
        FieldId(id)
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A cursor over the posting list of one `(field, term)` pair.
///
/// The iteration contract is exactly the one of [`DocIdIterator`]. In addition,
/// a cursor can report the in-document positions of its term, which phrase
/// matching needs.
pub trait PostingCursor: DocIdIterator + Send {
    /// Returns the ascending term positions within `doc_id`.
    ///
    /// `doc_id` must be the id the cursor is currently positioned on.
    /// Sources that do not store positions return an
    /// [`InvalidOperation`](amudai_common::error::ErrorKind::InvalidOperation)
    /// error.
    fn position_list(&mut self, doc_id: DocId) -> Result<Vec<u32>>;
}

/// Read-only access to the inverted index of a single segment.
///
/// Implementations must tolerate concurrent calls from independent workers
/// without external locking.
pub trait PostingSource: Send + Sync {
    /// Opens the posting list of `term` in `field`.
    ///
    /// Returns `Ok(None)` when the term does not occur in the segment. This is
    /// not an error: an absent term simply matches nothing.
    fn open(&self, field: FieldId, term: &str) -> Result<Option<Box<dyn PostingCursor>>>;

    /// Returns the posting list length of `term` in `field`, or `None` if the
    /// term is absent.
    ///
    /// The default implementation opens a cursor and asks it for its cost.
    /// Sources with a cheaper dictionary lookup should override it.
    fn doc_freq(&self, field: FieldId, term: &str) -> Result<Option<u64>> {
        Ok(self.open(field, term)?.map(|cursor| cursor.cost()))
    }

    /// Lists the terms of `field` within the given bounds, in dictionary order.
    fn terms_in_range(
        &self,
        field: FieldId,
        lower: Bound<&str>,
        upper: Bound<&str>,
    ) -> Result<Vec<String>>;

    /// Returns `true` if [`open_range`](Self::open_range) is implemented for
    /// `field`.
    fn supports_native_range(&self, _field: FieldId) -> bool {
        false
    }

    /// Opens a single cursor over the union of all postings of the terms of
    /// `field` within the given bounds.
    fn open_range(
        &self,
        field: FieldId,
        _lower: Bound<&str>,
        _upper: Bound<&str>,
    ) -> Result<Box<dyn PostingCursor>> {
        Err(Error::invalid_operation(format!(
            "native range scan is not supported for field {field}"
        )))
    }

    /// Estimates the number of ids a native range cursor over the given bounds
    /// would yield. Used for planning, so an upper bound is acceptable.
    ///
    /// The default implementation opens the range cursor and asks it for its
    /// cost. Sources that can answer from the term dictionary should override
    /// it to avoid building the merged cursor twice.
    fn range_doc_freq(
        &self,
        field: FieldId,
        lower: Bound<&str>,
        upper: Bound<&str>,
    ) -> Result<u64> {
        Ok(self.open_range(field, lower, upper)?.cost())
    }
}

/// The per-segment inputs every query tree is compiled against.
#[derive(Clone)]
pub struct SegmentContext {
    name: Arc<str>,
    source: Arc<dyn PostingSource>,
    row_count: u32,
}

impl SegmentContext {
    /// Creates a context for a segment holding `row_count` rows.
    ///
    /// `row_count` defines the universe `0..row_count` used by negation and
    /// must be below [`NO_MORE_DOCS`].
    pub fn new(source: Arc<dyn PostingSource>, row_count: u32) -> Result<SegmentContext> {
        verify_arg!(row_count, row_count < NO_MORE_DOCS);
        Ok(SegmentContext {
            name: Arc::from("segment"),
            source,
            row_count,
        })
    }

    pub fn with_name(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &Arc<dyn PostingSource> {
        &self.source
    }

    /// Number of rows in the segment, i.e. the size of the universe.
    pub fn row_count(&self) -> u32 {
        self.row_count
    }
}

impl fmt::Debug for SegmentContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentContext")
            .field("name", &self.name)
            .field("row_count", &self.row_count)
            .finish_non_exhaustive()
    }
}
