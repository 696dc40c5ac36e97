//! Query execution over per-segment inverted indexes.
//!
//! This crate evaluates term, boolean (AND / OR / NOT), range and phrase
//! predicates against the inverted index of a segment and produces the set of
//! matching row ids as a [`RoaringBitmap`](roaring::RoaringBitmap). It lets a
//! scan push a filter down to the index instead of decoding every row.
//!
//! The pieces, from the storage boundary up:
//!
//! - [`PostingSource`] / [`PostingCursor`]: read access to the posting lists of
//!   a segment. The source is implemented by the segment reader; this crate
//!   ships [`MemoryPostingSource`] for in-memory segments.
//! - [`DocIdIterator`]: the ascending, seekable cursor protocol shared by every
//!   query node.
//! - [`Query`]: an immutable tree of [`TermQuery`], [`ConjunctionQuery`],
//!   [`DisjunctionQuery`], [`NegationQuery`], [`RangeQuery`] and
//!   [`PhraseQuery`] nodes, compiled for a single segment.
//! - [`QueryCompiler`]: turns a schema-level [`Predicate`] into a [`Query`].
//! - [`QueryEvaluator`]: materializes a tree into a bitmap, optionally
//!   restricted to a candidate bitmap.
//! - [`scan_segments`]: runs one predicate over many segments in parallel.
//!
//! ```
//! use std::{collections::HashMap, sync::Arc};
//!
//! use amudai_index_query::{
//!     CancellationToken, FieldId, MemoryPostingSource, Predicate, SegmentContext, compile,
//! };
//! use roaring::RoaringBitmap;
//!
//! let source = MemoryPostingSource::builder()
//!     .add_posting(FieldId(0), "foo", [1, 3, 5, 7])
//!     .add_posting(FieldId(0), "bar", [3, 5, 9])
//!     .build()
//!     .unwrap();
//! let segment = SegmentContext::new(Arc::new(source), 10).unwrap();
//! let fields = HashMap::from([("tag".to_string(), FieldId(0))]);
//!
//! let predicate = Predicate::and([Predicate::term("tag", "foo"), Predicate::term("tag", "bar")]);
//! let query = compile(&predicate, &segment, &fields).unwrap();
//!
//! let mut rows = RoaringBitmap::new();
//! let outcome = query
//!     .execute(&mut rows, None, &CancellationToken::none())
//!     .unwrap();
//! assert!(outcome.is_completed());
//! assert_eq!(rows.iter().collect::<Vec<_>>(), vec![3, 5]);
//! ```

pub mod cancellation;
pub mod compiler;
pub mod evaluator;
pub mod iterator;
pub mod memory;
pub mod options;
pub mod posting;
pub mod predicate;
pub mod query;
pub mod scan;

pub use cancellation::CancellationToken;
pub use compiler::{QueryCompiler, compile};
pub use evaluator::{CandidateStrategy, ExecutionStats, Outcome, QueryEvaluator};
pub use iterator::{DocId, DocIdIterator, DocIds, EmptyIterator, NO_MORE_DOCS};
pub use memory::{MemoryPostingSource, MemoryPostingSourceBuilder};
pub use options::QueryOptions;
pub use posting::{FieldId, PostingCursor, PostingSource, SegmentContext};
pub use predicate::{FieldResolver, Predicate};
pub use query::{
    ConjunctionQuery, DisjunctionQuery, NegationQuery, PhraseQuery, Query, QueryIterator,
    QueryKind, RangeQuery, TermQuery,
};
pub use scan::{SegmentScanResult, scan_segments};
