//! Range predicates over the ordered term dictionary.
//!
//! A range is evaluated in one of two ways, chosen when the node is built:
//! - through the source's native range cursor, if the source offers one and
//!   [`QueryOptions::prefer_native_range`] is set;
//! - otherwise by expanding the bounds into the matching dictionary terms and
//!   evaluating a disjunction over them.

use std::{fmt, ops::Bound};

use amudai_common::{Result, verify_predicate};

use crate::{
    cancellation::CancellationToken,
    iterator::DocIdIterator,
    options::QueryOptions,
    posting::{FieldId, SegmentContext},
};

use super::{DisjunctionQuery, Query, QueryIterator, TermIterator, TermQuery};

/// Returns `true` if no string can satisfy both bounds.
pub(crate) fn is_empty_range(lower: Bound<&str>, upper: Bound<&str>) -> bool {
    match (lower, upper) {
        (Bound::Included(l), Bound::Included(u)) => l > u,
        (Bound::Included(l), Bound::Excluded(u))
        | (Bound::Excluded(l), Bound::Included(u))
        | (Bound::Excluded(l), Bound::Excluded(u)) => l >= u,
        _ => false,
    }
}

fn bound_str(bound: &Bound<String>) -> Bound<&str> {
    bound.as_ref().map(String::as_str)
}

enum RangePlan {
    Empty,
    Native { cost: u64 },
    Expanded(Box<Query>),
}

/// Matches the rows whose `field` contains a term within the bounds.
pub struct RangeQuery {
    segment: SegmentContext,
    field: FieldId,
    lower: Bound<String>,
    upper: Bound<String>,
    plan: RangePlan,
}

impl RangeQuery {
    /// Resolves the range against the segment's term dictionary.
    ///
    /// Fails with `InvalidPredicate` if the expansion exceeds
    /// [`QueryOptions::max_range_terms`].
    pub fn new(
        segment: SegmentContext,
        field: FieldId,
        lower: Bound<String>,
        upper: Bound<String>,
        options: &QueryOptions,
    ) -> Result<RangeQuery> {
        let plan = Self::plan(
            &segment,
            field,
            bound_str(&lower),
            bound_str(&upper),
            options,
        )?;
        Ok(RangeQuery {
            segment,
            field,
            lower,
            upper,
            plan,
        })
    }

    fn plan(
        segment: &SegmentContext,
        field: FieldId,
        lower: Bound<&str>,
        upper: Bound<&str>,
        options: &QueryOptions,
    ) -> Result<RangePlan> {
        if is_empty_range(lower, upper) {
            return Ok(RangePlan::Empty);
        }
        let source = segment.source();
        if options.prefer_native_range && source.supports_native_range(field) {
            let cost = source
                .range_doc_freq(field, lower, upper)?
                .min(segment.row_count() as u64);
            log::debug!("range on field {field} uses the native range cursor, cost={cost}");
            return Ok(RangePlan::Native { cost });
        }

        let terms = source.terms_in_range(field, lower, upper)?;
        verify_predicate!(
            terms.len() <= options.max_range_terms,
            "range on field {field} expands to {} terms, the limit is {}",
            terms.len(),
            options.max_range_terms
        );
        log::debug!("range on field {field} expands to {} terms", terms.len());

        let mut children = Vec::with_capacity(terms.len());
        for term in terms {
            children.push(TermQuery::new(segment.clone(), field, term)?.into_query());
        }
        if children.len() <= 1 {
            return Ok(match children.pop() {
                Some(term) => RangePlan::Expanded(Box::new(term)),
                None => RangePlan::Empty,
            });
        }
        let expanded = if options.prune_empty_disjuncts {
            DisjunctionQuery::new_pruned(children)?
        } else {
            DisjunctionQuery::new(children)?
        };
        Ok(RangePlan::Expanded(Box::new(expanded.into_query())))
    }

    pub fn into_query(self) -> Query {
        Query::Range(self)
    }

    pub fn segment(&self) -> &SegmentContext {
        &self.segment
    }

    pub fn field(&self) -> FieldId {
        self.field
    }

    pub fn lower(&self) -> Bound<&str> {
        bound_str(&self.lower)
    }

    pub fn upper(&self) -> Bound<&str> {
        bound_str(&self.upper)
    }

    /// Returns `true` if the range is evaluated through a native range cursor.
    pub fn is_native(&self) -> bool {
        matches!(self.plan, RangePlan::Native { .. })
    }

    pub fn cost(&self) -> u64 {
        match &self.plan {
            RangePlan::Empty => 0,
            RangePlan::Native { cost } => *cost,
            RangePlan::Expanded(query) => query.cost(),
        }
    }

    pub fn iterator(&self, cancel: &CancellationToken) -> Result<QueryIterator> {
        match &self.plan {
            RangePlan::Empty => Ok(QueryIterator::empty()),
            RangePlan::Native { .. } => {
                let cursor =
                    self.segment
                        .source()
                        .open_range(self.field, self.lower(), self.upper())?;
                Ok(QueryIterator::Term(TermIterator::new(cursor)))
            }
            RangePlan::Expanded(query) => query.iterator_with(cancel),
        }
    }
}

impl fmt::Display for RangeQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let open = match &self.lower {
            Bound::Included(l) => format!("[{l:?}"),
            Bound::Excluded(l) => format!("({l:?}"),
            Bound::Unbounded => "(*".to_string(),
        };
        let close = match &self.upper {
            Bound::Included(u) => format!("{u:?}]"),
            Bound::Excluded(u) => format!("{u:?})"),
            Bound::Unbounded => "*)".to_string(),
        };
        let mode = match &self.plan {
            RangePlan::Empty => "empty",
            RangePlan::Native { .. } => "native",
            RangePlan::Expanded(_) => "expanded",
        };
        write!(
            f,
            "range({}:{open}..{close}, {mode}, cost={})",
            self.field,
            self.cost()
        )
    }
}

#[cfg(test)]
mod tests {
    use std::{
        ops::Bound,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use amudai_common::{Result, error::ErrorKind};

    use super::{RangeQuery, is_empty_range};
    use crate::{
        iterator::DocIds,
        memory::MemoryPostingSource,
        options::QueryOptions,
        posting::{FieldId, PostingCursor, PostingSource, SegmentContext},
        query::Query,
    };

    fn segment(native: bool) -> SegmentContext {
        let source = MemoryPostingSource::builder()
            .add_posting(FieldId(0), "2024-01", [0, 4])
            .add_posting(FieldId(0), "2024-02", [1, 4])
            .add_posting(FieldId(0), "2024-03", [2])
            .add_posting(FieldId(0), "2024-04", [3, 5])
            .native_range(native)
            .build()
            .unwrap();
        SegmentContext::new(Arc::new(source), 6).unwrap()
    }

    fn range(segment: SegmentContext, lower: Bound<&str>, upper: Bound<&str>) -> RangeQuery {
        RangeQuery::new(
            segment,
            FieldId(0),
            lower.map(str::to_string),
            upper.map(str::to_string),
            &QueryOptions::default(),
        )
        .unwrap()
    }

    fn collect(query: &Query) -> Vec<u32> {
        DocIds::new(query.iterator().unwrap())
            .collect::<amudai_common::Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_empty_range_detection() {
        assert!(is_empty_range(Bound::Included("b"), Bound::Included("a")));
        assert!(is_empty_range(Bound::Included("a"), Bound::Excluded("a")));
        assert!(is_empty_range(Bound::Excluded("a"), Bound::Excluded("a")));
        assert!(!is_empty_range(Bound::Included("a"), Bound::Included("a")));
        assert!(!is_empty_range(Bound::Unbounded, Bound::Excluded("a")));
    }

    #[test]
    fn test_expanded_and_native_agree() {
        for native in [false, true] {
            let query = range(
                segment(native),
                Bound::Included("2024-02"),
                Bound::Excluded("2024-04"),
            );
            assert_eq!(query.is_native(), native);
            assert_eq!(query.cost(), 3);
            assert_eq!(collect(&query.into_query()), vec![1, 2, 4]);
        }
    }

    /// Forwards to an in-memory source and counts the native cursors opened.
    struct CountingSource {
        inner: MemoryPostingSource,
        range_opens: AtomicUsize,
    }

    impl PostingSource for CountingSource {
        fn open(&self, field: FieldId, term: &str) -> Result<Option<Box<dyn PostingCursor>>> {
            self.inner.open(field, term)
        }

        fn terms_in_range(
            &self,
            field: FieldId,
            lower: Bound<&str>,
            upper: Bound<&str>,
        ) -> Result<Vec<String>> {
            self.inner.terms_in_range(field, lower, upper)
        }

        fn supports_native_range(&self, field: FieldId) -> bool {
            self.inner.supports_native_range(field)
        }

        fn open_range(
            &self,
            field: FieldId,
            lower: Bound<&str>,
            upper: Bound<&str>,
        ) -> Result<Box<dyn PostingCursor>> {
            self.range_opens.fetch_add(1, Ordering::Relaxed);
            self.inner.open_range(field, lower, upper)
        }

        fn range_doc_freq(
            &self,
            field: FieldId,
            lower: Bound<&str>,
            upper: Bound<&str>,
        ) -> Result<u64> {
            self.inner.range_doc_freq(field, lower, upper)
        }
    }

    #[test]
    fn test_native_range_opens_one_cursor() {
        let source = Arc::new(CountingSource {
            inner: MemoryPostingSource::builder()
                .add_posting(FieldId(0), "a", [0, 2])
                .add_posting(FieldId(0), "b", [1])
                .add_posting(FieldId(0), "c", [3])
                .native_range(true)
                .build()
                .unwrap(),
            range_opens: AtomicUsize::new(0),
        });
        let segment = SegmentContext::new(source.clone(), 4).unwrap();
        let query = range(segment, Bound::Included("a"), Bound::Included("b"));
        assert!(query.is_native());
        assert_eq!(query.cost(), 3);
        assert_eq!(source.range_opens.load(Ordering::Relaxed), 0);

        assert_eq!(collect(&query.into_query()), vec![0, 1, 2]);
        assert_eq!(source.range_opens.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_unbounded_range() {
        let query = range(segment(false), Bound::Excluded("2024-01"), Bound::Unbounded);
        assert_eq!(collect(&query.into_query()), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_inverted_range_matches_nothing() {
        let query = range(
            segment(true),
            Bound::Included("2024-04"),
            Bound::Included("2024-01"),
        );
        assert_eq!(query.cost(), 0);
        assert!(collect(&query.into_query()).is_empty());
    }

    #[test]
    fn test_expansion_limit() {
        let options = QueryOptions {
            max_range_terms: 2,
            ..Default::default()
        };
        let err = RangeQuery::new(
            segment(false),
            FieldId(0),
            Bound::Unbounded,
            Bound::Unbounded,
            &options,
        )
        .err()
        .unwrap();
        assert!(matches!(err.kind(), ErrorKind::InvalidPredicate { .. }));
    }
}
