use std::collections::{BTreeSet, HashMap};
use std::ops::Bound;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use amudai_common::Result;
use amudai_index_query::{
    CancellationToken, ConjunctionQuery, DisjunctionQuery, DocId, DocIdIterator, DocIds, FieldId,
    MemoryPostingSource, NO_MORE_DOCS, NegationQuery, PostingCursor, PostingSource, Predicate,
    Query, SegmentContext, TermQuery, compile,
};
use roaring::RoaringBitmap;

const FIELD: FieldId = FieldId(0);

fn scenario_segment() -> SegmentContext {
    let source = MemoryPostingSource::builder()
        .add_posting(FIELD, "foo", [1, 3, 5, 7])
        .add_posting(FIELD, "bar", [3, 5, 9])
        .build()
        .unwrap();
    SegmentContext::new(Arc::new(source), 10).unwrap()
}

fn term(segment: &SegmentContext, term: &str) -> Query {
    TermQuery::new(segment.clone(), FIELD, term)
        .unwrap()
        .into_query()
}

fn collect(query: &Query) -> Vec<DocId> {
    DocIds::new(query.iterator().unwrap())
        .collect::<Result<Vec<_>>>()
        .unwrap()
}

fn execute(query: &Query) -> Vec<DocId> {
    let mut rows = RoaringBitmap::new();
    let outcome = query
        .execute(&mut rows, None, &CancellationToken::none())
        .unwrap();
    assert!(outcome.is_completed());
    rows.iter().collect()
}

/// Random sorted posting list over `0..universe` with the given density.
fn random_postings(rng: &mut fastrand::Rng, universe: u32, density: f64) -> Vec<DocId> {
    (0..universe).filter(|_| rng.f64() < density).collect()
}

/// Validates the three reference scenarios:
/// 1. AND / OR over two overlapping terms
/// 2. NOT relative to a 10 row universe
/// 3. An absent term, alone and inside a conjunction
#[test]
fn test_reference_scenarios() {
    let segment = scenario_segment();

    let and = ConjunctionQuery::new(vec![term(&segment, "foo"), term(&segment, "bar")])
        .unwrap()
        .into_query();
    assert_eq!(execute(&and), vec![3, 5]);

    let or = DisjunctionQuery::new(vec![term(&segment, "foo"), term(&segment, "bar")])
        .unwrap()
        .into_query();
    assert_eq!(execute(&or), vec![1, 3, 5, 7, 9]);

    let not = NegationQuery::new(term(&segment, "bar")).into_query();
    assert_eq!(execute(&not), vec![0, 1, 2, 4, 6, 7, 8]);

    let absent = term(&segment, "absent");
    assert_eq!(absent.cost(), 0);
    assert!(execute(&absent).is_empty());

    let and_absent =
        ConjunctionQuery::new(vec![term(&segment, "foo"), term(&segment, "absent")])
            .unwrap()
            .into_query();
    assert!(execute(&and_absent).is_empty());
}

/// Conjunction results must not depend on the order of the operands.
#[test]
fn test_conjunction_operand_order_is_irrelevant() {
    let mut rng = fastrand::Rng::with_seed(7);
    let universe = 2_000;
    let mut builder = MemoryPostingSource::builder();
    let densities = [0.5, 0.05, 0.3, 0.9];
    let mut lists = Vec::new();
    for (i, density) in densities.iter().enumerate() {
        let docs = random_postings(&mut rng, universe, *density);
        builder = builder.add_posting(FIELD, &format!("t{i}"), docs.iter().copied());
        lists.push(docs.into_iter().collect::<BTreeSet<_>>());
    }
    let segment = SegmentContext::new(Arc::new(builder.build().unwrap()), universe).unwrap();

    let expected = lists
        .iter()
        .skip(1)
        .fold(lists[0].clone(), |acc, list| {
            acc.intersection(list).copied().collect()
        })
        .into_iter()
        .collect::<Vec<_>>();

    let orders: [[usize; 4]; 4] = [[0, 1, 2, 3], [3, 2, 1, 0], [1, 3, 0, 2], [2, 0, 3, 1]];
    for order in orders {
        let children = order
            .iter()
            .map(|i| term(&segment, &format!("t{i}")))
            .collect();
        let query = ConjunctionQuery::new(children).unwrap().into_query();
        assert_eq!(collect(&query), expected);
        assert_eq!(execute(&query), expected);
    }
}

/// Union and complement against set arithmetic on random posting lists.
#[test]
fn test_union_and_complement_match_set_semantics() {
    let mut rng = fastrand::Rng::with_seed(42);
    for round in 0..10 {
        let universe = rng.u32(1..3_000);
        let a = random_postings(&mut rng, universe, 0.1);
        let b = random_postings(&mut rng, universe, 0.02);
        let source = MemoryPostingSource::builder()
            .add_posting(FIELD, "a", a.iter().copied())
            .add_posting(FIELD, "b", b.iter().copied())
            .build()
            .unwrap();
        let segment = SegmentContext::new(Arc::new(source), universe).unwrap();

        let union = DisjunctionQuery::new(vec![term(&segment, "a"), term(&segment, "b")])
            .unwrap()
            .into_query();
        let expected = a
            .iter()
            .chain(b.iter())
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect::<Vec<_>>();
        assert_eq!(collect(&union), expected, "round {round}");

        let complement = NegationQuery::new(term(&segment, "a")).into_query();
        let a_set = a.iter().copied().collect::<BTreeSet<_>>();
        let expected = (0..universe)
            .filter(|doc| !a_set.contains(doc))
            .collect::<Vec<_>>();
        assert_eq!(collect(&complement), expected, "round {round}");

        // a AND NOT b
        let difference = ConjunctionQuery::new(vec![
            NegationQuery::new(term(&segment, "b")).into_query(),
            term(&segment, "a"),
        ])
        .unwrap()
        .into_query();
        let b_set = b.iter().copied().collect::<BTreeSet<_>>();
        let expected = a
            .iter()
            .copied()
            .filter(|doc| !b_set.contains(doc))
            .collect::<Vec<_>>();
        assert_eq!(collect(&difference), expected, "round {round}");
    }
}

/// Ids are strictly ascending, the sentinel is sticky and `advance` is
/// idempotent for every composite iterator.
#[test]
fn test_iteration_protocol() {
    let segment = scenario_segment();
    let queries = [
        ConjunctionQuery::new(vec![term(&segment, "foo"), term(&segment, "bar")])
            .unwrap()
            .into_query(),
        DisjunctionQuery::new(vec![term(&segment, "foo"), term(&segment, "bar")])
            .unwrap()
            .into_query(),
        NegationQuery::new(term(&segment, "bar")).into_query(),
    ];
    for query in &queries {
        let mut it = query.iterator().unwrap();
        assert_eq!(it.doc_id(), NO_MORE_DOCS);
        let mut last = None;
        loop {
            let doc = it.next_doc().unwrap();
            if doc == NO_MORE_DOCS {
                break;
            }
            if let Some(last) = last {
                assert!(doc > last, "{query}: {doc} after {last}");
            }
            assert_eq!(it.advance(doc).unwrap(), doc);
            assert_eq!(it.doc_id(), doc);
            last = Some(doc);
        }
        for _ in 0..3 {
            assert_eq!(it.next_doc().unwrap(), NO_MORE_DOCS);
            assert_eq!(it.advance(0).unwrap(), NO_MORE_DOCS);
            assert_eq!(it.doc_id(), NO_MORE_DOCS);
        }
    }
}

/// Wraps a source and counts the `advance` calls made on the cursors of one
/// term.
struct CountingSource {
    inner: MemoryPostingSource,
    counted_term: &'static str,
    advances: Arc<AtomicU64>,
}

struct CountingCursor {
    inner: Box<dyn PostingCursor>,
    advances: Arc<AtomicU64>,
}

impl DocIdIterator for CountingCursor {
    fn doc_id(&self) -> DocId {
        self.inner.doc_id()
    }

    fn next_doc(&mut self) -> Result<DocId> {
        self.inner.next_doc()
    }

    fn advance(&mut self, target: DocId) -> Result<DocId> {
        self.advances.fetch_add(1, Ordering::Relaxed);
        self.inner.advance(target)
    }

    fn cost(&self) -> u64 {
        self.inner.cost()
    }
}

impl PostingCursor for CountingCursor {
    fn position_list(&mut self, doc_id: DocId) -> Result<Vec<u32>> {
        self.inner.position_list(doc_id)
    }
}

impl PostingSource for CountingSource {
    fn open(&self, field: FieldId, term: &str) -> Result<Option<Box<dyn PostingCursor>>> {
        let cursor = self.inner.open(field, term)?;
        if term != self.counted_term {
            return Ok(cursor);
        }
        Ok(cursor.map(|inner| {
            Box::new(CountingCursor {
                inner,
                advances: self.advances.clone(),
            }) as Box<dyn PostingCursor>
        }))
    }

    fn doc_freq(&self, field: FieldId, term: &str) -> Result<Option<u64>> {
        self.inner.doc_freq(field, term)
    }

    fn terms_in_range(
        &self,
        field: FieldId,
        lower: Bound<&str>,
        upper: Bound<&str>,
    ) -> Result<Vec<String>> {
        self.inner.terms_in_range(field, lower, upper)
    }
}

/// A conjunction of a tiny list with a huge one touches the huge list at most
/// once per entry of the tiny one, whatever order the operands are given in.
#[test]
fn test_conjunction_skips_large_operand() {
    let rare = [10u32, 50_000, 99_999];
    let advances = Arc::new(AtomicU64::new(0));
    let source = CountingSource {
        inner: MemoryPostingSource::builder()
            .add_posting(FIELD, "common", 0..100_000)
            .add_posting(FIELD, "rare", rare)
            .build()
            .unwrap(),
        counted_term: "common",
        advances: advances.clone(),
    };
    let segment = SegmentContext::new(Arc::new(source), 100_000).unwrap();
    let query = ConjunctionQuery::new(vec![term(&segment, "common"), term(&segment, "rare")])
        .unwrap()
        .into_query();
    assert_eq!(query.cost(), 3);
    assert_eq!(collect(&query), rare.to_vec());
    assert!(advances.load(Ordering::Relaxed) <= rare.len() as u64);
}

/// A negation operand inside a conjunction is driven by the positive operand.
#[test]
fn test_negation_in_conjunction_is_driven() {
    let rare = [1u32, 2, 5_001, 77_777, 99_998];
    let advances = Arc::new(AtomicU64::new(0));
    let source = CountingSource {
        inner: MemoryPostingSource::builder()
            .add_posting(FIELD, "common", (0..100_000).step_by(2))
            .add_posting(FIELD, "rare", rare)
            .build()
            .unwrap(),
        counted_term: "common",
        advances: advances.clone(),
    };
    let segment = SegmentContext::new(Arc::new(source), 100_000).unwrap();
    let query = ConjunctionQuery::new(vec![
        NegationQuery::new(term(&segment, "common")).into_query(),
        term(&segment, "rare"),
    ])
    .unwrap()
    .into_query();
    assert_eq!(collect(&query), vec![1, 5_001, 77_777]);
    assert!(advances.load(Ordering::Relaxed) <= 2 * rare.len() as u64);
}

/// Range and phrase predicates compiled from a schema-level description.
#[test]
fn test_range_and_phrase_through_compiler() {
    let source = MemoryPostingSource::builder()
        .add_posting(FieldId(0), "2024-01-01", [0, 1])
        .add_posting(FieldId(0), "2024-01-02", [2])
        .add_posting(FieldId(0), "2024-01-03", [3, 4])
        .add_terms(FieldId(1), 0, &["connection", "timed", "out"])
        .add_terms(FieldId(1), 2, &["timed", "connection", "out"])
        .add_terms(FieldId(1), 3, &["request", "timed", "out", "again"])
        .build()
        .unwrap();
    let segment = SegmentContext::new(Arc::new(source), 5).unwrap();
    let fields = HashMap::from([
        ("day".to_string(), FieldId(0)),
        ("msg".to_string(), FieldId(1)),
    ]);

    let range = Predicate::range(
        "day",
        Bound::Excluded("2024-01-01"),
        Bound::Included("2024-01-03"),
    );
    let query = compile(&range, &segment, &fields).unwrap();
    assert_eq!(execute(&query), vec![2, 3, 4]);

    let phrase = Predicate::phrase("msg", ["timed", "out"]);
    let query = compile(&phrase, &segment, &fields).unwrap();
    assert_eq!(execute(&query), vec![0, 3]);

    let both = Predicate::and([range, phrase]);
    let query = compile(&both, &segment, &fields).unwrap();
    assert_eq!(execute(&query), vec![3]);
}

/// The evaluation order of conjunction operands is ascending by cost, with
/// negations after every positive operand.
#[test]
fn test_compiled_tree_display() {
    let segment = scenario_segment();
    let fields = HashMap::from([("tag".to_string(), FIELD)]);
    let predicate = Predicate::and([
        Predicate::not(Predicate::term("tag", "bar")),
        Predicate::term("tag", "foo"),
        Predicate::term("tag", "bar"),
    ]);
    let query = compile(&predicate, &segment, &fields).unwrap();
    assert_eq!(
        query.to_string(),
        "AND[cost=3](term(#0:\"bar\", cost=3), term(#0:\"foo\", cost=4), \
         NOT(term(#0:\"bar\", cost=3)))"
    );
    assert_eq!(execute(&query), Vec::<DocId>::new());
}
