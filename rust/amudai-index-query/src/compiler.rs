//! Compilation of [`Predicate`] descriptions into per-segment [`Query`] trees.
//!
//! The compiler resolves field names, opens the term dictionary of the segment
//! to size every leaf, and builds the tree bottom-up. All structural
//! validation happens here, so a tree that compiles can always be evaluated;
//! only I/O, corruption and cancellation can stop it later.
//!
//! Rules applied while compiling:
//! - `And` / `Or` need at least one operand; a single operand is returned as
//!   is.
//! - `Not` needs exactly one operand.
//! - A single-term `Phrase` is compiled as a `Term`.
//! - An unknown field is an `InvalidPredicate` error, an unknown term is not.

use amudai_common::{Result, error::Error, verify_predicate};

use crate::{
    options::QueryOptions,
    posting::{FieldId, SegmentContext},
    predicate::{FieldResolver, Predicate},
    query::{
        ConjunctionQuery, DisjunctionQuery, NegationQuery, PhraseQuery, Query, RangeQuery,
        TermQuery,
    },
};

/// Compiles `predicate` for `segment` with default [`QueryOptions`].
pub fn compile(
    predicate: &Predicate,
    segment: &SegmentContext,
    resolver: &dyn FieldResolver,
) -> Result<Query> {
    QueryCompiler::new(segment.clone(), resolver).compile(predicate)
}

/// Builds query trees for one segment.
pub struct QueryCompiler<'a> {
    segment: SegmentContext,
    resolver: &'a dyn FieldResolver,
    options: QueryOptions,
}

impl<'a> QueryCompiler<'a> {
    pub fn new(segment: SegmentContext, resolver: &'a dyn FieldResolver) -> QueryCompiler<'a> {
        QueryCompiler {
            segment,
            resolver,
            options: QueryOptions::default(),
        }
    }

    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    pub fn segment(&self) -> &SegmentContext {
        &self.segment
    }

    pub fn compile(&self, predicate: &Predicate) -> Result<Query> {
        let query = self.build(predicate)?;
        log::debug!("compiled query for {}: {query}", self.segment.name());
        Ok(query)
    }

    fn build(&self, predicate: &Predicate) -> Result<Query> {
        match predicate {
            Predicate::Term { field, term } => {
                let field = self.resolve(field)?;
                Ok(TermQuery::new(self.segment.clone(), field, term.as_str())?.into_query())
            }
            Predicate::And { operands } => {
                verify_predicate!(!operands.is_empty(), "AND requires at least one operand");
                let mut children = self.build_all(operands)?;
                if children.len() == 1 {
                    return Ok(children.remove(0));
                }
                Ok(ConjunctionQuery::new(children)?.into_query())
            }
            Predicate::Or { operands } => {
                verify_predicate!(!operands.is_empty(), "OR requires at least one operand");
                let mut children = self.build_all(operands)?;
                if children.len() == 1 {
                    return Ok(children.remove(0));
                }
                let disjunction = if self.options.prune_empty_disjuncts {
                    DisjunctionQuery::new_pruned(children)?
                } else {
                    DisjunctionQuery::new(children)?
                };
                Ok(disjunction.into_query())
            }
            Predicate::Not { operands } => {
                verify_predicate!(
                    operands.len() == 1,
                    "NOT requires exactly one operand, got {}",
                    operands.len()
                );
                let child = self.build(&operands[0])?;
                Ok(NegationQuery::new(child).into_query())
            }
            Predicate::Range {
                field,
                lower,
                upper,
            } => {
                let field = self.resolve(field)?;
                let range = RangeQuery::new(
                    self.segment.clone(),
                    field,
                    lower.clone(),
                    upper.clone(),
                    &self.options,
                )?;
                Ok(range.into_query())
            }
            Predicate::Phrase { field, terms } => {
                let field = self.resolve(field)?;
                verify_predicate!(!terms.is_empty(), "phrase on field {field} has no terms");
                if let [term] = terms.as_slice() {
                    return Ok(
                        TermQuery::new(self.segment.clone(), field, term.as_str())?.into_query()
                    );
                }
                let phrase = PhraseQuery::new(self.segment.clone(), field, terms.iter().cloned())?;
                Ok(phrase.into_query())
            }
        }
    }

    fn build_all(&self, operands: &[Predicate]) -> Result<Vec<Query>> {
        operands.iter().map(|operand| self.build(operand)).collect()
    }

    fn resolve(&self, name: &str) -> Result<FieldId> {
        self.resolver
            .resolve(name)
            .ok_or_else(|| Error::invalid_predicate(format!("unknown field '{name}'")))
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, sync::Arc};

    use amudai_common::error::ErrorKind;

    use super::{QueryCompiler, compile};
    use crate::{
        memory::MemoryPostingSource,
        options::QueryOptions,
        posting::{FieldId, SegmentContext},
        predicate::Predicate,
        query::QueryKind,
    };

    fn fixture() -> (SegmentContext, HashMap<String, FieldId>) {
        let source = MemoryPostingSource::builder()
            .add_posting(FieldId(0), "foo", [1, 3, 5, 7])
            .add_posting(FieldId(0), "bar", [3, 5, 9])
            .add_terms(FieldId(1), 2, &["quick", "brown"])
            .build()
            .unwrap();
        let segment = SegmentContext::new(Arc::new(source), 10).unwrap();
        let fields = HashMap::from([
            ("tag".to_string(), FieldId(0)),
            ("text".to_string(), FieldId(1)),
        ]);
        (segment, fields)
    }

    fn invalid_predicate(predicate: &Predicate) -> bool {
        let (segment, fields) = fixture();
        let err = compile(predicate, &segment, &fields).err().unwrap();
        matches!(err.kind(), ErrorKind::InvalidPredicate { .. })
    }

    #[test]
    fn test_structure() {
        let (segment, fields) = fixture();
        let query = compile(
            &Predicate::and([
                Predicate::term("tag", "foo"),
                Predicate::not(Predicate::term("tag", "bar")),
            ]),
            &segment,
            &fields,
        )
        .unwrap();
        assert_eq!(query.kind(), QueryKind::Conjunction);
        assert_eq!(query.children()[1].kind(), QueryKind::Negation);

        let query = compile(&Predicate::or([Predicate::term("tag", "foo")]), &segment, &fields)
            .unwrap();
        assert_eq!(query.kind(), QueryKind::Term);

        let query = compile(&Predicate::phrase("text", ["quick"]), &segment, &fields).unwrap();
        assert_eq!(query.kind(), QueryKind::Term);
    }

    #[test]
    fn test_invalid_predicates() {
        assert!(invalid_predicate(&Predicate::and([])));
        assert!(invalid_predicate(&Predicate::or([])));
        assert!(invalid_predicate(&Predicate::Not { operands: vec![] }));
        assert!(invalid_predicate(&Predicate::Not {
            operands: vec![Predicate::term("tag", "foo"), Predicate::term("tag", "bar")],
        }));
        assert!(invalid_predicate(&Predicate::term("missing", "foo")));
        assert!(invalid_predicate(&Predicate::phrase("text", Vec::<String>::new())));
    }

    #[test]
    fn test_absent_term_compiles() {
        let (segment, fields) = fixture();
        let query = compile(&Predicate::term("tag", "absent"), &segment, &fields).unwrap();
        assert_eq!(query.cost(), 0);
    }

    #[test]
    fn test_pruning_follows_options() {
        let (segment, fields) = fixture();
        let predicate = Predicate::or([
            Predicate::term("tag", "absent"),
            Predicate::term("tag", "foo"),
        ]);
        let pruned = QueryCompiler::new(segment.clone(), &fields)
            .compile(&predicate)
            .unwrap();
        assert_eq!(pruned.children().len(), 1);

        let options = QueryOptions {
            prune_empty_disjuncts: false,
            ..Default::default()
        };
        let kept = QueryCompiler::new(segment, &fields)
            .with_options(options)
            .compile(&predicate)
            .unwrap();
        assert_eq!(kept.children().len(), 2);
    }
}
