//! Planner-facing predicate descriptions.
//!
//! A [`Predicate`] names fields by their schema name and is independent of any
//! particular segment. It is compiled into a [`Query`](crate::query::Query)
//! tree once per segment by the [`compiler`](crate::compiler), which resolves
//! field names through a [`FieldResolver`].
//!
//! Predicates round-trip through JSON with an `op` tag:
//!
//! ```json
//! { "op": "and", "operands": [
//!     { "op": "term", "field": "level", "term": "error" },
//!     { "op": "not", "operands": [{ "op": "phrase", "field": "msg", "terms": ["timed", "out"] }] }
//! ] }
//! ```

use std::{collections::HashMap, hash::BuildHasher, ops::Bound};

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::posting::FieldId;

/// A boolean predicate over indexed terms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Predicate {
    /// Rows whose `field` contains `term`.
    Term { field: String, term: String },
    /// Rows matched by every operand.
    And { operands: Vec<Predicate> },
    /// Rows matched by at least one operand.
    Or { operands: Vec<Predicate> },
    /// Rows not matched by the operand. Exactly one operand is accepted.
    Not { operands: Vec<Predicate> },
    /// Rows whose `field` contains a term within the bounds.
    Range {
        field: String,
        #[serde(default = "unbounded")]
        lower: Bound<String>,
        #[serde(default = "unbounded")]
        upper: Bound<String>,
    },
    /// Rows whose `field` contains `terms` at consecutive positions.
    Phrase { field: String, terms: Vec<String> },
}

fn unbounded() -> Bound<String> {
    Bound::Unbounded
}

impl Predicate {
    pub fn term(field: impl Into<String>, term: impl Into<String>) -> Predicate {
        Predicate::Term {
            field: field.into(),
            term: term.into(),
        }
    }

    pub fn and(operands: impl IntoIterator<Item = Predicate>) -> Predicate {
        Predicate::And {
            operands: operands.into_iter().collect(),
        }
    }

    pub fn or(operands: impl IntoIterator<Item = Predicate>) -> Predicate {
        Predicate::Or {
            operands: operands.into_iter().collect(),
        }
    }

    pub fn not(operand: Predicate) -> Predicate {
        Predicate::Not {
            operands: vec![operand],
        }
    }

    pub fn range(
        field: impl Into<String>,
        lower: Bound<&str>,
        upper: Bound<&str>,
    ) -> Predicate {
        Predicate::Range {
            field: field.into(),
            lower: lower.map(str::to_string),
            upper: upper.map(str::to_string),
        }
    }

    pub fn phrase<S: Into<String>>(
        field: impl Into<String>,
        terms: impl IntoIterator<Item = S>,
    ) -> Predicate {
        Predicate::Phrase {
            field: field.into(),
            terms: terms.into_iter().map(Into::into).collect(),
        }
    }
}

/// Maps schema field names to the field ids of a segment's inverted index.
///
/// A resolver is shared by parallel segment scans, hence `Send + Sync`.
pub trait FieldResolver: Send + Sync {
    /// Returns `None` if the field is not indexed.
    fn resolve(&self, name: &str) -> Option<FieldId>;
}

impl<S: BuildHasher + Send + Sync> FieldResolver for HashMap<String, FieldId, S> {
    fn resolve(&self, name: &str) -> Option<FieldId> {
        self.get(name).copied()
    }
}

impl FieldResolver for AHashMap<String, FieldId> {
    fn resolve(&self, name: &str) -> Option<FieldId> {
        self.get(name).copied()
    }
}

impl<T: FieldResolver + ?Sized> FieldResolver for &T {
    fn resolve(&self, name: &str) -> Option<FieldId> {
        (**self).resolve(name)
    }
}

#[cfg(test)]
mod tests {
    use std::ops::Bound;

    use ahash::AHashMap;

    use super::{FieldResolver, Predicate};
    use crate::posting::FieldId;

    #[test]
    fn test_json_shape() {
        let predicate = Predicate::and([
            Predicate::term("level", "error"),
            Predicate::not(Predicate::phrase("msg", ["timed", "out"])),
        ]);
        let json = serde_json::to_value(&predicate).unwrap();
        assert_eq!(json["op"], "and");
        assert_eq!(json["operands"][0]["op"], "term");
        assert_eq!(json["operands"][1]["operands"][0]["terms"][1], "out");

        let parsed: Predicate = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, predicate);
    }

    #[test]
    fn test_range_bounds_default_to_unbounded() {
        let parsed: Predicate = serde_json::from_str(
            r#"{ "op": "range", "field": "day", "lower": { "Included": "2024-01-01" } }"#,
        )
        .unwrap();
        assert_eq!(
            parsed,
            Predicate::range("day", Bound::Included("2024-01-01"), Bound::Unbounded)
        );
    }

    #[test]
    fn test_unknown_op_rejected() {
        let parsed = serde_json::from_str::<Predicate>(r#"{ "op": "xor", "operands": [] }"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_map_resolver() {
        let mut fields = AHashMap::new();
        fields.insert("msg".to_string(), FieldId(3));
        assert_eq!(fields.resolve("msg"), Some(FieldId(3)));
        assert_eq!((&fields).resolve("other"), None);
    }
}
