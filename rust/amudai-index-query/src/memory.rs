//! An in-memory [`PostingSource`].
//!
//! `MemoryPostingSource` keeps a sorted term dictionary per field and a fully
//! decoded posting list (with optional term positions) per term. It backs small
//! in-memory segments and is the reference source used throughout the tests.

use std::{collections::BTreeMap, ops::Bound, sync::Arc};

use ahash::AHashMap;
use amudai_common::{Result, error::Error};

use crate::{
    iterator::{DocId, DocIdIterator, NO_MORE_DOCS},
    posting::{FieldId, PostingCursor, PostingSource},
    query::range::is_empty_range,
};

/// Posting data of a single term: ascending doc ids and, per doc, the
/// ascending positions of the term within it.
#[derive(Debug, Default)]
struct PostingData {
    docs: Vec<DocId>,
    positions: Vec<Vec<u32>>,
}

type TermDictionary = BTreeMap<String, Arc<PostingData>>;

/// Read-only in-memory inverted index of one segment.
pub struct MemoryPostingSource {
    fields: AHashMap<FieldId, TermDictionary>,
    native_range: bool,
}

impl MemoryPostingSource {
    pub fn builder() -> MemoryPostingSourceBuilder {
        MemoryPostingSourceBuilder::default()
    }

    /// Number of distinct terms indexed for `field`.
    pub fn term_count(&self, field: FieldId) -> usize {
        self.fields.get(&field).map_or(0, |terms| terms.len())
    }

    fn dictionary(&self, field: FieldId) -> Option<&TermDictionary> {
        self.fields.get(&field)
    }
}

impl PostingSource for MemoryPostingSource {
    fn open(&self, field: FieldId, term: &str) -> Result<Option<Box<dyn PostingCursor>>> {
        let Some(data) = self.dictionary(field).and_then(|terms| terms.get(term)) else {
            return Ok(None);
        };
        Ok(Some(Box::new(MemoryCursor::new(Arc::clone(data)))))
    }

    fn doc_freq(&self, field: FieldId, term: &str) -> Result<Option<u64>> {
        Ok(self
            .dictionary(field)
            .and_then(|terms| terms.get(term))
            .map(|data| data.docs.len() as u64))
    }

    fn terms_in_range(
        &self,
        field: FieldId,
        lower: Bound<&str>,
        upper: Bound<&str>,
    ) -> Result<Vec<String>> {
        if is_empty_range(lower, upper) {
            return Ok(Vec::new());
        }
        let Some(terms) = self.dictionary(field) else {
            return Ok(Vec::new());
        };
        Ok(terms
            .range::<str, _>((lower, upper))
            .map(|(term, _)| term.clone())
            .collect())
    }

    fn supports_native_range(&self, field: FieldId) -> bool {
        self.native_range && self.fields.contains_key(&field)
    }

    fn range_doc_freq(
        &self,
        field: FieldId,
        lower: Bound<&str>,
        upper: Bound<&str>,
    ) -> Result<u64> {
        if is_empty_range(lower, upper) {
            return Ok(0);
        }
        Ok(self
            .dictionary(field)
            .map(|terms| {
                terms
                    .range::<str, _>((lower, upper))
                    .map(|(_, data)| data.docs.len() as u64)
                    .sum()
            })
            .unwrap_or(0))
    }

    fn open_range(
        &self,
        field: FieldId,
        lower: Bound<&str>,
        upper: Bound<&str>,
    ) -> Result<Box<dyn PostingCursor>> {
        if !self.supports_native_range(field) {
            return Err(Error::invalid_operation(format!(
                "native range scan is not enabled for field {field}"
            )));
        }
        let mut docs = Vec::new();
        if !is_empty_range(lower, upper) {
            if let Some(terms) = self.dictionary(field) {
                for (_, data) in terms.range::<str, _>((lower, upper)) {
                    docs.extend_from_slice(&data.docs);
                }
            }
        }
        docs.sort_unstable();
        docs.dedup();
        // A merged range cursor carries no term positions.
        let data = PostingData {
            positions: Vec::new(),
            docs,
        };
        Ok(Box::new(MemoryCursor::new(Arc::new(data))))
    }
}

/// Builder for [`MemoryPostingSource`].
#[derive(Default)]
pub struct MemoryPostingSourceBuilder {
    fields: AHashMap<FieldId, BTreeMap<String, BTreeMap<DocId, Vec<u32>>>>,
    native_range: bool,
}

impl MemoryPostingSourceBuilder {
    /// Records the tokens of one document field value. The position of each
    /// term is its index in `terms`.
    pub fn add_terms<S: AsRef<str>>(
        mut self,
        field: FieldId,
        doc: DocId,
        terms: &[S],
    ) -> Self {
        let dictionary = self.fields.entry(field).or_default();
        for (position, term) in terms.iter().enumerate() {
            dictionary
                .entry(term.as_ref().to_string())
                .or_default()
                .entry(doc)
                .or_default()
                .push(position as u32);
        }
        self
    }

    /// Records a whole posting list without positions.
    pub fn add_posting(
        mut self,
        field: FieldId,
        term: &str,
        docs: impl IntoIterator<Item = DocId>,
    ) -> Self {
        let postings = self
            .fields
            .entry(field)
            .or_default()
            .entry(term.to_string())
            .or_default();
        for doc in docs {
            postings.entry(doc).or_default();
        }
        self
    }

    /// Enables [`PostingSource::open_range`] on the built source.
    pub fn native_range(mut self, enabled: bool) -> Self {
        self.native_range = enabled;
        self
    }

    pub fn build(self) -> Result<MemoryPostingSource> {
        let mut fields = AHashMap::with_capacity(self.fields.len());
        for (field, terms) in self.fields {
            let mut dictionary = TermDictionary::new();
            for (term, postings) in terms {
                if postings.contains_key(&NO_MORE_DOCS) {
                    return Err(Error::invalid_arg(
                        "doc",
                        format!("term '{term}' in field {field} uses the reserved doc id"),
                    ));
                }
                let mut data = PostingData {
                    docs: Vec::with_capacity(postings.len()),
                    positions: Vec::with_capacity(postings.len()),
                };
                for (doc, mut positions) in postings {
                    positions.sort_unstable();
                    positions.dedup();
                    data.docs.push(doc);
                    data.positions.push(positions);
                }
                dictionary.insert(term, Arc::new(data));
            }
            fields.insert(field, dictionary);
        }
        Ok(MemoryPostingSource {
            fields,
            native_range: self.native_range,
        })
    }
}

/// Cursor over a decoded posting list, using galloping search for `advance`.
struct MemoryCursor {
    data: Arc<PostingData>,
    pos: Option<usize>,
}

impl MemoryCursor {
    fn new(data: Arc<PostingData>) -> MemoryCursor {
        MemoryCursor { data, pos: None }
    }

    /// Returns the index of the first doc `>= target` at or after `from`.
    fn seek(&self, from: usize, target: DocId) -> usize {
        let docs = &self.data.docs;
        let mut bound = 1;
        while from + bound < docs.len() && docs[from + bound] < target {
            bound *= 2;
        }
        let end = (from + bound + 1).min(docs.len());
        if from >= end {
            return docs.len();
        }
        from + docs[from..end].partition_point(|&doc| doc < target)
    }
}

impl DocIdIterator for MemoryCursor {
    fn doc_id(&self) -> DocId {
        self.pos
            .and_then(|pos| self.data.docs.get(pos).copied())
            .unwrap_or(NO_MORE_DOCS)
    }

    fn next_doc(&mut self) -> Result<DocId> {
        let next = match self.pos {
            None => 0,
            Some(pos) => (pos + 1).min(self.data.docs.len()),
        };
        self.pos = Some(next);
        Ok(self.doc_id())
    }

    fn advance(&mut self, target: DocId) -> Result<DocId> {
        let from = match self.pos {
            Some(pos) => {
                if self.doc_id() >= target {
                    return Ok(self.doc_id());
                }
                pos
            }
            None => 0,
        };
        self.pos = Some(self.seek(from, target));
        Ok(self.doc_id())
    }

    fn cost(&self) -> u64 {
        self.data.docs.len() as u64
    }
}

impl PostingCursor for MemoryCursor {
    fn position_list(&mut self, doc_id: DocId) -> Result<Vec<u32>> {
        if doc_id == NO_MORE_DOCS || self.doc_id() != doc_id {
            return Err(Error::invalid_operation(format!(
                "position list requested for doc {doc_id}, cursor is at {}",
                self.doc_id()
            )));
        }
        let pos = self.pos.unwrap_or_default();
        Ok(self.data.positions.get(pos).cloned().unwrap_or_default())
    }
}
