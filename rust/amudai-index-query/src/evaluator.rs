//! Materialization of a query tree into a row bitmap.
//!
//! [`QueryEvaluator`] drains the root iterator of a [`Query`] and collects the
//! matching row ids into a [`RoaringBitmap`]. The ids are collected into a
//! private bitmap first and merged into the caller's bitmap only when the
//! evaluation completes, so a cancelled or failed evaluation never leaves a
//! partial result behind.
//!
//! When the caller supplies a candidate bitmap (typically produced by another
//! index or by a previous filter stage), only candidates are reported. Two
//! strategies are available and always agree on the result:
//!
//! - [`CandidateStrategy::Seek`] walks the candidates and calls
//!   `advance(candidate)` on the iterator, which lets a selective candidate
//!   set skip most of the posting data.
//! - [`CandidateStrategy::Probe`] drains the iterator and tests membership in
//!   the candidate set, which is cheaper when the candidate set is much larger
//!   than the query result.
//!
//! The choice is made from the query cost and the candidate count, see
//! [`QueryOptions::candidate_probe_ratio`].

use std::time::{Duration, Instant};

use amudai_common::{Result, verify_data};
use roaring::RoaringBitmap;

use crate::{
    cancellation::CancellationToken,
    iterator::{DocId, DocIdIterator, NO_MORE_DOCS},
    options::QueryOptions,
    query::{Query, QueryIterator},
};

/// How the evaluator combines the query with a candidate bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CandidateStrategy {
    /// No candidate bitmap: every match is reported.
    Drain,
    /// Drive the iterator with `advance` from the candidate ids.
    Seek,
    /// Drain the iterator and keep the ids contained in the candidate set.
    Probe,
}

/// Statistics of a completed evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionStats {
    /// Number of rows reported.
    pub matches: u64,
    /// Number of `advance` calls (`Seek`) or membership tests (`Probe`)
    /// performed against the candidate set.
    pub candidate_probes: u64,
    pub strategy: CandidateStrategy,
    pub elapsed: Duration,
}

/// The result of [`QueryEvaluator::execute`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The evaluation ran to completion and the matches were merged into the
    /// caller's bitmap.
    Completed(ExecutionStats),
    /// The cancellation token fired. The caller's bitmap is untouched.
    Cancelled,
}

impl Outcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled)
    }

    pub fn stats(&self) -> Option<&ExecutionStats> {
        match self {
            Outcome::Completed(stats) => Some(stats),
            Outcome::Cancelled => None,
        }
    }
}

/// Evaluates a [`Query`] into a row bitmap.
pub struct QueryEvaluator<'a> {
    query: &'a Query,
    cancel: CancellationToken,
    options: QueryOptions,
    forced_strategy: Option<CandidateStrategy>,
}

impl<'a> QueryEvaluator<'a> {
    pub fn new(query: &'a Query) -> QueryEvaluator<'a> {
        QueryEvaluator {
            query,
            cancel: CancellationToken::none(),
            options: QueryOptions::default(),
            forced_strategy: None,
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    /// Overrides the cost-based choice between `Seek` and `Probe`.
    ///
    /// Only applies when a candidate bitmap is supplied; `Drain` restores the
    /// cost-based choice.
    pub fn with_strategy(mut self, strategy: CandidateStrategy) -> Self {
        self.forced_strategy = (strategy != CandidateStrategy::Drain).then_some(strategy);
        self
    }

    /// Returns the strategy `execute` uses for the given candidates.
    pub fn strategy(&self, candidates: Option<&RoaringBitmap>) -> CandidateStrategy {
        let Some(candidates) = candidates else {
            return CandidateStrategy::Drain;
        };
        if let Some(strategy) = self.forced_strategy {
            return strategy;
        }
        let threshold = self
            .options
            .candidate_probe_ratio
            .saturating_mul(self.query.cost());
        if candidates.len() > threshold {
            CandidateStrategy::Probe
        } else {
            CandidateStrategy::Seek
        }
    }

    /// Evaluates the query and merges the matching rows into `result`.
    ///
    /// Returns `Ok(Outcome::Cancelled)` if the token fired before or during
    /// evaluation. Any other error (I/O, index corruption) is returned as is.
    /// In both cases `result` is not modified.
    pub fn execute(
        &self,
        result: &mut RoaringBitmap,
        candidates: Option<&RoaringBitmap>,
    ) -> Result<Outcome> {
        let started = Instant::now();
        let strategy = self.strategy(candidates);
        let mut matches = RoaringBitmap::new();
        let run = self.cancel.check().and_then(|()| {
            let mut it = self.query.iterator_with(&self.cancel)?;
            match (strategy, candidates) {
                (CandidateStrategy::Seek, Some(candidates)) => {
                    self.seek(&mut it, candidates, &mut matches)
                }
                (_, candidates) => self.drain(&mut it, candidates, &mut matches),
            }
        });
        let candidate_probes = match run {
            Ok(probes) => probes,
            Err(e) if e.is_cancelled() => {
                log::debug!(
                    "evaluation on {} cancelled after {:?}",
                    self.query.segment().name(),
                    started.elapsed()
                );
                return Ok(Outcome::Cancelled);
            }
            Err(e) => return Err(e),
        };

        let stats = ExecutionStats {
            matches: matches.len(),
            candidate_probes,
            strategy,
            elapsed: started.elapsed(),
        };
        *result |= matches;
        log::debug!(
            "evaluated on {}: {} matches, strategy {:?}, {} probes, {:?}",
            self.query.segment().name(),
            stats.matches,
            stats.strategy,
            stats.candidate_probes,
            stats.elapsed
        );
        Ok(Outcome::Completed(stats))
    }

    /// Reports every id of the iterator, optionally filtered by `candidates`.
    fn drain(
        &self,
        it: &mut QueryIterator,
        candidates: Option<&RoaringBitmap>,
        out: &mut RoaringBitmap,
    ) -> Result<u64> {
        let universe = self.query.segment().row_count();
        let mut probes = 0u64;
        loop {
            let doc = it.next_doc()?;
            if doc == NO_MORE_DOCS {
                return Ok(probes);
            }
            verify_data!(doc, doc < universe);
            match candidates {
                Some(candidates) => {
                    probes += 1;
                    if candidates.contains(doc) {
                        out.insert(doc);
                    }
                }
                None => {
                    out.insert(doc);
                }
            }
            self.cancel.check()?;
        }
    }

    /// Drives the iterator from the candidate ids.
    fn seek(
        &self,
        it: &mut QueryIterator,
        candidates: &RoaringBitmap,
        out: &mut RoaringBitmap,
    ) -> Result<u64> {
        let universe = self.query.segment().row_count();
        let mut probes = 0u64;
        let mut current: Option<DocId> = None;
        for candidate in candidates {
            if candidate >= universe {
                break;
            }
            self.cancel.check()?;
            if let Some(doc) = current {
                if doc > candidate {
                    continue;
                }
                if doc == candidate {
                    out.insert(candidate);
                    continue;
                }
            }
            probes += 1;
            let doc = it.advance(candidate)?;
            if doc == NO_MORE_DOCS {
                break;
            }
            verify_data!(doc, doc < universe);
            current = Some(doc);
            if doc == candidate {
                out.insert(candidate);
            }
        }
        Ok(probes)
    }
}
