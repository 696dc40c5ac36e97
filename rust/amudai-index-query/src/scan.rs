//! Evaluation of one predicate across many segments.
//!
//! Every segment gets its own query tree, compiled against that segment's
//! shared posting source, and its own result bitmap. Segments are processed in
//! parallel on the rayon pool; within a segment evaluation stays sequential.

use std::sync::Arc;

use amudai_common::Result;
use rayon::prelude::*;
use roaring::RoaringBitmap;

use crate::{
    cancellation::CancellationToken,
    compiler::QueryCompiler,
    evaluator::{Outcome, QueryEvaluator},
    options::QueryOptions,
    posting::SegmentContext,
    predicate::{FieldResolver, Predicate},
};

/// The result of scanning one segment.
#[derive(Debug)]
pub struct SegmentScanResult {
    /// Name of the scanned segment.
    pub segment: Arc<str>,
    /// Matching rows. Empty unless `outcome` is `Ok(Outcome::Completed(_))`.
    pub matches: RoaringBitmap,
    /// Compile or evaluation outcome for this segment.
    pub outcome: Result<Outcome>,
}

impl SegmentScanResult {
    pub fn is_completed(&self) -> bool {
        self.outcome.as_ref().is_ok_and(Outcome::is_completed)
    }
}

/// Compiles and evaluates `predicate` against every segment in parallel.
///
/// Results are returned in the order of `segments`. A failure in one segment
/// does not affect the others. Cancelling `cancel` stops all in-flight segment
/// scans at their next cooperative point; segments not yet started report
/// `Outcome::Cancelled` without compiling.
pub fn scan_segments(
    segments: &[SegmentContext],
    predicate: &Predicate,
    resolver: &dyn FieldResolver,
    options: &QueryOptions,
    cancel: &CancellationToken,
) -> Vec<SegmentScanResult> {
    segments
        .par_iter()
        .map(|segment| {
            log::trace!("scanning segment {}", segment.name());
            let mut matches = RoaringBitmap::new();
            let outcome = scan_segment(segment, predicate, resolver, options, cancel, &mut matches);
            log::trace!(
                "segment {} done: {} rows",
                segment.name(),
                matches.len()
            );
            SegmentScanResult {
                segment: Arc::from(segment.name()),
                matches,
                outcome,
            }
        })
        .collect()
}

fn scan_segment(
    segment: &SegmentContext,
    predicate: &Predicate,
    resolver: &dyn FieldResolver,
    options: &QueryOptions,
    cancel: &CancellationToken,
    matches: &mut RoaringBitmap,
) -> Result<Outcome> {
    if cancel.is_cancelled() {
        return Ok(Outcome::Cancelled);
    }
    let query = QueryCompiler::new(segment.clone(), resolver)
        .with_options(options.clone())
        .compile(predicate)?;
    QueryEvaluator::new(&query)
        .with_options(options.clone())
        .with_cancellation(cancel.clone())
        .execute(matches, None)
}
