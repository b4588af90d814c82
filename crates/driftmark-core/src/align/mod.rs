//! Drift correction: offset tables, their application, and the seam to the
//! external alignment engine.

mod apply;
mod table;

pub use apply::apply_alignment;
pub use table::{
    read_alignment_file, read_alignment_table, write_alignment_file, write_alignment_table,
    AlignmentMeta, AlignmentRecord, AlignmentTable,
};

use crate::error::{OutOfRangeWarning, PipelineError};
use crate::normalize::{normalize_stack, NormalizeConfig};
use crate::stack::{GrayStack, RawStack};

/// The external feature-matching engine. This crate never implements the
/// matching itself; it consumes the per-plane offsets an engine computes.
pub trait AlignmentEngine {
    /// Compute one offset record per plane of `target`. When `reference` is
    /// given its first plane is the alignment reference; otherwise the
    /// engine picks its own reference within `target`.
    fn compute_alignments(
        &self,
        target: &GrayStack,
        reference: Option<&GrayStack>,
    ) -> Result<Vec<AlignmentRecord>, PipelineError>;
}

/// Everything pipeline A produces in memory, ready for serialization.
#[derive(Debug)]
pub struct AlignmentOutcome {
    pub records: Vec<AlignmentRecord>,
    /// The normalized target stack with offsets applied.
    pub corrected: GrayStack,
    pub warnings: Vec<OutOfRangeWarning>,
}

/// Run the in-memory half of the drift-correction pipeline: normalize the
/// target (and the reference against its own range), invoke the engine, and
/// apply the resulting offsets.
pub fn run_alignment(
    engine: &dyn AlignmentEngine,
    target: &RawStack,
    reference: Option<&RawStack>,
    config: &NormalizeConfig,
) -> Result<AlignmentOutcome, PipelineError> {
    let normalized = normalize_stack(target, config);
    let reference = reference.map(|stack| normalize_stack(stack, config));

    let records = engine.compute_alignments(&normalized, reference.as_ref())?;
    let (corrected, warnings) = apply_alignment(&normalized, &records);

    Ok(AlignmentOutcome {
        records,
        corrected,
        warnings,
    })
}
