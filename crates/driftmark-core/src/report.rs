//! Machine-readable summary of one pipeline run.

use serde::{Deserialize, Serialize};

use crate::error::OutOfRangeWarning;

pub const REPORT_SCHEMA: &str = "driftmark.report.v1";

/// Versioned run summary: what was processed and what was skipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub schema: String,
    /// The pipeline that ran (`apply` or `mark`).
    pub pipeline: String,
    /// Primary input identity.
    pub input: String,
    /// Number of planes in the processed stack.
    pub planes: usize,
    /// Per-item diagnostics for skipped records.
    pub skipped: Vec<OutOfRangeWarning>,
}

impl RunReport {
    pub fn new(pipeline: &str, input: String, planes: usize) -> Self {
        Self {
            schema: REPORT_SCHEMA.to_string(),
            pipeline: pipeline.to_string(),
            input,
            planes,
            skipped: Vec::new(),
        }
    }

    pub fn record_warnings(&mut self, warnings: Vec<OutOfRangeWarning>) {
        self.skipped.extend(warnings);
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }
}
