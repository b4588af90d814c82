//! Error taxonomy shared by both pipelines.
//!
//! Fatal conditions ([`PipelineError`]) abort a run; per-item out-of-range
//! conditions ([`OutOfRangeWarning`]) are logged, accumulated and skipped so
//! that one bad record never takes down a whole stack.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fatal pipeline errors. Any of these aborts the run with no usable
/// partial output left behind.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A source image could not be decoded, or sources disagree on shape.
    #[error("input error: {0}")]
    Input(String),

    /// A malformed alignment or track table.
    #[error("parse error: {0}")]
    Parse(String),

    /// An invalid configuration value.
    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A non-fatal per-item diagnostic: the offending record was skipped and
/// processing continued for everything else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutOfRangeWarning {
    /// An alignment record names a plane outside the stack.
    AlignmentPlane { plane: i64, stack_len: usize },

    /// A track record names a plane outside the stack.
    SpotPlane { row: usize, plane: i64, stack_len: usize },

    /// A track record's marker center falls outside its plane.
    SpotCenter { row: usize, plane: i64, x: f64, y: f64 },
}

impl fmt::Display for OutOfRangeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlignmentPlane { plane, stack_len } => write!(
                f,
                "skip plane {plane}: outside stack of {stack_len} plane(s)"
            ),
            Self::SpotPlane {
                row,
                plane,
                stack_len,
            } => write!(
                f,
                "skip spot row {row}: plane {plane} outside stack of {stack_len} plane(s)"
            ),
            Self::SpotCenter { row, plane, x, y } => write!(
                f,
                "skip spot row {row}: center ({x:.1}, {y:.1}) outside plane {plane}"
            ),
        }
    }
}
