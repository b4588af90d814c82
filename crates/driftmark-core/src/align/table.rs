//! Alignment table IO: a `#`-prefixed provenance header followed by a
//! tab-separated table with mandatory `plane`/`x`/`y` columns.
//!
//! Engine-specific columns beyond the mandatory three are carried through
//! opaquely as ordered name/value pairs; the writer emits whatever columns
//! the caller supplies rather than a fixed schema.

use std::fs;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

const TOOL_NAME: &str = "driftmark";
const TOOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// One per-plane displacement row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentRecord {
    /// 0-based plane index. Kept signed so an out-of-range value coming
    /// from a table is a skippable condition, not a parse failure.
    pub plane: i64,
    pub x: f64,
    pub y: f64,
    /// Passthrough columns in file order, verbatim.
    pub extra: Vec<(String, String)>,
}

impl AlignmentRecord {
    pub fn new(plane: i64, x: f64, y: f64) -> Self {
        Self {
            plane,
            x,
            y,
            extra: Vec::new(),
        }
    }
}

/// Provenance written into the table header.
#[derive(Debug, Clone)]
pub struct AlignmentMeta {
    /// Source stack identity (first input file).
    pub source: String,
    /// Reference image identity, if one was supplied.
    pub reference: Option<String>,
}

/// A parsed alignment file: the raw provenance lines plus the records.
#[derive(Debug, Clone)]
pub struct AlignmentTable {
    /// Header comment lines, `#` prefix included, in file order.
    pub comments: Vec<String>,
    pub records: Vec<AlignmentRecord>,
}

/// Serialize `records` as an alignment file into `out`.
///
/// The passthrough column names are taken from the first record; every
/// record is expected to carry the same extra columns in the same order.
pub fn write_alignment_table<W: Write>(
    mut out: W,
    meta: &AlignmentMeta,
    records: &[AlignmentRecord],
) -> Result<(), PipelineError> {
    writeln!(out, "# alignment table generated by {TOOL_NAME} {TOOL_VERSION}")?;
    writeln!(out, "# source: {}", meta.source)?;
    writeln!(
        out,
        "# reference: {}",
        meta.reference.as_deref().unwrap_or("none")
    )?;
    writeln!(
        out,
        "# created: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    )?;

    let mut table = csv::WriterBuilder::new().delimiter(b'\t').from_writer(out);

    let mut header = vec!["plane".to_string(), "x".to_string(), "y".to_string()];
    if let Some(first) = records.first() {
        header.extend(first.extra.iter().map(|(name, _)| name.clone()));
    }
    table.write_record(&header).map_err(csv_io)?;

    for record in records {
        debug_assert_eq!(record.extra.len() + 3, header.len());
        let mut row = vec![
            record.plane.to_string(),
            record.x.to_string(),
            record.y.to_string(),
        ];
        row.extend(record.extra.iter().map(|(_, value)| value.clone()));
        table.write_record(&row).map_err(csv_io)?;
    }

    table.flush()?;
    Ok(())
}

/// Write an alignment file, removing the destination on failure so no
/// partially written table is left behind.
pub fn write_alignment_file(
    path: &Path,
    meta: &AlignmentMeta,
    records: &[AlignmentRecord],
) -> Result<(), PipelineError> {
    let mut buf = Vec::new();
    write_alignment_table(&mut buf, meta, records)?;
    fs::write(path, buf).map_err(|e| {
        let _ = fs::remove_file(path);
        PipelineError::Io(e)
    })
}

/// Parse an alignment file.
///
/// Comment lines are collected verbatim; the first non-comment row is the
/// column header and must contain `plane`, `x` and `y`. Body rows must be
/// in strictly ascending plane order.
pub fn read_alignment_table(input: &str) -> Result<AlignmentTable, PipelineError> {
    let comments = input
        .lines()
        .filter(|line| line.starts_with('#'))
        .map(str::to_string)
        .collect();

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .comment(Some(b'#'))
        .from_reader(input.as_bytes());

    let header = reader
        .headers()
        .map_err(|e| PipelineError::Parse(format!("alignment table header: {e}")))?
        .clone();

    let plane_col = require_column(&header, "plane")?;
    let x_col = require_column(&header, "x")?;
    let y_col = require_column(&header, "y")?;
    let extra_cols: Vec<(usize, String)> = header
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != plane_col && *i != x_col && *i != y_col)
        .map(|(i, name)| (i, name.to_string()))
        .collect();

    let mut records: Vec<AlignmentRecord> = Vec::new();
    for (row_idx, row) in reader.records().enumerate() {
        let row = row.map_err(|e| PipelineError::Parse(format!("alignment row {row_idx}: {e}")))?;

        let plane: i64 = parse_field(&row, plane_col, row_idx, "plane")?;
        let x: f64 = parse_field(&row, x_col, row_idx, "x")?;
        let y: f64 = parse_field(&row, y_col, row_idx, "y")?;

        if let Some(prev) = records.last() {
            if plane <= prev.plane {
                return Err(PipelineError::Parse(format!(
                    "alignment row {row_idx}: plane {plane} after plane {} (indices must be \
                     unique and ascending)",
                    prev.plane
                )));
            }
        }

        let extra = extra_cols
            .iter()
            .map(|(i, name)| (name.clone(), row.get(*i).unwrap_or_default().to_string()))
            .collect();

        records.push(AlignmentRecord { plane, x, y, extra });
    }

    Ok(AlignmentTable { comments, records })
}

/// Read and parse an alignment file from disk.
pub fn read_alignment_file(path: &Path) -> Result<AlignmentTable, PipelineError> {
    let text = fs::read_to_string(path)?;
    read_alignment_table(&text)
}

fn require_column(header: &csv::StringRecord, name: &str) -> Result<usize, PipelineError> {
    header.iter().position(|col| col == name).ok_or_else(|| {
        PipelineError::Parse(format!("alignment table is missing required column '{name}'"))
    })
}

fn parse_field<T: std::str::FromStr>(
    row: &csv::StringRecord,
    col: usize,
    row_idx: usize,
    name: &str,
) -> Result<T, PipelineError> {
    let raw = row.get(col).unwrap_or_default();
    raw.parse().map_err(|_| {
        PipelineError::Parse(format!("alignment row {row_idx}: invalid {name} '{raw}'"))
    })
}

fn csv_io(e: csv::Error) -> PipelineError {
    PipelineError::Io(std::io::Error::other(e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> AlignmentMeta {
        AlignmentMeta {
            source: "stack.tif".to_string(),
            reference: None,
        }
    }

    #[test]
    fn write_then_read_round_trips_records() {
        let records = vec![
            AlignmentRecord {
                plane: 0,
                x: 0.0,
                y: 0.0,
                extra: vec![("matches".into(), "120".into())],
            },
            AlignmentRecord {
                plane: 1,
                x: 5.25,
                y: -3.5,
                extra: vec![("matches".into(), "98".into())],
            },
        ];

        let mut buf = Vec::new();
        write_alignment_table(&mut buf, &meta(), &records).expect("write");
        let text = String::from_utf8(buf).expect("utf8");
        let table = read_alignment_table(&text).expect("read");

        assert_eq!(table.records, records);
    }

    #[test]
    fn header_carries_provenance() {
        let meta = AlignmentMeta {
            source: "cell3.tif".to_string(),
            reference: Some("ref.tif".to_string()),
        };
        let mut buf = Vec::new();
        write_alignment_table(&mut buf, &meta, &[AlignmentRecord::new(0, 1.0, 2.0)])
            .expect("write");
        let text = String::from_utf8(buf).expect("utf8");

        assert!(text.starts_with("# alignment table generated by driftmark"));
        assert!(text.contains("# source: cell3.tif"));
        assert!(text.contains("# reference: ref.tif"));
        assert!(text.contains("# created: "));
        assert!(text.contains("plane\tx\ty\n"));
    }

    #[test]
    fn reference_defaults_to_none_in_header() {
        let mut buf = Vec::new();
        write_alignment_table(&mut buf, &meta(), &[AlignmentRecord::new(0, 0.0, 0.0)])
            .expect("write");
        assert!(String::from_utf8(buf).expect("utf8").contains("# reference: none"));
    }

    #[test]
    fn read_skips_comment_preamble_and_keeps_it() {
        let text = "# made by some engine\n# source: a.tif\nplane\tx\ty\n0\t1.5\t-2\n";
        let table = read_alignment_table(text).expect("read");
        assert_eq!(table.comments.len(), 2);
        assert_eq!(table.records, vec![AlignmentRecord::new(0, 1.5, -2.0)]);
    }

    #[test]
    fn read_requires_plane_column() {
        let err = read_alignment_table("frame\tx\ty\n0\t1\t2\n").expect_err("no plane column");
        assert!(err.to_string().contains("'plane'"));
    }

    #[test]
    fn read_rejects_non_integer_plane() {
        let err = read_alignment_table("plane\tx\ty\n1.5\t0\t0\n").expect_err("bad plane");
        assert!(err.to_string().contains("invalid plane '1.5'"));
    }

    #[test]
    fn read_rejects_non_numeric_offset() {
        let err = read_alignment_table("plane\tx\ty\n0\tnan?\t0\n").expect_err("bad x");
        assert!(err.to_string().contains("invalid x"));
    }

    #[test]
    fn read_rejects_duplicate_or_descending_planes() {
        let err = read_alignment_table("plane\tx\ty\n0\t0\t0\n0\t1\t1\n").expect_err("dup");
        assert!(err.to_string().contains("ascending"));

        let err = read_alignment_table("plane\tx\ty\n3\t0\t0\n1\t1\t1\n").expect_err("descending");
        assert!(err.to_string().contains("ascending"));
    }

    #[test]
    fn passthrough_columns_survive_in_order() {
        let text = "plane\tscore\tx\ty\tnote\n0\t0.9\t1\t2\tok\n";
        let table = read_alignment_table(text).expect("read");
        assert_eq!(
            table.records[0].extra,
            vec![
                ("score".to_string(), "0.9".to_string()),
                ("note".to_string(), "ok".to_string())
            ]
        );

        let mut buf = Vec::new();
        write_alignment_table(&mut buf, &meta(), &table.records).expect("write");
        let rewritten = String::from_utf8(buf).expect("utf8");
        assert!(rewritten.contains("plane\tx\ty\tscore\tnote\n"));
        assert!(rewritten.contains("0\t1\t2\t0.9\tok\n"));
    }
}
