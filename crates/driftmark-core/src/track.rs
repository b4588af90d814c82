//! Track table parsing and plane-grouped access to spot records.
//!
//! The table comes from an external detection/tracking run: one row per
//! (frame, spot) observation, tab-separated, with an optional `#` preamble.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Lifecycle status of a tracked spot at one frame. Closed set; the parser
/// rejects anything else rather than defaulting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SpotStatus {
    /// The track begins at this frame.
    New,
    /// The track persists from a prior frame.
    Continued,
    /// The track terminates at this frame.
    End,
    /// Interpolated by regression rather than directly observed.
    Regressed,
}

impl FromStr for SpotStatus {
    type Err = PipelineError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag {
            "NEW" => Ok(Self::New),
            "CONTINUED" => Ok(Self::Continued),
            "END" => Ok(Self::End),
            "REGRESSED" => Ok(Self::Regressed),
            other => Err(PipelineError::Parse(format!(
                "unrecognized spot status '{other}'"
            ))),
        }
    }
}

/// One (frame, spot) observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackRecord {
    /// 0-based frame index, signed so out-of-range values are skippable.
    pub plane: i64,
    /// Track identity, stable across the track's lifetime.
    pub index: u64,
    pub x: f64,
    pub y: f64,
    pub status: SpotStatus,
}

/// Parsed track records plus grouped access by plane and by track.
#[derive(Debug, Clone, Default)]
pub struct TrackTable {
    records: Vec<TrackRecord>,
    by_plane: HashMap<i64, Vec<usize>>,
    first_by_track: HashMap<u64, usize>,
}

impl TrackTable {
    pub fn from_records(records: Vec<TrackRecord>) -> Self {
        let mut by_plane: HashMap<i64, Vec<usize>> = HashMap::new();
        let mut first_by_track: HashMap<u64, usize> = HashMap::new();

        for (row, record) in records.iter().enumerate() {
            by_plane.entry(record.plane).or_default().push(row);
            first_by_track
                .entry(record.index)
                .and_modify(|best| {
                    if record.plane < records[*best].plane {
                        *best = row;
                    }
                })
                .or_insert(row);
        }

        Self {
            records,
            by_plane,
            first_by_track,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records in file order, with their row numbers.
    pub fn records(&self) -> impl Iterator<Item = (usize, &TrackRecord)> {
        self.records.iter().enumerate()
    }

    /// Records of one plane, preserving file row order.
    pub fn records_for_plane(&self, plane: i64) -> impl Iterator<Item = (usize, &TrackRecord)> {
        self.by_plane
            .get(&plane)
            .map(|rows| rows.as_slice())
            .unwrap_or_default()
            .iter()
            .map(move |&row| (row, &self.records[row]))
    }

    /// Whether `row` is the earliest record of its track (lowest plane,
    /// file order breaking ties).
    pub fn is_first_appearance(&self, row: usize) -> bool {
        self.first_by_track.get(&self.records[row].index) == Some(&row)
    }
}

/// Parse a track table, tolerating a `#`-prefixed preamble of any length.
///
/// The header row must include `plane`, `index`, `x`, `y` and `status`.
pub fn read_track_table(input: &str) -> Result<TrackTable, PipelineError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .comment(Some(b'#'))
        .from_reader(input.as_bytes());

    let header = reader
        .headers()
        .map_err(|e| PipelineError::Parse(format!("track table header: {e}")))?
        .clone();

    let plane_col = require_column(&header, "plane")?;
    let index_col = require_column(&header, "index")?;
    let x_col = require_column(&header, "x")?;
    let y_col = require_column(&header, "y")?;
    let status_col = require_column(&header, "status")?;

    let mut records = Vec::new();
    for (row_idx, row) in reader.records().enumerate() {
        let row = row.map_err(|e| PipelineError::Parse(format!("track row {row_idx}: {e}")))?;

        records.push(TrackRecord {
            plane: parse_field(&row, plane_col, row_idx, "plane")?,
            index: parse_field(&row, index_col, row_idx, "index")?,
            x: parse_field(&row, x_col, row_idx, "x")?,
            y: parse_field(&row, y_col, row_idx, "y")?,
            status: parse_field(&row, status_col, row_idx, "status")?,
        });
    }

    Ok(TrackTable::from_records(records))
}

/// Read and parse a track file from disk.
pub fn read_track_file(path: &Path) -> Result<TrackTable, PipelineError> {
    let text = fs::read_to_string(path)?;
    read_track_table(&text)
}

fn require_column(header: &csv::StringRecord, name: &str) -> Result<usize, PipelineError> {
    header.iter().position(|col| col == name).ok_or_else(|| {
        PipelineError::Parse(format!("track table is missing required column '{name}'"))
    })
}

fn parse_field<T>(
    row: &csv::StringRecord,
    col: usize,
    row_idx: usize,
    name: &str,
) -> Result<T, PipelineError>
where
    T: FromStr,
{
    let raw = row.get(col).unwrap_or_default();
    raw.parse()
        .map_err(|_| PipelineError::Parse(format!("track row {row_idx}: invalid {name} '{raw}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "\
# spots detected by some tracker
# fitted with 2D gaussian
plane\tindex\tx\ty\tstatus
0\t1\t10\t10\tNEW
0\t2\t50\t50\tEND
1\t1\t11.5\t9.25\tCONTINUED
1\t3\t30\t30\tREGRESSED
2\t3\t31\t31\tREGRESSED
";

    #[test]
    fn reads_one_record_per_data_row() {
        let table = read_track_table(TABLE).expect("read");
        assert_eq!(table.len(), 5);

        let (_, first) = table.records().next().expect("row 0");
        assert_eq!(
            first,
            &TrackRecord {
                plane: 0,
                index: 1,
                x: 10.0,
                y: 10.0,
                status: SpotStatus::New,
            }
        );
    }

    #[test]
    fn groups_by_plane_preserving_row_order() {
        let table = read_track_table(TABLE).expect("read");
        let rows: Vec<usize> = table.records_for_plane(0).map(|(row, _)| row).collect();
        assert_eq!(rows, vec![0, 1]);

        let indices: Vec<u64> = table
            .records_for_plane(1)
            .map(|(_, r)| r.index)
            .collect();
        assert_eq!(indices, vec![1, 3]);

        assert_eq!(table.records_for_plane(7).count(), 0);
    }

    #[test]
    fn first_appearance_is_lowest_plane_earliest_row() {
        let table = read_track_table(TABLE).expect("read");
        // Track 3 first appears at row 3 (plane 1), not row 4 (plane 2).
        assert!(table.is_first_appearance(3));
        assert!(!table.is_first_appearance(4));
        // Track 1 first appears at row 0.
        assert!(table.is_first_appearance(0));
        assert!(!table.is_first_appearance(2));
    }

    #[test]
    fn missing_status_column_is_a_parse_error() {
        let err = read_track_table("plane\tindex\tx\ty\n0\t1\t2\t3\n").expect_err("no status");
        assert!(err.to_string().contains("'status'"));
    }

    #[test]
    fn unknown_status_tag_is_a_parse_error() {
        let text = "plane\tindex\tx\ty\tstatus\n0\t1\t2\t3\tLOST\n";
        let err = read_track_table(text).expect_err("bad status");
        assert!(err.to_string().contains("invalid status 'LOST'"));
    }

    #[test]
    fn malformed_coordinate_is_a_parse_error() {
        let text = "plane\tindex\tx\ty\tstatus\n0\t1\ttwo\t3\tNEW\n";
        let err = read_track_table(text).expect_err("bad x");
        assert!(err.to_string().contains("invalid x 'two'"));
    }
}
