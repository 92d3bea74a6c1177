//! Scope scanner for legacy VTK ASCII polydata written by OpenFOAM
//!
//! Only the pieces a streamline export carries are recognized: the
//! `DATASET POLYDATA` scope, its `POINTS` array, the `LINES` connectivity and
//! the `U` vector field. Everything else is skipped.

use std::io::BufRead;
use std::path::Path;

use bstr::ByteSlice;
use tracing::debug;

use crate::error::{FoamError, Result};
use crate::input::{read_all_lines, read_file_lines};
use crate::tokenize::{self, gather_tokens, parse_index, split_tokens, Token};

const DATASET_MARKER: &str = "DATASET POLYDATA";
const ASCII_MARKER: &str = "ASCII";

/// A headered array of 3-wide rows
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PointDataset {
    pub rows: Vec<[f64; 3]>,
    /// Row count from the header (`POINTS 104 float` gives 104)
    pub declared_count: usize,
    /// `declared_count * 3`, saturating
    pub expanded_count: usize,
}

impl PointDataset {
    pub fn new(declared_count: usize, rows: Vec<[f64; 3]>) -> Self {
        Self {
            rows,
            declared_count,
            expanded_count: declared_count.saturating_mul(3),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// True when fewer rows were recovered than the header declared
    pub fn is_truncated(&self) -> bool {
        self.rows.len() < self.declared_count
    }
}

/// One polyline from the `LINES` section
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LineCell {
    pub indices: Vec<u32>,
}

/// Everything recovered from one timestep's track file
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FoamVtkSnapshot {
    pub points: PointDataset,
    pub magnitude: PointDataset,
    pub line_topology: Vec<LineCell>,
    /// Number of row groups consumed; a progress diagnostic only
    pub depth: usize,
}

/// Outer scanner state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scope {
    NotInDataset,
    InDataset,
}

/// The sub-dataset currently being read inside `DATASET POLYDATA`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DatasetKind {
    None,
    Points { declared: usize },
    VelocityField { declared: usize },
    Lines { cells: usize, size: usize },
}

impl DatasetKind {
    /// Recognize a sub-dataset header line.
    ///
    /// Malformed headers are not an error; the line is treated as noise.
    pub fn from_header(line: &[u8]) -> Result<DatasetKind> {
        let tokens: Vec<&[u8]> = split_tokens(line).collect();
        let count = |i: usize| {
            tokens
                .get(i)
                .and_then(|t| t.to_str().ok())
                .and_then(|t| t.parse::<usize>().ok())
        };

        let kind = match tokens.first().copied() {
            Some(b"POINTS") if tokens.len() >= 3 => match count(1) {
                Some(declared) => DatasetKind::Points { declared },
                None => DatasetKind::None,
            },
            Some(b"U") if tokens.len() >= 4 => match (count(1), count(2)) {
                (Some(3), Some(declared)) => DatasetKind::VelocityField { declared },
                (Some(dim), Some(_)) => {
                    return Err(FoamError::UnsupportedFormat(format!(
                        "U field has {} components, expected 3",
                        dim
                    )));
                }
                _ => DatasetKind::None,
            },
            Some(b"LINES") if tokens.len() >= 3 => match (count(1), count(2)) {
                (Some(cells), Some(size)) => DatasetKind::Lines { cells, size },
                _ => DatasetKind::None,
            },
            _ => DatasetKind::None,
        };

        Ok(kind)
    }
}

/// Parse state for exactly one file; build one per file and drop it after `scan`
pub struct ScanSession {
    lines: Vec<Vec<u8>>,
    scope: Scope,
    kind: DatasetKind,
    snapshot: FoamVtkSnapshot,
}

impl ScanSession {
    pub fn from_lines(lines: Vec<Vec<u8>>) -> Self {
        Self {
            lines,
            scope: Scope::NotInDataset,
            kind: DatasetKind::None,
            snapshot: FoamVtkSnapshot::default(),
        }
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        Ok(Self::from_lines(read_all_lines(reader)?))
    }

    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::from_lines(read_file_lines(path)?))
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Run the scanner to completion and hand off the snapshot
    pub fn scan(mut self) -> Result<FoamVtkSnapshot> {
        let mut i = self.enter_dataset()?;

        while i < self.lines.len() {
            match self.kind {
                DatasetKind::None => {
                    self.kind = DatasetKind::from_header(&self.lines[i])?;
                    if self.kind != DatasetKind::None {
                        debug!(line = i + 1, kind = ?self.kind, "entering sub-dataset");
                    }
                    i += 1;
                }
                DatasetKind::Points { declared } => {
                    let extracted = tokenize::extract_rows::<3>(&self.lines, i, declared)?;
                    i += extracted.lines_consumed;
                    self.snapshot.points = PointDataset::new(declared, extracted.rows);
                    self.snapshot.depth += 1;
                    self.kind = DatasetKind::None;
                }
                DatasetKind::Lines { cells, size } => {
                    let (tokens, consumed) = gather_tokens(&self.lines, i, size);
                    i += consumed;
                    self.snapshot.line_topology = parse_line_cells(&tokens, cells)?;
                    self.snapshot.depth += 1;
                    self.kind = DatasetKind::None;
                }
                DatasetKind::VelocityField { declared } => {
                    let extracted = tokenize::extract_rows::<3>(&self.lines, i, declared)?;
                    self.snapshot.magnitude = PointDataset::new(declared, extracted.rows);
                    self.snapshot.depth += 1;
                    self.kind = DatasetKind::None;
                    // Only one vector field is supported
                    break;
                }
            }
        }

        Ok(self.snapshot)
    }

    /// Scan the preamble and return the index of the first line inside the dataset
    fn enter_dataset(&mut self) -> Result<usize> {
        let mut is_ascii = false;
        let mut dataset_line = None;

        for (i, line) in self.lines.iter().enumerate() {
            if line.contains_str(ASCII_MARKER) {
                is_ascii = true;
            }
            if line.contains_str(DATASET_MARKER) {
                dataset_line = Some(i);
                break;
            }
        }

        if !is_ascii {
            return Err(FoamError::UnsupportedFormat(
                ".vtk file is not ASCII readable".to_string(),
            ));
        }
        let start = dataset_line.ok_or_else(|| {
            FoamError::UnsupportedFormat(format!("missing {} marker", DATASET_MARKER))
        })?;

        self.scope = Scope::InDataset;
        Ok(start + 1)
    }
}

/// Split `k i0 .. ik-1` records; a record cut short at the tail is dropped
fn parse_line_cells(tokens: &[Token<'_>], cells: usize) -> Result<Vec<LineCell>> {
    // a record takes at least one token
    let mut out = Vec::with_capacity(cells.min(tokens.len()));
    let mut pos = 0;

    while out.len() < cells && pos < tokens.len() {
        let count = parse_index(&tokens[pos])? as usize;
        let body = match tokens.get(pos + 1..pos + 1 + count) {
            Some(body) => body,
            None => break,
        };
        let indices = body.iter().map(parse_index).collect::<Result<Vec<u32>>>()?;
        out.push(LineCell { indices });
        pos += 1 + count;
    }

    Ok(out)
}

/// Scan one track file
pub fn scan_file(path: &Path) -> Result<FoamVtkSnapshot> {
    ScanSession::open(path)?.scan()
}

/// Scan VTK text from any buffered reader
pub fn scan_reader<R: BufRead>(reader: R) -> Result<FoamVtkSnapshot> {
    ScanSession::from_reader(reader)?.scan()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const TRACK: &str = "\
# vtk DataFile Version 2.0
track0
ASCII
DATASET POLYDATA
POINTS 4 float
0 0 0 1 0 0
2 0 0
3 0.5 -1e-3
LINES 1 5
4 0 1 2 3
POINT_DATA 4
FIELD attributes 1
U 3 4 float
1 0 0 2 0 0 3 0 0
4 0 0
";

    fn scan(text: &str) -> Result<FoamVtkSnapshot> {
        scan_reader(Cursor::new(text.as_bytes()))
    }

    #[test]
    fn test_full_track() {
        let snap = scan(TRACK).unwrap();
        assert_eq!(snap.points.declared_count, 4);
        assert_eq!(snap.points.expanded_count, 12);
        assert_eq!(snap.points.rows[3], [3.0, 0.5, -1e-3]);
        assert_eq!(snap.line_topology, vec![LineCell { indices: vec![0, 1, 2, 3] }]);
        assert_eq!(snap.magnitude.len(), 4);
        assert_eq!(snap.magnitude.rows[1], [2.0, 0.0, 0.0]);
        assert_eq!(snap.depth, 3);
    }

    #[test]
    fn test_truncated_points_are_silent() {
        let text = "ASCII\nDATASET POLYDATA\nPOINTS 5 float\n0 0 0\n1 1 1\n2 2\nPOINT_DATA 5\n";
        let snap = scan(text).unwrap();
        assert_eq!(snap.points.len(), 2);
        assert!(snap.points.is_truncated());
    }

    #[test]
    fn test_huge_declared_counts_truncate() {
        let text = "ASCII\nDATASET POLYDATA\nPOINTS 100000000000000 float\n0 0 0\n1 1 1\n\
                    LINES 100000000000000 100000000000000\n2 0 1\n\
                    POINT_DATA 2\nU 3 18446744073709551615 float\n5 0 0\n";
        let snap = scan(text).unwrap();
        assert_eq!(snap.points.rows, vec![[0.0; 3], [1.0; 3]]);
        assert!(snap.points.is_truncated());
        assert_eq!(snap.line_topology, vec![LineCell { indices: vec![0, 1] }]);
        assert_eq!(snap.magnitude.rows, vec![[5.0, 0.0, 0.0]]);
        assert_eq!(snap.magnitude.expanded_count, usize::MAX);
    }

    #[test]
    fn test_not_ascii() {
        let text = "# vtk DataFile Version 2.0\nBINARY\nDATASET POLYDATA\n";
        assert!(matches!(scan(text), Err(FoamError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_missing_dataset() {
        let text = "ASCII\nDATASET STRUCTURED_GRID\nPOINTS 1 float\n0 0 0\n";
        assert!(matches!(scan(text), Err(FoamError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_bad_numeric_token() {
        let text = "ASCII\nDATASET POLYDATA\nPOINTS 2 float\n0 0 0\n1 nan? 1\n";
        assert!(matches!(scan(text), Err(FoamError::NumericParse { line: 5, .. })));
    }

    #[test]
    fn test_scalar_u_rejected() {
        let text = "ASCII\nDATASET POLYDATA\nPOINTS 1 float\n0 0 0\nU 1 1 float\n0\n";
        assert!(matches!(scan(text), Err(FoamError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_empty_points_section_keeps_scanning() {
        let text = "ASCII\nDATASET POLYDATA\nPOINTS 3 float\nLINES 1 2\n1 0\n";
        let snap = scan(text).unwrap();
        assert!(snap.points.is_empty());
        assert_eq!(snap.line_topology.len(), 1);
    }

    #[test]
    fn test_malformed_header_is_skipped() {
        assert_eq!(DatasetKind::from_header(b"POINTS many float").unwrap(), DatasetKind::None);
        assert_eq!(
            DatasetKind::from_header(b"POINTS 7 double").unwrap(),
            DatasetKind::Points { declared: 7 }
        );
    }

    #[test]
    fn test_session_scope() {
        let session = ScanSession::from_lines(vec![b"ASCII".to_vec()]);
        assert_eq!(session.scope(), Scope::NotInDataset);
    }
}
