//! Numeric extraction from loosely delimited ASCII text
//!
//! A section is a declared row count followed by whitespace separated values
//! that may wrap across physical lines. Reading stops at the declared amount
//! or at the next section marker, whichever comes first.

use bstr::ByteSlice;

use crate::error::{FoamError, Result};

/// Markers that close a numeric section in a VTK file
pub const TERMINATORS: [&str; 4] = ["DATASET", "POINT_DATA", "CELL_DATA", "LINES"];

/// One whitespace separated token and the 1-based line it came from
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Token<'a> {
    pub text: &'a [u8],
    pub line: usize,
}

/// Rows recovered from a section and how many source lines were read
#[derive(Clone, Debug, PartialEq)]
pub struct Extracted<R> {
    pub rows: Vec<R>,
    pub lines_consumed: usize,
}

/// Whether a line opens a new scope
pub fn is_terminator(line: &[u8]) -> bool {
    TERMINATORS.iter().any(|marker| line.contains_str(marker))
}

/// Split a line on ASCII whitespace
pub fn split_tokens(line: &[u8]) -> impl Iterator<Item = &[u8]> {
    line.split(|b| b.is_ascii_whitespace())
        .filter(|field| !field.is_empty())
}

/// Collect tokens from `lines[start..]` until `wanted` tokens are seen or a
/// terminator line is reached.
///
/// Tokens carry their line so errors can point at the source. Tokenizing each
/// line separately gives the same sequence as joining the lines with a single
/// space first, so values wrapped across lines are recovered. `wanted` comes
/// from a file header, so storage grows with the tokens actually found.
pub fn gather_tokens(lines: &[Vec<u8>], start: usize, wanted: usize) -> (Vec<Token<'_>>, usize) {
    let mut tokens = Vec::new();
    let mut consumed = 0;

    for (offset, line) in lines.iter().enumerate().skip(start) {
        if tokens.len() >= wanted || is_terminator(line) {
            break;
        }
        tokens.extend(split_tokens(line).map(|text| Token {
            text,
            line: offset + 1,
        }));
        consumed += 1;
    }

    (tokens, consumed)
}

/// Parse a token as a float
pub fn parse_f64(token: &Token<'_>) -> Result<f64> {
    token
        .text
        .to_str()
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or_else(|| numeric_error(token))
}

/// Parse a token as an unsigned index
pub fn parse_index(token: &Token<'_>) -> Result<u32> {
    token
        .text
        .to_str()
        .ok()
        .and_then(|s| s.parse::<u32>().ok())
        .ok_or_else(|| numeric_error(token))
}

pub fn numeric_error(token: &Token<'_>) -> FoamError {
    FoamError::NumericParse {
        token: token.text.to_str_lossy().into_owned(),
        line: token.line,
    }
}

/// Partition a flat token list into `W`-wide rows, at most `max_rows` of them.
///
/// A trailing partial row is dropped rather than reported.
pub fn partition_rows<const W: usize>(tokens: &[Token<'_>], max_rows: usize) -> Result<Vec<[f64; W]>> {
    let mut rows = Vec::with_capacity(max_rows.min(tokens.len() / W.max(1)));

    for chunk in tokens.chunks_exact(W).take(max_rows) {
        let mut row = [0.0; W];
        for (slot, token) in row.iter_mut().zip(chunk) {
            *slot = parse_f64(token)?;
        }
        rows.push(row);
    }

    Ok(rows)
}

/// Extract up to `declared` rows of width `W` starting at `lines[start]`
pub fn extract_rows<const W: usize>(
    lines: &[Vec<u8>],
    start: usize,
    declared: usize,
) -> Result<Extracted<[f64; W]>> {
    let (tokens, lines_consumed) = gather_tokens(lines, start, declared.saturating_mul(W));
    let rows = partition_rows::<W>(&tokens, declared)?;
    Ok(Extracted {
        rows,
        lines_consumed,
    })
}
