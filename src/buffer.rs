//! Growable row storage with write tracking
//!
//! Every parser fills one of these: point coordinates (3 wide), face vertex
//! lists (4 wide), triangle index pairs (6 wide) and per-cell field values.

use crate::error::{FoamError, Result};

/// Append-only sequence of fixed-width numeric rows
#[derive(Clone, Debug, PartialEq)]
pub struct GrowableBuffer<T, const W: usize> {
    /// Row storage
    rows: Vec<[T; W]>,
    /// Total element writes since creation
    total: usize,
}

impl<T: Copy, const W: usize> GrowableBuffer<T, W> {
    pub fn new() -> Self {
        Self {
            rows: Vec::new(),
            total: 0,
        }
    }

    pub fn with_capacity(rows: usize) -> Self {
        Self {
            rows: Vec::with_capacity(rows),
            total: 0,
        }
    }

    /// Row width
    pub const fn width(&self) -> usize {
        W
    }

    /// Pre-allocate room for at least `additional` more rows
    pub fn reserve(&mut self, additional: usize) {
        self.rows.reserve(additional);
    }

    /// Append one row
    pub fn append(&mut self, row: [T; W]) {
        self.total += W;
        self.rows.push(row);
    }

    /// Bounds-checked row read
    pub fn at(&self, index: usize) -> Result<&[T; W]> {
        self.rows.get(index).ok_or(FoamError::OutOfRange {
            index,
            len: self.rows.len(),
        })
    }

    /// Number of rows stored
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows that fit without reallocating
    pub fn capacity(&self) -> usize {
        self.rows.capacity()
    }

    /// Total element writes (rows appended times width)
    pub fn total_writes(&self) -> usize {
        self.total
    }

    pub fn rows(&self) -> &[[T; W]] {
        &self.rows
    }

    /// In-place access for transforms that keep the row count
    pub fn rows_mut(&mut self) -> &mut [[T; W]] {
        &mut self.rows
    }

    pub fn iter(&self) -> std::slice::Iter<'_, [T; W]> {
        self.rows.iter()
    }

    /// Every element, row by row
    pub fn flat(&self) -> impl Iterator<Item = T> + '_ {
        self.rows.iter().flat_map(|row| row.iter().copied())
    }

    /// Consume the buffer and hand off its rows
    pub fn into_rows(self) -> Vec<[T; W]> {
        self.rows
    }
}

impl GrowableBuffer<f64, 3> {
    /// Multiply every coordinate triple by `factor`
    pub fn scale(&mut self, factor: f64) {
        for row in &mut self.rows {
            for value in row.iter_mut() {
                *value *= factor;
            }
        }
    }
}

impl<T: Copy, const W: usize> Default for GrowableBuffer<T, W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy, const W: usize> FromIterator<[T; W]> for GrowableBuffer<T, W> {
    fn from_iter<I: IntoIterator<Item = [T; W]>>(iter: I) -> Self {
        let iter = iter.into_iter();
        let mut buffer = GrowableBuffer::with_capacity(iter.size_hint().0);
        for row in iter {
            buffer.append(row);
        }
        buffer
    }
}

impl<'a, T: Copy, const W: usize> IntoIterator for &'a GrowableBuffer<T, W> {
    type Item = &'a [T; W];
    type IntoIter = std::slice::Iter<'a, [T; W]>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_tracks_writes() {
        let mut buf: GrowableBuffer<f64, 3> = GrowableBuffer::new();
        buf.append([1.0, 2.0, 3.0]);
        buf.append([4.0, 5.0, 6.0]);
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.total_writes(), 6);
        assert!(buf.len() <= buf.capacity());
    }

    #[test]
    fn test_at_out_of_range() {
        let mut buf: GrowableBuffer<u32, 4> = GrowableBuffer::new();
        buf.append([0, 1, 2, 3]);
        assert_eq!(buf.at(0).unwrap(), &[0, 1, 2, 3]);
        match buf.at(1) {
            Err(FoamError::OutOfRange { index, len }) => {
                assert_eq!(index, 1);
                assert_eq!(len, 1);
            }
            other => panic!("expected OutOfRange, got {:?}", other),
        }
    }

    #[test]
    fn test_reserve_does_not_change_len() {
        let mut buf: GrowableBuffer<f64, 3> = GrowableBuffer::new();
        buf.reserve(128);
        assert!(buf.capacity() >= 128);
        assert!(buf.is_empty());
        assert!(buf.at(0).is_err());
    }

    #[test]
    fn test_flat_and_collect() {
        let buf: GrowableBuffer<u32, 2> = vec![[1, 2], [3, 4]].into_iter().collect();
        assert_eq!(buf.flat().collect::<Vec<_>>(), vec![1, 2, 3, 4]);
        assert_eq!(buf.into_rows(), vec![[1, 2], [3, 4]]);
    }

    #[test]
    fn test_scale_identity_is_bit_exact() {
        let mut buf: GrowableBuffer<f64, 3> =
            vec![[0.1, -2.5e-7, 3.3333333], [1e10, 0.0, -0.0]].into_iter().collect();
        let before = buf.clone();
        buf.scale(1.0);
        for (a, b) in buf.iter().zip(before.iter()) {
            for k in 0..3 {
                assert_eq!(a[k].to_bits(), b[k].to_bits());
            }
        }
    }
}
