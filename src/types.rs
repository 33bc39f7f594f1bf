use crate::error::{DistError, Result};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Dense row-major `i32` matrix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<i32>,
}

impl Matrix {
    /// Wrap row-major `data`; both dimensions must be non-zero.
    pub fn new(rows: usize, cols: usize, data: Vec<i32>) -> Result<Self> {
        if rows == 0 || cols == 0 {
            return Err(DistError::config(format!(
                "matrix dimensions must be at least 1x1, got {}x{}",
                rows, cols
            )));
        }
        if rows.checked_mul(cols) != Some(data.len()) {
            return Err(DistError::config(format!(
                "{}x{} matrix needs {} elements, got {}",
                rows,
                cols,
                rows.saturating_mul(cols),
                data.len()
            )));
        }
        Ok(Self { rows, cols, data })
    }

    pub fn from_rows(rows: Vec<Vec<i32>>) -> Result<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != cols) {
            return Err(DistError::config(format!(
                "row {} has {} elements, expected {}",
                i,
                row.len(),
                cols
            )));
        }
        let n = rows.len();
        Self::new(n, cols, rows.into_iter().flatten().collect())
    }

    pub fn zeros(rows: usize, cols: usize) -> Result<Self> {
        Self::new(rows, cols, vec![0; rows.saturating_mul(cols)])
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn row(&self, i: usize) -> &[i32] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[i32]> {
        self.data.chunks_exact(self.cols)
    }

    pub fn as_slice(&self) -> &[i32] {
        &self.data
    }

    pub fn to_rows(&self) -> Vec<Vec<i32>> {
        self.iter_rows().map(<[i32]>::to_vec).collect()
    }

    /// Copy rows `range` into a standalone block.
    pub fn block(&self, range: RowRange) -> RowBlock {
        RowBlock {
            range,
            cols: self.cols,
            data: self.data[range.start * self.cols..range.end * self.cols].to_vec(),
        }
    }
}

/// Half-open row interval `[start, end)`; may be empty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowRange {
    pub start: usize,
    pub end: usize,
}

impl RowRange {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, row: usize) -> bool {
        (self.start..self.end).contains(&row)
    }

    pub fn iter(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// Rows `range` of some larger matrix, stored row-major
///
/// Unlike [`Matrix`] a block may hold zero rows: ranks whose partition is
/// empty still carry one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowBlock {
    range: RowRange,
    cols: usize,
    data: Vec<i32>,
}

impl RowBlock {
    pub fn new(range: RowRange, cols: usize, data: Vec<i32>) -> Result<Self> {
        if range.len().checked_mul(cols) != Some(data.len()) {
            return Err(DistError::config(format!(
                "block of rows [{}, {}) with {} columns cannot hold {} elements",
                range.start,
                range.end,
                cols,
                data.len()
            )));
        }
        Ok(Self { range, cols, data })
    }

    pub fn range(&self) -> RowRange {
        self.range
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// Row by position within the block (not absolute index)
    pub fn local_row(&self, i: usize) -> &[i32] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// Rows paired with their absolute index in the full matrix
    pub fn indexed_rows(&self) -> impl Iterator<Item = (usize, &[i32])> {
        let start = self.range.start;
        // chunks_exact panics on zero width
        let width = self.cols.max(1);
        self.data
            .chunks_exact(width)
            .enumerate()
            .map(move |(i, row)| (start + i, row))
    }

    pub fn into_data(self) -> Vec<i32> {
        self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut [i32] {
        &mut self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matrix_rejects_ragged_rows() {
        let err = Matrix::from_rows(vec![vec![1, 2], vec![3]]).unwrap_err();
        assert!(matches!(err, DistError::Configuration(_)));
        assert!(Matrix::from_rows(Vec::new()).is_err());
        assert!(Matrix::new(2, 2, vec![1, 2, 3]).is_err());
    }

    #[test]
    fn test_matrix_rows() {
        let m = Matrix::from_rows(vec![vec![1, 2, 3], vec![4, 5, 6]]).unwrap();
        assert_eq!(m.rows(), 2);
        assert_eq!(m.cols(), 3);
        assert_eq!(m.row(1), &[4, 5, 6]);
        assert_eq!(m.to_rows(), vec![vec![1, 2, 3], vec![4, 5, 6]]);
    }

    #[test]
    fn test_block_keeps_absolute_indices() {
        let m = Matrix::from_rows(vec![vec![1, 1], vec![2, 2], vec![3, 3]]).unwrap();
        let block = m.block(RowRange::new(1, 3));
        let rows: Vec<_> = block.indexed_rows().collect();
        assert_eq!(rows, vec![(1, &[2, 2][..]), (2, &[3, 3][..])]);

        let empty = m.block(RowRange::new(3, 3));
        assert!(empty.is_empty());
        assert_eq!(empty.indexed_rows().count(), 0);
    }
}
