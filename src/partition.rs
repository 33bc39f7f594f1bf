//! Row partitioning of the left-hand matrix across ranks.
//!
//! The `R mod W` leftover rows go to the lowest ranks, one each. This is a
//! policy choice kept for output parity with earlier runs; any contiguous
//! balanced split would give the same product.

use crate::error::{DistError, Result};
use crate::types::RowRange;

/// Contiguous row range owned by each rank
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    rows: usize,
    ranges: Vec<RowRange>,
}

impl Partition {
    pub fn new(rows: usize, workers: usize) -> Result<Self> {
        if rows == 0 {
            return Err(DistError::config("cannot partition a matrix with no rows"));
        }
        if workers == 0 {
            return Err(DistError::config("cannot partition across zero workers"));
        }

        let ranges = (0..workers).map(|rank| range_for(rows, workers, rank)).collect();
        Ok(Self { rows, ranges })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn worker_count(&self) -> usize {
        self.ranges.len()
    }

    /// Range owned by `rank`. Panics if `rank >= worker_count()`.
    pub fn range(&self, rank: usize) -> RowRange {
        self.ranges[rank]
    }

    pub fn ranges(&self) -> &[RowRange] {
        &self.ranges
    }

    pub fn sizes(&self) -> Vec<usize> {
        self.ranges.iter().map(RowRange::len).collect()
    }

    /// Rank owning `row`, if the row is in range
    pub fn owner_of(&self, row: usize) -> Option<usize> {
        if row >= self.rows {
            return None;
        }
        // First `extra` ranks hold `base + 1` rows.
        let workers = self.ranges.len();
        let base = self.rows / workers;
        let extra = self.rows % workers;
        let wide = (base + 1) * extra;
        if row < wide {
            Some(row / (base + 1))
        } else {
            Some(extra + (row - wide) / base)
        }
    }
}

fn range_for(rows: usize, workers: usize, rank: usize) -> RowRange {
    let base = rows / workers;
    let extra = rows % workers;
    let start = rank * base + rank.min(extra);
    let end = start + base + usize::from(rank < extra);
    RowRange::new(start, end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_five_rows_three_workers() {
        let p = Partition::new(5, 3).unwrap();
        assert_eq!(p.sizes(), vec![2, 2, 1]);
        assert_eq!(
            p.ranges(),
            &[RowRange::new(0, 2), RowRange::new(2, 4), RowRange::new(4, 5)]
        );
    }

    #[test]
    fn test_more_workers_than_rows() {
        let p = Partition::new(2, 5).unwrap();
        assert_eq!(p.sizes(), vec![1, 1, 0, 0, 0]);
        for rank in 2..5 {
            assert!(p.range(rank).is_empty());
        }
    }

    #[test]
    fn test_degenerate_inputs() {
        assert!(Partition::new(0, 3).is_err());
        assert!(Partition::new(3, 0).is_err());
    }

    #[test]
    fn test_partition_covers_rows_exactly() {
        for rows in 1..=64 {
            for workers in 1..=16 {
                let p = Partition::new(rows, workers).unwrap();
                assert_eq!(p.worker_count(), workers);

                let mut next = 0;
                for range in p.ranges() {
                    assert_eq!(range.start, next, "gap or overlap for R={} W={}", rows, workers);
                    next = range.end;
                }
                assert_eq!(next, rows);

                let sizes = p.sizes();
                let min = *sizes.iter().min().unwrap();
                let max = *sizes.iter().max().unwrap();
                assert!(max - min <= 1, "unbalanced for R={} W={}", rows, workers);
                assert_eq!(max, rows.div_ceil(workers));
            }
        }
    }

    #[test]
    fn test_owner_of_matches_ranges() {
        for rows in 1..=40 {
            for workers in 1..=9 {
                let p = Partition::new(rows, workers).unwrap();
                for row in 0..rows {
                    let owner = p.owner_of(row).unwrap();
                    assert!(p.range(owner).contains(row));
                }
                assert_eq!(p.owner_of(rows), None);
            }
        }
    }
}
