//! Naive dense product restricted to a block of rows.
//!
//! Accumulation runs over `k` ascending with `i32` wrapping arithmetic, so
//! every path here produces bit-identical output.

use crate::error::{DistError, Result};
use crate::types::{Matrix, RowBlock, RowRange};
use rayon::prelude::*;

/// Multiply the rows in `a` by the whole of `b`.
///
/// With `threads > 1` output rows are spread over a dedicated rayon pool.
pub fn multiply_block(a: &RowBlock, b: &Matrix, threads: usize) -> Result<RowBlock> {
    if a.cols() != b.rows() {
        return Err(DistError::config(format!(
            "left block has {} columns but right matrix has {} rows",
            a.cols(),
            b.rows()
        )));
    }

    let n = b.cols();
    let mut out = RowBlock::new(a.range(), n, vec![0; a.len() * n])?;
    if a.is_empty() {
        return Ok(out);
    }

    if threads <= 1 {
        for (i, out_row) in out.data_mut().chunks_exact_mut(n).enumerate() {
            fill_row(a.local_row(i), b, out_row);
        }
        return Ok(out);
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| DistError::config(format!("failed to build kernel thread pool: {}", e)))?;
    pool.install(|| {
        out.data_mut()
            .par_chunks_exact_mut(n)
            .enumerate()
            .for_each(|(i, out_row)| fill_row(a.local_row(i), b, out_row));
    });
    Ok(out)
}

/// Single-process reference product `a * b`
pub fn multiply(a: &Matrix, b: &Matrix) -> Result<Matrix> {
    let whole = a.block(RowRange::new(0, a.rows()));
    let product = multiply_block(&whole, b, 1)?;
    Matrix::new(a.rows(), b.cols(), product.into_data())
}

fn fill_row(a_row: &[i32], b: &Matrix, out_row: &mut [i32]) {
    for (j, cell) in out_row.iter_mut().enumerate() {
        let mut sum = 0i32;
        for (k, &a_ik) in a_row.iter().enumerate() {
            sum = sum.wrapping_add(a_ik.wrapping_mul(b.row(k)[j]));
        }
        *cell = sum;
    }
}
