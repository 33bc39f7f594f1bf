use crate::error::Result;
use crate::types::Matrix;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Smallest generated value
pub const MIN_VALUE: i32 = 1;
/// Largest generated value
pub const MAX_VALUE: i32 = 10;

/// Matrix of values drawn uniformly from `MIN_VALUE..=MAX_VALUE`.
///
/// The same seed always yields the same matrix; `None` seeds from the OS.
pub fn random_matrix(rows: usize, cols: usize, seed: Option<u64>) -> Result<Matrix> {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let data = (0..rows.saturating_mul(cols))
        .map(|_| rng.gen_range(MIN_VALUE..=MAX_VALUE))
        .collect();
    Matrix::new(rows, cols, data)
}
