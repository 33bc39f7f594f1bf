use crate::comm::Communicator;
use crate::generator::random_matrix;
use crate::matrix_io::{self, TimeRecord};
use crate::protocol::{RunConfig, distributed_multiply};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const TIME_TABLE_FILE: &str = "time_results.txt";

pub fn matrix_a_file(dir: &Path, size: usize) -> PathBuf {
    dir.join(format!("matrixA_{}.txt", size))
}

pub fn matrix_b_file(dir: &Path, size: usize) -> PathBuf {
    dir.join(format!("matrixB_{}.txt", size))
}

pub fn result_file(dir: &Path, size: usize) -> PathBuf {
    dir.join(format!("result_{}.txt", size))
}

/// What a benchmark sweep runs; identical on every rank
#[derive(Debug, Clone)]
pub struct SweepPlan {
    pub sizes: Vec<usize>,
    pub out_dir: PathBuf,
    pub seed_a: Option<u64>,
    pub seed_b: u64,
    pub run: RunConfig,
}

/// Timing of one square size
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizeTiming {
    pub size: usize,
    pub seconds: f64,
    pub operations: u64,
    pub gflops: f64,
}

impl SizeTiming {
    pub fn new(size: usize, seconds: f64) -> Self {
        let operations = (size as u64).pow(3);
        let gflops = if seconds > 0.0 {
            1e-9 * operations as f64 / seconds
        } else {
            0.0
        };
        Self {
            size,
            seconds,
            operations,
            gflops,
        }
    }
}

/// Complete sweep, available on the coordinator
#[derive(Debug, Serialize, Deserialize)]
pub struct SweepReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub worker_count: usize,
    pub kernel_threads: usize,
    pub out_dir: PathBuf,
    pub timings: Vec<SizeTiming>,
}

/// Single multiply of two stored matrices
#[derive(Debug, Serialize, Deserialize)]
pub struct MultiplyReport {
    pub started_at: DateTime<Utc>,
    pub a: PathBuf,
    pub b: PathBuf,
    pub out: PathBuf,
    pub rows: usize,
    pub cols: usize,
    pub worker_count: usize,
    pub seconds: f64,
}

/// Run the distributed multiply once per size in `plan`.
///
/// Every rank calls this with the same plan. The coordinator generates and
/// stores the inputs, stores each product, calls `on_size` after each size
/// and finally writes the time table; it alone gets `Some(report)`.
pub fn run_sweep<C: Communicator>(
    comm: &C,
    plan: &SweepPlan,
    on_size: impl Fn(&SizeTiming),
) -> Result<Option<SweepReport>> {
    if plan.sizes.iter().any(|&s| s == 0) {
        anyhow::bail!("Matrix sizes must be positive");
    }

    if !comm.is_coordinator() {
        for _ in &plan.sizes {
            distributed_multiply(comm, None, &plan.run)?;
        }
        return Ok(None);
    }

    let started_at = Utc::now();
    fs::create_dir_all(&plan.out_dir)
        .context(format!("Failed to create output directory: {}", plan.out_dir.display()))?;

    let mut timings = Vec::with_capacity(plan.sizes.len());
    for &size in &plan.sizes {
        let a = random_matrix(size, size, plan.seed_a)?;
        let b = random_matrix(size, size, Some(plan.seed_b))?;
        matrix_io::write_matrix(&matrix_a_file(&plan.out_dir, size), &a)?;
        matrix_io::write_matrix(&matrix_b_file(&plan.out_dir, size), &b)?;

        let product = distributed_multiply(comm, Some((&a, &b)), &plan.run)?
            .context("Coordinator finished a run without a result")?;
        matrix_io::write_matrix(&result_file(&plan.out_dir, size), &product.result)?;

        let timing = SizeTiming::new(size, product.duration.seconds);
        info!(size, seconds = timing.seconds, gflops = timing.gflops, "size complete");
        on_size(&timing);
        timings.push(timing);
    }

    let records: Vec<TimeRecord> = timings
        .iter()
        .map(|t| TimeRecord {
            rows: t.size,
            cols: t.size,
            seconds: t.seconds,
        })
        .collect();
    matrix_io::write_time_table(&plan.out_dir.join(TIME_TABLE_FILE), &records)?;

    Ok(Some(SweepReport {
        started_at,
        finished_at: Utc::now(),
        worker_count: comm.size(),
        kernel_threads: plan.run.kernel_threads,
        out_dir: plan.out_dir.clone(),
        timings,
    }))
}

/// Multiply the matrices stored at `a_path` and `b_path` into `out`.
///
/// Only the coordinator touches the filesystem.
pub fn run_multiply<C: Communicator>(
    comm: &C,
    a_path: &Path,
    b_path: &Path,
    out: &Path,
    run: &RunConfig,
) -> Result<Option<MultiplyReport>> {
    if !comm.is_coordinator() {
        distributed_multiply(comm, None, run)?;
        return Ok(None);
    }

    let started_at = Utc::now();
    let a = matrix_io::read_matrix(a_path)?;
    let b = matrix_io::read_matrix(b_path)?;

    let product = distributed_multiply(comm, Some((&a, &b)), run)?
        .context("Coordinator finished a run without a result")?;
    matrix_io::write_matrix(out, &product.result)?;

    Ok(Some(MultiplyReport {
        started_at,
        a: a_path.to_path_buf(),
        b: b_path.to_path_buf(),
        out: out.to_path_buf(),
        rows: product.result.rows(),
        cols: product.result.cols(),
        worker_count: product.worker_count,
        seconds: product.duration.seconds,
    }))
}
