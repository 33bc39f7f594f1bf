use crate::kernel::multiply;
use crate::matrix_io::{self, TimeRecord};
use crate::runner::{TIME_TABLE_FILE, matrix_a_file, matrix_b_file, result_file};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const VERIFICATION_FILE: &str = "verification_results.txt";

#[derive(Debug, Clone)]
pub struct VerifyPlan {
    pub dir: PathBuf,
    pub sizes: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Mismatch,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Ok => "ok",
            Status::Mismatch => "mismatch",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizeCheck {
    pub size: usize,
    pub status: Status,
    /// First differing cell, if any
    pub first_difference: Option<(usize, usize)>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerificationReport {
    pub checked_at: DateTime<Utc>,
    pub dir: PathBuf,
    pub checks: Vec<SizeCheck>,
    /// Recorded timings, when a time table is present
    pub timings: Option<Vec<TimeRecord>>,
}

impl VerificationReport {
    pub fn all_ok(&self) -> bool {
        self.checks.iter().all(|c| c.status == Status::Ok)
    }
}

/// Recompute every stored product in a single process and compare.
///
/// Writes a verification table next to the inputs.
pub fn verify_results(plan: &VerifyPlan) -> Result<VerificationReport> {
    let mut checks = Vec::with_capacity(plan.sizes.len());
    for &size in &plan.sizes {
        checks.push(check_size(&plan.dir, size)?);
    }

    write_verification_table(&plan.dir.join(VERIFICATION_FILE), &checks)?;

    let time_table = plan.dir.join(TIME_TABLE_FILE);
    let timings = if time_table.exists() {
        Some(matrix_io::read_time_table(&time_table)?)
    } else {
        None
    };

    Ok(VerificationReport {
        checked_at: Utc::now(),
        dir: plan.dir.clone(),
        checks,
        timings,
    })
}

fn check_size(dir: &Path, size: usize) -> Result<SizeCheck> {
    let a = matrix_io::read_matrix(&matrix_a_file(dir, size))?;
    let b = matrix_io::read_matrix(&matrix_b_file(dir, size))?;
    let stored = matrix_io::read_matrix(&result_file(dir, size))?;

    let expected = multiply(&a, &b)
        .context(format!("Stored inputs for size {} cannot be multiplied", size))?;

    let first_difference = if stored.rows() != expected.rows() || stored.cols() != expected.cols() {
        Some((0, 0))
    } else {
        stored
            .as_slice()
            .iter()
            .zip(expected.as_slice())
            .position(|(s, e)| s != e)
            .map(|i| (i / expected.cols(), i % expected.cols()))
    };

    Ok(SizeCheck {
        size,
        status: if first_difference.is_none() {
            Status::Ok
        } else {
            Status::Mismatch
        },
        first_difference,
    })
}

fn write_verification_table(path: &Path, checks: &[SizeCheck]) -> Result<()> {
    let mut file = File::create(path)
        .context(format!("Failed to create verification table: {}", path.display()))?;

    writeln!(file, "Matrix size\tVerification result")?;
    for check in checks {
        writeln!(file, "{}x{}\t{}", check.size, check.size, check.status.as_str())?;
    }

    Ok(())
}
