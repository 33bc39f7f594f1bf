use crate::types::Matrix;
use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

const TIME_TABLE_HEADER: &str = "Matrix size\tExecution time (seconds)";

/// One row of the time table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeRecord {
    pub rows: usize,
    pub cols: usize,
    pub seconds: f64,
}

impl TimeRecord {
    pub fn label(&self) -> String {
        format!("{}x{}", self.rows, self.cols)
    }
}

/// Render a matrix as `rows cols` followed by one space-separated line per row
pub fn format_matrix(matrix: &Matrix) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} {}", matrix.rows(), matrix.cols());
    for row in matrix.iter_rows() {
        for value in row {
            let _ = write!(out, "{} ", value);
        }
        out.push('\n');
    }
    out
}

pub fn parse_matrix(text: &str) -> Result<Matrix> {
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());

    let header = lines.next().context("Matrix file is empty")?;
    let dims: Vec<usize> = header
        .split_whitespace()
        .map(str::parse::<usize>)
        .collect::<std::result::Result<Vec<_>, _>>()
        .context(format!("Invalid matrix header: {:?}", header))?;
    let &[rows, cols] = dims.as_slice() else {
        anyhow::bail!("Matrix header must be `rows cols`, got {:?}", header);
    };

    let mut data = Vec::with_capacity(rows.saturating_mul(cols));
    for i in 0..rows {
        let line = lines
            .next()
            .context(format!("Matrix declares {} rows but ends after {}", rows, i))?;
        let before = data.len();
        for token in line.split_whitespace() {
            let value = token
                .parse::<i32>()
                .context(format!("Invalid value {:?} in row {}", token, i))?;
            data.push(value);
        }
        if data.len() - before != cols {
            anyhow::bail!("Row {} has {} values, expected {}", i, data.len() - before, cols);
        }
    }

    Ok(Matrix::new(rows, cols, data)?)
}

pub fn write_matrix(path: &Path, matrix: &Matrix) -> Result<()> {
    let file = File::create(path)
        .context(format!("Failed to create matrix file: {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    writer.write_all(format_matrix(matrix).as_bytes())?;
    writer.flush()?;
    Ok(())
}

pub fn read_matrix(path: &Path) -> Result<Matrix> {
    let text = fs::read_to_string(path)
        .context(format!("Failed to read matrix file: {}", path.display()))?;
    parse_matrix(&text).context(format!("Failed to parse matrix file: {}", path.display()))
}

/// Write the per-size timing table
pub fn write_time_table(path: &Path, records: &[TimeRecord]) -> Result<()> {
    let mut file = File::create(path)
        .context(format!("Failed to create time table: {}", path.display()))?;

    writeln!(file, "{}", TIME_TABLE_HEADER)?;
    for record in records {
        writeln!(file, "{}\t{:.6}", record.label(), record.seconds)?;
    }

    Ok(())
}

pub fn parse_time_table(text: &str) -> Result<Vec<TimeRecord>> {
    let row = Regex::new(r"^\s*(\d+)(?:x(\d+))?\t\s*([0-9]+(?:\.[0-9]+)?)\s*$")?;

    text.lines()
        .skip(1)
        .filter(|l| !l.trim().is_empty())
        .map(|line| -> Result<TimeRecord> {
            let caps = row
                .captures(line)
                .context(format!("Invalid time table row: {:?}", line))?;
            let rows: usize = caps[1].parse()?;
            // a bare size means a square matrix
            let cols = match caps.get(2) {
                Some(c) => c.as_str().parse()?,
                None => rows,
            };
            Ok(TimeRecord {
                rows,
                cols,
                seconds: caps[3].parse()?,
            })
        })
        .collect()
}

pub fn read_time_table(path: &Path) -> Result<Vec<TimeRecord>> {
    let text = fs::read_to_string(path)
        .context(format!("Failed to read time table: {}", path.display()))?;
    parse_time_table(&text)
}
