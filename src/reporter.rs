use crate::runner::{MultiplyReport, SizeTiming, SweepReport};
use crate::verify::{Status, VerificationReport};
use anyhow::Result;
use serde::Serialize;
use std::io::Write;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Seconds with microsecond precision
fn format_seconds(seconds: f64) -> String {
    format!("{:.6} seconds", seconds)
}

/// Throughput in GFlop/s, switching to MFlop/s for slow runs
fn format_rate(gflops: f64) -> String {
    if gflops < 1.0 {
        format!("{:.2} MFlop/s", gflops * 1000.0)
    } else {
        format!("{:.2} GFlop/s", gflops)
    }
}

/// Print one size of a sweep as it completes
pub fn print_size_summary(timing: &SizeTiming) {
    println!("Size:        {}x{}", timing.size, timing.size);
    println!("Time:        {}", format_seconds(timing.seconds));
    println!("Operations:  {}", timing.operations);
    println!("Performance: {}", format_rate(timing.gflops));
    println!("-----------------------------------");
}

/// Print the footer of a finished sweep
pub fn print_sweep_summary(report: &SweepReport) {
    println!(
        "\n{} sizes on {} ranks ({} kernel thread{} each)",
        report.timings.len(),
        report.worker_count,
        report.kernel_threads,
        if report.kernel_threads == 1 { "" } else { "s" }
    );
    if let Some(slowest) = report
        .timings
        .iter()
        .max_by(|a, b| a.seconds.total_cmp(&b.seconds))
    {
        println!(
            "Slowest:     {}x{} in {}",
            slowest.size,
            slowest.size,
            format_seconds(slowest.seconds)
        );
    }
    println!("All results saved to '{}'", report.out_dir.display());
}

pub fn print_multiply_summary(report: &MultiplyReport) {
    println!("\nProduct:     {}x{}", report.rows, report.cols);
    println!("Ranks:       {}", report.worker_count);
    println!("Time:        {}", format_seconds(report.seconds));
    println!("Written to:  {}", report.out.display());
}

/// Print verification results with coloured status
pub fn print_verification(report: &VerificationReport) -> Result<()> {
    let mut stdout = StandardStream::stdout(ColorChoice::Auto);

    for check in &report.checks {
        write!(stdout, "{:>11}  ", format!("{}x{}", check.size, check.size))?;
        let color = match check.status {
            Status::Ok => Color::Green,
            Status::Mismatch => Color::Red,
        };
        stdout.set_color(ColorSpec::new().set_fg(Some(color)).set_bold(true))?;
        write!(stdout, "{}", check.status.as_str())?;
        stdout.reset()?;
        match check.first_difference {
            Some((row, col)) => writeln!(
                stdout,
                "  (first difference at row {}, column {})",
                row, col
            )?,
            None => writeln!(stdout)?,
        }
    }

    if let Some(timings) = &report.timings {
        writeln!(stdout, "\nRecorded timings:")?;
        for record in timings {
            writeln!(stdout, "{:>11}  {}", record.label(), format_seconds(record.seconds))?;
        }
    }

    Ok(())
}

/// Print any report as JSON, coloured when stdout is a terminal
pub fn print_json<T: Serialize>(report: &T) -> Result<()> {
    let value = serde_json::to_value(report)?;
    let json = colored_json::to_colored_json_auto(&value)?;
    println!("{}", json);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_seconds() {
        assert_eq!(format_seconds(0.0), "0.000000 seconds");
        assert_eq!(format_seconds(1.5), "1.500000 seconds");
        assert_eq!(format_seconds(0.0000014), "0.000001 seconds");
    }

    #[test]
    fn test_format_rate() {
        assert_eq!(format_rate(0.25), "250.00 MFlop/s");
        assert_eq!(format_rate(1.0), "1.00 GFlop/s");
        assert_eq!(format_rate(12.5), "12.50 GFlop/s");
    }
}
