use clap::Parser;
use distmul::cli::{Cli, Commands, LaunchArgs};
use distmul::comm::Communicator;
use distmul::launch::{self, Backend, RankJob};
use distmul::protocol::RunConfig;
use distmul::runner::{self, MultiplyReport, SweepPlan, SweepReport};
use distmul::verify::{self, VerifyPlan};
use distmul::{logging, reporter};
use std::path::PathBuf;
use std::process;

fn main() {
    let cli = Cli::parse();

    if let Err(e) = logging::init(cli.verbose) {
        eprintln!("Warning: {}", e);
    }

    let outcome = match cli.command {
        Commands::Bench {
            launch,
            sizes,
            out,
            seed_a,
            seed_b,
            json,
            quiet,
        } => {
            let plan = SweepPlan {
                sizes,
                out_dir: out,
                seed_a,
                seed_b,
                run: run_config(&launch),
            };
            bench_command(&launch, plan, json, quiet)
        }
        Commands::Multiply {
            launch,
            a,
            b,
            out,
            json,
        } => multiply_command(&launch, a, b, out, json),
        Commands::Verify { dir, sizes, json } => verify_command(VerifyPlan { dir, sizes }, json),
    };

    match outcome {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

fn backend(launch: &LaunchArgs) -> Backend {
    if launch.mpi {
        Backend::Mpi
    } else {
        Backend::Local {
            workers: launch.workers,
        }
    }
}

fn run_config(launch: &LaunchArgs) -> RunConfig {
    RunConfig {
        kernel_threads: launch.threads.max(1),
    }
}

struct SweepJob {
    plan: SweepPlan,
    print_sizes: bool,
}

impl RankJob for SweepJob {
    type Output = SweepReport;

    fn run<C: Communicator>(&self, comm: &C) -> anyhow::Result<Option<SweepReport>> {
        runner::run_sweep(comm, &self.plan, |timing| {
            if self.print_sizes {
                reporter::print_size_summary(timing);
            }
        })
    }
}

struct MultiplyJob {
    a: PathBuf,
    b: PathBuf,
    out: PathBuf,
    run: RunConfig,
}

impl RankJob for MultiplyJob {
    type Output = MultiplyReport;

    fn run<C: Communicator>(&self, comm: &C) -> anyhow::Result<Option<MultiplyReport>> {
        runner::run_multiply(comm, &self.a, &self.b, &self.out, &self.run)
    }
}

fn bench_command(
    launch: &LaunchArgs,
    plan: SweepPlan,
    json: bool,
    quiet: bool,
) -> anyhow::Result<bool> {
    let job = SweepJob {
        plan,
        print_sizes: !json && !quiet,
    };

    // Non-coordinator MPI ranks get None and print nothing
    if let Some(report) = launch::launch(backend(launch), &job)? {
        if json {
            reporter::print_json(&report)?;
        } else if !quiet {
            reporter::print_sweep_summary(&report);
        }
    }
    Ok(true)
}

fn multiply_command(
    launch: &LaunchArgs,
    a: PathBuf,
    b: PathBuf,
    out: PathBuf,
    json: bool,
) -> anyhow::Result<bool> {
    let job = MultiplyJob {
        a,
        b,
        out,
        run: run_config(launch),
    };

    if let Some(report) = launch::launch(backend(launch), &job)? {
        if json {
            reporter::print_json(&report)?;
        } else {
            reporter::print_multiply_summary(&report);
        }
    }
    Ok(true)
}

fn verify_command(plan: VerifyPlan, json: bool) -> anyhow::Result<bool> {
    let report = verify::verify_results(&plan)?;

    if json {
        reporter::print_json(&report)?;
    } else {
        reporter::print_verification(&report)?;
    }

    Ok(report.all_ok())
}
