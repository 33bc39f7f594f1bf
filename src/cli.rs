use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "distmul")]
#[command(about = "Distributed row-partitioned integer matrix multiplication", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// How ranks are launched
#[derive(Args, Debug, Clone)]
pub struct LaunchArgs {
    /// Number of ranks to run as local threads
    #[arg(short, long, default_value = "4")]
    pub workers: usize,

    /// Use the MPI world instead of local threads (start with mpirun)
    #[arg(long, conflicts_with = "workers")]
    pub mpi: bool,

    /// Threads used by the multiply kernel inside each rank
    #[arg(short, long, default_value = "1")]
    pub threads: usize,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Benchmark the distributed multiply over a list of square sizes
    Bench {
        #[command(flatten)]
        launch: LaunchArgs,

        /// Comma-separated matrix sizes
        #[arg(
            short,
            long,
            value_delimiter = ',',
            default_values_t = [100, 200, 300, 400, 500, 1000, 1500, 3000]
        )]
        sizes: Vec<usize>,

        /// Directory receiving generated matrices, results and the time table
        #[arg(short, long, default_value = "results")]
        out: PathBuf,

        /// Seed for the left-hand matrix (random when omitted)
        #[arg(long)]
        seed_a: Option<u64>,

        /// Seed for the right-hand matrix
        #[arg(long, default_value = "42")]
        seed_b: u64,

        /// Output JSON instead of human-readable text
        #[arg(long)]
        json: bool,

        /// Suppress human-readable output (useful with --json)
        #[arg(long)]
        quiet: bool,
    },

    /// Multiply two matrices stored in text files
    Multiply {
        #[command(flatten)]
        launch: LaunchArgs,

        /// Left-hand matrix file
        a: PathBuf,

        /// Right-hand matrix file
        b: PathBuf,

        /// Where to write the product
        #[arg(short, long)]
        out: PathBuf,

        /// Output JSON instead of human-readable text
        #[arg(long)]
        json: bool,
    },

    /// Check stored benchmark results against a single-process product
    Verify {
        /// Directory produced by `distmul bench`
        #[arg(short, long, default_value = "results")]
        dir: PathBuf,

        /// Comma-separated matrix sizes to check
        #[arg(
            short,
            long,
            value_delimiter = ',',
            default_values_t = [100, 200, 300, 400, 500, 1000, 1500, 3000]
        )]
        sizes: Vec<usize>,

        /// Output JSON instead of human-readable text
        #[arg(long)]
        json: bool,
    },
}
