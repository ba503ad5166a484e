//! CLI for quorum-wait
//!
//! Provides command-line access to:
//! - The standard BFT configurations and their quorum sizes
//! - Writing a default configuration file
//! - Running the convergence waits against a simulated cluster

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

mod cli_handler;

pub use cli_handler::{CliHandler, SimulationReport};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the standard BFT configurations
    Configs {
        /// Only configurations with crash-only faults (c > 0)
        #[arg(long)]
        with_crash_faults: bool,
        /// Largest cluster size to include
        #[arg(long)]
        max_n: Option<usize>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Validate a sizing and print its quorum
    Quorum {
        n: usize,
        f: usize,
        c: usize,
    },
    /// Write the default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Drive view and checkpoint waits against a simulated cluster
    Simulate(SimulateArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SimulateArgs {
    /// View the cluster moves to
    #[arg(long, default_value_t = 1)]
    pub view: u64,
    /// Checkpoint the replicas store after the view change
    #[arg(long, default_value_t = 1)]
    pub checkpoint: u64,
    /// Replicas that never answer
    #[arg(long, default_value_t = 0)]
    pub silent: usize,
    /// Delay before the simulated cluster converges, in milliseconds
    #[arg(long, default_value_t = 1500)]
    pub delay_ms: u64,
    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}
