use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dbconverge")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(
    about = "Resumable database-instance reconciliation, replayed against a simulator",
    long_about = None
)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Drive one operation of a scenario file to a terminal result
    Simulate(SimulateArgs),

    /// Show the effective handler configuration
    Config {
        /// Config file (default: ~/.config/dbconverge/config.toml)
        #[arg(short, long, env = "DBCONVERGE_CONFIG")]
        config: Option<String>,
    },

    /// Show a stored resumable context
    Context {
        /// Context file written by `simulate --checkpoint`
        file: PathBuf,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// Scenario file (TOML)
    #[arg(short, long)]
    pub scenario: PathBuf,

    /// Config file (default: ~/.config/dbconverge/config.toml)
    #[arg(short, long, env = "DBCONVERGE_CONFIG")]
    pub config: Option<String>,

    /// Resume from and persist the context to this file
    ///
    /// After a failure the file keeps completed steps; stabilization
    /// deadlines restart on the next run.
    #[arg(long)]
    pub checkpoint: Option<String>,

    /// Stop after this many invocations
    #[arg(long)]
    pub max_invocations: Option<usize>,

    /// Print the outcome as JSON
    #[arg(long)]
    pub json: bool,

    /// Wait out retry delays on the wall clock instead of skipping ahead
    #[arg(long)]
    pub real_time: bool,
}
