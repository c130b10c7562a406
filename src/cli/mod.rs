pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "skimmer")]
#[command(about = "An unattended forum read-through agent", long_about = None)]
pub struct Cli {
    /// Path to an alternate configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Discover a thread backlog and read through it
    Run {
        /// Run the browser with a visible window
        #[arg(long)]
        headed: bool,

        /// Override how many threads to discover
        #[arg(short = 'n', long)]
        count: Option<usize>,
    },
    /// Inspect the cookies file and report problems
    CheckSession,
}
