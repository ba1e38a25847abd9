use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::process::Pid;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[clap(subcommand)]
    pub command: Commands,

    /// Path to a TOML config file
    #[clap(short, long)]
    pub config: Option<PathBuf>,

    /// Redis server to talk to, overriding the config file
    #[clap(short, long)]
    pub redis: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Submit a process to the cluster
    Submit {
        /// Glob spec for the input files; every non-empty line is a record
        #[arg(short, long, conflicts_with = "reference")]
        input: Option<String>,

        /// Store key holding the input, scanned by the pipeline's inputter
        #[arg(short, long)]
        reference: Option<String>,

        /// Name of the pipeline
        #[arg(short, long, default_value = "word_count")]
        pipeline: String,

        /// Key args the result location is derived from.
        #[clap(value_parser, last = true)]
        args: Vec<String>,
    },
    /// Lists every registered process with its state
    Ps,
    /// Shows the state, outstanding units and storage keys of a process
    Status {
        pid: Pid,
    },
    /// Prints the saved result of a process
    Result {
        pid: Pid,
    },
    /// Removes the queued units of a process and deletes it
    Kill {
        pid: Pid,
    },
    /// Kills every registered process
    KillAll,
    /// Shows the most recent run durations
    Metrics,
}
