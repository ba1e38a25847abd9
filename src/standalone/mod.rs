use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod engine;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Path to a TOML config file
    #[clap(short, long)]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a pipeline locally over a set of files
    Submit {
        /// Glob spec for the input files
        #[arg(short, long)]
        input: String,

        /// Name of the pipeline
        #[arg(short, long, default_value = "word_count")]
        pipeline: String,

        /// Write the result here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Number of local worker tasks; 0 runs every phase inline
        #[arg(short, long, default_value_t = 2)]
        workers: usize,

        /// Key args the result location is derived from.
        #[clap(value_parser, last = true)]
        args: Vec<String>,
    },
}

#[derive(Debug, Clone)]
pub struct Job {
    pub input: String,
    pub pipeline: String,
    pub output: Option<PathBuf>,
    pub workers: usize,
    pub args: Vec<String>,
}
