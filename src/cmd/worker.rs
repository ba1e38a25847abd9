use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Path to a TOML config file
    #[clap(short, long)]
    pub config: Option<PathBuf>,

    /// Redis server to join, overriding the config file
    #[clap(short, long)]
    pub redis: Option<String>,

    /// Lanes to pull units from; every lane of the registry if empty
    #[clap(short, long)]
    pub lane: Vec<String>,

    /// Units worked at the same time, overriding the config file
    #[clap(short = 'n', long)]
    pub concurrency: Option<usize>,
}
