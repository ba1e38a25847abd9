use anyhow::Result;
use clap::Parser;
use kvmr::standalone::{engine::run_job, Args, Commands, Job};
use kvmr::*;
use std::sync::Arc;

fn parse_args() -> (Option<std::path::PathBuf>, Job) {
    let args = Args::parse();
    match args.command {
        Commands::Submit {
            input,
            pipeline,
            output,
            workers,
            args: key_args,
        } => (
            args.config,
            Job {
                input,
                pipeline,
                output,
                workers,
                args: key_args,
            },
        ),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    cmd::init_tracing();
    let (config_path, job) = parse_args();
    let config = Config::load(config_path.as_deref())?;
    let ctx = Arc::new(Context::in_memory().with_config(config));

    let result = run_job(&job, ctx).await?;
    let rendered = serde_json::to_string_pretty(&result)?;
    match &job.output {
        Some(path) => {
            std::fs::write(path, rendered)?;
            println!("Wrote {}", path.display());
        }
        None => println!("{}", rendered),
    }
    Ok(())
}
