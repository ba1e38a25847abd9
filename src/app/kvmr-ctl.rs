use anyhow::{bail, Result};
use clap::Parser;
use kvmr::cmd::ctl::{Args, Commands};
use kvmr::standalone::engine::read_input;
use kvmr::*;
use std::sync::Arc;

fn display_processes(ctx: &Arc<Context>) -> Result<()> {
    let pids = Process::ps(ctx)?;
    if pids.is_empty() {
        println!("No processes");
        return Ok(());
    }
    for pid in pids {
        match Process::open(ctx, pid)? {
            Some(process) => println!(
                "[{}]\tSTATE: [{}]\tTYPE: [{}]\tSLAVES: [{}]",
                pid,
                process.state(),
                process.spec().process_type,
                master::slaves(ctx, pid)?
            ),
            None => println!("[{}]\t(missing)", pid),
        }
    }
    Ok(())
}

fn display_status(ctx: &Arc<Context>, pid: Pid) -> Result<()> {
    let process = match Process::open(ctx, pid)? {
        Some(process) => process,
        None => bail!("no process {}", pid),
    };
    println!("---------- PROCESS {} ----------", pid);
    println!("{}", serde_json::to_string_pretty(process.spec())?);
    println!("Outstanding units:\t{}", master::slaves(ctx, pid)?);
    println!("Intermediate keys:\t{}", process.num_keys()?);
    println!("Result key:\t{}", process.result_key(&[]));
    println!("---------- STORAGE ----------");
    for key in Process::info(ctx, pid)? {
        println!("{}", key);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    cmd::init_tracing();

    let args = Args::parse();
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(url) = args.redis {
        config.redis_url = Some(url);
    }
    let ctx = Arc::new(Context::redis(config)?);

    match args.command {
        Commands::Submit {
            input,
            reference,
            pipeline,
            args,
        } => {
            let input = match (input, reference) {
                (Some(pattern), _) => Input::Records(read_input(&pattern)?),
                (None, Some(key)) => Input::Reference(key),
                (None, None) => bail!("one of --input or --reference is required"),
            };
            let mut process = Process::create_from_pipeline(&ctx, &pipeline, args)?;
            process.run(input, false)?;
            println!("Submitted process {}", process.pid());
        }
        Commands::Ps => display_processes(&ctx)?,
        Commands::Status { pid } => display_status(&ctx, pid)?,
        Commands::Result { pid } => {
            let process = match Process::open(&ctx, pid)? {
                Some(process) => process,
                None => bail!("no process {}", pid),
            };
            match process.get_saved_result()? {
                Some(result) => println!("{}", serde_json::to_string_pretty(&result)?),
                None => println!("No result yet (state {})", process.state()),
            }
        }
        Commands::Kill { pid } => {
            let removed = Process::kill(&ctx, pid)?;
            println!("Killed process {} ({} queued units removed)", pid, removed);
        }
        Commands::KillAll => {
            let removed = Process::kill_all(&ctx)?;
            println!("Killed every process ({} queued units removed)", removed);
        }
        Commands::Metrics => {
            let times = master::recent_run_times(&ctx)?;
            if times.is_empty() {
                println!("No completed runs");
            }
            for (idx, took) in times.iter().enumerate() {
                println!("[{}]\t{:?}", idx, took);
            }
        }
    }

    Ok(())
}
