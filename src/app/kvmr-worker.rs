use anyhow::Result;
use clap::Parser;
use kvmr::cmd::worker::Args;
use kvmr::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Pop one unit from the first lane that has one and run it.
fn work_any(ctx: &Arc<Context>, lanes: &[String]) -> kvmr::Result<bool> {
    for lane in lanes {
        if worker::work_one(ctx, lane)?.is_some() {
            return Ok(true);
        }
    }
    Ok(false)
}

/// One worker slot: runs units back to back, sleeping while the lanes are empty.
async fn run_slot(slot: usize, ctx: Arc<Context>, lanes: Arc<Vec<String>>, poll: Duration) {
    debug!(slot, "Worker slot started");
    loop {
        let task_ctx = Arc::clone(&ctx);
        let task_lanes = Arc::clone(&lanes);
        let worked = tokio::task::spawn_blocking(move || work_any(&task_ctx, &task_lanes)).await;
        match worked {
            Ok(Ok(true)) => {}
            Ok(Ok(false)) => sleep(poll).await,
            Ok(Err(err)) => {
                error!(slot, "Queue error: {}", err);
                sleep(poll).await;
            }
            Err(err) => warn!(slot, "Unit panicked: {}", err),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    cmd::init_tracing();

    let args = Args::parse();
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(url) = args.redis {
        config.redis_url = Some(url);
    }
    if let Some(n) = args.concurrency {
        config.worker_concurrency = n;
    }
    let concurrency = config.worker_concurrency.max(1);
    let poll = config.poll_interval;

    let ctx = Arc::new(Context::redis(config)?);
    let lanes = if args.lane.is_empty() {
        ctx.lanes()
    } else {
        args.lane
    };
    info!(?lanes, concurrency, "Worker started");

    let lanes = Arc::new(lanes);
    for slot in 0..concurrency {
        tokio::spawn(run_slot(slot, Arc::clone(&ctx), Arc::clone(&lanes), poll));
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down after the units in progress");
    Ok(())
}
