use anyhow::{bail, Context as _, Result};
use glob::glob;
use serde_json::Value;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::context::Context;
use crate::process::{Pid, Process, State};
use crate::standalone::Job;
use crate::{master, worker};

/// Every non-empty line of every file matching `pattern`, files in path order.
pub fn read_input(pattern: &str) -> Result<Vec<String>> {
    let mut records = Vec::new();
    let mut files = 0;
    for pathspec in glob(pattern)?.flatten() {
        let text = fs::read_to_string(&pathspec)
            .with_context(|| format!("reading {}", pathspec.display()))?;
        records.extend(
            text.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string),
        );
        files += 1;
    }
    if files == 0 {
        bail!("no input files match `{}`", pattern);
    }
    debug!(files, records = records.len(), "Read input");
    Ok(records)
}

/// Work the lanes of `ctx` until `pid` has no outstanding units.
fn drain(ctx: Arc<Context>, pid: Pid, poll: Duration) -> crate::Result<usize> {
    let lanes = ctx.lanes();
    let mut worked = 0;
    loop {
        let mut idle = true;
        for lane in &lanes {
            if worker::work_one(&ctx, lane)?.is_some() {
                worked += 1;
                idle = false;
            }
        }
        if idle {
            if !master::working(&ctx, pid)? {
                return Ok(worked);
            }
            // units are in flight elsewhere or waiting on a retry delay
            std::thread::sleep(poll);
        }
    }
}

/// Run `job` against `ctx` and return the saved result.
pub async fn run_job(job: &Job, ctx: Arc<Context>) -> Result<Value> {
    let records = read_input(&job.input)?;
    let mut process = Process::create_from_pipeline(&ctx, &job.pipeline, job.args.clone())?;
    let pid = process.pid();
    info!(pid, pipeline = %job.pipeline, records = records.len(), workers = job.workers, "Submitting job");

    if job.workers == 0 {
        process.run(records, true)?;
    } else {
        process.run(records, false)?;
        let poll = ctx.config.poll_interval.min(Duration::from_millis(50));
        let handles: Vec<_> = (0..job.workers)
            .map(|_| {
                let ctx = Arc::clone(&ctx);
                tokio::task::spawn_blocking(move || drain(ctx, pid, poll))
            })
            .collect();
        for handle in handles {
            let worked = handle.await??;
            debug!(pid, worked, "Local worker finished");
        }
    }

    if !process.reload()? || process.state() != State::Complete {
        bail!("process {} did not complete (state {})", pid, process.state());
    }
    let result = process.get_saved_result()?.unwrap_or(Value::Null);
    if let Some(took) = master::recent_run_times(&ctx)?.first() {
        info!(pid, took_ms = took.as_millis() as u64, "Job complete");
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn job(dir: &tempfile::TempDir, workers: usize) -> Job {
        Job {
            input: format!("{}/*.txt", dir.path().display()),
            pipeline: "word_count".to_string(),
            output: None,
            workers,
            args: vec![],
        }
    }

    fn write_inputs(dir: &tempfile::TempDir) {
        for (name, text) in [("a.txt", "the quick\n\nbrown"), ("b.txt", "quick fox\n")] {
            let mut file = fs::File::create(dir.path().join(name)).unwrap();
            file.write_all(text.as_bytes()).unwrap();
        }
    }

    #[test]
    fn reads_non_empty_lines_of_every_file() {
        let dir = tempfile::tempdir().unwrap();
        write_inputs(&dir);
        let records = read_input(&format!("{}/*.txt", dir.path().display())).unwrap();
        assert_eq!(records, vec!["the quick", "brown", "quick fox"]);
    }

    #[test]
    fn no_matching_files_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_input(&format!("{}/*.csv", dir.path().display())).is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn runs_word_count_with_local_workers() {
        let dir = tempfile::tempdir().unwrap();
        write_inputs(&dir);
        let ctx = Arc::new(Context::in_memory());
        let result = run_job(&job(&dir, 3), ctx).await.unwrap();
        assert_eq!(result, json!({"the": 1, "quick": 2, "brown": 1, "fox": 1}));
    }

    #[tokio::test]
    async fn runs_word_count_inline() {
        let dir = tempfile::tempdir().unwrap();
        write_inputs(&dir);
        let ctx = Arc::new(Context::in_memory());
        let result = run_job(&job(&dir, 0), ctx).await.unwrap();
        assert_eq!(result["quick"], json!(2));
    }
}
