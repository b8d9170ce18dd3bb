use crate::output::{print_json, print_table};
use anyhow::Context;
use dacycle_core::batch::{CancelToken, PbsScheduler, SystemClock};
use dacycle_core::config::RunConfig;
use dacycle_core::cycle::parse_range;
use dacycle_core::orchestrator::{self, CycleEvent, Orchestrator, RunOutcome, RunReport, Variant};
use dacycle_core::CycleError;
use std::path::Path;

// ---------------------------------------------------------------------------
// RunExit: typed non-zero exit codes
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum RunExit {
    JobFailed { failed: usize, stopped_at: Option<String> },
    TimedOut(String),
    Cancelled(String),
}

impl RunExit {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunExit::JobFailed { .. } => 2,
            RunExit::TimedOut(_) => 3,
            RunExit::Cancelled(_) => 130,
        }
    }
}

impl std::fmt::Display for RunExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunExit::JobFailed {
                failed,
                stopped_at: Some(date),
            } => write!(f, "{failed} cycle(s) failed; stopped at {date}"),
            RunExit::JobFailed {
                failed,
                stopped_at: None,
            } => write!(f, "{failed} cycle(s) failed"),
            RunExit::TimedOut(msg) | RunExit::Cancelled(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for RunExit {}

fn classify(err: CycleError) -> anyhow::Error {
    if matches!(err.root(), CycleError::JobTimedOut { .. }) {
        RunExit::TimedOut(err.to_string()).into()
    } else if matches!(err.root(), CycleError::Cancelled(_)) {
        RunExit::Cancelled(err.to_string()).into()
    } else {
        err.into()
    }
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

pub struct RunArgs<'a> {
    pub start: &'a str,
    pub end: &'a str,
    pub interval: u32,
    pub dry_run: bool,
}

pub fn run(config_path: &Path, variant: Variant, args: RunArgs<'_>, json: bool) -> anyhow::Result<()> {
    let config = RunConfig::load(config_path)
        .with_context(|| format!("failed to load config {}", config_path.display()))?;
    let warnings = config.validate();
    for w in &warnings {
        tracing::warn!("{}", w.message);
    }
    if RunConfig::has_errors(&warnings) {
        anyhow::bail!("config has errors; see `dacycle config validate`");
    }

    let dates = parse_range(args.start, args.end, args.interval)?;
    let progress = |event: &CycleEvent<'_>| {
        if !json {
            print_progress(event);
        }
    };

    let result = if args.dry_run {
        orchestrator::dry_run(&config, variant, &dates, progress)
    } else {
        let scheduler = PbsScheduler::detect()?;
        let clock = SystemClock::new();
        let cancel = CancelToken::new();
        cancel_on_ctrl_c(cancel.clone())?;
        Orchestrator {
            config: &config,
            variant,
            scheduler: &scheduler,
            clock: &clock,
            cancel: &cancel,
        }
        .run(&dates, progress)
    };
    let report = result.map_err(classify)?;

    if json {
        print_json(&report)?;
    } else {
        print_summary(&report);
    }

    let failed = report.failed();
    if failed > 0 {
        let stopped_at = match &report.outcome {
            RunOutcome::Stopped { date } => Some(date.clone()),
            _ => None,
        };
        return Err(RunExit::JobFailed { failed, stopped_at }.into());
    }
    Ok(())
}

fn print_progress(event: &CycleEvent<'_>) {
    match event {
        CycleEvent::Started(ctx) => {
            println!("Processing date: {}", ctx.date_str());
            println!("Input state: {}", ctx.input_state.display());
        }
        CycleEvent::Submitted { date, job } => {
            println!("Submitted job {job} for {date}");
        }
        CycleEvent::JobDone { job, waited_secs, .. } => {
            println!("Job {job} left the queue after {waited_secs}s");
        }
        CycleEvent::Finished(report) if !report.succeeded() => {
            println!("Process did not finish correctly");
        }
        CycleEvent::Finished(_) => {}
    }
}

fn print_summary(report: &RunReport) {
    println!();
    let rows = report
        .cycles
        .iter()
        .map(|c| {
            let status = if c.succeeded() { "ok" } else { "failed" };
            let inflation = match c.inflation {
                Some(start) => format!("{start:?}").to_lowercase(),
                None => "-".to_string(),
            };
            let job = c
                .job_id
                .as_ref()
                .map(|j| j.to_string())
                .unwrap_or_else(|| "-".to_string());
            let artifact = c
                .artifacts
                .first()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "-".to_string());
            vec![
                c.date.clone(),
                c.prev_date.clone(),
                status.to_string(),
                inflation,
                job,
                artifact,
            ]
        })
        .collect();
    print_table(&["DATE", "PREV", "STATUS", "INFLATION", "JOB", "ARTIFACT"], rows);

    match &report.outcome {
        RunOutcome::DryRun => println!("\nDry run: nothing submitted."),
        RunOutcome::Stopped { date } => println!("\nStopped after failed cycle {date}."),
        RunOutcome::Completed => {}
    }
}

/// Raise `token` on the first ctrl-c. The poller notices between sleeps,
/// deletes the job and unwinds the run.
fn cancel_on_ctrl_c(token: CancelToken) -> anyhow::Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start signal runtime")?;
    std::thread::Builder::new()
        .name("ctrl-c".to_string())
        .spawn(move || {
            rt.block_on(async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("interrupted; cancelling the running job");
                    token.cancel();
                }
            });
        })
        .context("failed to spawn signal thread")?;
    Ok(())
}
