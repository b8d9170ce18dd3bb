//! The cycling loop.
//!
//! Each cycle resolves its paths into a [`CycleContext`], prepares the run
//! directory (links, stream descriptor, inflation, namelist), submits the
//! job, waits for it to leave the queue, checks its log for the completion
//! trailer and archives what it produced. The previous cycle's label is the
//! only state carried from one iteration to the next.

use crate::archive;
use crate::batch::{self, CancelToken, Clock, JobId, JobMatcher, JobPoller, JobSubmission, PollPolicy, Scheduler};
use crate::config::{FailurePolicy, RunConfig};
use crate::cycle::Cycle;
use crate::error::{CycleError, Result};
use crate::inflation::{self, InflationStart};
use crate::io;
use crate::namelist::{render_namelist, NmlValue, Overrides};
use crate::paths;
use crate::streams;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Variant
// ---------------------------------------------------------------------------

/// Which external executable a run cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    /// Ensemble filter; archives `obs_seq.final`.
    Filter,
    /// Perfect-model observation operator; archives `obs_seq.out`.
    PerfectModel,
}

impl Variant {
    pub fn executable(self) -> &'static str {
        match self {
            Variant::Filter => "filter",
            Variant::PerfectModel => "perfect_model_obs",
        }
    }

    pub fn job_prefix(self) -> &'static str {
        match self {
            Variant::Filter => "filter",
            Variant::PerfectModel => "pmo_obs",
        }
    }

    /// Observation sequence the job leaves in the run directory.
    pub fn artifact(self) -> &'static str {
        match self {
            Variant::Filter => "obs_seq.final",
            Variant::PerfectModel => "obs_seq.out",
        }
    }

    /// Stem of the per-date observation input in `obs_dir`.
    pub fn obs_input(self) -> &'static str {
        match self {
            Variant::Filter => "obs_seq.out",
            Variant::PerfectModel => "obs_seq.in",
        }
    }

    pub fn uses_inflation(self) -> bool {
        matches!(self, Variant::Filter)
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.executable())
    }
}

// ---------------------------------------------------------------------------
// CycleContext
// ---------------------------------------------------------------------------

/// Every path one cycle touches, resolved before anything is written.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleContext {
    pub variant: Variant,
    pub cycle: Cycle,
    pub run_dir: PathBuf,
    pub input_state: PathBuf,
    pub output_state: PathBuf,
    pub init_state: PathBuf,
    pub obs_input: PathBuf,
    pub namelist_template: PathBuf,
    pub namelist_path: PathBuf,
    pub streams_template: PathBuf,
    pub streams_path: PathBuf,
    pub job_name: String,
    pub log_path: PathBuf,
    pub script_path: PathBuf,
}

impl CycleContext {
    pub fn resolve(cfg: &RunConfig, variant: Variant, cycle: Cycle) -> Self {
        let date_str = cycle.date_str.clone();
        let exe = variant.executable();
        let run_dir = cfg.run_dir.clone();
        Self {
            variant,
            input_state: paths::input_state(&cfg.inout_state, &date_str, &cycle.date),
            output_state: paths::perfect_state(&cfg.inout_state, &date_str),
            init_state: paths::init_state(&cfg.init_state),
            obs_input: cfg.obs_dir.join(paths::stamped(variant.obs_input(), &date_str)),
            namelist_template: paths::namelist_template(&cfg.proj_dir),
            namelist_path: run_dir.join(paths::NAMELIST_FILE),
            streams_template: cfg.mpas_stream.clone(),
            streams_path: run_dir.join(paths::EDITED_STREAMS_FILE),
            job_name: format!("{}_{date_str}", variant.job_prefix()),
            log_path: run_dir.join(format!("output.{exe}_{date_str}.log")),
            script_path: run_dir.join(format!("{exe}.pbs")),
            run_dir,
            cycle,
        }
    }

    pub fn date_str(&self) -> &str {
        &self.cycle.date_str
    }

    pub fn job(&self, cfg: &RunConfig) -> JobSubmission {
        JobSubmission::new(
            self.job_name.clone(),
            self.variant.executable(),
            self.log_path.clone(),
            self.run_dir.clone(),
            &cfg.batch,
        )
    }

    /// `(source, link)` pairs for the static resources every cycle needs.
    pub fn static_links(&self, cfg: &RunConfig) -> Vec<(PathBuf, PathBuf)> {
        let exe = self.variant.executable();
        vec![
            (paths::dart_executable(&cfg.dart_dir, exe), self.run_dir.join(exe)),
            (
                paths::dart_executable(&cfg.dart_dir, paths::ADVANCE_TIME),
                self.run_dir.join(paths::ADVANCE_TIME),
            ),
            (cfg.rtcoef_file.clone(), self.run_dir.join(paths::RTCOEF_LINK)),
            (cfg.sccldcoef_file.clone(), self.run_dir.join(paths::SCCLDCOEF_LINK)),
        ]
    }
}

// ---------------------------------------------------------------------------
// Namelist overrides
// ---------------------------------------------------------------------------

/// Namelist fields written for this cycle.
///
/// `inflation` is only consulted for the filter.
pub fn build_overrides(ctx: &CycleContext, cfg: &RunConfig, inflation: InflationStart) -> Overrides {
    let mut ov = Overrides::new();
    ov.set("model_nml", "init_template_filename", path_value(&ctx.init_state));
    ov.set(
        "obs_kind_nml",
        "assimilate_these_obs_types",
        NmlValue::strings(cfg.obs_kind.iter().cloned()),
    );
    ov.set(
        "mpas_vars_nml",
        "mpas_state_variables",
        NmlValue::strings(cfg.mpas_vars.iter().cloned()),
    );
    if let Some(clouds) = cfg.cloudy_radiance {
        ov.set("obs_def_rttov_nml", "addclouds", clouds);
    }

    match ctx.variant {
        Variant::Filter => {
            let f = &cfg.filter;
            ov.set("filter_nml", "ens_size", f.ens_size)
                .set("filter_nml", "num_output_obs_members", f.num_output_obs_members)
                .set("filter_nml", "assimilation_period_days", f.assimilation_period_days)
                .set("filter_nml", "cutoff", f.cutoff)
                .set("filter_nml", "vert_normalization_height", f.vert_normalization_height)
                .set("filter_nml", "distribute_mean", f.distribute_mean)
                .set(
                    "filter_nml",
                    "convert_all_obs_verticals_first",
                    f.convert_all_obs_verticals_first,
                )
                .set("filter_nml", "write_binary_obs_sequence", f.write_binary_obs_sequence)
                .set("filter_nml", "tasks_per_node", f.tasks_per_node)
                .set("filter_nml", "obs_sequence_in_name", path_value(&ctx.obs_input));
            inflation::set_restart_flags(&mut ov, inflation);
        }
        Variant::PerfectModel => {
            ov.set("perfect_model_obs_nml", "obs_seq_in_file_name", path_value(&ctx.obs_input))
                .set("perfect_model_obs_nml", "input_state_files", path_value(&ctx.input_state))
                .set("perfect_model_obs_nml", "output_state_files", path_value(&ctx.output_state));
        }
    }
    ov
}

fn path_value(p: &Path) -> NmlValue {
    NmlValue::Str(p.display().to_string())
}

// ---------------------------------------------------------------------------
// Completion check
// ---------------------------------------------------------------------------

/// Line the external executables print as their last act on success.
pub const SUCCESS_TRAILER: &str = "Finished ... at YYYY MM DD HH MM SS =";

/// Whether the job log carries the success trailer. A missing log means the
/// job never ran far enough to write one. Undecodable bytes from crashed
/// ranks are tolerated.
pub fn log_has_trailer(log: &Path) -> Result<bool> {
    match std::fs::read(log) {
        Ok(bytes) => Ok(String::from_utf8_lossy(&bytes)
            .lines()
            .any(|l| l.trim() == SUCCESS_TRAILER)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

pub const STATUS_OK: i32 = 0;
pub const STATUS_FAILED: i32 = -1;

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub date: String,
    pub prev_date: String,
    /// `0` on success, `-1` when the job finished without its trailer.
    pub status: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inflation: Option<InflationStart>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    pub waited_secs: u64,
    pub artifacts: Vec<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log: Option<PathBuf>,
}

impl CycleReport {
    fn new(ctx: &CycleContext, inflation: Option<InflationStart>) -> Self {
        Self {
            date: ctx.date_str().to_string(),
            prev_date: ctx.cycle.prev_label().to_string(),
            status: STATUS_OK,
            inflation,
            job_id: None,
            waited_secs: 0,
            artifacts: Vec::new(),
            log: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == STATUS_OK
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum RunOutcome {
    /// Every cycle was attempted.
    Completed,
    /// A failed job stopped the range at `date`.
    Stopped { date: String },
    /// Cycles were prepared but nothing was submitted.
    DryRun,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub variant: Variant,
    pub outcome: RunOutcome,
    pub cycles: Vec<CycleReport>,
}

impl RunReport {
    pub fn failed(&self) -> usize {
        self.cycles.iter().filter(|c| !c.succeeded()).count()
    }
}

/// Progress notifications, for callers that show the run as it goes.
#[derive(Debug)]
pub enum CycleEvent<'a> {
    Started(&'a CycleContext),
    /// The job is queued; waiting starts next.
    Submitted { date: &'a str, job: &'a JobId },
    /// The job left the queue. Its log has not been checked yet.
    JobDone { date: &'a str, job: &'a JobId, waited_secs: u64 },
    Finished(&'a CycleReport),
}

// ---------------------------------------------------------------------------
// Preparation
// ---------------------------------------------------------------------------

/// Steps that leave the run directory ready for submission: static links,
/// stream descriptor, inflation files and the rendered namelist.
///
/// Returns the inflation start mode, `None` for variants without inflation.
pub fn prepare_cycle(ctx: &CycleContext, cfg: &RunConfig) -> Result<Option<InflationStart>> {
    io::ensure_dir(&ctx.run_dir)?;
    for (src, dst) in ctx.static_links(cfg) {
        io::link_resource(&src, &dst)?;
    }

    streams::write_patched_streams(
        &ctx.streams_template,
        &ctx.streams_path,
        &cfg.streams.da_restart_interval,
    )?;

    let inflation = if ctx.variant.uses_inflation() {
        Some(inflation::carry_forward(
            cfg,
            ctx.cycle.prev_date_str.as_deref(),
            &ctx.run_dir,
        )?)
    } else {
        None
    };

    let template = std::fs::read_to_string(&ctx.namelist_template).map_err(|e| {
        CycleError::InvalidConfig(format!(
            "cannot read namelist template {}: {e}",
            ctx.namelist_template.display()
        ))
    })?;
    let overrides = build_overrides(ctx, cfg, inflation.unwrap_or(InflationStart::Cold));
    let rendered = render_namelist(&template, &overrides)?;
    io::atomic_write(&ctx.namelist_path, rendered.as_bytes())?;
    tracing::debug!(path = %ctx.namelist_path.display(), fields = overrides.len(), "namelist written");

    Ok(inflation)
}

/// Prepare every cycle and write its job script without submitting.
pub fn dry_run(
    cfg: &RunConfig,
    variant: Variant,
    dates: &[NaiveDateTime],
    mut on_event: impl FnMut(&CycleEvent<'_>),
) -> Result<RunReport> {
    let mut cycles = Vec::with_capacity(dates.len());
    let mut prev: Option<String> = None;
    for &date in dates {
        let ctx = CycleContext::resolve(cfg, variant, Cycle::new(date, prev.take()));
        let date_str = ctx.date_str().to_string();
        on_event(&CycleEvent::Started(&ctx));
        let step = || -> Result<CycleReport> {
            let inflation = prepare_cycle(&ctx, cfg)?;
            let script = batch::render_job_script(&ctx.job(cfg));
            io::atomic_write(&ctx.script_path, script.as_bytes())?;
            Ok(CycleReport::new(&ctx, inflation))
        };
        let report = step().map_err(|e| e.in_cycle(&date_str))?;
        on_event(&CycleEvent::Finished(&report));
        cycles.push(report);
        prev = Some(date_str);
    }
    Ok(RunReport {
        variant,
        outcome: RunOutcome::DryRun,
        cycles,
    })
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator<'a, S: Scheduler + ?Sized, C: Clock + ?Sized> {
    pub config: &'a RunConfig,
    pub variant: Variant,
    pub scheduler: &'a S,
    pub clock: &'a C,
    pub cancel: &'a CancelToken,
}

impl<S: Scheduler + ?Sized, C: Clock + ?Sized> Orchestrator<'_, S, C> {
    /// Run every cycle in order.
    ///
    /// Preparation, scheduler and archive errors abort the run and carry the
    /// failing cycle's date. A job that finishes without its trailer is
    /// reported with status `-1`; the configured failure policy decides
    /// whether later cycles still run. A raised cancel token stops the run
    /// before the next cycle or submission.
    pub fn run(
        &self,
        dates: &[NaiveDateTime],
        mut on_event: impl FnMut(&CycleEvent<'_>),
    ) -> Result<RunReport> {
        let cfg = self.config;
        let matcher = JobMatcher::new(&cfg.batch.job_id_pattern)?;
        let policy = PollPolicy::from_config(&cfg.batch);
        let poller = JobPoller {
            scheduler: self.scheduler,
            clock: self.clock,
            cancel: self.cancel,
            matcher: &matcher,
            policy: &policy,
        };

        let mut cycles = Vec::with_capacity(dates.len());
        let mut prev: Option<String> = None;
        let mut outcome = RunOutcome::Completed;

        for &date in dates {
            let ctx = CycleContext::resolve(cfg, self.variant, Cycle::new(date, prev.take()));
            let date_str = ctx.date_str().to_string();
            self.check_cancelled("before the cycle started")
                .map_err(|e| e.in_cycle(&date_str))?;
            tracing::info!(date = %date_str, prev = ctx.cycle.prev_label(), variant = %self.variant, "cycle start");
            on_event(&CycleEvent::Started(&ctx));

            let report = self
                .run_cycle(&ctx, &poller, &mut on_event)
                .map_err(|e| e.in_cycle(&date_str))?;
            on_event(&CycleEvent::Finished(&report));
            let ok = report.succeeded();
            cycles.push(report);
            prev = Some(date_str.clone());

            if !ok {
                tracing::error!(date = %date_str, "job did not finish correctly");
                if cfg.on_job_failure == FailurePolicy::Stop {
                    outcome = RunOutcome::Stopped { date: date_str };
                    break;
                }
            }
        }

        Ok(RunReport {
            variant: self.variant,
            outcome,
            cycles,
        })
    }

    fn check_cancelled(&self, when: &str) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(CycleError::Cancelled(when.to_string()));
        }
        Ok(())
    }

    fn run_cycle(
        &self,
        ctx: &CycleContext,
        poller: &JobPoller<'_, S, C>,
        on_event: &mut impl FnMut(&CycleEvent<'_>),
    ) -> Result<CycleReport> {
        let cfg = self.config;
        let inflation = prepare_cycle(ctx, cfg)?;
        let mut report = CycleReport::new(ctx, inflation);

        // A stale log from an earlier attempt must not pass the trailer check.
        if ctx.log_path.exists() {
            std::fs::remove_file(&ctx.log_path)?;
        }

        self.check_cancelled("before submission")?;
        let job = ctx.job(cfg);
        let (id, summary) = batch::submit_and_wait(&job, &ctx.script_path, poller, |id| {
            on_event(&CycleEvent::Submitted {
                date: ctx.date_str(),
                job: id,
            })
        })?;
        report.waited_secs = summary.waited.as_secs();
        on_event(&CycleEvent::JobDone {
            date: ctx.date_str(),
            job: &id,
            waited_secs: report.waited_secs,
        });
        report.job_id = Some(id);

        if !log_has_trailer(&ctx.log_path)? {
            report.status = STATUS_FAILED;
            return Ok(report);
        }

        report.log = Some(archive::archive_log(&ctx.log_path, &cfg.log_dir())?);
        let artifact = archive::archive_artifact(
            &ctx.run_dir,
            ctx.variant.artifact(),
            ctx.date_str(),
            &cfg.obs_dir,
            cfg.overwrite_archive,
        )?;
        tracing::info!(artifact = %artifact.display(), "archived");
        report.artifacts.push(artifact);

        if ctx.variant.uses_inflation() && cfg.adaptive_inflation() {
            let kept = archive::archive_inflation(
                &ctx.run_dir,
                &cfg.inout_state,
                ctx.date_str(),
                &cfg.filter.output_priorinf,
                &cfg.filter.input_priorinf,
                cfg.overwrite_archive,
            )?;
            report.artifacts.extend(kept);
        }
        Ok(report)
    }
}
