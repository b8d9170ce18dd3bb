//! Batch scheduler access.
//!
//! The orchestrator only talks to a [`Scheduler`]; [`PbsScheduler`] is the
//! production implementation shelling out to `qsub`, `qstat` and `qdel`.

use crate::error::{CycleError, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Identifier printed by the scheduler on submission, e.g. `4821337.desched1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobId(pub String);

impl JobId {
    /// Leading numeric part, which is what `qstat` listings show.
    pub fn numeric(&self) -> &str {
        let end = self
            .0
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

pub trait Scheduler {
    /// Submit `script` with `work_dir` as the working directory.
    fn submit(&self, script: &Path, work_dir: &Path) -> Result<JobId>;

    /// Raw listing of the current user's queued and running jobs.
    fn list_jobs(&self) -> Result<String>;

    fn cancel(&self, job: &JobId) -> Result<()>;
}

// ---------------------------------------------------------------------------
// PBS
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PbsScheduler {
    qsub: PathBuf,
    qstat: PathBuf,
    qdel: PathBuf,
    user: String,
}

impl PbsScheduler {
    /// Locate the PBS client programs on `PATH`.
    pub fn detect() -> Result<Self> {
        let find = |name: &str| {
            which::which(name).map_err(|_| CycleError::SchedulerMissing(name.to_string()))
        };
        let user = std::env::var("USER")
            .or_else(|_| std::env::var("LOGNAME"))
            .map_err(|_| CycleError::InvalidConfig("USER is not set".to_string()))?;
        Ok(Self {
            qsub: find("qsub")?,
            qstat: find("qstat")?,
            qdel: find("qdel")?,
            user,
        })
    }
}

/// Run `cmd` and return its stdout, or a short description of the failure.
fn capture(cmd: &mut Command) -> std::result::Result<String, String> {
    let output = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| format!("failed to spawn: {e}"))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let hint = stderr.trim().chars().take(500).collect::<String>();
        return Err(format!("{} ({hint})", output.status));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

impl Scheduler for PbsScheduler {
    fn submit(&self, script: &Path, work_dir: &Path) -> Result<JobId> {
        let stdout = capture(Command::new(&self.qsub).arg(script).current_dir(work_dir))
            .map_err(CycleError::SubmitFailed)?;
        let id = stdout.trim();
        if id.is_empty() {
            return Err(CycleError::SubmitFailed(
                "qsub printed no job identifier".to_string(),
            ));
        }
        Ok(JobId(id.to_string()))
    }

    fn list_jobs(&self) -> Result<String> {
        capture(Command::new(&self.qstat).args(["-u", &self.user])).map_err(|reason| {
            CycleError::SchedulerCommand(format!("qstat -u {}: {reason}", self.user))
        })
    }

    fn cancel(&self, job: &JobId) -> Result<()> {
        capture(Command::new(&self.qdel).arg(&job.0))
            .map(|_| ())
            .map_err(|reason| CycleError::SchedulerCommand(format!("qdel {job}: {reason}")))
    }
}
