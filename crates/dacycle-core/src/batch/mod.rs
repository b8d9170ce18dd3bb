//! Batch job handling: script rendering, submission and completion polling.

pub mod poll;
pub mod scheduler;
pub mod script;

pub use poll::{CancelToken, Clock, JobMatcher, JobPoller, ManualClock, PollPolicy, PollSummary, SystemClock};
pub use scheduler::{JobId, PbsScheduler, Scheduler};
pub use script::{render_job_script, JobSubmission};

use crate::error::Result;
use std::path::Path;

/// Write the job script for `job` to `script_path`, submit it and block
/// until the job leaves the queue. `on_submitted` runs between the two.
pub fn submit_and_wait<S: Scheduler + ?Sized, C: Clock + ?Sized>(
    job: &JobSubmission,
    script_path: &Path,
    poller: &JobPoller<'_, S, C>,
    on_submitted: impl FnOnce(&JobId),
) -> Result<(JobId, PollSummary)> {
    crate::io::atomic_write(script_path, render_job_script(job).as_bytes())?;
    let id = poller.scheduler.submit(script_path, &job.work_dir)?;
    tracing::info!(job = %id, name = %job.job_name, "submitted");
    on_submitted(&id);
    let summary = poller.wait(&id)?;
    Ok((id, summary))
}
