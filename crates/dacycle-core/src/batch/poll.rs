//! Waiting for a submitted job to leave the queue.
//!
//! `Submitted -> Running -> Terminal`: after a settling delay the scheduler
//! listing is queried; while the job is still listed the poller sleeps and
//! queries again. A job that is no longer listed is terminal. Whether it
//! actually succeeded is decided afterwards from its log.

use super::scheduler::{JobId, Scheduler};
use crate::config::BatchConfig;
use crate::error::{CycleError, Result};
use regex::Regex;
use std::cell::{Cell, RefCell};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

pub trait Clock {
    /// Monotonic time since the clock was created.
    fn now(&self) -> Duration;
    fn sleep(&self, d: Duration);
}

#[derive(Debug)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn sleep(&self, d: Duration) {
        std::thread::sleep(d);
    }
}

/// A clock that only moves when slept on. Every sleep is recorded.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<Duration>,
    sleeps: RefCell<Vec<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.borrow().clone()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now.get()
    }

    fn sleep(&self, d: Duration) {
        self.now.set(self.now.get() + d);
        self.sleeps.borrow_mut().push(d);
    }
}

// ---------------------------------------------------------------------------
// CancelToken
// ---------------------------------------------------------------------------

/// Raised from outside (ctrl-c) to abandon the job being waited on.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// JobMatcher
// ---------------------------------------------------------------------------

/// Recognizes job identifiers in a scheduler listing.
#[derive(Debug, Clone)]
pub struct JobMatcher {
    re: Regex,
}

impl JobMatcher {
    pub fn new(pattern: &str) -> Result<Self> {
        let re = Regex::new(pattern)?;
        if re.captures_len() < 2 {
            return Err(CycleError::InvalidConfig(format!(
                "job id pattern '{pattern}' has no capture group"
            )));
        }
        Ok(Self { re })
    }

    /// The listed id matching `job`. With no numeric id to compare against,
    /// any listed id counts.
    pub fn find(&self, listing: &str, job: &JobId) -> Option<String> {
        let wanted = job.numeric();
        self.re
            .captures_iter(listing)
            .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
            .find(|id| wanted.is_empty() || id == wanted)
    }
}

// ---------------------------------------------------------------------------
// PollPolicy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    pub settle: Duration,
    pub interval: Duration,
    /// `None` waits forever.
    pub max_wait: Option<Duration>,
    pub query_retries: u32,
}

impl PollPolicy {
    pub fn from_config(batch: &BatchConfig) -> Self {
        Self {
            settle: Duration::from_secs(batch.settle_secs),
            interval: Duration::from_secs(batch.poll_secs),
            max_wait: (batch.max_wait_secs > 0).then(|| Duration::from_secs(batch.max_wait_secs)),
            query_retries: batch.query_retries,
        }
    }
}

// ---------------------------------------------------------------------------
// JobPoller
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Submitted,
    Running,
    Terminal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSummary {
    pub polls: u32,
    pub waited: Duration,
}

/// Longest single sleep; cancellation is noticed within this slice.
const SLEEP_SLICE: Duration = Duration::from_secs(1);

pub struct JobPoller<'a, S: Scheduler + ?Sized, C: Clock + ?Sized> {
    pub scheduler: &'a S,
    pub clock: &'a C,
    pub cancel: &'a CancelToken,
    pub matcher: &'a JobMatcher,
    pub policy: &'a PollPolicy,
}

impl<S: Scheduler + ?Sized, C: Clock + ?Sized> JobPoller<'_, S, C> {
    /// Block until `job` is no longer listed by the scheduler.
    ///
    /// A timeout or cancellation deletes the job before returning the error.
    pub fn wait(&self, job: &JobId) -> Result<PollSummary> {
        let started = self.clock.now();
        let mut state = JobState::Submitted;
        let mut polls = 0u32;

        loop {
            state = match state {
                JobState::Submitted => {
                    self.pause(job, self.policy.settle)?;
                    JobState::Running
                }
                JobState::Running => {
                    let listing = self.query(job)?;
                    polls += 1;
                    match self.matcher.find(&listing, job) {
                        Some(id) => {
                            tracing::debug!(job = %id, polls, "job still queued");
                            let waited = self.clock.now().saturating_sub(started);
                            if let Some(limit) = self.policy.max_wait {
                                if waited >= limit {
                                    self.abandon(job);
                                    return Err(CycleError::JobTimedOut {
                                        job: job.to_string(),
                                        secs: limit.as_secs(),
                                    });
                                }
                            }
                            self.pause(job, self.policy.interval)?;
                            JobState::Running
                        }
                        None => JobState::Terminal,
                    }
                }
                JobState::Terminal => {
                    let waited = self.clock.now().saturating_sub(started);
                    tracing::info!(job = %job, polls, waited_secs = waited.as_secs(), "job left the queue");
                    return Ok(PollSummary { polls, waited });
                }
            };
        }
    }

    /// List jobs, retrying with doubling backoff. Once the retries are spent
    /// the job is deleted, since nothing will be watching it any more.
    fn query(&self, job: &JobId) -> Result<String> {
        let attempts = self.policy.query_retries + 1;
        let mut backoff = self.policy.interval.max(SLEEP_SLICE);
        let mut last = String::new();
        for attempt in 1..=attempts {
            match self.scheduler.list_jobs() {
                Ok(listing) => return Ok(listing),
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "scheduler query failed");
                    last = e.to_string();
                }
            }
            if attempt < attempts {
                self.pause(job, backoff)?;
                backoff *= 2;
            }
        }
        self.abandon(job);
        Err(CycleError::QueryFailed {
            attempts,
            reason: last,
        })
    }

    /// Sleep for `d` in slices, bailing out when cancelled.
    fn pause(&self, job: &JobId, d: Duration) -> Result<()> {
        let mut left = d;
        loop {
            if self.cancel.is_cancelled() {
                self.abandon(job);
                return Err(CycleError::Cancelled(format!("while waiting on job {job}")));
            }
            if left.is_zero() {
                return Ok(());
            }
            let step = left.min(SLEEP_SLICE);
            self.clock.sleep(step);
            left -= step;
        }
    }

    fn abandon(&self, job: &JobId) {
        match self.scheduler.cancel(job) {
            Ok(()) => tracing::warn!(job = %job, "job deleted"),
            Err(e) => tracing::error!(job = %job, error = %e, "failed to delete job"),
        }
    }
}
