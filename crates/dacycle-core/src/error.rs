use thiserror::Error;

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("config not found: {0}")]
    ConfigNotFound(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("invalid date '{0}': expected YYYYMMDDHH")]
    InvalidDate(String),

    #[error("invalid date range: {0}")]
    InvalidRange(String),

    #[error("namelist parse error at line {line}: {reason}")]
    NamelistParse { line: usize, reason: String },

    #[error("stream descriptor error: {0}")]
    Streams(String),

    #[error("failed to write {path}: {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} not found on PATH")]
    SchedulerMissing(String),

    #[error("job submission failed: {0}")]
    SubmitFailed(String),

    #[error("scheduler command failed: {0}")]
    SchedulerCommand(String),

    #[error("scheduler query failed after {attempts} attempt(s): {reason}")]
    QueryFailed { attempts: u32, reason: String },

    #[error("job {job} did not finish within {secs}s")]
    JobTimedOut { job: String, secs: u64 },

    #[error("cancelled {0}")]
    Cancelled(String),

    #[error("archive destination already exists: {0}")]
    ArchiveExists(String),

    #[error("expected artifact missing: {0}")]
    ArtifactMissing(String),

    #[error("cycle {date}: {source}")]
    Cycle {
        date: String,
        #[source]
        source: Box<CycleError>,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Regex(#[from] regex::Error),
}

impl CycleError {
    /// Attach the cycle label to an error raised while processing that cycle.
    pub fn in_cycle(self, date: &str) -> Self {
        match self {
            already @ CycleError::Cycle { .. } => already,
            other => CycleError::Cycle {
                date: date.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, looking through any cycle wrapper.
    pub fn root(&self) -> &CycleError {
        match self {
            CycleError::Cycle { source, .. } => source.root(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, CycleError>;
