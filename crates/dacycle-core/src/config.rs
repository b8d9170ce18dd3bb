use crate::error::{CycleError, Result};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// Toggle
// ---------------------------------------------------------------------------

/// A switch written either as a YAML boolean or as the string `"true"`.
///
/// Existing `params.yaml` files spell `adaptive_inf: 'true'`; anything other
/// than a true boolean or the exact string `true` is off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Toggle {
    Bool(bool),
    Text(String),
}

impl Toggle {
    pub fn is_on(&self) -> bool {
        match self {
            Toggle::Bool(b) => *b,
            Toggle::Text(s) => s == "true",
        }
    }
}

impl Default for Toggle {
    fn default() -> Self {
        Toggle::Bool(false)
    }
}

// ---------------------------------------------------------------------------
// FilterConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    pub ens_size: i64,
    pub num_output_obs_members: i64,
    pub assimilation_period_days: i64,
    pub cutoff: f64,
    pub vert_normalization_height: f64,
    pub distribute_mean: bool,
    pub convert_all_obs_verticals_first: bool,
    pub write_binary_obs_sequence: bool,
    pub tasks_per_node: i64,
    #[serde(default)]
    pub adaptive_inf: Toggle,
    #[serde(default = "default_input_priorinf")]
    pub input_priorinf: String,
    #[serde(default = "default_output_priorinf")]
    pub output_priorinf: String,
}

fn default_input_priorinf() -> String {
    "input_priorinf".to_string()
}

fn default_output_priorinf() -> String {
    "output_priorinf".to_string()
}

// ---------------------------------------------------------------------------
// BatchConfig
// ---------------------------------------------------------------------------

/// PBS resource request and polling parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_proj_number")]
    pub proj_number: String,
    #[serde(default = "default_queue")]
    pub queue: String,
    #[serde(default = "default_walltime")]
    pub walltime: String,
    #[serde(default = "default_one")]
    pub nodes: u32,
    #[serde(default = "default_cpus")]
    pub ncpus: u32,
    #[serde(default = "default_cpus")]
    pub mpiprocs: u32,
    #[serde(default = "default_mem_gb")]
    pub mem_gb: u32,
    /// Seconds to wait after `qsub` before the first status query.
    #[serde(default = "default_settle_secs")]
    pub settle_secs: u64,
    #[serde(default = "default_poll_secs")]
    pub poll_secs: u64,
    /// Upper bound on the total wait for one job. `0` disables the bound.
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,
    #[serde(default = "default_query_retries")]
    pub query_retries: u32,
    /// Pattern matched against `qstat` output; group 1 is the numeric job id.
    #[serde(default = "default_job_id_pattern")]
    pub job_id_pattern: String,
}

fn default_proj_number() -> String {
    "NMMM0063".to_string()
}

fn default_queue() -> String {
    "develop".to_string()
}

fn default_walltime() -> String {
    "00:30:00".to_string()
}

fn default_one() -> u32 {
    1
}

fn default_cpus() -> u32 {
    16
}

fn default_mem_gb() -> u32 {
    64
}

fn default_settle_secs() -> u64 {
    15
}

fn default_poll_secs() -> u64 {
    10
}

fn default_max_wait_secs() -> u64 {
    6 * 60 * 60
}

fn default_query_retries() -> u32 {
    3
}

fn default_job_id_pattern() -> String {
    r"(\d+)\.desche".to_string()
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            proj_number: default_proj_number(),
            queue: default_queue(),
            walltime: default_walltime(),
            nodes: default_one(),
            ncpus: default_cpus(),
            mpiprocs: default_cpus(),
            mem_gb: default_mem_gb(),
            settle_secs: default_settle_secs(),
            poll_secs: default_poll_secs(),
            max_wait_secs: default_max_wait_secs(),
            query_retries: default_query_retries(),
            job_id_pattern: default_job_id_pattern(),
        }
    }
}

// ---------------------------------------------------------------------------
// StreamsConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamsConfig {
    #[serde(default = "default_da_restart_interval")]
    pub da_restart_interval: String,
}

fn default_da_restart_interval() -> String {
    "6:00:00".to_string()
}

impl Default for StreamsConfig {
    fn default() -> Self {
        Self {
            da_restart_interval: default_da_restart_interval(),
        }
    }
}

// ---------------------------------------------------------------------------
// FailurePolicy
// ---------------------------------------------------------------------------

/// What to do with the rest of the range when a job ends without its
/// success trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    #[default]
    Stop,
    Skip,
}

// ---------------------------------------------------------------------------
// RunConfig (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub proj_dir: PathBuf,
    pub run_dir: PathBuf,
    #[serde(rename = "DART_dir")]
    pub dart_dir: PathBuf,
    pub rtcoef_file: PathBuf,
    pub sccldcoef_file: PathBuf,
    pub obs_kind: Vec<String>,
    pub obs_dir: PathBuf,
    pub inout_state: PathBuf,
    pub init_state: PathBuf,
    pub mpas_vars: Vec<String>,
    #[serde(rename = "MPAS_stream")]
    pub mpas_stream: PathBuf,
    pub filter: FilterConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
    /// Sets `obs_def_rttov_nml.addclouds` when present; left alone otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloudy_radiance: Option<bool>,
    #[serde(default)]
    pub streams: StreamsConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub on_job_failure: FailurePolicy,
    #[serde(default)]
    pub overwrite_archive: bool,
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CycleError::ConfigNotFound(path.display().to_string()));
        }
        let data = std::fs::read_to_string(path)?;
        Self::from_yaml(&data)
    }

    pub fn from_yaml(data: &str) -> Result<Self> {
        let cfg: RunConfig = serde_yaml::from_str(data)?;
        Ok(cfg)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.log_dir
            .clone()
            .unwrap_or_else(|| self.proj_dir.join(paths::LOG_DIR))
    }

    pub fn adaptive_inflation(&self) -> bool {
        self.filter.adaptive_inf.is_on()
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut push = |level: WarnLevel, message: String| {
            warnings.push(ConfigWarning { level, message });
        };

        if self.obs_kind.is_empty() {
            push(
                WarnLevel::Warning,
                "obs_kind is empty; no observation types will be assimilated".to_string(),
            );
        }
        if self.mpas_vars.is_empty() {
            push(WarnLevel::Warning, "mpas_vars is empty".to_string());
        }
        if self.filter.ens_size < 1 {
            push(
                WarnLevel::Error,
                format!("filter.ens_size must be positive, got {}", self.filter.ens_size),
            );
        }
        if self.filter.num_output_obs_members > self.filter.ens_size {
            push(
                WarnLevel::Warning,
                format!(
                    "filter.num_output_obs_members ({}) exceeds ens_size ({})",
                    self.filter.num_output_obs_members, self.filter.ens_size
                ),
            );
        }
        if let Toggle::Text(s) = &self.filter.adaptive_inf {
            if s != "true" && s != "false" {
                push(
                    WarnLevel::Warning,
                    format!("filter.adaptive_inf '{s}' is treated as disabled"),
                );
            }
        }
        match regex::Regex::new(&self.batch.job_id_pattern) {
            Ok(re) if re.captures_len() < 2 => push(
                WarnLevel::Error,
                "batch.job_id_pattern needs a capture group for the job id".to_string(),
            ),
            Ok(_) => {}
            Err(e) => push(
                WarnLevel::Error,
                format!("batch.job_id_pattern does not compile: {e}"),
            ),
        }
        if self.batch.poll_secs == 0 {
            push(
                WarnLevel::Warning,
                "batch.poll_secs is 0; the scheduler will be queried without pause".to_string(),
            );
        }
        if self.batch.max_wait_secs == 0 {
            push(
                WarnLevel::Warning,
                "batch.max_wait_secs is 0; a hung job blocks the run indefinitely".to_string(),
            );
        }

        warnings
    }

    pub fn has_errors(warnings: &[ConfigWarning]) -> bool {
        warnings.iter().any(|w| w.level == WarnLevel::Error)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
