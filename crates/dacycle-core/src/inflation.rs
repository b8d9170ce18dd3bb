//! Adaptive-inflation carry-forward between cycles.

use crate::config::RunConfig;
use crate::error::Result;
use crate::namelist::{NmlValue, Overrides};
use crate::paths;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InflationStart {
    /// Inflation initialized from namelist values.
    Cold,
    /// Inflation read from the previous cycle's mean and sd files.
    Warm,
}

/// Mean and standard-deviation inflation files of one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InflationFiles {
    pub mean: PathBuf,
    pub sd: PathBuf,
}

impl InflationFiles {
    pub fn for_cycle(inout_state: &Path, date_str: &str, fragment: &str) -> Self {
        Self {
            mean: paths::inflation_file(inout_state, date_str, fragment, "mean"),
            sd: paths::inflation_file(inout_state, date_str, fragment, "sd"),
        }
    }

    pub fn both_exist(&self) -> bool {
        self.mean.is_file() && self.sd.is_file()
    }
}

/// Decide how inflation starts this cycle and link the previous cycle's
/// files into `run_dir` when warm starting.
///
/// Missing files are not an error: the cycle simply starts cold.
pub fn carry_forward(cfg: &RunConfig, prev_date_str: Option<&str>, run_dir: &Path) -> Result<InflationStart> {
    if !cfg.adaptive_inflation() {
        return Ok(InflationStart::Cold);
    }
    let Some(prev) = prev_date_str else {
        tracing::info!("first cycle; inflation starts cold");
        return Ok(InflationStart::Cold);
    };
    let files = InflationFiles::for_cycle(&cfg.inout_state, prev, &cfg.filter.input_priorinf);
    if !files.both_exist() {
        tracing::info!(
            mean = %files.mean.display(),
            sd = %files.sd.display(),
            "previous inflation files incomplete; inflation starts cold"
        );
        return Ok(InflationStart::Cold);
    }
    for src in [&files.mean, &files.sd] {
        if let Some(name) = src.file_name() {
            crate::io::link_resource(src, &run_dir.join(name))?;
        }
    }
    tracing::info!(prev, "inflation warm-started from previous cycle");
    Ok(InflationStart::Warm)
}

/// `inf_initial_from_restart` and `inf_sd_initial_from_restart` for both
/// prior and posterior inflation.
pub fn set_restart_flags(overrides: &mut Overrides, start: InflationStart) {
    let on = start == InflationStart::Warm;
    let pair = || NmlValue::List(vec![on.into(), on.into()]);
    overrides.set("filter_nml", "inf_initial_from_restart", pair());
    overrides.set("filter_nml", "inf_sd_initial_from_restart", pair());
}
